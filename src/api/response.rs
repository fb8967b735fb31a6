use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::domain::TelemetryEvent;
use crate::orchestrator::EngineError;

/// Errors returned by the HTTP binding.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("x-tenant-id header or tenant_id is required")]
    MissingTenant,

    #[error("case_type must be scheduling_auth")]
    InvalidCaseType,

    #[error("case_id is required and must be a string")]
    InvalidCaseId,

    #[error("payload is required")]
    InvalidPayload,

    #[error("request body is not valid JSON: {0}")]
    InvalidBody(#[from] JsonRejection),

    #[error("agent execution failed: {0}")]
    Agent(#[from] EngineError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Agent(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Stable error code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingTenant => "missing_tenant_id",
            ApiError::InvalidCaseType => "invalid_case_type",
            ApiError::InvalidCaseId => "invalid_case_id",
            ApiError::InvalidPayload => "invalid_payload",
            ApiError::InvalidBody(_) => "invalid_body",
            ApiError::Agent(_) => "agent_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::new(self.code(), self.to_string());
        (self.status(), Json(body)).into_response()
    }
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorResponse {
            error: error.into(),
            message: message.into(),
        }
    }
}

/// Response of `GET /v1/events`.
#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub tenant_id: String,
    pub events: Vec<TelemetryEvent>,
    pub count: usize,
}

impl EventsResponse {
    pub fn new(tenant_id: String, events: Vec<TelemetryEvent>) -> Self {
        EventsResponse {
            tenant_id,
            count: events.len(),
            events,
        }
    }
}

/// Response of `POST /v1/feedback`.
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
}

impl AcceptedResponse {
    pub fn accepted() -> Self {
        AcceptedResponse { status: "accepted" }
    }
}

/// Liveness response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: String,
    pub uptime_secs: u64,
}

/// Readiness response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// `ok`, or `degraded` when the fallback configuration is in use
    pub status: &'static str,
    pub config: bool,
    pub policy_version: String,
    pub background_tasks: usize,
}
