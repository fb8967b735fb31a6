use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::domain::EventKind;
use crate::orchestrator::{EngineContext, Orchestrator};
use crate::verifier::{AgentRunResponse, Verifier};

use super::request::{non_blank, AgentRunRequest, EventsQuery, FeedbackRequest};
use super::response::{
    AcceptedResponse, ApiError, EventsResponse, HealthResponse, ReadyResponse,
};
use super::tenant::TenantId;

/// Shared application state.
pub struct AppState {
    pub orchestrator: Orchestrator,

    pub verifier: Verifier,

    /// Prometheus exporter handle, if a recorder is installed
    pub metrics: Option<PrometheusHandle>,

    /// Application start time
    pub start_time: Instant,

    /// Application version
    pub version: String,

    /// Latency budget in milliseconds
    pub latency_budget_ms: u64,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        let verifier = Verifier::new(Arc::clone(orchestrator.context()));
        AppState {
            orchestrator,
            verifier,
            metrics: None,
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            latency_budget_ms: 250,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn with_latency_budget(mut self, budget_ms: u64) -> Self {
        self.latency_budget_ms = budget_ms;
        self
    }

    fn context(&self) -> &Arc<EngineContext> {
        self.orchestrator.context()
    }
}

/// Create the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/agent/run", post(handle_agent_run))
        .route("/v1/events", get(handle_events))
        .route("/v1/feedback", post(handle_feedback))
        .route("/health/live", get(handle_live))
        .route("/health/ready", get(handle_ready))
        .route("/metrics", get(handle_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

/// Resolve and verify one case.
async fn handle_agent_run(
    State(state): State<Arc<AppState>>,
    tenant: Result<TenantId, ApiError>,
    body: Result<Json<AgentRunRequest>, JsonRejection>,
) -> Result<Json<AgentRunResponse>, ApiError> {
    let start = Instant::now();
    let Json(body) = body?;

    let tenant = match tenant {
        Ok(tenant) => tenant,
        Err(e) => non_blank(body.tenant_id.as_deref())
            .map(|t| TenantId(t.to_string()))
            .ok_or(e)?,
    };

    let request = body.into_case_request()?;
    let draft = state.orchestrator.run(tenant.as_str(), &request).await?;
    let response = state
        .verifier
        .verify(tenant.as_str(), &request.case_id, draft);

    let elapsed = start.elapsed();
    if elapsed.as_millis() > state.latency_budget_ms as u128 {
        warn!(
            tenant_id = tenant.as_str(),
            case_id = %request.case_id,
            latency_ms = elapsed.as_millis(),
            budget_ms = state.latency_budget_ms,
            "Agent run latency exceeded budget"
        );
    }

    info!(
        tenant_id = tenant.as_str(),
        decision = %response.decision,
        latency_ms = elapsed.as_millis(),
        "Agent run completed"
    );

    Ok(Json(response))
}

/// Recent events for a tenant; the query parameter overrides the header.
async fn handle_events(
    State(state): State<Arc<AppState>>,
    tenant: Result<TenantId, ApiError>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let tenant_id = match non_blank(query.tenant_id.as_deref()) {
        Some(tenant_id) => tenant_id.to_string(),
        None => tenant?.0,
    };

    let events = state.context().events.read(&tenant_id, query.limit());
    Ok(Json(EventsResponse::new(tenant_id, events)))
}

/// Record user feedback on a decision.
async fn handle_feedback(
    State(state): State<Arc<AppState>>,
    tenant: TenantId,
    body: Result<Json<FeedbackRequest>, JsonRejection>,
) -> (StatusCode, Json<AcceptedResponse>) {
    let feedback = body.map(|Json(f)| f).unwrap_or_default();

    state.context().record(
        tenant.as_str(),
        EventKind::UserFeedbackSubmitted {
            case_id: feedback.case_id().to_string(),
            feedback_type: feedback.feedback_type().to_string(),
        },
    );

    (StatusCode::ACCEPTED, Json(AcceptedResponse::accepted()))
}

/// Liveness check endpoint.
async fn handle_live(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: state.version.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Readiness check endpoint.
async fn handle_ready(State(state): State<Arc<AppState>>) -> Response {
    let context = state.context();
    let loaded = context.loaded_from_file;

    let body = ReadyResponse {
        status: if loaded { "ok" } else { "degraded" },
        config: loaded,
        policy_version: context.policy.version.clone(),
        background_tasks: context.background.in_flight(),
    };

    let status = if loaded {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(body)).into_response()
}

/// Metrics endpoint (Prometheus format).
async fn handle_metrics(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed",
        )
            .into_response(),
    }
}
