use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Decision;

/// Unique event identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn new() -> Self {
        EventId(Uuid::new_v4().to_string())
    }
}

impl Default for EventId {
    fn default() -> Self {
        EventId::new()
    }
}

/// Lifecycle event recorded per tenant.
///
/// Events never carry PHI: no payer, member, or procedure data, only ids,
/// outcomes, and timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub event_id: EventId,
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Event-specific fields, tagged by `event_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum EventKind {
    DecisionProduced {
        case_id: String,
        case_type: String,
        decision: Decision,
        confidence: f64,
    },
    VerifierResult {
        case_id: String,
        passed: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        downgrade_reason: Option<String>,
    },
    ToolCallCompleted {
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        case_id: Option<String>,
        duration_ms: u64,
    },
    UserFeedbackSubmitted {
        case_id: String,
        feedback_type: String,
    },
}

impl EventKind {
    /// The `event_type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::DecisionProduced { .. } => "DecisionProduced",
            EventKind::VerifierResult { .. } => "VerifierResult",
            EventKind::ToolCallCompleted { .. } => "ToolCallCompleted",
            EventKind::UserFeedbackSubmitted { .. } => "UserFeedbackSubmitted",
        }
    }
}

impl TelemetryEvent {
    /// Stamp an event for a tenant with the current time.
    pub fn new(tenant_id: impl Into<String>, kind: EventKind) -> Self {
        TelemetryEvent {
            event_id: EventId::new(),
            tenant_id: tenant_id.into(),
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.name()
    }
}
