//! Final gate between the orchestrator and the caller.

mod redaction;

pub use redaction::redact;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::domain::decision::clamp_confidence;
use crate::domain::{Decision, EventKind, EvidenceRefs, ExperimentAssignment};
use crate::orchestrator::{DraftResponse, EngineContext, MessageCatalog};

/// Reason recorded when the draft carries an unknown decision label.
pub const INVALID_DECISION_ENUM: &str = "invalid_decision_enum";

/// Reason recorded when `auth_required` has no supporting evidence.
pub const AUTH_REQUIRED_REQUIRES_EVIDENCE: &str = "auth_required_requires_evidence";

/// Verified response returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRunResponse {
    pub decision: Decision,
    pub confidence: f64,
    pub missing_fields: Vec<String>,
    pub evidence_refs: EvidenceRefs,
    pub message: String,
    pub experiment: Option<ExperimentAssignment>,
    pub latency_ms: u64,
}

/// Enforces decision invariants and scrubs the outbound message.
///
/// Violations downgrade the response to `human_review` and replace its
/// message with the `human_review` one; verification never fails.
pub struct Verifier {
    context: Arc<EngineContext>,
    messages: MessageCatalog,
}

impl Verifier {
    pub fn new(context: Arc<EngineContext>) -> Self {
        let messages = MessageCatalog::new(context.policy.messages.clone());
        Verifier { context, messages }
    }

    pub fn verify(&self, tenant_id: &str, case_id: &str, draft: DraftResponse) -> AgentRunResponse {
        let mut downgrade_reason = None;

        let mut decision = match draft.decision.parse::<Decision>() {
            Ok(decision) => decision,
            Err(e) => {
                warn!(tenant_id, case_id, error = %e, "Downgrading invalid decision");
                downgrade_reason = Some(INVALID_DECISION_ENUM);
                Decision::HumanReview
            }
        };

        if decision.requires_evidence() && draft.evidence_refs.is_empty() {
            warn!(tenant_id, case_id, "Downgrading auth_required without evidence");
            downgrade_reason = Some(AUTH_REQUIRED_REQUIRES_EVIDENCE);
            decision = Decision::HumanReview;
        }

        let message = match downgrade_reason {
            Some(_) => {
                self.context.telemetry.increment_verifier_rejects(tenant_id);
                let missing: Vec<&str> = draft.missing_fields.iter().map(String::as_str).collect();
                self.messages.render(decision, &missing)
            }
            None => draft.message,
        };

        self.context.record(
            tenant_id,
            EventKind::VerifierResult {
                case_id: case_id.to_string(),
                passed: downgrade_reason.is_none(),
                downgrade_reason: downgrade_reason.map(str::to_string),
            },
        );

        AgentRunResponse {
            decision,
            confidence: clamp_confidence(draft.confidence),
            missing_fields: draft.missing_fields,
            evidence_refs: draft.evidence_refs,
            message: redact(&message),
            experiment: draft.experiment,
            latency_ms: draft.latency_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EnginePolicy, TelemetryEvent};
    use crate::observability::MetricsRegistry;
    use smallvec::smallvec;

    fn verifier() -> (Verifier, Arc<EngineContext>, Arc<MetricsRegistry>) {
        let metrics = Arc::new(MetricsRegistry::new());
        let context = Arc::new(EngineContext::new(EnginePolicy::fallback(), metrics.clone()));
        (Verifier::new(Arc::clone(&context)), context, metrics)
    }

    fn draft(decision: &str, evidence: EvidenceRefs) -> DraftResponse {
        DraftResponse {
            decision: decision.to_string(),
            confidence: 0.95,
            missing_fields: Vec::new(),
            evidence_refs: evidence,
            message: "Prior authorization is required before this procedure can be scheduled."
                .to_string(),
            experiment: None,
            latency_ms: 3,
        }
    }

    fn last_event(context: &EngineContext) -> TelemetryEvent {
        context.events.read("tenant-a", 1).remove(0)
    }

    #[test]
    fn test_valid_response_passes() {
        let (verifier, context, metrics) = verifier();

        let response = verifier.verify("tenant-a", "case-1", draft("auth_required", smallvec!["rule:R1".to_string()]));

        assert_eq!(response.decision, Decision::AuthRequired);
        assert_eq!(response.confidence, 0.95);
        assert_eq!(metrics.verifier_rejects("tenant-a"), 0);
        assert_eq!(
            last_event(&context).kind,
            EventKind::VerifierResult {
                case_id: "case-1".to_string(),
                passed: true,
                downgrade_reason: None,
            }
        );
    }

    #[test]
    fn test_unknown_decision_downgraded() {
        let (verifier, context, metrics) = verifier();

        let response = verifier.verify("tenant-a", "case-1", draft("maybe_later", EvidenceRefs::new()));

        assert_eq!(response.decision, Decision::HumanReview);
        assert_eq!(metrics.verifier_rejects("tenant-a"), 1);
        assert_eq!(
            last_event(&context).kind,
            EventKind::VerifierResult {
                case_id: "case-1".to_string(),
                passed: false,
                downgrade_reason: Some(INVALID_DECISION_ENUM.to_string()),
            }
        );
    }

    #[test]
    fn test_auth_required_without_evidence_downgraded() {
        let (verifier, context, metrics) = verifier();

        let response = verifier.verify("tenant-a", "case-1", draft("auth_required", EvidenceRefs::new()));

        assert_eq!(response.decision, Decision::HumanReview);
        assert_eq!(metrics.verifier_rejects("tenant-a"), 1);
        match last_event(&context).kind {
            EventKind::VerifierResult {
                passed,
                downgrade_reason,
                ..
            } => {
                assert!(!passed);
                assert_eq!(downgrade_reason.as_deref(), Some(AUTH_REQUIRED_REQUIRES_EVIDENCE));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_downgrade_replaces_message() {
        let (verifier, _, _) = verifier();

        let response = verifier.verify("tenant-a", "case-1", draft("auth_required", EvidenceRefs::new()));

        assert_eq!(response.decision, Decision::HumanReview);
        assert_eq!(
            response.message,
            "This case has been routed to a specialist for review."
        );
    }

    #[test]
    fn test_other_decisions_need_no_evidence() {
        let (verifier, _, metrics) = verifier();

        for label in ["schedule_ok", "docs_missing", "human_review"] {
            let response = verifier.verify("tenant-a", "case-1", draft(label, EvidenceRefs::new()));
            assert_eq!(response.decision.as_str(), label);
        }
        assert_eq!(metrics.verifier_rejects("tenant-a"), 0);
    }

    #[test]
    fn test_message_redacted_and_confidence_clamped() {
        let (verifier, _, _) = verifier();
        let mut input = draft("schedule_ok", smallvec!["rule:R3".to_string()]);
        input.message = "Call 555-123-4567 about the 03/04/2025 visit.".to_string();
        input.confidence = f64::NAN;

        let response = verifier.verify("tenant-a", "case-1", input);

        assert_eq!(response.message, "Call [PHONE_REDACTED] about the [DOB_REDACTED] visit.");
        assert_eq!(response.confidence, 0.0);
    }

    #[test]
    fn test_response_wire_format() {
        let (verifier, _, _) = verifier();

        let response = verifier.verify("tenant-a", "case-1", draft("auth_required", smallvec!["rule:R1".to_string()]));
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["decision"], "auth_required");
        assert_eq!(json["evidence_refs"][0], "rule:R1");
        assert!(json["experiment"].is_null());
        assert!(json["missing_fields"].as_array().unwrap().is_empty());
    }
}
