use crate::domain::evidence::{with_ref, ELIGIBILITY_INACTIVE, EXISTING_AUTH_ACTIVE};
use crate::domain::{Decision, DecisionOutcome, EvidenceRefs, ExistingAuth};
use crate::rules::{PolicyLookupResult, FALLBACK_CONFIDENCE};
use crate::tools::{AuthStatusResult, EligibilityResult};

/// Minimum policy confidence for the early-exit path.
pub const FAST_PATH_MIN_CONFIDENCE: f64 = 0.9;

/// Confidence when an existing active authorization satisfies the rule.
const EXISTING_AUTH_CONFIDENCE: f64 = 0.9;

/// Confidence for review outcomes that still cite a rule.
const RULE_REVIEW_CONFIDENCE: f64 = 0.5;

/// Tool outputs gathered for one case. Absent branches were not dispatched
/// or failed.
#[derive(Debug, Clone)]
pub struct ToolOutputs {
    pub policy: PolicyLookupResult,
    pub eligibility: Option<EligibilityResult>,
    pub auth_status: Option<AuthStatusResult>,
}

/// The decision plus whether it counts toward the human-review metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub outcome: DecisionOutcome,
    pub counts_as_human_review: bool,
}

impl Resolution {
    fn new(decision: Decision, confidence: f64, evidence_refs: EvidenceRefs) -> Self {
        Resolution {
            outcome: DecisionOutcome::new(decision, confidence, evidence_refs),
            counts_as_human_review: false,
        }
    }

    fn human_review(confidence: f64, evidence_refs: EvidenceRefs) -> Self {
        Resolution {
            outcome: DecisionOutcome::new(Decision::HumanReview, confidence, evidence_refs),
            counts_as_human_review: true,
        }
    }
}

/// Whether a policy result is strong enough to skip the standard path.
pub fn qualifies_for_fast_path(policy: &PolicyLookupResult) -> bool {
    policy.is_match()
        && matches!(policy.decision, Decision::ScheduleOk | Decision::AuthRequired)
        && policy.confidence >= FAST_PATH_MIN_CONFIDENCE
}

/// Combine tool outputs into a decision.
///
/// `supplied_auth` is the caller's authorization; it takes precedence over
/// the looked-up one.
pub fn decide(outputs: &ToolOutputs, supplied_auth: Option<&ExistingAuth>) -> Resolution {
    let policy = &outputs.policy;

    match (policy.is_match(), policy.decision) {
        (true, Decision::ScheduleOk) => Resolution::new(
            Decision::ScheduleOk,
            policy.confidence,
            policy.evidence_refs.clone(),
        ),
        (true, Decision::AuthRequired) => {
            let existing = supplied_auth.or_else(|| {
                outputs
                    .auth_status
                    .as_ref()
                    .and_then(|a| a.existing_auth.as_ref())
            });

            if existing.is_some_and(ExistingAuth::is_active) {
                return Resolution::new(
                    Decision::ScheduleOk,
                    EXISTING_AUTH_CONFIDENCE,
                    with_ref(&policy.evidence_refs, EXISTING_AUTH_ACTIVE),
                );
            }

            if outputs.eligibility.is_some_and(|e| !e.coverage_active) {
                return Resolution::human_review(
                    RULE_REVIEW_CONFIDENCE,
                    with_ref(&policy.evidence_refs, ELIGIBILITY_INACTIVE),
                );
            }

            Resolution::new(
                Decision::AuthRequired,
                policy.confidence,
                policy.evidence_refs.clone(),
            )
        }
        (false, Decision::HumanReview) => {
            Resolution::human_review(FALLBACK_CONFIDENCE, EvidenceRefs::new())
        }
        _ => Resolution::new(
            Decision::HumanReview,
            RULE_REVIEW_CONFIDENCE,
            policy.evidence_refs.clone(),
        ),
    }
}
