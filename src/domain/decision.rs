use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::evidence::EvidenceRefs;

/// Scheduling authorization outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Procedure can be scheduled without further action
    ScheduleOk,
    /// Prior authorization must be obtained first
    AuthRequired,
    /// Required case fields were not supplied
    DocsMissing,
    /// A person has to look at the case
    HumanReview,
}

impl Decision {
    /// All decisions, in declaration order.
    pub const ALL: [Decision; 4] = [
        Decision::ScheduleOk,
        Decision::AuthRequired,
        Decision::DocsMissing,
        Decision::HumanReview,
    ];

    /// Wire label of the decision.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::ScheduleOk => "schedule_ok",
            Decision::AuthRequired => "auth_required",
            Decision::DocsMissing => "docs_missing",
            Decision::HumanReview => "human_review",
        }
    }

    /// Returns true if evidence refs are mandatory for this decision.
    #[inline]
    pub fn requires_evidence(&self) -> bool {
        *self == Decision::AuthRequired
    }
}

impl FromStr for Decision {
    type Err = UnknownDecision;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "schedule_ok" => Ok(Decision::ScheduleOk),
            "auth_required" => Ok(Decision::AuthRequired),
            "docs_missing" => Ok(Decision::DocsMissing),
            "human_review" => Ok(Decision::HumanReview),
            other => Err(UnknownDecision(other.to_string())),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label that does not name one of the four decisions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown decision label: {0}")]
pub struct UnknownDecision(pub String);

/// A resolved decision with its confidence and supporting evidence.
///
/// This is also the snapshot stored in the decision cache, so a cache hit
/// reproduces the stored outcome verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub decision: Decision,
    pub confidence: f64,
    pub evidence_refs: EvidenceRefs,
}

impl DecisionOutcome {
    pub fn new(decision: Decision, confidence: f64, evidence_refs: EvidenceRefs) -> Self {
        DecisionOutcome {
            decision,
            confidence: clamp_confidence(confidence),
            evidence_refs,
        }
    }
}

/// Clamp a confidence into `[0, 1]`; NaN becomes 0.
#[inline]
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_serialization() {
        let json = serde_json::to_string(&Decision::AuthRequired).unwrap();
        assert_eq!(json, "\"auth_required\"");

        let parsed: Decision = serde_json::from_str("\"human_review\"").unwrap();
        assert_eq!(parsed, Decision::HumanReview);
    }

    #[test]
    fn test_from_str_matches_labels() {
        for decision in Decision::ALL {
            assert_eq!(decision.as_str().parse::<Decision>(), Ok(decision));
        }
        assert!("approve".parse::<Decision>().is_err());
    }

    #[test]
    fn test_only_auth_required_needs_evidence() {
        let needing: Vec<_> = Decision::ALL
            .into_iter()
            .filter(Decision::requires_evidence)
            .collect();
        assert_eq!(needing, vec![Decision::AuthRequired]);
    }

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(clamp_confidence(1.4), 1.0);
        assert_eq!(clamp_confidence(-0.1), 0.0);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
        assert_eq!(clamp_confidence(0.95), 0.95);
    }
}
