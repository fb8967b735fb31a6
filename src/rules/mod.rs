use serde::{Deserialize, Serialize};
use smallvec::smallvec;

use crate::domain::evidence::{rule_ref, EvidenceRefs};
use crate::domain::policy::PLAN_WILDCARD;
use crate::domain::{Decision, EnginePolicy, RuleDef};

/// Confidence reported when no rule matches.
pub const FALLBACK_CONFIDENCE: f64 = 0.4;

/// Outcome of a policy table lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyLookupResult {
    /// Matched rule, or `None` for the fallback result
    pub rule_id: Option<String>,
    pub decision: Decision,
    pub confidence: f64,
    pub evidence_refs: EvidenceRefs,
}

impl PolicyLookupResult {
    /// Result used when nothing in the table matches.
    pub fn fallback() -> Self {
        PolicyLookupResult {
            rule_id: None,
            decision: Decision::HumanReview,
            confidence: FALLBACK_CONFIDENCE,
            evidence_refs: EvidenceRefs::new(),
        }
    }

    fn from_rule(rule: &RuleDef) -> Self {
        PolicyLookupResult {
            rule_id: Some(rule.id.clone()),
            decision: rule.decision,
            confidence: rule.confidence,
            evidence_refs: smallvec![rule_ref(&rule.id)],
        }
    }

    pub fn is_match(&self) -> bool {
        self.rule_id.is_some()
    }
}

/// Ordered policy table.
///
/// Table order is priority order: the first matching rule wins, even if a
/// later rule is more specific.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<RuleDef>,
    pub version: String,
}

impl RuleTable {
    /// Build the table from engine configuration.
    pub fn from_policy(policy: &EnginePolicy) -> Self {
        RuleTable::new(policy.rules.clone(), policy.version.clone())
    }

    pub fn new(rules: Vec<RuleDef>, version: impl Into<String>) -> Self {
        RuleTable {
            rules,
            version: version.into(),
        }
    }

    /// Create an empty table; every lookup returns the fallback.
    pub fn empty() -> Self {
        RuleTable::new(Vec::new(), "0.0.0")
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Find the first rule matching the (trimmed) inputs.
    pub fn evaluate(
        &self,
        payer: &str,
        plan_type: &str,
        procedure_code: &str,
        place_of_service: &str,
    ) -> PolicyLookupResult {
        let payer = payer.trim();
        let plan_type = plan_type.trim();
        let procedure_code = procedure_code.trim();
        let place_of_service = place_of_service.trim();

        self.rules
            .iter()
            .find(|rule| matches(rule, payer, plan_type, procedure_code, place_of_service))
            .map(PolicyLookupResult::from_rule)
            .unwrap_or_else(PolicyLookupResult::fallback)
    }
}

#[inline]
fn matches(rule: &RuleDef, payer: &str, plan_type: &str, code: &str, pos: &str) -> bool {
    rule.payer == payer
        && (rule.plan_type == PLAN_WILDCARD || rule.plan_type == plan_type)
        && rule.procedure_code == code
        && rule
            .pos_contains
            .as_deref()
            .map_or(true, |fragment| pos.contains(fragment))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_table() -> RuleTable {
        RuleTable::from_policy(&EnginePolicy::fallback())
    }

    #[test]
    fn test_medicare_wildcard_plan() {
        let result = default_table().evaluate("Medicare", "X", "99213", "Office");

        assert_eq!(result.rule_id.as_deref(), Some("R3"));
        assert_eq!(result.decision, Decision::ScheduleOk);
        assert_eq!(result.confidence, 0.95);
        assert_eq!(result.evidence_refs.as_slice(), ["rule:R3"]);
    }

    #[test]
    fn test_place_of_service_substring() {
        let table = default_table();

        let hit = table.evaluate("Aetna", "HMO", "70553", "Outpatient Center");
        assert_eq!(hit.rule_id.as_deref(), Some("R1"));
        assert_eq!(hit.decision, Decision::AuthRequired);

        let miss = table.evaluate("Aetna", "HMO", "70553", "Inpatient Hospital");
        assert!(!miss.is_match());
    }

    #[test]
    fn test_inputs_are_trimmed() {
        let result = default_table().evaluate("  Medicare ", " PPO", " 99213 ", " Office ");
        assert_eq!(result.rule_id.as_deref(), Some("R3"));
    }

    #[test]
    fn test_no_match_falls_back_to_review() {
        let result = default_table().evaluate("Unknown", "HMO", "00000", "Office");

        assert_eq!(result, PolicyLookupResult::fallback());
        assert_eq!(result.decision, Decision::HumanReview);
        assert_eq!(result.confidence, 0.4);
        assert!(result.evidence_refs.is_empty());
    }

    #[test]
    fn test_first_match_wins_over_more_specific() {
        let table = RuleTable::new(
            vec![
                RuleDef::new("BROAD", "Cigna", PLAN_WILDCARD, "12345", Decision::ScheduleOk, 0.8),
                RuleDef::new("NARROW", "Cigna", "HMO", "12345", Decision::AuthRequired, 0.99)
                    .with_pos_contains("Office"),
            ],
            "t",
        );

        let result = table.evaluate("Cigna", "HMO", "12345", "Office");

        assert_eq!(result.rule_id.as_deref(), Some("BROAD"));
        assert_eq!(result.decision, Decision::ScheduleOk);
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let result = default_table().evaluate("medicare", "X", "99213", "Office");
        assert!(!result.is_match());
    }

    #[test]
    fn test_empty_table() {
        let table = RuleTable::empty();
        assert!(table.is_empty());
        assert!(!table.evaluate("Medicare", "X", "99213", "Office").is_match());
    }
}
