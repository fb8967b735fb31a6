use smallvec::SmallVec;

/// Opaque strings citing the rule or fact behind a decision.
///
/// Most decisions cite one rule plus at most one fact, so two inline slots
/// avoid a heap allocation in the common case.
pub type EvidenceRefs = SmallVec<[String; 2]>;

/// Evidence ref cited when an active authorization already exists.
pub const EXISTING_AUTH_ACTIVE: &str = "existing_auth:active";

/// Evidence ref cited when eligibility came back with inactive coverage.
pub const ELIGIBILITY_INACTIVE: &str = "eligibility:inactive";

/// Evidence ref for a matched rule.
pub fn rule_ref(rule_id: &str) -> String {
    format!("rule:{}", rule_id)
}

/// Copy `base` and append one more ref.
pub fn with_ref(base: &EvidenceRefs, extra: &str) -> EvidenceRefs {
    let mut refs = base.clone();
    refs.push(extra.to_string());
    refs
}
