use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of case the engine can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseType {
    SchedulingAuth,
}

impl CaseType {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseType::SchedulingAuth => "scheduling_auth",
        }
    }

    /// Parse a wire label; only `scheduling_auth` is supported.
    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "scheduling_auth" => Some(CaseType::SchedulingAuth),
            _ => None,
        }
    }
}

impl fmt::Display for CaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization already on file for the case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingAuth {
    pub status: String,
    #[serde(default)]
    pub expires_at: String,
}

impl ExistingAuth {
    /// Status that lets an `auth_required` rule be satisfied.
    pub const ACTIVE: &'static str = "active";

    pub fn is_active(&self) -> bool {
        self.status == Self::ACTIVE
    }
}

/// Case payload as normalized by the transport binding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CasePayload {
    pub payer: String,
    pub plan_type: String,
    /// Ordered procedure (CPT) codes; only the first drives decisions.
    pub procedure_codes: Vec<String>,
    #[serde(default)]
    pub diagnosis_codes: Vec<String>,
    pub place_of_service: String,
    #[serde(default)]
    pub existing_auth: Option<ExistingAuth>,
    #[serde(default)]
    pub member_id: Option<String>,
}

impl CasePayload {
    /// The procedure code used for rule matching and cache fingerprints.
    pub fn first_procedure_code(&self) -> Option<&str> {
        self.procedure_codes.first().map(String::as_str)
    }

    /// Member id, ignoring blank values.
    pub fn member_id(&self) -> Option<&str> {
        self.member_id
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }

    /// Names of the decision-relevant fields that are absent or blank, in
    /// declaration order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.payer) {
            missing.push("payer");
        }
        if is_blank(&self.plan_type) {
            missing.push("plan_type");
        }
        if self.first_procedure_code().map_or(true, is_blank) {
            missing.push("procedure_codes");
        }
        if is_blank(&self.place_of_service) {
            missing.push("place_of_service");
        }
        missing
    }
}

#[inline]
fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// A single case to resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRequest {
    pub case_id: String,
    pub case_type: CaseType,
    pub payload: CasePayload,
}

impl CaseRequest {
    pub fn scheduling_auth(case_id: impl Into<String>, payload: CasePayload) -> Self {
        CaseRequest {
            case_id: case_id.into(),
            case_type: CaseType::SchedulingAuth,
            payload,
        }
    }

    /// Stable per-case identifier used for experiment bucketing.
    pub fn sticky_key(&self, tenant_id: &str) -> String {
        format!("{}:{}", tenant_id, self.case_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_payload() -> CasePayload {
        CasePayload {
            payer: "Aetna".to_string(),
            plan_type: "HMO".to_string(),
            procedure_codes: vec!["70553".to_string()],
            place_of_service: "Outpatient Center".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_complete_payload_has_no_missing_fields() {
        assert!(complete_payload().missing_fields().is_empty());
    }

    #[test]
    fn test_missing_fields_listed_in_order() {
        let payload = CasePayload {
            payer: "  ".to_string(),
            procedure_codes: vec![],
            ..complete_payload()
        };

        assert_eq!(payload.missing_fields(), vec!["payer", "procedure_codes"]);
    }

    #[test]
    fn test_blank_first_code_counts_as_missing() {
        let payload = CasePayload {
            procedure_codes: vec![" ".to_string(), "70553".to_string()],
            ..complete_payload()
        };

        assert_eq!(payload.missing_fields(), vec!["procedure_codes"]);
    }

    #[test]
    fn test_blank_member_id_ignored() {
        let payload = CasePayload {
            member_id: Some("   ".to_string()),
            ..complete_payload()
        };
        assert_eq!(payload.member_id(), None);
    }

    #[test]
    fn test_case_type_labels() {
        assert_eq!(
            CaseType::from_label("scheduling_auth"),
            Some(CaseType::SchedulingAuth)
        );
        assert_eq!(CaseType::from_label("refill"), None);
        assert_eq!(CaseType::SchedulingAuth.to_string(), "scheduling_auth");
    }

    #[test]
    fn test_sticky_key() {
        let req = CaseRequest::scheduling_auth("case-9", complete_payload());
        assert_eq!(req.sticky_key("tenant-a"), "tenant-a:case-9");
    }
}
