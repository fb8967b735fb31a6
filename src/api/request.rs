use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{CasePayload, CaseRequest, CaseType, ExistingAuth};

use super::response::ApiError;

/// Body of `POST /v1/agent/run`.
///
/// Fields are kept loose so that each malformed part maps to its own
/// error code instead of a generic body rejection.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AgentRunRequest {
    /// Used when neither the header nor the query names a tenant
    #[serde(default)]
    pub tenant_id: Option<String>,

    #[serde(default)]
    pub case_type: Option<Value>,

    #[serde(default)]
    pub case_id: Option<Value>,

    #[serde(default)]
    pub payload: Option<Value>,
}

/// Payload as sent by scheduling front-ends. Every field is optional; absent
/// ones are normalized to empty values.
#[derive(Debug, Default, Deserialize)]
struct PayloadRequest {
    #[serde(default)]
    payer: Option<String>,
    #[serde(default)]
    plan_type: Option<String>,
    #[serde(default, alias = "cpt_codes")]
    procedure_codes: Option<Vec<String>>,
    #[serde(default, alias = "icd_codes")]
    diagnosis_codes: Option<Vec<String>>,
    #[serde(default)]
    place_of_service: Option<String>,
    #[serde(default)]
    existing_auth: Option<ExistingAuth>,
    #[serde(default)]
    member_id: Option<String>,
}

impl From<PayloadRequest> for CasePayload {
    fn from(req: PayloadRequest) -> Self {
        CasePayload {
            payer: req.payer.unwrap_or_default(),
            plan_type: req.plan_type.unwrap_or_default(),
            procedure_codes: req.procedure_codes.unwrap_or_default(),
            diagnosis_codes: req.diagnosis_codes.unwrap_or_default(),
            place_of_service: req.place_of_service.unwrap_or_default(),
            existing_auth: req.existing_auth,
            member_id: req.member_id,
        }
    }
}

impl AgentRunRequest {
    /// Validate the envelope and normalize the payload.
    pub fn into_case_request(self) -> Result<CaseRequest, ApiError> {
        let case_type = self
            .case_type
            .as_ref()
            .and_then(Value::as_str)
            .and_then(CaseType::from_label)
            .ok_or(ApiError::InvalidCaseType)?;

        let case_id = match self.case_id {
            Some(Value::String(id)) if !id.trim().is_empty() => id,
            _ => return Err(ApiError::InvalidCaseId),
        };

        let payload = match self.payload {
            Some(value @ Value::Object(_)) => serde_json::from_value::<PayloadRequest>(value)
                .map_err(|_| ApiError::InvalidPayload)?,
            _ => return Err(ApiError::InvalidPayload),
        };

        Ok(CaseRequest {
            case_id,
            case_type,
            payload: payload.into(),
        })
    }
}

/// Query of `GET /v1/events`.
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Kept as text so a malformed value falls back to the default
    #[serde(default)]
    pub limit: Option<String>,
}

impl EventsQuery {
    pub const DEFAULT_LIMIT: usize = 100;
    pub const MAX_LIMIT: usize = 1000;

    /// Requested limit, defaulting to 100 and capped at 1000.
    pub fn limit(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|l| l.trim().parse::<usize>().ok())
            .filter(|l| *l > 0)
            .unwrap_or(Self::DEFAULT_LIMIT)
            .min(Self::MAX_LIMIT)
    }
}

/// Body of `POST /v1/feedback`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FeedbackRequest {
    #[serde(default)]
    pub case_id: Option<String>,
    #[serde(default)]
    pub feedback_type: Option<String>,
}

impl FeedbackRequest {
    const UNKNOWN: &'static str = "unknown";

    pub fn case_id(&self) -> &str {
        non_blank(self.case_id.as_deref()).unwrap_or(Self::UNKNOWN)
    }

    pub fn feedback_type(&self) -> &str {
        non_blank(self.feedback_type.as_deref()).unwrap_or(Self::UNKNOWN)
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<CaseRequest, ApiError> {
        serde_json::from_str::<AgentRunRequest>(json)
            .unwrap()
            .into_case_request()
    }

    #[test]
    fn test_request_normalization() {
        let req = parse(
            r#"{
                "case_type": "scheduling_auth",
                "case_id": "case-1",
                "payload": {
                    "payer": "Aetna",
                    "cpt_codes": ["70553", "70551"],
                    "member_id": "M1"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(req.case_id, "case-1");
        assert_eq!(req.payload.payer, "Aetna");
        assert_eq!(req.payload.plan_type, "");
        assert_eq!(req.payload.first_procedure_code(), Some("70553"));
        assert_eq!(req.payload.member_id(), Some("M1"));
        assert_eq!(req.payload.missing_fields(), vec!["plan_type", "place_of_service"]);
    }

    #[test]
    fn test_envelope_errors() {
        assert!(matches!(
            parse(r#"{"case_type": "refill", "case_id": "c", "payload": {}}"#),
            Err(ApiError::InvalidCaseType)
        ));
        assert!(matches!(
            parse(r#"{"case_id": "c", "payload": {}}"#),
            Err(ApiError::InvalidCaseType)
        ));
        assert!(matches!(
            parse(r#"{"case_type": "scheduling_auth", "case_id": 42, "payload": {}}"#),
            Err(ApiError::InvalidCaseId)
        ));
        assert!(matches!(
            parse(r#"{"case_type": "scheduling_auth", "case_id": "", "payload": {}}"#),
            Err(ApiError::InvalidCaseId)
        ));
        assert!(matches!(
            parse(r#"{"case_type": "scheduling_auth", "case_id": "c"}"#),
            Err(ApiError::InvalidPayload)
        ));
        assert!(matches!(
            parse(r#"{"case_type": "scheduling_auth", "case_id": "c", "payload": "x"}"#),
            Err(ApiError::InvalidPayload)
        ));
    }

    #[test]
    fn test_events_limit() {
        let query = |limit: Option<&str>| EventsQuery {
            tenant_id: None,
            limit: limit.map(str::to_string),
        };

        assert_eq!(query(None).limit(), 100);
        assert_eq!(query(Some("5")).limit(), 5);
        assert_eq!(query(Some("5000")).limit(), 1000);
        assert_eq!(query(Some("abc")).limit(), 100);
        assert_eq!(query(Some("0")).limit(), 100);
    }

    #[test]
    fn test_feedback_defaults() {
        let feedback: FeedbackRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(feedback.case_id(), "unknown");
        assert_eq!(feedback.feedback_type(), "unknown");
    }
}
