use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::Decision;

/// Wildcard accepted in a rule's `plan_type`.
pub const PLAN_WILDCARD: &str = "*";

/// Engine configuration: rule table, experiments, TTLs, tool latencies and
/// message templates. Loaded once at start-up and never reloaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnginePolicy {
    /// Configuration version identifier
    pub version: String,

    /// Ordered rule table; earlier rules take priority
    #[serde(default)]
    pub rules: Vec<RuleDef>,

    /// Experiment definitions; the first eligible one is used
    #[serde(default)]
    pub experiments: Vec<ExperimentDef>,

    /// Experiment whose treatment arm takes the early-exit path
    #[serde(default = "default_fast_path_experiment")]
    pub fast_path_experiment: String,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub tools: ToolSettings,

    #[serde(default)]
    pub events: EventSettings,

    #[serde(default)]
    pub messages: MessageTemplates,
}

fn default_fast_path_experiment() -> String {
    "EXP-A2".to_string()
}

impl EnginePolicy {
    /// Hard-coded configuration used when the file cannot be loaded.
    pub fn fallback() -> Self {
        EnginePolicy {
            version: "fallback".to_string(),
            rules: vec![
                RuleDef::new("R1", "Aetna", "HMO", "70553", Decision::AuthRequired, 0.95)
                    .with_pos_contains("Outpatient"),
                RuleDef::new("R2", "United", "PPO", "93306", Decision::AuthRequired, 0.95),
                RuleDef::new("R3", "Medicare", PLAN_WILDCARD, "99213", Decision::ScheduleOk, 0.95),
            ],
            experiments: vec![ExperimentDef {
                id: "EXP-A2".to_string(),
                enabled: true,
                case_types: vec!["scheduling_auth".to_string()],
                control_bucket_end: 50,
                treatment_bucket_end: 100,
            }],
            fast_path_experiment: default_fast_path_experiment(),
            cache: CacheSettings::default(),
            tools: ToolSettings::default(),
            events: EventSettings::default(),
            messages: MessageTemplates::default(),
        }
    }
}

/// A single rule in the ordered policy table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDef {
    /// Unique rule identifier
    pub id: String,
    pub payer: String,
    /// Exact plan type, or `*` for any
    pub plan_type: String,
    pub procedure_code: String,
    /// Substring the place of service must contain, if set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos_contains: Option<String>,
    pub decision: Decision,
    pub confidence: f64,
}

impl RuleDef {
    pub fn new(
        id: impl Into<String>,
        payer: impl Into<String>,
        plan_type: impl Into<String>,
        procedure_code: impl Into<String>,
        decision: Decision,
        confidence: f64,
    ) -> Self {
        RuleDef {
            id: id.into(),
            payer: payer.into(),
            plan_type: plan_type.into(),
            procedure_code: procedure_code.into(),
            pos_contains: None,
            decision,
            confidence,
        }
    }

    pub fn with_pos_contains(mut self, fragment: impl Into<String>) -> Self {
        self.pos_contains = Some(fragment.into());
        self
    }
}

/// Experiment definition with bucket boundaries in `0..=100`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentDef {
    pub id: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub case_types: Vec<String>,
    /// Buckets below this are control
    pub control_bucket_end: u8,
    /// Buckets from `control_bucket_end` up to (not including) this are treatment
    pub treatment_bucket_end: u8,
}

/// Cache TTLs per decision source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_rules_decision_ttl_secs")]
    pub rules_decision_ttl_secs: u64,
}

fn default_rules_decision_ttl_secs() -> u64 {
    300
}

impl CacheSettings {
    pub fn rules_decision_ttl(&self) -> Duration {
        Duration::from_secs(self.rules_decision_ttl_secs)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            rules_decision_ttl_secs: default_rules_decision_ttl_secs(),
        }
    }
}

/// Simulated latency of one tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolLatency {
    pub simulated_latency_ms: u64,
}

impl ToolLatency {
    pub fn from_millis(ms: u64) -> Self {
        ToolLatency {
            simulated_latency_ms: ms,
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.simulated_latency_ms)
    }
}

/// Per-tool simulated latencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    #[serde(default = "default_eligibility_latency")]
    pub eligibility_check: ToolLatency,
    #[serde(default = "default_auth_status_latency")]
    pub auth_status_lookup: ToolLatency,
    #[serde(default = "default_policy_latency")]
    pub policy_lookup: ToolLatency,
}

fn default_eligibility_latency() -> ToolLatency {
    ToolLatency::from_millis(50)
}

fn default_auth_status_latency() -> ToolLatency {
    ToolLatency::from_millis(30)
}

fn default_policy_latency() -> ToolLatency {
    ToolLatency::from_millis(20)
}

impl ToolSettings {
    /// All tools with no simulated latency.
    pub fn instant() -> Self {
        ToolSettings {
            eligibility_check: ToolLatency::from_millis(0),
            auth_status_lookup: ToolLatency::from_millis(0),
            policy_lookup: ToolLatency::from_millis(0),
        }
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        ToolSettings {
            eligibility_check: default_eligibility_latency(),
            auth_status_lookup: default_auth_status_latency(),
            policy_lookup: default_policy_latency(),
        }
    }
}

/// Event buffer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSettings {
    #[serde(default = "default_capacity_per_tenant")]
    pub capacity_per_tenant: usize,
}

fn default_capacity_per_tenant() -> usize {
    10_000
}

impl Default for EventSettings {
    fn default() -> Self {
        EventSettings {
            capacity_per_tenant: default_capacity_per_tenant(),
        }
    }
}

/// Scheduler message templates keyed by decision label.
///
/// Templates may contain `{missing_fields}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTemplates {
    #[serde(default = "default_templates")]
    pub templates: HashMap<String, String>,
    #[serde(default = "default_fallback_message")]
    pub fallback: String,
}

fn default_templates() -> HashMap<String, String> {
    HashMap::from([
        (
            "schedule_ok".to_string(),
            "Scheduling can proceed; no prior authorization is needed.".to_string(),
        ),
        (
            "auth_required".to_string(),
            "Prior authorization is required before this procedure can be scheduled.".to_string(),
        ),
        (
            "docs_missing".to_string(),
            "The case is missing required information: {missing_fields}.".to_string(),
        ),
        (
            "human_review".to_string(),
            "This case has been routed to a specialist for review.".to_string(),
        ),
    ])
}

fn default_fallback_message() -> String {
    "Contact support.".to_string()
}

impl Default for MessageTemplates {
    fn default() -> Self {
        MessageTemplates {
            templates: default_templates(),
            fallback: default_fallback_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_deserialization() {
        let yaml = r#"
version: "2025-06-01.1"
rules:
  - id: R1
    payer: Aetna
    plan_type: HMO
    procedure_code: "70553"
    pos_contains: Outpatient
    decision: auth_required
    confidence: 0.95
  - id: R3
    payer: Medicare
    plan_type: "*"
    procedure_code: "99213"
    decision: schedule_ok
    confidence: 0.95
experiments:
  - id: EXP-A2
    enabled: true
    case_types: [scheduling_auth]
    control_bucket_end: 50
    treatment_bucket_end: 100
tools:
  policy_lookup:
    simulated_latency_ms: 5
"#;

        let policy: EnginePolicy = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(policy.version, "2025-06-01.1");
        assert_eq!(policy.rules.len(), 2);
        assert_eq!(policy.rules[0].decision, Decision::AuthRequired);
        assert_eq!(policy.rules[0].pos_contains.as_deref(), Some("Outpatient"));
        assert_eq!(policy.rules[1].pos_contains, None);
        assert_eq!(policy.fast_path_experiment, "EXP-A2");
        assert_eq!(policy.tools.policy_lookup.simulated_latency_ms, 5);
        // Unspecified sections fall back to defaults
        assert_eq!(policy.tools.eligibility_check.simulated_latency_ms, 50);
        assert_eq!(policy.cache.rules_decision_ttl_secs, 300);
        assert_eq!(policy.events.capacity_per_tenant, 10_000);
        assert!(policy.messages.templates.contains_key("docs_missing"));
    }

    #[test]
    fn test_unknown_decision_rejected() {
        let yaml = r#"
version: "v1"
rules:
  - id: R1
    payer: Aetna
    plan_type: HMO
    procedure_code: "70553"
    decision: approve
    confidence: 0.95
"#;
        assert!(serde_yaml::from_str::<EnginePolicy>(yaml).is_err());
    }

    #[test]
    fn test_fallback_table() {
        let policy = EnginePolicy::fallback();

        let ids: Vec<_> = policy.rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["R1", "R2", "R3"]);
        assert_eq!(policy.experiments[0].id, "EXP-A2");
        assert_eq!(policy.cache.rules_decision_ttl(), Duration::from_secs(300));
    }
}
