use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::ExistingAuth;
use crate::experiment::hash_to_bucket;
use crate::rules::RuleTable;

use super::{AuthStatusResult, EligibilityResult, ToolError, ToolHandler, ToolKind, ToolRequest, ToolResult};

/// Validity window of a simulated authorization found by lookup.
const SIMULATED_AUTH_VALIDITY_DAYS: i64 = 180;

async fn simulate_latency(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

/// Simulated 270/271 eligibility check.
///
/// Coverage is active when `tenant:member` hashes to bucket 0 of 2.
#[derive(Debug, Clone)]
pub struct EligibilityCheck {
    latency: Duration,
}

impl EligibilityCheck {
    pub fn new(latency: Duration) -> Self {
        EligibilityCheck { latency }
    }
}

#[async_trait]
impl ToolHandler for EligibilityCheck {
    async fn call(&self, request: &ToolRequest) -> Result<ToolResult, ToolError> {
        let member_id = request
            .member_id
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .ok_or(ToolError::MissingArgument {
                tool: ToolKind::EligibilityCheck,
                argument: "member_id",
            })?;

        simulate_latency(self.latency).await;

        let bucket = hash_to_bucket(&format!("{}:{}", request.tenant_id, member_id), 2);
        Ok(ToolResult::Eligibility(EligibilityResult {
            coverage_active: bucket == 0,
        }))
    }
}

/// Simulated prior-authorization status lookup.
///
/// A caller-supplied authorization is returned immediately. Otherwise the
/// tenant hashing to bucket 0 of 2 has an active authorization on file.
#[derive(Debug, Clone)]
pub struct AuthStatusLookup {
    latency: Duration,
}

impl AuthStatusLookup {
    pub fn new(latency: Duration) -> Self {
        AuthStatusLookup { latency }
    }
}

#[async_trait]
impl ToolHandler for AuthStatusLookup {
    async fn call(&self, request: &ToolRequest) -> Result<ToolResult, ToolError> {
        if let Some(existing) = &request.existing_auth {
            return Ok(ToolResult::AuthStatus(AuthStatusResult {
                existing_auth: Some(existing.clone()),
            }));
        }

        simulate_latency(self.latency).await;

        let existing_auth = (hash_to_bucket(&request.tenant_id, 2) == 0).then(|| {
            let expires = Utc::now() + ChronoDuration::days(SIMULATED_AUTH_VALIDITY_DAYS);
            ExistingAuth {
                status: ExistingAuth::ACTIVE.to_string(),
                expires_at: expires.date_naive().to_string(),
            }
        });

        Ok(ToolResult::AuthStatus(AuthStatusResult { existing_auth }))
    }
}

/// Policy knowledge-base lookup backed by the rule table.
#[derive(Debug, Clone)]
pub struct PolicyLookup {
    rules: Arc<RuleTable>,
    latency: Duration,
}

impl PolicyLookup {
    pub fn new(rules: Arc<RuleTable>, latency: Duration) -> Self {
        PolicyLookup { rules, latency }
    }
}

#[async_trait]
impl ToolHandler for PolicyLookup {
    async fn call(&self, request: &ToolRequest) -> Result<ToolResult, ToolError> {
        simulate_latency(self.latency).await;

        Ok(ToolResult::PolicyLookup(self.rules.evaluate(
            &request.payer,
            &request.plan_type,
            &request.procedure_code,
            &request.place_of_service,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn request(tenant: &str) -> ToolRequest {
        ToolRequest {
            tenant_id: tenant.to_string(),
            case_id: "case-1".to_string(),
            payer: "Aetna".to_string(),
            plan_type: "HMO".to_string(),
            procedure_code: "70553".to_string(),
            place_of_service: "Outpatient Center".to_string(),
            ..Default::default()
        }
    }

    async fn eligibility(tenant: &str, member: &str) -> bool {
        let req = ToolRequest {
            member_id: Some(member.to_string()),
            ..request(tenant)
        };
        EligibilityCheck::new(Duration::ZERO)
            .call(&req)
            .await
            .unwrap()
            .into_eligibility()
            .unwrap()
            .coverage_active
    }

    async fn lookup(req: &ToolRequest, latency: Duration) -> Option<ExistingAuth> {
        AuthStatusLookup::new(latency)
            .call(req)
            .await
            .unwrap()
            .into_auth_status()
            .unwrap()
            .existing_auth
    }

    #[tokio::test]
    async fn test_eligibility_is_deterministic_per_member() {
        assert!(eligibility("tenant-a", "M1").await);
        assert!(!eligibility("tenant-a", "M3").await);
        assert_eq!(eligibility("tenant-a", "M3").await, eligibility("tenant-a", "M3").await);
    }

    #[tokio::test]
    async fn test_eligibility_requires_member_id() {
        let err = EligibilityCheck::new(Duration::ZERO)
            .call(&request("tenant-a"))
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::MissingArgument { argument: "member_id", .. }));
    }

    #[tokio::test]
    async fn test_supplied_auth_returned_without_latency() {
        let req = ToolRequest {
            existing_auth: Some(ExistingAuth {
                status: "pending".to_string(),
                expires_at: String::new(),
            }),
            ..request("tenant-a")
        };

        let start = Instant::now();
        let found = lookup(&req, Duration::from_secs(5)).await;

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(found.unwrap().status, "pending");
    }

    #[tokio::test]
    async fn test_simulated_lookup_by_tenant() {
        // tenant-a hashes to bucket 1, clinic-2 to bucket 0
        assert_eq!(lookup(&request("tenant-a"), Duration::ZERO).await, None);

        let found = lookup(&request("clinic-2"), Duration::ZERO).await.unwrap();
        assert!(found.is_active());
        assert!(!found.expires_at.is_empty());
    }

    #[tokio::test]
    async fn test_policy_lookup_waits_for_latency() {
        let rules = Arc::new(RuleTable::from_policy(&crate::domain::EnginePolicy::fallback()));
        let handler = PolicyLookup::new(rules, Duration::from_millis(20));

        let start = Instant::now();
        let result = handler
            .call(&request("tenant-a"))
            .await
            .unwrap()
            .into_policy()
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(result.rule_id.as_deref(), Some("R1"));
    }
}
