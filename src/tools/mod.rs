//! Verification capabilities invoked by the orchestrator.
//!
//! Each capability is a [`ToolHandler`] registered under a [`ToolKind`].
//! The dispatcher times every invocation and reports it to a completion
//! hook, whether the call succeeds or fails.

pub mod handlers;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::domain::policy::ToolSettings;
use crate::domain::ExistingAuth;
use crate::rules::{PolicyLookupResult, RuleTable};

pub use handlers::{AuthStatusLookup, EligibilityCheck, PolicyLookup};

/// Named verification capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    EligibilityCheck,
    AuthStatusLookup,
    PolicyLookup,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [
        ToolKind::EligibilityCheck,
        ToolKind::AuthStatusLookup,
        ToolKind::PolicyLookup,
    ];

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::EligibilityCheck => "eligibility_check",
            ToolKind::AuthStatusLookup => "auth_status_lookup",
            ToolKind::PolicyLookup => "policy_lookup",
        }
    }
}

impl FromStr for ToolKind {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ToolError::UnknownTool(s.to_string()))
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors scoped to a single tool invocation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("no handler registered for {0}")]
    NotRegistered(ToolKind),

    #[error("{argument} required for {tool}")]
    MissingArgument {
        tool: ToolKind,
        argument: &'static str,
    },

    #[error("{tool} failed: {message}")]
    Failed { tool: ToolKind, message: String },

    #[error("{tool} task did not complete: {message}")]
    Join { tool: ToolKind, message: String },
}

/// Inputs shared by every tool call for one case.
#[derive(Debug, Clone, Default)]
pub struct ToolRequest {
    pub tenant_id: String,
    pub case_id: String,
    pub member_id: Option<String>,
    pub existing_auth: Option<ExistingAuth>,
    pub payer: String,
    pub plan_type: String,
    pub procedure_code: String,
    pub place_of_service: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityResult {
    pub coverage_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatusResult {
    pub existing_auth: Option<ExistingAuth>,
}

/// Result of a tool call, tagged by the tool that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolResult {
    PolicyLookup(PolicyLookupResult),
    Eligibility(EligibilityResult),
    AuthStatus(AuthStatusResult),
}

impl ToolResult {
    pub fn into_policy(self) -> Option<PolicyLookupResult> {
        match self {
            ToolResult::PolicyLookup(result) => Some(result),
            _ => None,
        }
    }

    pub fn into_eligibility(self) -> Option<EligibilityResult> {
        match self {
            ToolResult::Eligibility(result) => Some(result),
            _ => None,
        }
    }

    pub fn into_auth_status(self) -> Option<AuthStatusResult> {
        match self {
            ToolResult::AuthStatus(result) => Some(result),
            _ => None,
        }
    }
}

/// A verification capability.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, request: &ToolRequest) -> Result<ToolResult, ToolError>;
}

/// Called with the tool name and elapsed time after every invocation.
pub type CompletionHook = Arc<dyn Fn(&str, Duration) + Send + Sync>;

/// Concurrency-safe façade over the registered capabilities.
///
/// Handlers are immutable after construction, so one dispatcher can serve
/// any number of concurrent calls.
#[derive(Clone)]
pub struct ToolDispatcher {
    handlers: HashMap<ToolKind, Arc<dyn ToolHandler>>,
}

impl ToolDispatcher {
    /// Dispatcher with no capabilities registered.
    pub fn empty() -> Self {
        ToolDispatcher {
            handlers: HashMap::new(),
        }
    }

    /// Dispatcher with the three simulated capabilities.
    pub fn simulated(rules: Arc<RuleTable>, settings: &ToolSettings) -> Self {
        ToolDispatcher::empty()
            .with_handler(
                ToolKind::EligibilityCheck,
                Arc::new(EligibilityCheck::new(settings.eligibility_check.as_duration())),
            )
            .with_handler(
                ToolKind::AuthStatusLookup,
                Arc::new(AuthStatusLookup::new(settings.auth_status_lookup.as_duration())),
            )
            .with_handler(
                ToolKind::PolicyLookup,
                Arc::new(PolicyLookup::new(rules, settings.policy_lookup.as_duration())),
            )
    }

    /// Register or replace the handler for a capability.
    pub fn with_handler(mut self, kind: ToolKind, handler: Arc<dyn ToolHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn is_registered(&self, kind: ToolKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Invoke a capability and report its duration to `on_complete`.
    ///
    /// The report is made even if the handler panics.
    pub async fn invoke(
        &self,
        kind: ToolKind,
        request: &ToolRequest,
        on_complete: &CompletionHook,
    ) -> Result<ToolResult, ToolError> {
        let _report = CompletionReport {
            tool_name: kind.as_str(),
            start: Instant::now(),
            on_complete,
        };

        match self.handlers.get(&kind) {
            Some(handler) => handler.call(request).await,
            None => Err(ToolError::NotRegistered(kind)),
        }
    }

    /// Invoke a capability by wire name.
    ///
    /// An unknown name fails this call only; it is still reported to the
    /// completion hook.
    pub async fn invoke_named(
        &self,
        name: &str,
        request: &ToolRequest,
        on_complete: &CompletionHook,
    ) -> Result<ToolResult, ToolError> {
        match name.parse::<ToolKind>() {
            Ok(kind) => self.invoke(kind, request, on_complete).await,
            Err(e) => {
                on_complete(name, Duration::ZERO);
                Err(e)
            }
        }
    }
}

/// Reports one invocation to the completion hook when dropped.
struct CompletionReport<'a> {
    tool_name: &'static str,
    start: Instant,
    on_complete: &'a CompletionHook,
}

impl Drop for CompletionReport<'_> {
    fn drop(&mut self) {
        (self.on_complete)(self.tool_name, self.start.elapsed());
    }
}
