//! Per-case decision orchestration.
//!
//! The orchestrator validates the payload, consults the decision cache,
//! fans out to the verification tools, and folds their results into a
//! draft response. Tool calls run as supervised background tasks so a call
//! the orchestrator stops waiting for still records its latency and event.

pub mod background;
pub mod decision;
pub mod messages;

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, field, info, info_span, warn, Instrument, Span};

use crate::cache::{CacheKey, DecisionCache};
use crate::domain::{
    CaseRequest, Decision, DecisionOutcome, EnginePolicy, EventKind, EvidenceRefs,
    ExperimentAssignment, TelemetryEvent, Variant,
};
use crate::events::EventRecorder;
use crate::experiment::ExperimentAssigner;
use crate::observability::{RequestLabels, TelemetrySink};
use crate::rules::{PolicyLookupResult, RuleTable};
use crate::tools::{CompletionHook, ToolDispatcher, ToolError, ToolKind, ToolRequest, ToolResult};

pub use background::BackgroundTasks;
pub use decision::{decide, qualifies_for_fast_path, Resolution, ToolOutputs};
pub use messages::MessageCatalog;

/// Orchestration failures surfaced to the transport binding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("tenant id must not be empty")]
    EmptyTenant,

    #[error("case id must not be empty")]
    EmptyCaseId,
}

/// Process-scoped engine state, created once at start-up.
pub struct EngineContext {
    pub policy: Arc<EnginePolicy>,
    pub cache: DecisionCache<DecisionOutcome>,
    pub events: Arc<EventRecorder>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub background: BackgroundTasks,
    /// False when the hard-coded fallback configuration is in use
    pub loaded_from_file: bool,
}

impl EngineContext {
    pub fn new(policy: EnginePolicy, telemetry: Arc<dyn TelemetrySink>) -> Self {
        let events = Arc::new(EventRecorder::new(policy.events.capacity_per_tenant));
        EngineContext {
            policy: Arc::new(policy),
            cache: DecisionCache::new(),
            events,
            telemetry,
            background: BackgroundTasks::new(),
            loaded_from_file: false,
        }
    }

    /// Mark whether the configuration came from the engine config file.
    pub fn with_source(mut self, loaded_from_file: bool) -> Self {
        self.loaded_from_file = loaded_from_file;
        self
    }

    pub fn record(&self, tenant_id: &str, kind: EventKind) {
        self.events.append(TelemetryEvent::new(tenant_id, kind));
    }
}

/// Orchestrator output before verification. The decision is carried as its
/// wire label; the verifier turns it back into a [`Decision`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftResponse {
    pub decision: String,
    pub confidence: f64,
    pub missing_fields: Vec<String>,
    pub evidence_refs: EvidenceRefs,
    pub message: String,
    pub experiment: Option<ExperimentAssignment>,
    pub latency_ms: u64,
}

/// Resolves scheduling-authorization cases.
pub struct Orchestrator {
    context: Arc<EngineContext>,
    dispatcher: Arc<ToolDispatcher>,
    assigner: ExperimentAssigner,
    messages: MessageCatalog,
}

impl Orchestrator {
    /// Orchestrator backed by the simulated tools.
    pub fn new(context: Arc<EngineContext>) -> Self {
        let rules = Arc::new(RuleTable::from_policy(&context.policy));
        let dispatcher = ToolDispatcher::simulated(rules, &context.policy.tools);
        Orchestrator::with_dispatcher(context, dispatcher)
    }

    pub fn with_dispatcher(context: Arc<EngineContext>, dispatcher: ToolDispatcher) -> Self {
        let assigner = ExperimentAssigner::from_policy(&context.policy);
        let messages = MessageCatalog::new(context.policy.messages.clone());
        Orchestrator {
            context,
            dispatcher: Arc::new(dispatcher),
            assigner,
            messages,
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    /// Resolve one case for a tenant.
    pub async fn run(
        &self,
        tenant_id: &str,
        request: &CaseRequest,
    ) -> Result<DraftResponse, EngineError> {
        let span = info_span!(
            "scheduler_auth.run",
            tenant_id = %tenant_id,
            case_id = %request.case_id,
            decision = field::Empty,
            cache_hit = field::Empty,
            early_exit = field::Empty,
        );

        async move {
            let result = self.resolve(tenant_id.trim(), request).await;
            match &result {
                Ok(draft) => {
                    Span::current().record("decision", draft.decision.as_str());
                    info!(
                        decision = %draft.decision,
                        latency_ms = draft.latency_ms,
                        "Case resolved"
                    );
                }
                Err(e) => error!(error = %e, "Orchestration failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn resolve(
        &self,
        tenant_id: &str,
        request: &CaseRequest,
    ) -> Result<DraftResponse, EngineError> {
        let start = Instant::now();

        if tenant_id.is_empty() {
            return Err(EngineError::EmptyTenant);
        }
        if request.case_id.trim().is_empty() {
            return Err(EngineError::EmptyCaseId);
        }

        let case_type = request.case_type.as_str();
        let experiment = self
            .assigner
            .assign(case_type, &request.sticky_key(tenant_id));
        let payload = &request.payload;

        // Validation
        let missing = payload.missing_fields();
        if !missing.is_empty() {
            let outcome = DecisionOutcome::new(Decision::DocsMissing, 1.0, EvidenceRefs::new());
            let latency_ms = self.observe_latency(tenant_id, case_type, experiment.as_ref(), start);
            return Ok(self.draft(outcome, &missing, experiment, latency_ms));
        }

        let procedure_code = payload.first_procedure_code().unwrap_or_default().trim();
        let cache_key = CacheKey::rules_decision(
            tenant_id,
            payload.payer.trim(),
            payload.plan_type.trim(),
            procedure_code,
            payload.place_of_service.trim(),
        );

        if let Some(outcome) = self.context.cache.get(&cache_key) {
            Span::current().record("cache_hit", true);
            debug!(key = %cache_key, "Decision cache hit");
            self.record_decision(tenant_id, request, &outcome);
            let latency_ms = self.observe_latency(tenant_id, case_type, experiment.as_ref(), start);
            return Ok(self.draft(outcome, &[], experiment, latency_ms));
        }
        Span::current().record("cache_hit", false);

        let tool_request = Arc::new(ToolRequest {
            tenant_id: tenant_id.to_string(),
            case_id: request.case_id.clone(),
            member_id: payload.member_id().map(str::to_string),
            existing_auth: payload.existing_auth.clone(),
            payer: payload.payer.trim().to_string(),
            plan_type: payload.plan_type.trim().to_string(),
            procedure_code: procedure_code.to_string(),
            place_of_service: payload.place_of_service.trim().to_string(),
        });
        let hook = self.completion_hook(tenant_id, &request.case_id);

        let mut policy_task = Some(self.spawn_tool(ToolKind::PolicyLookup, &tool_request, &hook));
        let eligibility_task = payload
            .member_id()
            .map(|_| self.spawn_tool(ToolKind::EligibilityCheck, &tool_request, &hook));
        let auth_task = payload
            .existing_auth
            .is_none()
            .then(|| self.spawn_tool(ToolKind::AuthStatusLookup, &tool_request, &hook));

        let fast_path = experiment
            .as_ref()
            .is_some_and(|a| a.is_treatment_of(&self.context.policy.fast_path_experiment));

        let mut early_policy = None;
        if fast_path {
            if let Some(task) = policy_task.take() {
                early_policy = settle(ToolKind::PolicyLookup, task)
                    .await
                    .and_then(ToolResult::into_policy);
            }
        }
        let early_exit = early_policy.as_ref().is_some_and(qualifies_for_fast_path);
        Span::current().record("early_exit", early_exit);

        let policy = match (early_policy, policy_task) {
            (Some(policy), _) => policy,
            (None, Some(task)) => settle(ToolKind::PolicyLookup, task)
                .await
                .and_then(ToolResult::into_policy)
                .unwrap_or_else(PolicyLookupResult::fallback),
            (None, None) => PolicyLookupResult::fallback(),
        };

        let (eligibility, auth_status) = tokio::join!(
            settle_optional(ToolKind::EligibilityCheck, eligibility_task),
            settle_optional(ToolKind::AuthStatusLookup, auth_task),
        );

        let outputs = ToolOutputs {
            policy,
            eligibility: eligibility.and_then(ToolResult::into_eligibility),
            auth_status: auth_status.and_then(ToolResult::into_auth_status),
        };

        let resolution = decide(&outputs, payload.existing_auth.as_ref());
        if resolution.counts_as_human_review {
            self.context
                .telemetry
                .increment_human_review(tenant_id, case_type);
        }

        let outcome = resolution.outcome;
        self.context.cache.set(
            cache_key,
            outcome.clone(),
            self.context.policy.cache.rules_decision_ttl(),
        );
        self.record_decision(tenant_id, request, &outcome);

        let latency_ms = self.observe_latency(tenant_id, case_type, experiment.as_ref(), start);
        Ok(self.draft(outcome, &[], experiment, latency_ms))
    }

    fn spawn_tool(
        &self,
        kind: ToolKind,
        request: &Arc<ToolRequest>,
        hook: &CompletionHook,
    ) -> JoinHandle<Result<ToolResult, ToolError>> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let request = Arc::clone(request);
        let hook = Arc::clone(hook);

        self.context.background.spawn(kind.as_str(), async move {
            dispatcher.invoke(kind, &request, &hook).await
        })
    }

    /// Hook that records tool latency and a `ToolCallCompleted` event.
    fn completion_hook(&self, tenant_id: &str, case_id: &str) -> CompletionHook {
        let context = Arc::clone(&self.context);
        let tenant_id = tenant_id.to_string();
        let case_id = case_id.to_string();

        Arc::new(move |tool_name: &str, elapsed: Duration| {
            context
                .telemetry
                .observe_tool_latency(&tenant_id, tool_name, as_millis_f64(elapsed));
            context.record(
                &tenant_id,
                EventKind::ToolCallCompleted {
                    tool_name: tool_name.to_string(),
                    case_id: Some(case_id.clone()),
                    duration_ms: elapsed.as_millis() as u64,
                },
            );
        })
    }

    fn record_decision(&self, tenant_id: &str, request: &CaseRequest, outcome: &DecisionOutcome) {
        self.context.record(
            tenant_id,
            EventKind::DecisionProduced {
                case_id: request.case_id.clone(),
                case_type: request.case_type.as_str().to_string(),
                decision: outcome.decision,
                confidence: outcome.confidence,
            },
        );
    }

    fn observe_latency(
        &self,
        tenant_id: &str,
        case_type: &str,
        experiment: Option<&ExperimentAssignment>,
        start: Instant,
    ) -> u64 {
        let elapsed = start.elapsed();
        let labels = RequestLabels {
            tenant_id: tenant_id.to_string(),
            case_type: case_type.to_string(),
            experiment_id: experiment.map(|a| a.experiment_id.clone()).unwrap_or_default(),
            variant: experiment
                .map_or(Variant::Control, |a| a.variant)
                .as_str()
                .to_string(),
        };
        self.context
            .telemetry
            .observe_request_latency(&labels, as_millis_f64(elapsed));
        elapsed.as_millis() as u64
    }

    fn draft(
        &self,
        outcome: DecisionOutcome,
        missing_fields: &[&str],
        experiment: Option<ExperimentAssignment>,
        latency_ms: u64,
    ) -> DraftResponse {
        DraftResponse {
            decision: outcome.decision.as_str().to_string(),
            confidence: outcome.confidence,
            missing_fields: missing_fields.iter().map(|f| f.to_string()).collect(),
            message: self.messages.render(outcome.decision, missing_fields),
            evidence_refs: outcome.evidence_refs,
            experiment,
            latency_ms,
        }
    }
}

#[inline]
fn as_millis_f64(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

/// Await a tool task; a failed or panicked call yields `None`.
async fn settle(
    kind: ToolKind,
    task: JoinHandle<Result<ToolResult, ToolError>>,
) -> Option<ToolResult> {
    match task.await {
        Ok(Ok(result)) => Some(result),
        Ok(Err(e)) => {
            debug!(tool = %kind, error = %e, "Tool branch absent");
            None
        }
        Err(e) => {
            let err = ToolError::Join {
                tool: kind,
                message: e.to_string(),
            };
            warn!(error = %err, "Tool branch absent");
            None
        }
    }
}

async fn settle_optional(
    kind: ToolKind,
    task: Option<JoinHandle<Result<ToolResult, ToolError>>>,
) -> Option<ToolResult> {
    match task {
        Some(task) => settle(kind, task).await,
        None => None,
    }
}
