pub mod api;
pub mod cache;
pub mod config;
pub mod domain;
pub mod events;
pub mod experiment;
pub mod observability;
pub mod orchestrator;
pub mod policy;
pub mod rules;
pub mod tools;
pub mod verifier;

pub use config::Config;
pub use domain::{CasePayload, CaseRequest, Decision, EnginePolicy};
pub use orchestrator::{DraftResponse, EngineContext, EngineError, Orchestrator};
pub use verifier::{AgentRunResponse, Verifier};
