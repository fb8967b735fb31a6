pub mod case;
pub mod decision;
pub mod event;
pub mod evidence;
pub mod experiment;
pub mod policy;

pub use case::{CasePayload, CaseRequest, CaseType, ExistingAuth};
pub use decision::{Decision, DecisionOutcome};
pub use event::{EventKind, TelemetryEvent};
pub use evidence::EvidenceRefs;
pub use experiment::{ExperimentAssignment, Variant};
pub use policy::{EnginePolicy, ExperimentDef, RuleDef};
