use serde::{Deserialize, Serialize};
use std::fmt;

/// Experiment arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Control,
    Treatment,
}

impl Variant {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Control => "control",
            Variant::Treatment => "treatment",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The experiment arm a case was bucketed into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentAssignment {
    pub experiment_id: String,
    pub variant: Variant,
}

impl ExperimentAssignment {
    pub fn is_treatment_of(&self, experiment_id: &str) -> bool {
        self.variant == Variant::Treatment && self.experiment_id == experiment_id
    }
}
