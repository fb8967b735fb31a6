use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::domain::{EnginePolicy, ExperimentAssignment, ExperimentDef, Variant};

/// Number of buckets used for experiment assignment.
pub const EXPERIMENT_BUCKETS: u32 = 100;

/// Map `input` to a bucket in `0..num_buckets`.
///
/// Uses the first four bytes of the SHA-256 digest, big-endian, so the
/// result is the same on every platform and across restarts.
pub fn hash_to_bucket(input: &str, num_buckets: u32) -> u32 {
    let digest = Sha256::digest(input.as_bytes());
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    prefix % num_buckets.max(1)
}

/// Deterministic sticky bucketing into experiment arms.
#[derive(Debug, Clone)]
pub struct ExperimentAssigner {
    experiments: Arc<[ExperimentDef]>,
}

impl ExperimentAssigner {
    pub fn new(experiments: Vec<ExperimentDef>) -> Self {
        ExperimentAssigner {
            experiments: experiments.into(),
        }
    }

    pub fn from_policy(policy: &EnginePolicy) -> Self {
        ExperimentAssigner::new(policy.experiments.clone())
    }

    /// Assign `sticky_key` to an arm of the first enabled experiment that
    /// lists `case_type`. Returns `None` when no experiment applies.
    pub fn assign(&self, case_type: &str, sticky_key: &str) -> Option<ExperimentAssignment> {
        let experiment = self
            .experiments
            .iter()
            .find(|e| e.enabled && e.case_types.iter().any(|c| c == case_type))?;

        let bucket = hash_to_bucket(sticky_key, EXPERIMENT_BUCKETS);

        Some(ExperimentAssignment {
            experiment_id: experiment.id.clone(),
            variant: variant_for_bucket(experiment, bucket),
        })
    }
}

fn variant_for_bucket(experiment: &ExperimentDef, bucket: u32) -> Variant {
    let control_end = u32::from(experiment.control_bucket_end);
    let treatment_end = u32::from(experiment.treatment_bucket_end);

    if bucket < control_end {
        Variant::Control
    } else if bucket < treatment_end {
        Variant::Treatment
    } else {
        Variant::Control
    }
}
