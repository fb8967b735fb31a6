use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};

use crate::cache::MAX_TTL;
use crate::domain::EnginePolicy;
use crate::experiment::EXPERIMENT_BUCKETS;

/// Errors that can occur during engine configuration loading.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Load engine configuration from a YAML file.
pub fn load_engine_policy(path: impl AsRef<Path>) -> Result<EnginePolicy, PolicyError> {
    let content = fs::read_to_string(path)?;
    parse_engine_policy(&content)
}

/// Parse and validate engine configuration from YAML text.
pub fn parse_engine_policy(content: &str) -> Result<EnginePolicy, PolicyError> {
    let policy: EnginePolicy = serde_yaml::from_str(content)?;

    validate_policy(&policy)?;

    Ok(policy)
}

/// Validate engine configuration.
pub fn validate_policy(policy: &EnginePolicy) -> Result<(), PolicyError> {
    if policy.version.trim().is_empty() {
        return Err(PolicyError::Validation(
            "Policy version cannot be empty".to_string(),
        ));
    }

    let mut seen_ids = HashSet::new();
    for rule in &policy.rules {
        if !seen_ids.insert(&rule.id) {
            return Err(PolicyError::Validation(format!(
                "Duplicate rule ID: {}",
                rule.id
            )));
        }
        if !(0.0..=1.0).contains(&rule.confidence) {
            return Err(PolicyError::Validation(format!(
                "Rule {} confidence {} outside [0, 1]",
                rule.id, rule.confidence
            )));
        }
    }

    for experiment in &policy.experiments {
        let control_end = u32::from(experiment.control_bucket_end);
        let treatment_end = u32::from(experiment.treatment_bucket_end);

        if treatment_end > EXPERIMENT_BUCKETS {
            return Err(PolicyError::Validation(format!(
                "Experiment {} treatment_bucket_end {} exceeds {}",
                experiment.id, treatment_end, EXPERIMENT_BUCKETS
            )));
        }
        if control_end > treatment_end {
            return Err(PolicyError::Validation(format!(
                "Experiment {} control_bucket_end {} exceeds treatment_bucket_end {}",
                experiment.id, control_end, treatment_end
            )));
        }
    }

    if policy.cache.rules_decision_ttl() > MAX_TTL {
        return Err(PolicyError::Validation(format!(
            "cache.rules_decision_ttl_secs {} exceeds {}",
            policy.cache.rules_decision_ttl_secs,
            MAX_TTL.as_secs()
        )));
    }

    if policy.events.capacity_per_tenant == 0 {
        return Err(PolicyError::Validation(
            "events.capacity_per_tenant must be positive".to_string(),
        ));
    }

    Ok(())
}

/// Where the active configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySource {
    File(PathBuf),
    Fallback,
}

/// Configuration chosen at start-up.
#[derive(Debug, Clone)]
pub struct LoadedPolicy {
    pub policy: EnginePolicy,
    pub source: PolicySource,
}

impl LoadedPolicy {
    pub fn is_from_file(&self) -> bool {
        matches!(self.source, PolicySource::File(_))
    }
}

/// Loads the engine configuration once at start-up.
pub struct PolicyLoader {
    path: PathBuf,
}

impl PolicyLoader {
    /// Create a new loader for the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        PolicyLoader { path: path.into() }
    }

    pub fn load(&self) -> Result<EnginePolicy, PolicyError> {
        load_engine_policy(&self.path)
    }

    /// Load the file, or fall back to the built-in configuration if it
    /// cannot be read or is invalid.
    pub fn load_or_fallback(&self) -> LoadedPolicy {
        match self.load() {
            Ok(policy) => {
                info!(
                    path = %self.path.display(),
                    version = %policy.version,
                    rules = policy.rules.len(),
                    "Loaded engine configuration"
                );
                LoadedPolicy {
                    policy,
                    source: PolicySource::File(self.path.clone()),
                }
            }
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to load engine configuration, using fallback"
                );
                LoadedPolicy {
                    policy: EnginePolicy::fallback(),
                    source: PolicySource::Fallback,
                }
            }
        }
    }

    /// Get the configuration file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
