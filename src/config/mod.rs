use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::observability::LogFormat;

/// Scheduling-authorization engine configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "schedauth")]
#[command(about = "Multi-tenant scheduling authorization decision engine")]
pub struct Config {
    /// HTTP server listen address
    #[arg(long, default_value = "0.0.0.0:8080", env = "SCHEDAUTH_LISTEN_ADDR")]
    pub listen_addr: String,

    /// Path to engine configuration YAML (rules, experiments, TTLs, tool latencies)
    #[arg(long, default_value = "config/engine.yaml", env = "SCHEDAUTH_ENGINE_CONFIG")]
    pub engine_config: PathBuf,

    /// Latency budget in milliseconds for the run endpoint
    #[arg(long, default_value = "250", env = "SCHEDAUTH_LATENCY_BUDGET_MS")]
    pub latency_budget_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "SCHEDAUTH_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Interval for purging expired cache entries (0 disables the sweep)
    #[arg(long, default_value = "0", env = "SCHEDAUTH_CACHE_SWEEP_SECS")]
    pub cache_sweep_secs: u64,

    /// Enable graceful shutdown
    #[arg(long, default_value = "true", env = "SCHEDAUTH_GRACEFUL_SHUTDOWN")]
    pub graceful_shutdown: bool,

    /// Graceful shutdown timeout in seconds
    #[arg(long, default_value = "30", env = "SCHEDAUTH_SHUTDOWN_TIMEOUT_SECS")]
    pub shutdown_timeout_secs: u64,
}

impl Config {
    /// Get shutdown timeout as Duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Cache sweep interval, if enabled.
    pub fn cache_sweep_interval(&self) -> Option<Duration> {
        (self.cache_sweep_secs > 0).then(|| Duration::from_secs(self.cache_sweep_secs))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: "0.0.0.0:8080".to_string(),
            engine_config: PathBuf::from("config/engine.yaml"),
            latency_budget_ms: 250,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            cache_sweep_secs: 0,
            graceful_shutdown: true,
            shutdown_timeout_secs: 30,
        }
    }
}
