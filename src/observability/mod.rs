pub mod metrics;
pub mod tracing;

pub use self::metrics::{MetricsRegistry, PrometheusSink, RequestLabels, TelemetrySink};
pub use self::tracing::{init_tracing, LogFormat};
