use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use parking_lot::Mutex;
use std::collections::HashMap;

pub const REQUEST_LATENCY_MS: &str = "agent_request_latency_ms";
pub const TOOL_LATENCY_MS: &str = "agent_tool_latency_ms";
pub const VERIFIER_REJECTS_TOTAL: &str = "agent_verifier_rejects_total";
pub const HUMAN_REVIEW_TOTAL: &str = "agent_human_review_total";

/// Request latency histogram buckets (milliseconds).
pub const REQUEST_LATENCY_BUCKETS: [f64; 9] =
    [10.0, 25.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 2500.0, 5000.0];

/// Tool latency histogram buckets (milliseconds).
pub const TOOL_LATENCY_BUCKETS: [f64; 7] = [5.0, 10.0, 25.0, 50.0, 100.0, 200.0, 500.0];

/// Labels for the end-to-end request latency histogram.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestLabels {
    pub tenant_id: String,
    pub case_type: String,
    /// Empty when no experiment applied
    pub experiment_id: String,
    pub variant: String,
}

/// Observer for engine metrics.
pub trait TelemetrySink: Send + Sync {
    fn observe_request_latency(&self, labels: &RequestLabels, latency_ms: f64);

    fn observe_tool_latency(&self, tenant_id: &str, tool_name: &str, latency_ms: f64);

    fn increment_verifier_rejects(&self, tenant_id: &str);

    fn increment_human_review(&self, tenant_id: &str, case_type: &str);
}

/// Sink that forwards to the `metrics` facade.
///
/// Pair it with [`install_prometheus_recorder`] to export in Prometheus
/// text format.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusSink;

impl TelemetrySink for PrometheusSink {
    fn observe_request_latency(&self, labels: &RequestLabels, latency_ms: f64) {
        metrics::histogram!(
            REQUEST_LATENCY_MS,
            "tenant_id" => labels.tenant_id.clone(),
            "case_type" => labels.case_type.clone(),
            "experiment_id" => labels.experiment_id.clone(),
            "variant" => labels.variant.clone(),
        )
        .record(latency_ms);
    }

    fn observe_tool_latency(&self, tenant_id: &str, tool_name: &str, latency_ms: f64) {
        metrics::histogram!(
            TOOL_LATENCY_MS,
            "tenant_id" => tenant_id.to_owned(),
            "tool_name" => tool_name.to_owned(),
        )
        .record(latency_ms);
    }

    fn increment_verifier_rejects(&self, tenant_id: &str) {
        metrics::counter!(VERIFIER_REJECTS_TOTAL, "tenant_id" => tenant_id.to_owned()).increment(1);
    }

    fn increment_human_review(&self, tenant_id: &str, case_type: &str) {
        metrics::counter!(
            HUMAN_REVIEW_TOTAL,
            "tenant_id" => tenant_id.to_owned(),
            "case_type" => case_type.to_owned(),
        )
        .increment(1);
    }
}

/// Builder with the engine's histogram buckets applied.
pub fn prometheus_builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_LATENCY_MS.to_string()),
            &REQUEST_LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(TOOL_LATENCY_MS.to_string()),
            &TOOL_LATENCY_BUCKETS,
        )
}

/// Install the global Prometheus recorder. Call once at start-up.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, BuildError> {
    prometheus_builder()?.install_recorder()
}

/// Count, sum and max of observed values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Observations {
    pub count: u64,
    pub sum: f64,
    pub max: f64,
}

impl Observations {
    fn record(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        if value > self.max {
            self.max = value;
        }
    }
}

/// In-memory metrics registry.
///
/// Keeps labeled counters and latency summaries in process, for embedding
/// the engine without an exporter and for asserting on metrics in tests.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    request_latency: Mutex<HashMap<RequestLabels, Observations>>,
    tool_latency: Mutex<HashMap<(String, String), Observations>>,
    verifier_rejects: Mutex<HashMap<String, u64>>,
    human_review: Mutex<HashMap<(String, String), u64>>,
}

impl MetricsRegistry {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        MetricsRegistry::default()
    }

    pub fn request_latency(&self, labels: &RequestLabels) -> Observations {
        self.request_latency
            .lock()
            .get(labels)
            .copied()
            .unwrap_or_default()
    }

    /// Total request observations for a tenant across all other labels.
    pub fn request_count(&self, tenant_id: &str) -> u64 {
        self.request_latency
            .lock()
            .iter()
            .filter(|(labels, _)| labels.tenant_id == tenant_id)
            .map(|(_, obs)| obs.count)
            .sum()
    }

    pub fn tool_latency(&self, tenant_id: &str, tool_name: &str) -> Observations {
        self.tool_latency
            .lock()
            .get(&(tenant_id.to_string(), tool_name.to_string()))
            .copied()
            .unwrap_or_default()
    }

    pub fn verifier_rejects(&self, tenant_id: &str) -> u64 {
        self.verifier_rejects
            .lock()
            .get(tenant_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn human_reviews(&self, tenant_id: &str, case_type: &str) -> u64 {
        self.human_review
            .lock()
            .get(&(tenant_id.to_string(), case_type.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

impl TelemetrySink for MetricsRegistry {
    fn observe_request_latency(&self, labels: &RequestLabels, latency_ms: f64) {
        self.request_latency
            .lock()
            .entry(labels.clone())
            .or_default()
            .record(latency_ms);
    }

    fn observe_tool_latency(&self, tenant_id: &str, tool_name: &str, latency_ms: f64) {
        self.tool_latency
            .lock()
            .entry((tenant_id.to_string(), tool_name.to_string()))
            .or_default()
            .record(latency_ms);
    }

    fn increment_verifier_rejects(&self, tenant_id: &str) {
        *self
            .verifier_rejects
            .lock()
            .entry(tenant_id.to_string())
            .or_insert(0) += 1;
    }

    fn increment_human_review(&self, tenant_id: &str, case_type: &str) {
        *self
            .human_review
            .lock()
            .entry((tenant_id.to_string(), case_type.to_string()))
            .or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(tenant: &str) -> RequestLabels {
        RequestLabels {
            tenant_id: tenant.to_string(),
            case_type: "scheduling_auth".to_string(),
            experiment_id: "EXP-A2".to_string(),
            variant: "control".to_string(),
        }
    }

    #[test]
    fn test_registry_request_latency() {
        let metrics = MetricsRegistry::new();

        metrics.observe_request_latency(&labels("tenant-a"), 12.0);
        metrics.observe_request_latency(&labels("tenant-a"), 30.0);
        metrics.observe_request_latency(&labels("tenant-b"), 5.0);

        let obs = metrics.request_latency(&labels("tenant-a"));
        assert_eq!(obs.count, 2);
        assert_eq!(obs.sum, 42.0);
        assert_eq!(obs.max, 30.0);
        assert_eq!(metrics.request_count("tenant-b"), 1);
    }

    #[test]
    fn test_registry_counters_are_keyed_by_tenant() {
        let metrics = MetricsRegistry::new();

        metrics.increment_verifier_rejects("tenant-a");
        metrics.increment_verifier_rejects("tenant-a");
        metrics.increment_human_review("tenant-b", "scheduling_auth");

        assert_eq!(metrics.verifier_rejects("tenant-a"), 2);
        assert_eq!(metrics.verifier_rejects("tenant-b"), 0);
        assert_eq!(metrics.human_reviews("tenant-b", "scheduling_auth"), 1);
        assert_eq!(metrics.human_reviews("tenant-a", "scheduling_auth"), 0);
    }

    #[test]
    fn test_registry_tool_latency() {
        let metrics = MetricsRegistry::new();
        metrics.observe_tool_latency("tenant-a", "policy_lookup", 20.0);

        assert_eq!(metrics.tool_latency("tenant-a", "policy_lookup").count, 1);
        assert_eq!(metrics.tool_latency("tenant-a", "eligibility_check").count, 0);
    }

    #[test]
    fn test_prometheus_sink_renders() {
        let recorder = prometheus_builder().unwrap().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            let sink = PrometheusSink;
            sink.observe_request_latency(&labels("tenant-a"), 42.0);
            sink.observe_tool_latency("tenant-a", "policy_lookup", 20.0);
            sink.increment_verifier_rejects("tenant-a");
            sink.increment_human_review("tenant-a", "scheduling_auth");
        });

        let output = handle.render();

        assert!(output.contains("agent_request_latency_ms_bucket"));
        assert!(output.contains("tool_name=\"policy_lookup\""));
        assert!(output.contains("agent_verifier_rejects_total{tenant_id=\"tenant-a\"} 1"));
        assert!(output.contains("agent_human_review_total"));
    }
}
