//! Prometheus-based metrics collection and export for Phoenix observability.
//!
//! Registers and owns every `phoenix.*` gauge/counter named by the
//! self-telemetry namespace, exposed for scraping via
//! [`MetricsService::get_metrics`] and read back in-process by the
//! governor as its self-telemetry source.

use phoenix_domain::PhoenixError;
use prometheus::{Gauge, GaugeVec, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct MetricsService {
    registry: Arc<Registry>,

    // topk.*
    topk_k_value: Gauge,
    topk_coverage: Gauge,
    topk_included_resources: Gauge,

    // rollup.*
    rollup_aggregated_resources: Gauge,

    // cardinality.*
    cardinality_estimate: GaugeVec,
    cardinality_bucketed_total: IntCounter,

    // pid.<controller>.*
    pid_error: GaugeVec,
    pid_integral: GaugeVec,
    pid_output: GaugeVec,
    pid_circuit_tripped: GaugeVec,

    // governor.*
    governor_patches_applied_total: IntCounter,
    governor_patches_rejected_total: IntCounterVec,
    governor_kpi_missing_total: IntCounter,
    governor_policy_reload_failed_total: IntCounter,
    governor_policy_reload_success_total: IntCounter,

    // safety.*
    safety_safe_mode: Gauge,
    safety_cpu_mcores: Gauge,
    safety_rss_mib: Gauge,
    safety_overrides_active: Gauge,

    // per-processor baseline self-telemetry every AdaptiveProcessor publishes
    processor_throughput_total: IntCounterVec,
    processor_enabled: GaugeVec,
}

impl MetricsService {
    pub fn new() -> Result<Self, PhoenixError> {
        let registry = Registry::new();

        let topk_k_value = Gauge::with_opts(
            Opts::new("topk_k_value", "Current k for AdaptiveTopK").namespace("phoenix"),
        )
        .map_err(|e| PhoenixError::metrics_error(format!("topk_k_value: {e}")))?;

        let topk_coverage = Gauge::with_opts(
            Opts::new("topk_coverage", "Fraction of total weight covered by tracked top-k")
                .namespace("phoenix"),
        )
        .map_err(|e| PhoenixError::metrics_error(format!("topk_coverage: {e}")))?;

        let topk_included_resources = Gauge::with_opts(
            Opts::new("topk_included_resources", "Count of resources currently tracked by AdaptiveTopK")
                .namespace("phoenix"),
        )
        .map_err(|e| PhoenixError::metrics_error(format!("topk_included_resources: {e}")))?;

        let rollup_aggregated_resources = Gauge::with_opts(
            Opts::new("rollup_aggregated_resources", "Resources folded into the synthetic others resource this batch")
                .namespace("phoenix"),
        )
        .map_err(|e| PhoenixError::metrics_error(format!("rollup_aggregated_resources: {e}")))?;

        let cardinality_estimate = GaugeVec::new(
            Opts::new("cardinality_estimate", "HyperLogLog cardinality estimate per metric").namespace("phoenix"),
            &["metric"],
        )
        .map_err(|e| PhoenixError::metrics_error(format!("cardinality_estimate: {e}")))?;

        let cardinality_bucketed_total = IntCounter::with_opts(
            Opts::new("cardinality_bucketed_total", "Data points that had their attributes bucketed")
                .namespace("phoenix"),
        )
        .map_err(|e| PhoenixError::metrics_error(format!("cardinality_bucketed_total: {e}")))?;

        let pid_error = GaugeVec::new(
            Opts::new("pid_error", "Controller error term").namespace("phoenix"),
            &["controller"],
        )
        .map_err(|e| PhoenixError::metrics_error(format!("pid_error: {e}")))?;

        let pid_integral = GaugeVec::new(
            Opts::new("pid_integral", "Controller integral accumulator").namespace("phoenix"),
            &["controller"],
        )
        .map_err(|e| PhoenixError::metrics_error(format!("pid_integral: {e}")))?;

        let pid_output = GaugeVec::new(
            Opts::new("pid_output", "Controller output u").namespace("phoenix"),
            &["controller"],
        )
        .map_err(|e| PhoenixError::metrics_error(format!("pid_output: {e}")))?;

        let pid_circuit_tripped = GaugeVec::new(
            Opts::new("pid_circuit_tripped", "1 if the oscillation breaker is tripped").namespace("phoenix"),
            &["controller"],
        )
        .map_err(|e| PhoenixError::metrics_error(format!("pid_circuit_tripped: {e}")))?;

        let governor_patches_applied_total = IntCounter::with_opts(
            Opts::new("governor_patches_applied_total", "Total patches applied").namespace("phoenix"),
        )
        .map_err(|e| PhoenixError::metrics_error(format!("governor_patches_applied_total: {e}")))?;

        let governor_patches_rejected_total = IntCounterVec::new(
            Opts::new("governor_patches_rejected_total", "Total patches rejected, by reason").namespace("phoenix"),
            &["reason"],
        )
        .map_err(|e| PhoenixError::metrics_error(format!("governor_patches_rejected_total: {e}")))?;

        let governor_kpi_missing_total = IntCounter::with_opts(
            Opts::new("governor_kpi_missing_total", "Controller evaluations skipped for a missing KPI")
                .namespace("phoenix"),
        )
        .map_err(|e| PhoenixError::metrics_error(format!("governor_kpi_missing_total: {e}")))?;

        let governor_policy_reload_failed_total = IntCounter::with_opts(
            Opts::new("policy_reload_failed_total", "Failed policy hot-reload attempts").namespace("phoenix"),
        )
        .map_err(|e| PhoenixError::metrics_error(format!("policy_reload_failed_total: {e}")))?;

        let governor_policy_reload_success_total = IntCounter::with_opts(
            Opts::new("policy_reload_success_total", "Successful policy hot-reload attempts").namespace("phoenix"),
        )
        .map_err(|e| PhoenixError::metrics_error(format!("policy_reload_success_total: {e}")))?;

        let safety_safe_mode = Gauge::with_opts(
            Opts::new("safety_safe_mode", "1 while the process is in safe mode").namespace("phoenix"),
        )
        .map_err(|e| PhoenixError::metrics_error(format!("safety_safe_mode: {e}")))?;

        let safety_cpu_mcores = Gauge::with_opts(
            Opts::new("safety_cpu_mcores", "Observed CPU usage in milli-cores").namespace("phoenix"),
        )
        .map_err(|e| PhoenixError::metrics_error(format!("safety_cpu_mcores: {e}")))?;

        let safety_rss_mib = Gauge::with_opts(
            Opts::new("safety_rss_mib", "Observed resident set size in MiB").namespace("phoenix"),
        )
        .map_err(|e| PhoenixError::metrics_error(format!("safety_rss_mib: {e}")))?;

        let safety_overrides_active = Gauge::with_opts(
            Opts::new("safety_overrides_active", "Count of currently active safety_override patches")
                .namespace("phoenix"),
        )
        .map_err(|e| PhoenixError::metrics_error(format!("safety_overrides_active: {e}")))?;

        let processor_throughput_total = IntCounterVec::new(
            Opts::new("processor_throughput_total", "Batches consumed, per processor").namespace("phoenix"),
            &["processor"],
        )
        .map_err(|e| PhoenixError::metrics_error(format!("processor_throughput_total: {e}")))?;

        let processor_enabled = GaugeVec::new(
            Opts::new("processor_enabled", "1 if the processor is enabled").namespace("phoenix"),
            &["processor"],
        )
        .map_err(|e| PhoenixError::metrics_error(format!("processor_enabled: {e}")))?;

        for collector in [
            Box::new(topk_k_value.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(topk_coverage.clone()),
            Box::new(topk_included_resources.clone()),
            Box::new(rollup_aggregated_resources.clone()),
            Box::new(cardinality_estimate.clone()),
            Box::new(cardinality_bucketed_total.clone()),
            Box::new(pid_error.clone()),
            Box::new(pid_integral.clone()),
            Box::new(pid_output.clone()),
            Box::new(pid_circuit_tripped.clone()),
            Box::new(governor_patches_applied_total.clone()),
            Box::new(governor_patches_rejected_total.clone()),
            Box::new(governor_kpi_missing_total.clone()),
            Box::new(governor_policy_reload_failed_total.clone()),
            Box::new(governor_policy_reload_success_total.clone()),
            Box::new(safety_safe_mode.clone()),
            Box::new(safety_cpu_mcores.clone()),
            Box::new(safety_rss_mib.clone()),
            Box::new(safety_overrides_active.clone()),
            Box::new(processor_throughput_total.clone()),
            Box::new(processor_enabled.clone()),
        ] {
            registry
                .register(collector)
                .map_err(|e| PhoenixError::metrics_error(format!("failed to register metric: {e}")))?;
        }

        debug!("MetricsService initialized with Prometheus registry");

        Ok(Self {
            registry: Arc::new(registry),
            topk_k_value,
            topk_coverage,
            topk_included_resources,
            rollup_aggregated_resources,
            cardinality_estimate,
            cardinality_bucketed_total,
            pid_error,
            pid_integral,
            pid_output,
            pid_circuit_tripped,
            governor_patches_applied_total,
            governor_patches_rejected_total,
            governor_kpi_missing_total,
            governor_policy_reload_failed_total,
            governor_policy_reload_success_total,
            safety_safe_mode,
            safety_cpu_mcores,
            safety_rss_mib,
            safety_overrides_active,
            processor_throughput_total,
            processor_enabled,
        })
    }

    pub fn inc_processor_throughput(&self, processor: &str) {
        self.processor_throughput_total.with_label_values(&[processor]).inc();
    }

    pub fn set_processor_enabled(&self, processor: &str, enabled: bool) {
        self.processor_enabled
            .with_label_values(&[processor])
            .set(if enabled { 1.0 } else { 0.0 });
    }

    pub fn set_topk_status(&self, k_value: f64, coverage: f64, included_resources: f64) {
        self.topk_k_value.set(k_value);
        self.topk_coverage.set(coverage);
        self.topk_included_resources.set(included_resources);
    }

    pub fn set_rollup_aggregated_resources(&self, count: f64) {
        self.rollup_aggregated_resources.set(count);
    }

    pub fn set_cardinality_estimate(&self, metric: &str, estimate: f64) {
        self.cardinality_estimate.with_label_values(&[metric]).set(estimate);
    }

    pub fn inc_cardinality_bucketed(&self, by: u64) {
        self.cardinality_bucketed_total.inc_by(by);
    }

    pub fn set_pid_status(&self, controller: &str, error: f64, integral: f64, output: f64, tripped: bool) {
        self.pid_error.with_label_values(&[controller]).set(error);
        self.pid_integral.with_label_values(&[controller]).set(integral);
        self.pid_output.with_label_values(&[controller]).set(output);
        self.pid_circuit_tripped
            .with_label_values(&[controller])
            .set(if tripped { 1.0 } else { 0.0 });
    }

    pub fn inc_patches_applied(&self) {
        self.governor_patches_applied_total.inc();
    }

    pub fn inc_patches_rejected(&self, reason: &str) {
        self.governor_patches_rejected_total.with_label_values(&[reason]).inc();
    }

    pub fn inc_kpi_missing(&self) {
        self.governor_kpi_missing_total.inc();
    }

    pub fn inc_policy_reload_failed(&self) {
        self.governor_policy_reload_failed_total.inc();
    }

    pub fn inc_policy_reload_success(&self) {
        self.governor_policy_reload_success_total.inc();
    }

    pub fn set_safety_status(&self, safe_mode: bool, cpu_mcores: f64, rss_mib: f64, overrides_active: f64) {
        self.safety_safe_mode.set(if safe_mode { 1.0 } else { 0.0 });
        self.safety_cpu_mcores.set(cpu_mcores);
        self.safety_rss_mib.set(rss_mib);
        self.safety_overrides_active.set(overrides_active);
    }

    /// Flattens every currently registered gauge/counter back into the
    /// dotted `phoenix.<namespace>.<name>` KPI names the governor's
    /// controllers are configured against, translating Prometheus's
    /// underscore-joined label metrics back into one entry per label value.
    /// This is the governor's self-telemetry source: it reads back its own
    /// exported metrics rather than maintaining a second notification path.
    pub fn gauge_snapshot(&self) -> Vec<(String, f64)> {
        let mut out = Vec::new();
        for family in self.registry.gather() {
            let flat = family.get_name().strip_prefix("phoenix_").unwrap_or(family.get_name());
            for metric in family.get_metric() {
                let value = if metric.has_gauge() {
                    metric.get_gauge().get_value()
                } else if metric.has_counter() {
                    metric.get_counter().get_value()
                } else {
                    continue;
                };
                let labels = metric.get_label();
                let label_value = |key: &str| {
                    labels
                        .iter()
                        .find(|l| l.get_name() == key)
                        .map(|l| l.get_value().to_string())
                        .unwrap_or_default()
                };

                let dotted = match flat {
                    "topk_k_value" => "phoenix.topk.k_value".to_string(),
                    "topk_coverage" => "phoenix.topk.coverage".to_string(),
                    "topk_included_resources" => "phoenix.topk.included_resources".to_string(),
                    "rollup_aggregated_resources" => "phoenix.rollup.aggregated_resources".to_string(),
                    "cardinality_estimate" => {
                        format!("phoenix.cardinality.estimate{{metric={}}}", label_value("metric"))
                    }
                    "cardinality_bucketed_total" => "phoenix.cardinality.bucketed_total".to_string(),
                    "pid_error" | "pid_integral" | "pid_output" | "pid_circuit_tripped" => {
                        let suffix = flat.strip_prefix("pid_").unwrap_or(flat);
                        format!("phoenix.pid.{}.{suffix}", label_value("controller"))
                    }
                    "governor_patches_applied_total" => "phoenix.governor.patches_applied_total".to_string(),
                    "governor_patches_rejected_total" => {
                        format!("phoenix.governor.patches_rejected_total{{reason={}}}", label_value("reason"))
                    }
                    "governor_kpi_missing_total" => "phoenix.governor.kpi_missing_total".to_string(),
                    "policy_reload_failed_total" => "phoenix.governor.policy_reload_failed_total".to_string(),
                    "policy_reload_success_total" => "phoenix.governor.policy_reload_success_total".to_string(),
                    "safety_safe_mode" => "phoenix.safety.safe_mode".to_string(),
                    "safety_cpu_mcores" => "phoenix.safety.cpu_mcores".to_string(),
                    "safety_rss_mib" => "phoenix.safety.rss_mib".to_string(),
                    "safety_overrides_active" => "phoenix.safety.overrides_active".to_string(),
                    "processor_throughput_total" => {
                        format!("phoenix.processor.{}.throughput_total", label_value("processor"))
                    }
                    "processor_enabled" => {
                        format!("phoenix.processor.{}.enabled", label_value("processor"))
                    }
                    other => format!("phoenix.{other}"),
                };
                out.push((dotted, value));
            }
        }
        out
    }

    /// Renders the registry in Prometheus text exposition format.
    pub fn get_metrics(&self) -> Result<String, PhoenixError> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| PhoenixError::metrics_error(format!("failed to encode metrics: {e}")))?;
        String::from_utf8(buffer)
            .map_err(|e| PhoenixError::metrics_error(format!("metrics output was not valid utf-8: {e}")))
    }
}

impl Default for MetricsService {
    fn default() -> Self {
        Self::new().expect("failed to initialize default MetricsService")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registers_without_error() {
        MetricsService::new().expect("metrics service should initialize");
    }

    #[test]
    fn get_metrics_includes_recorded_values() {
        let service = MetricsService::new().unwrap();
        service.set_topk_status(42.0, 0.95, 10.0);
        let text = service.get_metrics().unwrap();
        assert!(text.contains("phoenix_topk_k_value 42"));
    }

    #[test]
    fn cardinality_estimate_is_labeled_per_metric() {
        let service = MetricsService::new().unwrap();
        service.set_cardinality_estimate("cpu.time", 150.0);
        let text = service.get_metrics().unwrap();
        assert!(text.contains("metric=\"cpu.time\""));
    }

    #[test]
    fn gauge_snapshot_translates_flat_names_back_to_dotted_kpis() {
        let service = MetricsService::new().unwrap();
        service.set_topk_status(42.0, 0.95, 10.0);
        service.set_pid_status("topk_controller", 0.05, 0.1, 55.0, false);
        let snapshot = service.gauge_snapshot();
        assert!(snapshot.iter().any(|(k, v)| k == "phoenix.topk.coverage" && (*v - 0.95).abs() < 1e-9));
        assert!(snapshot
            .iter()
            .any(|(k, v)| k == "phoenix.pid.topk_controller.output" && (*v - 55.0).abs() < 1e-9));
    }
}
