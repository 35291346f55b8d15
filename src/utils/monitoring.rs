use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::AppError;

/// Prometheus collectors for assessment runs, owned by the orchestrator
pub struct AssessmentMetrics {
    registry: Registry,
    runs_total: IntCounterVec,
    unit_results_total: IntCounterVec,
    cache_requests_total: IntCounterVec,
    run_duration_seconds: Histogram,
}

impl AssessmentMetrics {
    pub fn new() -> Result<Self, AppError> {
        let registry = Registry::new_custom(Some("risk_orchestrator".to_string()), None)?;

        let runs_total = IntCounterVec::new(
            Opts::new("runs_total", "Assessment runs by outcome"),
            &["outcome"],
        )?;
        let unit_results_total = IntCounterVec::new(
            Opts::new("unit_results_total", "Unit executions by unit and status"),
            &["unit", "status"],
        )?;
        let cache_requests_total = IntCounterVec::new(
            Opts::new("cache_requests_total", "Result cache lookups by result"),
            &["result"],
        )?;
        let run_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("run_duration_seconds", "Wall-clock duration of assessment runs")
                .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        )?;

        registry.register(Box::new(runs_total.clone()))?;
        registry.register(Box::new(unit_results_total.clone()))?;
        registry.register(Box::new(cache_requests_total.clone()))?;
        registry.register(Box::new(run_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            runs_total,
            unit_results_total,
            cache_requests_total,
            run_duration_seconds,
        })
    }

    pub fn record_run(&self, outcome: &str, duration_secs: f64) {
        self.runs_total.with_label_values(&[outcome]).inc();
        self.run_duration_seconds.observe(duration_secs);
    }

    pub fn record_unit(&self, unit: &str, succeeded: bool) {
        let status = if succeeded { "success" } else { "failed" };
        self.unit_results_total.with_label_values(&[unit, status]).inc();
    }

    pub fn record_cache(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_requests_total.with_label_values(&[result]).inc();
    }

    pub fn runs_with_outcome(&self, outcome: &str) -> u64 {
        self.runs_total.with_label_values(&[outcome]).get()
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> Result<String, AppError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| AppError::InternalError(format!("Metrics output is not valid UTF-8: {}", e)))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
