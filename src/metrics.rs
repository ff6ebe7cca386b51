//! Prometheus metrics for the pipeline.
//!
//! All counters, gauges, and histograms live in one registry struct that is
//! created once per process and shared between the pipeline (writer) and the
//! scrape endpoint (reader).

use once_cell::sync::Lazy;
use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, register_int_gauge_vec, Encoder, Gauge, Histogram, IntCounter,
    IntCounterVec, IntGauge, IntGaugeVec, TextEncoder,
};

use crate::error::CollectorError;
use crate::models::SentimentLabel;

/// Per-batch sentiment latency buckets (seconds)
const SENTIMENT_LATENCY_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Sentiment batch-size buckets
const BATCH_SIZE_BUCKETS: &[f64] = &[1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 200.0];

/// End-to-end run latency buckets (seconds)
const RUN_LATENCY_BUCKETS: &[f64] = &[10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0];

/// Model construction latency buckets (seconds)
const MODEL_LOAD_BUCKETS: &[f64] = &[1.0, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Process-wide metrics instance, initialized on first use.
pub static METRICS: Lazy<PipelineMetrics> =
    Lazy::new(|| PipelineMetrics::new().expect("metrics registration"));

/// Container for all pipeline metrics.
pub struct PipelineMetrics {
    /// Submissions returned by the source - labels: community
    pub posts_fetched_total: IntCounterVec,
    /// Submissions dropped as already seen
    pub posts_deduplicated_total: IntCounter,
    /// Enriched records successfully written
    pub posts_processed_total: IntCounter,
    /// Outputs per sentiment label - labels: label
    pub sentiment_distribution_total: IntCounterVec,
    /// Per-batch sentiment wall time
    pub sentiment_analysis_duration_seconds: Histogram,
    /// Batch sizes used
    pub sentiment_batch_size: Histogram,
    /// Classifier failures - labels: error_kind
    pub sentiment_errors_total: IntCounterVec,
    /// End-to-end run wall time
    pub pipeline_total_duration_seconds: Histogram,
    /// One-shot classifier construction time
    pub model_load_duration_seconds: Histogram,
    /// All errors, classified - labels: component, error_kind
    pub pipeline_errors_total: IntCounterVec,
    /// Source-specific errors - labels: error_kind
    pub source_errors_total: IntCounterVec,
    /// 1 healthy, 0 unhealthy
    pub pipeline_status: IntGauge,
    /// Seconds since epoch of the last successful run
    pub pipeline_last_successful_run_timestamp: Gauge,
    /// Process resident memory
    pub memory_usage_bytes: IntGauge,
    /// Static identification - labels: version, commit, build_date
    pub build_info: IntGaugeVec,
}

impl PipelineMetrics {
    /// Create and register all metrics with the default registry.
    fn new() -> prometheus::Result<Self> {
        let metrics = Self {
            posts_fetched_total: register_int_counter_vec!(
                "posts_fetched_total",
                "Submissions returned by the source client",
                &["community"]
            )?,
            posts_deduplicated_total: register_int_counter!(
                "posts_deduplicated_total",
                "Submissions dropped by the dedup store as already seen"
            )?,
            posts_processed_total: register_int_counter!(
                "posts_processed_total",
                "Enriched records successfully written to the sink"
            )?,
            sentiment_distribution_total: register_int_counter_vec!(
                "sentiment_distribution_total",
                "Distribution of sentiment labels over written records",
                &["label"]
            )?,
            sentiment_analysis_duration_seconds: register_histogram!(
                "sentiment_analysis_duration_seconds",
                "Wall time spent classifying one batch",
                SENTIMENT_LATENCY_BUCKETS.to_vec()
            )?,
            sentiment_batch_size: register_histogram!(
                "sentiment_batch_size",
                "Number of texts per classifier batch",
                BATCH_SIZE_BUCKETS.to_vec()
            )?,
            sentiment_errors_total: register_int_counter_vec!(
                "sentiment_errors_total",
                "Classifier failures by kind",
                &["error_kind"]
            )?,
            pipeline_total_duration_seconds: register_histogram!(
                "pipeline_total_duration_seconds",
                "End-to-end pipeline run wall time",
                RUN_LATENCY_BUCKETS.to_vec()
            )?,
            model_load_duration_seconds: register_histogram!(
                "model_load_duration_seconds",
                "Time taken to construct the sentiment classifier",
                MODEL_LOAD_BUCKETS.to_vec()
            )?,
            pipeline_errors_total: register_int_counter_vec!(
                "pipeline_errors_total",
                "All pipeline errors by component and kind",
                &["component", "error_kind"]
            )?,
            source_errors_total: register_int_counter_vec!(
                "source_errors_total",
                "Source client errors by kind",
                &["error_kind"]
            )?,
            pipeline_status: register_int_gauge!(
                "pipeline_status",
                "Current pipeline status (1=healthy, 0=unhealthy)"
            )?,
            pipeline_last_successful_run_timestamp: register_gauge!(
                "pipeline_last_successful_run_timestamp",
                "Seconds since epoch of the last successful run"
            )?,
            memory_usage_bytes: register_int_gauge!(
                "memory_usage_bytes",
                "Resident memory of the collector process"
            )?,
            build_info: register_int_gauge_vec!(
                "build_info",
                "Build identification (value is constant 1)",
                &["version", "commit", "build_date"]
            )?,
        };

        metrics.pipeline_status.set(1);

        Ok(metrics)
    }

    /// Record submissions fetched from one community.
    pub fn record_posts_fetched(&self, community: &str, count: u64) {
        self.posts_fetched_total
            .with_label_values(&[community])
            .inc_by(count);
    }

    pub fn record_post_deduplicated(&self) {
        self.posts_deduplicated_total.inc();
    }

    /// Record one successfully written record and its label.
    pub fn record_post_processed(&self, label: SentimentLabel) {
        self.posts_processed_total.inc();
        self.sentiment_distribution_total
            .with_label_values(&[label.as_str()])
            .inc();
    }

    /// Record the wall time and size of one classifier batch.
    pub fn record_sentiment_batch(&self, duration_secs: f64, batch_size: usize) {
        self.sentiment_analysis_duration_seconds
            .observe(duration_secs);
        self.sentiment_batch_size.observe(batch_size as f64);
    }

    /// Record a classifier failure by kind.
    pub fn record_sentiment_error(&self, error_kind: &str) {
        self.sentiment_errors_total
            .with_label_values(&[error_kind])
            .inc();
    }

    /// Record any pipeline error under its component and kind labels.
    /// Source errors are additionally counted in `source_errors_total`.
    pub fn record_error(&self, error: &CollectorError) {
        self.pipeline_errors_total
            .with_label_values(&[error.component(), error.kind()])
            .inc();
        if error.is_source() {
            self.source_errors_total
                .with_label_values(&[error.kind()])
                .inc();
        }
    }

    /// Latch the health gauge unhealthy. Stays 0 until the next
    /// successful run.
    pub fn mark_unhealthy(&self) {
        self.pipeline_status.set(0);
    }

    /// Record a completed, successful run.
    pub fn record_successful_run(&self, duration_secs: f64) {
        self.pipeline_status.set(1);
        self.pipeline_last_successful_run_timestamp
            .set(chrono::Utc::now().timestamp() as f64);
        self.pipeline_total_duration_seconds.observe(duration_secs);
    }

    /// Record run duration without touching the health gauge (failed runs).
    pub fn record_run_duration(&self, duration_secs: f64) {
        self.pipeline_total_duration_seconds.observe(duration_secs);
    }

    pub fn record_model_load(&self, duration_secs: f64) {
        self.model_load_duration_seconds.observe(duration_secs);
    }

    /// Sample current resident memory into the gauge.
    pub fn record_memory_usage(&self) {
        if let Some(bytes) = resident_memory_bytes() {
            self.memory_usage_bytes.set(bytes as i64);
        }
    }

    /// Publish static build identification.
    pub fn set_build_info(&self, version: &str, commit: &str, build_date: &str) {
        self.build_info
            .with_label_values(&[version, commit, build_date])
            .set(1);
    }

    /// Render every registered metric in the Prometheus text exposition.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
            tracing::error!(error = %e, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Read resident set size from /proc/self/statm.
#[cfg(target_os = "linux")]
fn resident_memory_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let rss_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    // Page size is 4096 on every platform this runs on.
    Some(rss_pages * 4096)
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_bytes() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_fetched_by_community() {
        let before = METRICS
            .posts_fetched_total
            .with_label_values(&["metrics_unit_test"])
            .get();
        METRICS.record_posts_fetched("metrics_unit_test", 3);
        let after = METRICS
            .posts_fetched_total
            .with_label_values(&["metrics_unit_test"])
            .get();
        assert_eq!(after - before, 3);
    }

    #[test]
    fn test_record_error_classifies_source_errors() {
        let err = CollectorError::SourceTransient("timeout".into());
        let before = METRICS
            .source_errors_total
            .with_label_values(&["transient"])
            .get();
        METRICS.record_error(&err);
        let after = METRICS
            .source_errors_total
            .with_label_values(&["transient"])
            .get();
        assert_eq!(after - before, 1);
    }

    #[test]
    fn test_health_latch() {
        METRICS.mark_unhealthy();
        assert_eq!(METRICS.pipeline_status.get(), 0);
        METRICS.record_successful_run(1.5);
        assert_eq!(METRICS.pipeline_status.get(), 1);
        assert!(METRICS.pipeline_last_successful_run_timestamp.get() > 0.0);
    }
}
