//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized naming. Recording is a no-op
//! until a recorder (the gateway's Prometheus exporter) is installed.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Shmulik metrics
pub const METRICS_PREFIX: &str = "shmulik";

/// Histogram buckets for chat latency (in seconds); dominated by the LLM call
pub const CHAT_BUCKETS: &[f64] = &[
    0.100, 0.250, 0.500, 1.000, 2.000, 4.000, 8.000, 15.00, 30.00, 60.00,
];

/// Buckets for embedding and retrieval latency
pub const EMBEDDING_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.000, 5.000,
];

/// Histograms exported with explicit buckets, by full metric name
pub fn histogram_buckets() -> Vec<(String, &'static [f64])> {
    vec![
        (format!("{}_request_duration_seconds", METRICS_PREFIX), CHAT_BUCKETS),
        (format!("{}_generation_duration_seconds", METRICS_PREFIX), CHAT_BUCKETS),
        (format!("{}_retrieval_duration_seconds", METRICS_PREFIX), EMBEDDING_BUCKETS),
        (format!("{}_embedding_duration_seconds", METRICS_PREFIX), EMBEDDING_BUCKETS),
    ]
}

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Retrieval metrics
    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Query embedding plus index search latency in seconds"
    );

    describe_histogram!(
        format!("{}_retrieval_results", METRICS_PREFIX),
        Unit::Count,
        "Number of chunks returned per retrieval"
    );

    // Generation metrics
    describe_counter!(
        format!("{}_answers_total", METRICS_PREFIX),
        Unit::Count,
        "Answers produced, by outcome"
    );

    describe_histogram!(
        format!("{}_generation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Language model latency in seconds"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API errors"
    );

    // Ingestion metrics
    describe_counter!(
        format!("{}_documents_ingested_total", METRICS_PREFIX),
        Unit::Count,
        "Total documents ingested"
    );

    describe_counter!(
        format!("{}_chunks_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total chunks created"
    );

    // State gauges
    describe_gauge!(
        format!("{}_sessions_active", METRICS_PREFIX),
        Unit::Count,
        "Conversation sessions currently held in memory"
    );

    describe_gauge!(
        format!("{}_index_entries", METRICS_PREFIX),
        Unit::Count,
        "Entries in the loaded vector index"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: &'static str,
    method: &'static str,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &'static str, endpoint: &'static str) -> Self {
        Self {
            start: Instant::now(),
            endpoint,
            method,
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint,
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record retrieval metrics
pub fn record_retrieval(duration_secs: f64, result_count: usize) {
    histogram!(format!("{}_retrieval_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    histogram!(format!("{}_retrieval_results", METRICS_PREFIX)).record(result_count as f64);
}

/// Helper to record a finished answer; `outcome` is grounded, no_context or failed
pub fn record_answer(outcome: &'static str) {
    counter!(
        format!("{}_answers_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

/// Helper to record language model latency
pub fn record_generation(duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };
    histogram!(
        format!("{}_generation_duration_seconds", METRICS_PREFIX),
        "status" => status
    )
    .record(duration_secs);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
        tracing::trace!(batch_size, duration_secs, "Embedding batch complete");
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Helper to record one ingested document
pub fn record_ingestion(chunks_created: usize) {
    counter!(format!("{}_documents_ingested_total", METRICS_PREFIX)).increment(1);

    counter!(format!("{}_chunks_created_total", METRICS_PREFIX)).increment(chunks_created as u64);
}

pub fn set_sessions_active(count: usize) {
    gauge!(format!("{}_sessions_active", METRICS_PREFIX)).set(count as f64);
}

pub fn set_index_entries(count: usize) {
    gauge!(format!("{}_index_entries", METRICS_PREFIX)).set(count as f64);
}
