//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all ProfRAG metrics
pub const METRICS_PREFIX: &str = "profrag";

/// Buckets for end-to-end answer latency (in seconds).
/// A request makes up to three LLM round-trips, so the tail is long.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.050, 0.100, 0.250, 0.500, 1.000, 2.000, 4.000, 8.000, 15.00, 30.00, 60.00,
];

/// Register all metric descriptions
pub fn register_metrics() {
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

    describe_histogram!(
        format!("{}_stage_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Pipeline stage latency in seconds"
    );

    describe_counter!(
        format!("{}_stage_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Pipeline stages that failed with an adapter error"
    );

    describe_counter!(
        format!("{}_rerank_fallbacks_total", METRICS_PREFIX),
        Unit::Count,
        "Reranker responses that could not be parsed"
    );

    describe_counter!(
        format!("{}_insufficient_context_total", METRICS_PREFIX),
        Unit::Count,
        "Answers short-circuited for lack of retrieved text"
    );

    describe_counter!(
        format!("{}_memory_summaries_total", METRICS_PREFIX),
        Unit::Count,
        "Conversation memory summaries computed"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
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

/// Timer for one pipeline stage
pub struct StageTimer {
    start: Instant,
    stage: &'static str,
}

impl StageTimer {
    pub fn start(stage: &'static str) -> Self {
        Self {
            start: Instant::now(),
            stage,
        }
    }

    /// Record stage completion; returns elapsed milliseconds for logging
    pub fn finish(self, success: bool) -> u64 {
        let elapsed = self.start.elapsed();
        let status = if success { "success" } else { "error" };

        histogram!(
            format!("{}_stage_duration_seconds", METRICS_PREFIX),
            "stage" => self.stage,
            "status" => status
        )
        .record(elapsed.as_secs_f64());

        if !success {
            counter!(
                format!("{}_stage_errors_total", METRICS_PREFIX),
                "stage" => self.stage
            )
            .increment(1);
        }

        elapsed.as_millis() as u64
    }
}

pub fn record_rerank_fallback(reason: &'static str) {
    counter!(
        format!("{}_rerank_fallbacks_total", METRICS_PREFIX),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_insufficient_context() {
    counter!(format!("{}_insufficient_context_total", METRICS_PREFIX)).increment(1);
}

pub fn record_memory_summary() {
    counter!(format!("{}_memory_summaries_total", METRICS_PREFIX)).increment(1);
}
