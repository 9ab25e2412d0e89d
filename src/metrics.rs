//! Gateway telemetry.
//!
//! Handlers talk to a [`MetricsRecorder`], a typed facade over an injected
//! [`TelemetrySink`]. Production wires a [`FanoutSink`] that feeds both the
//! Prometheus exporter and an [`InMemorySink`]; the in-memory view is what the
//! JSON summary endpoints read.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `gateway_messages_processed_total` - Publish outcomes (labels: topic, status)
//! - `gateway_broker_errors_total` - Publish failures (labels: topic, error_type)
//! - `gateway_auth_attempts_total` - Credential checks (labels: status)
//!
//! ## Histograms
//! - `gateway_request_duration_seconds` - Handler duration (labels: method, endpoint)
//! - `gateway_http_response_time_seconds` - Response time (labels: endpoint, method, status_code)
//!
//! # Usage
//!
//! ```rust,ignore
//! use publish_gateway::metrics::{InMemorySink, MetricsRecorder, OUTCOME_SUCCESS};
//!
//! let sink = Arc::new(InMemorySink::new());
//! let recorder = MetricsRecorder::new(sink.clone());
//! recorder.record_message_processed("orders", OUTCOME_SUCCESS);
//! assert_eq!(sink.summary().messages_processed.success, 1);
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::{Label, counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::{AuthCounts, MetricsSummary, OutcomeCounts, RecentMessage, TopicSummary};

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUEST_DURATION_SECONDS: &str = "gateway_request_duration_seconds";
    pub const HTTP_RESPONSE_TIME_SECONDS: &str = "gateway_http_response_time_seconds";
    pub const MESSAGES_PROCESSED_TOTAL: &str = "gateway_messages_processed_total";
    pub const BROKER_ERRORS_TOTAL: &str = "gateway_broker_errors_total";
    pub const AUTH_ATTEMPTS_TOTAL: &str = "gateway_auth_attempts_total";
}

/// Outcome label values.
pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_ERROR: &str = "error";
pub const AUTH_SUCCESS: &str = "success";
pub const AUTH_FAILED: &str = "failed";

/// Histogram buckets in seconds.
pub const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Label set attached to one observation.
pub type Labels = [(&'static str, String)];

// =============================================================================
// Sinks
// =============================================================================

/// Destination for counter increments and histogram observations.
pub trait TelemetrySink: Send + Sync {
    fn increment(&self, name: &'static str, labels: &Labels);

    fn observe(&self, name: &'static str, labels: &Labels, value: f64);
}

/// Forwards to the global `metrics` recorder installed by [`init_metrics`].
///
/// Without an installed recorder every call is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusSink;

fn to_metric_labels(labels: &Labels) -> Vec<Label> {
    labels
        .iter()
        .map(|(key, value)| Label::new(*key, value.clone()))
        .collect()
}

impl TelemetrySink for PrometheusSink {
    fn increment(&self, name: &'static str, labels: &Labels) {
        counter!(name, to_metric_labels(labels)).increment(1);
    }

    fn observe(&self, name: &'static str, labels: &Labels, value: f64) {
        histogram!(name, to_metric_labels(labels)).record(value);
    }
}

/// Identity of one time series: metric name plus labels sorted by key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct SeriesKey {
    name: &'static str,
    labels: Vec<(&'static str, String)>,
}

impl SeriesKey {
    fn new(name: &'static str, labels: &Labels) -> Self {
        let mut labels = labels.to_vec();
        labels.sort();
        Self { name, labels }
    }

    fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Aggregated state of one series. Counters only use `count`.
#[derive(Debug, Clone, Copy)]
struct Series {
    count: u64,
    sum: f64,
    last_updated: DateTime<Utc>,
}

/// In-process aggregation, one entry per series.
///
/// Backs the summary endpoints and doubles as the test fake. Entries live for
/// the whole process. Topic-labelled series are only created for
/// authenticated requests whose topic passed the grammar, at most seven per
/// topic (two outcomes and five error kinds), so memory grows with the number
/// of distinct topics published to.
#[derive(Debug, Default)]
pub struct InMemorySink {
    series: DashMap<SeriesKey, Series>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, name: &'static str, labels: &Labels, value: f64) {
        let now = Utc::now();
        let mut entry = self
            .series
            .entry(SeriesKey::new(name, labels))
            .or_insert(Series {
                count: 0,
                sum: 0.0,
                last_updated: now,
            });
        entry.count += 1;
        entry.sum += value;
        entry.last_updated = now;
    }

    /// Count of one exact series. Label order does not matter.
    pub fn count(&self, name: &'static str, labels: &Labels) -> u64 {
        self.series
            .get(&SeriesKey::new(name, labels))
            .map_or(0, |s| s.count)
    }

    /// Count summed over every series of `name`.
    pub fn total(&self, name: &str) -> u64 {
        self.series
            .iter()
            .filter(|e| e.key().name == name)
            .map(|e| e.value().count)
            .sum()
    }

    /// Value sum over every series of `name`.
    pub fn sum(&self, name: &str) -> f64 {
        self.series
            .iter()
            .filter(|e| e.key().name == name)
            .map(|e| e.value().sum)
            .sum()
    }

    /// Totals behind `GET /api/metrics`.
    pub fn summary(&self) -> MetricsSummary {
        let mut messages_processed = OutcomeCounts::default();
        let mut auth_attempts = AuthCounts::default();

        for entry in self.series.iter() {
            let (key, series) = (entry.key(), entry.value());
            match (key.name, key.label("status")) {
                (names::MESSAGES_PROCESSED_TOTAL, Some(OUTCOME_SUCCESS)) => {
                    messages_processed.success += series.count;
                }
                (names::MESSAGES_PROCESSED_TOTAL, Some(OUTCOME_ERROR)) => {
                    messages_processed.error += series.count;
                }
                (names::AUTH_ATTEMPTS_TOTAL, Some(AUTH_SUCCESS)) => {
                    auth_attempts.success += series.count;
                }
                (names::AUTH_ATTEMPTS_TOTAL, Some(AUTH_FAILED)) => {
                    auth_attempts.failed += series.count;
                }
                _ => {}
            }
        }

        let total_messages = messages_processed.success + messages_processed.error;

        MetricsSummary {
            messages_processed,
            broker_errors: self.total(names::BROKER_ERRORS_TOTAL),
            auth_attempts,
            request_duration_sum: self.sum(names::REQUEST_DURATION_SECONDS),
            total_messages,
        }
    }

    /// Processed-message totals per topic, sorted by name.
    pub fn topics(&self) -> Vec<TopicSummary> {
        let mut per_topic: BTreeMap<String, u64> = BTreeMap::new();

        for entry in self.series.iter() {
            if entry.key().name != names::MESSAGES_PROCESSED_TOTAL {
                continue;
            }
            if let Some(topic) = entry.key().label("topic") {
                *per_topic.entry(topic.to_string()).or_default() += entry.value().count;
            }
        }

        per_topic
            .into_iter()
            .map(|(name, message_count)| TopicSummary {
                name,
                message_count,
            })
            .collect()
    }

    /// One entry per topic/outcome series, sorted by topic then status.
    pub fn recent_messages(&self) -> Vec<RecentMessage> {
        let mut messages: Vec<RecentMessage> = self
            .series
            .iter()
            .filter(|e| e.key().name == names::MESSAGES_PROCESSED_TOTAL && e.value().count > 0)
            .filter_map(|e| {
                Some(RecentMessage {
                    topic: e.key().label("topic")?.to_string(),
                    status: e.key().label("status")?.to_string(),
                    count: e.value().count,
                    timestamp: e.value().last_updated,
                })
            })
            .collect();

        messages.sort_by(|a, b| (&a.topic, &a.status).cmp(&(&b.topic, &b.status)));
        messages
    }
}

impl TelemetrySink for InMemorySink {
    fn increment(&self, name: &'static str, labels: &Labels) {
        self.record(name, labels, 1.0);
    }

    fn observe(&self, name: &'static str, labels: &Labels, value: f64) {
        self.record(name, labels, value);
    }
}

/// Delivers every observation to each inner sink.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }
}

impl TelemetrySink for FanoutSink {
    fn increment(&self, name: &'static str, labels: &Labels) {
        for sink in &self.sinks {
            sink.increment(name, labels);
        }
    }

    fn observe(&self, name: &'static str, labels: &Labels, value: f64) {
        for sink in &self.sinks {
            sink.observe(name, labels, value);
        }
    }
}

// =============================================================================
// Recorder
// =============================================================================

/// Typed recording API used by the handlers.
#[derive(Clone)]
pub struct MetricsRecorder {
    sink: Arc<dyn TelemetrySink>,
}

impl MetricsRecorder {
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self { sink }
    }

    /// Record handler duration.
    pub fn record_request_duration(&self, method: &str, endpoint: &str, duration_secs: f64) {
        self.sink.observe(
            names::REQUEST_DURATION_SECONDS,
            &[
                ("method", method.to_string()),
                ("endpoint", endpoint.to_string()),
            ],
            duration_secs,
        );
    }

    /// Record response time with the final status code.
    pub fn record_http_latency(&self, endpoint: &str, method: &str, status: u16, duration_secs: f64) {
        self.sink.observe(
            names::HTTP_RESPONSE_TIME_SECONDS,
            &[
                ("endpoint", endpoint.to_string()),
                ("method", method.to_string()),
                ("status_code", status.to_string()),
            ],
            duration_secs,
        );
    }

    /// Record a publish outcome (`success` or `error`).
    pub fn record_message_processed(&self, topic: &str, outcome: &str) {
        self.sink.increment(
            names::MESSAGES_PROCESSED_TOTAL,
            &[("topic", topic.to_string()), ("status", outcome.to_string())],
        );
    }

    /// Record a publish failure by kind.
    pub fn record_broker_error(&self, topic: &str, kind: &str) {
        self.sink.increment(
            names::BROKER_ERRORS_TOTAL,
            &[("topic", topic.to_string()), ("error_type", kind.to_string())],
        );
    }

    /// Record a credential check (`success` or `failed`).
    pub fn record_auth_attempt(&self, outcome: &str) {
        self.sink
            .increment(names::AUTH_ATTEMPTS_TOTAL, &[("status", outcome.to_string())]);
    }
}

// =============================================================================
// Exporter
// =============================================================================

/// Initialize the Prometheus metrics exporter.
///
/// Starts the scrape listener on `metrics_addr` and describes every gateway
/// metric.
///
/// # Errors
///
/// Returns `AppError::MetricsError` if the exporter cannot be installed
/// (address in use, recorder already set).
pub fn init_metrics(metrics_addr: SocketAddr) -> AppResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .set_buckets_for_metric(
            Matcher::Suffix("_seconds".to_string()),
            DURATION_BUCKETS,
        )
        .map_err(|e| AppError::MetricsError(e.to_string()))?
        .install()
        .map_err(|e| AppError::MetricsError(format!("Failed to install Prometheus exporter: {e}")))?;

    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "Duration of HTTP requests in seconds"
    );
    describe_histogram!(
        names::HTTP_RESPONSE_TIME_SECONDS,
        "HTTP response time in seconds"
    );
    describe_counter!(
        names::MESSAGES_PROCESSED_TOTAL,
        "Total number of messages processed"
    );
    describe_counter!(
        names::BROKER_ERRORS_TOTAL,
        "Total number of broker errors"
    );
    describe_counter!(
        names::AUTH_ATTEMPTS_TOTAL,
        "Total number of authentication attempts"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<InMemorySink>, MetricsRecorder) {
        let sink = Arc::new(InMemorySink::new());
        (sink.clone(), MetricsRecorder::new(sink))
    }

    #[test]
    fn test_counters_are_per_series() {
        let (sink, metrics) = recorder();

        metrics.record_message_processed("orders", OUTCOME_SUCCESS);
        metrics.record_message_processed("orders", OUTCOME_SUCCESS);
        metrics.record_message_processed("orders", OUTCOME_ERROR);
        metrics.record_message_processed("payments", OUTCOME_SUCCESS);

        let orders_ok = [("topic", "orders".to_string()), ("status", "success".to_string())];
        assert_eq!(sink.count(names::MESSAGES_PROCESSED_TOTAL, &orders_ok), 2);
        assert_eq!(sink.total(names::MESSAGES_PROCESSED_TOTAL), 4);
    }

    #[test]
    fn test_label_order_does_not_split_series() {
        let sink = InMemorySink::new();
        sink.increment("x", &[("a", "1".into()), ("b", "2".into())]);
        sink.increment("x", &[("b", "2".into()), ("a", "1".into())]);

        assert_eq!(sink.count("x", &[("a", "1".into()), ("b", "2".into())]), 2);
    }

    #[test]
    fn test_histogram_tracks_count_and_sum() {
        let (sink, metrics) = recorder();

        metrics.record_request_duration("POST", "/message", 0.25);
        metrics.record_request_duration("POST", "/message", 0.5);

        assert_eq!(sink.total(names::REQUEST_DURATION_SECONDS), 2);
        assert!((sink.sum(names::REQUEST_DURATION_SECONDS) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_summary_totals() {
        let (sink, metrics) = recorder();

        metrics.record_message_processed("orders", OUTCOME_SUCCESS);
        metrics.record_message_processed("payments", OUTCOME_SUCCESS);
        metrics.record_message_processed("orders", OUTCOME_ERROR);
        metrics.record_broker_error("orders", "send_error");
        metrics.record_auth_attempt(AUTH_SUCCESS);
        metrics.record_auth_attempt(AUTH_SUCCESS);
        metrics.record_auth_attempt(AUTH_FAILED);
        metrics.record_request_duration("POST", "/message", 0.5);

        let summary = sink.summary();
        assert_eq!(summary.messages_processed.success, 2);
        assert_eq!(summary.messages_processed.error, 1);
        assert_eq!(summary.total_messages, 3);
        assert_eq!(summary.broker_errors, 1);
        assert_eq!(summary.auth_attempts.success, 2);
        assert_eq!(summary.auth_attempts.failed, 1);
        assert!((summary.request_duration_sum - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_topics_are_sorted_and_summed() {
        let (sink, metrics) = recorder();

        metrics.record_message_processed("zeta", OUTCOME_SUCCESS);
        metrics.record_message_processed("alpha", OUTCOME_SUCCESS);
        metrics.record_message_processed("alpha", OUTCOME_ERROR);

        let topics = sink.topics();
        let view: Vec<(&str, u64)> = topics
            .iter()
            .map(|t| (t.name.as_str(), t.message_count))
            .collect();
        assert_eq!(view, vec![("alpha", 2), ("zeta", 1)]);
    }

    #[test]
    fn test_recent_messages_one_entry_per_series() {
        let (sink, metrics) = recorder();

        metrics.record_message_processed("orders", OUTCOME_ERROR);
        metrics.record_message_processed("orders", OUTCOME_SUCCESS);
        metrics.record_message_processed("orders", OUTCOME_SUCCESS);
        metrics.record_auth_attempt(AUTH_SUCCESS);

        let recent = sink.recent_messages();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].status, "error");
        assert_eq!(recent[1].status, "success");
        assert_eq!(recent[1].count, 2);
        assert!(recent[1].timestamp >= recent[0].timestamp);
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let first = Arc::new(InMemorySink::new());
        let second = Arc::new(InMemorySink::new());
        let metrics = MetricsRecorder::new(Arc::new(FanoutSink::new(vec![
            first.clone() as Arc<dyn TelemetrySink>,
            second.clone(),
            Arc::new(PrometheusSink),
        ])));

        metrics.record_auth_attempt(AUTH_FAILED);

        assert_eq!(first.total(names::AUTH_ATTEMPTS_TOTAL), 1);
        assert_eq!(second.total(names::AUTH_ATTEMPTS_TOTAL), 1);
    }

    #[test]
    fn test_prometheus_sink_without_recorder_is_noop() {
        // Should not panic even without metrics initialized
        let metrics = MetricsRecorder::new(Arc::new(PrometheusSink));
        metrics.record_http_latency("/message", "POST", 200, 0.01);
        metrics.record_broker_error("orders", "ack_timeout");
    }
}
