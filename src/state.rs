//! Shared application state for Axum handlers.
//!
//! - **Auth**: the credential gate
//! - **Publisher**: the shared broker handle
//! - **Metrics**: the recorder handlers write to, plus the in-memory view
//!   the summary endpoints read
//!
//! # Thread Safety
//!
//! Every component is `Arc`-backed or internally synchronized, so the state
//! is cloned per request without copying data.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::config::Config;
use crate::metrics::{FanoutSink, InMemorySink, MetricsRecorder, TelemetrySink};
use crate::middleware::AuthGate;
use crate::services::{BrokerTransport, PublishPolicy, Publisher};

/// Shared application state for Axum handlers.
///
/// # Lifecycle
///
/// Call `shutdown()` once, after the HTTP server has stopped, to flush and
/// close the broker connection:
///
/// ```rust,ignore
/// let state = AppState::new(config, transport, Some(Arc::new(PrometheusSink)));
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Credential check for `/message` and `/api/status`
    pub auth: AuthGate,
    /// Shared broker handle
    pub publisher: Publisher,
    /// Recorder used by handlers and middleware
    pub metrics: MetricsRecorder,
    /// In-memory aggregation behind the summary endpoints
    pub snapshot: Arc<InMemorySink>,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Assemble the state.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `transport` - Broker transport the publisher drives
    /// * `exporter` - Additional sink that receives every observation
    ///   (the Prometheus sink in production)
    pub fn new(
        config: Config,
        transport: Arc<dyn BrokerTransport>,
        exporter: Option<Arc<dyn TelemetrySink>>,
    ) -> Self {
        let snapshot = Arc::new(InMemorySink::new());

        let sink: Arc<dyn TelemetrySink> = match exporter {
            Some(exporter) => Arc::new(FanoutSink::new(vec![
                snapshot.clone() as Arc<dyn TelemetrySink>,
                exporter,
            ])),
            None => snapshot.clone(),
        };

        let publisher = Publisher::new(transport, PublishPolicy::from_config(&config));

        Self {
            auth: AuthGate::new(&config.api_keys),
            publisher,
            metrics: MetricsRecorder::new(sink),
            snapshot,
            started_at: Instant::now(),
            config: Arc::new(config),
        }
    }

    /// Time since the state was created.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Flush in-flight records and close the broker connection.
    ///
    /// Safe to call more than once; only the first call reaches the broker.
    pub async fn shutdown(&self) {
        info!(uptime_secs = self.uptime().as_secs(), "Closing publisher");

        match self.publisher.close().await {
            Ok(()) => info!("Publisher closed"),
            Err(e) => error!(error = %e, "Publisher close failed"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::metrics::{AUTH_SUCCESS, names};
    use crate::services::InMemoryTransport;

    fn config() -> Config {
        Config {
            api_keys: vec!["valid-key".to_string()],
            ..Config::default()
        }
    }

    #[test]
    fn test_state_auth_uses_configured_keys() {
        let state = AppState::new(config(), Arc::new(InMemoryTransport::new()), None);

        assert!(state.auth.authenticate(Some("valid-key")).is_ok());
        assert!(state.auth.authenticate(Some("other")).is_err());
    }

    #[test]
    fn test_recorder_feeds_snapshot_and_exporter() {
        let exporter = Arc::new(InMemorySink::new());
        let state = AppState::new(
            config(),
            Arc::new(InMemoryTransport::new()),
            Some(exporter.clone() as Arc<dyn TelemetrySink>),
        );

        state.metrics.record_auth_attempt(AUTH_SUCCESS);

        assert_eq!(state.snapshot.total(names::AUTH_ATTEMPTS_TOTAL), 1);
        assert_eq!(exporter.total(names::AUTH_ATTEMPTS_TOTAL), 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_transport_once() {
        let transport = Arc::new(InMemoryTransport::new());
        let state = AppState::new(config(), transport.clone(), None);

        state.shutdown().await;
        state.clone().shutdown().await;

        assert!(transport.is_closed());
        assert_eq!(transport.close_calls(), 1);
    }
}
