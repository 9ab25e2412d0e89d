//! # Publish Gateway
//!
//! An authenticated HTTP front door for publishing records to Apache Iggy:
//!
//! - **Durable publishes**: success is reported only after the broker
//!   acknowledges the record
//! - **Bounded delivery**: per-phase timeouts and a fixed retry budget
//! - **Topic routing per request**: topics are created on first use
//! - **Observability**: structured logging, Prometheus metrics, JSON summaries
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Request ID → Trace → CORS → [RequireAuth])     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (publish, health, status, summaries)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  AuthGate · topic grammar · encoder · MetricsRecorder       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Publisher (timeouts, retry, backoff)                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BrokerTransport: IggyTransport | InMemoryTransport         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use publish_gateway::{AppState, Config, IggyTransport, build_router};
//!
//! # async fn start() -> Result<(), publish_gateway::AppError> {
//! let config = Config::from_env()?;
//! let transport = IggyTransport::connect(&config).await?;
//!
//! let state = AppState::new(config, Arc::new(transport), None);
//! let app = build_router(state);
//!
//! // Start the server...
//! # Ok(())
//! # }
//! ```
//!
//! ## Publishing
//!
//! ```bash
//! API_KEYS=secret cargo run
//! curl -H "Authorization: Bearer secret" \
//!      -d '{"topic":"orders.created","value":"hello"}' \
//!      http://localhost:8080/message
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod iggy_client;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult, BrokerError, PipelineError, PublishError};
pub use iggy_client::IggyTransport;
pub use routes::build_router;
pub use state::AppState;
