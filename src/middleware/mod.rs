//! HTTP middleware.
//!
//! ```text
//! Request → Request ID → Trace → CORS → [RequireAuth] → Handler → Response
//!                                             ↓
//!                                       401 Unauthorized
//! ```
//!
//! Request IDs, tracing and CORS come from `tower-http` and are assembled in
//! [`crate::routes`]. Authentication lives here.

pub mod auth;

pub use auth::{AuthGate, BEARER_PREFIX, Identity, RequireAuth};
