//! API key authentication.
//!
//! # Security Features
//!
//! - **Constant-time comparison**: Prevents timing attacks on API key validation
//! - **Bearer or raw keys**: `Authorization: Bearer <key>` and `Authorization: <key>`
//!   are both accepted
//! - **No credential logging**: only a redacted prefix ever reaches the logs
//!
//! [`AuthGate`] is the pure decision function. [`RequireAuth`] wraps it as a
//! tower layer for routes that only need the yes/no answer; the publish
//! handler calls the gate itself so it can account for every outcome.
//!
//! # Usage
//!
//! ```bash
//! API_KEYS=key-one,key-two cargo run
//! curl -H "Authorization: Bearer key-one" http://localhost:8080/api/status
//! ```

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Request, Response};
use axum::response::IntoResponse;
use subtle::ConstantTimeEq;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::error::{AuthError, PipelineError};
use crate::metrics::{AUTH_FAILED, AUTH_SUCCESS, MetricsRecorder};

/// Prefix stripped from the `Authorization` header before comparison.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Characters of the credential kept when redacting.
const REDACTED_PREFIX_LEN: usize = 4;

/// The caller behind an accepted credential.
///
/// Formatting never reveals the full key.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    credential: Arc<str>,
}

impl Identity {
    /// The matched credential.
    pub fn credential(&self) -> &str {
        &self.credential
    }

    /// First few characters followed by `***`, safe for logs.
    pub fn redacted(&self) -> String {
        let prefix: String = self.credential.chars().take(REDACTED_PREFIX_LEN).collect();
        format!("{prefix}***")
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Identity").field(&self.redacted()).finish()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Checks presented credentials against the configured key set.
///
/// Holds no state beyond the immutable key set and performs no I/O.
#[derive(Clone)]
pub struct AuthGate {
    keys: Arc<[Arc<str>]>,
}

impl AuthGate {
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        Self {
            keys: keys.into_iter().map(|k| Arc::from(k.as_ref())).collect(),
        }
    }

    /// Decide on a raw `Authorization` header value.
    ///
    /// # Errors
    ///
    /// - `AuthError::Missing` when the header is absent or empty
    /// - `AuthError::Invalid` when no configured key matches exactly
    pub fn authenticate(&self, header: Option<&str>) -> Result<Identity, AuthError> {
        let raw = header.filter(|h| !h.is_empty()).ok_or(AuthError::Missing)?;
        let candidate = raw.strip_prefix(BEARER_PREFIX).unwrap_or(raw);

        self.keys
            .iter()
            .find(|key| constant_time_eq(candidate, key))
            .map(|key| Identity {
                credential: Arc::clone(key),
            })
            .ok_or(AuthError::Invalid)
    }

    /// Decide on the `Authorization` header of a request.
    ///
    /// A header that is not visible ASCII can never match and counts as invalid.
    pub fn authenticate_headers(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        match headers.get(AUTHORIZATION) {
            None => self.authenticate(None),
            Some(value) => match value.to_str() {
                Ok(text) => self.authenticate(Some(text)),
                Err(_) if value.is_empty() => Err(AuthError::Missing),
                Err(_) => Err(AuthError::Invalid),
            },
        }
    }
}

/// Perform constant-time comparison of two strings.
fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

// =============================================================================
// Layer
// =============================================================================

/// Rejects requests without a valid credential with 401.
///
/// Accepted requests carry their [`Identity`] as a request extension. Every
/// check is recorded as an auth attempt.
#[derive(Clone)]
pub struct RequireAuth {
    gate: AuthGate,
    metrics: MetricsRecorder,
}

impl RequireAuth {
    pub fn new(gate: AuthGate, metrics: MetricsRecorder) -> Self {
        Self { gate, metrics }
    }
}

impl<S> Layer<S> for RequireAuth {
    type Service = RequireAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireAuthService {
            inner,
            gate: self.gate.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// Service produced by [`RequireAuth`].
#[derive(Clone)]
pub struct RequireAuthService<S> {
    inner: S,
    gate: AuthGate,
    metrics: MetricsRecorder,
}

impl<S> Service<Request<Body>> for RequireAuthService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let outcome = self.gate.authenticate_headers(req.headers());
        let metrics = self.metrics.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match outcome {
                Ok(identity) => {
                    metrics.record_auth_attempt(AUTH_SUCCESS);
                    debug!(identity = %identity, "API key authentication successful");
                    req.extensions_mut().insert(identity);
                    inner.call(req).await
                }
                Err(e) => {
                    metrics.record_auth_attempt(AUTH_FAILED);
                    warn!(path = %req.uri().path(), reason = %e, "Authentication failed");
                    Ok(PipelineError::Auth(e).into_response())
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn gate() -> AuthGate {
        AuthGate::new(["valid-key", "second-key"])
    }

    #[test]
    fn test_bearer_credential_is_accepted() {
        let identity = gate().authenticate(Some("Bearer valid-key")).unwrap();
        assert_eq!(identity.credential(), "valid-key");
    }

    #[test]
    fn test_raw_credential_is_accepted() {
        let identity = gate().authenticate(Some("second-key")).unwrap();
        assert_eq!(identity.credential(), "second-key");
    }

    #[test]
    fn test_wrong_credential_is_invalid() {
        assert_eq!(
            gate().authenticate(Some("Bearer wrong")),
            Err(AuthError::Invalid)
        );
    }

    #[test]
    fn test_absent_or_empty_header_is_missing() {
        assert_eq!(gate().authenticate(None), Err(AuthError::Missing));
        assert_eq!(gate().authenticate(Some("")), Err(AuthError::Missing));
    }

    #[test]
    fn test_comparison_is_case_sensitive() {
        assert_eq!(
            gate().authenticate(Some("Bearer VALID-KEY")),
            Err(AuthError::Invalid)
        );
    }

    #[test]
    fn test_prefix_is_case_sensitive() {
        // "bearer " is not stripped, so the whole value is the credential
        assert_eq!(
            gate().authenticate(Some("bearer valid-key")),
            Err(AuthError::Invalid)
        );
    }

    #[test]
    fn test_bare_prefix_is_an_empty_credential() {
        assert_eq!(gate().authenticate(Some("Bearer ")), Err(AuthError::Invalid));
    }

    #[test]
    fn test_key_prefix_does_not_match() {
        assert_eq!(
            gate().authenticate(Some("valid-key-extra")),
            Err(AuthError::Invalid)
        );
        assert_eq!(gate().authenticate(Some("valid")), Err(AuthError::Invalid));
    }

    #[test]
    fn test_authenticate_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(gate().authenticate_headers(&headers), Err(AuthError::Missing));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer valid-key"));
        assert!(gate().authenticate_headers(&headers).is_ok());

        headers.insert(AUTHORIZATION, HeaderValue::from_bytes(b"\xffkey").unwrap());
        assert_eq!(gate().authenticate_headers(&headers), Err(AuthError::Invalid));
    }

    #[test]
    fn test_identity_is_redacted_in_output() {
        let identity = gate().authenticate(Some("valid-key")).unwrap();

        assert_eq!(identity.redacted(), "vali***");
        assert_eq!(identity.to_string(), "vali***");
        assert!(!format!("{identity:?}").contains("valid-key"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("secret123", "secret123"));
        assert!(!constant_time_eq("secret123", "secret456"));
        assert!(!constant_time_eq("short", "much-longer-string"));
    }
}
