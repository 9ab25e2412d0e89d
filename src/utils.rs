use std::time::Duration;

use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
///
/// A signal whose handler cannot be installed is logged and never fires; the
/// other one still works.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// How a server task ended once shutdown was requested.
#[derive(Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every in-flight request finished inside the grace period.
    Drained,
    /// The grace period elapsed and the task was aborted.
    Abandoned,
    /// The task failed or panicked.
    Failed,
}

/// Give a server task that has been told to stop up to `grace` to finish,
/// then abort it.
pub async fn drain<E>(server: &mut JoinHandle<Result<(), E>>, grace: Duration) -> DrainOutcome
where
    E: std::fmt::Display,
{
    match timeout(grace, &mut *server).await {
        Ok(Ok(Ok(()))) => {
            info!("All in-flight requests completed");
            DrainOutcome::Drained
        }
        Ok(Ok(Err(e))) => {
            error!("Server error: {e}");
            DrainOutcome::Failed
        }
        Ok(Err(e)) => {
            error!("Server task failed: {e}");
            DrainOutcome::Failed
        }
        Err(_) => {
            warn!(
                grace_secs = grace.as_secs(),
                "Grace period elapsed, abandoning in-flight requests"
            );
            server.abort();
            DrainOutcome::Abandoned
        }
    }
}
