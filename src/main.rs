use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use publish_gateway::logging::{LogFormat, init_logging};
use publish_gateway::metrics::{PrometheusSink, TelemetrySink, init_metrics};
use publish_gateway::{AppState, Config, IggyTransport, build_router, utils};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            let _ = init_logging("info", LogFormat::infer());
            error!("Configuration error: {e}");
            return Err(exitcode::CONFIG);
        }
    };

    init_logging(&config.log_level, config.log_format).map_err(|e| {
        eprintln!("Logging error: {e}");
        exitcode::CONFIG
    })?;

    info!(
        "Starting Publish Gateway v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!(
        host = %config.host,
        port = %config.port,
        stream = %config.stream,
        api_keys = config.api_keys.len(),
        "Configuration loaded"
    );

    // Metrics exporter
    let exporter: Option<Arc<dyn TelemetrySink>> = match config.metrics_addr() {
        Some(addr) => {
            init_metrics(addr).map_err(|e| {
                error!("Failed to start metrics exporter: {e}");
                exitcode::UNAVAILABLE
            })?;
            Some(Arc::new(PrometheusSink))
        }
        None => {
            info!("Prometheus exporter disabled (METRICS_PORT=0)");
            None
        }
    };

    // Broker transport
    info!("Connecting to Iggy server...");
    let transport = IggyTransport::connect(&config).await.map_err(|e| {
        error!("Failed to connect to Iggy server: {e}");
        exitcode::UNAVAILABLE
    })?;

    // Build application state and router
    let grace_period = config.shutdown_grace_period;
    let state = AppState::new(config.clone(), Arc::new(transport), exporter);
    let app = build_router(state.clone());

    // Start server
    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  POST /message          - Publish a message (auth required)");
    info!("  GET  /health           - Health check");
    info!("  GET  /api/status       - Service status (auth required)");
    info!("  GET  /api/metrics      - Metrics summary");
    info!("  GET  /api/topics       - Topics seen by the gateway");
    info!("  GET  /api/messages     - Recent publish outcomes");

    let stop_accepting = CancellationToken::new();
    let mut server = tokio::spawn({
        let stop_accepting = stop_accepting.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(stop_accepting.cancelled_owned())
                .await
        }
    });

    let exit = tokio::select! {
        () = utils::shutdown_signal() => {
            stop_accepting.cancel();
            info!(grace_secs = grace_period.as_secs(), "Draining in-flight requests...");
            match utils::drain(&mut server, grace_period).await {
                utils::DrainOutcome::Failed => Err(exitcode::SOFTWARE),
                _ => Ok(()),
            }
        }
        result = &mut server => {
            error!("HTTP server stopped unexpectedly");
            match result {
                Ok(Err(e)) => error!("Server error: {e}"),
                Err(e) => error!("Server task failed: {e}"),
                Ok(Ok(())) => {}
            }
            Err(exitcode::SOFTWARE)
        }
    };

    // Flush and close the broker connection
    info!("HTTP server stopped, closing publisher...");
    state.shutdown().await;

    info!("Server shutdown complete");
    exit
}
