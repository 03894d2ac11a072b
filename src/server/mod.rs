//! HTTP server module
//!
//! Provides the Axum-based ingest server. Messages published to
//! `POST /publish` enter the queue consumed by the rule pipeline.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::metrics::PipelineStats;
use crate::pipeline::Pipeline;
use crate::sink::RecordSink;
use crate::source::{IngestSource, MessageQueue, MessageSource, QueueSender};
use crate::transformer::{RuleEngine, RuleSet};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Source feeding the message queue
    pub source: Arc<IngestSource>,
    /// Consumer statistics
    pub stats: Arc<PipelineStats>,
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route("/publish", post(handlers::publish))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create the ingest source and subscribe to every rule group
///
/// Groups whose normalized pattern is not a valid subscription filter are
/// logged and left out.
pub fn subscribe_all(config: &Config, engine: &RuleEngine, sender: QueueSender) -> IngestSource {
    let mut source = IngestSource::new(config.mqtt.prefix.clone(), sender);

    for filter in engine.rules().subscriptions() {
        if let Err(e) = source.subscribe(filter) {
            error!(filter = %filter, error = %e, "Cannot subscribe");
        }
    }

    source
}

/// Run the ingest server and the queue consumer
///
/// # Arguments
/// * `config` - Application configuration
/// * `sink` - Destination of the built records
///
/// # Errors
/// Returns an error if the server fails to start
pub async fn run<S: RecordSink + 'static>(config: Config, sink: S) -> Result<()> {
    let bind_address = config.server.bind_address.clone();
    let port = config.server.port;

    let rules = RuleSet::from_config(config.rules());
    if rules.is_empty() {
        warn!("No usable rules loaded; every message will be ignored");
    }
    let engine = Arc::new(RuleEngine::new(rules));

    let (sender, receiver) = MessageQueue::bounded(config.engine.queue_capacity);
    let source = Arc::new(subscribe_all(&config, &engine, sender));

    let stats = Arc::new(PipelineStats::new());
    let consumer = Pipeline::new(Arc::clone(&engine), Arc::new(sink), receiver)
        .with_stats(Arc::clone(&stats))
        .spawn();

    let state = AppState {
        config: Arc::new(config),
        source: Arc::clone(&source),
        stats,
    };
    let app = router(state);

    // Handle "localhost" specially, otherwise parse as IP address
    let bind_addr: std::net::IpAddr = if bind_address == "localhost" {
        std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST)
    } else {
        bind_address.parse().map_err(|e| {
            anyhow::anyhow!(
                "Invalid bind_address '{}': {}. Use an IP address (e.g., '0.0.0.0', '127.0.0.1') or 'localhost'.",
                bind_address,
                e
            )
        })?
    };
    let addr = SocketAddr::from((bind_addr, port));
    info!(address = %addr, prefix = %source.prefix(), "Server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, draining queue");
    if let Err(e) = source.shutdown().await {
        warn!(error = %e, "Consumer already stopped");
    }

    let stats = consumer.await?.snapshot();
    info!(
        received = stats.received,
        written = stats.written,
        write_failures = stats.write_failures,
        "Shutdown complete"
    );
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
