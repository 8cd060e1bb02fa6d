//! HTTP Server and Collection Startup
//!
//! Wires the exporter together and serves the Prometheus endpoint.
//!
//! # Startup
//!
//! 1. Remove a health marker left over from a previous run
//! 2. Load the metric schema (built-in or `collector.schema_path`)
//! 3. Register one metric per schema field
//! 4. Bind the metrics port
//! 5. Spawn the collection loop and serve
//!
//! Any failure before the loop starts is fatal and returned to `main`.
//!
//! # Endpoints
//!
//! - `GET /metrics` - Prometheus metrics in text format
//!
//! No other routes are served. Scrapes run concurrently with the collection
//! loop; the Prometheus metric types synchronise their own access.

use crate::collector::{Collector, HealthMarker};
use crate::config::{Config, InverterAddress};
use crate::error::ExporterError;
use crate::inverter::InverterClient;
use crate::metrics::MetricRegistry;
use crate::schema::MetricSchema;
use anyhow::Context;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[derive(Clone)]
struct AppState {
    registry: MetricRegistry,
}

pub async fn start(config: Config, address: InverterAddress) -> anyhow::Result<()> {
    HealthMarker::clear_stale(&config.collector)
        .context("Failed to remove stale health marker")?;

    let schema = match &config.collector.schema_path {
        Some(path) => {
            info!("Loading metric schema from {}", path.display());
            MetricSchema::from_file(path)?
        }
        None => MetricSchema::builtin()?,
    };
    let registry = MetricRegistry::build(schema)?;

    let client = InverterClient::new(address)?;
    let collector = Collector::from_config(client, registry.clone(), &config.collector);

    let addr = format!("{}:{}", config.server.addr, config.server.port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        ExporterError::Server(format!(
            "starting the http server on '{}' failed with: {}",
            addr, e
        ))
    })?;

    info!("Exposing metrics at http://{}/metrics", addr);

    tokio::spawn(collector.run());

    serve(listener, registry, config.server.exit_on_signal).await
}

/// Serve `/metrics` for `registry` on an already bound listener.
///
/// With `exit_on_signal` the server returns as soon as SIGINT or SIGTERM
/// arrives, which ends the process without waiting for the collection loop.
pub async fn serve(
    listener: TcpListener,
    registry: MetricRegistry,
    exit_on_signal: bool,
) -> anyhow::Result<()> {
    let app = router(registry);

    if exit_on_signal {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        axum::serve(listener, app).await?;
    }

    Ok(())
}

pub fn router(registry: MetricRegistry) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(AppState { registry })
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.registry.render() {
        Ok(metrics) => metrics.into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error rendering metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Received SIGINT, exiting"),
        _ = terminate => warn!("Received SIGTERM, exiting"),
    }
}
