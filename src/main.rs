//! Donut SMP poller - player statistics polling service
//!
//! Registers the configured players, polls their stats in the background
//! and serves the current state over a small HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use donut_smp_poller::api::{self, ApiState};
use donut_smp_poller::config::Config;
use donut_smp_poller::{Credentials, DonutClient, PollManager, ReqwestHttp};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "donut_smp_poller=info,tower_http=debug".into()),
        )
        .init();

    tracing::info!("Starting Donut SMP poller...");

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        "Configuration loaded ({} targets, interval {}s)",
        config.targets.len(),
        config.poll.interval_secs
    );

    // One pooled HTTP client shared by every target
    let http = Arc::new(ReqwestHttp::new()?);
    let client = Arc::new(DonutClient::new(http, &config.api)?);
    let manager = Arc::new(PollManager::new(client, config.poll.interval()));

    register_targets(&manager, &config).await;

    if config.server.enabled {
        let app = api::routes()
            .with_state(ApiState::new(manager.clone()))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive()),
            );

        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
        tracing::info!("Listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        shutdown_signal().await;
    }

    manager.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Register configured targets. Failures are logged and skipped.
async fn register_targets(manager: &PollManager, config: &Config) {
    for target in &config.targets {
        let credentials = match Credentials::new(&target.username, target.api_key.as_deref()) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Skipping target {:?}: {}", target.username, e);
                continue;
            }
        };

        if let Err(e) = manager.register(credentials).await {
            tracing::warn!("Target {} not registered: {}", target.username, e);
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
