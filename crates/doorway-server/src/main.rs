//! Doorway Server: Application entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use doorway_auth::{DeliveryQueue, LogMailer, spawn_delivery_worker};
use doorway_db::{DbManager, run_migrations};
use doorway_server::config::ServerConfig;
use doorway_server::{AppState, auth_service, router};
use tracing_subscriber::EnvFilter;

const PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("doorway=info".parse()?))
        .json()
        .init();

    tracing::info!("Starting Doorway server...");

    let config = ServerConfig::from_env()?;

    let manager = DbManager::connect(&config.db).await?;
    let db = manager.client().clone();
    run_migrations(&db).await?;

    let (deliveries, outbox) = DeliveryQueue::channel();
    let state = AppState::new(db.clone(), auth_service(&db, config.auth.clone(), deliveries));
    let mailer = spawn_delivery_worker(outbox, Arc::clone(&state.auth), LogMailer);

    let auth = Arc::clone(&state.auth);
    let pruner = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = auth.prune().await {
                tracing::warn!(error = %e, "pruning failed");
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    pruner.abort();
    // Links already requested still go out.
    mailer.shutdown().await;
    tracing::info!("Doorway server stopped.");
    Ok(())
}
