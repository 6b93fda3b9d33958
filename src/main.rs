use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::{fs, net::TcpListener};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::services::{
    clock::{Clock, SystemClock},
    id_generator::IdGenerator,
    image_service::ImageService,
    object_store::ObjectStore,
    retention_index::RetentionIndex,
    sweeper::Sweeper,
};

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting image-drop with config: {:?}", cfg);

    // --- Ensure upload directory exists ---
    fs::create_dir_all(&cfg.upload_dir)
        .await
        .with_context(|| format!("creating upload directory {}", cfg.upload_dir.display()))?;

    // --- Wire the object lifecycle ---
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ids = IdGenerator::new(cfg.id_length, clock.clone());
    let store = Arc::new(ObjectStore::new(
        cfg.upload_dir.clone(),
        ids,
        cfg.max_upload_bytes,
    ));
    let index = Arc::new(RetentionIndex::new());
    let sweeper = Arc::new(Sweeper::new(
        store.clone(),
        index.clone(),
        clock,
        cfg.ttl,
    ));

    // Files from a previous run have no index entry and would never expire.
    sweeper.reconcile_startup().await;

    let shutdown = CancellationToken::new();
    let sweeper_task = sweeper.spawn(cfg.sweep_interval, shutdown.clone());

    // --- Build router ---
    let app: Router = routes::routes::routes(&cfg.public_dir, cfg.max_upload_bytes)
        .with_state(ImageService::new(store, index));

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await;

    // --- Stop background work ---
    shutdown.cancel();
    if let Err(err) = sweeper_task.await {
        tracing::warn!("sweeper task ended abnormally: {}", err);
    }

    served?;
    Ok(())
}

/// Resolves on Ctrl-C, or when `token` is cancelled elsewhere.
///
/// If the signal handler cannot be installed the error is logged and the
/// future resolves at once, so the server still drains and stops.
async fn shutdown_signal(token: CancellationToken) {
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(err) = res {
                tracing::error!("failed to listen for shutdown signal: {}", err);
                return;
            }
            tracing::info!("Shutdown requested");
        }
        _ = token.cancelled() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn shutdown_signal_resolves_on_cancel() {
        let token = CancellationToken::new();
        let waiter = tokio::spawn(shutdown_signal(token.clone()));
        token.cancel();

        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("shutdown signal did not resolve")
            .unwrap();
    }
}
