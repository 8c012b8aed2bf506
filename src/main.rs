mod api;
mod config;
mod engine;
mod error;
mod events;
mod models;
mod notify;
mod observability;
mod state;
mod store;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::engine::assignment::AssignmentCoordinator;
use crate::engine::counters::{run_daily_reset, run_monthly_reset, CounterLifecycle};
use crate::events::{run_event_loop, Dispatcher};
use crate::notify::LogNotifier;
use crate::observability::metrics::Metrics;
use crate::store::memory::MemoryStore;
use crate::store::Store;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let (store, events_rx) = MemoryStore::new();
    let store: Arc<dyn Store> = Arc::new(store);
    let metrics = Metrics::new();
    let notifier = Arc::new(LogNotifier);

    let coordinator = Arc::new(AssignmentCoordinator::new(
        store.clone(),
        notifier,
        metrics.clone(),
        config.engine.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(coordinator, metrics.clone()));
    tokio::spawn(run_event_loop(dispatcher, events_rx));

    let lifecycle = Arc::new(CounterLifecycle::new(store.clone(), metrics.clone()));
    tokio::spawn(run_daily_reset(lifecycle.clone(), config.daily_reset_at));
    tokio::spawn(run_monthly_reset(
        lifecycle,
        config.monthly_reset_day,
        config.daily_reset_at,
    ));

    let app_state = Arc::new(state::AppState::new(store, metrics));
    let app = api::router(app_state);

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| error::AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "ops server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| error::AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
