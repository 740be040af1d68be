//! Quiz Bowl Back binary entrypoint wiring the WebSocket, SSE, and snapshot
//! persistence layers.

use std::sync::Arc;
use std::{env, net::SocketAddr, path::PathBuf};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dao;
mod dto;
mod error;
mod routes;
mod services;
mod state;

use config::AppConfig;
use dao::{FileSnapshotStore, SnapshotStore};
use state::AppState;

/// Default location of the persisted game-state snapshot.
const DEFAULT_DATA_PATH: &str = "data/game-state.json";
/// Environment variable that overrides [`DEFAULT_DATA_PATH`].
const DATA_PATH_ENV: &str = "QUIZ_BOWL_BACK_DATA_PATH";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config, open_snapshot_store());

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Open the snapshot file store, falling back to in-memory-only operation
/// when the data directory cannot be created.
fn open_snapshot_store() -> Option<Arc<dyn SnapshotStore>> {
    let path = env::var_os(DATA_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH));

    match FileSnapshotStore::new(path) {
        Ok(store) => {
            info!(path = %store.path().display(), "snapshot persistence enabled");
            Some(Arc::new(store))
        }
        Err(err) => {
            warn!(error = %err, "snapshot persistence unavailable; running in memory only");
            None
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: state::SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
