// lib.rs
//! Poll backend: create multiple-choice polls, share them by a short token,
//! and collect votes with live tallies.
//!
//! A vote passes through [`services::PollService::submit_vote`], which checks
//! that the poll is open, that the option exists, that the voter has not
//! already voted and that their address is under the rate limit, and then
//! commits the ledger entry together with the counter increment.
//!
//! Storage sits behind the traits in [`store`]; Postgres is the production
//! backend and an in-memory store backs the tests.

use std::sync::Arc;

use tokio::{
    net::TcpListener,
    signal::{self, ctrl_c},
};
use tracing::info;

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod origin;
pub mod poll;
pub mod retention;
pub mod routes;
pub mod services;
pub mod store;

use config::{Backend, Config, ConfigError};
use services::PollService;
use store::{MemoryStore, PgStore, VoteStore};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Builds the configured backend and serves until shutdown.
pub async fn start_server(config: Config) -> Result<(), BoxError> {
    match config.backend {
        Backend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or(ConfigError::Missing { key: "DATABASE_URL" })?;
            let pool = db::create_pool(url, config.max_connections).await?;
            serve(Arc::new(PgStore::new(pool)), &config).await
        }
        Backend::Memory => {
            info!("Using in-memory storage, data will not survive a restart");
            serve(Arc::new(MemoryStore::new()), &config).await
        }
    }
}

async fn serve<S: VoteStore>(store: Arc<S>, config: &Config) -> Result<(), BoxError> {
    let sweeper = retention::spawn_retention_task(
        store.clone(),
        config.policy.retention,
        config.retention_sweep,
    );

    let service = Arc::new(PollService::new(store, config.policy));
    let app = routes::create_routes(service)
        .layer(routes::cors_layer(config.cors_origin.as_deref()));

    let address = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
