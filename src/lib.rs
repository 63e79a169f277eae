pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod schema;
pub mod sql;
pub mod state;

use anyhow::Context;
use tracing::info;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use gateway::TableGateway;
pub use state::AppState;

/// Connects the configured backend and serves the HTTP API until the
/// listener fails.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let backend = db::connect(&config.database)
        .await
        .context("failed to connect to database")?;
    let gateway = TableGateway::new(backend).with_statement_timeout(config.statement_timeout);
    info!(backend = gateway.backend_kind().name(), "database connected");

    let app = api::router(AppState::new(gateway));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
