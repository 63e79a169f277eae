//! Startup configuration read from the environment.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::error::Error;

const DEFAULT_SQLITE_PATH: &str = "one-api.db";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    Sqlite { url: String },
    MySql { url: String },
    Postgres { url: String },
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub target: DatabaseTarget,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub bind_addr: SocketAddr,
    /// Deadline applied to every backend call; `None` disables it.
    pub statement_timeout: Option<Duration>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let sqlite_path =
            lookup("SQLITE_PATH").unwrap_or_else(|| DEFAULT_SQLITE_PATH.to_string());
        let target = classify_dsn(&lookup("SQL_DSN").unwrap_or_default(), &sqlite_path)?;
        let max_connections = parse_u64(lookup("DB_MAX_CONNECTIONS"), 5, "DB_MAX_CONNECTIONS")?
            .clamp(1, u32::MAX as u64) as u32;
        let acquire_timeout_ms =
            parse_u64(lookup("DB_ACQUIRE_TIMEOUT_MS"), 3000, "DB_ACQUIRE_TIMEOUT_MS")?;
        let statement_timeout_ms =
            parse_u64(lookup("DB_STATEMENT_TIMEOUT_MS"), 0, "DB_STATEMENT_TIMEOUT_MS")?;
        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("invalid BIND_ADDR")?;

        Ok(Self {
            database: DatabaseConfig {
                target,
                max_connections,
                acquire_timeout: Duration::from_millis(acquire_timeout_ms),
            },
            bind_addr,
            statement_timeout: (statement_timeout_ms > 0)
                .then(|| Duration::from_millis(statement_timeout_ms)),
        })
    }
}

/// Picks the backend variant from the DSN scheme; an empty DSN means the
/// local SQLite file.
pub fn classify_dsn(dsn: &str, sqlite_path: &str) -> crate::Result<DatabaseTarget> {
    let dsn = dsn.trim();
    if dsn.is_empty() {
        return Ok(DatabaseTarget::Sqlite {
            url: format!("sqlite://{}?mode=rwc", sqlite_path),
        });
    }
    if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
        return Ok(DatabaseTarget::Postgres { url: dsn.to_string() });
    }
    if dsn.starts_with("mysql://") || dsn.starts_with("mariadb://") {
        return Ok(DatabaseTarget::MySql { url: dsn.to_string() });
    }
    if dsn.starts_with("sqlite:") {
        return Ok(DatabaseTarget::Sqlite { url: dsn.to_string() });
    }
    let scheme = dsn.split("://").next().unwrap_or(dsn);
    Err(Error::UnsupportedBackend(scheme.to_string()))
}

fn parse_u64(value: Option<String>, default: u64, name: &str) -> Result<u64> {
    match value {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid {name}: {raw}")),
        _ => Ok(default),
    }
}
