use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use crate::config::{DatabaseConfig, DatabaseTarget};
use crate::error::Result;
use crate::models::{Condition, RawColumn, Row};

pub mod mysql;
pub mod postgres;
pub mod sqlite;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sqlite,
    MySql,
    Postgres,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::MySql => "mysql",
            BackendKind::Postgres => "postgres",
        }
    }
}

#[async_trait]
pub trait RelationalBackend: Send + Sync {
    fn kind(&self) -> BackendKind;
    async fn list_tables(&self) -> Result<Vec<String>>;
    async fn describe_table(&self, table: &str) -> Result<Vec<RawColumn>>;
    async fn count(&self, table: &str) -> Result<i64>;
    async fn select(&self, table: &str, limit: u64, offset: u64) -> Result<Vec<Row>>;
    async fn insert(&self, table: &str, row: &Row) -> Result<u64>;
    async fn update_where(&self, table: &str, condition: &Condition, update: &Row) -> Result<u64>;
    async fn delete_where(&self, table: &str, condition: &Condition) -> Result<u64>;
}

pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn RelationalBackend>> {
    let backend: Arc<dyn RelationalBackend> = match &config.target {
        DatabaseTarget::Sqlite { url } => {
            Arc::new(sqlite::SqliteBackend::connect(url, config).await?)
        }
        DatabaseTarget::MySql { url } => {
            Arc::new(mysql::MySqlBackend::connect(url, config).await?)
        }
        DatabaseTarget::Postgres { url } => {
            Arc::new(postgres::PostgresBackend::connect(url, config).await?)
        }
    };
    Ok(backend)
}

/// Temporal values leave the service as UTC RFC 3339 with whole seconds.
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Zone-less timestamps are taken to be UTC.
pub(crate) fn format_naive(value: NaiveDateTime) -> String {
    format_timestamp(value.and_utc())
}

pub(crate) fn format_date(value: NaiveDate) -> String {
    format_naive(value.and_time(chrono::NaiveTime::MIN))
}

pub(crate) fn lossy_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
