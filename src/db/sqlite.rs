use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::TryStreamExt;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::db::{
    format_date, format_naive, format_timestamp, lossy_text, BackendKind, RelationalBackend,
};
use crate::error::Result;
use crate::models::{Condition, RawColumn, Row};
use crate::sql::{self, ColumnCasts, Statement};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;
        Ok(Self::from_pool(pool))
    }

    async fn fetch_json(&self, sql: &str) -> Result<Vec<Row>> {
        debug!(sql, "sqlite fetch");
        let rows: Vec<Row> = sqlx::query(sql)
            .fetch(&self.pool)
            .map_ok(|row| row_to_json(&row))
            .try_collect()
            .await?;
        Ok(rows)
    }

    async fn execute(&self, statement: Statement) -> Result<u64> {
        debug!(sql = %statement.sql, params = statement.params.len(), "sqlite execute");
        let mut query = sqlx::query(&statement.sql);
        for value in &statement.params {
            query = bind_value(query, value);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RelationalBackend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' \
               AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
               AND name NOT LIKE 'gorm\\_%' ESCAPE '\\' \
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get::<String, _>("name")).collect())
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<RawColumn>> {
        let sql = format!(
            "PRAGMA table_info({})",
            sql::quote_ident(BackendKind::Sqlite, table)
        );
        self.fetch_json(&sql).await
    }

    async fn count(&self, table: &str) -> Result<i64> {
        let sql = sql::count(BackendKind::Sqlite, table);
        let total: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(total)
    }

    async fn select(&self, table: &str, limit: u64, offset: u64) -> Result<Vec<Row>> {
        self.fetch_json(&sql::select_page(BackendKind::Sqlite, table, limit, offset))
            .await
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<u64> {
        let casts = ColumnCasts::new();
        self.execute(sql::insert(BackendKind::Sqlite, table, row, &casts))
            .await
    }

    async fn update_where(
        &self,
        table: &str,
        condition: &Condition,
        update: &Row,
    ) -> Result<u64> {
        let casts = ColumnCasts::new();
        let statement = sql::update_where(BackendKind::Sqlite, table, condition, update, &casts)?;
        self.execute(statement).await
    }

    async fn delete_where(&self, table: &str, condition: &Condition) -> Result<u64> {
        let casts = ColumnCasts::new();
        let statement = sql::delete_where(BackendKind::Sqlite, table, condition, &casts)?;
        self.execute(statement).await
    }
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

fn row_to_json(row: &SqliteRow) -> Row {
    row.columns()
        .iter()
        .map(|column| {
            (
                column.name().to_string(),
                map_sqlite_value(row, column.ordinal()),
            )
        })
        .collect()
}

fn map_sqlite_value(row: &SqliteRow, index: usize) -> Value {
    let value_ref = match row.try_get_raw(index) {
        Ok(v) => v,
        Err(_) => return Value::Null,
    };
    if value_ref.is_null() {
        return Value::Null;
    }

    // SQLite stores timestamps as text or numbers; the declared column type
    // is the only hint that a value is temporal.
    let declared = row.column(index).type_info().name().to_ascii_uppercase();
    if matches!(declared.as_str(), "DATETIME" | "TIMESTAMP" | "DATE") {
        if let Some(ts) = decode_temporal(row, index) {
            return Value::String(ts);
        }
    }

    let storage = value_ref.type_info().name().to_string();
    match storage.as_str() {
        "INTEGER" | "BOOLEAN" => row
            .try_get_unchecked::<i64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "REAL" | "NUMERIC" => row
            .try_get_unchecked::<f64, _>(index)
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(|bytes| Value::String(lossy_text(&bytes)))
            .unwrap_or(Value::Null),
        _ => row
            .try_get_unchecked::<String, _>(index)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

fn decode_temporal(row: &SqliteRow, index: usize) -> Option<String> {
    if let Ok(ts) = row.try_get_unchecked::<DateTime<Utc>, _>(index) {
        return Some(format_timestamp(ts));
    }
    if let Ok(ts) = row.try_get_unchecked::<NaiveDateTime, _>(index) {
        return Some(format_naive(ts));
    }
    row.try_get_unchecked::<NaiveDate, _>(index)
        .ok()
        .map(format_date)
}
