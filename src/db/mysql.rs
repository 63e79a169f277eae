use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::TryStreamExt;
use serde_json::Value;
use sqlx::mysql::{MySql, MySqlArguments, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::db::{
    format_date, format_naive, format_timestamp, lossy_text, BackendKind, RelationalBackend,
};
use crate::error::Result;
use crate::models::{Condition, RawColumn, Row};
use crate::sql::{self, ColumnCasts, Statement};

type MySqlQuery<'q> = Query<'q, MySql, MySqlArguments>;

pub struct MySqlBackend {
    pool: MySqlPool,
}

impl MySqlBackend {
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(url)
            .await?;
        Ok(Self::from_pool(pool))
    }

    async fn fetch_json(&self, sql: &str) -> Result<Vec<Row>> {
        debug!(sql, "mysql fetch");
        let rows: Vec<Row> = sqlx::query(sql)
            .fetch(&self.pool)
            .map_ok(|row| row_to_json(&row))
            .try_collect()
            .await?;
        Ok(rows)
    }

    async fn execute(&self, statement: Statement) -> Result<u64> {
        debug!(sql = %statement.sql, params = statement.params.len(), "mysql execute");
        let mut query = sqlx::query(&statement.sql);
        for value in &statement.params {
            query = bind_value(query, value);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RelationalBackend for MySqlBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::MySql
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SHOW TABLES").fetch_all(&self.pool).await?;
        // The single column is named after the schema (`Tables_in_<db>`) and
        // may come back as VARBINARY depending on the server collation.
        Ok(rows
            .iter()
            .filter_map(|row| match row.try_get_unchecked::<String, _>(0) {
                Ok(name) => Some(name),
                Err(_) => row
                    .try_get_unchecked::<Vec<u8>, _>(0)
                    .ok()
                    .map(|bytes| lossy_text(&bytes)),
            })
            .collect())
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<RawColumn>> {
        let sql = format!("DESCRIBE {}", sql::quote_ident(BackendKind::MySql, table));
        self.fetch_json(&sql).await
    }

    async fn count(&self, table: &str) -> Result<i64> {
        let sql = sql::count(BackendKind::MySql, table);
        let total: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(total)
    }

    async fn select(&self, table: &str, limit: u64, offset: u64) -> Result<Vec<Row>> {
        self.fetch_json(&sql::select_page(BackendKind::MySql, table, limit, offset))
            .await
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<u64> {
        let casts = ColumnCasts::new();
        self.execute(sql::insert(BackendKind::MySql, table, row, &casts))
            .await
    }

    async fn update_where(
        &self,
        table: &str,
        condition: &Condition,
        update: &Row,
    ) -> Result<u64> {
        let casts = ColumnCasts::new();
        let statement = sql::update_where(BackendKind::MySql, table, condition, update, &casts)?;
        self.execute(statement).await
    }

    async fn delete_where(&self, table: &str, condition: &Condition) -> Result<u64> {
        let casts = ColumnCasts::new();
        let statement = sql::delete_where(BackendKind::MySql, table, condition, &casts)?;
        self.execute(statement).await
    }
}

fn bind_value<'q>(query: MySqlQuery<'q>, value: &Value) -> MySqlQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => query.bind(i),
            (None, Some(u)) => query.bind(u),
            _ => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

fn row_to_json(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .map(|column| {
            (
                column.name().to_string(),
                map_mysql_value(row, column.ordinal()),
            )
        })
        .collect()
}

fn map_mysql_value(row: &MySqlRow, index: usize) -> Value {
    let value_ref = match row.try_get_raw(index) {
        Ok(v) => v,
        Err(_) => return Value::Null,
    };
    if value_ref.is_null() {
        return Value::Null;
    }

    let type_name = row.column(index).type_info().name().to_string();
    match type_name.as_str() {
        "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => row
            .try_get_unchecked::<i64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row
            .try_get_unchecked::<u64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "FLOAT" => float_value(row.try_get_unchecked::<f32, _>(index).ok().map(f64::from)),
        "DOUBLE" => float_value(row.try_get_unchecked::<f64, _>(index).ok()),
        "DECIMAL" => row
            .try_get_unchecked::<BigDecimal, _>(index)
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row
            .try_get_unchecked::<DateTime<Utc>, _>(index)
            .map(|ts| Value::String(format_timestamp(ts)))
            .unwrap_or(Value::Null),
        "DATETIME" => row
            .try_get_unchecked::<NaiveDateTime, _>(index)
            .map(|ts| Value::String(format_naive(ts)))
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get_unchecked::<NaiveDate, _>(index)
            .map(|d| Value::String(format_date(d)))
            .unwrap_or(Value::Null),
        "JSON" => row
            .try_get_unchecked::<Value, _>(index)
            .unwrap_or(Value::Null),
        _ => match row.try_get_unchecked::<String, _>(index) {
            Ok(s) => Value::String(s),
            Err(_) => row
                .try_get_unchecked::<Vec<u8>, _>(index)
                .map(|bytes| Value::String(lossy_text(&bytes)))
                .unwrap_or_else(|_| Value::String(format!("<{}>", type_name))),
        },
    }
}

fn float_value(value: Option<f64>) -> Value {
    value
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
