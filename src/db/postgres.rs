use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::TryStreamExt;
use ipnetwork::IpNetwork;
use mac_address::MacAddress;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow, Postgres};
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

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(url)
            .await?;
        Ok(Self::from_pool(pool))
    }

    async fn fetch_json<'q>(&self, query: PgQuery<'q>) -> Result<Vec<Row>> {
        let rows: Vec<Row> = query
            .fetch(&self.pool)
            .map_ok(|row| row_to_json(&row))
            .try_collect()
            .await?;
        Ok(rows)
    }

    async fn execute(&self, statement: Statement) -> Result<u64> {
        debug!(sql = %statement.sql, params = statement.params.len(), "postgres execute");
        let mut query = sqlx::query(&statement.sql);
        for value in &statement.params {
            query = bind_value(query, value);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Placeholder casts for every column of `table`, read from `udt_name`.
    /// `data_type` would lose the enum name and turn `char(n)` into
    /// `character`, which is `character(1)`.
    async fn column_casts(&self, table: &str) -> Result<ColumnCasts> {
        let rows = sqlx::query(
            "SELECT column_name::text AS column_name, udt_schema::text AS udt_schema, \
                    udt_name::text AS udt_name \
             FROM information_schema.columns \
             WHERE table_schema = 'public' AND table_name = $1",
        )
        .bind(table.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut casts = ColumnCasts::new();
        for row in &rows {
            let column: String = row.try_get("column_name")?;
            let schema: String = row.try_get("udt_schema")?;
            let udt: String = row.try_get("udt_name")?;
            if let Some(cast) = cast_type(&schema, &udt) {
                casts.insert(column, cast);
            }
        }
        Ok(casts)
    }
}

/// Renders the type a placeholder is cast to, or `None` to leave the
/// parameter untyped.
///
/// Array columns (`_int4`, `_text`, ...) are skipped because their values are
/// bound as JSON text. `bit` without a modifier means `bit(1)`, so it widens to
/// `varbit` and the column's own length check still applies on assignment.
fn cast_type(udt_schema: &str, udt_name: &str) -> Option<String> {
    if udt_name.is_empty() || udt_name.starts_with('_') {
        return None;
    }
    let name = if udt_name == "bit" { "varbit" } else { udt_name };
    let plain = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if udt_schema == "pg_catalog" && plain {
        return Some(name.to_string());
    }
    Some(format!(
        "{}.{}",
        sql::quote_ident(BackendKind::Postgres, udt_schema),
        sql::quote_ident(BackendKind::Postgres, name)
    ))
}

#[async_trait]
impl RelationalBackend for PostgresBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT tablename::text AS tablename FROM pg_tables \
             WHERE schemaname = 'public' ORDER BY tablename",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get::<String, _>("tablename")).collect())
    }

    // information_schema columns are domain-typed; cast to text so the raw
    // description decodes uniformly.
    async fn describe_table(&self, table: &str) -> Result<Vec<RawColumn>> {
        let query = sqlx::query(
            "SELECT column_name::text AS column_name, data_type::text AS data_type, \
                    is_nullable::text AS is_nullable, column_default::text AS column_default \
             FROM information_schema.columns \
             WHERE table_schema = 'public' AND table_name = $1 \
             ORDER BY ordinal_position",
        )
        .bind(table.to_string());
        debug!(table, "postgres describe");
        self.fetch_json(query).await
    }

    async fn count(&self, table: &str) -> Result<i64> {
        let sql = sql::count(BackendKind::Postgres, table);
        let total: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(total)
    }

    async fn select(&self, table: &str, limit: u64, offset: u64) -> Result<Vec<Row>> {
        let sql = sql::select_page(BackendKind::Postgres, table, limit, offset);
        debug!(sql = %sql, "postgres fetch");
        self.fetch_json(sqlx::query(&sql)).await
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<u64> {
        let casts = self.column_casts(table).await?;
        self.execute(sql::insert(BackendKind::Postgres, table, row, &casts))
            .await
    }

    async fn update_where(
        &self,
        table: &str,
        condition: &Condition,
        update: &Row,
    ) -> Result<u64> {
        let casts = self.column_casts(table).await?;
        let statement =
            sql::update_where(BackendKind::Postgres, table, condition, update, &casts)?;
        self.execute(statement).await
    }

    async fn delete_where(&self, table: &str, condition: &Condition) -> Result<u64> {
        let casts = self.column_casts(table).await?;
        let statement = sql::delete_where(BackendKind::Postgres, table, condition, &casts)?;
        self.execute(statement).await
    }
}

// Textual values are cast by the placeholder (`$n::type`), so strings can
// reach temporal and numeric columns.
fn bind_value<'q>(query: PgQuery<'q>, value: &Value) -> PgQuery<'q> {
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

fn row_to_json(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .map(|column| {
            (
                column.name().to_string(),
                map_postgres_value(row, column.ordinal()),
            )
        })
        .collect()
}

fn map_postgres_value(row: &PgRow, index: usize) -> Value {
    let value_ref = match row.try_get_raw(index) {
        Ok(v) => v,
        Err(_) => return Value::Null,
    };
    if value_ref.is_null() {
        return Value::Null;
    }

    let type_info = value_ref.type_info();
    let type_name = type_info.name();

    match type_name {
        "BOOL" => json_or_null(row.try_get::<bool, _>(index).ok()),
        "INT2" => json_or_null(row.try_get::<i16, _>(index).ok()),
        "INT4" => json_or_null(row.try_get::<i32, _>(index).ok()),
        "INT8" => json_or_null(row.try_get::<i64, _>(index).ok()),
        "FLOAT4" => float_value(row.try_get::<f32, _>(index).ok().map(f64::from)),
        "FLOAT8" => float_value(row.try_get::<f64, _>(index).ok()),
        "TEXT" | "VARCHAR" | "CHAR" | "NAME" | "BPCHAR" => {
            json_or_null(row.try_get::<String, _>(index).ok())
        }
        "UUID" => json_or_null(
            row.try_get::<uuid::Uuid, _>(index)
                .ok()
                .map(|u| u.to_string()),
        ),
        "TIMESTAMPTZ" => json_or_null(
            row.try_get::<DateTime<Utc>, _>(index)
                .ok()
                .map(format_timestamp),
        ),
        "TIMESTAMP" => json_or_null(
            row.try_get::<NaiveDateTime, _>(index)
                .ok()
                .map(format_naive),
        ),
        "DATE" => json_or_null(row.try_get::<NaiveDate, _>(index).ok().map(format_date)),
        "NUMERIC" => json_or_null(
            row.try_get::<BigDecimal, _>(index)
                .ok()
                .map(|d| numeric_text(d, value_ref.as_bytes().ok())),
        ),
        "MONEY" => {
            // MONEY is a 64-bit count of cents on the wire.
            match value_ref.as_bytes() {
                Ok(bytes) if bytes.len() == 8 => {
                    let mut cents = [0u8; 8];
                    cents.copy_from_slice(bytes);
                    let cents = i64::from_be_bytes(cents);
                    Value::String(format!("{:.2}", cents as f64 / 100.0))
                }
                _ => Value::Null,
            }
        }
        "INET" | "CIDR" => json_or_null(
            row.try_get::<IpNetwork, _>(index)
                .ok()
                .map(|net| net.to_string()),
        ),
        "MACADDR" => json_or_null(
            row.try_get::<MacAddress, _>(index)
                .ok()
                .map(|mac| mac.to_string()),
        ),
        "JSON" | "JSONB" => row.try_get::<Value, _>(index).unwrap_or(Value::Null),
        "TEXT[]" | "VARCHAR[]" | "CHAR[]" | "NAME[]" | "BPCHAR[]" => {
            json_or_null(row.try_get::<Vec<String>, _>(index).ok())
        }
        "INT2[]" => json_or_null(row.try_get::<Vec<i16>, _>(index).ok()),
        "INT4[]" => json_or_null(row.try_get::<Vec<i32>, _>(index).ok()),
        "INT8[]" => json_or_null(row.try_get::<Vec<i64>, _>(index).ok()),
        "FLOAT4[]" => json_or_null(row.try_get::<Vec<f32>, _>(index).ok()),
        "FLOAT8[]" => json_or_null(row.try_get::<Vec<f64>, _>(index).ok()),
        "BOOL[]" => json_or_null(row.try_get::<Vec<bool>, _>(index).ok()),
        "JSON[]" | "JSONB[]" => json_or_null(row.try_get::<Vec<Value>, _>(index).ok()),
        "BYTEA" => json_or_null(
            row.try_get::<Vec<u8>, _>(index)
                .ok()
                .map(|bytes| lossy_text(&bytes)),
        ),
        _ => match row.try_get_unchecked::<String, _>(index) {
            Ok(s) => Value::String(s),
            Err(_) => match value_ref.as_bytes() {
                Ok(bytes) => match std::str::from_utf8(bytes) {
                    Ok(s) => Value::String(s.to_string()),
                    Err(_) => Value::String(format!("<{}>", type_name)),
                },
                Err(_) => Value::String(format!("<{}>", type_name)),
            },
        },
    }
}

/// Renders NUMERIC at the scale the server displays it with. The decoded
/// `BigDecimal` carries the scale of the base-10000 digit groups, so `1.50`
/// would otherwise come back as `1.5000`.
///
/// Binary layout: ndigits i16, weight i16, sign u16, dscale u16, digits.
fn numeric_text(value: BigDecimal, raw: Option<&[u8]>) -> String {
    match raw {
        Some(bytes) if bytes.len() >= 8 => {
            let dscale = u16::from_be_bytes([bytes[6], bytes[7]]);
            value.with_scale(i64::from(dscale)).to_string()
        }
        _ => value.to_string(),
    }
}

fn json_or_null<T: serde::Serialize>(value: Option<T>) -> Value {
    value
        .and_then(|v| serde_json::to_value(v).ok())
        .unwrap_or(Value::Null)
}

fn float_value(value: Option<f64>) -> Value {
    value
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
