//! Table-level operations over whichever [`RelationalBackend`] is active:
//! introspection, paginated reads and condition-based mutations.
//!
//! Mutations describe the table first and reject any key that is not one of
//! its columns, so column names reaching statement text always come from the
//! catalog. Bulk operations run item by item; each item commits on its own
//! and a failing item never aborts its siblings.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::db::{BackendKind, RelationalBackend};
use crate::error::{Error, Result};
use crate::models::{ColumnMeta, Condition, ItemOutcome, Page, RawColumn, Row, UpdateRequest};
use crate::schema::normalize;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Turns a 1-based page request into `(limit, offset)`. Non-positive inputs
/// fall back to the defaults.
pub fn page_window(page: i64, page_size: i64) -> (u64, u64) {
    let page = (if page <= 0 { DEFAULT_PAGE } else { page }) as u64;
    let page_size = (if page_size <= 0 { DEFAULT_PAGE_SIZE } else { page_size }) as u64;
    (page_size, (page - 1).saturating_mul(page_size))
}

#[derive(Clone)]
pub struct TableGateway {
    backend: Arc<dyn RelationalBackend>,
    statement_timeout: Option<Duration>,
}

impl TableGateway {
    pub fn new(backend: Arc<dyn RelationalBackend>) -> Self {
        Self {
            backend,
            statement_timeout: None,
        }
    }

    pub fn with_statement_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement_timeout = timeout;
        self
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub async fn list_tables(&self) -> Result<Vec<String>> {
        self.bounded(self.backend.list_tables()).await
    }

    /// Column descriptions exactly as the backend catalog reports them.
    pub async fn describe_table(&self, table: &str) -> Result<Vec<RawColumn>> {
        require_table(table)?;
        self.bounded(self.backend.describe_table(table)).await
    }

    pub async fn columns(&self, table: &str) -> Result<Vec<ColumnMeta>> {
        let raw = self.describe_table(table).await?;
        Ok(raw.iter().map(normalize).collect())
    }

    /// Row order is whatever the backend returns for an unordered scan, so
    /// pages are not guaranteed stable against concurrent writes.
    pub async fn fetch_page(&self, table: &str, page: i64, page_size: i64) -> Result<Page> {
        require_table(table)?;
        let (limit, offset) = page_window(page, page_size);
        let total = self
            .bounded(self.backend.count(table))
            .await
            .map_err(|e| e.context("Failed to count records"))?;
        let rows = self
            .bounded(self.backend.select(table, limit, offset))
            .await
            .map_err(|e| e.context("Failed to get table data"))?;
        Ok(Page { total, rows })
    }

    pub async fn insert(&self, table: &str, row: &Row) -> Result<u64> {
        require_table(table)?;
        let columns = self.known_columns(table).await?;
        check_columns(&columns, row, "row")?;
        self.bounded(self.backend.insert(table, row)).await
    }

    pub async fn update(&self, table: &str, condition: &Condition, update: &Row) -> Result<u64> {
        require_table(table)?;
        require_update_maps(condition, update)?;
        let columns = self.known_columns(table).await?;
        self.apply_update(table, &columns, condition, update).await
    }

    pub async fn delete(&self, table: &str, condition: &Condition) -> Result<u64> {
        require_table(table)?;
        require_condition(condition)?;
        let columns = self.known_columns(table).await?;
        self.apply_delete(table, &columns, condition).await
    }

    pub async fn bulk_update(
        &self,
        table: &str,
        items: &[UpdateRequest],
    ) -> Result<Vec<ItemOutcome>> {
        require_table(table)?;
        if items.is_empty() {
            return Err(Error::invalid("Items are required for bulk update"));
        }
        let columns = self.known_columns(table).await?;

        let mut outcomes = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let mut outcome = match self
                .apply_update(table, &columns, &item.condition, &item.update)
                .await
            {
                Ok(rows) => ItemOutcome::succeeded(rows),
                Err(err) => {
                    warn!(table, index, error = %err, "bulk update item failed");
                    ItemOutcome::failed(err.to_string())
                }
            };
            outcome.id = item.condition.get("id").cloned();
            outcomes.push(outcome);
        }
        debug!(table, items = outcomes.len(), "bulk update finished");
        Ok(outcomes)
    }

    pub async fn bulk_delete(
        &self,
        table: &str,
        conditions: &[Condition],
    ) -> Result<Vec<ItemOutcome>> {
        require_table(table)?;
        if conditions.is_empty() {
            return Err(Error::invalid("Conditions are required for bulk delete"));
        }
        let columns = self.known_columns(table).await?;

        let mut outcomes = Vec::with_capacity(conditions.len());
        for (index, condition) in conditions.iter().enumerate() {
            let mut outcome = match self.apply_delete(table, &columns, condition).await {
                Ok(rows) => ItemOutcome::succeeded(rows),
                Err(err) => {
                    warn!(table, index, error = %err, "bulk delete item failed");
                    ItemOutcome::failed(err.to_string())
                }
            };
            match condition.get("id") {
                Some(id) => outcome.id = Some(id.clone()),
                None => outcome.condition = Some(condition.clone()),
            }
            outcomes.push(outcome);
        }
        debug!(table, items = outcomes.len(), "bulk delete finished");
        Ok(outcomes)
    }

    async fn known_columns(&self, table: &str) -> Result<Vec<ColumnMeta>> {
        let columns = self.columns(table).await?;
        if columns.is_empty() {
            return Err(Error::invalid(format!("table `{}` not found", table)));
        }
        Ok(columns)
    }

    async fn apply_update(
        &self,
        table: &str,
        columns: &[ColumnMeta],
        condition: &Condition,
        update: &Row,
    ) -> Result<u64> {
        require_update_maps(condition, update)?;
        check_columns(columns, condition, "condition")?;
        check_columns(columns, update, "update")?;
        self.bounded(self.backend.update_where(table, condition, update))
            .await
    }

    async fn apply_delete(
        &self,
        table: &str,
        columns: &[ColumnMeta],
        condition: &Condition,
    ) -> Result<u64> {
        require_condition(condition)?;
        check_columns(columns, condition, "condition")?;
        self.bounded(self.backend.delete_where(table, condition))
            .await
    }

    async fn bounded<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.statement_timeout {
            Some(limit) => tokio::time::timeout(limit, operation).await.map_err(|_| {
                Error::Database(format!("statement timed out after {}ms", limit.as_millis()))
            })?,
            None => operation.await,
        }
    }
}

fn require_table(table: &str) -> Result<()> {
    if table.trim().is_empty() {
        return Err(Error::invalid("Table name is required"));
    }
    Ok(())
}

fn require_update_maps(condition: &Condition, update: &Row) -> Result<()> {
    if condition.is_empty() || update.is_empty() {
        return Err(Error::invalid("Both condition and update are required"));
    }
    Ok(())
}

fn require_condition(condition: &Condition) -> Result<()> {
    if condition.is_empty() {
        return Err(Error::invalid("Condition is required for delete"));
    }
    Ok(())
}

fn check_columns(columns: &[ColumnMeta], map: &Row, role: &str) -> Result<()> {
    match map
        .keys()
        .find(|key| !columns.iter().any(|col| &col.name == *key))
    {
        Some(unknown) => Err(Error::invalid(format!(
            "unknown column `{}` in {}",
            unknown, role
        ))),
        None => Ok(()),
    }
}
