//! Statement text for the generic table operations.
//!
//! Identifiers are always quoted for the active dialect; values never reach
//! the SQL text and travel as bound parameters in [`Statement::params`].

use std::collections::HashMap;

use serde_json::Value;

use crate::db::BackendKind;
use crate::error::{Error, Result};
use crate::models::{Condition, Row};

/// Column name to the type expression its PostgreSQL placeholder is cast to.
/// Entries are rendered by the backend from catalog data and used verbatim.
pub type ColumnCasts = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

pub fn quote_ident(kind: BackendKind, ident: &str) -> String {
    match kind {
        BackendKind::MySql => format!("`{}`", ident.replace('`', "``")),
        BackendKind::Sqlite | BackendKind::Postgres => {
            format!("\"{}\"", ident.replace('"', "\"\""))
        }
    }
}

pub fn count(kind: BackendKind, table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", quote_ident(kind, table))
}

pub fn select_page(kind: BackendKind, table: &str, limit: u64, offset: u64) -> String {
    format!(
        "SELECT * FROM {} LIMIT {} OFFSET {}",
        quote_ident(kind, table),
        limit,
        offset
    )
}

pub fn insert(kind: BackendKind, table: &str, row: &Row, casts: &ColumnCasts) -> Statement {
    let mut builder = Builder::new(kind, casts);
    builder.sql = format!("INSERT INTO {}", quote_ident(kind, table));

    if row.is_empty() {
        match kind {
            BackendKind::MySql => builder.sql.push_str(" () VALUES ()"),
            BackendKind::Sqlite | BackendKind::Postgres => builder.sql.push_str(" DEFAULT VALUES"),
        }
        return builder.finish();
    }

    let columns: Vec<String> = row.keys().map(|col| quote_ident(kind, col)).collect();
    let placeholders: Vec<String> = row
        .iter()
        .map(|(col, value)| builder.placeholder(col, value))
        .collect();
    builder.sql.push_str(&format!(
        " ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    ));
    builder.finish()
}

pub fn update_where(
    kind: BackendKind,
    table: &str,
    condition: &Condition,
    update: &Row,
    casts: &ColumnCasts,
) -> Result<Statement> {
    if condition.is_empty() || update.is_empty() {
        return Err(Error::invalid("Both condition and update are required"));
    }

    let mut builder = Builder::new(kind, casts);
    let assignments: Vec<String> = update
        .iter()
        .map(|(col, value)| {
            let placeholder = builder.placeholder(col, value);
            format!("{} = {}", quote_ident(kind, col), placeholder)
        })
        .collect();
    builder.sql = format!(
        "UPDATE {} SET {}",
        quote_ident(kind, table),
        assignments.join(", ")
    );
    builder.push_predicate(condition);
    Ok(builder.finish())
}

pub fn delete_where(
    kind: BackendKind,
    table: &str,
    condition: &Condition,
    casts: &ColumnCasts,
) -> Result<Statement> {
    if condition.is_empty() {
        return Err(Error::invalid("Condition is required for delete"));
    }

    let mut builder = Builder::new(kind, casts);
    builder.sql = format!("DELETE FROM {}", quote_ident(kind, table));
    builder.push_predicate(condition);
    Ok(builder.finish())
}

struct Builder<'a> {
    kind: BackendKind,
    casts: &'a ColumnCasts,
    sql: String,
    params: Vec<Value>,
}

impl<'a> Builder<'a> {
    fn new(kind: BackendKind, casts: &'a ColumnCasts) -> Self {
        Self {
            kind,
            casts,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn placeholder(&mut self, column: &str, value: &Value) -> String {
        self.params.push(value.clone());
        match self.kind {
            BackendKind::Sqlite | BackendKind::MySql => "?".to_string(),
            BackendKind::Postgres => {
                let index = self.params.len();
                match self.casts.get(column) {
                    Some(cast) => format!("${}::{}", index, cast),
                    None => format!("${}", index),
                }
            }
        }
    }

    // `col = NULL` never matches, so null entries become `IS NULL`.
    fn push_predicate(&mut self, condition: &Condition) {
        self.sql.push_str(" WHERE ");
        for (i, (col, value)) in condition.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(" AND ");
            }
            let ident = quote_ident(self.kind, col);
            if value.is_null() {
                self.sql.push_str(&format!("{} IS NULL", ident));
            } else {
                let placeholder = self.placeholder(col, value);
                self.sql.push_str(&format!("{} = {}", ident, placeholder));
            }
        }
    }

    fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn quotes_identifiers_per_dialect() {
        assert_eq!(quote_ident(BackendKind::Sqlite, "users"), "\"users\"");
        assert_eq!(quote_ident(BackendKind::Postgres, "we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_ident(BackendKind::MySql, "a`b"), "`a``b`");
    }

    #[test]
    fn select_page_inlines_window() {
        assert_eq!(
            select_page(BackendKind::MySql, "logs", 10, 20),
            "SELECT * FROM `logs` LIMIT 10 OFFSET 20"
        );
        assert_eq!(count(BackendKind::Sqlite, "logs"), "SELECT COUNT(*) FROM \"logs\"");
    }

    #[test]
    fn update_builds_conjunctive_predicate() {
        let stmt = update_where(
            BackendKind::Sqlite,
            "users",
            &map(json!({"id": 1, "name": "a"})),
            &map(json!({"name": "b"})),
            &ColumnCasts::new(),
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE \"users\" SET \"name\" = ? WHERE \"id\" = ? AND \"name\" = ?"
        );
        assert_eq!(stmt.params, vec![json!("b"), json!(1), json!("a")]);
    }

    #[test]
    fn null_condition_values_use_is_null() {
        let stmt = delete_where(
            BackendKind::MySql,
            "users",
            &map(json!({"email": null, "id": 1})),
            &ColumnCasts::new(),
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "DELETE FROM `users` WHERE `email` IS NULL AND `id` = ?"
        );
        assert_eq!(stmt.params, vec![json!(1)]);
    }

    #[test]
    fn postgres_placeholders_number_across_set_and_where() {
        let mut casts = ColumnCasts::new();
        casts.insert("id".into(), "int4".into());
        let stmt = update_where(
            BackendKind::Postgres,
            "users",
            &map(json!({"id": 7})),
            &map(json!({"name": "x", "tags": ["a"]})),
            &casts,
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE \"users\" SET \"name\" = $1, \"tags\" = $2 WHERE \"id\" = $3::int4"
        );
        assert_eq!(stmt.params.len(), 3);
    }

    #[test]
    fn casts_apply_to_conditions_too() {
        let mut casts = ColumnCasts::new();
        casts.insert("mood".into(), "\"public\".\"mood\"".into());
        casts.insert("code".into(), "bpchar".into());
        let stmt = delete_where(
            BackendKind::Postgres,
            "feel",
            &map(json!({"code": "ABCDEFGH", "mood": "ok", "note": null})),
            &casts,
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "DELETE FROM \"feel\" WHERE \"code\" = $1::bpchar \
             AND \"mood\" = $2::\"public\".\"mood\" AND \"note\" IS NULL"
        );
        assert_eq!(stmt.params, vec![json!("ABCDEFGH"), json!("ok")]);
    }

    #[test]
    fn empty_maps_are_rejected() {
        let err = update_where(
            BackendKind::Sqlite,
            "users",
            &Row::new(),
            &map(json!({"x": 1})),
            &ColumnCasts::new(),
        )
        .unwrap_err();
        assert!(err.is_invalid_argument());

        let err = delete_where(BackendKind::Sqlite, "users", &Row::new(), &ColumnCasts::new())
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn insert_renders_columns_and_defaults() {
        let stmt = insert(
            BackendKind::Postgres,
            "users",
            &map(json!({"id": 1, "name": "a"})),
            &ColumnCasts::new(),
        );
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"users\" (\"id\", \"name\") VALUES ($1, $2)"
        );

        let stmt = insert(BackendKind::MySql, "users", &Row::new(), &ColumnCasts::new());
        assert_eq!(stmt.sql, "INSERT INTO `users` () VALUES ()");
        let stmt = insert(BackendKind::Sqlite, "users", &Row::new(), &ColumnCasts::new());
        assert_eq!(stmt.sql, "INSERT INTO \"users\" DEFAULT VALUES");
    }
}
