//! Column metadata normalization.
//!
//! Each backend describes columns in its own shape:
//!
//! - SQLite `PRAGMA table_info`: `cid, name, type, notnull, dflt_value, pk`
//! - MySQL `DESCRIBE`: `Field, Type, Null, Key, Default, Extra`
//! - PostgreSQL `information_schema.columns`: `column_name, data_type,
//!   is_nullable, column_default`
//!
//! [`normalize`] folds all three into [`ColumnMeta`]. The PostgreSQL query
//! carries no key information, so `pk` is always false on that path.

use serde_json::Value;

use crate::models::{ColumnMeta, RawColumn, Row};

pub fn normalize(raw: &RawColumn) -> ColumnMeta {
    if let Some(name) = raw.get("name") {
        return ColumnMeta {
            name: text(name),
            data_type: first_text(raw, &["type", "data_type"]),
            pk: truthy(raw.get("pk")) || raw.get("key").map(text).as_deref() == Some("PRI"),
            nullable: match raw.get("nullable").or_else(|| raw.get("is_nullable")) {
                Some(flag) => is_yes(flag),
                None => !truthy(raw.get("notnull")),
            },
            default: first_present(raw, &["dflt_value", "default"]),
            extra: raw.get("extra").map(text).unwrap_or_default(),
        };
    }

    if let Some(name) = raw.get("column_name") {
        return ColumnMeta {
            name: text(name),
            data_type: first_text(raw, &["data_type", "udt_name"]),
            pk: false,
            nullable: raw.get("is_nullable").map(is_yes).unwrap_or(false),
            default: first_present(raw, &["column_default"]),
            extra: String::new(),
        };
    }

    ColumnMeta {
        name: raw.get("Field").map(text).unwrap_or_default(),
        data_type: raw.get("Type").map(text).unwrap_or_default(),
        pk: raw.get("Key").map(text).as_deref() == Some("PRI"),
        nullable: raw.get("Null").map(text).as_deref() == Some("YES"),
        default: first_present(raw, &["Default"]),
        extra: raw.get("Extra").map(text).unwrap_or_default(),
    }
}

/// The column used as row identity: a declared key, else a column named
/// `id`. `None` means callers fall back to whole-row conditions.
pub fn primary_key(columns: &[ColumnMeta]) -> Option<&ColumnMeta> {
    columns
        .iter()
        .find(|col| col.pk)
        .or_else(|| columns.iter().find(|col| col.name == "id"))
}

/// Composite grid key: every column's value concatenated in column order.
///
/// Duplicate rows collide and null renders as `null`, so this identifies a
/// row for display only.
pub fn row_key(columns: &[ColumnMeta], row: &Row) -> String {
    columns
        .iter()
        .map(|col| match row.get(&col.name) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "null".to_string(),
            Some(other) => other.to_string(),
        })
        .collect()
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn first_text(raw: &RawColumn, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .map(text)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

fn first_present(raw: &RawColumn, keys: &[&str]) -> Option<Value> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find(|value| !value.is_null())
        .cloned()
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Some(Value::String(s)) => matches!(s.as_str(), "1" | "true" | "TRUE" | "YES" | "yes"),
        _ => false,
    }
}

fn is_yes(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        other => text(other).eq_ignore_ascii_case("YES"),
    }
}
