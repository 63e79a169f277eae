use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Column name to value. Nothing beyond JSON typing is enforced.
pub type Row = Map<String, Value>;

/// Conjunctive equality map locating zero or more rows.
pub type Condition = Map<String, Value>;

/// One column description exactly as the backend catalog reported it.
pub type RawColumn = Map<String, Value>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ColumnMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub pk: bool,
    pub nullable: bool,
    pub default: Option<Value>,
    pub extra: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Page {
    pub total: i64,
    pub rows: Vec<Row>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct UpdateRequest {
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub update: Row,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct BulkUpdateRequest {
    #[serde(default)]
    pub items: Vec<UpdateRequest>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct BulkDeleteRequest {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Page parameters arrive as raw strings so unparsable input falls back to
/// the defaults instead of rejecting the request.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PageQuery {
    pub page: Option<String>,
    pub page_size: Option<String>,
    /// `keys=true` adds one row key per returned row.
    pub keys: Option<String>,
}

/// Per-item result of a bulk operation, in input order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ItemOutcome {
    pub ok: bool,
    pub error: String,
    pub rows: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl ItemOutcome {
    pub fn succeeded(rows: u64) -> Self {
        Self {
            ok: true,
            error: String::new(),
            rows,
            id: None,
            condition: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
            rows: 0,
            id: None,
            condition: None,
        }
    }
}

/// Response body shared by every endpoint.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Envelope<T = ()> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<ItemOutcome>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
}

impl<T> Envelope<T> {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            total: None,
            rows: None,
            results: None,
            primary_key: None,
            keys: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::ok(message)
        }
    }

    pub fn with_data(mut self, data: T) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_total(mut self, total: i64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn with_rows(mut self, rows: u64) -> Self {
        self.rows = Some(rows);
        self
    }

    pub fn with_results(mut self, results: Vec<ItemOutcome>) -> Self {
        self.results = Some(results);
        self
    }

    pub fn with_primary_key(mut self, primary_key: Option<String>) -> Self {
        self.primary_key = primary_key;
        self
    }

    pub fn with_keys(mut self, keys: Vec<String>) -> Self {
        self.keys = Some(keys);
        self
    }
}
