//! HTTP surface under `/api/database`.
//!
//! Every response is an [`Envelope`] carrying `success` and `message`.
//! Malformed input maps to 400, backend failures to 500.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use tracing::warn;

use crate::error::Error;
use crate::gateway::{DEFAULT_PAGE, DEFAULT_PAGE_SIZE};
use crate::models::{
    BulkDeleteRequest, BulkUpdateRequest, ColumnMeta, Condition, Envelope, PageQuery, RawColumn,
    Row, UpdateRequest,
};
use crate::schema::{primary_key, row_key};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let tables = Router::new()
        .route("/tables", get(list_tables))
        .route(
            "/tables/:name",
            get(table_data)
                .post(create_row)
                .put(update_rows)
                .delete(delete_rows),
        )
        .route("/tables/:name/info", get(table_info))
        .route("/tables/:name/columns", get(table_columns))
        .route("/tables/:name/bulk-update", put(bulk_update))
        .route("/tables/:name/bulk-delete", delete(bulk_delete));

    Router::new().nest("/api/database", tables).with_state(state)
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// Maps a gateway error, prefixing backend failures with `action`.
    fn during(action: &str, err: Error) -> Self {
        Self::from(err.context(action))
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidArgument(message) => Self::bad_request(message),
            other => {
                warn!(error = %other, "database request failed");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: other.to_string(),
                }
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(Envelope::<()>::failure(self.message))).into_response()
    }
}

type ApiResult<T = ()> = Result<Json<Envelope<T>>, ApiError>;

async fn list_tables(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    let tables = state
        .gateway
        .list_tables()
        .await
        .map_err(|e| ApiError::during("Failed to get table names", e))?;
    Ok(Json(Envelope::ok("Success").with_data(tables)))
}

async fn table_info(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Vec<RawColumn>> {
    let columns = state
        .gateway
        .describe_table(&name)
        .await
        .map_err(|e| ApiError::during("Failed to get table info", e))?;
    Ok(Json(Envelope::ok("Success").with_data(columns)))
}

async fn table_columns(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Vec<ColumnMeta>> {
    let columns = state
        .gateway
        .columns(&name)
        .await
        .map_err(|e| ApiError::during("Failed to get table info", e))?;
    let key = primary_key(&columns).map(|col| col.name.clone());
    Ok(Json(
        Envelope::ok("Success")
            .with_data(columns)
            .with_primary_key(key),
    ))
}

async fn table_data(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Vec<Row>> {
    let page = parse_page_param(query.page.as_deref(), DEFAULT_PAGE);
    let page_size = parse_page_param(query.page_size.as_deref(), DEFAULT_PAGE_SIZE);
    // the gateway already names the failing step
    let page = state.gateway.fetch_page(&name, page, page_size).await?;
    let mut envelope = Envelope::ok("Success").with_total(page.total);
    if is_set(query.keys.as_deref()) {
        let columns = state
            .gateway
            .columns(&name)
            .await
            .map_err(|e| ApiError::during("Failed to get table info", e))?;
        let keys = page.rows.iter().map(|row| row_key(&columns, row)).collect();
        envelope = envelope.with_keys(keys);
    }
    Ok(Json(envelope.with_data(page.rows)))
}

async fn create_row(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<Row>, JsonRejection>,
) -> ApiResult {
    let Json(row) = body?;
    state
        .gateway
        .insert(&name, &row)
        .await
        .map_err(|e| ApiError::during("Failed to create record", e))?;
    Ok(Json(Envelope::ok("Record created successfully")))
}

async fn update_rows(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = body?;
    let rows = state
        .gateway
        .update(&name, &request.condition, &request.update)
        .await
        .map_err(|e| ApiError::during("Failed to update record", e))?;
    Ok(Json(
        Envelope::ok("Record updated successfully").with_rows(rows),
    ))
}

async fn delete_rows(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<Condition>, JsonRejection>,
) -> ApiResult {
    let Json(condition) = body?;
    let rows = state
        .gateway
        .delete(&name, &condition)
        .await
        .map_err(|e| ApiError::during("Failed to delete record", e))?;
    Ok(Json(
        Envelope::ok("Record deleted successfully").with_rows(rows),
    ))
}

async fn bulk_update(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<BulkUpdateRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = body?;
    let results = state
        .gateway
        .bulk_update(&name, &request.items)
        .await
        .map_err(|e| ApiError::during("Failed to update records", e))?;
    Ok(Json(
        Envelope::ok("Bulk update finished").with_results(results),
    ))
}

async fn bulk_delete(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<BulkDeleteRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = body?;
    let results = state
        .gateway
        .bulk_delete(&name, &request.conditions)
        .await
        .map_err(|e| ApiError::during("Failed to delete records", e))?;
    Ok(Json(
        Envelope::ok("Bulk delete finished").with_results(results),
    ))
}

/// Unparsable values fall back to `default`, like an absent parameter.
fn parse_page_param(value: Option<&str>, default: i64) -> i64 {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(default)
}

fn is_set(flag: Option<&str>) -> bool {
    matches!(flag.map(str::trim), Some("1" | "true" | "yes"))
}
