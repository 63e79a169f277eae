use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use dbadmin::db::sqlite::SqliteBackend;
use dbadmin::{api, AppState, TableGateway};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

async fn app() -> Router {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::query("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("CREATE TABLE events (title TEXT, happened_at DATETIME)")
        .execute(&pool)
        .await
        .unwrap();
    let backend = Arc::new(SqliteBackend::from_pool(pool));
    api::router(AppState::new(TableGateway::new(backend)))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn seed(app: &Router, rows: &[Value]) {
    for row in rows {
        let (status, body) = call(
            app,
            Method::POST,
            "/api/database/tables/users",
            Some(row.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }
}

#[tokio::test]
async fn crud_round_trip_over_http() {
    let app = app().await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/database/tables/users",
        Some(json!({"id": 1, "name": "a", "email": null})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "message": "Record created successfully"}));

    let (status, body) = call(&app, Method::GET, "/api/database/tables/users?keys=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(1));
    assert_eq!(body["data"], json!([{"id": 1, "name": "a", "email": null}]));
    assert_eq!(body["keys"], json!(["1anull"]));

    let (status, body) = call(
        &app,
        Method::PUT,
        "/api/database/tables/users",
        Some(json!({"condition": {"id": 1}, "update": {"name": "b"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], json!(1));
    assert_eq!(body["message"], json!("Record updated successfully"));

    let (status, body) = call(
        &app,
        Method::DELETE,
        "/api/database/tables/users",
        Some(json!({"id": 1, "name": "b", "email": null})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], json!(1));

    let (_, body) = call(&app, Method::GET, "/api/database/tables/users", None).await;
    assert!(body.get("keys").is_none());
    assert_eq!(body["total"], json!(0));
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn insert_grows_total_by_one() {
    let app = app().await;
    seed(&app, &[json!({"id": 1, "name": "a"}), json!({"id": 2, "name": "b"})]).await;

    let uri = "/api/database/tables/users?page=1&page_size=10";
    let (_, before) = call(&app, Method::GET, uri, None).await;
    seed(&app, &[json!({"id": 3, "name": "c"})]).await;
    let (_, after) = call(&app, Method::GET, uri, None).await;

    assert_eq!(
        after["total"].as_i64().unwrap(),
        before["total"].as_i64().unwrap() + 1
    );
}

#[tokio::test]
async fn non_positive_paging_uses_defaults() {
    let app = app().await;
    let rows: Vec<Value> = (1..=12).map(|id| json!({"id": id, "name": "n"})).collect();
    seed(&app, &rows).await;

    let uri = "/api/database/tables/users?page=0&page_size=-5";
    let (status, body) = call(&app, Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(12));
    assert_eq!(body["data"].as_array().unwrap().len(), 10);

    let uri = "/api/database/tables/users?page=2&page_size=10";
    let (_, body) = call(&app, Method::GET, uri, None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (_, body) = call(&app, Method::GET, "/api/database/tables/users?page=abc", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn bulk_update_reports_per_item_outcomes() {
    let app = app().await;
    seed(
        &app,
        &[
            json!({"id": 1, "name": "a"}),
            json!({"id": 2, "name": "b"}),
            json!({"id": 3, "name": "c"}),
        ],
    )
    .await;

    let (status, body) = call(
        &app,
        Method::PUT,
        "/api/database/tables/users/bulk-update",
        Some(json!({"items": [
            {"condition": {"id": 1}, "update": {"name": "x"}},
            {"condition": {"id": 2}, "update": {"no_such_column": "y"}},
            {"condition": {"id": 3}, "update": {"email": "c@example.com"}}
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["message"], json!("Bulk update finished"));

    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["ok"], json!(true));
    assert_eq!(results[0]["id"], json!(1));
    assert_eq!(results[1]["ok"], json!(false));
    assert!(!results[1]["error"].as_str().unwrap().is_empty());
    assert_eq!(results[2]["ok"], json!(true));

    let (_, body) = call(&app, Method::GET, "/api/database/tables/users", None).await;
    assert_eq!(body["data"][0]["name"], json!("x"));
    assert_eq!(body["data"][1]["name"], json!("b"));
    assert_eq!(body["data"][2]["email"], json!("c@example.com"));
}

#[tokio::test]
async fn bulk_delete_treats_no_match_as_success() {
    let app = app().await;
    seed(
        &app,
        &[
            json!({"id": 1, "name": "dup"}),
            json!({"id": 2, "name": "dup"}),
            json!({"id": 3, "name": "keep"}),
        ],
    )
    .await;

    let (status, body) = call(
        &app,
        Method::DELETE,
        "/api/database/tables/users/bulk-delete",
        Some(json!({"conditions": [{"name": "dup"}, {"name": "absent"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["ok"], json!(true));
    assert_eq!(results[0]["rows"], json!(2));
    assert_eq!(results[0]["condition"], json!({"name": "dup"}));
    assert_eq!(results[1]["ok"], json!(true));
    assert_eq!(results[1]["rows"], json!(0));

    let (_, body) = call(&app, Method::GET, "/api/database/tables/users", None).await;
    assert_eq!(body["total"], json!(1));
}

#[tokio::test]
async fn malformed_input_is_a_client_error() {
    let app = app().await;

    let (status, body) = call(
        &app,
        Method::PUT,
        "/api/database/tables/users",
        Some(json!({"condition": {}, "update": {"name": "x"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"success": false, "message": "Both condition and update are required"})
    );

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/database/tables/users",
        Some(json!([1, 2])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().starts_with("Invalid request body: "));

    let (status, _) = call(
        &app,
        Method::PUT,
        "/api/database/tables/users/bulk-update",
        Some(json!({"items": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::DELETE,
        "/api/database/tables/users/bulk-delete",
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn backend_failures_are_server_errors() {
    let app = app().await;

    let (status, body) = call(&app, Method::GET, "/api/database/tables/missing", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], json!(false));
    assert!(body["message"].as_str().unwrap().starts_with("Failed to count records: "));

    seed(&app, &[json!({"id": 1, "name": "a"})]).await;
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/database/tables/users",
        Some(json!({"id": 1, "name": "again"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["message"].as_str().unwrap().contains("UNIQUE"));
}

#[tokio::test]
async fn introspection_endpoints() {
    let app = app().await;

    let (status, body) = call(&app, Method::GET, "/api/database/tables", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!(["events", "users"]));

    let (_, body) = call(&app, Method::GET, "/api/database/tables/users/info", None).await;
    let info = body["data"].as_array().unwrap();
    assert_eq!(info.len(), 3);
    assert_eq!(info[0]["name"], json!("id"));
    assert_eq!(info[0]["pk"], json!(1));

    let (_, body) = call(&app, Method::GET, "/api/database/tables/users/columns", None).await;
    assert_eq!(body["primary_key"], json!("id"));
    assert_eq!(
        body["data"][2],
        json!({
            "name": "email",
            "type": "TEXT",
            "pk": false,
            "nullable": true,
            "default": null,
            "extra": ""
        })
    );
}

#[tokio::test]
async fn timestamps_read_back_in_utc() {
    let app = app().await;

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/database/tables/events",
        Some(json!({"title": "launch", "happened_at": "2024-03-04T05:06:07Z"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    call(
        &app,
        Method::POST,
        "/api/database/tables/events",
        Some(json!({"title": "pending", "happened_at": null})),
    )
    .await;

    let (_, body) = call(&app, Method::GET, "/api/database/tables/events", None).await;
    assert_eq!(body["data"][0]["happened_at"], json!("2024-03-04T05:06:07Z"));
    assert_eq!(body["data"][1]["happened_at"], Value::Null);
}
