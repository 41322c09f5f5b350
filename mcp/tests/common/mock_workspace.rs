//! In-process mock of the Databricks REST API.
//!
//! Catalogs `system`, `sales` (page 1) and `hr` (page 2). `sales.public` holds
//! `orders` and `customers`; listing schemas of `hr` is forbidden.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::{net::TcpListener, task::JoinHandle};

use super::TEST_TOKEN;

#[derive(Default)]
pub struct MockState {
    /// Requests received, by route.
    pub hits: parking_lot::Mutex<HashMap<&'static str, usize>>,
    /// Number of upcoming `jobs/list` calls answered with 429.
    pub jobs_rate_limited: AtomicUsize,
    /// Serve an empty jobs list.
    pub no_jobs: std::sync::atomic::AtomicBool,
}

impl MockState {
    pub fn hits(&self, route: &'static str) -> usize {
        self.hits.lock().get(route).copied().unwrap_or(0)
    }

    fn record(&self, route: &'static str) {
        *self.hits.lock().entry(route).or_insert(0) += 1;
    }
}

pub struct MockWorkspace {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl MockWorkspace {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/api/2.1/unity-catalog/catalogs", get(list_catalogs))
            .route("/api/2.1/unity-catalog/schemas", get(list_schemas))
            .route("/api/2.1/unity-catalog/tables", get(list_tables))
            .route("/api/2.1/unity-catalog/tables/{full_name}", get(get_table))
            .route("/api/2.1/jobs/list", get(list_jobs))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for MockWorkspace {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn authorized(headers: &HeaderMap) -> Result<(), Response> {
    let expected = format!("Bearer {TEST_TOKEN}");
    match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => Ok(()),
        _ => Err(api_error(
            StatusCode::UNAUTHORIZED,
            "UNAUTHENTICATED",
            "Invalid access token.",
        )),
    }
}

fn api_error(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({"error_code": code, "message": message}))).into_response()
}

async fn list_catalogs(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.record("catalogs");
    if let Err(resp) = authorized(&headers) {
        return resp;
    }
    let body: Value = match query.get("page_token").map(String::as_str) {
        None => json!({
            "catalogs": [
                {"name": "system", "created_by": "System user", "catalog_type": "SYSTEM_CATALOG"},
                {"name": "sales", "created_by": "owner@example.com", "comment": "Sales data"}
            ],
            "next_page_token": "page-2"
        }),
        Some("page-2") => json!({
            "catalogs": [{"name": "hr", "created_by": "owner@example.com"}]
        }),
        Some(_) => return api_error(StatusCode::BAD_REQUEST, "INVALID_PARAMETER_VALUE", "bad page"),
    };
    Json(body).into_response()
}

async fn list_schemas(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.record("schemas");
    if let Err(resp) = authorized(&headers) {
        return resp;
    }
    match query.get("catalog_name").map(String::as_str) {
        Some("sales") => Json(json!({
            "schemas": [
                {"name": "public", "catalog_name": "sales"},
                {"name": "information_schema", "catalog_name": "sales"}
            ]
        }))
        .into_response(),
        Some("hr") => api_error(
            StatusCode::FORBIDDEN,
            "PERMISSION_DENIED",
            "User does not have USE CATALOG on Catalog 'hr'.",
        ),
        _ => api_error(
            StatusCode::NOT_FOUND,
            "CATALOG_DOES_NOT_EXIST",
            "Catalog does not exist.",
        ),
    }
}

async fn list_tables(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.record("tables");
    if let Err(resp) = authorized(&headers) {
        return resp;
    }
    let catalog = query.get("catalog_name").map(String::as_str);
    let schema = query.get("schema_name").map(String::as_str);
    match (catalog, schema) {
        (Some("sales"), Some("public")) => Json(json!({
            "tables": [
                {"name": "orders", "table_type": "MANAGED"},
                {"name": "customers", "catalog_name": "sales", "schema_name": "public"}
            ]
        }))
        .into_response(),
        (Some("sales"), Some("information_schema")) => Json(json!({})).into_response(),
        _ => api_error(
            StatusCode::NOT_FOUND,
            "SCHEMA_DOES_NOT_EXIST",
            "Schema does not exist.",
        ),
    }
}

async fn get_table(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(full_name): Path<String>,
) -> Response {
    state.record("table");
    if let Err(resp) = authorized(&headers) {
        return resp;
    }
    if full_name != "sales.public.orders" {
        return api_error(
            StatusCode::NOT_FOUND,
            "TABLE_DOES_NOT_EXIST",
            &format!("Table '{full_name}' does not exist."),
        );
    }
    Json(json!({
        "name": "orders",
        "catalog_name": "sales",
        "schema_name": "public",
        "full_name": "sales.public.orders",
        "table_type": "MANAGED",
        "comment": "One row per order",
        "owner": "owner@example.com",
        "columns": [
            {"name": "order_id", "type_text": "bigint", "nullable": false, "position": 0},
            {"name": "note", "type_text": "string", "position": 1, "comment": "free text"}
        ]
    }))
    .into_response()
}

async fn list_jobs(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.record("jobs");
    if let Err(resp) = authorized(&headers) {
        return resp;
    }
    let limited = state
        .jobs_rate_limited
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if limited {
        return api_error(
            StatusCode::TOO_MANY_REQUESTS,
            "REQUEST_LIMIT_EXCEEDED",
            "Too many requests.",
        );
    }
    if state.no_jobs.load(Ordering::SeqCst) {
        return Json(json!({"has_more": false})).into_response();
    }
    if query.get("expand_tasks").map(String::as_str) != Some("false") {
        return api_error(StatusCode::BAD_REQUEST, "INVALID_PARAMETER_VALUE", "expand_tasks");
    }
    let body = match query.get("page_token").map(String::as_str) {
        None => json!({
            "jobs": [{"job_id": 11, "settings": {"name": "nightly-etl", "max_concurrent_runs": 1}}],
            "has_more": true,
            "next_page_token": "jobs-2"
        }),
        Some(_) => json!({
            "jobs": [{"job_id": 12, "settings": {"name": "weekly-report"}, "creator_user_name": "a@b.c"}],
            "has_more": false
        }),
    };
    Json(body).into_response()
}
