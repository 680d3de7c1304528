//! Read-only HTTP API over the mirrored directory.
//!
//! Exposes the normalized record shape to the serving layer. Every `/api`
//! route requires the static bearer token from `[server].auth_token`;
//! `dn`, `guid`, and `isManual` are provenance fields and never writable
//! through this surface.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/search?q=<query>&limit=<n>` | Token search (AND semantics) |
//! | `GET` | `/api/record?dn=<dn>` or `?guid=<guid>` | Single record lookup (dn takes precedence) |
//! | `GET` | `/api/status` | Last completed sync metadata |
//! | `GET` | `/health` | Health check, no auth |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "unauthorized", "message": "missing bearer token" } }
//! ```

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db;
use crate::get::lookup;
use crate::search::{search_records, DEFAULT_LIMIT};
use crate::store::{self, SqliteKv};

/// Shared application state passed to route handlers.
#[derive(Clone)]
struct AppState {
    store: Arc<SqliteKv>,
    auth_token: Arc<str>,
}

/// Start the HTTP server on `[server].bind`. Runs until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let state = AppState {
        store: Arc::new(SqliteKv::new(pool)),
        auth_token: Arc::from(config.server.auth_token.as_str()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/search", get(handle_search))
        .route("/api/record", get(handle_record))
        .route("/api/status", get(handle_status))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("staffdir API listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized".to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: format!("{err:#}"),
    }
}

// ============ Auth ============

type HmacSha256 = Hmac<Sha256>;

/// Constant-time bearer-token check: both sides are run through HMAC-SHA256
/// and the tags compared, so the comparison cost is independent of where the
/// strings first differ.
fn token_matches(expected: &str, presented: &str) -> bool {
    let key = b"staffdir-token-compare";
    let mut a = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    a.update(expected.as_bytes());
    let tag = a.finalize().into_bytes();

    let mut b = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    b.update(presented.as_bytes());
    b.verify_slice(&tag).is_ok()
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| unauthorized("missing bearer token"))?;

    if token_matches(&state.auth_token, presented) {
        Ok(())
    } else {
        Err(unauthorized("invalid bearer token"))
    }
}

// ============ Handlers ============

#[derive(Deserialize)]
struct SearchParams {
    q: String,
    limit: Option<usize>,
}

async fn handle_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    authorize(&state, &headers)?;

    if params.q.trim().is_empty() {
        return Err(bad_request("q must not be empty"));
    }

    let results = search_records(
        state.store.as_ref(),
        &params.q,
        params.limit.unwrap_or(DEFAULT_LIMIT),
    )
    .await
    .map_err(internal)?;

    Ok(Json(serde_json::json!({ "results": results })))
}

#[derive(Deserialize)]
struct RecordParams {
    dn: Option<String>,
    guid: Option<String>,
}

async fn handle_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RecordParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    authorize(&state, &headers)?;

    if params.dn.is_none() && params.guid.is_none() {
        return Err(bad_request("either dn or guid is required"));
    }

    let record = lookup(
        state.store.as_ref(),
        params.dn.as_deref(),
        params.guid.as_deref(),
    )
    .await
    .map_err(internal)?;

    match record {
        Some(record) => Ok(Json(serde_json::to_value(&record).map_err(|e| internal(e.into()))?)),
        None => Err(not_found("record not found")),
    }
}

async fn handle_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    authorize(&state, &headers)?;

    let meta = store::get_run_meta(state.store.as_ref())
        .await
        .map_err(internal)?;
    Ok(Json(serde_json::json!({ "lastSync": meta })))
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
