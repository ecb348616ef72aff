//! HTTP API over the search engine and the records file.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/search` | Filter and search records, recording history |
//! | `GET`    | `/suggest?q=..&field=..` | Autocomplete values for a field |
//! | `GET`    | `/history` | Search history, most recent first |
//! | `DELETE` | `/history` | Clear the history |
//! | `DELETE` | `/history/{id}` | Remove one history entry |
//! | `POST`   | `/records/batch/status` | Set `status` on many records (rate limited) |
//! | `POST`   | `/records/batch/delete` | Delete many records (rate limited) |
//!
//! # Error Contract
//!
//! Error responses use
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "filter on 'age': between requires a two-element array, got 3" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//! Rate-limited requests get the 429 body described in [`crate::middleware`].
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use record_sift_core::engine::SearchEngine;
use record_sift_core::filter::SearchFilter;
use record_sift_core::history::SearchHistoryItem;
use record_sift_core::store::KeyValueStore;
use record_sift_core::SearchError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::batch::{BatchOperationResult, BatchOperationRunner};
use crate::batch_cmd::check_ids;
use crate::config::Config;
use crate::file_store::JsonFileStore;
use crate::middleware::{rate_limit, RateLimitGuard};
use crate::rate_limit::{RateLimiter, CLEANUP_INTERVAL};
use crate::records::{InMemoryRecords, RecordRepository};

/// History backend shared by all handlers.
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<Mutex<SearchEngine<SharedStore>>>,
    records: Arc<InMemoryRecords>,
    runner: BatchOperationRunner,
    limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: &Config, store: SharedStore, records: Arc<InMemoryRecords>) -> Self {
        Self::with_limiter(
            config,
            store,
            records,
            Arc::new(RateLimiter::new(config.rate_limit.limits())),
        )
    }

    pub fn with_limiter(
        config: &Config,
        store: SharedStore,
        records: Arc<InMemoryRecords>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            engine: Arc::new(Mutex::new(SearchEngine::new(store, config.search.clone()))),
            records,
            runner: BatchOperationRunner::new(config.batch.options()),
            limiter,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

/// All routes, with the batch write endpoints behind the rate limiter.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let guard = RateLimitGuard::new(state.limiter.clone());
    let writes = Router::new()
        .route("/records/batch/status", post(handle_batch_status))
        .route("/records/batch/delete", post(handle_batch_delete))
        .route_layer(middleware::from_fn_with_state(guard, rate_limit));

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", post(handle_search))
        .route("/suggest", get(handle_suggest))
        .route("/history", get(handle_history).delete(handle_clear_history))
        .route("/history/{id}", delete(handle_remove_history))
        .merge(writes)
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server.
///
/// Loads the records file, opens the history file and binds to
/// `[server].bind`. Expired rate-limit windows are swept every
/// [`CLEANUP_INTERVAL`]. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let records = InMemoryRecords::load(&config.data.path, config.data.id_field.clone()).await?;
    let store: SharedStore = Arc::new(JsonFileStore::new(&config.history.path));
    let state = AppState::new(config, store, Arc::new(records));

    let limiter = state.limiter.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = limiter.cleanup();
            tracing::debug!(removed, remaining = limiter.store_size(), "rate limit cleanup");
        }
    });

    let app = build_router(state);
    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(bind = %bind_addr, "server listening");
    println!("Record Sift listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
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

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        if err.is_configuration() {
            bad_request(err.to_string())
        } else {
            internal(err.to_string())
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %format!("{:#}", err), "request failed");
        internal(format!("{:#}", err))
    }
}

/// Decode a JSON body into `T`, reporting malformed JSON, a wrong content
/// type, and unknown operators or missing fields as `bad_request`.
fn parse_body<T: DeserializeOwned>(
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<T, AppError> {
    let Json(body) = payload.map_err(|rejection| bad_request(rejection.body_text()))?;
    serde_json::from_value(body)
        .map_err(|e| bad_request(format!("invalid request body: {}", e)))
}

/// Run `f` against the engine on the blocking pool. History writes go
/// through the configured store, which may do synchronous file I/O.
async fn with_engine<R, F>(state: &AppState, f: F) -> Result<R, AppError>
where
    R: Send + 'static,
    F: FnOnce(&mut SearchEngine<SharedStore>) -> R + Send + 'static,
{
    let mut engine = state.engine.clone().lock_owned().await;
    tokio::task::spawn_blocking(move || f(&mut *engine))
        .await
        .map_err(|e| internal(format!("search engine task failed: {}", e)))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    query: String,
    #[serde(default)]
    filters: Vec<SearchFilter>,
    /// Record the search in history. Defaults to true.
    #[serde(default = "default_record")]
    record: bool,
}

fn default_record() -> bool {
    true
}

#[derive(Serialize)]
struct SearchResponse {
    total: usize,
    results: Vec<Value>,
}

async fn handle_search(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let req: SearchRequest = parse_body(payload)?;
    let records = state.records.all().await?;
    let results = with_engine(&state, move |engine| {
        let results = if req.record {
            engine.search_and_record(&records, &req.query, &req.filters)?
        } else {
            engine.search(&records, &req.query, &req.filters)?
        };
        Ok::<_, SearchError>(results.into_iter().cloned().collect::<Vec<_>>())
    })
    .await??;

    Ok(Json(SearchResponse {
        total: results.len(),
        results,
    }))
}

// ============ GET /suggest ============

#[derive(Deserialize)]
struct SuggestParams {
    #[serde(default)]
    q: String,
    field: Option<String>,
}

#[derive(Serialize)]
struct SuggestResponse {
    suggestions: Vec<String>,
}

async fn handle_suggest(
    State(state): State<AppState>,
    Query(params): Query<SuggestParams>,
) -> Result<Json<SuggestResponse>, AppError> {
    let field = params
        .field
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| bad_request("field must not be empty"))?;
    let records = state.records.all().await?;
    let engine = state.engine.lock().await;
    let suggestions = engine.suggestions(&records, &params.q, &field)?;
    Ok(Json(SuggestResponse { suggestions }))
}

// ============ /history ============

#[derive(Serialize)]
struct HistoryResponse {
    history: Vec<SearchHistoryItem>,
}

async fn handle_history(State(state): State<AppState>) -> Json<HistoryResponse> {
    let engine = state.engine.lock().await;
    Json(HistoryResponse {
        history: engine.history().to_vec(),
    })
}

async fn handle_clear_history(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    with_engine(&state, |engine| engine.clear_history()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_remove_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let lookup = id.clone();
    if with_engine(&state, move |engine| engine.remove_from_history(&lookup)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("no history entry with id: {}", id)))
    }
}

// ============ POST /records/batch/* ============

#[derive(Deserialize)]
struct BatchStatusRequest {
    ids: Vec<String>,
    status: String,
}

#[derive(Deserialize)]
struct BatchDeleteRequest {
    ids: Vec<String>,
}

async fn handle_batch_status(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<BatchOperationResult<String>>, AppError> {
    let req: BatchStatusRequest = parse_body(payload)?;
    if req.status.trim().is_empty() {
        return Err(bad_request("status must not be empty"));
    }
    check_ids(&req.ids).map_err(|e| bad_request(e.to_string()))?;

    let repo = state.records.clone();
    let result = state
        .runner
        .batch_update_status(req.ids, &req.status, move |id: String, status| {
            let repo = repo.clone();
            async move { repo.update_status(&id, &status).await }
        })
        .await;

    save_if_changed(&state, &result).await?;
    Ok(Json(result))
}

async fn handle_batch_delete(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<BatchOperationResult<String>>, AppError> {
    let req: BatchDeleteRequest = parse_body(payload)?;
    check_ids(&req.ids).map_err(|e| bad_request(e.to_string()))?;

    let repo = state.records.clone();
    let result = state
        .runner
        .batch_delete(req.ids, move |id: String| {
            let repo = repo.clone();
            async move { repo.delete(&id).await }
        })
        .await;

    save_if_changed(&state, &result).await?;
    Ok(Json(result))
}

async fn save_if_changed(
    state: &AppState,
    result: &BatchOperationResult<String>,
) -> Result<(), AppError> {
    if !result.succeeded.is_empty() {
        state.records.save().await?;
    }
    Ok(())
}
