use std::time::Duration;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Query, Request, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};

use pfc_core::db::Database;
use pfc_core::error::LedgerError;
use pfc_core::models::{Entry, PfcInput};
use pfc_core::service::LedgerService;

const BODY_LIMIT: usize = 64 * 1024; // 64 KiB

#[derive(Clone)]
struct AppState {
    ledger: LedgerService,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct DateQuery {
    date: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    PayloadTooLarge,
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large".to_string(),
            ),
            Self::Internal(err) => {
                error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidDate(_)
            | LedgerError::InvalidNutrient { .. }
            | LedgerError::OutOfRange(_) => Self::BadRequest(err.to_string()),
            LedgerError::NotFound(_) => Self::NotFound(err.to_string()),
            LedgerError::Storage(storage) => {
                Self::Internal(anyhow::Error::new(storage).context("ledger storage"))
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge
        } else {
            Self::BadRequest(rejection.body_text())
        }
    }
}

// --- Middleware ---

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

/// Run a ledger call on the blocking pool; SQLite work must not stall the runtime.
async fn with_ledger<T, F>(ledger: LedgerService, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&LedgerService) -> pfc_core::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || f(&ledger))
        .await
        .context("ledger task failed")?;
    Ok(result?)
}

async fn add_pfc(
    State(state): State<AppState>,
    body: Result<Json<PfcInput>, JsonRejection>,
) -> Result<Json<Entry>, ApiError> {
    let Json(input) = body?;
    let entry = with_ledger(state.ledger, move |ledger| ledger.add(&input)).await?;
    Ok(Json(entry))
}

async fn subtract_pfc(
    State(state): State<AppState>,
    body: Result<Json<PfcInput>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(input) = body?;
    with_ledger(state.ledger, move |ledger| ledger.subtract(&input)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_pfc(
    State(state): State<AppState>,
    Query(params): Query<DateQuery>,
) -> Result<Json<Entry>, ApiError> {
    let entry =
        with_ledger(state.ledger, move |ledger| ledger.get(params.date.as_deref())).await?;
    Ok(Json(entry))
}

async fn health() -> &'static str {
    "ok"
}

// --- Router builder ---

fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let routes = Router::new()
        .route("/pfc", get(get_pfc).post(add_pfc).patch(subtract_pfc))
        .route("/health", get(health))
        .with_state(state);
    with_layers(routes, request_timeout)
}

/// Body limit, request deadline (408), security headers and tracing.
fn with_layers(router: Router, request_timeout: Duration) -> Router {
    router
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
}

// --- Server startup ---

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to install Ctrl+C handler: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

pub async fn start_server(
    db: Database,
    port: u16,
    bind: &str,
    request_timeout: Duration,
) -> anyhow::Result<()> {
    let state = AppState {
        ledger: LedgerService::new(db),
    };

    let app = build_router(state, request_timeout);

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!(
        timeout_secs = request_timeout.as_secs(),
        "Listening on http://{bind}:{port}"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, ledger closed");
    Ok(())
}
