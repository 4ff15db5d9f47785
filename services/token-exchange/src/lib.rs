pub mod config;
pub mod error;
pub mod exchange;
pub mod identity;
pub mod telemetry;

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::middleware::{from_fn, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use once_cell::sync::Lazy;
use serde_json::json;
use tracing::info_span;
use uuid::Uuid;

use error::ApiError;
use exchange::{exchange, AuthContext, TokenResponse};
use identity::IdentityBackend;

pub const SERVICE_NAME: &str = "token-exchange";
/// Verified subject identifier, forwarded by the invoking platform after it
/// has validated the caller's identity proof.
pub const SUBJECT_HEADER: &str = "x-auth-subject";
const REQUEST_ID_HEADER: &str = "x-request-id";

static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);
static REQUESTS_TOTAL: AtomicU64 = AtomicU64::new(0);
static REQUESTS_INFLIGHT: AtomicI64 = AtomicI64::new(0);

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn IdentityBackend>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/token", post(mint_token))
        .route("/v1/health", get(health))
        .route("/v1/info", get(info))
        .route("/metrics", get(metrics))
        .layer(from_fn(request_context))
        .with_state(state)
}

/// Remote-callable entry point: exchange the caller's verified identity for
/// a custom token. Any request body is accepted and ignored.
async fn mint_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, ApiError> {
    let ctx = auth_context(&headers);
    let response = exchange(&ctx, state.backend.as_ref()).await?;
    Ok(Json(response))
}

/// Build the caller's authentication context from platform-forwarded headers.
pub fn auth_context(headers: &HeaderMap) -> AuthContext {
    match headers
        .get(SUBJECT_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
    {
        Some(subject) => AuthContext::authenticated(subject),
        None => AuthContext::anonymous(),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": SERVICE_NAME }))
}

async fn info() -> Json<serde_json::Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn metrics() -> impl IntoResponse {
    let uptime = START_TIME.elapsed().as_secs_f64();
    let body = format!(
        concat!(
            "# HELP process_uptime_seconds Service uptime in seconds\n",
            "# TYPE process_uptime_seconds gauge\n",
            "process_uptime_seconds {uptime:.3}\n",
            "# HELP token_exchange_requests_total Total HTTP requests handled\n",
            "# TYPE token_exchange_requests_total counter\n",
            "token_exchange_requests_total {total}\n",
            "# HELP token_exchange_requests_inflight Current in-flight HTTP requests\n",
            "# TYPE token_exchange_requests_inflight gauge\n",
            "token_exchange_requests_inflight {inflight}\n"
        ),
        uptime = uptime,
        total = REQUESTS_TOTAL.load(Ordering::Relaxed),
        inflight = REQUESTS_INFLIGHT.load(Ordering::Relaxed)
    );

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        body,
    )
}

async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .unwrap_or_else(|| {
            let id = Uuid::new_v4().to_string();
            req.headers_mut()
                .insert(REQUEST_ID_HEADER, HeaderValue::from_str(&id).unwrap());
            id
        });

    REQUESTS_TOTAL.fetch_add(1, Ordering::Relaxed);
    let _inflight = InFlightGuard::new();

    let span = info_span!(
        "http.request",
        method = %method,
        path = %path,
        request_id = %request_id
    );

    let start = Instant::now();
    let mut response = {
        let _guard = span.enter();
        tracing::info!(event = "request_start", method = %method, path = %path);
        next.run(req).await
    };

    let status = response.status();
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    {
        let _guard = span.enter();
        tracing::info!(
            event = "request_end",
            method = %method,
            path = %path,
            status = status.as_u16(),
            latency_ms
        );
    }

    response.headers_mut().insert(
        REQUEST_ID_HEADER,
        HeaderValue::from_str(&request_id).unwrap(),
    );

    response
}

struct InFlightGuard;

impl InFlightGuard {
    fn new() -> Self {
        REQUESTS_INFLIGHT.fetch_add(1, Ordering::Relaxed);
        Self
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        REQUESTS_INFLIGHT.fetch_sub(1, Ordering::Relaxed);
    }
}
