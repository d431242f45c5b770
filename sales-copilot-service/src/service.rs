use axum::{
    Router,
    extract::State,
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::{Json, Response},
    routing::{get, post},
};
use sales_copilot::{InsightReport, RetrievalMode, SalesPipeline};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, info, warn};
use uuid::Uuid;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn timeout_error(limit: Duration) -> ApiError {
    (
        StatusCode::GATEWAY_TIMEOUT,
        Json(json!({
            "error": "O insight demorou demais para ser gerado. Tente novamente.",
            "timeout_secs": limit.as_secs()
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SalesPipeline>,
    /// Bound on one whole classify → retrieve → synthesize run
    pub timeout: Duration,
    pub mode: RetrievalMode,
}

#[derive(Debug, Deserialize)]
pub struct InsightRequest {
    pub query: String,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/insight", post(create_insight))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(correlation_id_middleware))
        .with_state(app_state)
}

/// Tags each request with a correlation id, reusing the caller's when it sent one.
async fn correlation_id_middleware(mut request: Request<axum::body::Body>, next: Next) -> Response {
    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let header = HeaderValue::from_str(&correlation_id)
        .unwrap_or_else(|_| HeaderValue::from_static("invalid"));
    request.headers_mut().insert(CORRELATION_HEADER, header.clone());

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;
    response.headers_mut().insert(CORRELATION_HEADER, header);
    response
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": "Sales Copilot",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Grounded sales insights over the medical course catalog",
        "retrieval_mode": state.mode.to_string(),
        "endpoints": {
            "POST /insight": "Classify, retrieve and synthesize an insight for a seller's question",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn create_insight(
    State(state): State<AppState>,
    Json(request): Json<InsightRequest>,
) -> ApiResult<InsightReport> {
    if request.query.trim().is_empty() {
        return Err(bad_request_error("query is required"));
    }
    info!(query_chars = request.query.chars().count(), "Insight requested");

    match tokio::time::timeout(state.timeout, state.pipeline.answer(&request.query)).await {
        Ok(report) => {
            info!(state = ?report.state, citations = report.citations.len(), "Insight ready");
            Ok(Json(report))
        }
        Err(_) => {
            warn!(timeout_secs = state.timeout.as_secs(), "Insight pipeline timed out");
            Err(timeout_error(state.timeout))
        }
    }
}
