//! HTTP endpoint server using Axum

use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};

use crate::core::orchestrator::{ScanError, ScanRequest, Scanner};
use crate::metrics::Metrics;

const DEFAULT_RUN_LIMIT: usize = 20;
const MAX_RUN_LIMIT: usize = 200;

#[derive(Clone)]
pub struct AppState {
    pub scanner: Arc<Scanner>,
    pub metrics: Arc<Metrics>,
    pub start_time: Arc<Instant>,
}

impl AppState {
    pub fn new(scanner: Arc<Scanner>, metrics: Arc<Metrics>) -> Self {
        Self {
            scanner,
            metrics,
            start_time: Arc::new(Instant::now()),
        }
    }
}

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let uptime_seconds = state.start_time.elapsed().as_secs();
    Json(json!({
        "status": "healthy",
        "scan_status": state.scanner.status().await,
        "uptime_seconds": uptime_seconds,
        "service": "vcp-scanner"
    }))
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .export()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Middleware to track HTTP request metrics
async fn metrics_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    state.metrics.http_requests_in_flight.inc();
    let response = next.run(request).await;
    let status = response.status();
    let duration = start.elapsed();
    state.metrics.http_requests_in_flight.dec();

    state.metrics.http_requests_total.inc();
    state
        .metrics
        .http_request_duration_seconds
        .observe(duration.as_secs_f64());

    if status.is_server_error() {
        error!(
            method = %method,
            path = %path,
            status = %status,
            duration_ms = duration.as_millis() as u64,
            "HTTP request error"
        );
    }

    response
}

/// Run a scan and wait for its summary.
///
/// The run lives on its own task, so a client that disconnects early does
/// not cancel it; the summary is simply never delivered.
async fn trigger_scan(State(state): State<AppState>, Json(request): Json<ScanRequest>) -> Response {
    let scanner = state.scanner.clone();
    let joined = tokio::spawn(async move { scanner.run(request).await }).await;
    let outcome = match joined {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "scan task terminated abnormally");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };
    match outcome {
        Ok(summary) => (StatusCode::OK, Json(json!(summary))).into_response(),
        Err(ScanError::AlreadyRunning) => (
            StatusCode::CONFLICT,
            Json(json!({ "error": ScanError::AlreadyRunning.to_string() })),
        )
            .into_response(),
        Err(e) => {
            let summary = state.scanner.last_summary().await;
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string(), "summary": summary })),
            )
                .into_response()
        }
    }
}

async fn cancel_scan(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let was_running = state.scanner.cancel();
    (StatusCode::ACCEPTED, Json(json!({ "cancelling": was_running })))
}

async fn scan_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": state.scanner.status().await,
        "last_summary": state.scanner.last_summary().await,
    }))
}

#[derive(Debug, Deserialize)]
struct MatchesQuery {
    date: Option<NaiveDate>,
}

/// Matches for a scan date, defaulting to the latest run's date.
async fn list_matches(
    State(state): State<AppState>,
    Query(params): Query<MatchesQuery>,
) -> Result<Json<Value>, StatusCode> {
    let store = state.scanner.store();
    let date = match params.date {
        Some(date) => Some(date),
        None => store.latest_scan_date().await.map_err(|e| {
            error!(error = %e, "Failed to load latest scan date");
            StatusCode::INTERNAL_SERVER_ERROR
        })?,
    };

    let Some(date) = date else {
        return Ok(Json(json!({ "scan_date": null, "count": 0, "matches": [] })));
    };

    let matches = store.matches_for(date).await.map_err(|e| {
        error!(error = %e, scan_date = %date, "Failed to load matches");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(json!({
        "scan_date": date,
        "count": matches.len(),
        "matches": matches,
    })))
}

#[derive(Debug, Deserialize)]
struct RunsQuery {
    limit: Option<usize>,
}

async fn list_runs(
    State(state): State<AppState>,
    Query(params): Query<RunsQuery>,
) -> Result<Json<Value>, StatusCode> {
    let limit = params.limit.unwrap_or(DEFAULT_RUN_LIMIT).min(MAX_RUN_LIMIT);
    let runs = state
        .scanner
        .store()
        .recent_runs(limit)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to load scan runs");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(json!(runs)))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/scan", post(trigger_scan))
        .route("/api/scan/cancel", post(cancel_scan))
        .route("/api/scan/status", get(scan_status))
        .route("/api/matches", get(list_matches))
        .route("/api/runs", get(list_runs))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                        .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
                )
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    metrics_middleware,
                ))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub async fn start_server(
    state: AppState,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!(port = port, "HTTP server listening on port {}", port);
    info!(
        "Metrics endpoint available at http://0.0.0.0:{}/metrics",
        port
    );
    axum::serve(listener, app).await?;

    Ok(())
}
