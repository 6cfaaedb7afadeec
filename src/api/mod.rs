use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    eth::ChainSource,
    models::{AddressError, ScanResult, WalletAddress},
    rpc::RpcError,
    scan_stats::{ScanSnapshot, SCAN_STATS},
    scanner::{self, ScanOptions},
};

#[derive(Clone)]
pub struct AppState {
    pub chain: Arc<dyn ChainSource>,
    pub scan: ScanOptions,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
struct CountRequest {
    wallet: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),
    #[error("scan failed: {0}")]
    Scan(#[from] RpcError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            ApiError::InvalidAddress(_) => (StatusCode::BAD_REQUEST, "INVALID_ADDRESS"),
            ApiError::Scan(_) => (StatusCode::BAD_GATEWAY, "SCAN_FAILED"),
        };
        let body = ErrorResponse {
            error: ErrorDetail {
                code,
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn count_today(
    State(state): State<AppState>,
    Json(req): Json<CountRequest>,
) -> Result<Json<ScanResult>, ApiError> {
    let wallet: WalletAddress = req.wallet.parse()?;
    let result = scanner::count_todays_transactions(state.chain.as_ref(), &wallet, state.scan)
        .await
        .map_err(|err| {
            tracing::error!(%wallet, "scan failed: {}", err);
            err
        })?;
    Ok(Json(result))
}

async fn scan_stats() -> Json<ScanSnapshot> {
    Json(SCAN_STATS.snapshot())
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/count", post(count_today))
        .route("/stats/scan", get(scan_stats))
        .with_state(state)
}

pub async fn run_http_server(addr: &str, state: AppState) -> Result<()> {
    let app = app_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
