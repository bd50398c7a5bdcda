//! `/health` surface: a dependency-free liveness probe.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub download_path: String,
    pub hls_path: String,
    pub download_exists: bool,
    pub hls_exists: bool,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        download_path: state.config.paths.download_path.to_string_lossy().to_string(),
        hls_path: state.config.paths.hls_path.to_string_lossy().to_string(),
        download_exists: state.config.paths.download_path.exists(),
        hls_exists: state.config.paths.hls_path.exists(),
    })
}
