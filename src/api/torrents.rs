//! `/api/torrents` surface: add, list, inspect and remove torrents.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AddTorrentRequest {
    pub magnet_link: String,
}

#[derive(Debug, Serialize)]
pub struct AddTorrentResponse {
    pub message: String,
    pub torrent_id: String,
}

pub async fn add_torrent(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AddTorrentRequest>,
) -> Result<impl IntoResponse> {
    let (info_hash, created) = state.gateway.add_torrent(&payload.magnet_link).await?;

    let message = if created {
        "torrent added"
    } else {
        "torrent already tracked"
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(AddTorrentResponse {
            message: message.to_string(),
            torrent_id: info_hash,
        }),
    ))
}

pub async fn list_torrents(State(state): State<Arc<AppState>>) -> Json<Vec<crate::services::registry::TorrentStatus>> {
    Json(state.gateway.list_torrents().await)
}

pub async fn get_torrent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<crate::services::registry::TorrentStatus>> {
    Ok(Json(state.gateway.get_torrent_status(&id).await?))
}

pub async fn delete_torrent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.gateway.remove_torrent(&id).await?;
    Ok(StatusCode::OK)
}
