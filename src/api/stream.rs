//! `/stream` surface: HLS playlist/segment delivery and direct byte-range
//! reads straight out of the torrent.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::{AppError, Result};
use crate::services::{registry::TorrentState, stream_reader};
use crate::AppState;

pub async fn get_playlist(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response> {
    let playlist_path = state.gateway.ensure_stream(&id).await?;
    let bytes = tokio::fs::read(&playlist_path)
        .await
        .map_err(|e| AppError::Internal(format!("failed to read playlist: {}", e)))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")],
        bytes,
    )
        .into_response())
}

pub async fn get_segment(
    State(state): State<Arc<AppState>>,
    Path((id, segment)): Path<(String, String)>,
) -> Result<Response> {
    let segment_path = state.gateway.segment_path(&id, &segment).await?;
    let bytes = tokio::fs::read(&segment_path)
        .await
        .map_err(|_| AppError::NotFound(format!("segment {} not found", segment)))?;

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "video/MP2T")], bytes).into_response())
}

pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(String, usize)>,
    headers: HeaderMap,
) -> Result<Response> {
    let entry = state.gateway.entry(&id).await?;

    let (handle, file, download_path) = {
        let guard = entry.state.read().await;
        if guard.state == TorrentState::Errored {
            return Err(AppError::TorrentError(format!(
                "torrent {} is in an errored state",
                id
            )));
        }
        let file = guard
            .files
            .iter()
            .find(|f| f.index == index)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("file index {} not found", index)))?;
        (guard.handle.clone(), file, state.config.paths.download_path.clone())
    };

    let range_header = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let range = match &range_header {
        Some(h) => stream_reader::parse_range(h, file.size)?.unwrap_or(0..file.size),
        None => 0..file.size,
    };

    {
        let scheduler = crate::services::scheduler::PieceScheduler::new(state.gateway.session());
        scheduler
            .prioritize_for_streaming(&handle, &file, range.start)
            .await?;
    }

    if stream_reader::needs_remux(&file.relative_path) {
        let source_path = crate::services::registry::resolve_source_path(&download_path, &file.relative_path)?;
        let body = stream_reader::remux_to_mp4_stream(&state.config.streaming.encoder_bin, &source_path)?;
        return Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "video/mp4")],
            body,
        )
            .into_response());
    }

    let retry_delay = std::time::Duration::from_millis(state.config.timeouts.range_retry_millis);
    let content_length = range.end - range.start;
    let body = stream_reader::stream_range(
        Arc::clone(state.gateway.session()),
        handle,
        index,
        range.clone(),
        retry_delay,
    )?;

    let content_range = format!("bytes {}-{}/{}", range.start, range.end - 1, file.size);
    let status = if range_header.is_some() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (header::CONTENT_RANGE, content_range),
            (header::ACCEPT_RANGES, "bytes".to_string()),
            (header::CONTENT_LENGTH, content_length.to_string()),
        ],
        body,
    )
        .into_response())
}
