//! Application error types for the torrent gateway.
//!
//! Provides a unified error type that implements `IntoResponse` for Axum.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// The submitted magnet link could not be parsed.
    #[error("Invalid magnet link: {0}")]
    InvalidMagnet(String),

    /// Metadata for a newly admitted torrent did not arrive within the deadline.
    #[error("Timed out waiting for torrent metadata")]
    MetadataTimeout,

    /// Resource not found (torrent, file, segment).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The source video file did not appear on disk within the deadline.
    #[error("Timed out waiting for source file to be downloaded")]
    SourceFileTimeout,

    /// The transmuxer process failed or its playlist never appeared.
    #[error("Transmux failed: {0}")]
    TransmuxFailed(String),

    /// The torrent session itself reported a fatal error for this torrent.
    #[error("Torrent error: {0}")]
    TorrentError(String),

    /// A `Range` header could not be satisfied against the file's size.
    #[error("Range not satisfiable")]
    RangeNotSatisfiable,

    /// Configuration loading/parsing errors.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Catch-all for session/io failures that don't fit a more specific kind.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::InvalidMagnet(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_magnet", Some(msg.clone()))
            }
            AppError::MetadataTimeout => (
                StatusCode::SERVICE_UNAVAILABLE,
                "metadata_timeout",
                None,
            ),
            AppError::NotFound(resource) => {
                (StatusCode::NOT_FOUND, "not_found", Some(resource.clone()))
            }
            AppError::SourceFileTimeout => {
                tracing::error!("source file timed out before transmux could start");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "source_file_timeout",
                    None,
                )
            }
            AppError::TransmuxFailed(detail) => {
                tracing::error!("transmux failed: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "transmux_failed",
                    Some(detail.clone()),
                )
            }
            AppError::TorrentError(detail) => {
                tracing::error!("torrent session error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "torrent_error",
                    Some(detail.clone()),
                )
            }
            AppError::RangeNotSatisfiable => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                "range_not_satisfiable",
                None,
            ),
            AppError::Config(e) => {
                tracing::error!("config error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "configuration_error",
                    None,
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias used throughout the gateway.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_status() {
        let error = AppError::NotFound("test".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_metadata_timeout_status() {
        let error = AppError::MetadataTimeout;
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_invalid_magnet_status() {
        let error = AppError::InvalidMagnet("bad".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_range_not_satisfiable_status() {
        let error = AppError::RangeNotSatisfiable;
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    }

    #[test]
    fn test_transmux_failed_status() {
        let error = AppError::TransmuxFailed("ffmpeg exited 1".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
