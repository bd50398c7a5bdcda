//! Torrent gateway library.
//!
//! Turns a magnet link into an HTTP-addressable stream: a BitTorrent
//! session downloads the file, an HLS transmuxer repackages it on demand,
//! and a thin axum surface serves playlists, segments and direct byte
//! ranges. This library exposes its modules for use in integration tests.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod services;

use config::Config;
use services::Gateway;

/// Application state shared across handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub gateway: Arc<Gateway>,
}
