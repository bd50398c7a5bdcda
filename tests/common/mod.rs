//! Test infrastructure for torrent gateway integration tests.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use axum_test::TestServer;
use tempfile::TempDir;

use torrent_gateway::config::{Config, PathsConfig, ServerConfig, StreamingConfig, TimeoutsConfig, TorrentConfig};
use torrent_gateway::services::{registry::Registry, Gateway, SessionFacade};
use torrent_gateway::{api, AppState};

/// Test application wrapping `axum_test::TestServer` against a real
/// (but network-isolated, tempdir-backed) torrent session.
pub struct TestApp {
    server: TestServer,
    // Keeps the download/hls directories alive for the test's lifetime.
    _download_dir: TempDir,
    _hls_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let download_dir = TempDir::new().expect("failed to create download tempdir");
        let hls_dir = TempDir::new().expect("failed to create hls tempdir");

        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            paths: PathsConfig {
                download_path: download_dir.path().to_path_buf(),
                hls_path: hls_dir.path().to_path_buf(),
            },
            torrent: TorrentConfig { max_connections: 50 },
            streaming: StreamingConfig {
                warm_cache_size_mb: 10,
                warm_cache_timeout_minutes: 20,
                encoder_bin: "ffmpeg".to_string(),
            },
            timeouts: TimeoutsConfig {
                metadata_secs: 1,
                source_file_secs: 1,
                playlist_secs: 1,
                range_retry_millis: 10,
                reaper_tick_secs: 60,
            },
        };

        let session = SessionFacade::new(download_dir.path().to_path_buf(), 0)
            .await
            .expect("failed to start test torrent session");
        let session = Arc::new(session);
        let registry = Arc::new(Registry::new());
        let gateway = Arc::new(Gateway::new(Arc::clone(&session), Arc::clone(&registry), &config));

        let state = Arc::new(AppState {
            config: Arc::new(config),
            gateway,
        });

        let app = Self::build_router(state);
        let server = TestServer::new(app).expect("failed to create test server");

        Self {
            server,
            _download_dir: download_dir,
            _hls_dir: hls_dir,
        }
    }

    fn build_router(state: Arc<AppState>) -> Router {
        let torrents_routes = Router::new()
            .route("/", axum::routing::post(api::torrents::add_torrent).get(api::torrents::list_torrents))
            .route(
                "/{id}",
                get(api::torrents::get_torrent).delete(api::torrents::delete_torrent),
            );

        let stream_routes = Router::new()
            .route("/{id}", get(api::stream::get_playlist))
            .route("/{id}/{segment}", get(api::stream::get_segment))
            .route("/{id}/file/{index}", get(api::stream::get_file));

        Router::new()
            .route("/health", get(api::health::health))
            .nest("/api/torrents", torrents_routes)
            .nest("/stream", stream_routes)
            .with_state(state)
    }

    pub fn server(&self) -> &TestServer {
        &self.server
    }
}
