use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use torrent_gateway::config::Config;
use torrent_gateway::services::{registry::Registry, AlertLoop, Gateway, Reaper, SessionFacade};
use torrent_gateway::{api, AppState};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("torrent_gateway=debug,tower_http=debug,axum=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    tracing::info!("Starting torrent gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = match Config::load() {
        Ok(cfg) => {
            tracing::info!("Configuration loaded successfully");
            tracing::debug!("Server: {}:{}", cfg.server.host, cfg.server.port);
            tracing::debug!("Download path: {:?}", cfg.paths.download_path);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    for dir in [&config.paths.download_path, &config.paths.hls_path] {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::error!("Failed to create directory {:?}: {}", dir, e);
            std::process::exit(1);
        }
    }

    let session = match SessionFacade::new(config.paths.download_path.clone(), config.session_port()).await {
        Ok(session) => {
            tracing::info!(port = config.session_port(), "Torrent session started");
            Arc::new(session)
        }
        Err(e) => {
            tracing::error!("Failed to start torrent session: {}", e);
            std::process::exit(1);
        }
    };

    let registry = Arc::new(Registry::new());
    let gateway = Arc::new(Gateway::new(Arc::clone(&session), Arc::clone(&registry), &config));

    tokio::spawn(AlertLoop::new(
        Arc::clone(&registry),
        Arc::clone(&session),
        config.streaming.warm_cache_size_mb,
    )
    .run());

    tokio::spawn(Reaper::new(
        Arc::clone(&registry),
        Arc::clone(&session),
        std::time::Duration::from_secs(config.timeouts.reaper_tick_secs),
        std::time::Duration::from_secs(config.streaming.warm_cache_timeout_minutes * 60),
    )
    .run());

    let state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        gateway,
    });

    let torrents_routes = Router::new()
        .route("/", post(api::torrents::add_torrent).get(api::torrents::list_torrents))
        .route(
            "/{id}",
            get(api::torrents::get_torrent).delete(api::torrents::delete_torrent),
        );

    let stream_routes = Router::new()
        .route("/{id}", get(api::stream::get_playlist))
        .route("/{id}/{segment}", get(api::stream::get_segment))
        .route("/{id}/file/{index}", get(api::stream::get_file));

    let app = Router::new()
        .route("/health", get(api::health::health))
        .nest("/api/torrents", torrents_routes)
        .nest("/stream", stream_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = config.server_addr();
    tracing::info!("torrent gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
