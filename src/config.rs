//! Configuration module for the torrent gateway.
//!
//! Loads configuration from `config.toml` with environment variable overrides.

use config::{Config as ConfigLoader, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::AppError;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub torrent: TorrentConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    6991
}

/// Filesystem roots for downloaded torrent data and generated HLS artifacts.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_download_path")]
    pub download_path: PathBuf,
    #[serde(default = "default_hls_path")]
    pub hls_path: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            download_path: default_download_path(),
            hls_path: default_hls_path(),
        }
    }
}

fn default_download_path() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_hls_path() -> PathBuf {
    PathBuf::from("./hls")
}

/// BitTorrent session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TorrentConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for TorrentConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    200
}

/// Warm-cache and transmuxing policy knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamingConfig {
    #[serde(default = "default_warm_cache_size_mb")]
    pub warm_cache_size_mb: u64,
    #[serde(default = "default_warm_cache_timeout_minutes")]
    pub warm_cache_timeout_minutes: u64,
    #[serde(default = "default_encoder_bin")]
    pub encoder_bin: String,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            warm_cache_size_mb: default_warm_cache_size_mb(),
            warm_cache_timeout_minutes: default_warm_cache_timeout_minutes(),
            encoder_bin: default_encoder_bin(),
        }
    }
}

fn default_warm_cache_size_mb() -> u64 {
    50
}

fn default_warm_cache_timeout_minutes() -> u64 {
    20
}

fn default_encoder_bin() -> String {
    "ffmpeg".to_string()
}

/// Deadlines and poll intervals governing the admission and streaming paths.
/// Overridable mainly so integration tests can shrink them.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_metadata_secs")]
    pub metadata_secs: u64,
    #[serde(default = "default_source_file_secs")]
    pub source_file_secs: u64,
    #[serde(default = "default_playlist_secs")]
    pub playlist_secs: u64,
    #[serde(default = "default_range_retry_millis")]
    pub range_retry_millis: u64,
    #[serde(default = "default_reaper_tick_secs")]
    pub reaper_tick_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            metadata_secs: default_metadata_secs(),
            source_file_secs: default_source_file_secs(),
            playlist_secs: default_playlist_secs(),
            range_retry_millis: default_range_retry_millis(),
            reaper_tick_secs: default_reaper_tick_secs(),
        }
    }
}

fn default_metadata_secs() -> u64 {
    30
}

fn default_source_file_secs() -> u64 {
    300
}

fn default_playlist_secs() -> u64 {
    120
}

fn default_range_retry_millis() -> u64 {
    500
}

fn default_reaper_tick_secs() -> u64 {
    60
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` in current directory (optional)
    /// 3. Environment variables with `GATEWAY_` prefix
    ///
    /// Environment variables use double underscore for nesting:
    /// - `GATEWAY_SERVER__PORT=9000` sets `server.port`
    /// - `GATEWAY_PATHS__DOWNLOAD_PATH=/data/downloads` sets `paths.download_path`
    ///
    /// The plain `PORT`, `DOWNLOAD_PATH`, `HLS_PATH`, `WARM_CACHE_SIZE_MB`,
    /// `WARM_CACHE_TIMEOUT_MINUTES` and `ENCODER_BIN` variables are also honored
    /// directly, matching the original service's environment contract.
    pub fn load() -> Result<Self, AppError> {
        Self::load_from("config.toml")
    }

    /// Load configuration from a specific file path.
    pub fn load_from(config_path: &str) -> Result<Self, AppError> {
        let mut builder = ConfigLoader::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("paths.download_path", default_download_path().to_string_lossy().to_string())?
            .set_default("paths.hls_path", default_hls_path().to_string_lossy().to_string())?
            .set_default("torrent.max_connections", default_max_connections() as i64)?
            .set_default("streaming.warm_cache_size_mb", default_warm_cache_size_mb() as i64)?
            .set_default(
                "streaming.warm_cache_timeout_minutes",
                default_warm_cache_timeout_minutes() as i64,
            )?
            .set_default("streaming.encoder_bin", default_encoder_bin())?
            .add_source(File::with_name(config_path).required(false));

        if let Ok(port) = std::env::var("PORT") {
            builder = builder.set_override("server.port", port)?;
        }
        if let Ok(path) = std::env::var("DOWNLOAD_PATH") {
            builder = builder.set_override("paths.download_path", path)?;
        }
        if let Ok(path) = std::env::var("HLS_PATH") {
            builder = builder.set_override("paths.hls_path", path)?;
        }
        if let Ok(mb) = std::env::var("WARM_CACHE_SIZE_MB") {
            builder = builder.set_override("streaming.warm_cache_size_mb", mb)?;
        }
        if let Ok(min) = std::env::var("WARM_CACHE_TIMEOUT_MINUTES") {
            builder = builder.set_override("streaming.warm_cache_timeout_minutes", min)?;
        }
        if let Ok(bin) = std::env::var("ENCODER_BIN") {
            builder = builder.set_override("streaming.encoder_bin", bin)?;
        }

        let config = builder
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for required fields.
    fn validate(&self) -> Result<(), AppError> {
        if self.streaming.warm_cache_size_mb == 0 {
            return Err(AppError::Internal(
                "streaming.warm_cache_size_mb must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the HTTP server socket address.
    pub fn server_addr(&self) -> std::net::SocketAddr {
        use std::net::{IpAddr, SocketAddr};
        let ip: IpAddr = self.server.host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid host '{}', using 0.0.0.0", self.server.host);
            "0.0.0.0".parse().unwrap()
        });
        SocketAddr::new(ip, self.server.port)
    }

    /// The BitTorrent session's own listen port, always the HTTP port plus ten.
    pub fn session_port(&self) -> u16 {
        self.server.port.saturating_add(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::load_from("nonexistent.toml").unwrap();
        assert_eq!(config.server.port, 6991);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.streaming.warm_cache_size_mb, 50);
        assert_eq!(config.streaming.warm_cache_timeout_minutes, 20);
    }

    #[test]
    fn test_server_addr() {
        let config = Config::load_from("nonexistent.toml").unwrap();
        let addr = config.server_addr();
        assert_eq!(addr.port(), 6991);
    }

    #[test]
    fn test_session_port_is_http_port_plus_ten() {
        let config = Config::load_from("nonexistent.toml").unwrap();
        assert_eq!(config.session_port(), 7001);
    }

    #[test]
    fn test_timeouts_defaults() {
        let config = Config::load_from("nonexistent.toml").unwrap();
        assert_eq!(config.timeouts.metadata_secs, 30);
        assert_eq!(config.timeouts.source_file_secs, 300);
        assert_eq!(config.timeouts.playlist_secs, 120);
        assert_eq!(config.timeouts.range_retry_millis, 500);
        assert_eq!(config.timeouts.reaper_tick_secs, 60);
    }
}
