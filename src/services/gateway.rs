//! Gateway: the application-facing orchestrator that the HTTP layer talks
//! to. Bundles the session facade, registry and transmuxer supervisor
//! behind the handful of operations the API surface actually needs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::services::registry::{resolve_source_path, Registry, TorrentEntry, TorrentState, TorrentStatus};
use crate::services::scheduler::PieceScheduler;
use crate::services::session::SessionFacade;

pub struct Gateway {
    session: Arc<SessionFacade>,
    registry: Arc<Registry>,
    transmuxer: crate::services::transmuxer::TransmuxerSupervisor,
    download_path: PathBuf,
    hls_path: PathBuf,
    metadata_timeout: Duration,
}

impl Gateway {
    pub fn new(
        session: Arc<SessionFacade>,
        registry: Arc<Registry>,
        config: &Config,
    ) -> Self {
        let transmuxer = crate::services::transmuxer::TransmuxerSupervisor::new(
            config.streaming.encoder_bin.clone(),
            Duration::from_secs(config.timeouts.playlist_secs),
            Duration::from_secs(config.timeouts.source_file_secs),
        );

        Self {
            session,
            registry,
            transmuxer,
            download_path: config.paths.download_path.clone(),
            hls_path: config.paths.hls_path.clone(),
            metadata_timeout: Duration::from_secs(config.timeouts.metadata_secs),
        }
    }

    pub async fn add_torrent(&self, magnet: &str) -> Result<(String, bool)> {
        self.registry.add(&self.session, magnet, self.metadata_timeout).await
    }

    pub async fn list_torrents(&self) -> Vec<TorrentStatus> {
        let mut out = Vec::new();
        for entry in self.registry.list_handles().await {
            let guard = entry.state.read().await;
            out.push(Registry::status_of(&guard).await);
        }
        out
    }

    pub async fn get_torrent_status(&self, info_hash: &str) -> Result<TorrentStatus> {
        let entry = self
            .registry
            .get(info_hash)
            .await
            .ok_or_else(|| AppError::NotFound(format!("torrent {} not found", info_hash)))?;
        let guard = entry.state.read().await;
        Ok(Registry::status_of(&guard).await)
    }

    /// Remove a torrent: reap any transmuxer, erase its files from the
    /// session, evict the HLS directory, then drop it from the registry.
    pub async fn remove_torrent(&self, info_hash: &str) -> Result<()> {
        let entry = self.registry.remove(info_hash).await?;

        let (transmuxer, handle) = {
            let guard = entry.state.read().await;
            (guard.transmuxer.clone(), guard.handle.clone())
        };

        if let Some(transmuxer) = transmuxer {
            transmuxer.reap().await;
        } else {
            let _ = tokio::fs::remove_dir_all(self.hls_dir_for(info_hash)).await;
        }

        self.session.remove(&handle, true).await?;

        Ok(())
    }

    /// Idempotently ensure an HLS transmuxer is running for this torrent,
    /// returning its playlist path. At most one transmuxer is spawned
    /// across any number of concurrent callers: `stream_lock` is held for
    /// the whole check-then-spawn sequence, including the process spawn
    /// and the wait for the playlist to appear.
    pub async fn ensure_stream(&self, info_hash: &str) -> Result<PathBuf> {
        let entry = self
            .registry
            .get(info_hash)
            .await
            .ok_or_else(|| AppError::NotFound(format!("torrent {} not found", info_hash)))?;

        let _stream_guard = entry.stream_lock.lock().await;

        if let Some(playlist) = self.existing_playlist(&entry).await {
            self.touch_access(&entry).await;
            return Ok(playlist);
        }

        let (handle, video_file, already_errored, metadata_pending) = {
            let guard = entry.state.read().await;
            if guard.state == TorrentState::Errored {
                (None, None, true, false)
            } else if guard.state == TorrentState::MetadataPending {
                (None, None, false, true)
            } else {
                (
                    Some(guard.handle.clone()),
                    guard.largest_video_file().cloned(),
                    false,
                    false,
                )
            }
        };

        if already_errored {
            return Err(AppError::TorrentError(format!(
                "torrent {} is in an errored state",
                info_hash
            )));
        }
        if metadata_pending {
            return Err(AppError::MetadataTimeout);
        }

        let handle = handle.expect("checked above");
        let video_file = video_file.ok_or_else(|| {
            AppError::NotFound(format!("torrent {} has no known video file yet", info_hash))
        })?;

        let source_path = resolve_source_path(&self.download_path, &video_file.relative_path)?;
        self.transmuxer.wait_for_source_file(&source_path).await?;

        self.session.resume(&handle).await?;
        {
            let scheduler = PieceScheduler::new(&self.session);
            scheduler
                .prioritize_for_streaming(&handle, &video_file, 0)
                .await?;
        }

        let hls_dir = self.hls_dir_for(info_hash);
        let process = match self.transmuxer.spawn(&source_path, &hls_dir).await {
            Ok(process) => process,
            Err(e) => {
                let mut guard = entry.state.write().await;
                guard.state = TorrentState::Idle;
                drop(guard);
                let _ = self.session.pause(&handle).await;
                return Err(e);
            }
        };
        let playlist_path = process.playlist_path();

        {
            let mut guard = entry.state.write().await;
            guard.state = TorrentState::Streaming;
            guard.transmuxer = Some(process);
            guard.touch_hls_access(Instant::now());
        }

        Ok(playlist_path)
    }

    pub async fn segment_path(&self, info_hash: &str, segment: &str) -> Result<PathBuf> {
        let entry = self
            .registry
            .get(info_hash)
            .await
            .ok_or_else(|| AppError::NotFound(format!("torrent {} not found", info_hash)))?;

        self.touch_access(&entry).await;

        let transmuxer = {
            let guard = entry.state.read().await;
            guard.transmuxer.clone()
        };
        let transmuxer = transmuxer
            .ok_or_else(|| AppError::NotFound(format!("no active stream for torrent {}", info_hash)))?;

        let path = transmuxer
            .segment_path(segment)
            .ok_or_else(|| AppError::NotFound(format!("segment {} not found", segment)))?;

        if tokio::fs::metadata(&path).await.is_err() {
            return Err(AppError::NotFound(format!("segment {} not found", segment)));
        }

        Ok(path)
    }

    pub async fn entry(&self, info_hash: &str) -> Result<Arc<TorrentEntry>> {
        self.registry
            .get(info_hash)
            .await
            .ok_or_else(|| AppError::NotFound(format!("torrent {} not found", info_hash)))
    }

    pub fn session(&self) -> &Arc<SessionFacade> {
        &self.session
    }

    fn hls_dir_for(&self, info_hash: &str) -> PathBuf {
        self.hls_path.join(info_hash)
    }

    async fn existing_playlist(&self, entry: &TorrentEntry) -> Option<PathBuf> {
        let guard = entry.state.read().await;
        guard.transmuxer.as_ref().map(|t| t.playlist_path())
    }

    async fn touch_access(&self, entry: &TorrentEntry) {
        let mut guard = entry.state.write().await;
        guard.touch_hls_access(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hls_dir_is_namespaced_per_torrent() {
        let hls_path = PathBuf::from("/tmp/gateway-hls");
        let a = hls_path.join("aaaa");
        let b = hls_path.join("bbbb");
        assert_ne!(a, b);
    }
}
