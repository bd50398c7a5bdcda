//! Alert Loop: the single task that advances every torrent's state machine.
//!
//! `librqbit` exposes no native alert queue, so this loop polls each
//! tracked torrent's `TorrentStats` once per tick and synthesizes the
//! metadata/piece/finished/error alert vocabulary by diffing against the
//! previous snapshot, in the spirit of the 1 Hz progress-polling loop this
//! is grounded on.

use std::time::Duration;

use librqbit::TorrentStatsState;

use crate::services::registry::{is_video_path, FileEntry, Registry, TorrentState};
use crate::services::scheduler::PieceScheduler;
use crate::services::session::SessionFacade;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

pub struct AlertLoop {
    registry: std::sync::Arc<Registry>,
    session: std::sync::Arc<SessionFacade>,
    warm_cache_size_mb: u64,
}

impl AlertLoop {
    pub fn new(
        registry: std::sync::Arc<Registry>,
        session: std::sync::Arc<SessionFacade>,
        warm_cache_size_mb: u64,
    ) -> Self {
        Self {
            registry,
            session,
            warm_cache_size_mb,
        }
    }

    /// Run forever, advancing every tracked torrent's state once per tick.
    pub async fn run(self) {
        loop {
            for entry in self.registry.list_handles().await {
                if let Err(e) = self.tick_one(&entry).await {
                    tracing::warn!(error = ?e, "alert loop tick failed for a torrent");
                }
            }
            tokio::time::sleep(TICK_INTERVAL).await;
        }
    }

    async fn tick_one(
        &self,
        entry: &std::sync::Arc<crate::services::registry::TorrentEntry>,
    ) -> crate::error::Result<()> {
        let handle = {
            let guard = entry.state.read().await;
            if guard.state == TorrentState::Removing {
                return Ok(());
            }
            guard.handle.clone()
        };

        let stats = handle.stats();

        if let Some(ref message) = stats.error {
            let mut guard = entry.state.write().await;
            if guard.state != TorrentState::Errored {
                tracing::error!(info_hash = %guard.info_hash, error = %message, "torrent reported a fatal error");
                guard.state = TorrentState::Errored;
                guard.error = Some(message.clone());
            }
            return Ok(());
        }

        let needs_metadata = {
            let guard = entry.state.read().await;
            guard.state == TorrentState::MetadataPending
        };

        if needs_metadata {
            if let Some(files) = files_from_metadata(&handle) {
                let scheduler = PieceScheduler::new(&self.session);
                let mut guard = entry.state.write().await;
                guard.files = files;
                guard.state = TorrentState::WarmCaching;
                tracing::info!(info_hash = %guard.info_hash, name = %guard.name, "metadata received, beginning warm cache");

                if let Some(video) = guard.largest_video_file().cloned() {
                    let handle = guard.handle.clone();
                    drop(guard);
                    scheduler
                        .begin_warm_cache(&handle, &video, self.warm_cache_size_mb)
                        .await?;
                } else {
                    guard.state = TorrentState::Errored;
                    guard.error = Some("no video file found in torrent".to_string());
                }
            }
            return Ok(());
        }

        let warm_caching = {
            let guard = entry.state.read().await;
            guard.state == TorrentState::WarmCaching
        };

        if warm_caching {
            let warm_bytes = self.warm_cache_size_mb.saturating_mul(1024 * 1024);
            let video_size = {
                let guard = entry.state.read().await;
                guard.largest_video_file().map(|f| f.size)
            };
            if let Some(video_size) = video_size {
                let target = warm_bytes.min(video_size);
                if stats.progress_bytes >= target {
                    let mut guard = entry.state.write().await;
                    guard.state = TorrentState::Idle;
                    tracing::info!(info_hash = %guard.info_hash, "warm cache satisfied, pausing torrent");
                    let handle = guard.handle.clone();
                    drop(guard);
                    self.session.pause(&handle).await?;
                }
            }
            return Ok(());
        }

        if stats.finished {
            let mut guard = entry.state.write().await;
            if guard.state != TorrentState::Seeding {
                guard.state = TorrentState::Seeding;
                tracing::info!(info_hash = %guard.info_hash, "torrent finished downloading");
            }
        }

        Ok(())
    }
}

/// Enumerate a torrent's files once metadata has arrived, or `None` if it
/// hasn't yet.
fn files_from_metadata(handle: &std::sync::Arc<librqbit::ManagedTorrent>) -> Option<Vec<FileEntry>> {
    handle
        .with_metadata(|meta| {
            meta.file_infos
                .iter()
                .enumerate()
                .map(|(index, info)| {
                    let relative_path = info.relative_filename.to_string_lossy().to_string();
                    FileEntry {
                        index,
                        is_video: is_video_path(&relative_path),
                        relative_path,
                        size: info.len,
                        offset_in_torrent: info.offset_in_torrent,
                    }
                })
                .collect::<Vec<_>>()
        })
        .ok()
}

#[allow(dead_code)]
fn state_label(state: TorrentStatsState) -> &'static str {
    match state {
        TorrentStatsState::Initializing => "initializing",
        TorrentStatsState::Live => "live",
        TorrentStatsState::Paused => "paused",
        TorrentStatsState::Error => "error",
    }
}
