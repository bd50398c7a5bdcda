//! Thin wrapper over the BitTorrent session library.
//!
//! Presents the add/remove/priority/deadline vocabulary the rest of the
//! core expects, built on top of `librqbit`'s real public surface: stats
//! polling instead of a native alert queue, `update_only_files` instead of
//! per-file priority bytes, and per-file `FileStream` positioning instead of
//! an explicit piece-deadline API. See SPEC_FULL.md §4.1 for the rationale.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use librqbit::{
    AddTorrent, AddTorrentOptions, AddTorrentResponse, ManagedTorrent, Session, SessionOptions,
    TorrentStats, TorrentStatsState,
};

use crate::error::{AppError, Result};

/// Outcome of submitting a magnet link to the session.
pub struct AddOutcome {
    pub handle: Arc<ManagedTorrent>,
    /// `false` if the torrent was already managed under this infohash.
    pub created: bool,
}

/// Point-in-time status of a torrent, translated from `TorrentStats`.
pub struct FacadeStatus {
    pub state: TorrentStatsState,
    pub progress_bytes: u64,
    pub total_bytes: u64,
    pub download_bps: u64,
    pub upload_bps: u64,
    pub num_peers: usize,
    pub finished: bool,
    pub error: Option<String>,
}

/// Render a torrent's 20-byte infohash as 40 lowercase hex characters.
pub fn info_hash_hex(handle: &ManagedTorrent) -> String {
    hex::encode(handle.info_hash().0)
}

/// Wraps a `librqbit::Session`, the process-wide BitTorrent engine.
pub struct SessionFacade {
    session: Arc<Session>,
}

impl SessionFacade {
    /// Start the session, listening on `listen_port` across all interfaces.
    pub async fn new(download_dir: PathBuf, listen_port: u16) -> Result<Self> {
        if !download_dir.exists() {
            std::fs::create_dir_all(&download_dir).map_err(|e| {
                AppError::Internal(format!(
                    "failed to create download directory {:?}: {}",
                    download_dir, e
                ))
            })?;
        }

        let opts = SessionOptions {
            listen_port_range: Some(listen_port..listen_port.saturating_add(1)),
            fastresume: true,
            ..Default::default()
        };

        let session = Session::new_with_opts(download_dir, opts)
            .await
            .map_err(|e| AppError::Internal(format!("failed to create torrent session: {}", e)))?;

        Ok(Self { session })
    }

    /// Add a magnet link. Idempotent: re-adding the same infohash returns
    /// the existing handle with `created = false`.
    pub async fn add(&self, magnet: &str) -> Result<AddOutcome> {
        let add_torrent = AddTorrent::from_url(magnet);
        let opts = AddTorrentOptions::default();

        let response = self
            .session
            .add_torrent(add_torrent, Some(opts))
            .await
            .map_err(|e| AppError::InvalidMagnet(e.to_string()))?;

        match response {
            AddTorrentResponse::AlreadyManaged(_id, handle) => Ok(AddOutcome {
                handle,
                created: false,
            }),
            AddTorrentResponse::Added(_id, handle) => Ok(AddOutcome {
                handle,
                created: true,
            }),
            AddTorrentResponse::ListOnly(list_response) => {
                let file_count = list_response.info.files.as_ref().map_or(1, |f| f.len());
                Err(AppError::InvalidMagnet(format!(
                    "magnet resolved to a list-only torrent with {} files",
                    file_count
                )))
            }
        }
    }

    /// Non-fatal no-op for an already-removed handle; the caller is
    /// expected to drop its own reference regardless.
    pub async fn remove(&self, handle: &Arc<ManagedTorrent>, delete_files: bool) -> Result<()> {
        let id = handle.id();
        if let Err(e) = self
            .session
            .delete(librqbit::api::TorrentIdOrHash::Id(id), delete_files)
            .await
        {
            tracing::debug!(error = %e, "torrent already gone from session, treating removal as success");
        }
        Ok(())
    }

    pub async fn pause(&self, handle: &Arc<ManagedTorrent>) -> Result<()> {
        if let Err(e) = self.session.pause(handle).await {
            tracing::debug!(error = %e, "pause on invalidated handle, ignoring");
        }
        Ok(())
    }

    pub async fn resume(&self, handle: &Arc<ManagedTorrent>) -> Result<()> {
        if let Err(e) = self.session.unpause(handle).await {
            tracing::debug!(error = %e, "resume on invalidated handle, ignoring");
        }
        Ok(())
    }

    /// Restrict the active file set to `included` (by file index). An empty
    /// set is rejected by the underlying session, so callers always include
    /// at least the chosen video file.
    pub async fn set_file_priorities(
        &self,
        handle: &Arc<ManagedTorrent>,
        included: HashSet<usize>,
    ) -> Result<()> {
        self.session
            .update_only_files(handle, &included)
            .await
            .map_err(|e| AppError::Internal(format!("failed to update file selection: {}", e)))
    }

    /// Bias the swarm toward `file_id` by opening (and immediately dropping)
    /// a read stream positioned at `byte_offset`. This is the real mechanism
    /// `librqbit` uses to reprioritize pieces; there is no separate deadline
    /// API to call into.
    pub async fn prioritize_byte_offset(
        &self,
        handle: &Arc<ManagedTorrent>,
        file_id: usize,
        byte_offset: u64,
    ) -> Result<()> {
        use tokio::io::AsyncSeekExt;

        let mut stream = Arc::clone(handle)
            .stream(file_id)
            .map_err(|e| AppError::Internal(format!("failed to open file stream: {}", e)))?;
        stream
            .seek(std::io::SeekFrom::Start(byte_offset))
            .await
            .map_err(|e| AppError::Internal(format!("failed to seek file stream: {}", e)))?;
        Ok(())
    }

    pub fn status(&self, handle: &Arc<ManagedTorrent>) -> FacadeStatus {
        let stats = handle.stats();
        facade_status_from_stats(&stats)
    }

    /// Open a readable, seekable stream over one of the torrent's files.
    pub fn open_file_stream(
        &self,
        handle: &Arc<ManagedTorrent>,
        file_id: usize,
    ) -> Result<impl tokio::io::AsyncRead + tokio::io::AsyncSeek + Send + Unpin + 'static> {
        Arc::clone(handle)
            .stream(file_id)
            .map_err(|e| AppError::Internal(format!("failed to open file stream: {}", e)))
    }
}

pub fn facade_status_from_stats(stats: &TorrentStats) -> FacadeStatus {
    let (download_bps, upload_bps, num_peers) = stats
        .live
        .as_ref()
        .map(|live| {
            let download_bps = (live.download_speed.mbps * 1_000_000.0 / 8.0) as u64;
            let upload_bps = (live.upload_speed.mbps * 1_000_000.0 / 8.0) as u64;
            let peers = (live.snapshot.peer_stats.queued
                + live.snapshot.peer_stats.connecting
                + live.snapshot.peer_stats.live) as usize;
            (download_bps, upload_bps, peers)
        })
        .unwrap_or((0u64, 0u64, 0usize));

    FacadeStatus {
        state: stats.state,
        progress_bytes: stats.progress_bytes,
        total_bytes: stats.total_bytes,
        download_bps,
        upload_bps,
        num_peers,
        finished: stats.finished,
        error: stats.error.clone(),
    }
}
