//! Process-wide mapping from infohash to Torrent record.
//!
//! The registry is the sole writer of Torrent insertion/removal; mutation of
//! an individual Torrent's fields happens through the per-Torrent lock it
//! hands out, never by holding the registry's own map lock during I/O.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use librqbit::ManagedTorrent;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::services::session::{info_hash_hex, SessionFacade};
use crate::services::transmuxer::TransmuxerProcess;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "wmv", "flv"];

/// State machine position of a Torrent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    MetadataPending,
    WarmCaching,
    Idle,
    Streaming,
    Seeding,
    Errored,
    Removing,
}

/// One file inside a torrent, as reported to API clients.
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub index: usize,
    pub relative_path: String,
    pub size: u64,
    pub is_video: bool,
    #[serde(skip)]
    pub offset_in_torrent: u64,
}

pub fn is_video_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    VIDEO_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")))
}

/// The central record for one admitted torrent.
pub struct Torrent {
    pub info_hash: String,
    pub handle: Arc<ManagedTorrent>,
    pub state: TorrentState,
    pub name: String,
    pub files: Vec<FileEntry>,
    pub added_at: Instant,
    pub added_at_utc: chrono::DateTime<chrono::Utc>,
    pub hls_last_accessed_at: Instant,
    pub transmuxer: Option<Arc<TransmuxerProcess>>,
    pub error: Option<String>,
}

impl Torrent {
    fn new(info_hash: String, handle: Arc<ManagedTorrent>, name: String) -> Self {
        let now = Instant::now();
        Self {
            info_hash,
            handle,
            state: TorrentState::MetadataPending,
            name,
            files: Vec::new(),
            added_at: now,
            added_at_utc: chrono::Utc::now(),
            hls_last_accessed_at: now,
            transmuxer: None,
            error: None,
        }
    }

    /// Largest file flagged `is_video`; ties broken by lower index.
    pub fn largest_video_file(&self) -> Option<&FileEntry> {
        self.files
            .iter()
            .filter(|f| f.is_video)
            .max_by(|a, b| {
                a.size
                    .cmp(&b.size)
                    .then_with(|| b.index.cmp(&a.index))
            })
    }

    /// Record access, keeping the maximum under concurrent writers.
    pub fn touch_hls_access(&mut self, at: Instant) {
        if at > self.hls_last_accessed_at {
            self.hls_last_accessed_at = at;
        }
    }
}

/// DTO returned from the `/api/torrents` surface.
#[derive(Debug, Clone, Serialize)]
pub struct TorrentStatus {
    pub hash: String,
    pub name: String,
    pub status: TorrentState,
    pub added_at: chrono::DateTime<chrono::Utc>,
    pub progress: f64,
    pub download_rate: u64,
    pub upload_rate: u64,
    pub num_peers: usize,
    pub files: Vec<FileStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileStatus {
    pub name: String,
    pub size: u64,
    pub progress: f64,
    pub is_video: bool,
}

/// A registered torrent plus the coordination the registry hands out
/// alongside it. `stream_lock` serializes `ensure_stream` so that N
/// concurrent playlist requests spawn at most one transmuxer: it must be
/// held across the spawn's I/O, which the per-Torrent `RwLock` cannot do
/// without violating the no-lock-across-suspension rule.
pub struct TorrentEntry {
    pub state: RwLock<Torrent>,
    pub stream_lock: tokio::sync::Mutex<()>,
}

pub struct Registry {
    torrents: RwLock<HashMap<String, Arc<TorrentEntry>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            torrents: RwLock::new(HashMap::new()),
        }
    }

    /// Admit a magnet link. Blocks until the session reports a valid
    /// infohash or `metadata_timeout` elapses.
    pub async fn add(
        &self,
        session: &SessionFacade,
        magnet: &str,
        metadata_timeout: Duration,
    ) -> Result<(String, bool)> {
        let outcome = tokio::time::timeout(metadata_timeout, session.add(magnet))
            .await
            .map_err(|_| AppError::MetadataTimeout)??;

        let info_hash = info_hash_hex(&outcome.handle);

        {
            let map = self.torrents.read().await;
            if map.contains_key(&info_hash) {
                return Ok((info_hash, false));
            }
        }

        let name = outcome
            .handle
            .name()
            .unwrap_or_else(|| format!("torrent-{}", &info_hash[..8]));
        let torrent = Torrent::new(info_hash.clone(), outcome.handle, name);

        let mut map = self.torrents.write().await;
        let created = if map.contains_key(&info_hash) {
            false
        } else {
            map.insert(
                info_hash.clone(),
                Arc::new(TorrentEntry {
                    state: RwLock::new(torrent),
                    stream_lock: tokio::sync::Mutex::new(()),
                }),
            );
            true
        };

        Ok((info_hash, created))
    }

    pub async fn get(&self, info_hash: &str) -> Option<Arc<TorrentEntry>> {
        self.torrents.read().await.get(info_hash).cloned()
    }

    pub async fn list_handles(&self) -> Vec<Arc<TorrentEntry>> {
        self.torrents.read().await.values().cloned().collect()
    }

    pub async fn status_of(torrent: &Torrent) -> TorrentStatus {
        let total: u64 = torrent.files.iter().map(|f| f.size).sum();
        let progress = if total > 0 {
            // Approximate: exact per-file progress is not exposed by the
            // session; the aggregate torrent progress is reported for each
            // file proportionally once metadata is known.
            let aggregate = torrent.handle.stats();
            if aggregate.total_bytes > 0 {
                (aggregate.progress_bytes as f64 / aggregate.total_bytes as f64) * 100.0
            } else {
                0.0
            }
        } else {
            0.0
        };

        let stats = torrent.handle.stats();
        let facade_status = crate::services::session::facade_status_from_stats(&stats);

        TorrentStatus {
            hash: torrent.info_hash.clone(),
            name: torrent.name.clone(),
            status: torrent.state,
            added_at: torrent.added_at_utc,
            progress,
            download_rate: facade_status.download_bps / 1024,
            upload_rate: facade_status.upload_bps / 1024,
            num_peers: facade_status.num_peers,
            files: torrent
                .files
                .iter()
                .map(|f| FileStatus {
                    name: f.relative_path.clone(),
                    size: f.size,
                    progress,
                    is_video: f.is_video,
                })
                .collect(),
        }
    }

    /// Transition to `Removing`, then evict. Callers are responsible for
    /// reaping the transmuxer and asking the session to erase files before
    /// calling this, since those require I/O the registry itself must not
    /// perform while holding the map lock.
    pub async fn remove(&self, info_hash: &str) -> Result<Arc<TorrentEntry>> {
        let entry = {
            let map = self.torrents.read().await;
            map.get(info_hash)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("torrent {} not found", info_hash)))?
        };

        {
            let mut guard = entry.state.write().await;
            guard.state = TorrentState::Removing;
        }

        let mut map = self.torrents.write().await;
        map.remove(info_hash);

        Ok(entry)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a file's path on disk against the download root, rejecting any
/// relative path that would escape the root. The target file may not exist
/// yet, so this works lexically rather than via `canonicalize`.
pub fn resolve_source_path(download_root: &PathBuf, relative_path: &str) -> Result<PathBuf> {
    use std::path::Component;

    if std::path::Path::new(relative_path)
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        return Err(AppError::Internal(format!(
            "relative path {:?} escapes download root",
            relative_path
        )));
    }

    Ok(download_root.join(relative_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_video_path() {
        assert!(is_video_path("Movie.Name.2024.mkv"));
        assert!(is_video_path("show/S01E01.MP4"));
        assert!(!is_video_path("sample.nfo"));
        assert!(!is_video_path("cover.jpg"));
    }

    #[test]
    fn test_largest_video_file_tiebreak() {
        let files = vec![
            FileEntry {
                index: 1,
                relative_path: "b.mkv".into(),
                size: 100,
                is_video: true,
                offset_in_torrent: 0,
            },
            FileEntry {
                index: 0,
                relative_path: "a.mkv".into(),
                size: 100,
                is_video: true,
                offset_in_torrent: 0,
            },
        ];
        let max = files
            .iter()
            .filter(|f| f.is_video)
            .max_by(|a, b| a.size.cmp(&b.size).then_with(|| b.index.cmp(&a.index)))
            .unwrap();
        assert_eq!(max.index, 0);
    }

    #[test]
    fn test_resolve_source_path_rejects_escape() {
        let root = PathBuf::from("/tmp/gateway-downloads");
        let err = resolve_source_path(&root, "../../etc/passwd").unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn test_resolve_source_path_accepts_nested() {
        let root = PathBuf::from("/tmp/gateway-downloads");
        let resolved = resolve_source_path(&root, "MyShow/episode01.mkv").unwrap();
        assert_eq!(resolved, root.join("MyShow/episode01.mkv"));
    }
}
