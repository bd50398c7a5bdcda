//! Transmuxer Supervisor: spawns, watches and reaps the external encoder
//! process that repackages a torrent's video file into an HLS playlist.
//!
//! Grounded on the ffmpeg argv, poll timeouts and stderr-diagnostics shape
//! of the original streaming endpoint this service replaces, and on the
//! `HlsManager` idempotent-start/path-safety pattern used for a comparable
//! on-demand HLS transcode elsewhere in this corpus.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::error::{AppError, Result};

const STDERR_RING_CAPACITY: usize = 20;
const PLAYLIST_FILENAME: &str = "stream.m3u8";

/// A running (or just-exited) transmuxer process for one torrent.
pub struct TransmuxerProcess {
    hls_dir: PathBuf,
    child: Mutex<Option<Child>>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
}

impl TransmuxerProcess {
    pub fn playlist_path(&self) -> PathBuf {
        self.hls_dir.join(PLAYLIST_FILENAME)
    }

    pub fn hls_dir(&self) -> &Path {
        &self.hls_dir
    }

    /// Validate a requested segment name and resolve it inside the HLS
    /// directory. Rejects path separators and `..` components outright.
    pub fn segment_path(&self, segment: &str) -> Option<PathBuf> {
        if segment.is_empty()
            || segment.contains('/')
            || segment.contains('\\')
            || segment.contains("..")
        {
            return None;
        }
        Some(self.hls_dir.join(segment))
    }

    async fn stderr_snapshot(&self) -> Vec<String> {
        self.stderr_tail.lock().await.iter().cloned().collect()
    }

    /// Wait briefly for the process to exit on its own, then force-kill it,
    /// and delete the HLS directory either way.
    pub async fn reap(&self) {
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            let graceful = tokio::time::timeout(Duration::from_secs(5), child.wait()).await;
            if graceful.is_err() {
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }
        drop(guard);

        let _ = tokio::fs::remove_dir_all(&self.hls_dir).await;
    }
}

/// Spawns and idempotently tracks at most one transmuxer per torrent.
pub struct TransmuxerSupervisor {
    encoder_bin: String,
    playlist_timeout: Duration,
    source_file_timeout: Duration,
}

impl TransmuxerSupervisor {
    pub fn new(encoder_bin: String, playlist_timeout: Duration, source_file_timeout: Duration) -> Self {
        Self {
            encoder_bin,
            playlist_timeout,
            source_file_timeout,
        }
    }

    /// Wait for `source_path` to exist on disk, up to the configured
    /// timeout. Returns `SourceFileTimeout` otherwise.
    pub async fn wait_for_source_file(&self, source_path: &Path) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.source_file_timeout;
        loop {
            if tokio::fs::metadata(source_path).await.is_ok() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AppError::SourceFileTimeout);
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Spawn the fixed ffmpeg argv and wait for the playlist to appear.
    pub async fn spawn(&self, source_path: &Path, hls_dir: &Path) -> Result<Arc<TransmuxerProcess>> {
        tokio::fs::create_dir_all(hls_dir).await.map_err(|e| {
            AppError::Internal(format!("failed to create hls directory {:?}: {}", hls_dir, e))
        })?;

        let segment_pattern = hls_dir.join("segment%03d.ts");
        let playlist_path = hls_dir.join(PLAYLIST_FILENAME);

        let mut command = Command::new(&self.encoder_bin);
        command
            .arg("-i")
            .arg(source_path)
            .args(["-c:a", "aac", "-c:v", "copy"])
            .args(["-f", "hls"])
            .args(["-hls_time", "10"])
            .args(["-hls_list_size", "0"])
            .arg("-hls_segment_filename")
            .arg(&segment_pattern)
            .arg(&playlist_path)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped());

        tracing::info!(?source_path, ?hls_dir, "starting transmuxer");

        let mut child = command
            .spawn()
            .map_err(|e| AppError::TransmuxFailed(format!("failed to spawn encoder: {}", e)))?;

        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_RING_CAPACITY)));
        if let Some(stderr) = child.stderr.take() {
            let tail = Arc::clone(&stderr_tail);
            tokio::spawn(async move {
                let mut lines = tokio::io::BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(encoder_stderr = %line);
                    let mut tail = tail.lock().await;
                    if tail.len() == STDERR_RING_CAPACITY {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            });
        }

        let process = Arc::new(TransmuxerProcess {
            hls_dir: hls_dir.to_path_buf(),
            child: Mutex::new(Some(child)),
            stderr_tail,
        });

        self.wait_for_playlist(&process).await?;

        Ok(process)
    }

    async fn wait_for_playlist(&self, process: &TransmuxerProcess) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.playlist_timeout;
        let playlist_path = process.playlist_path();

        loop {
            if tokio::fs::metadata(&playlist_path).await.is_ok() {
                return Ok(());
            }

            let exited = {
                let mut guard = process.child.lock().await;
                match guard.as_mut() {
                    Some(child) => child.try_wait().ok().flatten(),
                    None => None,
                }
            };

            if let Some(status) = exited {
                if !status.success() {
                    let tail = process.stderr_snapshot().await;
                    return Err(AppError::TransmuxFailed(tail.join("\n")));
                }
            }

            if tokio::time::Instant::now() >= deadline {
                process.reap().await;
                return Err(AppError::TransmuxFailed(
                    "timed out waiting for playlist creation".to_string(),
                ));
            }

            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_segment_path_rejects_traversal() {
        let process = TransmuxerProcess {
            hls_dir: PathBuf::from("/tmp/gateway-hls/abc"),
            child: Mutex::new(None),
            stderr_tail: Arc::new(Mutex::new(VecDeque::new())),
        };

        assert!(process.segment_path("../../etc/passwd").is_none());
        assert!(process.segment_path("seg/ment000.ts").is_none());
        assert!(process.segment_path("segment000.ts").is_some());
    }

    #[tokio::test]
    async fn test_wait_for_source_file_times_out() {
        let supervisor = TransmuxerSupervisor::new(
            "ffmpeg".to_string(),
            Duration::from_secs(1),
            Duration::from_millis(50),
        );
        let result = supervisor
            .wait_for_source_file(Path::new("/tmp/definitely-not-there-12345.mkv"))
            .await;
        assert!(matches!(result, Err(AppError::SourceFileTimeout)));
    }
}
