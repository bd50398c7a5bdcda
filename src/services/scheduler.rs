//! Piece Scheduler: translates playback intent into file-selection and
//! swarm-prioritization calls against the session facade.
//!
//! Grounded on the `PiecePriority`/`StreamingPattern` shape used for
//! streaming prioritization elsewhere in this corpus, adapted to call
//! straight through to `SessionFacade` instead of a separate piece manager.

use std::collections::HashSet;
use std::sync::Arc;

use librqbit::ManagedTorrent;

use crate::error::Result;
use crate::services::registry::FileEntry;
use crate::services::session::SessionFacade;

pub struct PieceScheduler<'a> {
    session: &'a SessionFacade,
}

impl<'a> PieceScheduler<'a> {
    pub fn new(session: &'a SessionFacade) -> Self {
        Self { session }
    }

    /// Restrict downloads to the chosen video file and bias the swarm
    /// toward its first `warm_cache_size_mb` megabytes.
    pub async fn begin_warm_cache(
        &self,
        handle: &Arc<ManagedTorrent>,
        video_file: &FileEntry,
        warm_cache_size_mb: u64,
    ) -> Result<()> {
        let mut included = HashSet::new();
        included.insert(video_file.index);
        self.session.set_file_priorities(handle, included).await?;

        let warm_bytes = warm_cache_size_mb.saturating_mul(1024 * 1024);
        let span = warm_bytes.min(video_file.size);
        // Touch the head of the file in coarse strides so the swarm sees
        // sustained demand across the whole warm region, not just byte 0.
        const STRIDE: u64 = 512 * 1024;
        let mut offset = 0u64;
        while offset < span {
            self.session
                .prioritize_byte_offset(handle, video_file.index, offset)
                .await?;
            offset += STRIDE;
        }

        Ok(())
    }

    /// Bias the swarm toward the byte range about to be read, whether for
    /// HLS (transmuxer reading from the start) or a direct range request.
    pub async fn prioritize_for_streaming(
        &self,
        handle: &Arc<ManagedTorrent>,
        video_file: &FileEntry,
        byte_offset: u64,
    ) -> Result<()> {
        self.session
            .prioritize_byte_offset(handle, video_file.index, byte_offset)
            .await
    }

    /// Restore uniform file priorities once a transmuxer is reaped.
    pub async fn reset(&self, handle: &Arc<ManagedTorrent>, files: &[FileEntry]) -> Result<()> {
        let all: HashSet<usize> = files.iter().map(|f| f.index).collect();
        self.session.set_file_priorities(handle, all).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warm_cache_span_clamped_to_file_size() {
        let file = FileEntry {
            index: 0,
            relative_path: "a.mkv".into(),
            size: 10 * 1024 * 1024,
            is_video: true,
            offset_in_torrent: 0,
        };
        let warm_bytes: u64 = 50u64.saturating_mul(1024 * 1024);
        let span = warm_bytes.min(file.size);
        assert_eq!(span, file.size);
    }
}
