//! Stream Reader: serves HLS playlist/segment requests and direct
//! byte-range reads over a file that may still be partially downloaded.
//!
//! Grounded on the original playlist/segment endpoints this service
//! replaces for the HLS surface, and on `librqbit`'s own range-serving
//! handler for the `Content-Range`/206 conventions of the direct surface
//! (generalized here to the full `bytes=S-E` grammar plus unbounded
//! short-read retry, which that handler does not implement).

use std::ops::Range;
use std::path::Path;
use std::time::Duration;

use axum::body::{Body, Bytes};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{AppError, Result};
use crate::services::session::SessionFacade;

const READ_CHUNK: usize = 1024 * 1024;

/// Extensions the direct stream surface serves as-is rather than remuxing.
const NATIVE_MP4_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov"];

pub fn needs_remux(relative_path: &str) -> bool {
    let lower = relative_path.to_ascii_lowercase();
    !NATIVE_MP4_EXTENSIONS.iter().any(|ext| lower.ends_with(&format!(".{ext}")))
}

/// Remux a container ffmpeg can't play back natively in the browser into
/// fragmented MP4, streaming the result straight from the encoder's stdout.
/// The spawned process is killed when the returned body is dropped, which
/// happens when the client disconnects mid-stream.
pub fn remux_to_mp4_stream(encoder_bin: &str, source_path: &Path) -> Result<Body> {
    let mut command = tokio::process::Command::new(encoder_bin);
    command
        .arg("-i")
        .arg(source_path)
        .args(["-movflags", "frag_keyframe+empty_moov"])
        .args(["-f", "mp4"])
        .args(["-vcodec", "copy"])
        .args(["-acodec", "aac", "-b:a", "192k"])
        .arg("pipe:1")
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| AppError::TransmuxFailed(format!("failed to spawn remux encoder: {}", e)))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::TransmuxFailed("encoder produced no stdout pipe".to_string()))?;

    // `child` rides along inside the stream so that dropping the response
    // body (client disconnect) drops the child too, which `kill_on_drop`
    // turns into a kill rather than an orphaned encoder.
    let reader_stream = tokio_util::io::ReaderStream::new(stdout);
    let guarded = RemuxStream {
        inner: reader_stream,
        _child: child,
    };
    Ok(Body::from_stream(guarded))
}

struct RemuxStream {
    inner: tokio_util::io::ReaderStream<tokio::process::ChildStdout>,
    _child: tokio::process::Child,
}

impl futures::Stream for RemuxStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        let this = self.get_mut();
        std::pin::Pin::new(&mut this.inner).poll_next(cx)
    }
}

/// Parse a `Range: bytes=S-E` header value against a known file size.
/// A missing end means "to end of file". Returns `None` if the header is
/// not a `bytes=` range at all (caller should then serve the full file).
pub fn parse_range(header: &str, file_size: u64) -> Result<Option<Range<u64>>> {
    let Some(spec) = header.strip_prefix("bytes=") else {
        return Ok(None);
    };
    let (start_s, end_s) = spec.split_once('-').ok_or(AppError::RangeNotSatisfiable)?;

    let start: u64 = if start_s.is_empty() {
        0
    } else {
        start_s.parse().map_err(|_| AppError::RangeNotSatisfiable)?
    };
    let end: u64 = if end_s.is_empty() {
        file_size.saturating_sub(1)
    } else {
        end_s.parse().map_err(|_| AppError::RangeNotSatisfiable)?
    };

    if start > end || start >= file_size {
        return Err(AppError::RangeNotSatisfiable);
    }

    Ok(Some(start..end.min(file_size.saturating_sub(1)) + 1))
}

/// Stream `range` out of a torrent file, retrying on short reads (pieces
/// not yet downloaded) until the range is fully satisfied. The body is
/// produced chunk-by-chunk rather than buffered up front, so a multi-GB
/// range request doesn't hold the whole thing in memory, and the read
/// loop naturally stops the moment the client disconnects and drops the
/// response body.
pub fn stream_range(
    session: std::sync::Arc<SessionFacade>,
    handle: std::sync::Arc<librqbit::ManagedTorrent>,
    file_id: usize,
    range: Range<u64>,
    retry_delay: Duration,
) -> Result<Body> {
    let mut stream = session.open_file_stream(&handle, file_id)?;

    let body_stream = async_stream::try_stream! {
        stream
            .seek(std::io::SeekFrom::Start(range.start))
            .await
            .map_err(|e| AppError::Internal(format!("seek failed: {}", e)))?;

        let total = (range.end - range.start) as usize;
        let mut sent = 0usize;

        while sent < total {
            let want = (total - sent).min(READ_CHUNK);
            let mut chunk = vec![0u8; want];
            let n = stream
                .read(&mut chunk)
                .await
                .map_err(|e| AppError::Internal(format!("read failed: {}", e)))?;

            if n == 0 {
                tokio::time::sleep(retry_delay).await;
                continue;
            }

            chunk.truncate(n);
            sent += n;
            yield Bytes::from(chunk);
        }
    };

    Ok(Body::from_stream(
        tokio_stream::StreamExt::map(body_stream, |item: Result<Bytes>| {
            item.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_full_bounds() {
        let range = parse_range("bytes=0-1048575", 2_000_000).unwrap().unwrap();
        assert_eq!(range, 0..1048576);
    }

    #[test]
    fn test_parse_range_open_ended() {
        let range = parse_range("bytes=500-", 1000).unwrap().unwrap();
        assert_eq!(range, 500..1000);
    }

    #[test]
    fn test_parse_range_rejects_out_of_bounds() {
        let err = parse_range("bytes=5000-6000", 1000).unwrap_err();
        assert!(matches!(err, AppError::RangeNotSatisfiable));
    }

    #[test]
    fn test_parse_range_none_for_non_bytes_unit() {
        let result = parse_range("items=0-1", 1000).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_parse_range_clamps_end_to_file_size() {
        let range = parse_range("bytes=0-999999", 1000).unwrap().unwrap();
        assert_eq!(range, 0..1000);
    }
}
