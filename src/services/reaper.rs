//! Reaper: periodic idle-stream sweep.
//!
//! Grounded on the plain `loop { ...; sleep().await }` spawn idiom used for
//! progress monitoring elsewhere in this corpus, rather than a cron-style
//! scheduler — a fixed-interval sweep has no need for cron expressions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::services::registry::{Registry, TorrentState};
use crate::services::scheduler::PieceScheduler;
use crate::services::session::SessionFacade;

pub struct Reaper {
    registry: Arc<Registry>,
    session: Arc<SessionFacade>,
    tick_interval: Duration,
    idle_threshold: Duration,
}

impl Reaper {
    pub fn new(
        registry: Arc<Registry>,
        session: Arc<SessionFacade>,
        tick_interval: Duration,
        idle_threshold: Duration,
    ) -> Self {
        Self {
            registry,
            session,
            tick_interval,
            idle_threshold,
        }
    }

    pub async fn run(self) {
        loop {
            tokio::time::sleep(self.tick_interval).await;
            self.sweep().await;
        }
    }

    async fn sweep(&self) {
        let now = Instant::now();
        for entry in self.registry.list_handles().await {
            let (transmuxer, handle, info_hash, files) = {
                let guard = entry.state.read().await;
                if guard.state == TorrentState::Removing {
                    continue;
                }
                match &guard.transmuxer {
                    Some(t) if now.duration_since(guard.hls_last_accessed_at) > self.idle_threshold => {
                        (
                            Some(Arc::clone(t)),
                            guard.handle.clone(),
                            guard.info_hash.clone(),
                            guard.files.clone(),
                        )
                    }
                    _ => continue,
                }
            };

            if let Some(transmuxer) = transmuxer {
                tracing::info!(info_hash = %info_hash, "reaping idle transmuxer");
                transmuxer.reap().await;

                let mut guard = entry.state.write().await;
                guard.transmuxer = None;
                guard.state = TorrentState::Idle;
                drop(guard);

                let scheduler = PieceScheduler::new(&self.session);
                if let Err(e) = scheduler.reset(&handle, &files).await {
                    tracing::warn!(info_hash = %info_hash, error = ?e, "failed to restore file priorities after reap");
                }

                if let Err(e) = self.session.pause(&handle).await {
                    tracing::warn!(info_hash = %info_hash, error = ?e, "failed to pause torrent after reap");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_threshold_comparison() {
        let threshold = Duration::from_secs(60 * 20);
        let elapsed = Duration::from_secs(60 * 21);
        assert!(elapsed > threshold);
    }
}
