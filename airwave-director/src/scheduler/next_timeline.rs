//! Double-buffering of the next timeline
//!
//! Once roughly half of the live timeline has played (never earlier than
//! the configured floor) a background task requests the next timeline,
//! parks it in the pending slot, prepares the first share of its blocks and
//! only then marks it ready. Every step re-checks the session. The task
//! never promotes its timeline; the outer loop does.

use super::core::ShowScheduler;
use crate::error::Error;
use crate::state::SessionToken;
use airwave_common::Timeline;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub(crate) struct NextTimelineTask {
    handle: JoinHandle<()>,
    /// Set once the start delay elapsed and generation began
    generating: Arc<AtomicBool>,
}

impl NextTimelineTask {
    pub(crate) fn abort(&self) {
        self.handle.abort();
    }
}

impl ShowScheduler {
    /// Delay before the next timeline is requested while `current` plays
    pub(super) fn next_timeline_delay(&self, current: &Timeline) -> Duration {
        (current.estimated_duration() / 2).max(self.config.preload.next_timeline_min_delay())
    }

    pub(super) fn spawn_next_timeline(self: &Arc<Self>, token: &SessionToken, current: &Timeline) {
        let delay = self.next_timeline_delay(current);
        let generating = Arc::new(AtomicBool::new(false));
        debug!("Next timeline will be requested in {:?}", delay);

        let scheduler = Arc::clone(self);
        let token = token.clone();
        let flag = Arc::clone(&generating);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !token.is_current() {
                return;
            }
            flag.store(true, Ordering::SeqCst);
            scheduler.prepare_next_timeline(&token).await;
        });

        let previous = self
            .next_task
            .lock()
            .replace(NextTimelineTask { handle, generating });
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    async fn prepare_next_timeline(&self, token: &SessionToken) {
        let next = match self.request_timeline(token).await {
            Ok(next) => next,
            Err(Error::SessionExpired(_)) => return,
            Err(e) => {
                warn!("Next timeline generation failed, will regenerate at the end: {}", e);
                return;
            }
        };

        if !self.state.set_pending(Arc::clone(&next), token) {
            return;
        }
        self.cache.reference(&next);

        let ratio = self.config.preload.next_prefetch_ratio;
        let count = ((next.len() as f32 * ratio).ceil() as usize).clamp(1, next.len());
        self.preload.prefetch_blocks(token, &next, count).await;

        if self.state.mark_pending_ready(&next.id, token) {
            info!("Next timeline '{}' ready ({} of {} blocks prepared)", next.title, count, next.len());
        }
    }

    /// Resolve the background task when the live timeline ends
    ///
    /// Not yet generating: abort it. Mid-generation or mid-prefetch: cover the
    /// wait with filler narration and let it finish.
    pub(super) async fn settle_next_timeline(&self, token: &SessionToken) {
        let Some(task) = self.next_task.lock().take() else {
            return;
        };
        if task.handle.is_finished() {
            return;
        }
        if !task.generating.load(Ordering::SeqCst) {
            debug!("Next timeline task had not started, cancelling");
            task.handle.abort();
            return;
        }

        info!("Next timeline still in preparation, playing filler");
        let (_, joined) = tokio::join!(self.play_filler(token), task.handle);
        if let Err(e) = joined {
            if !e.is_cancelled() {
                warn!("Next timeline task failed: {}", e);
            }
        }
    }
}
