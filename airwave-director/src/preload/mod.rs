//! Preload / cache manager
//!
//! Materializes block assets ahead of the cursor so the execution engine
//! can start each block without network or synthesis latency.
//!
//! - [`PreloadManager::is_ready`] / [`PreloadManager::is_playable`]: readiness predicates
//! - `worker`: the periodic prefetch over `[cursor, cursor + preload_count)`
//! - `prepare`: per-block preparation (talk synthesis, music download)
//! - `url`: TTL-aware URL resolution
//!
//! Every prepare path carries the [`SessionToken`] it was started under and
//! commits only through the token-checked methods of [`MediaCache`].

mod prepare;
mod url;
mod worker;

pub(crate) use prepare::voice_options;

use crate::cache::{BlockKey, MediaCache};
use crate::providers::{MediaDownloader, MediaProvider, SpeechSynthesizer};
use crate::state::{SessionToken, SharedState};
use airwave_common::config::DirectorConfig;
use airwave_common::{Block, Timeline};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

pub struct PreloadManager {
    config: Arc<DirectorConfig>,
    state: Arc<SharedState>,
    cache: Arc<MediaCache>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    media: Arc<dyn MediaProvider>,
    downloader: Arc<dyn MediaDownloader>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Prepare tasks spawned by the worker
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PreloadManager {
    pub fn new(
        config: Arc<DirectorConfig>,
        state: Arc<SharedState>,
        cache: Arc<MediaCache>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        media: Arc<dyn MediaProvider>,
        downloader: Arc<dyn MediaDownloader>,
    ) -> Self {
        Self {
            config,
            state,
            cache,
            synthesizer,
            media,
            downloader,
            worker: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn cache(&self) -> &Arc<MediaCache> {
        &self.cache
    }

    // ------------------------------------------------------------------
    // Readiness
    // ------------------------------------------------------------------

    /// All assets of `block` are in cache
    pub fn is_ready(&self, timeline_id: &str, block: &Block) -> bool {
        self.cache
            .is_ready(&BlockKey::new(timeline_id, &block.id), &block.kind)
    }

    /// Ready, or preparation failed and the executor should use its fallbacks
    pub fn is_playable(&self, timeline_id: &str, block: &Block) -> bool {
        self.cache
            .is_playable(&BlockKey::new(timeline_id, &block.id), &block.kind)
    }

    /// Poll block 0 of `timeline` until ready, bounded by `timeout`
    ///
    /// Returns whether the block became playable; the caller proceeds either way.
    pub async fn wait_for_first_block(&self, token: &SessionToken, timeline: &Timeline, timeout: Duration) -> bool {
        let Some(first) = timeline.blocks.first() else {
            return true;
        };
        let deadline = Instant::now() + timeout;
        let poll = self.config.playback.poll_interval();

        loop {
            if self.is_playable(&timeline.id, first) {
                return true;
            }
            if !token.is_current() || Instant::now() >= deadline {
                warn!("First block {} not ready after {:?}, proceeding", first.id, timeout);
                return false;
            }
            tokio::time::sleep(poll).await;
        }
    }

    // ------------------------------------------------------------------
    // Prefetch
    // ------------------------------------------------------------------

    /// Spawn prepare tasks for the window starting at `from`
    ///
    /// Blocks that are ready, failed or already in progress are left alone.
    pub fn prefetch_window(self: &Arc<Self>, token: &SessionToken, timeline: &Arc<Timeline>, from: usize) {
        if !token.is_current() {
            return;
        }
        let end = from.saturating_add(self.config.preload.preload_count).min(timeline.len());
        if from >= end {
            return;
        }

        let mut tasks = self.tasks.lock();
        tasks.retain(|handle| !handle.is_finished());

        for index in from..end {
            let block = &timeline.blocks[index];
            let key = BlockKey::new(&timeline.id, &block.id);
            if self.cache.is_playable(&key, &block.kind) || !self.cache.try_begin(&key) {
                continue;
            }

            debug!("Prefetching block {} ({})", index, block.kind.name());
            let manager = Arc::clone(self);
            let token = token.clone();
            let timeline = Arc::clone(timeline);
            tasks.push(tokio::spawn(async move {
                let block = &timeline.blocks[index];
                manager.prepare_block(&token, &timeline.id, block).await;
                manager.cache.finish(&key);
            }));
        }
    }

    /// Prepare the first `count` blocks of `timeline` and wait for them
    ///
    /// Runs at most `max_concurrent_prepares` preparations at once.
    pub async fn prefetch_blocks(&self, token: &SessionToken, timeline: &Timeline, count: usize) {
        let concurrency = self.config.preload.max_concurrent_prepares.max(1);
        // Futures are built up front (they stay lazy) to work around a rustc
        // higher-ranked lifetime inference limitation with `Stream::map`.
        let prepares: Vec<_> = timeline
            .blocks
            .iter()
            .take(count)
            .map(|block| async move {
                let key = BlockKey::new(&timeline.id, &block.id);
                if self.cache.is_playable(&key, &block.kind) || !self.cache.try_begin(&key) {
                    return;
                }
                self.prepare_block(token, &timeline.id, block).await;
                self.cache.finish(&key);
            })
            .collect();
        stream::iter(prepares)
            .buffer_unordered(concurrency)
            .collect::<Vec<()>>()
            .await;
    }

    /// Abort the worker and every outstanding prepare task
    pub fn cancel_all(&self) {
        self.stop_worker();
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}
