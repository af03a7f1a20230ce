//! Core execution loop
//!
//! **Responsibilities:**
//! - ExecutionEngine struct definition
//! - The block loop over one ExecutionContext (stop, skip, pause checks)
//! - Bounded readiness wait with force-advance on timeout
//! - Block lifecycle events and best-effort snapshots

use crate::preload::PreloadManager;
use crate::providers::{AudioOutput, SessionSnapshot, SnapshotSink, SpeechSynthesizer};
use crate::state::{ExecutionContext, SessionToken, SharedState};
use airwave_common::config::DirectorConfig;
use airwave_common::events::DirectorEvent;
use airwave_common::{Block, BlockKind};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Why a block stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Interrupt {
    Stop,
    Skip,
}

pub(super) type Step<T = ()> = std::result::Result<T, Interrupt>;

/// How a timeline run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Cursor reached the end of the timeline
    Completed,
    /// Session ended mid-run
    Stopped,
}

/// Result of waiting for a block's assets
enum Readiness {
    Playable,
    TimedOut,
    Interrupted,
}

/// Walks the live timeline and drives the audio output
pub struct ExecutionEngine {
    pub(super) config: Arc<DirectorConfig>,
    pub(super) state: Arc<SharedState>,
    pub(super) preload: Arc<PreloadManager>,
    pub(super) synthesizer: Arc<dyn SpeechSynthesizer>,
    pub(super) output: Arc<dyn AudioOutput>,
    snapshots: Option<Arc<dyn SnapshotSink>>,
    /// Fade-in still ramping the music channel up
    pub(super) music_ramp: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutionEngine {
    pub fn new(
        config: Arc<DirectorConfig>,
        state: Arc<SharedState>,
        preload: Arc<PreloadManager>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        output: Arc<dyn AudioOutput>,
        snapshots: Option<Arc<dyn SnapshotSink>>,
    ) -> Self {
        Self {
            config,
            state,
            preload,
            synthesizer,
            output,
            snapshots,
            music_ramp: Mutex::new(None),
        }
    }

    /// Play `context` from its cursor to the end
    ///
    /// Returns early with [`RunOutcome::Stopped`] as soon as `token` goes stale.
    pub async fn run(&self, token: &SessionToken, context: Arc<ExecutionContext>) -> RunOutcome {
        let timeline = Arc::clone(context.timeline());
        info!(
            "Executing timeline '{}' ({} blocks) from {}",
            timeline.title,
            timeline.len(),
            context.cursor()
        );

        loop {
            if !token.is_current() {
                return RunOutcome::Stopped;
            }

            // Skip preempts pause
            if let Some(target) = self.state.take_skip() {
                if target < timeline.len() {
                    debug!("Skip: {} -> {}", context.cursor(), target);
                    context.set_cursor(target);
                    self.preload.prefetch_window(token, &timeline, target);
                } else {
                    warn!("Ignoring skip to {} (timeline has {} blocks)", target, timeline.len());
                }
                continue;
            }

            if self.state.is_paused() {
                tokio::time::sleep(self.poll_interval()).await;
                continue;
            }

            let index = context.cursor();
            if index >= timeline.len() {
                break;
            }
            let block = &timeline.blocks[index];

            match self.wait_until_playable(token, &timeline.id, index, block).await {
                Readiness::Playable => {}
                Readiness::Interrupted => continue,
                Readiness::TimedOut => {
                    let message = format!(
                        "Block {} ({}) not ready after {:?}, skipping",
                        index,
                        block.kind.name(),
                        self.config.preload.block_ready_timeout()
                    );
                    warn!("{}", message);
                    self.state.report_error(message, Some(block.id.clone()));
                    context.advance();
                    continue;
                }
            }

            self.state.emit(DirectorEvent::BlockStarted {
                timeline_id: timeline.id.clone(),
                block_id: block.id.clone(),
                index,
                kind: block.kind.name().to_string(),
                timestamp: chrono::Utc::now(),
            });
            debug!("Block {} started: {}", index, block.id);

            match self.execute_block(token, &context, block).await {
                Ok(()) => {
                    if !token.is_current() {
                        self.cancel_music_ramp();
                        return RunOutcome::Stopped;
                    }
                    self.complete_block(&context, index, block);
                }
                Err(Interrupt::Skip) => {
                    debug!("Block {} preempted by skip", index);
                    self.cancel_music_ramp();
                }
                Err(Interrupt::Stop) => {
                    self.cancel_music_ramp();
                    return RunOutcome::Stopped;
                }
            }
        }

        info!("Timeline '{}' completed", timeline.title);
        self.state.emit(DirectorEvent::ShowCompleted {
            timeline_id: timeline.id.clone(),
            timestamp: chrono::Utc::now(),
        });
        RunOutcome::Completed
    }

    fn complete_block(&self, context: &Arc<ExecutionContext>, index: usize, block: &Block) {
        context.advance();
        self.state.emit(DirectorEvent::BlockCompleted {
            timeline_id: context.timeline().id.clone(),
            block_id: block.id.clone(),
            index,
            timestamp: chrono::Utc::now(),
        });

        if let Some(sink) = &self.snapshots {
            let sink = Arc::clone(sink);
            let snapshot = SessionSnapshot {
                timeline_id: context.timeline().id.clone(),
                cursor: context.cursor(),
                position_ms: context.position_ms(),
                saved_at: chrono::Utc::now(),
            };
            tokio::spawn(async move {
                if let Err(e) = sink.save_snapshot(snapshot).await {
                    warn!("Failed to save session snapshot: {}", e);
                }
            });
        }
    }

    async fn execute_block(&self, token: &SessionToken, context: &ExecutionContext, block: &Block) -> Step {
        match &block.kind {
            BlockKind::Talk(talk) => self.execute_talk(token, &context.timeline().id, block, talk).await,
            BlockKind::Music(music) => self.execute_music(token, block, music).await,
            BlockKind::MusicControl(control) => self.execute_control(token, control).await,
            BlockKind::Silence(silence) => {
                self.sleep_playing(token, Duration::from_millis(silence.duration_ms))
                    .await
            }
        }
    }

    /// Wait up to the block timeout for `block` to become playable
    ///
    /// Paused time does not count against the timeout.
    async fn wait_until_playable(&self, token: &SessionToken, timeline_id: &str, index: usize, block: &Block) -> Readiness {
        if self.preload.is_playable(timeline_id, block) {
            return Readiness::Playable;
        }

        if let Some(context) = self.state.context() {
            self.preload.prefetch_window(token, context.timeline(), index);
        }

        let timeout = self.config.preload.block_ready_timeout();
        let poll = self.poll_interval();
        let mut waited = Duration::ZERO;
        debug!("Waiting for block {} to become ready", index);

        loop {
            if self.check(token).is_err() {
                return Readiness::Interrupted;
            }
            if self.preload.is_playable(timeline_id, block) {
                return Readiness::Playable;
            }
            if waited >= timeout {
                return Readiness::TimedOut;
            }
            tokio::time::sleep(poll).await;
            if !self.state.is_paused() {
                waited += poll;
            }
        }
    }

    // ------------------------------------------------------------------
    // Interrupt-aware helpers shared by the executors
    // ------------------------------------------------------------------

    /// Abort a fade-in left running by an earlier music block
    pub(super) fn cancel_music_ramp(&self) {
        if let Some(ramp) = self.music_ramp.lock().take() {
            ramp.abort();
        }
    }

    pub(super) fn poll_interval(&self) -> Duration {
        self.config.playback.poll_interval()
    }

    /// Stop or skip pending?
    pub(super) fn check(&self, token: &SessionToken) -> Step {
        if !token.is_current() {
            Err(Interrupt::Stop)
        } else if self.state.pending_skip().is_some() {
            Err(Interrupt::Skip)
        } else {
            Ok(())
        }
    }

    /// Block while paused, still reacting to stop and skip
    pub(super) async fn wait_while_paused(&self, token: &SessionToken) -> Step {
        while self.state.is_paused() {
            self.check(token)?;
            tokio::time::sleep(self.poll_interval()).await;
        }
        self.check(token)
    }

    /// Sleep for `duration` of unpaused time
    pub(super) async fn sleep_playing(&self, token: &SessionToken, duration: Duration) -> Step {
        let poll = self.poll_interval();
        let mut remaining = duration;
        while !remaining.is_zero() {
            self.check(token)?;
            let step = remaining.min(poll);
            tokio::time::sleep(step).await;
            if !self.state.is_paused() {
                remaining = remaining.saturating_sub(step);
            }
        }
        self.check(token)
    }

    /// Drive `fut` to completion unless stop or skip arrives first
    pub(super) async fn until_interrupted<F: Future>(&self, token: &SessionToken, fut: F) -> Step<F::Output> {
        tokio::pin!(fut);
        let poll = self.poll_interval();
        loop {
            tokio::select! {
                output = &mut fut => return Ok(output),
                _ = tokio::time::sleep(poll) => self.check(token)?,
            }
        }
    }
}
