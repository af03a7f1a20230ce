//! Scheduler lifecycle and outer loop

use super::next_timeline::NextTimelineTask;
use crate::cache::MediaCache;
use crate::controller::PlaybackController;
use crate::engine::{ExecutionEngine, RunOutcome};
use crate::error::{Error, Result};
use crate::preload::PreloadManager;
use crate::providers::{GenerateRequest, Providers};
use crate::state::{ExecutionContext, SessionToken, SharedState};
use airwave_common::config::DirectorConfig;
use airwave_common::events::DirectorPhase;
use airwave_common::Timeline;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Top-level show director
///
/// Owns every piece of show state; collaborators get handles, never globals.
pub struct ShowScheduler {
    pub(super) config: Arc<DirectorConfig>,
    pub(super) state: Arc<SharedState>,
    pub(super) cache: Arc<MediaCache>,
    pub(super) preload: Arc<PreloadManager>,
    engine: ExecutionEngine,
    controller: PlaybackController,
    pub(super) providers: Providers,
    loop_task: Mutex<Option<JoinHandle<()>>>,
    pub(super) next_task: Mutex<Option<NextTimelineTask>>,
}

impl ShowScheduler {
    pub fn new(config: DirectorConfig, providers: Providers) -> Arc<Self> {
        let config = Arc::new(config);
        let state = Arc::new(SharedState::new());
        let cache = Arc::new(MediaCache::new());
        let preload = Arc::new(PreloadManager::new(
            Arc::clone(&config),
            Arc::clone(&state),
            Arc::clone(&cache),
            Arc::clone(&providers.synthesizer),
            Arc::clone(&providers.media),
            Arc::clone(&providers.downloader),
        ));
        let engine = ExecutionEngine::new(
            Arc::clone(&config),
            Arc::clone(&state),
            Arc::clone(&preload),
            Arc::clone(&providers.synthesizer),
            Arc::clone(&providers.output),
            providers.snapshots.clone(),
        );
        let controller = PlaybackController::new(Arc::clone(&state), Arc::clone(&providers.output));

        Arc::new(Self {
            config,
            state,
            cache,
            preload,
            engine,
            controller,
            providers,
            loop_task: Mutex::new(None),
            next_task: Mutex::new(None),
        })
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn cache(&self) -> &Arc<MediaCache> {
        &self.cache
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn config(&self) -> &DirectorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start a new show session
    pub fn start(self: &Arc<Self>) -> Result<u64> {
        if self.state.is_running() {
            return Err(Error::InvalidState("show is already running".to_string()));
        }

        let token = self.state.begin_session();
        self.preload.start_worker(token.clone());

        let scheduler = Arc::clone(self);
        let loop_token = token.clone();
        let handle = tokio::spawn(async move { scheduler.run_loop(loop_token).await });
        *self.loop_task.lock() = Some(handle);

        info!("Show started (session {})", token.id());
        Ok(token.id())
    }

    /// Stop the show and reset all session state; false if it was not running
    pub fn stop(&self) -> bool {
        if !self.state.is_running() {
            return false;
        }

        self.state.end_session();
        self.preload.cancel_all();
        if let Some(task) = self.next_task.lock().take() {
            task.abort();
        }
        self.providers.output.stop_all();
        self.providers.synthesizer.abort_all();
        self.cache.clear();

        info!("Show stopped");
        true
    }

    /// Wait for the outer loop to exit (after `stop`)
    pub async fn join(&self) {
        let handle = self.loop_task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Scheduler loop ended abnormally: {}", e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Outer loop
    // ------------------------------------------------------------------

    async fn run_loop(self: Arc<Self>, token: SessionToken) {
        let mut first_run = true;

        while token.is_current() {
            let result = self.iteration(&token, first_run).await;
            first_run = false;

            match result {
                Ok(()) => {}
                Err(Error::SessionExpired(_)) => break,
                Err(e) => {
                    if !token.is_current() {
                        break;
                    }
                    error!("Scheduler iteration failed: {}", e);
                    self.state.report_error(e.to_string(), None);
                    self.state.set_phase(DirectorPhase::Recovering);
                    self.backoff(&token).await;
                }
            }
        }

        debug!("Scheduler loop for session {} exited", token.id());
    }

    /// Obtain one timeline and play it through
    async fn iteration(self: &Arc<Self>, token: &SessionToken, first_run: bool) -> Result<()> {
        let context = if first_run {
            self.first_run(token).await?
        } else if let Some(next) = self.state.take_ready_pending() {
            self.promote(token, next).await?
        } else {
            self.regenerate(token).await?
        };

        self.state.set_phase(DirectorPhase::Playing);
        self.spawn_next_timeline(token, context.timeline());

        match self.engine.run(token, context).await {
            RunOutcome::Stopped => return Err(Error::SessionExpired(token.id())),
            RunOutcome::Completed => {}
        }

        self.state.set_phase(DirectorPhase::Transitioning);
        self.settle_next_timeline(token).await;
        token.ensure_current()
    }

    /// Use the double-buffered timeline
    async fn promote(&self, token: &SessionToken, next: Arc<Timeline>) -> Result<Arc<ExecutionContext>> {
        info!("Promoting pre-fetched timeline '{}'", next.title);
        self.state.set_phase(DirectorPhase::Transitioning);

        self.providers.output.stop_all();
        if let Some(outgoing) = self.state.active_timeline() {
            self.cache.purge_talk_audio(&outgoing.id);
        }
        self.play_transition_cue(token).await?;
        self.install(token, next)
    }

    /// Slow path: filler narration while a fresh timeline is generated
    async fn regenerate(&self, token: &SessionToken) -> Result<Arc<ExecutionContext>> {
        info!("No pre-fetched timeline ready, regenerating");
        self.state.set_phase(DirectorPhase::Generating);

        if let Some(outgoing) = self.state.active_timeline() {
            self.cache.purge_talk_audio(&outgoing.id);
        }
        let (_, timeline) = tokio::join!(self.play_filler(token), self.request_timeline(token));
        self.install(token, timeline?)
    }

    /// Make `timeline` live, prune the cache to {active, pending}, prefetch its head
    pub(super) fn install(&self, token: &SessionToken, timeline: Arc<Timeline>) -> Result<Arc<ExecutionContext>> {
        let context = self
            .state
            .install_timeline(Arc::clone(&timeline), token)
            .ok_or(Error::SessionExpired(token.id()))?;

        match self.state.pending_timeline() {
            Some(pending) => self.cache.retain_referenced(&[&timeline, &pending]),
            None => self.cache.retain_referenced(&[&timeline]),
        }
        self.preload.prefetch_window(token, &timeline, 0);

        info!("Installed timeline '{}' ({} blocks)", timeline.title, timeline.len());
        Ok(context)
    }

    /// Ask the generator for a timeline and check it is playable
    pub(super) async fn request_timeline(&self, token: &SessionToken) -> Result<Arc<Timeline>> {
        let user_request = self.state.take_user_request();
        let request = GenerateRequest {
            duration_sec: self.config.show.target_duration_sec,
            theme: self.config.show.theme.clone(),
            user_request: user_request.clone(),
        };

        let started = Instant::now();
        let result = self.providers.generator.generate(request).await;
        token.ensure_current()?;

        let mut timeline = match result.and_then(|timeline| {
            if timeline.is_empty() {
                return Err(Error::Generation(format!(
                    "{} returned a timeline without blocks",
                    self.providers.generator.name()
                )));
            }
            timeline
                .validate()
                .map_err(|e| Error::InvalidTimeline(e.to_string()))?;
            Ok(timeline)
        }) {
            Ok(timeline) => timeline,
            Err(e) => {
                // Keep the listener request for the next attempt
                if let Some(user_request) = user_request {
                    self.state.set_user_request(user_request);
                }
                return Err(e);
            }
        };

        // Cache keys are scoped by timeline id; each airing is its own episode
        timeline.id = Uuid::new_v4().to_string();

        info!(
            "Generated '{}' ({} blocks) in {:?}",
            timeline.title,
            timeline.len(),
            started.elapsed()
        );
        Ok(Arc::new(timeline))
    }

    /// Wait out the error backoff, returning early on stop
    async fn backoff(&self, token: &SessionToken) {
        let deadline = Instant::now() + self.config.playback.error_backoff();
        let poll = self.config.playback.poll_interval();
        while token.is_current() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(poll.min(deadline - now)).await;
        }
    }
}

impl Drop for ShowScheduler {
    fn drop(&mut self) {
        self.preload.cancel_all();
        if let Some(task) = self.next_task.get_mut().take() {
            task.abort();
        }
    }
}
