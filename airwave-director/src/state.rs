//! Shared director state
//!
//! One `SharedState` is owned (behind `Arc`) by the scheduler and handed to
//! every component that observes or mutates show state: the execution
//! engine, the preload manager, the playback controller and the HTTP API.
//!
//! Locks are short-lived and never held across `.await`; flags are atomics.
//! The session id is the single cancellation primitive: every spawned task
//! captures a [`SessionToken`] and checks it before committing any effect.

use crate::error::{Error, Result};
use airwave_common::events::{DirectorEvent, DirectorPhase, EventBus};
use airwave_common::Timeline;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Default event channel capacity
const EVENT_CAPACITY: usize = 1000;

/// Capture of the session a task was started under
///
/// Cheap to clone; `is_current()` turns false as soon as the show is stopped
/// or restarted.
#[derive(Debug, Clone)]
pub struct SessionToken {
    id: u64,
    current: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
}

impl SessionToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the originating session is still the live one
    pub fn is_current(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.current.load(Ordering::SeqCst) == self.id
    }

    /// `Err(SessionExpired)` once the session is stale
    pub fn ensure_current(&self) -> Result<()> {
        if self.is_current() {
            Ok(())
        } else {
            Err(Error::SessionExpired(self.id))
        }
    }
}

/// The one live timeline and its cursor
///
/// Invariant: `0 <= cursor <= timeline.len()`.
#[derive(Debug)]
pub struct ExecutionContext {
    timeline: Arc<Timeline>,
    cursor: AtomicUsize,
    session_id: u64,
    started_at: Instant,
}

impl ExecutionContext {
    fn new(timeline: Arc<Timeline>, session_id: u64) -> Self {
        Self {
            timeline,
            cursor: AtomicUsize::new(0),
            session_id,
            started_at: Instant::now(),
        }
    }

    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.timeline
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    /// Move the cursor, clamped to `len`
    pub fn set_cursor(&self, index: usize) {
        self.cursor.store(index.min(self.len()), Ordering::SeqCst);
    }

    /// Step past the current block; returns the new cursor
    pub fn advance(&self) -> usize {
        let next = (self.cursor() + 1).min(self.len());
        self.cursor.store(next, Ordering::SeqCst);
        next
    }

    pub fn is_finished(&self) -> bool {
        self.cursor() >= self.len()
    }

    /// Time since the context was installed
    pub fn position_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

/// Double-buffer slot for the next timeline
#[derive(Debug, Default)]
struct PendingSlot {
    timeline: Option<Arc<Timeline>>,
    /// Set only after the initial prefetch of `timeline` finished
    ready: bool,
}

/// Observable status snapshot
#[derive(Debug, Clone, serde::Serialize)]
pub struct DirectorStatus {
    pub running: bool,
    pub session_id: u64,
    pub phase: DirectorPhase,
    pub paused: bool,
    pub timeline_id: Option<String>,
    pub timeline_title: Option<String>,
    pub current: usize,
    pub total: usize,
    pub next_timeline_ready: bool,
    pub last_error: Option<String>,
}

/// Shared state accessible by all components
pub struct SharedState {
    running: Arc<AtomicBool>,
    session: Arc<AtomicU64>,
    paused: AtomicBool,
    /// Skip flag and target index
    skip: Mutex<Option<usize>>,
    context: RwLock<Option<Arc<ExecutionContext>>>,
    pending: Mutex<PendingSlot>,
    /// Listener request consumed by the next generation
    user_request: Mutex<Option<String>>,
    phase: RwLock<DirectorPhase>,
    last_error: Mutex<Option<String>>,
    events: EventBus,
}

impl SharedState {
    /// Create new shared state with default values
    pub fn new() -> Self {
        Self::with_event_capacity(EVENT_CAPACITY)
    }

    pub fn with_event_capacity(capacity: usize) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            session: Arc::new(AtomicU64::new(0)),
            paused: AtomicBool::new(false),
            skip: Mutex::new(None),
            context: RwLock::new(None),
            pending: Mutex::new(PendingSlot::default()),
            user_request: Mutex::new(None),
            phase: RwLock::new(DirectorPhase::Idle),
            last_error: Mutex::new(None),
            events: EventBus::new(capacity),
        }
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Start a new session and return its token
    pub fn begin_session(&self) -> SessionToken {
        let id = self.session.fetch_add(1, Ordering::SeqCst) + 1;
        self.running.store(true, Ordering::SeqCst);
        info!("Session {} started", id);
        self.token_for(id)
    }

    /// End the current session and reset every piece of show state
    ///
    /// Bumps the session id so in-flight tasks of the ended session become no-ops.
    pub fn end_session(&self) {
        self.running.store(false, Ordering::SeqCst);
        let ended = self.session.fetch_add(1, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        *self.skip.lock() = None;
        *self.context.write() = None;
        *self.pending.lock() = PendingSlot::default();
        *self.last_error.lock() = None;
        self.set_phase(DirectorPhase::Idle);
        info!("Session {} ended", ended);
    }

    /// Token for the current session
    pub fn current_token(&self) -> SessionToken {
        self.token_for(self.session.load(Ordering::SeqCst))
    }

    fn token_for(&self, id: u64) -> SessionToken {
        SessionToken {
            id,
            current: Arc::clone(&self.session),
            running: Arc::clone(&self.running),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn session_id(&self) -> u64 {
        self.session.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Pause / skip flags
    // ------------------------------------------------------------------

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Set the paused flag; returns whether it changed
    pub fn set_paused(&self, paused: bool) -> bool {
        self.paused.swap(paused, Ordering::SeqCst) != paused
    }

    /// Record a skip request (target already validated by the caller)
    pub fn request_skip(&self, target: usize) {
        *self.skip.lock() = Some(target);
    }

    /// Pending skip target, without consuming it
    pub fn pending_skip(&self) -> Option<usize> {
        *self.skip.lock()
    }

    /// Consume the skip request
    pub fn take_skip(&self) -> Option<usize> {
        self.skip.lock().take()
    }

    // ------------------------------------------------------------------
    // Active timeline
    // ------------------------------------------------------------------

    /// Install `timeline` as the live execution context
    ///
    /// Returns `None` (and changes nothing) if `token` is stale.
    pub fn install_timeline(&self, timeline: Arc<Timeline>, token: &SessionToken) -> Option<Arc<ExecutionContext>> {
        let mut slot = self.context.write();
        if !token.is_current() {
            debug!("Discarding timeline {} from stale session {}", timeline.id, token.id());
            return None;
        }
        let context = Arc::new(ExecutionContext::new(Arc::clone(&timeline), token.id()));
        *slot = Some(Arc::clone(&context));
        *self.skip.lock() = None;
        drop(slot);

        self.emit(DirectorEvent::TimelineReady {
            timeline_id: timeline.id.clone(),
            title: timeline.title.clone(),
            block_count: timeline.len(),
            timestamp: chrono::Utc::now(),
        });
        Some(context)
    }

    pub fn context(&self) -> Option<Arc<ExecutionContext>> {
        self.context.read().clone()
    }

    pub fn active_timeline(&self) -> Option<Arc<Timeline>> {
        self.context.read().as_ref().map(|ctx| Arc::clone(ctx.timeline()))
    }

    /// `(current, total)` for observers; current is the cursor index
    pub fn progress(&self) -> (usize, usize) {
        match self.context.read().as_ref() {
            Some(ctx) => (ctx.cursor(), ctx.len()),
            None => (0, 0),
        }
    }

    // ------------------------------------------------------------------
    // Double buffer
    // ------------------------------------------------------------------

    /// Place `timeline` in the pending slot (not yet ready)
    pub fn set_pending(&self, timeline: Arc<Timeline>, token: &SessionToken) -> bool {
        let mut pending = self.pending.lock();
        if !token.is_current() {
            return false;
        }
        pending.timeline = Some(timeline);
        pending.ready = false;
        true
    }

    /// Flip the ready flag for the pending timeline `timeline_id`
    pub fn mark_pending_ready(&self, timeline_id: &str, token: &SessionToken) -> bool {
        let mut pending = self.pending.lock();
        if !token.is_current() {
            return false;
        }
        match &pending.timeline {
            Some(timeline) if timeline.id == timeline_id => {
                pending.ready = true;
                true
            }
            _ => false,
        }
    }

    /// Take the pending timeline if it is ready
    pub fn take_ready_pending(&self) -> Option<Arc<Timeline>> {
        let mut pending = self.pending.lock();
        if pending.ready {
            pending.ready = false;
            pending.timeline.take()
        } else {
            None
        }
    }

    pub fn pending_timeline(&self) -> Option<Arc<Timeline>> {
        self.pending.lock().timeline.clone()
    }

    pub fn is_pending_ready(&self) -> bool {
        self.pending.lock().ready
    }

    pub fn clear_pending(&self) {
        *self.pending.lock() = PendingSlot::default();
    }

    // ------------------------------------------------------------------
    // Listener requests
    // ------------------------------------------------------------------

    pub fn set_user_request(&self, request: String) {
        *self.user_request.lock() = Some(request);
    }

    pub fn take_user_request(&self) -> Option<String> {
        self.user_request.lock().take()
    }

    // ------------------------------------------------------------------
    // Status and events
    // ------------------------------------------------------------------

    pub fn phase(&self) -> DirectorPhase {
        *self.phase.read()
    }

    /// Change phase, emitting `StateChanged` when it differs
    pub fn set_phase(&self, new_phase: DirectorPhase) {
        let old_phase = std::mem::replace(&mut *self.phase.write(), new_phase);
        if old_phase != new_phase {
            debug!("Director phase: {} -> {}", old_phase, new_phase);
            self.emit(DirectorEvent::StateChanged {
                old_phase,
                new_phase,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    /// Remember and broadcast an error
    pub fn report_error(&self, message: impl Into<String>, block_id: Option<String>) {
        let message = message.into();
        *self.last_error.lock() = Some(message.clone());
        self.emit(DirectorEvent::error(message, block_id));
    }

    pub fn status(&self) -> DirectorStatus {
        let context = self.context();
        DirectorStatus {
            running: self.is_running(),
            session_id: self.session_id(),
            phase: self.phase(),
            paused: self.is_paused(),
            timeline_id: context.as_ref().map(|c| c.timeline().id.clone()),
            timeline_title: context.as_ref().map(|c| c.timeline().title.clone()),
            current: context.as_ref().map(|c| c.cursor()).unwrap_or(0),
            total: context.as_ref().map(|c| c.len()).unwrap_or(0),
            next_timeline_ready: self.is_pending_ready(),
            last_error: self.last_error.lock().clone(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Broadcast an event (no subscribers is fine)
    pub fn emit(&self, event: DirectorEvent) {
        self.events.emit_lossy(event);
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
