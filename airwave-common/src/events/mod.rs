//! Event types for the Airwave event system
//!
//! Provides the shared [`DirectorEvent`] definitions and the [`EventBus`]
//! used to fan them out to observers (SSE clients, loggers, tests).

mod types;

pub use types::{DirectorPhase, SpokenLine};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Director event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
/// Delivery is best-effort: the director never depends on anyone consuming them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DirectorEvent {
    /// Director lifecycle phase changed
    StateChanged {
        old_phase: DirectorPhase,
        new_phase: DirectorPhase,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Listener paused or resumed playback
    PlaybackStateChanged {
        paused: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A new timeline was installed as the active one
    TimelineReady {
        timeline_id: String,
        title: String,
        block_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Block playback started
    ///
    /// Fires once per played block, before any audio for it.
    BlockStarted {
        timeline_id: String,
        block_id: String,
        /// Index within the timeline
        index: usize,
        /// Block type (`talk`, `music`, `musicControl`, `silence`)
        kind: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Block played to completion
    ///
    /// Not emitted for blocks preempted by a skip or stop.
    BlockCompleted {
        timeline_id: String,
        block_id: String,
        index: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A single dialogue line is about to be heard
    TalkLine {
        block_id: String,
        line_index: usize,
        speaker: String,
        text: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A batched talk artifact covering every line is about to be heard
    TalkBatch {
        block_id: String,
        lines: Vec<SpokenLine>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Music started on the music channel
    MusicStarted {
        block_id: String,
        query: String,
        /// Track display name, when search metadata is available
        track: Option<String>,
        lyrics: Option<String>,
        /// Whether the payload came from the download cache
        cached: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Every block of the timeline has been visited
    ShowCompleted {
        timeline_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A failure was reported (iteration failure, readiness timeout, media failure)
    Error {
        message: String,
        /// Block the error relates to, if any
        block_id: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl DirectorEvent {
    /// Event type name, used as the SSE event field
    pub fn event_type(&self) -> &'static str {
        match self {
            DirectorEvent::StateChanged { .. } => "StateChanged",
            DirectorEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            DirectorEvent::TimelineReady { .. } => "TimelineReady",
            DirectorEvent::BlockStarted { .. } => "BlockStarted",
            DirectorEvent::BlockCompleted { .. } => "BlockCompleted",
            DirectorEvent::TalkLine { .. } => "TalkLine",
            DirectorEvent::TalkBatch { .. } => "TalkBatch",
            DirectorEvent::MusicStarted { .. } => "MusicStarted",
            DirectorEvent::ShowCompleted { .. } => "ShowCompleted",
            DirectorEvent::Error { .. } => "Error",
        }
    }

    pub fn error(message: impl Into<String>, block_id: Option<String>) -> Self {
        DirectorEvent::Error {
            message: message.into(),
            block_id,
            timestamp: chrono::Utc::now(),
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use airwave_common::events::{DirectorEvent, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(DirectorEvent::error("generator timed out", None));
/// assert!(matches!(rx.try_recv(), Ok(DirectorEvent::Error { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DirectorEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Events beyond `capacity` that a subscriber has not read yet are
    /// dropped for that subscriber (it sees `RecvError::Lagged`).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<DirectorEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: DirectorEvent,
    ) -> Result<usize, broadcast::error::SendError<DirectorEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: DirectorEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
