//! Playback controller
//!
//! Imperative operations over the shared state: pause, resume and the three
//! skip flavors. The engine and scheduler observe the flags these set; the
//! controller itself never touches the cursor.

use crate::providers::{AudioOutput, Channel};
use crate::state::SharedState;
use airwave_common::events::DirectorEvent;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Position within the live timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

#[derive(Clone)]
pub struct PlaybackController {
    state: Arc<SharedState>,
    output: Arc<dyn AudioOutput>,
}

impl PlaybackController {
    pub fn new(state: Arc<SharedState>, output: Arc<dyn AudioOutput>) -> Self {
        Self { state, output }
    }

    /// Pause playback; returns false when already paused
    pub fn pause(&self) -> bool {
        if !self.state.set_paused(true) {
            debug!("Pause ignored: already paused");
            return false;
        }
        self.output.pause_all();
        info!("Playback paused");
        self.emit_paused(true);
        true
    }

    /// Resume playback; returns false when not paused
    pub fn resume(&self) -> bool {
        if !self.state.set_paused(false) {
            debug!("Resume ignored: not paused");
            return false;
        }
        self.output.resume_all();
        info!("Playback resumed");
        self.emit_paused(false);
        true
    }

    pub fn skip_next(&self) -> bool {
        let (current, _) = self.state.progress();
        self.request_skip(current.saturating_add(1))
    }

    pub fn skip_previous(&self) -> bool {
        let (current, _) = self.state.progress();
        match current.checked_sub(1) {
            Some(target) => self.request_skip(target),
            None => {
                debug!("Skip previous ignored: at first block");
                false
            }
        }
    }

    /// Jump to `index`; also clears pause so the jump is audible
    pub fn skip_to_index(&self, index: usize) -> bool {
        if !self.request_skip(index) {
            return false;
        }
        if self.state.set_paused(false) {
            self.output.resume_all();
            self.emit_paused(false);
        }
        true
    }

    pub fn progress(&self) -> Progress {
        let (current, total) = self.state.progress();
        Progress { current, total }
    }

    /// Validate `target` against the live timeline and raise the skip flag
    ///
    /// Out-of-range targets leave cursor, flag and target untouched.
    fn request_skip(&self, target: usize) -> bool {
        let (_, total) = self.state.progress();
        if target >= total {
            debug!("Skip to {} ignored: timeline has {} blocks", target, total);
            return false;
        }

        self.state.request_skip(target);
        self.output.stop(Channel::Voice);
        self.output.stop(Channel::Music);
        info!("Skip requested to block {}", target);
        true
    }

    fn emit_paused(&self, paused: bool) {
        self.state.emit(DirectorEvent::PlaybackStateChanged {
            paused,
            timestamp: chrono::Utc::now(),
        });
    }
}
