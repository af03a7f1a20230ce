//! Director event recording

use airwave_common::events::{DirectorEvent, DirectorPhase};
use airwave_director::SharedState;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

/// Subscribes before the action under test and keeps everything it saw
pub struct EventLog {
    rx: broadcast::Receiver<DirectorEvent>,
    seen: Vec<DirectorEvent>,
}

impl EventLog {
    pub fn new(state: &SharedState) -> Self {
        Self {
            rx: state.events().subscribe(),
            seen: Vec::new(),
        }
    }

    /// Pull every event already published
    pub fn drain(&mut self) -> &[DirectorEvent] {
        loop {
            match self.rx.try_recv() {
                Ok(event) => self.seen.push(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        &self.seen
    }

    /// Wait until an event matching `pred` arrives, recording everything on the way
    pub async fn wait_for(
        &mut self,
        timeout: Duration,
        pred: impl Fn(&DirectorEvent) -> bool,
    ) -> Option<DirectorEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Ok(event)) => {
                    self.seen.push(event.clone());
                    if pred(&event) {
                        return Some(event);
                    }
                }
                Ok(Err(RecvError::Lagged(_))) => continue,
                Ok(Err(RecvError::Closed)) | Err(_) => return None,
            }
        }
    }

    pub fn seen(&self) -> &[DirectorEvent] {
        &self.seen
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.seen.iter().filter(|e| e.event_type() == event_type).count()
    }

    /// `("start", index)` / `("end", index)` in emission order
    pub fn block_lifecycle(&self) -> Vec<(&'static str, usize)> {
        self.seen
            .iter()
            .filter_map(|e| match e {
                DirectorEvent::BlockStarted { index, .. } => Some(("start", *index)),
                DirectorEvent::BlockCompleted { index, .. } => Some(("end", *index)),
                _ => None,
            })
            .collect()
    }

    pub fn started_indices(&self) -> Vec<usize> {
        self.block_lifecycle()
            .into_iter()
            .filter(|(kind, _)| *kind == "start")
            .map(|(_, index)| index)
            .collect()
    }

    /// `(block_id, line_index)` of every spoken line
    pub fn talk_lines(&self) -> Vec<(String, usize)> {
        self.seen
            .iter()
            .filter_map(|e| match e {
                DirectorEvent::TalkLine {
                    block_id, line_index, ..
                } => Some((block_id.clone(), *line_index)),
                _ => None,
            })
            .collect()
    }

    /// `(message, block_id)` of every error
    pub fn errors(&self) -> Vec<(String, Option<String>)> {
        self.seen
            .iter()
            .filter_map(|e| match e {
                DirectorEvent::Error { message, block_id, .. } => Some((message.clone(), block_id.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn phases(&self) -> Vec<DirectorPhase> {
        self.seen
            .iter()
            .filter_map(|e| match e {
                DirectorEvent::StateChanged { new_phase, .. } => Some(*new_phase),
                _ => None,
            })
            .collect()
    }

    /// Ids of installed timelines, in order
    pub fn installed_timelines(&self) -> Vec<String> {
        self.seen
            .iter()
            .filter_map(|e| match e {
                DirectorEvent::TimelineReady { timeline_id, .. } => Some(timeline_id.clone()),
                _ => None,
            })
            .collect()
    }
}
