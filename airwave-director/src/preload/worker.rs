//! Background prefetch worker

use super::PreloadManager;
use crate::state::SessionToken;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

impl PreloadManager {
    /// Start the periodic worker for `token`'s session, replacing any previous one
    pub fn start_worker(self: &Arc<Self>, token: SessionToken) {
        let interval = self.config.preload.worker_interval();
        let manager = Arc::clone(self);

        let handle = tokio::spawn(async move {
            info!("Preload worker started (interval {:?})", interval);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if !token.is_current() {
                    break;
                }
                if let Some(context) = manager.state.context() {
                    if context.session_id() == token.id() && !context.is_finished() {
                        manager.prefetch_window(&token, context.timeline(), context.cursor());
                    }
                }
            }
            debug!("Preload worker for session {} exited", token.id());
        });

        if let Some(previous) = self.worker.lock().replace(handle) {
            previous.abort();
        }
    }

    pub fn stop_worker(&self) {
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
            info!("Preload worker stopped");
        }
    }

    pub fn is_worker_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}
