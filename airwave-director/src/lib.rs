//! # Airwave Director
//!
//! Continuous AI radio show director: turns generated show timelines into
//! gap-free playback while the next timeline is generated and its media is
//! prefetched, and while listeners pause, resume and skip.
//!
//! **Architecture:** leaves first
//! - [`controller`]: pause/resume/skip over shared flags
//! - [`preload`] + [`cache`]: readiness, background prefetch, URL TTL, session-scoped pruning
//! - [`engine`]: walks one timeline block by block
//! - [`scheduler`]: outer loop, double buffering, session lifecycle, backoff
//!
//! External collaborators (generator, synthesizer, catalog, audio output,
//! snapshot store) sit behind the traits in [`providers`].

pub mod api;
pub mod cache;
pub mod controller;
pub mod engine;
pub mod error;
pub mod preload;
pub mod providers;
pub mod scheduler;
pub mod state;

pub use error::{Error, Result};
pub use scheduler::ShowScheduler;
pub use state::SharedState;
