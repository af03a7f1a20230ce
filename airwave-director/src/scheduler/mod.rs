//! Show scheduler
//!
//! **Module Structure:**
//! - `core.rs`: lifecycle (start/stop), the outer loop, timeline installation
//! - `next_timeline.rs`: background double-buffering of the next timeline
//! - `warmup.rs`: warmup sequence, filler narration, transition cue
//!
//! Each loop iteration obtains one timeline in one of three ways and plays
//! it to the end:
//!
//! - first run: warmup audio while the first timeline is generated
//! - pre-fetched: promote the double-buffered timeline once it is ready
//! - regenerate: filler narration while a timeline is generated on the spot
//!
//! Any iteration error is reported and followed by a fixed backoff; only an
//! explicit stop ends the loop.

mod core;
mod next_timeline;
mod warmup;

pub use self::core::ShowScheduler;
