//! Execution engine
//!
//! **Module Structure:**
//! - `core.rs`: engine struct, the block loop, interrupt checks, readiness wait
//! - `talk.rs`: talk blocks (batched clip or line-by-line with lookahead, ducking)
//! - `music.rs`: music, music-control and silence blocks
//!
//! Before and during every block the engine checks, in priority order:
//!
//! 1. stop (session no longer current): exit immediately
//! 2. skip: jump the cursor to the requested index; preempts pause
//! 3. pause: wait in poll-interval steps
//!
//! The poll interval (default 100 ms, at most 150 ms) bounds how long any
//! of these takes to be observed.

mod core;
mod music;
mod talk;

pub use self::core::{ExecutionEngine, RunOutcome};
