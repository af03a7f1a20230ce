//! HTTP control surface
//!
//! REST endpoints for the show lifecycle and playback control, plus an SSE
//! stream of [`DirectorEvent`](airwave_common::events::DirectorEvent)s.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{create_router, run, AppContext};
