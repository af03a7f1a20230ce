//! Test helpers for airwave-director integration tests
//!
//! - mocks: scriptable generator, synthesizer, catalog and downloader
//! - harness: engine/preload wiring over one timeline, scheduler builder
//! - events: recording of director events

#![allow(dead_code)]

pub mod events;
pub mod harness;
pub mod mocks;

pub use events::EventLog;
pub use harness::{scheduler_with, scheduler_with_media, show, talk_block, test_config, EngineHarness};
pub use mocks::{MockDownloader, MockGenerator, MockMedia, MockSynthesizer};
