//! # Airwave Common Library
//!
//! Shared code for the Airwave show director:
//! - Timeline and block model produced by content generators
//! - Event types (DirectorEvent enum) and the EventBus
//! - Configuration loading
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod timeline;

pub use error::{Error, Result};
pub use timeline::{
    BackgroundMusicDirective, Block, BlockKind, DuckAction, IntroLine, MusicBlock, MusicControlAction,
    MusicControlBlock, ScriptLine, SilenceBlock, TalkBlock, Timeline,
};
