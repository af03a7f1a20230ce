//! External collaborator interfaces
//!
//! The director orchestrates; everything that talks to a model, a catalog, a
//! speaker or a database sits behind one of these traits:
//!
//! - [`ContentGenerator`]: produces timelines
//! - [`SpeechSynthesizer`]: turns lines into audio bytes
//! - [`MediaProvider`] / [`MediaDownloader`]: catalog search, URL resolution, byte fetch
//! - [`AudioOutput`]: two-channel playback (music bed + voice overlay)
//! - [`SnapshotSink`]: best-effort session snapshots
//!
//! Shipped implementations live in the submodules.

pub mod download;
pub mod llm;
pub mod offline;
pub mod scripted;
pub mod snapshot;

use crate::error::{Error, Result};
use airwave_common::Timeline;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Parameters for one generator call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateRequest {
    /// Requested timeline length
    pub duration_sec: u64,
    pub theme: Option<String>,
    /// Free-text listener request to weave into the episode
    pub user_request: Option<String>,
}

/// Produces show timelines
///
/// Implementations must return an error rather than a timeline without blocks.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<Timeline>;

    /// Name for logs
    fn name(&self) -> &str;
}

/// Per-line voice parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceOptions {
    pub mood: Option<String>,
    pub style_hint: Option<String>,
    pub voice_override: Option<String>,
}

/// One line of a batched synthesis request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLine {
    pub speaker: String,
    pub text: String,
    pub options: VoiceOptions,
}

/// Text-to-speech backend
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize one line
    async fn synthesize(&self, text: &str, speaker: &str, options: &VoiceOptions) -> Result<Bytes>;

    /// Whether [`SpeechSynthesizer::synthesize_batch`] is available
    fn supports_batch(&self) -> bool {
        false
    }

    /// Synthesize several lines (possibly several speakers) as one clip
    async fn synthesize_batch(&self, _lines: &[BatchLine]) -> Result<Bytes> {
        Err(Error::Synthesis("batch synthesis not supported".to_string()))
    }

    /// Abort every in-flight request; pending calls resolve with an error
    fn abort_all(&self);
}

/// Catalog entry returned by a media search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    /// Catalog the track belongs to
    pub source: String,
    pub lyric_id: Option<String>,
    pub duration_ms: Option<u64>,
}

impl Track {
    /// "Artist - Title" display form
    pub fn display_name(&self) -> String {
        if self.artists.is_empty() {
            self.name.clone()
        } else {
            format!("{} - {}", self.artists.join(", "), self.name)
        }
    }
}

/// Music catalog
///
/// Resolved URLs expire; the director tracks their age itself.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Track>>;

    async fn resolve_url(&self, track_id: &str, bitrate: u32, source: &str) -> Result<String>;

    async fn lyrics(&self, lyric_id: &str, source: &str) -> Result<Option<String>>;
}

/// Fetches a resolved media URL into memory
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    async fn download(&self, url: &str) -> Result<Bytes>;
}

/// Logical output channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Loopable, fadeable music bed
    Music,
    /// Narration overlay
    Voice,
}

/// What to play on the music channel
#[derive(Debug, Clone, PartialEq)]
pub enum MusicSource {
    /// Fully downloaded payload
    Bytes(Bytes),
    /// Live stream
    Url(String),
}

/// Audio mixing/output backend
///
/// Playback calls report failure through their return value instead of
/// erroring; the director treats a `false` as "nothing audible happened".
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Play a voice clip; resolves when it finished or was stopped
    async fn play_voice(&self, audio: Bytes) -> bool;

    /// Start music; resolves once playback has started
    async fn play_music(&self, source: MusicSource, looped: bool) -> bool;

    /// Ramp a channel to `target_volume`; resolves when the ramp is done
    async fn fade(&self, channel: Channel, target_volume: f32, duration: Duration);

    fn set_volume(&self, channel: Channel, volume: f32);

    fn volume(&self, channel: Channel) -> f32;

    fn pause(&self, channel: Channel);

    fn resume(&self, channel: Channel);

    fn stop(&self, channel: Channel);

    fn is_playing(&self, channel: Channel) -> bool;

    fn pause_all(&self) {
        self.pause(Channel::Music);
        self.pause(Channel::Voice);
    }

    fn resume_all(&self) {
        self.resume(Channel::Music);
        self.resume(Channel::Voice);
    }

    fn stop_all(&self) {
        self.stop(Channel::Voice);
        self.stop(Channel::Music);
    }
}

/// Resumable position within a show
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub timeline_id: String,
    /// Index of the next block to play
    pub cursor: usize,
    /// Time since the timeline started playing
    pub position_ms: u64,
    pub saved_at: chrono::DateTime<chrono::Utc>,
}

/// Fire-and-forget snapshot persistence
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn save_snapshot(&self, snapshot: SessionSnapshot) -> Result<()>;
}

/// Every collaborator the director drives, bundled for construction
#[derive(Clone)]
pub struct Providers {
    pub generator: Arc<dyn ContentGenerator>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub media: Arc<dyn MediaProvider>,
    pub downloader: Arc<dyn MediaDownloader>,
    pub output: Arc<dyn AudioOutput>,
    pub snapshots: Option<Arc<dyn SnapshotSink>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_display_name() {
        let mut track = Track {
            id: "1".into(),
            name: "So What".into(),
            artists: vec!["Miles Davis".into()],
            album: None,
            source: "default".into(),
            lyric_id: None,
            duration_ms: Some(545_000),
        };
        assert_eq!(track.display_name(), "Miles Davis - So What");

        track.artists.clear();
        assert_eq!(track.display_name(), "So What");
    }
}
