//! Offline stand-ins for headless runs
//!
//! None of these touch the network or a sound card. They let the director
//! run end to end (rehearsals, CI, the HTTP surface) with realistic timing:
//! silent clips have a length proportional to their text and the simulated
//! output really waits that long.

use super::{
    AudioOutput, BatchLine, Channel, MediaDownloader, MediaProvider, MusicSource, SpeechSynthesizer, Track,
    VoiceOptions,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Bytes of silent "audio" per character of text
const SILENT_BYTES_PER_CHAR: usize = 60;

/// Granularity of simulated playback
const PLAYBACK_TICK: Duration = Duration::from_millis(10);

/// Most recent output calls kept by [`SimulatedAudioOutput`]
pub const DEFAULT_CALL_LOG_CAPACITY: usize = 512;

// ----------------------------------------------------------------------
// Speech
// ----------------------------------------------------------------------

/// Synthesizer producing silence sized to the text
#[derive(Debug, Default)]
pub struct SilentSynthesizer {
    aborts: AtomicU64,
}

impl SilentSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn silence_for(text: &str) -> Bytes {
        Bytes::from(vec![0u8; text.chars().count().max(1) * SILENT_BYTES_PER_CHAR])
    }
}

#[async_trait]
impl SpeechSynthesizer for SilentSynthesizer {
    async fn synthesize(&self, text: &str, speaker: &str, _options: &VoiceOptions) -> Result<Bytes> {
        if text.trim().is_empty() {
            return Err(Error::Synthesis(format!("empty line for {}", speaker)));
        }
        Ok(Self::silence_for(text))
    }

    fn supports_batch(&self) -> bool {
        true
    }

    async fn synthesize_batch(&self, lines: &[BatchLine]) -> Result<Bytes> {
        let text: String = lines.iter().map(|l| l.text.as_str()).collect();
        if text.trim().is_empty() {
            return Err(Error::Synthesis("empty batch".to_string()));
        }
        Ok(Self::silence_for(&text))
    }

    fn abort_all(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------
// Media
// ----------------------------------------------------------------------

/// Catalog that answers every query with one synthetic track
#[derive(Debug, Default)]
pub struct OfflineMediaProvider;

impl OfflineMediaProvider {
    pub fn new() -> Self {
        Self
    }
}

fn slug(query: &str) -> String {
    query
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

#[async_trait]
impl MediaProvider for OfflineMediaProvider {
    async fn search(&self, query: &str) -> Result<Vec<Track>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Track {
            id: slug(query),
            name: query.to_string(),
            artists: vec!["Offline Ensemble".to_string()],
            album: None,
            source: "offline".to_string(),
            lyric_id: None,
            duration_ms: Some(180_000),
        }])
    }

    async fn resolve_url(&self, track_id: &str, bitrate: u32, source: &str) -> Result<String> {
        Ok(format!("offline://{}/{}?br={}", source, track_id, bitrate))
    }

    async fn lyrics(&self, _lyric_id: &str, _source: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

#[async_trait]
impl MediaDownloader for OfflineMediaProvider {
    async fn download(&self, url: &str) -> Result<Bytes> {
        if !url.starts_with("offline://") {
            return Err(Error::Download(format!("offline provider cannot fetch {}", url)));
        }
        Ok(Bytes::from(vec![0u8; 4096]))
    }
}

// ----------------------------------------------------------------------
// Output
// ----------------------------------------------------------------------

/// What a music call started, without holding on to the payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayedSource {
    Bytes(usize),
    Url(String),
}

impl From<&MusicSource> for PlayedSource {
    fn from(source: &MusicSource) -> Self {
        match source {
            MusicSource::Bytes(bytes) => PlayedSource::Bytes(bytes.len()),
            MusicSource::Url(url) => PlayedSource::Url(url.clone()),
        }
    }
}

/// One call made against [`SimulatedAudioOutput`]
#[derive(Debug, Clone, PartialEq)]
pub enum AudioCall {
    Voice { bytes: usize },
    Music { source: PlayedSource, looped: bool },
    Fade { channel: Channel, target: f32 },
    SetVolume { channel: Channel, volume: f32 },
    Pause(Channel),
    Resume(Channel),
    Stop(Channel),
}

#[derive(Debug, Clone, Copy)]
struct ChannelState {
    playing: bool,
    paused: bool,
    volume: f32,
    /// Bumped by every new clip and every stop
    generation: u64,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            playing: false,
            paused: false,
            volume: 1.0,
            generation: 0,
        }
    }
}

/// Output that tracks channel state and simulates clip length
///
/// A voice clip of `n` bytes plays for `n * voice_ms_per_byte` milliseconds,
/// paused time not counted. The most recent calls are kept for inspection.
#[derive(Debug)]
pub struct SimulatedAudioOutput {
    channels: Mutex<HashMap<Channel, ChannelState>>,
    calls: Mutex<VecDeque<AudioCall>>,
    call_log_capacity: usize,
    voice_ms_per_byte: f64,
}

impl Default for SimulatedAudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedAudioOutput {
    /// One millisecond per byte, so silent clips run 60 ms per character
    pub fn new() -> Self {
        Self::with_voice_rate(1.0)
    }

    /// Custom simulated clip length per byte
    pub fn with_voice_rate(voice_ms_per_byte: f64) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            calls: Mutex::new(VecDeque::new()),
            call_log_capacity: DEFAULT_CALL_LOG_CAPACITY,
            voice_ms_per_byte,
        }
    }

    /// Keep at most `capacity` calls, oldest dropped first
    pub fn with_call_log_capacity(mut self, capacity: usize) -> Self {
        self.call_log_capacity = capacity;
        self
    }

    fn record(&self, call: AudioCall) {
        let mut calls = self.calls.lock();
        while calls.len() >= self.call_log_capacity.max(1) {
            calls.pop_front();
        }
        calls.push_back(call);
    }

    fn with_channel<R>(&self, channel: Channel, f: impl FnOnce(&mut ChannelState) -> R) -> R {
        let mut channels = self.channels.lock();
        f(channels.entry(channel).or_default())
    }

    pub fn calls(&self) -> Vec<AudioCall> {
        self.calls.lock().iter().cloned().collect()
    }

    /// Music sources started, in order
    pub fn music_started(&self) -> Vec<PlayedSource> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                AudioCall::Music { source, .. } => Some(source.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn is_paused(&self, channel: Channel) -> bool {
        self.with_channel(channel, |c| c.paused)
    }

    fn clip_length(&self, audio: &Bytes) -> Duration {
        Duration::from_millis((audio.len() as f64 * self.voice_ms_per_byte) as u64)
    }
}

#[async_trait]
impl AudioOutput for SimulatedAudioOutput {
    async fn play_voice(&self, audio: Bytes) -> bool {
        if audio.is_empty() {
            return false;
        }
        self.record(AudioCall::Voice { bytes: audio.len() });

        let generation = self.with_channel(Channel::Voice, |c| {
            c.generation += 1;
            c.playing = true;
            c.generation
        });

        let mut remaining = self.clip_length(&audio);
        debug!("Simulated voice clip: {:?}", remaining);
        while !remaining.is_zero() {
            let (current, paused) = self.with_channel(Channel::Voice, |c| (c.generation, c.paused));
            if current != generation {
                // stopped or replaced
                return true;
            }
            let step = remaining.min(PLAYBACK_TICK);
            tokio::time::sleep(step).await;
            if !paused {
                remaining = remaining.saturating_sub(step);
            }
        }

        self.with_channel(Channel::Voice, |c| {
            if c.generation == generation {
                c.playing = false;
            }
        });
        true
    }

    async fn play_music(&self, source: MusicSource, looped: bool) -> bool {
        if let MusicSource::Url(url) = &source {
            if url.is_empty() {
                return false;
            }
        }
        info!(looped, "Simulated music started");
        self.record(AudioCall::Music {
            source: PlayedSource::from(&source),
            looped,
        });
        self.with_channel(Channel::Music, |c| {
            c.generation += 1;
            c.playing = true;
            c.paused = false;
        });
        true
    }

    async fn fade(&self, channel: Channel, target_volume: f32, duration: Duration) {
        self.record(AudioCall::Fade {
            channel,
            target: target_volume,
        });
        tokio::time::sleep(duration).await;
        self.with_channel(channel, |c| c.volume = target_volume.clamp(0.0, 1.0));
    }

    fn set_volume(&self, channel: Channel, volume: f32) {
        self.record(AudioCall::SetVolume { channel, volume });
        self.with_channel(channel, |c| c.volume = volume.clamp(0.0, 1.0));
    }

    fn volume(&self, channel: Channel) -> f32 {
        self.with_channel(channel, |c| c.volume)
    }

    fn pause(&self, channel: Channel) {
        self.record(AudioCall::Pause(channel));
        self.with_channel(channel, |c| c.paused = true);
    }

    fn resume(&self, channel: Channel) {
        self.record(AudioCall::Resume(channel));
        self.with_channel(channel, |c| c.paused = false);
    }

    fn stop(&self, channel: Channel) {
        self.record(AudioCall::Stop(channel));
        self.with_channel(channel, |c| {
            c.generation += 1;
            c.playing = false;
            c.paused = false;
        });
    }

    fn is_playing(&self, channel: Channel) -> bool {
        self.with_channel(channel, |c| c.playing && !c.paused)
    }
}
