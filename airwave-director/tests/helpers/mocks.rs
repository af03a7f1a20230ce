//! Scriptable collaborators
//!
//! Each mock counts its calls so tests can assert on what the director did,
//! not only on what it emitted.

use airwave_common::Timeline;
use airwave_director::providers::{
    ContentGenerator, GenerateRequest, MediaDownloader, MediaProvider, SpeechSynthesizer, Track, VoiceOptions,
};
use airwave_director::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

// ----------------------------------------------------------------------
// Generator
// ----------------------------------------------------------------------

enum Reply {
    Timeline(Timeline),
    Fail(String),
}

/// Generator replaying a script of replies, then copies of a template
pub struct MockGenerator {
    script: Mutex<VecDeque<Reply>>,
    template: Timeline,
    delay: Duration,
    calls: Mutex<Vec<Instant>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl MockGenerator {
    pub fn new(template: Timeline) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            template,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Time every call takes before replying
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn then_fail(self, message: &str) -> Self {
        self.script.lock().push_back(Reply::Fail(message.to_string()));
        self
    }

    pub fn then_return(self, timeline: Timeline) -> Self {
        self.script.lock().push_back(Reply::Timeline(timeline));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().clone()
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().clone()
    }

    /// Template copy with fresh timeline and block identity
    fn fresh(&self) -> Timeline {
        let mut timeline = self.template.clone();
        timeline.id.clear();
        timeline.normalize();
        timeline
    }
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    async fn generate(&self, request: GenerateRequest) -> Result<Timeline> {
        self.calls.lock().push(Instant::now());
        self.requests.lock().push(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let reply = self.script.lock().pop_front();
        match reply {
            Some(Reply::Timeline(timeline)) => Ok(timeline),
            Some(Reply::Fail(message)) => Err(Error::Generation(message)),
            None => Ok(self.fresh()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ----------------------------------------------------------------------
// Synthesizer
// ----------------------------------------------------------------------

/// Ten bytes of audio per character
pub const BYTES_PER_CHAR: usize = 10;

#[derive(Default)]
pub struct MockSynthesizer {
    batch: bool,
    fail_once: Mutex<HashSet<String>>,
    hang_on: HashSet<String>,
    texts: Mutex<Vec<String>>,
    calls: AtomicUsize,
    batch_calls: AtomicUsize,
    aborts: AtomicUsize,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch(mut self) -> Self {
        self.batch = true;
        self
    }

    /// First synthesis of `text` fails, later ones succeed
    pub fn failing_once(self, text: &str) -> Self {
        self.fail_once.lock().insert(text.to_string());
        self
    }

    /// Synthesis of `text` never returns
    pub fn hanging_on(mut self, text: &str) -> Self {
        self.hang_on.insert(text.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every text handed to `synthesize`, in call order
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }

    /// How many times `text` was synthesized
    pub fn synthesized(&self, text: &str) -> usize {
        self.texts.lock().iter().filter(|t| *t == text).count()
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    fn audio_for(text: &str) -> Bytes {
        Bytes::from(vec![0u8; text.chars().count().max(1) * BYTES_PER_CHAR])
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str, _speaker: &str, _options: &VoiceOptions) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().push(text.to_string());
        if self.hang_on.contains(text) {
            std::future::pending::<()>().await;
        }
        if self.fail_once.lock().remove(text) {
            return Err(Error::Synthesis(format!("scripted failure for '{}'", text)));
        }
        Ok(Self::audio_for(text))
    }

    fn supports_batch(&self) -> bool {
        self.batch
    }

    async fn synthesize_batch(&self, lines: &[airwave_director::providers::BatchLine]) -> Result<Bytes> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let text: String = lines.iter().map(|line| line.text.as_str()).collect();
        Ok(Self::audio_for(&text))
    }

    fn abort_all(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------
// Catalog
// ----------------------------------------------------------------------

/// Catalog with one hit per query; every resolution yields a new URL
#[derive(Default)]
pub struct MockMedia {
    search_delay: Duration,
    searches: AtomicUsize,
    resolves: AtomicUsize,
}

impl MockMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_delay(mut self, delay: Duration) -> Self {
        self.search_delay = delay;
        self
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaProvider for MockMedia {
    async fn search(&self, query: &str) -> Result<Vec<Track>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if !self.search_delay.is_zero() {
            tokio::time::sleep(self.search_delay).await;
        }
        Ok(vec![Track {
            id: query.replace(' ', "-"),
            name: query.to_string(),
            artists: vec!["Test Artist".to_string()],
            album: None,
            source: "test".to_string(),
            lyric_id: None,
            duration_ms: Some(120_000),
        }])
    }

    async fn resolve_url(&self, track_id: &str, bitrate: u32, source: &str) -> Result<String> {
        let n = self.resolves.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("https://media.test/{}/{}?br={}&n={}", source, track_id, bitrate, n))
    }

    async fn lyrics(&self, _lyric_id: &str, _source: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Downloader recording every URL it is handed
#[derive(Default)]
pub struct MockDownloader {
    fail: bool,
    urls: Mutex<Vec<String>>,
}

impl MockDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl MediaDownloader for MockDownloader {
    async fn download(&self, url: &str) -> Result<Bytes> {
        self.urls.lock().push(url.to_string());
        if self.fail {
            return Err(Error::Download(format!("scripted failure for {}", url)));
        }
        Ok(Bytes::from(vec![0u8; 1024]))
    }
}
