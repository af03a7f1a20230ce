//! Session-scoped media cache
//!
//! Holds every artifact the preload manager materializes ahead of the
//! cursor: synthesized talk lines, batched talk clips, track metadata,
//! resolved URLs (with their age) and downloaded media bytes.
//!
//! All mutation goes through methods on [`MediaCache`]. Commits are gated on
//! the producing [`SessionToken`] and on the key still being referenced by
//! the active or pending timeline, both checked under the cache lock, so a
//! stale continuation can never resurrect an entry that pruning removed.

use crate::providers::Track;
use crate::state::SessionToken;
use airwave_common::{BlockKind, Timeline};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Identifies a block across episodes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub timeline_id: String,
    pub block_id: String,
}

impl BlockKey {
    pub fn new(timeline_id: impl Into<String>, block_id: impl Into<String>) -> Self {
        Self {
            timeline_id: timeline_id.into(),
            block_id: block_id.into(),
        }
    }

    pub fn line(&self, line: usize) -> LineKey {
        LineKey {
            block: self.clone(),
            line,
        }
    }
}

/// One script line of a talk block
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineKey {
    pub block: BlockKey,
    pub line: usize,
}

/// Outcome of synthesizing one line ahead of time
#[derive(Debug, Clone, PartialEq)]
pub enum PreparedAudio {
    Ready(Bytes),
    /// Synthesis failed; the line is resolved and will be retried live once
    Failed,
}

#[derive(Debug, Clone)]
struct UrlEntry {
    url: String,
    cached_at: Instant,
}

/// State of a cached URL relative to its TTL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlFreshness {
    /// Safe to use as is
    Fresh(String),
    /// Still valid but inside the renewal window
    Renew(String),
    /// Was older than the TTL and has been discarded
    Expired,
    Missing,
}

#[derive(Debug, Default)]
struct References {
    timelines: HashSet<String>,
    queries: HashSet<String>,
}

impl References {
    fn add(&mut self, timeline: &Timeline) {
        self.timelines.insert(timeline.id.clone());
        self.queries
            .extend(timeline.music_queries().map(|q| q.to_string()));
    }
}

#[derive(Debug, Default)]
struct Inner {
    lines: HashMap<LineKey, PreparedAudio>,
    batches: HashMap<BlockKey, Bytes>,
    tracks: HashMap<String, Track>,
    lyrics: HashMap<String, String>,
    urls: HashMap<String, UrlEntry>,
    media: HashMap<String, Bytes>,
    in_progress: HashSet<BlockKey>,
    failed: HashSet<BlockKey>,
    referenced: References,
}

impl Inner {
    fn references_block(&self, key: &BlockKey) -> bool {
        self.referenced.timelines.contains(&key.timeline_id)
    }

    fn references_query(&self, query: &str) -> bool {
        self.referenced.queries.contains(query)
    }
}

/// Entry counts, for status and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub talk_lines: usize,
    pub talk_batches: usize,
    pub tracks: usize,
    pub urls: usize,
    pub media: usize,
    pub in_progress: usize,
    pub failed: usize,
}

/// Cache of prepared show assets
#[derive(Debug, Default)]
pub struct MediaCache {
    inner: Mutex<Inner>,
}

impl MediaCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Reference set and pruning
    // ------------------------------------------------------------------

    /// Add `timeline`'s keys to the reference set without pruning
    ///
    /// Used when a timeline enters the double-buffer slot so its prefetch can
    /// commit before the next prune.
    pub fn reference(&self, timeline: &Timeline) {
        self.inner.lock().referenced.add(timeline);
    }

    /// Replace the reference set with `timelines` and drop everything else
    ///
    /// After this returns every entry's key belongs to one of `timelines`.
    pub fn retain_referenced(&self, timelines: &[&Timeline]) {
        let mut inner = self.inner.lock();
        let mut referenced = References::default();
        for timeline in timelines {
            referenced.add(timeline);
        }

        let before = inner.lines.len() + inner.batches.len() + inner.media.len() + inner.urls.len();

        inner.lines.retain(|k, _| referenced.timelines.contains(&k.block.timeline_id));
        inner.batches.retain(|k, _| referenced.timelines.contains(&k.timeline_id));
        inner.in_progress.retain(|k| referenced.timelines.contains(&k.timeline_id));
        inner.failed.retain(|k| referenced.timelines.contains(&k.timeline_id));
        inner.tracks.retain(|q, _| referenced.queries.contains(q));
        inner.lyrics.retain(|q, _| referenced.queries.contains(q));
        inner.urls.retain(|q, _| referenced.queries.contains(q));
        inner.media.retain(|q, _| referenced.queries.contains(q));
        inner.referenced = referenced;

        let after = inner.lines.len() + inner.batches.len() + inner.media.len() + inner.urls.len();
        debug!("Cache pruned: {} -> {} entries", before, after);
    }

    /// Drop all talk audio of one timeline
    pub fn purge_talk_audio(&self, timeline_id: &str) {
        let mut inner = self.inner.lock();
        inner.lines.retain(|k, _| k.block.timeline_id != timeline_id);
        inner.batches.retain(|k, _| k.timeline_id != timeline_id);
        // Talk blocks of that timeline are no longer ready
        inner.failed.retain(|k| k.timeline_id != timeline_id);
    }

    pub fn clear(&self) {
        *self.inner.lock() = Inner::default();
    }

    // ------------------------------------------------------------------
    // Readiness
    // ------------------------------------------------------------------

    /// Whether every asset `kind` needs is materialized
    pub fn is_ready(&self, key: &BlockKey, kind: &BlockKind) -> bool {
        let inner = self.inner.lock();
        match kind {
            BlockKind::Talk(talk) => {
                inner.batches.contains_key(key)
                    || (0..talk.scripts.len())
                        .all(|i| matches!(inner.lines.get(&key.line(i)), Some(PreparedAudio::Ready(_))))
            }
            BlockKind::Music(music) => inner.media.contains_key(&music.search_query),
            BlockKind::MusicControl(_) | BlockKind::Silence(_) => true,
        }
    }

    /// Ready, or preparation already gave up on this block
    ///
    /// A talk block whose every line was attempted counts, failed lines
    /// included; the executor retries those live.
    pub fn is_playable(&self, key: &BlockKey, kind: &BlockKind) -> bool {
        if self.is_ready(key, kind) {
            return true;
        }
        let inner = self.inner.lock();
        if inner.failed.contains(key) {
            return true;
        }
        match kind {
            BlockKind::Talk(talk) => (0..talk.scripts.len()).all(|i| inner.lines.contains_key(&key.line(i))),
            _ => false,
        }
    }

    /// Mark a block in progress; false if it already was
    pub fn try_begin(&self, key: &BlockKey) -> bool {
        self.inner.lock().in_progress.insert(key.clone())
    }

    /// Clear the in-progress mark regardless of outcome
    pub fn finish(&self, key: &BlockKey) {
        self.inner.lock().in_progress.remove(key);
    }

    pub fn is_in_progress(&self, key: &BlockKey) -> bool {
        self.inner.lock().in_progress.contains(key)
    }

    pub fn mark_failed(&self, token: &SessionToken, key: &BlockKey) -> bool {
        let mut inner = self.inner.lock();
        if !token.is_current() || !inner.references_block(key) {
            return false;
        }
        inner.failed.insert(key.clone())
    }

    pub fn has_failed(&self, key: &BlockKey) -> bool {
        self.inner.lock().failed.contains(key)
    }

    // ------------------------------------------------------------------
    // Talk audio
    // ------------------------------------------------------------------

    pub fn commit_line(&self, token: &SessionToken, key: LineKey, audio: PreparedAudio) -> bool {
        let mut inner = self.inner.lock();
        if !token.is_current() || !inner.references_block(&key.block) {
            return false;
        }
        inner.lines.insert(key, audio);
        true
    }

    pub fn line(&self, key: &LineKey) -> Option<PreparedAudio> {
        self.inner.lock().lines.get(key).cloned()
    }

    pub fn commit_batch(&self, token: &SessionToken, key: BlockKey, audio: Bytes) -> bool {
        let mut inner = self.inner.lock();
        if !token.is_current() || !inner.references_block(&key) {
            return false;
        }
        inner.batches.insert(key, audio);
        true
    }

    pub fn batch(&self, key: &BlockKey) -> Option<Bytes> {
        self.inner.lock().batches.get(key).cloned()
    }

    // ------------------------------------------------------------------
    // Music
    // ------------------------------------------------------------------

    pub fn commit_track(&self, token: &SessionToken, query: &str, track: Track) -> bool {
        let mut inner = self.inner.lock();
        if !token.is_current() || !inner.references_query(query) {
            return false;
        }
        inner.tracks.insert(query.to_string(), track);
        true
    }

    pub fn track(&self, query: &str) -> Option<Track> {
        self.inner.lock().tracks.get(query).cloned()
    }

    pub fn commit_lyrics(&self, token: &SessionToken, query: &str, lyrics: String) -> bool {
        let mut inner = self.inner.lock();
        if !token.is_current() || !inner.references_query(query) {
            return false;
        }
        inner.lyrics.insert(query.to_string(), lyrics);
        true
    }

    pub fn lyrics(&self, query: &str) -> Option<String> {
        self.inner.lock().lyrics.get(query).cloned()
    }

    pub fn commit_url(&self, token: &SessionToken, query: &str, url: String) -> bool {
        let mut inner = self.inner.lock();
        if !token.is_current() || !inner.references_query(query) {
            return false;
        }
        inner.urls.insert(
            query.to_string(),
            UrlEntry {
                url,
                cached_at: Instant::now(),
            },
        );
        true
    }

    /// Classify the cached URL for `query`; an expired entry is removed
    pub fn url_freshness(&self, query: &str, ttl: Duration, renew_threshold: Duration) -> UrlFreshness {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.urls.get(query) else {
            return UrlFreshness::Missing;
        };
        let age = entry.cached_at.elapsed();
        if age >= ttl {
            inner.urls.remove(query);
            return UrlFreshness::Expired;
        }
        let remaining = ttl - age;
        if remaining < renew_threshold {
            UrlFreshness::Renew(entry.url.clone())
        } else {
            UrlFreshness::Fresh(entry.url.clone())
        }
    }

    pub fn commit_media(&self, token: &SessionToken, query: &str, bytes: Bytes) -> bool {
        let mut inner = self.inner.lock();
        if !token.is_current() || !inner.references_query(query) {
            return false;
        }
        inner.media.insert(query.to_string(), bytes);
        true
    }

    pub fn media(&self, query: &str) -> Option<Bytes> {
        self.inner.lock().media.get(query).cloned()
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            talk_lines: inner.lines.len(),
            talk_batches: inner.batches.len(),
            tracks: inner.tracks.len(),
            urls: inner.urls.len(),
            media: inner.media.len(),
            in_progress: inner.in_progress.len(),
            failed: inner.failed.len(),
        }
    }

    /// Every query with a metadata, URL or media entry
    pub fn cached_queries(&self) -> HashSet<String> {
        let inner = self.inner.lock();
        inner
            .tracks
            .keys()
            .chain(inner.lyrics.keys())
            .chain(inner.urls.keys())
            .chain(inner.media.keys())
            .cloned()
            .collect()
    }

    /// Every timeline id with talk audio or preparation state
    pub fn cached_timelines(&self) -> HashSet<String> {
        let inner = self.inner.lock();
        inner
            .lines
            .keys()
            .map(|k| &k.block.timeline_id)
            .chain(inner.batches.keys().map(|k| &k.timeline_id))
            .chain(inner.in_progress.iter().map(|k| &k.timeline_id))
            .chain(inner.failed.iter().map(|k| &k.timeline_id))
            .cloned()
            .collect()
    }
}
