//! Preload manager integration tests
//!
//! URL freshness, session-scoped commits, exact pruning and batching policy.

mod helpers;

use airwave_common::{Block, Timeline};
use airwave_director::cache::BlockKey;
use helpers::{talk_block, EngineHarness, MockDownloader, MockMedia, MockSynthesizer};
use std::sync::Arc;
use std::time::Duration;

const QUERY: &str = "late train";

fn music_show(query: &str) -> Timeline {
    Timeline::new(
        "Music",
        vec![
            talk_block("hello", &[("host", "Here is one for the road")]),
            Block::music("track", query, Some(30)),
        ],
    )
}

#[tokio::test(start_paused = true)]
async fn test_url_renewed_near_expiry_and_replaced_after_ttl() {
    let h = EngineHarness::new(MockSynthesizer::new(), MockDownloader::new());
    let timeline = music_show(QUERY);
    let token = h.state.begin_session();
    h.cache.retain_referenced(&[&timeline]);

    let first = h.preload.ensure_fresh_url(&token, QUERY).await.unwrap();
    assert_eq!(h.media.resolves(), 1);

    // Well inside the TTL: reused
    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(h.preload.ensure_fresh_url(&token, QUERY).await.unwrap(), first);
    assert_eq!(h.media.resolves(), 1);

    // Less than the renewal threshold left: renewed
    tokio::time::advance(Duration::from_secs(15 * 60)).await;
    let renewed = h.preload.ensure_fresh_url(&token, QUERY).await.unwrap();
    assert_ne!(renewed, first);
    assert_eq!(h.media.resolves(), 2);

    // Past the TTL: replaced
    tokio::time::advance(Duration::from_secs(21 * 60)).await;
    let replaced = h.preload.ensure_fresh_url(&token, QUERY).await.unwrap();
    assert_ne!(replaced, renewed);
    assert_eq!(h.media.resolves(), 3);
    // The track metadata is searched once and reused
    assert_eq!(h.media.searches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_expired_url_never_reaches_download() {
    let h = EngineHarness::new(MockSynthesizer::new(), MockDownloader::new());
    let timeline = music_show(QUERY);
    let token = h.state.begin_session();
    h.cache.retain_referenced(&[&timeline]);

    let stale = h.preload.ensure_fresh_url(&token, QUERY).await.unwrap();
    tokio::time::advance(h.config.media.url_ttl() + Duration::from_secs(1)).await;

    h.preload.prefetch_blocks(&token, &timeline, timeline.len()).await;

    let downloaded = h.downloader.urls();
    assert_eq!(downloaded.len(), 1);
    assert_ne!(downloaded[0], stale);
    assert!(h.cache.media(QUERY).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_stale_session_commits_nothing() {
    let h = EngineHarness::with_parts(
        helpers::test_config(),
        MockSynthesizer::new(),
        MockMedia::new().with_search_delay(Duration::from_secs(1)),
        MockDownloader::new(),
    );
    let timeline = music_show(QUERY);
    let token = h.state.begin_session();
    h.cache.retain_referenced(&[&timeline]);

    let preload = Arc::clone(&h.preload);
    let stale_token = token.clone();
    let prefetch_timeline = timeline.clone();
    let prefetch = tokio::spawn(async move {
        preload
            .prefetch_blocks(&stale_token, &prefetch_timeline, prefetch_timeline.len())
            .await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    h.state.end_session();
    let next = h.state.begin_session();
    assert!(!token.is_current());
    assert!(next.is_current());
    // Reference the same timeline under the new session: only the token may reject commits
    h.cache.retain_referenced(&[&timeline]);

    prefetch.await.unwrap();

    let stats = h.cache.stats();
    assert_eq!(stats.tracks, 0);
    assert_eq!(stats.urls, 0);
    assert_eq!(stats.media, 0);
    assert_eq!(stats.failed, 0);
    assert!(h.downloader.urls().is_empty());
    let music_key = BlockKey::new(&timeline.id, "track");
    assert!(!h.cache.has_failed(&music_key));
}

#[tokio::test(start_paused = true)]
async fn test_pruning_keeps_only_referenced_timelines() {
    let h = EngineHarness::new(MockSynthesizer::new(), MockDownloader::new());
    let outgoing = music_show("first song");
    let incoming = music_show("second song");
    let token = h.state.begin_session();

    h.cache.retain_referenced(&[&outgoing]);
    h.cache.reference(&incoming);
    h.preload.prefetch_blocks(&token, &outgoing, outgoing.len()).await;
    h.preload.prefetch_blocks(&token, &incoming, incoming.len()).await;
    assert_eq!(h.cache.cached_queries().len(), 2);
    assert_eq!(h.cache.cached_timelines().len(), 2);

    h.cache.retain_referenced(&[&incoming]);

    let queries = h.cache.cached_queries();
    assert!(queries.iter().all(|q| q == "second song"), "{:?}", queries);
    assert!(!queries.is_empty());
    let timelines = h.cache.cached_timelines();
    assert!(timelines.iter().all(|id| *id == incoming.id), "{:?}", timelines);
}

#[tokio::test(start_paused = true)]
async fn test_unreferenced_timeline_is_not_cached() {
    let h = EngineHarness::new(MockSynthesizer::new(), MockDownloader::new());
    let referenced = music_show("kept");
    let stray = music_show("stray");
    let token = h.state.begin_session();
    h.cache.retain_referenced(&[&referenced]);

    h.preload.prefetch_blocks(&token, &stray, stray.len()).await;

    assert!(h.cache.cached_queries().is_empty());
    assert!(h.cache.cached_timelines().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_batch_policy_follows_speaker_count() {
    let h = EngineHarness::new(MockSynthesizer::new().with_batch(), MockDownloader::new());
    let timeline = Timeline::new(
        "Batching",
        vec![
            talk_block("duo", &[("host", "Hi"), ("guest", "Hey"), ("host", "Ready?")]),
            talk_block("trio", &[("host", "Hi"), ("guest", "Hey"), ("caller", "Hello")]),
            talk_block("solo", &[("host", "Just me")]),
        ],
    );
    let token = h.state.begin_session();
    h.cache.retain_referenced(&[&timeline]);

    h.preload.prefetch_blocks(&token, &timeline, timeline.len()).await;

    let key = |id: &str| BlockKey::new(&timeline.id, id);
    assert!(h.cache.batch(&key("duo")).is_some());
    assert!(h.cache.batch(&key("trio")).is_none());
    assert!(h.cache.batch(&key("solo")).is_none());
    assert_eq!(h.synthesizer.batch_calls(), 1);
    // Three lines for the trio, one for the solo
    assert_eq!(h.synthesizer.calls(), 4);

    for block in &timeline.blocks {
        assert!(h.preload.is_ready(&timeline.id, block), "block {} not ready", block.id);
    }
}

#[tokio::test(start_paused = true)]
async fn test_worker_prefetches_window_from_cursor() {
    let mut config = helpers::test_config();
    config.preload.preload_count = 2;
    let h = EngineHarness::with_parts(config, MockSynthesizer::new(), MockMedia::new(), MockDownloader::new());
    let timeline = Arc::new(Timeline::new(
        "Window",
        vec![
            talk_block("a", &[("host", "One")]),
            talk_block("b", &[("host", "Two")]),
            talk_block("c", &[("host", "Three")]),
            talk_block("d", &[("host", "Four")]),
        ],
    ));
    let token = h.state.begin_session();
    h.cache.retain_referenced(&[&timeline]);
    let context = h
        .state
        .install_timeline(Arc::clone(&timeline), &token)
        .unwrap();
    context.set_cursor(1);

    h.preload.start_worker(token.clone());
    assert!(h.preload.is_worker_running());
    tokio::time::sleep(h.config.preload.worker_interval() + Duration::from_millis(500)).await;

    let ready: Vec<bool> = timeline
        .blocks
        .iter()
        .map(|block| h.preload.is_ready(&timeline.id, block))
        .collect();
    assert_eq!(ready, vec![false, true, true, false]);

    h.preload.stop_worker();
    assert!(!h.preload.is_worker_running());
}
