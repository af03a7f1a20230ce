//! Show scheduler integration tests
//!
//! Full director over mock collaborators in virtual time: error recovery,
//! double buffering, the slow regenerate path and session teardown.

mod helpers;

use airwave_common::events::{DirectorEvent, DirectorPhase};
use airwave_common::{Block, Timeline};
use airwave_director::cache::CacheStats;
use airwave_director::providers::offline::AudioCall;
use airwave_director::Error;
use helpers::{
    scheduler_with, scheduler_with_media, show, talk_block, test_config, EventLog, MockGenerator, MockMedia,
    MockSynthesizer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn is_show_completed(event: &DirectorEvent) -> bool {
    matches!(event, DirectorEvent::ShowCompleted { .. })
}

/// Plays long enough for the next timeline to be requested and prepared
fn long_show(title: &str) -> Timeline {
    let mut timeline = Timeline::new(
        title,
        vec![
            talk_block("open", &[("host", "Welcome to the long hour")]),
            Block::silence("bed", 3000),
        ],
    );
    timeline.estimated_duration_sec = 2;
    timeline
}

#[tokio::test(start_paused = true)]
async fn test_generation_failure_backs_off_and_retries() {
    let generator = Arc::new(MockGenerator::new(show("Recovered")).then_fail("model overloaded"));
    let synthesizer = Arc::new(MockSynthesizer::new());
    let (scheduler, _output) = scheduler_with(test_config(), Arc::clone(&generator), synthesizer);
    let mut events = EventLog::new(scheduler.state());
    scheduler.state().set_user_request("play something mellow".to_string());

    scheduler.start().unwrap();
    let completed = events.wait_for(Duration::from_secs(60), is_show_completed).await;
    assert!(completed.is_some(), "show never completed after retry");

    let calls = generator.call_times();
    assert!(calls.len() >= 2);
    let gap = calls[1] - calls[0];
    assert!(gap >= scheduler.config().playback.error_backoff(), "retried after {:?}", gap);

    let errors = events.errors();
    assert_eq!(errors.len(), 1, "errors: {:?}", errors);
    assert!(errors[0].0.contains("model overloaded"));
    assert!(events.phases().contains(&DirectorPhase::Recovering));

    // The listener request survives the failed attempt
    let requests = generator.requests();
    assert_eq!(requests[0].user_request.as_deref(), Some("play something mellow"));
    assert_eq!(requests[1].user_request.as_deref(), Some("play something mellow"));

    assert!(scheduler.stop());
    scheduler.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_resets_all_session_state() {
    let generator = Arc::new(MockGenerator::new(long_show("Interrupted")));
    let synthesizer = Arc::new(MockSynthesizer::new());
    let (scheduler, _output) = scheduler_with(test_config(), generator, Arc::clone(&synthesizer));
    let mut events = EventLog::new(scheduler.state());

    let first_session = scheduler.start().unwrap();
    assert!(matches!(scheduler.start(), Err(Error::InvalidState(_))));

    events
        .wait_for(Duration::from_secs(30), |e| matches!(e, DirectorEvent::BlockStarted { index: 1, .. }))
        .await
        .expect("second block started");
    scheduler.controller().pause();

    assert!(scheduler.stop());
    scheduler.join().await;

    assert!(!scheduler.is_running());
    let status = scheduler.state().status();
    assert!(!status.running);
    assert!(!status.paused);
    assert_eq!(status.phase, DirectorPhase::Idle);
    assert_eq!((status.current, status.total), (0, 0));
    assert!(status.timeline_id.is_none());
    assert!(!status.next_timeline_ready);
    assert_eq!(scheduler.cache().stats(), CacheStats::default());
    assert!(synthesizer.aborts() >= 1);

    assert!(!scheduler.stop(), "second stop must be a no-op");

    let second_session = scheduler.start().unwrap();
    assert!(second_session > first_session);
    assert!(scheduler.stop());
    scheduler.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_prefetched_timeline_is_promoted() {
    let generator = Arc::new(MockGenerator::new(long_show("Double Buffered")));
    let synthesizer = Arc::new(MockSynthesizer::new());
    let (scheduler, _output) = scheduler_with(test_config(), Arc::clone(&generator), synthesizer);
    let mut events = EventLog::new(scheduler.state());

    scheduler.start().unwrap();

    let mut installed = Vec::new();
    while installed.len() < 2 {
        match events
            .wait_for(Duration::from_secs(30), |e| matches!(e, DirectorEvent::TimelineReady { .. }))
            .await
        {
            Some(DirectorEvent::TimelineReady { timeline_id, .. }) => installed.push(timeline_id),
            _ => panic!("timeline {} never installed", installed.len() + 1),
        }
    }

    assert_ne!(installed[0], installed[1]);
    assert!(
        !events.phases().contains(&DirectorPhase::Generating),
        "promotion must not take the regenerate path"
    );
    assert_eq!(generator.call_count(), 2);

    // Outgoing timeline pruned on promotion
    let active = scheduler.state().active_timeline().expect("active timeline");
    assert_eq!(active.id, installed[1]);
    let timelines = scheduler.cache().cached_timelines();
    assert!(!timelines.contains(&installed[0]), "{:?}", timelines);

    assert!(scheduler.stop());
    scheduler.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_short_timeline_regenerates_with_filler() {
    let generator = Arc::new(MockGenerator::new(show("Quick")));
    let synthesizer = Arc::new(MockSynthesizer::new());
    let (scheduler, output) = scheduler_with(test_config(), Arc::clone(&generator), Arc::clone(&synthesizer));
    let mut events = EventLog::new(scheduler.state());

    scheduler.start().unwrap();

    events
        .wait_for(Duration::from_secs(30), is_show_completed)
        .await
        .expect("first timeline completed");
    events
        .wait_for(Duration::from_secs(30), |e| matches!(e, DirectorEvent::TimelineReady { .. }))
        .await
        .expect("second timeline installed");

    // Next-timeline task had not started yet: regenerate path with filler
    assert!(events.phases().contains(&DirectorPhase::Generating));
    assert_eq!(synthesizer.synthesized("One moment"), 1);
    let filler_clip = AudioCall::Voice {
        bytes: "One moment".len() * helpers::mocks::BYTES_PER_CHAR,
    };
    assert!(output.calls().contains(&filler_clip), "no filler played");
    assert_eq!(generator.call_count(), 2);
    assert!(events.errors().is_empty());

    assert!(scheduler.stop());
    scheduler.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_empty_timeline_is_reported_and_retried() {
    let empty = Timeline {
        id: "empty".to_string(),
        title: "Nothing".to_string(),
        estimated_duration_sec: 0,
        blocks: Vec::new(),
    };
    let generator = Arc::new(MockGenerator::new(show("After Empty")).then_return(empty));
    let synthesizer = Arc::new(MockSynthesizer::new());
    let (scheduler, _output) = scheduler_with(test_config(), Arc::clone(&generator), synthesizer);
    let mut events = EventLog::new(scheduler.state());

    scheduler.start().unwrap();
    events
        .wait_for(Duration::from_secs(60), is_show_completed)
        .await
        .expect("show completed after retry");

    assert_eq!(events.errors().len(), 1);
    assert!(generator.call_count() >= 2);
    assert!(scheduler.stop());
    scheduler.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_slow_warmup_music_does_not_hold_back_the_show() {
    let mut config = test_config();
    config.show.warmup_music_query = Some("sunrise bed".to_string());
    let generator = Arc::new(MockGenerator::new(show("Morning")));
    let synthesizer = Arc::new(MockSynthesizer::new());
    let media = Arc::new(MockMedia::new().with_search_delay(Duration::from_secs(600)));
    let (scheduler, output) =
        scheduler_with_media(config, generator, Arc::clone(&synthesizer), Arc::clone(&media));
    let mut events = EventLog::new(scheduler.state());

    let started = Instant::now();
    scheduler.start().unwrap();
    events
        .wait_for(Duration::from_secs(60), |e| matches!(e, DirectorEvent::BlockStarted { .. }))
        .await
        .expect("first block started");

    let limit = scheduler.config().preload.first_block_timeout();
    assert!(started.elapsed() < limit * 2, "first block after {:?}", started.elapsed());
    assert_eq!(media.searches(), 1);
    assert!(output.music_started().is_empty());

    // Greeting did not wait for the bed
    assert_eq!(synthesizer.synthesized("Hi"), 1);
    let greeting = AudioCall::Voice {
        bytes: "Hi".len() * helpers::mocks::BYTES_PER_CHAR,
    };
    assert_eq!(output.calls().first(), Some(&greeting));

    assert!(scheduler.stop());
    scheduler.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_generated_timelines_get_distinct_ids() {
    let episode = |title: &str, line: &str| {
        let mut timeline = Timeline::new(
            title,
            vec![talk_block("open", &[("host", line)]), Block::silence("bed", 3000)],
        );
        timeline.id = "episode".to_string();
        timeline.estimated_duration_sec = 2;
        timeline
    };
    let generator = Arc::new(
        MockGenerator::new(long_show("Later"))
            .then_return(episode("One", "Hello from episode one"))
            .then_return(episode("Two", "Hello from episode two")),
    );
    let synthesizer = Arc::new(MockSynthesizer::new());
    let (scheduler, _output) = scheduler_with(test_config(), Arc::clone(&generator), Arc::clone(&synthesizer));

    scheduler.start().unwrap();
    let deadline = Instant::now() + Duration::from_secs(30);
    while !scheduler.state().status().next_timeline_ready {
        assert!(Instant::now() < deadline, "next timeline never became ready");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let active = scheduler.state().active_timeline().expect("active timeline");
    let pending = scheduler.state().pending_timeline().expect("pending timeline");
    assert_eq!(pending.title, "Two");
    assert_ne!(active.id, pending.id);
    assert_ne!(active.id, "episode");
    assert_ne!(pending.id, "episode");

    // The new episode's talk was prepared from its own script
    assert_eq!(synthesizer.synthesized("Hello from episode two"), 1);

    assert!(scheduler.stop());
    scheduler.join().await;
}
