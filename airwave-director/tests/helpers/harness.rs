//! Wiring for engine-level and scheduler-level tests

use super::mocks::{MockDownloader, MockGenerator, MockMedia, MockSynthesizer};
use airwave_common::config::DirectorConfig;
use airwave_common::{Block, ScriptLine, Timeline};
use airwave_director::cache::MediaCache;
use airwave_director::controller::PlaybackController;
use airwave_director::engine::ExecutionEngine;
use airwave_director::preload::PreloadManager;
use airwave_director::providers::offline::SimulatedAudioOutput;
use airwave_director::providers::Providers;
use airwave_director::state::{ExecutionContext, SessionToken};
use airwave_director::{SharedState, ShowScheduler};
use std::sync::Arc;

/// Defaults with short fades and gaps so tests run in little virtual time
pub fn test_config() -> DirectorConfig {
    let mut config = DirectorConfig::default();
    config.show.greeting_text = "Hi".to_string();
    config.show.filler_text = "One moment".to_string();
    config.preload.first_block_timeout_ms = 2000;
    config.preload.next_timeline_min_delay_sec = 1;
    config.media.source = "test".to_string();
    config.playback.music_fade_out_ms = 100;
    config.playback.crossfade_ms = 100;
    config.playback.duck_fade_ms = 50;
    config.playback.intro_delay_ms = 200;
    config.playback.transition_gap_ms = 100;
    config
}

pub fn talk_block(id: &str, lines: &[(&str, &str)]) -> Block {
    Block::talk(
        id,
        lines
            .iter()
            .map(|(speaker, text)| ScriptLine::new(*speaker, *text))
            .collect(),
    )
}

/// Short two-block show: one talk block, then a silence
pub fn show(title: &str) -> Timeline {
    let mut timeline = Timeline::new(
        title,
        vec![
            talk_block("open", &[("host", "Good evening"), ("guest", "Hello")]),
            Block::silence("breath", 500),
        ],
    );
    timeline.estimated_duration_sec = 2;
    timeline
}

/// Engine, preload manager and controller over simulated output
pub struct EngineHarness {
    pub config: Arc<DirectorConfig>,
    pub state: Arc<SharedState>,
    pub cache: Arc<MediaCache>,
    pub preload: Arc<PreloadManager>,
    pub engine: Arc<ExecutionEngine>,
    pub controller: PlaybackController,
    pub output: Arc<SimulatedAudioOutput>,
    pub synthesizer: Arc<MockSynthesizer>,
    pub media: Arc<MockMedia>,
    pub downloader: Arc<MockDownloader>,
}

impl EngineHarness {
    pub fn new(synthesizer: MockSynthesizer, downloader: MockDownloader) -> Self {
        Self::with_parts(test_config(), synthesizer, MockMedia::new(), downloader)
    }

    pub fn with_parts(
        config: DirectorConfig,
        synthesizer: MockSynthesizer,
        media: MockMedia,
        downloader: MockDownloader,
    ) -> Self {
        let config = Arc::new(config);
        let state = Arc::new(SharedState::new());
        let cache = Arc::new(MediaCache::new());
        let output = Arc::new(SimulatedAudioOutput::new());
        let synthesizer = Arc::new(synthesizer);
        let media = Arc::new(media);
        let downloader = Arc::new(downloader);

        let preload = Arc::new(PreloadManager::new(
            Arc::clone(&config),
            Arc::clone(&state),
            Arc::clone(&cache),
            synthesizer.clone(),
            media.clone(),
            downloader.clone(),
        ));
        let engine = Arc::new(ExecutionEngine::new(
            Arc::clone(&config),
            Arc::clone(&state),
            Arc::clone(&preload),
            synthesizer.clone(),
            output.clone(),
            None,
        ));
        let controller = PlaybackController::new(Arc::clone(&state), output.clone());

        Self {
            config,
            state,
            cache,
            preload,
            engine,
            controller,
            output,
            synthesizer,
            media,
            downloader,
        }
    }

    /// Start a session, make `timeline` live and prefetch its head
    pub fn load(&self, timeline: Timeline) -> (SessionToken, Arc<ExecutionContext>) {
        let timeline = Arc::new(timeline);
        let token = self.state.begin_session();
        self.cache.retain_referenced(&[&timeline]);
        let context = self
            .state
            .install_timeline(Arc::clone(&timeline), &token)
            .expect("fresh session accepts a timeline");
        self.preload.prefetch_window(&token, &timeline, 0);
        (token, context)
    }
}

/// Scheduler over mocks and simulated output
pub fn scheduler_with(
    config: DirectorConfig,
    generator: Arc<MockGenerator>,
    synthesizer: Arc<MockSynthesizer>,
) -> (Arc<ShowScheduler>, Arc<SimulatedAudioOutput>) {
    scheduler_with_media(config, generator, synthesizer, Arc::new(MockMedia::new()))
}

/// Same, with a caller-supplied catalog
pub fn scheduler_with_media(
    config: DirectorConfig,
    generator: Arc<MockGenerator>,
    synthesizer: Arc<MockSynthesizer>,
    media: Arc<MockMedia>,
) -> (Arc<ShowScheduler>, Arc<SimulatedAudioOutput>) {
    let output = Arc::new(SimulatedAudioOutput::new());
    let providers = Providers {
        generator,
        synthesizer,
        media,
        downloader: Arc::new(MockDownloader::new()),
        output: output.clone(),
        snapshots: None,
    };
    (ShowScheduler::new(config, providers), output)
}
