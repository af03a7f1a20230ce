//! Warmup, filler and transition audio

use super::core::ShowScheduler;
use crate::error::{Error, Result};
use crate::providers::{Channel, MusicSource, VoiceOptions};
use crate::state::{ExecutionContext, SessionToken};
use airwave_common::events::DirectorPhase;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

impl ShowScheduler {
    /// Greeting over background music while the first timeline is generated
    ///
    /// Waits (bounded) for the first block, then fades the warmup bed out.
    pub(super) async fn first_run(&self, token: &SessionToken) -> Result<Arc<ExecutionContext>> {
        self.state.set_phase(DirectorPhase::WarmingUp);
        info!("Warmup started");

        let (_, timeline) = tokio::join!(self.play_warmup(token), self.request_timeline(token));
        let timeline = timeline?;
        let context = self.install(token, timeline)?;

        let timeout = self.config.preload.first_block_timeout();
        if !self
            .preload
            .wait_for_first_block(token, context.timeline(), timeout)
            .await
        {
            debug!("Starting content before block 0 is ready");
        }
        token.ensure_current()?;

        self.end_warmup().await;
        Ok(context)
    }

    /// Start the warmup bed and narrate the greeting over it
    ///
    /// Both start together; the bed gets at most `first_block_timeout` to
    /// resolve, after which the greeting plays on its own.
    async fn play_warmup(&self, token: &SessionToken) {
        tokio::join!(self.start_warmup_music(token), self.play_greeting(token));
    }

    async fn start_warmup_music(&self, token: &SessionToken) {
        let Some(query) = &self.config.show.warmup_music_query else {
            return;
        };
        let limit = self.config.preload.first_block_timeout();
        let url = match tokio::time::timeout(limit, self.warmup_music_url(token, query)).await {
            Ok(Ok(url)) => url,
            Ok(Err(e)) => {
                warn!("Warmup music unavailable: {}", e);
                return;
            }
            Err(_) => {
                warn!("Warmup music '{}' not resolved within {:?}, skipping", query, limit);
                return;
            }
        };
        if !token.is_current() {
            return;
        }

        let output = &self.providers.output;
        output.set_volume(Channel::Music, self.config.playback.duck_volume);
        if !output.play_music(MusicSource::Url(url), true).await {
            warn!("Warmup music failed to start");
        }
    }

    async fn play_greeting(&self, token: &SessionToken) {
        let greeting = self.config.show.greeting_text.trim();
        if greeting.is_empty() {
            return;
        }
        let speaker = &self.config.show.greeting_speaker;
        match self
            .providers
            .synthesizer
            .synthesize(greeting, speaker, &VoiceOptions::default())
            .await
        {
            Ok(audio) if token.is_current() => {
                self.providers.output.play_voice(audio).await;
            }
            Ok(_) => {}
            Err(e) => warn!("Greeting synthesis failed: {}", e),
        }
    }

    /// Warmup music is played live; it is not part of any timeline
    async fn warmup_music_url(&self, token: &SessionToken, query: &str) -> Result<String> {
        let track = self
            .providers
            .media
            .search(query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Media(format!("no results for '{}'", query)))?;
        token.ensure_current()?;
        self.providers
            .media
            .resolve_url(&track.id, self.config.media.bitrate, &track.source)
            .await
    }

    /// Fade the warmup bed out ahead of the first block
    async fn end_warmup(&self) {
        let output = &self.providers.output;
        if output.is_playing(Channel::Music) {
            let crossfade = Duration::from_millis(self.config.playback.crossfade_ms);
            output.fade(Channel::Music, 0.0, crossfade).await;
            output.stop(Channel::Music);
        }
        output.set_volume(Channel::Music, self.config.playback.music_volume);
        info!("Warmup finished");
    }

    /// Narration covering a generation wait
    pub(super) async fn play_filler(&self, token: &SessionToken) {
        let text = self.config.show.filler_text.trim();
        if text.is_empty() || !token.is_current() {
            return;
        }
        let speaker = &self.config.show.greeting_speaker;
        match self
            .providers
            .synthesizer
            .synthesize(text, speaker, &VoiceOptions::default())
            .await
        {
            Ok(audio) if token.is_current() => {
                self.providers.output.play_voice(audio).await;
            }
            Ok(_) => {}
            Err(e) => warn!("Filler synthesis failed: {}", e),
        }
    }

    /// Short cue between two timelines: the configured clip, or a gap
    pub(super) async fn play_transition_cue(&self, token: &SessionToken) -> Result<()> {
        if let Some(path) = &self.config.show.transition_cue_path {
            match tokio::fs::read(path).await {
                Ok(cue) => {
                    token.ensure_current()?;
                    self.providers.output.play_voice(cue.into()).await;
                    return token.ensure_current();
                }
                Err(e) => warn!("Transition cue {} unreadable: {}", path.display(), e),
            }
        }

        tokio::time::sleep(Duration::from_millis(self.config.playback.transition_gap_ms)).await;
        token.ensure_current()
    }
}
