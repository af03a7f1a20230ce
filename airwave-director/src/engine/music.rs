//! Music and music-control executors
//!
//! Music starts from the downloaded payload when there is one, otherwise
//! from a freshly resolved stream URL; if neither works the block is
//! skipped with an error. A block without a duration leaves its track
//! looping as a bed for the following blocks.

use super::core::{ExecutionEngine, Interrupt, Step};
use crate::error::Error;
use crate::providers::{Channel, MusicSource, VoiceOptions};
use crate::state::SessionToken;
use airwave_common::events::DirectorEvent;
use airwave_common::{Block, IntroLine, MusicBlock, MusicControlAction, MusicControlBlock};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

impl ExecutionEngine {
    pub(super) async fn execute_music(&self, token: &SessionToken, block: &Block, music: &MusicBlock) -> Step {
        let query = music.search_query.as_str();
        let volume = self.config.playback.music_volume;
        let looped = music.duration_sec.is_none();
        let fade_in = music.fade_in_ms.filter(|ms| *ms > 0).map(Duration::from_millis);

        self.cancel_music_ramp();
        self.output
            .set_volume(Channel::Music, if fade_in.is_some() { 0.0 } else { volume });

        let Some(cached) = self.start_music(token, block, query, looped).await? else {
            self.output.set_volume(Channel::Music, volume);
            return Ok(());
        };
        let started = Instant::now();

        let cache = self.preload.cache();
        self.state.emit(DirectorEvent::MusicStarted {
            block_id: block.id.clone(),
            query: query.to_string(),
            track: cache.track(query).map(|t| t.display_name()),
            lyrics: cache.lyrics(query),
            cached,
            timestamp: chrono::Utc::now(),
        });

        if let Some(fade_in) = fade_in {
            let output = Arc::clone(&self.output);
            let ramp = tokio::spawn(async move { output.fade(Channel::Music, volume, fade_in).await });
            *self.music_ramp.lock() = Some(ramp);
        }

        if let Some(intro) = &music.intro {
            self.sleep_playing(token, Duration::from_millis(self.config.playback.intro_delay_ms))
                .await?;
            self.play_intro(token, block, intro).await?;
        }

        let Some(duration_sec) = music.duration_sec else {
            debug!("'{}' continues as a looping bed", query);
            return Ok(());
        };

        let remaining = Duration::from_secs(duration_sec).saturating_sub(started.elapsed());
        self.sleep_playing(token, remaining).await?;

        self.cancel_music_ramp();
        let fade_out = Duration::from_millis(self.config.playback.music_fade_out_ms);
        self.until_interrupted(token, self.output.fade(Channel::Music, 0.0, fade_out))
            .await?;
        self.output.stop(Channel::Music);
        self.output.set_volume(Channel::Music, volume);
        Ok(())
    }

    /// Start the track; `Some(cached)` once audible, `None` if every source failed
    async fn start_music(&self, token: &SessionToken, block: &Block, query: &str, looped: bool) -> Step<Option<bool>> {
        if let Some(bytes) = self.preload.cache().media(query) {
            self.check(token)?;
            if self.output.play_music(MusicSource::Bytes(bytes), looped).await {
                info!("Playing '{}' from cache", query);
                return Ok(Some(true));
            }
            warn!("Cached payload for '{}' failed to play, trying live stream", query);
        }

        let url = match self
            .until_interrupted(token, self.preload.ensure_fresh_url(token, query))
            .await?
        {
            Ok(url) => url,
            Err(Error::SessionExpired(_)) => return Err(Interrupt::Stop),
            Err(e) => {
                self.state
                    .report_error(format!("Music '{}' unavailable: {}", query, e), Some(block.id.clone()));
                return Ok(None);
            }
        };

        self.check(token)?;
        if self.output.play_music(MusicSource::Url(url), looped).await {
            info!("Streaming '{}'", query);
            Ok(Some(false))
        } else {
            self.state
                .report_error(format!("Music '{}' failed to start", query), Some(block.id.clone()));
            Ok(None)
        }
    }

    /// Narrate over the music with the bed ducked
    async fn play_intro(&self, token: &SessionToken, block: &Block, intro: &IntroLine) -> Step {
        let options = VoiceOptions {
            mood: intro.mood.clone(),
            ..VoiceOptions::default()
        };
        let audio = match self
            .until_interrupted(token, self.synthesizer.synthesize(&intro.text, &intro.speaker, &options))
            .await?
        {
            Ok(audio) => audio,
            Err(e) => {
                warn!("Intro for {} skipped: {}", block.id, e);
                return Ok(());
            }
        };
        self.wait_while_paused(token).await?;

        let playback = &self.config.playback;
        let duck_fade = Duration::from_millis(playback.duck_fade_ms);
        self.until_interrupted(token, self.output.fade(Channel::Music, playback.duck_volume, duck_fade))
            .await?;
        self.state.emit(DirectorEvent::TalkLine {
            block_id: block.id.clone(),
            line_index: 0,
            speaker: intro.speaker.clone(),
            text: intro.text.clone(),
            timestamp: chrono::Utc::now(),
        });
        self.until_interrupted(token, self.output.play_voice(audio)).await?;
        self.until_interrupted(token, self.output.fade(Channel::Music, playback.music_volume, duck_fade))
            .await?;
        Ok(())
    }

    pub(super) async fn execute_control(&self, token: &SessionToken, control: &MusicControlBlock) -> Step {
        let playback = &self.config.playback;
        let fade = Duration::from_millis(control.fade_duration_ms.unwrap_or(playback.music_fade_out_ms));
        debug!("Music control: {:?}", control.action);
        if !matches!(control.action, MusicControlAction::Pause | MusicControlAction::Resume) {
            self.cancel_music_ramp();
        }

        match control.action {
            MusicControlAction::Pause => self.output.pause(Channel::Music),
            MusicControlAction::Resume => self.output.resume(Channel::Music),
            MusicControlAction::FadeIn => {
                let target = control.target_volume.unwrap_or(playback.music_volume);
                self.until_interrupted(token, self.output.fade(Channel::Music, target, fade))
                    .await?;
            }
            MusicControlAction::FadeOut => {
                let target = control.target_volume.unwrap_or(0.0);
                self.until_interrupted(token, self.output.fade(Channel::Music, target, fade))
                    .await?;
            }
            MusicControlAction::Stop => {
                if control.fade_duration_ms.is_some_and(|ms| ms > 0) {
                    self.until_interrupted(token, self.output.fade(Channel::Music, 0.0, fade))
                        .await?;
                }
                self.output.stop(Channel::Music);
                self.output.set_volume(Channel::Music, playback.music_volume);
            }
        }
        self.check(token)
    }
}
