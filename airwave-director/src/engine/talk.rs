//! Talk block executor
//!
//! A batched clip plays as one unit. Otherwise lines play one by one while
//! the next line is fetched in the background (cache first, then one live
//! synthesis attempt), so consecutive lines follow without a gap. A line
//! with no audio is skipped; the block carries on.

use super::core::{ExecutionEngine, Step};
use crate::cache::{BlockKey, LineKey, MediaCache, PreparedAudio};
use crate::preload::voice_options;
use crate::providers::{Channel, SpeechSynthesizer};
use crate::state::SessionToken;
use airwave_common::events::{DirectorEvent, SpokenLine};
use airwave_common::{BackgroundMusicDirective, Block, DuckAction, ScriptLine, TalkBlock};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Audio for one line: cached clip, or a single live synthesis
async fn fetch_line(
    cache: Arc<MediaCache>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    key: LineKey,
    line: ScriptLine,
) -> Option<Bytes> {
    if let Some(PreparedAudio::Ready(audio)) = cache.line(&key) {
        return Some(audio);
    }

    debug!("Live synthesis for {} line {}", key.block.block_id, key.line);
    match synthesizer
        .synthesize(&line.text, &line.speaker, &voice_options(&line))
        .await
    {
        Ok(audio) => Some(audio),
        Err(e) => {
            warn!("Skipping {} line {}: {}", key.block.block_id, key.line, e);
            None
        }
    }
}

/// Music state to put back after a ducked talk block
enum DuckRestore {
    Volume(f32, Duration),
    Resume,
    Level(f32),
}

impl ExecutionEngine {
    pub(super) async fn execute_talk(
        &self,
        token: &SessionToken,
        timeline_id: &str,
        block: &Block,
        talk: &TalkBlock,
    ) -> Step {
        let key = BlockKey::new(timeline_id, &block.id);

        let restore = match &talk.background_music {
            Some(directive) => Some(self.duck_music(token, directive).await?),
            None => None,
        };

        let result = self.play_talk(token, &key, talk).await;

        if let Some(restore) = restore {
            if token.is_current() {
                self.restore_music(restore).await;
            }
        }
        result
    }

    async fn play_talk(&self, token: &SessionToken, key: &BlockKey, talk: &TalkBlock) -> Step {
        if let Some(batch) = self.preload.cache().batch(key) {
            self.wait_while_paused(token).await?;
            self.state.emit(DirectorEvent::TalkBatch {
                block_id: key.block_id.clone(),
                lines: talk
                    .scripts
                    .iter()
                    .map(|line| SpokenLine {
                        speaker: line.speaker.clone(),
                        text: line.text.clone(),
                    })
                    .collect(),
                timestamp: chrono::Utc::now(),
            });
            self.until_interrupted(token, self.output.play_voice(batch)).await?;
            return self.check(token);
        }

        let mut lookahead: Option<JoinHandle<Option<Bytes>>> = None;
        let result = self.play_lines(token, key, talk, &mut lookahead).await;
        if let Some(handle) = lookahead {
            handle.abort();
        }
        result
    }

    async fn play_lines(
        &self,
        token: &SessionToken,
        key: &BlockKey,
        talk: &TalkBlock,
        lookahead: &mut Option<JoinHandle<Option<Bytes>>>,
    ) -> Step {
        for (index, line) in talk.scripts.iter().enumerate() {
            self.wait_while_paused(token).await?;

            let audio = match lookahead.take() {
                Some(handle) => self.until_interrupted(token, handle).await?.ok().flatten(),
                None => {
                    let fetch = fetch_line(
                        Arc::clone(self.preload.cache()),
                        Arc::clone(&self.synthesizer),
                        key.line(index),
                        line.clone(),
                    );
                    self.until_interrupted(token, fetch).await?
                }
            };
            self.check(token)?;

            // Synthesize line i+1 while line i plays
            if let Some(next) = talk.scripts.get(index + 1) {
                *lookahead = Some(tokio::spawn(fetch_line(
                    Arc::clone(self.preload.cache()),
                    Arc::clone(&self.synthesizer),
                    key.line(index + 1),
                    next.clone(),
                )));
            }

            match audio {
                Some(audio) => {
                    self.state.emit(DirectorEvent::TalkLine {
                        block_id: key.block_id.clone(),
                        line_index: index,
                        speaker: line.speaker.clone(),
                        text: line.text.clone(),
                        timestamp: chrono::Utc::now(),
                    });
                    if !self.until_interrupted(token, self.output.play_voice(audio)).await? {
                        warn!("Output rejected {} line {}", key.block_id, index);
                    }
                }
                None => {
                    self.state.report_error(
                        format!("No audio for line {} of {}", index, key.block_id),
                        Some(key.block_id.clone()),
                    );
                }
            }
            self.check(token)?;

            if let Some(pause_ms) = line.pause_ms.filter(|ms| *ms > 0) {
                self.sleep_playing(token, Duration::from_millis(pause_ms)).await?;
            }
        }
        Ok(())
    }

    /// Apply a background-music directive; returns how to undo it
    async fn duck_music(&self, token: &SessionToken, directive: &BackgroundMusicDirective) -> Step<DuckRestore> {
        let playback = &self.config.playback;
        let previous = self.output.volume(Channel::Music);
        let fade = Duration::from_millis(directive.fade_ms.unwrap_or(playback.duck_fade_ms));

        let restore = match directive.action {
            DuckAction::Duck => {
                let target = directive.volume.unwrap_or(playback.duck_volume);
                self.until_interrupted(token, self.output.fade(Channel::Music, target, fade))
                    .await?;
                DuckRestore::Volume(previous, fade)
            }
            DuckAction::Pause => {
                self.output.pause(Channel::Music);
                DuckRestore::Resume
            }
            DuckAction::Continue => {
                if let Some(volume) = directive.volume {
                    self.output.set_volume(Channel::Music, volume);
                }
                DuckRestore::Level(previous)
            }
        };
        Ok(restore)
    }

    async fn restore_music(&self, restore: DuckRestore) {
        match restore {
            DuckRestore::Volume(volume, fade) => self.output.fade(Channel::Music, volume, fade).await,
            DuckRestore::Resume => self.output.resume(Channel::Music),
            DuckRestore::Level(volume) => self.output.set_volume(Channel::Music, volume),
        }
    }
}
