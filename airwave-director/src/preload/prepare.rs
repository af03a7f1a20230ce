//! Per-block preparation

use super::PreloadManager;
use crate::cache::{BlockKey, PreparedAudio};
use crate::error::{Error, Result};
use crate::providers::{BatchLine, VoiceOptions};
use crate::state::SessionToken;
use airwave_common::{Block, BlockKind, MusicBlock, ScriptLine, TalkBlock};
use tracing::{debug, warn};

/// Voice parameters for one script line
pub(crate) fn voice_options(line: &ScriptLine) -> VoiceOptions {
    VoiceOptions {
        mood: line.mood.clone(),
        style_hint: None,
        voice_override: line.voice_override.clone(),
    }
}

impl PreloadManager {
    /// Materialize `block`'s assets; failures are recorded, never returned
    pub(crate) async fn prepare_block(&self, token: &SessionToken, timeline_id: &str, block: &Block) {
        let key = BlockKey::new(timeline_id, &block.id);
        let result = match &block.kind {
            BlockKind::Talk(talk) => self.prepare_talk(token, &key, talk).await,
            BlockKind::Music(music) => self.prepare_music(token, music).await,
            BlockKind::MusicControl(_) | BlockKind::Silence(_) => Ok(()),
        };

        match result {
            Ok(()) => debug!("Prepared block {}", block.id),
            Err(Error::SessionExpired(_)) => debug!("Dropped preparation of {} from stale session", block.id),
            Err(e) => {
                warn!("Preparing block {} failed: {}", block.id, e);
                self.cache.mark_failed(token, &key);
            }
        }
    }

    /// Batched clip when the speaker count allows, otherwise one clip per line
    async fn prepare_talk(&self, token: &SessionToken, key: &BlockKey, talk: &TalkBlock) -> Result<()> {
        if self.should_batch(talk) {
            let lines: Vec<BatchLine> = talk
                .scripts
                .iter()
                .map(|line| BatchLine {
                    speaker: line.speaker.clone(),
                    text: line.text.clone(),
                    options: voice_options(line),
                })
                .collect();

            match self.synthesizer.synthesize_batch(&lines).await {
                Ok(audio) => {
                    token.ensure_current()?;
                    self.cache.commit_batch(token, key.clone(), audio);
                    return Ok(());
                }
                Err(e) => warn!("Batch synthesis for {} failed, falling back to lines: {}", key.block_id, e),
            }
        }

        for (index, line) in talk.scripts.iter().enumerate() {
            token.ensure_current()?;
            let line_key = key.line(index);
            if self.cache.line(&line_key).is_some() {
                continue;
            }

            let audio = match self
                .synthesizer
                .synthesize(&line.text, &line.speaker, &voice_options(line))
                .await
            {
                Ok(audio) => PreparedAudio::Ready(audio),
                Err(e) => {
                    warn!("Synthesis of {} line {} failed: {}", key.block_id, index, e);
                    PreparedAudio::Failed
                }
            };
            token.ensure_current()?;
            self.cache.commit_line(token, line_key, audio);
        }
        Ok(())
    }

    pub(crate) fn should_batch(&self, talk: &TalkBlock) -> bool {
        self.synthesizer.supports_batch()
            && talk.scripts.len() > 1
            && talk.unique_speakers() <= self.config.speech.batch_max_speakers
    }

    /// Search, resolve a fresh URL, download
    async fn prepare_music(&self, token: &SessionToken, music: &MusicBlock) -> Result<()> {
        let query = music.search_query.as_str();
        if self.cache.media(query).is_some() {
            return Ok(());
        }

        let url = self.ensure_fresh_url(token, query).await?;
        token.ensure_current()?;
        let bytes = self.downloader.download(&url).await?;

        token.ensure_current()?;
        self.cache.commit_media(token, query, bytes);
        Ok(())
    }
}
