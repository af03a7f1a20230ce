//! Show timeline model
//!
//! A [`Timeline`] is one episode's content plan: an ordered list of [`Block`]s
//! produced by a content generator. Timelines are immutable once normalized;
//! the director only ever reads them.
//!
//! The JSON shape matches what generators emit (camelCase fields, `type` tag
//! on each block).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

/// Rough speaking rate used when a timeline carries no duration estimate
const ESTIMATED_CHARS_PER_SECOND: u64 = 15;

/// Assumed track length for music blocks without an explicit duration
const ESTIMATED_TRACK_SECONDS: u64 = 180;

/// One episode's content plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    /// Timeline id (generated when the generator leaves it empty)
    #[serde(default)]
    pub id: String,

    /// Display title
    #[serde(default)]
    pub title: String,

    /// Generator's estimate of the total duration in seconds (0 = unknown)
    #[serde(default)]
    pub estimated_duration_sec: u64,

    /// Ordered blocks
    pub blocks: Vec<Block>,
}

/// Atomic programming unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Stable block id, used as a cache key component
    #[serde(default)]
    pub id: String,

    /// Block payload
    #[serde(flatten)]
    pub kind: BlockKind,
}

/// Block payload variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BlockKind {
    Talk(TalkBlock),
    Music(MusicBlock),
    MusicControl(MusicControlBlock),
    Silence(SilenceBlock),
}

/// Spoken dialogue, one or more lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TalkBlock {
    pub scripts: Vec<ScriptLine>,

    /// What to do with background music while the block is spoken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_music: Option<BackgroundMusicDirective>,
}

/// A single line of dialogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptLine {
    pub speaker: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_override: Option<String>,
    /// Gap after this line, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_ms: Option<u64>,
}

/// Ducking directive applied around a talk block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundMusicDirective {
    pub action: DuckAction,
    /// Target music volume for `duck`/`continue` (0.0-1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DuckAction {
    /// Fade music down to `volume` for the block, restore afterwards
    Duck,
    /// Pause music for the block, resume afterwards
    Pause,
    /// Keep music playing at `volume`
    Continue,
}

/// A music track looked up by search query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicBlock {
    pub search_query: String,
    /// Play length; `None` leaves the track running as a bed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_in_ms: Option<u64>,
    /// Narration overlaid shortly after the track starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intro: Option<IntroLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntroLine {
    pub speaker: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
}

/// Mixing directive for the music channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicControlBlock {
    pub action: MusicControlAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_volume: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MusicControlAction {
    Pause,
    Resume,
    FadeIn,
    FadeOut,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SilenceBlock {
    pub duration_ms: u64,
}

impl BlockKind {
    /// Short lowercase name, used in events and logs
    pub fn name(&self) -> &'static str {
        match self {
            BlockKind::Talk(_) => "talk",
            BlockKind::Music(_) => "music",
            BlockKind::MusicControl(_) => "musicControl",
            BlockKind::Silence(_) => "silence",
        }
    }
}

impl TalkBlock {
    /// Number of distinct speakers in the block
    pub fn unique_speakers(&self) -> usize {
        self.scripts
            .iter()
            .map(|line| line.speaker.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

impl Block {
    pub fn talk(id: impl Into<String>, scripts: Vec<ScriptLine>) -> Self {
        Self {
            id: id.into(),
            kind: BlockKind::Talk(TalkBlock {
                scripts,
                background_music: None,
            }),
        }
    }

    pub fn music(id: impl Into<String>, search_query: impl Into<String>, duration_sec: Option<u64>) -> Self {
        Self {
            id: id.into(),
            kind: BlockKind::Music(MusicBlock {
                search_query: search_query.into(),
                duration_sec,
                fade_in_ms: None,
                intro: None,
            }),
        }
    }

    pub fn silence(id: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            id: id.into(),
            kind: BlockKind::Silence(SilenceBlock { duration_ms }),
        }
    }

    pub fn control(id: impl Into<String>, action: MusicControlAction) -> Self {
        Self {
            id: id.into(),
            kind: BlockKind::MusicControl(MusicControlBlock {
                action,
                target_volume: None,
                fade_duration_ms: None,
            }),
        }
    }

    /// Search query for music blocks
    pub fn music_query(&self) -> Option<&str> {
        match &self.kind {
            BlockKind::Music(music) => Some(music.search_query.as_str()),
            _ => None,
        }
    }

    /// Rough play length of the block
    pub fn estimated_duration(&self) -> Duration {
        match &self.kind {
            BlockKind::Talk(talk) => {
                let chars: u64 = talk.scripts.iter().map(|l| l.text.chars().count() as u64).sum();
                let gaps: u64 = talk.scripts.iter().filter_map(|l| l.pause_ms).sum();
                Duration::from_secs(chars / ESTIMATED_CHARS_PER_SECOND) + Duration::from_millis(gaps)
            }
            BlockKind::Music(music) => {
                Duration::from_secs(music.duration_sec.unwrap_or(ESTIMATED_TRACK_SECONDS))
            }
            BlockKind::MusicControl(control) => {
                Duration::from_millis(control.fade_duration_ms.unwrap_or(0))
            }
            BlockKind::Silence(silence) => Duration::from_millis(silence.duration_ms),
        }
    }
}

impl ScriptLine {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            mood: None,
            voice_override: None,
            pause_ms: None,
        }
    }
}

impl Timeline {
    pub fn new(title: impl Into<String>, blocks: Vec<Block>) -> Self {
        let mut timeline = Self {
            id: String::new(),
            title: title.into(),
            estimated_duration_sec: 0,
            blocks,
        };
        timeline.normalize();
        timeline
    }

    /// Parse generator output and normalize it
    pub fn from_json(json: &str) -> Result<Self> {
        let mut timeline: Timeline = serde_json::from_str(json)?;
        timeline.normalize();
        timeline.validate()?;
        Ok(timeline)
    }

    /// Assign ids where the generator left them empty or duplicated
    pub fn normalize(&mut self) {
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }

        let mut seen = HashSet::new();
        for (index, block) in self.blocks.iter_mut().enumerate() {
            if block.id.is_empty() || seen.contains(&block.id) {
                block.id = format!("{}-{}-{}", block.kind.name(), index, &Uuid::new_v4().simple().to_string()[..8]);
            }
            seen.insert(block.id.clone());
        }
    }

    /// Reject timelines the director cannot play
    pub fn validate(&self) -> Result<()> {
        if self.blocks.is_empty() {
            return Err(Error::InvalidInput(format!("timeline '{}' has no blocks", self.title)));
        }

        for block in &self.blocks {
            match &block.kind {
                BlockKind::Talk(talk) if talk.scripts.is_empty() => {
                    return Err(Error::InvalidInput(format!("talk block {} has no lines", block.id)));
                }
                BlockKind::Music(music) if music.search_query.trim().is_empty() => {
                    return Err(Error::InvalidInput(format!("music block {} has an empty query", block.id)));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Search queries referenced by music blocks
    pub fn music_queries(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().filter_map(Block::music_query)
    }

    /// Generator estimate, or the sum of block estimates when it is missing
    pub fn estimated_duration(&self) -> Duration {
        if self.estimated_duration_sec > 0 {
            Duration::from_secs(self.estimated_duration_sec)
        } else {
            self.blocks.iter().map(Block::estimated_duration).sum()
        }
    }
}
