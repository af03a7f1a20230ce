//! Configuration loading and config file resolution
//!
//! The config file is TOML; every section and field has a compiled default,
//! so an empty or missing file yields a working configuration.
//!
//! Resolution priority for the config file path:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`AIRWAVE_CONFIG`)
//! 3. Platform config directory (`<config_dir>/airwave/config.toml`)
//! 4. Compiled defaults (no file)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "AIRWAVE_CONFIG";

/// Upper bound for the pause/skip poll interval (reaction-time contract)
pub const MAX_POLL_INTERVAL_MS: u64 = 150;

/// Top-level director configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorConfig {
    pub show: ShowConfig,
    pub preload: PreloadConfig,
    pub media: MediaConfig,
    pub speech: SpeechConfig,
    pub playback: PlaybackConfig,
    pub generator: GeneratorConfig,
    pub server: ServerConfig,
    pub persistence: PersistenceConfig,
}

/// Show content settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowConfig {
    /// Theme handed to the content generator
    pub theme: Option<String>,
    /// Requested length of each generated timeline
    pub target_duration_sec: u64,
    /// Narration played over warmup music on the first run
    pub greeting_text: String,
    pub greeting_speaker: String,
    /// Background music for the warmup sequence
    pub warmup_music_query: Option<String>,
    /// Narration played while a timeline is generated on the slow path
    pub filler_text: String,
    /// Audio file played between timelines
    pub transition_cue_path: Option<PathBuf>,
}

/// Prefetch and readiness settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloadConfig {
    /// Blocks ahead of the cursor kept prepared
    pub preload_count: usize,
    pub worker_interval_ms: u64,
    pub first_block_timeout_ms: u64,
    pub block_ready_timeout_ms: u64,
    /// Floor for the delay before the next timeline is requested
    pub next_timeline_min_delay_sec: u64,
    /// Share of the next timeline's blocks prepared before it is marked ready
    pub next_prefetch_ratio: f32,
    /// Concurrent prepare tasks while double-buffering
    pub max_concurrent_prepares: usize,
}

/// Media provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Lifetime of a resolved media URL
    pub url_ttl_sec: u64,
    /// Remaining lifetime below which a URL is re-resolved proactively
    pub url_renew_threshold_sec: u64,
    pub bitrate: u32,
    /// Catalog source name passed to the media provider
    pub source: String,
}

/// Speech synthesis policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Talk blocks with at most this many speakers are synthesized as one batch
    pub batch_max_speakers: usize,
}

/// Playback timing and mixing defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Pause/skip poll interval; at most [`MAX_POLL_INTERVAL_MS`]
    pub poll_interval_ms: u64,
    /// Delay before retrying after a failed scheduler iteration
    pub error_backoff_ms: u64,
    pub music_volume: f32,
    pub music_fade_out_ms: u64,
    /// Warmup-to-content crossfade
    pub crossfade_ms: u64,
    pub duck_volume: f32,
    pub duck_fade_ms: u64,
    /// Delay between music start and its intro narration
    pub intro_delay_ms: u64,
    /// Gap used when no transition cue file is configured
    pub transition_gap_ms: u64,
}

/// Content generator selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub dialect: GeneratorDialect,
    /// Chat completion endpoint (base URL for the chosen dialect)
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Directory of timeline JSON files for the scripted generator
    pub scripted_dir: Option<PathBuf>,
    pub request_timeout_sec: u64,
    pub temperature: f32,
}

/// Request/response dialect of the content generator backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorDialect {
    /// OpenAI-compatible `/chat/completions`
    OpenAi,
    /// Google Gemini `generateContent`
    Gemini,
    /// Timeline JSON files from disk
    Scripted,
}

/// HTTP control surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

/// Snapshot persistence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// SQLite database for session snapshots (None disables persistence)
    pub snapshot_db: Option<PathBuf>,
}

impl Default for ShowConfig {
    fn default() -> Self {
        Self {
            theme: None,
            target_duration_sec: 600,
            greeting_text: "Welcome back to the show. Settle in, we're just getting started.".to_string(),
            greeting_speaker: "host".to_string(),
            warmup_music_query: None,
            filler_text: "Stay with us, more is on the way.".to_string(),
            transition_cue_path: None,
        }
    }
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            preload_count: 3,
            worker_interval_ms: 2000,
            first_block_timeout_ms: 15_000,
            block_ready_timeout_ms: 10_000,
            next_timeline_min_delay_sec: 30,
            next_prefetch_ratio: 0.5,
            max_concurrent_prepares: 3,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            url_ttl_sec: 20 * 60,
            url_renew_threshold_sec: 5 * 60,
            bitrate: 320_000,
            source: "default".to_string(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self { batch_max_speakers: 2 }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            error_backoff_ms: 5000,
            music_volume: 0.8,
            music_fade_out_ms: 2000,
            crossfade_ms: 3000,
            duck_volume: 0.3,
            duck_fade_ms: 500,
            intro_delay_ms: 2000,
            transition_gap_ms: 800,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            dialect: GeneratorDialect::Scripted,
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "AIRWAVE_API_KEY".to_string(),
            scripted_dir: Some(PathBuf::from("timelines")),
            request_timeout_sec: 120,
            temperature: 0.9,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 5760,
        }
    }
}

impl PreloadConfig {
    pub fn worker_interval(&self) -> Duration {
        Duration::from_millis(self.worker_interval_ms)
    }

    pub fn first_block_timeout(&self) -> Duration {
        Duration::from_millis(self.first_block_timeout_ms)
    }

    pub fn block_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.block_ready_timeout_ms)
    }

    pub fn next_timeline_min_delay(&self) -> Duration {
        Duration::from_secs(self.next_timeline_min_delay_sec)
    }
}

impl MediaConfig {
    pub fn url_ttl(&self) -> Duration {
        Duration::from_secs(self.url_ttl_sec)
    }

    pub fn url_renew_threshold(&self) -> Duration {
        Duration::from_secs(self.url_renew_threshold_sec)
    }
}

impl PlaybackConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

impl DirectorConfig {
    /// Load configuration, resolving the file path by priority
    ///
    /// A missing file at the platform default location is not an error
    /// (defaults are used); a missing file named explicitly is.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let config = match resolve_config_path(cli_path, CONFIG_ENV_VAR) {
            ConfigSource::Explicit(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!("Config file not found: {}", path.display())));
                }
                Self::from_file(&path)?
            }
            ConfigSource::Default(path) if path.exists() => Self::from_file(&path)?,
            ConfigSource::Default(path) => {
                warn!("No config file at {}, using compiled defaults", path.display());
                Self::default()
            }
            ConfigSource::None => {
                warn!("No config directory available, using compiled defaults");
                Self::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.preload.preload_count == 0 {
            return Err(Error::Config("preload.preload_count must be at least 1".to_string()));
        }
        if self.preload.max_concurrent_prepares == 0 {
            return Err(Error::Config("preload.max_concurrent_prepares must be at least 1".to_string()));
        }
        if !(self.preload.next_prefetch_ratio > 0.0 && self.preload.next_prefetch_ratio <= 1.0) {
            return Err(Error::Config("preload.next_prefetch_ratio must be in (0, 1]".to_string()));
        }
        if self.media.url_renew_threshold_sec >= self.media.url_ttl_sec {
            return Err(Error::Config(
                "media.url_renew_threshold_sec must be below media.url_ttl_sec".to_string(),
            ));
        }
        if self.playback.poll_interval_ms == 0 || self.playback.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(Error::Config(format!(
                "playback.poll_interval_ms must be in 1..={}",
                MAX_POLL_INTERVAL_MS
            )));
        }
        for (name, volume) in [
            ("playback.music_volume", self.playback.music_volume),
            ("playback.duck_volume", self.playback.duck_volume),
        ] {
            if !(0.0..=1.0).contains(&volume) {
                return Err(Error::Config(format!("{} must be in 0.0-1.0", name)));
            }
        }
        if self.generator.dialect == GeneratorDialect::Scripted && self.generator.scripted_dir.is_none() {
            return Err(Error::Config(
                "generator.scripted_dir is required for the scripted dialect".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the config file path came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Named by CLI argument or environment variable
    Explicit(PathBuf),
    /// Platform default location
    Default(PathBuf),
    /// No config directory on this platform
    None,
}

/// Resolve the config file path by priority (CLI → env → platform default)
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> ConfigSource {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return ConfigSource::Explicit(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return ConfigSource::Explicit(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    match dirs::config_dir() {
        Some(dir) => ConfigSource::Default(dir.join("airwave").join("config.toml")),
        None => ConfigSource::None,
    }
}
