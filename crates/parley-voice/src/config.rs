//! Pipeline configuration: built-in defaults, an optional TOML file and `PARLEY__*` env overrides.
//!
//! | Source | Example |
//! |--------|---------|
//! | defaults | `PipelineConfig::default()` |
//! | file | `PARLEY_CONFIG` path, else `config/parley.toml` (skipped when missing) |
//! | env | `PARLEY__SEGMENTER__MIN_SENTENCE_CHARS=15`, `PARLEY__PLAYBACK__START_THRESHOLD=2` |
//!
//! Chat API key: `chat.api_key`, else `PARLEY_CHAT_API_KEY`, else `OPENAI_API_KEY`.

use crate::error::VoiceResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/parley.toml";

/// Sentence segmentation policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Candidates shorter than this (trimmed, in chars) stay buffered. 0 disables the check.
    pub min_sentence_chars: usize,
    /// Buffer length that forces a break when no boundary was found.
    pub max_buffer_chars: usize,
    /// A forced break prefers the last whitespace before this many chars.
    pub soft_break_chars: usize,
    /// Silence after the last delta that ends the pass.
    pub inactivity_timeout_ms: u64,
    /// Wait allowed for the very first delta (model time-to-first-token).
    pub first_delta_timeout_ms: u64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_sentence_chars: 5,
            max_buffer_chars: 150,
            soft_break_chars: 120,
            inactivity_timeout_ms: 1500,
            first_delta_timeout_ms: 30_000,
        }
    }
}

impl SegmenterConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.inactivity_timeout_ms)
    }

    pub fn first_delta_timeout(&self) -> Duration {
        Duration::from_millis(self.first_delta_timeout_ms)
    }
}

/// Playback queue policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Pending clips required before an idle queue starts playing (1 = start on first clip).
    pub start_threshold: usize,
    /// Pause between a finished clip and the next one.
    pub inter_clip_delay_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            start_threshold: 1,
            inter_clip_delay_ms: 150,
        }
    }
}

impl PlaybackConfig {
    pub fn inter_clip_delay(&self) -> Duration {
        Duration::from_millis(self.inter_clip_delay_ms)
    }
}

/// Chat completion endpoint (OpenAI-compatible).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Base URL without trailing slash; `/chat/completions` is appended.
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
    pub api_key: Option<String>,
    /// Request a token stream (SSE) instead of one complete response.
    pub stream: bool,
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/v1".to_string(),
            model: "kimi-k2".to_string(),
            system_prompt: "You are a helpful assistant. Respond naturally and concisely.".to_string(),
            api_key: None,
            stream: true,
            timeout_secs: 60,
        }
    }
}

impl ChatConfig {
    /// Configured key, else `PARLEY_CHAT_API_KEY`, else `OPENAI_API_KEY`. Blank keys count as unset.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("PARLEY_CHAT_API_KEY").ok())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

/// Text-to-speech endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Base URL of the TTS server; generated media paths are resolved against it.
    /// Empty means no TTS server (placeholder clips).
    pub base_url: String,
    pub model: String,
    pub default_voice: String,
    pub default_emotion: String,
    pub timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            model: "gpt-4o-mini-tts".to_string(),
            default_voice: "nova".to_string(),
            default_emotion: "neutral".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub segmenter: SegmenterConfig,
    pub playback: PlaybackConfig,
    pub chat: ChatConfig,
    pub synthesis: SynthesisConfig,
}

impl PipelineConfig {
    /// Load from `PARLEY_CONFIG` (or `config/parley.toml`) and the environment.
    pub fn load() -> VoiceResult<Self> {
        let path = std::env::var("PARLEY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Some(Path::new(&path)))
    }

    /// Load with an explicit file. A missing file is skipped; a malformed one is an error.
    pub fn load_from(path: Option<&Path>) -> VoiceResult<Self> {
        let defaults = config::Config::try_from(&PipelineConfig::default())?;
        let builder = config::Config::builder().add_source(defaults);

        let builder = match path {
            Some(p) if p.exists() => builder.add_source(config::File::from(p)),
            _ => builder,
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("PARLEY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: PipelineConfig = built.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the segmenter or queue cannot honor.
    pub fn validate(&self) -> VoiceResult<()> {
        use crate::error::VoiceError;

        let seg = &self.segmenter;
        if seg.max_buffer_chars == 0 {
            return Err(VoiceError::Config("segmenter.max_buffer_chars must be > 0".to_string()));
        }
        if seg.soft_break_chars > seg.max_buffer_chars {
            return Err(VoiceError::Config(format!(
                "segmenter.soft_break_chars ({}) must not exceed max_buffer_chars ({})",
                seg.soft_break_chars, seg.max_buffer_chars
            )));
        }
        if self.playback.start_threshold == 0 {
            return Err(VoiceError::Config("playback.start_threshold must be >= 1".to_string()));
        }
        Ok(())
    }
}
