//! **Synthesis collaborator**: one sentence in, one playable clip locator out.
//!
//! `MediaTts` speaks to a TTS server exposing a chat-completions style endpoint that answers
//! with (or embeds) a generated `/media/<name>.wav` path; the locator is that path resolved
//! against the server's base URL.

use crate::config::SynthesisConfig;
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

static MEDIA_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"/media/[^"\s]+\.wav"#).expect("media path regex is valid"));

/// Text-to-speech backend.
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Synthesize `text` and return a locator the audio player understands.
    async fn synthesize(&self, text: &str, voice: &str, emotion: &str) -> VoiceResult<String>;
}

#[derive(Serialize)]
struct TtsMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct TtsRequest<'a> {
    model: &'a str,
    messages: [TtsMessage<'a>; 1],
    voice: &'a str,
    emotion: &'a str,
}

/// HTTP TTS client returning `<base_url>/media/<file>.wav` locators.
#[derive(Debug, Clone)]
pub struct MediaTts {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl MediaTts {
    pub fn new(config: &SynthesisConfig) -> VoiceResult<Self> {
        if config.base_url.trim().is_empty() {
            return Err(VoiceError::Config("synthesis.base_url is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    /// Resolve the first media path in a response body against the base URL.
    fn locate(&self, body: &str) -> Option<String> {
        MEDIA_PATH
            .find(body)
            .map(|m| format!("{}{}", self.base_url, m.as_str()))
    }
}

#[async_trait]
impl SynthesisBackend for MediaTts {
    async fn synthesize(&self, text: &str, voice: &str, emotion: &str) -> VoiceResult<String> {
        let request = TtsRequest {
            model: &self.model,
            messages: [TtsMessage { role: "user", content: text }],
            voice,
            emotion,
        };
        debug!(target: "parley::tts", voice, emotion, chars = text.chars().count(), "synthesis requested");

        let response = self.client.post(self.endpoint()).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error!(target: "parley::tts", status = %status, "TTS endpoint returned {}", status);
            return Err(VoiceError::Tts(format!("TTS API error {}: {}", status, body)));
        }

        match self.locate(&body) {
            Some(url) => {
                info!(target: "parley::tts", url = %url, "🗣️ clip synthesized");
                Ok(url)
            }
            None => Err(VoiceError::Tts("response carried no media path".to_string())),
        }
    }
}

/// Used when no TTS server is configured: every sentence maps to a `silent://` locator.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderSynthesis;

#[async_trait]
impl SynthesisBackend for PlaceholderSynthesis {
    async fn synthesize(&self, text: &str, voice: &str, emotion: &str) -> VoiceResult<String> {
        Ok(format!(
            "silent://{}/{}/{}",
            voice,
            emotion,
            text.chars().count()
        ))
    }
}

/// `MediaTts` when a server is configured, placeholder clips otherwise.
pub fn backend_from_config(config: &SynthesisConfig) -> VoiceResult<Arc<dyn SynthesisBackend>> {
    if config.base_url.trim().is_empty() {
        warn!(target: "parley::tts", "no synthesis.base_url configured; using placeholder clips");
        return Ok(Arc::new(PlaceholderSynthesis));
    }
    Ok(Arc::new(MediaTts::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tts(base: &str) -> MediaTts {
        MediaTts::new(&SynthesisConfig {
            base_url: base.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_locate_resolves_media_path() {
        let tts = tts("http://tts.local:9000/");
        let body = r#"{"choices":[{"message":{"content":"Audio ready: /media/abc_123.wav"}}]}"#;
        assert_eq!(tts.locate(body).as_deref(), Some("http://tts.local:9000/media/abc_123.wav"));
    }

    #[test]
    fn test_locate_without_media_path() {
        let tts = tts("http://tts.local:9000");
        assert_eq!(tts.locate(r#"{"choices":[]}"#), None);
        assert_eq!(tts.locate("/media/track.mp3"), None);
    }

    #[test]
    fn test_empty_base_url_is_config_error() {
        assert!(matches!(
            MediaTts::new(&SynthesisConfig::default()),
            Err(VoiceError::Config(_))
        ));
    }

    #[test]
    fn test_request_shape() {
        let request = TtsRequest {
            model: "gpt-4o-mini-tts",
            messages: [TtsMessage { role: "user", content: "Hello." }],
            voice: "nova",
            emotion: "happy",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Hello.");
        assert_eq!(json["voice"], "nova");
        assert_eq!(json["emotion"], "happy");
    }

    #[tokio::test]
    async fn test_placeholder_is_silent() {
        let url = PlaceholderSynthesis.synthesize("Hi there.", "nova", "neutral").await.unwrap();
        assert!(url.starts_with("silent://"));
    }
}
