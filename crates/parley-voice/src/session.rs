//! Per-conversation state: activity, locked voice parameters, conversation events.

use crate::error::{VoiceError, VoiceResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the assistant is doing right now. Written by the orchestrator only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityState {
    #[default]
    Idle,
    Listening,
    Thinking,
    Speaking,
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActivityState::Idle => "idle",
            ActivityState::Listening => "listening",
            ActivityState::Thinking => "thinking",
            ActivityState::Speaking => "speaking",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLock {
    #[default]
    Open,
    Locked,
}

/// Voice and emotion for a conversation. Frozen by the first accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParameters {
    pub voice: String,
    pub emotion: String,
    pub lock: ParameterLock,
}

impl SessionParameters {
    pub fn new(voice: impl Into<String>, emotion: impl Into<String>) -> Self {
        Self {
            voice: voice.into(),
            emotion: emotion.into(),
            lock: ParameterLock::Open,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.lock == ParameterLock::Locked
    }

    pub fn set_voice(&mut self, voice: impl Into<String>) -> VoiceResult<()> {
        self.ensure_open()?;
        self.voice = voice.into();
        Ok(())
    }

    pub fn set_emotion(&mut self, emotion: impl Into<String>) -> VoiceResult<()> {
        self.ensure_open()?;
        self.emotion = emotion.into();
        Ok(())
    }

    pub fn lock(&mut self) {
        self.lock = ParameterLock::Locked;
    }

    /// New conversation: back to the given defaults, unlocked.
    pub fn reset(&mut self, voice: impl Into<String>, emotion: impl Into<String>) {
        *self = Self::new(voice, emotion);
    }

    fn ensure_open(&self) -> VoiceResult<()> {
        match self.lock {
            ParameterLock::Open => Ok(()),
            ParameterLock::Locked => Err(VoiceError::SessionLocked),
        }
    }
}

/// A speech-to-text result from the voice-capture collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcript {
    /// Partial hypothesis; displayed, never acted on.
    Interim(String),
    /// Final utterance; becomes a message.
    Final(String),
}

/// Entry of the conversation log, for presentation consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversationEventKind {
    UserMessage { text: String },
    InterimTranscript { text: String },
    AssistantSentence { text: String },
    Error { message: String },
    Activity { state: ActivityState },
    ConversationReset { conversation_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationEvent {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ConversationEventKind,
}

impl ConversationEvent {
    pub fn now(kind: ConversationEventKind) -> Self {
        Self { at: Utc::now(), kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_lock_rejects_changes() {
        let mut params = SessionParameters::new("nova", "neutral");
        params.set_voice("alloy").unwrap();
        params.lock();

        assert!(matches!(params.set_emotion("happy"), Err(VoiceError::SessionLocked)));
        assert!(matches!(params.set_voice("echo"), Err(VoiceError::SessionLocked)));
        assert_eq!(params.voice, "alloy");
        assert_eq!(params.emotion, "neutral");

        params.reset("nova", "neutral");
        assert!(!params.is_locked());
        assert_eq!(params.voice, "nova");
    }

    #[test]
    fn test_activity_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ActivityState::Speaking).unwrap(), "\"speaking\"");
        assert_eq!(ActivityState::Thinking.to_string(), "thinking");
    }

    #[test]
    fn test_event_flattens_kind() {
        let event = ConversationEvent::now(ConversationEventKind::UserMessage { text: "hi".to_string() });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "user_message");
        assert_eq!(json["text"], "hi");
        assert!(json["at"].is_string());
    }
}
