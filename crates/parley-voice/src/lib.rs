//! # Parley Voice - Streaming Voice Chat Pipeline
//!
//! Turns a streamed language-model reply into spoken audio with the lowest possible latency:
//! sentences are cut from the token stream as they complete, synthesized one by one, and played
//! back in order while the model is still writing.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Voice Orchestrator                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │ Chat (SSE)   │→ │  Segmenter   │→ │  Synthesis   │           │
//! │  │ token deltas │  │  sentences   │  │  (per clip)  │           │
//! │  └──────────────┘  └──────────────┘  └──────────────┘           │
//! │                                             ↓                   │
//! │  ┌──────────────┐                    ┌──────────────┐           │
//! │  │ AudioPlayer  │←───────────────────│ PlaybackQueue│           │
//! │  │ (sim/rodio)  │   one clip a time  │ (FIFO worker)│           │
//! │  └──────────────┘                    └──────────────┘           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod playback;
pub mod player;
pub mod segmenter;
pub mod session;
pub mod sse;
pub mod synth;

pub use chat::{ChatBackend, ChatEvent, ChatMessage, OpenAiChat, Role, EMPTY_REPLY_FALLBACK};
pub use config::{ChatConfig, PipelineConfig, PlaybackConfig, SegmenterConfig, SynthesisConfig};
pub use error::{VoiceError, VoiceResult};
pub use orchestrator::{TurnReport, VoiceOrchestrator};
pub use playback::{
    AudioClip, AudioPlayer, ClipId, PlaybackEvent, PlaybackOutcome, PlaybackQueue, PlaybackReporter,
    QueueSnapshot,
};
#[cfg(feature = "rodio")]
pub use player::RodioPlayer;
pub use player::SimulatedPlayer;
pub use segmenter::{split_sentences, SegmentEnd, Segmenter, SentenceSplitter};
pub use session::{
    ActivityState, ConversationEvent, ConversationEventKind, ParameterLock, SessionParameters,
    Transcript,
};
pub use sse::SseDecoder;
pub use synth::{backend_from_config, MediaTts, PlaceholderSynthesis, SynthesisBackend};
