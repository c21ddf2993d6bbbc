//! Parley Gateway: HTTP endpoints for browser clients.
//!
//! | Route | Body | Response |
//! |-------|------|----------|
//! | `POST /api/generate-text` | `{prompt}` | `{sentences: [..]}` |
//! | `POST /api/synthesize-audio` | `{text, emotion?, voice?}` | `{audioUrl}` |
//! | `GET /api/health` | | `{status: "ok"}` |
//!
//! Text generation never fails the client: a chat error yields canned sentences so the UI still
//! has something to speak.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use parley_voice::{
    split_sentences, ChatBackend, ChatMessage, PipelineConfig, SynthesisBackend,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Spoken when the chat backend is unreachable.
pub const FALLBACK_SENTENCES: [&str; 3] = [
    "Hello! I'm here to help you.",
    "Let me assist with your question.",
    "Feel free to ask me anything!",
];

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<dyn ChatBackend>,
    pub synth: Arc<dyn SynthesisBackend>,
    pub config: Arc<PipelineConfig>,
}

#[derive(Deserialize)]
struct GenerateTextBody {
    #[serde(default)]
    prompt: Option<String>,
}

#[derive(Deserialize)]
struct SynthesizeAudioBody {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    emotion: Option<String>,
    #[serde(default)]
    voice: Option<String>,
}

pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/generate-text", post(generate_text))
        .route("/api/synthesize-audio", post(synthesize_audio))
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn error_response(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message })))
}

/// POST /api/generate-text – one-shot completion split into speakable sentences.
async fn generate_text(
    State(state): State<AppState>,
    body: Result<Json<GenerateTextBody>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let prompt = body
        .ok()
        .and_then(|Json(b)| b.prompt)
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());
    let Some(prompt) = prompt else {
        return error_response(StatusCode::BAD_REQUEST, "Prompt is required");
    };

    let messages = vec![
        ChatMessage::system(state.config.chat.system_prompt.clone()),
        ChatMessage::user(prompt),
    ];
    let sentences = match state.chat.complete(messages).await {
        Ok(reply) => split_sentences(&reply, &state.config.segmenter),
        Err(e) => {
            tracing::warn!(target: "parley::gateway", "generate-text falling back: {}", e);
            FALLBACK_SENTENCES.iter().map(|s| s.to_string()).collect()
        }
    };
    tracing::info!(target: "parley::gateway", sentences = sentences.len(), "generate-text served");
    (StatusCode::OK, Json(json!({ "sentences": sentences })))
}

/// POST /api/synthesize-audio – synthesize one sentence and return its clip URL.
async fn synthesize_audio(
    State(state): State<AppState>,
    body: Result<Json<SynthesizeAudioBody>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Ok(Json(body)) = body else {
        return error_response(StatusCode::BAD_REQUEST, "Text is required");
    };
    let Some(text) = body.text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Text is required");
    };
    let defaults = &state.config.synthesis;
    let voice = body.voice.unwrap_or_else(|| defaults.default_voice.clone());
    let emotion = body.emotion.unwrap_or_else(|| defaults.default_emotion.clone());

    match state.synth.synthesize(&text, &voice, &emotion).await {
        Ok(url) => (StatusCode::OK, Json(json!({ "audioUrl": url }))),
        Err(e) => {
            tracing::error!(target: "parley::gateway", voice = %voice, "synthesis failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to synthesize audio")
        }
    }
}
