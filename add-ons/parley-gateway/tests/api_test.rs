use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use parley_gateway::{build_app, AppState, FALLBACK_SENTENCES};
use parley_voice::{
    ChatBackend, ChatMessage, PipelineConfig, SynthesisBackend, VoiceError, VoiceResult,
};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

struct ReplyChat(&'static str);

#[async_trait]
impl ChatBackend for ReplyChat {
    async fn complete(&self, _messages: Vec<ChatMessage>) -> VoiceResult<String> {
        Ok(self.0.to_string())
    }
}

struct DownChat;

#[async_trait]
impl ChatBackend for DownChat {
    async fn complete(&self, _messages: Vec<ChatMessage>) -> VoiceResult<String> {
        Err(VoiceError::Chat("connection refused".to_string()))
    }
}

#[derive(Default)]
struct EchoSynth {
    seen: Mutex<Vec<(String, String, String)>>,
    fail: bool,
}

#[async_trait]
impl SynthesisBackend for EchoSynth {
    async fn synthesize(&self, text: &str, voice: &str, emotion: &str) -> VoiceResult<String> {
        self.seen
            .lock()
            .unwrap()
            .push((text.to_string(), voice.to_string(), emotion.to_string()));
        if self.fail {
            return Err(VoiceError::Tts("tts down".to_string()));
        }
        Ok("http://tts.local/media/out_1.wav".to_string())
    }
}

fn app(chat: Arc<dyn ChatBackend>, synth: Arc<EchoSynth>) -> axum::Router {
    build_app(AppState {
        chat,
        synth,
        config: Arc::new(PipelineConfig::default()),
    })
}

async fn post_json(app: axum::Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health() {
    let app = app(Arc::new(ReplyChat("")), Arc::new(EchoSynth::default()));
    let req = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_generate_text_splits_reply() {
    let app = app(
        Arc::new(ReplyChat("Sure thing. Rust is a systems language! Want more?")),
        Arc::new(EchoSynth::default()),
    );
    let (status, json) = post_json(app, "/api/generate-text", serde_json::json!({ "prompt": "tell me" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["sentences"],
        serde_json::json!(["Sure thing.", "Rust is a systems language!", "Want more?"])
    );
}

#[tokio::test]
async fn test_generate_text_requires_prompt() {
    let app1 = app(Arc::new(ReplyChat("x")), Arc::new(EchoSynth::default()));
    let (status, json) = post_json(app1, "/api/generate-text", serde_json::json!({ "prompt": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Prompt is required");

    let app2 = app(Arc::new(ReplyChat("x")), Arc::new(EchoSynth::default()));
    let (status, _) = post_json(app2, "/api/generate-text", serde_json::json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_generate_text_falls_back_when_chat_fails() {
    let app = app(Arc::new(DownChat), Arc::new(EchoSynth::default()));
    let (status, json) = post_json(app, "/api/generate-text", serde_json::json!({ "prompt": "hi" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sentences"], serde_json::json!(FALLBACK_SENTENCES));
}

#[tokio::test]
async fn test_synthesize_audio_uses_defaults() {
    let synth = Arc::new(EchoSynth::default());
    let app = app(Arc::new(ReplyChat("")), synth.clone());
    let (status, json) = post_json(
        app,
        "/api/synthesize-audio",
        serde_json::json!({ "text": "Hello there.", "emotion": "happy" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["audioUrl"], "http://tts.local/media/out_1.wav");
    assert_eq!(
        synth.seen.lock().unwrap()[0],
        ("Hello there.".to_string(), "nova".to_string(), "happy".to_string())
    );
}

#[tokio::test]
async fn test_synthesize_audio_errors() {
    let app1 = app(Arc::new(ReplyChat("")), Arc::new(EchoSynth::default()));
    let (status, json) = post_json(app1, "/api/synthesize-audio", serde_json::json!({ "text": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Text is required");

    let failing = Arc::new(EchoSynth {
        fail: true,
        ..Default::default()
    });
    let app2 = app(Arc::new(ReplyChat("")), failing);
    let (status, json) = post_json(app2, "/api/synthesize-audio", serde_json::json!({ "text": "Hi." })).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Failed to synthesize audio");
}
