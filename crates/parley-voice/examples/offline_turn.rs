//! Offline demo: a scripted token stream through the full pipeline with simulated playback.
//!
//! Run with: `cargo run -p parley-voice --example offline_turn`

use async_trait::async_trait;
use parley_voice::{
    ChatBackend, ChatEvent, ChatMessage, PipelineConfig, PlaceholderSynthesis, SimulatedPlayer,
    VoiceOrchestrator, VoiceResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Emits a canned reply a few characters at a time, like a model streaming tokens.
struct TypewriterChat {
    reply: &'static str,
    delay: Duration,
}

#[async_trait]
impl ChatBackend for TypewriterChat {
    async fn complete(&self, _messages: Vec<ChatMessage>) -> VoiceResult<String> {
        Ok(self.reply.to_string())
    }

    async fn stream(&self, _messages: Vec<ChatMessage>) -> VoiceResult<mpsc::Receiver<ChatEvent>> {
        let (tx, rx) = mpsc::channel(16);
        let chars: Vec<char> = self.reply.chars().collect();
        let delay = self.delay;
        tokio::spawn(async move {
            for chunk in chars.chunks(4) {
                tokio::time::sleep(delay).await;
                if tx.send(ChatEvent::Delta(chunk.iter().collect())).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(ChatEvent::Done).await;
        });
        Ok(rx)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("parley=debug"))
        .init();

    let chat = Arc::new(TypewriterChat {
        reply: "Hello! Streaming speech starts before the reply is complete. \
                Each sentence is synthesized and queued in order. \
                That keeps the first words fast.",
        delay: Duration::from_millis(30),
    });
    let orchestrator = VoiceOrchestrator::new(
        PipelineConfig::default(),
        chat,
        Arc::new(PlaceholderSynthesis),
        Arc::new(SimulatedPlayer::new(Duration::from_millis(20))),
    );

    let report = orchestrator.send_message("How does streaming speech work?").await?;
    println!("turn: {:?}", report);

    orchestrator.queue().wait_idle().await;
    println!("activity: {}", orchestrator.activity());
    Ok(())
}
