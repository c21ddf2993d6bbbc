//! Parley terminal client
//!
//! Type a message and press enter; the reply is segmented, synthesized and played sentence by
//! sentence. Commands: `/interrupt`, `/mute`, `/unmute`, `/voice <name>`, `/emotion <name>`,
//! `/new`, `/quit`.

use anyhow::Context;
use parley_voice::{
    AudioPlayer, ConversationEventKind, PipelineConfig, SimulatedPlayer, VoiceOrchestrator,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

enum Command<'a> {
    Say(&'a str),
    Interrupt,
    Mute(bool),
    Voice(&'a str),
    Emotion(&'a str),
    New,
    Quit,
    Unknown(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Say(line);
    };
    let (name, arg) = rest.split_once(' ').unwrap_or((rest, ""));
    match (name, arg.trim()) {
        ("interrupt" | "stop", _) => Command::Interrupt,
        ("mute", _) => Command::Mute(true),
        ("unmute", _) => Command::Mute(false),
        ("voice", v) if !v.is_empty() => Command::Voice(v),
        ("emotion", e) if !e.is_empty() => Command::Emotion(e),
        ("new", _) => Command::New,
        ("quit" | "exit", _) => Command::Quit,
        _ => Command::Unknown(line),
    }
}

fn build_player() -> anyhow::Result<Arc<dyn AudioPlayer>> {
    #[cfg(feature = "rodio")]
    {
        match parley_voice::RodioPlayer::new() {
            Ok(player) => return Ok(Arc::new(player)),
            Err(e) => tracing::warn!("audio device unavailable ({}); falling back to simulated playback", e),
        }
    }
    Ok(Arc::new(SimulatedPlayer::default()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[parley] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = PipelineConfig::load().context("loading pipeline configuration")?;
    tracing::info!(
        chat = %config.chat.base_url,
        model = %config.chat.model,
        tts = %config.synthesis.base_url,
        "parley starting"
    );

    let orchestrator = VoiceOrchestrator::from_config(config, build_player()?)
        .context("building voice pipeline")?;

    let mut events = orchestrator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            let at = event.at.format("%H:%M:%S");
            match event.kind {
                ConversationEventKind::UserMessage { text } => println!("[{}] you: {}", at, text),
                ConversationEventKind::AssistantSentence { text } => println!("[{}] assistant: {}", at, text),
                ConversationEventKind::InterimTranscript { text } => println!("[{}] (hearing) {}", at, text),
                ConversationEventKind::Error { message } => println!("[{}] ❌ {}", at, message),
                ConversationEventKind::Activity { state } => println!("[{}] · {}", at, state),
                ConversationEventKind::ConversationReset { conversation_id } => {
                    println!("[{}] new conversation {}", at, conversation_id)
                }
            }
        }
    });

    println!("parley ready. Type a message, or /quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Command::Say("") => {}
            Command::Say(text) => {
                // Run the turn in the background so /interrupt stays responsive.
                let orchestrator = orchestrator.clone();
                let text = text.to_string();
                tokio::spawn(async move {
                    match orchestrator.send_message(&text).await {
                        Ok(report) => tracing::debug!(?report, "turn complete"),
                        Err(e) => println!("⚠️  {}", e),
                    }
                });
            }
            Command::Interrupt => {
                let discarded = orchestrator.interrupt().await;
                println!("stopped ({} clip(s) discarded)", discarded);
            }
            Command::Mute(muted) => orchestrator.set_muted(muted),
            Command::Voice(voice) => match orchestrator.set_voice(voice).await {
                Ok(()) => println!("voice: {}", voice),
                Err(e) => println!("⚠️  {} (use /new first)", e),
            },
            Command::Emotion(emotion) => match orchestrator.set_emotion(emotion).await {
                Ok(()) => println!("emotion: {}", emotion),
                Err(e) => println!("⚠️  {} (use /new first)", e),
            },
            Command::New => {
                orchestrator.new_conversation().await;
            }
            Command::Quit => break,
            Command::Unknown(cmd) => println!("unknown command: {}", cmd),
        }
    }

    orchestrator.interrupt().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert!(matches!(parse_command("hello there"), Command::Say("hello there")));
        assert!(matches!(parse_command("/voice  alloy"), Command::Voice("alloy")));
        assert!(matches!(parse_command("/voice"), Command::Unknown(_)));
        assert!(matches!(parse_command("/mute"), Command::Mute(true)));
        assert!(matches!(parse_command("/quit"), Command::Quit));
    }
}
