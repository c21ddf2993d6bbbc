//! Incremental decoder for OpenAI-compatible chat completion streams.
//!
//! Bytes arrive in arbitrary slices; only complete lines are interpreted. Each `data:` line is
//! either the `[DONE]` terminator or a JSON chunk whose `choices[0].delta.content` is the token delta.

use crate::chat::ChatEvent;
use serde::Deserialize;

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Line-buffering SSE decoder. Feed raw body bytes, collect `ChatEvent`s.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `[DONE]` has been seen; later input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Append a body slice and decode every complete line in it.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }
        self.pending.extend_from_slice(bytes);

        // Split on raw bytes so a multi-byte char cut across slices is reassembled first.
        while let Some(newline_pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.decode_line(line.trim()) {
                let is_done = matches!(event, ChatEvent::Done);
                events.push(event);
                if is_done {
                    self.pending.clear();
                    break;
                }
            }
        }
        events
    }

    /// Decode a trailing line left without a newline when the body ends.
    pub fn finish(&mut self) -> Option<ChatEvent> {
        if self.done || self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&rest);
        self.decode_line(line.trim())
    }

    fn decode_line(&mut self, line: &str) -> Option<ChatEvent> {
        if line.is_empty() || line.starts_with(':') {
            return None;
        }
        // SSE format: "data: {...}" or "data: [DONE]"; other fields (event:, id:) carry nothing here.
        let data = line.strip_prefix("data:")?.trim_start();

        if data == "[DONE]" {
            self.done = true;
            return Some(ChatEvent::Done);
        }

        match serde_json::from_str::<StreamChunk>(data) {
            Ok(chunk) => chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .filter(|content| !content.is_empty())
                .map(ChatEvent::Delta),
            Err(_) => Some(ChatEvent::Malformed(data.to_string())),
        }
    }
}
