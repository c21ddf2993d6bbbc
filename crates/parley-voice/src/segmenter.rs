//! Streaming sentence segmentation.
//!
//! Token deltas are appended to a sentence buffer and cut into speakable sentences as early as
//! possible. Three rules decide a cut:
//!
//! 1. **Boundary**: terminal punctuation (`.`, `!`, `?`, repeated) followed by whitespace or the
//!    end of the buffer. Candidates shorter than `min_sentence_chars` stay buffered so that
//!    fragments like "Dr." ride along with the next sentence.
//! 2. **Overflow**: a buffer longer than `max_buffer_chars` is cut at the last whitespace before
//!    `soft_break_chars`, or hard-cut at `max_buffer_chars` when there is none.
//! 3. **Inactivity**: no delta for `inactivity_timeout` ends the pass and flushes the buffer.
//!
//! `SentenceSplitter` holds the buffer logic and has no I/O; `Segmenter` binds it to a
//! `ChatEvent` channel and adds the timers.

use crate::chat::ChatEvent;
use crate::config::SegmenterConfig;
use futures_util::Stream;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+(?:\s|$)").expect("sentence boundary regex is valid"));

/// Byte offset of the `n`th char, or the buffer length when it has fewer chars.
fn byte_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

/// Synchronous sentence buffer: push deltas, pull sentences.
#[derive(Debug, Clone)]
pub struct SentenceSplitter {
    config: SegmenterConfig,
    buffer: String,
}

impl SentenceSplitter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            buffer: String::new(),
        }
    }

    /// Text received but not emitted yet.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Append a delta and return every sentence it completes, in order.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);

        let mut sentences = Vec::new();
        loop {
            if let Some(sentence) = self.take_boundary() {
                sentences.push(sentence);
                continue;
            }
            if let Some(sentence) = self.take_overflow() {
                sentences.push(sentence);
                continue;
            }
            break;
        }
        sentences
    }

    /// Drop buffered text without emitting it.
    pub fn discard(&mut self) {
        self.buffer.clear();
    }

    /// End of stream: the remaining buffer, trimmed, if anything is left.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        }
    }

    fn meets_min_length(&self, candidate: &str) -> bool {
        candidate.chars().count() >= self.config.min_sentence_chars
    }

    fn take_boundary(&mut self) -> Option<String> {
        let mut cut = None;
        for m in SENTENCE_END.find_iter(&self.buffer) {
            let candidate = self.buffer[..m.end()].trim();
            if !candidate.is_empty() && self.meets_min_length(candidate) {
                cut = Some(m.end());
                break;
            }
        }
        let end = cut?;
        let sentence = self.buffer[..end].trim().to_string();
        self.buffer.drain(..end);
        Some(sentence)
    }

    fn take_overflow(&mut self) -> Option<String> {
        let max = self.config.max_buffer_chars.max(1);
        while self.buffer.chars().count() > max {
            let soft_end = byte_offset(&self.buffer, self.config.soft_break_chars.min(max));
            let soft_cut = self.buffer[..soft_end]
                .char_indices()
                .rev()
                .find(|(_, c)| c.is_whitespace())
                .map(|(i, _)| i)
                .filter(|&i| !self.buffer[..i].trim().is_empty());

            let (cut, consumed) = match soft_cut {
                Some(i) => {
                    let ws_len = self.buffer[i..].chars().next().map(char::len_utf8).unwrap_or(1);
                    (i, i + ws_len)
                }
                None => {
                    let hard = byte_offset(&self.buffer, max);
                    (hard, hard)
                }
            };

            let sentence = self.buffer[..cut].trim().to_string();
            self.buffer.drain(..consumed);
            if sentence.is_empty() {
                // A run of whitespace only; drop it and look at what follows.
                continue;
            }
            debug!(target: "parley::segmenter", chars = sentence.chars().count(), "forced break on overflow");
            return Some(sentence);
        }
        None
    }
}

/// Split a complete reply into sentences (one-shot mode). Non-blank text always yields at least one.
pub fn split_sentences(text: &str, config: &SegmenterConfig) -> Vec<String> {
    let mut splitter = SentenceSplitter::new(config.clone());
    let mut sentences = splitter.push(text);
    sentences.extend(splitter.finish());
    sentences
}

/// Why a segmentation pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentEnd {
    /// `[DONE]` marker received.
    Done,
    /// Source channel closed without a marker.
    Closed,
    /// No delta within the inactivity window.
    Stalled,
    /// The source reported a transport failure; unfinished text was discarded.
    Failed,
}

/// One segmentation pass over a chat stream. Finite and not restartable.
pub struct Segmenter {
    splitter: SentenceSplitter,
    source: mpsc::Receiver<ChatEvent>,
    ready: VecDeque<String>,
    inactivity: Duration,
    deadline: Instant,
    end: Option<SegmentEnd>,
    failure: Option<String>,
    malformed: usize,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig, source: mpsc::Receiver<ChatEvent>) -> Self {
        let inactivity = config.inactivity_timeout();
        let deadline = Instant::now() + config.first_delta_timeout();
        Self {
            splitter: SentenceSplitter::new(config),
            source,
            ready: VecDeque::new(),
            inactivity,
            deadline,
            end: None,
            failure: None,
            malformed: 0,
        }
    }

    /// How the pass ended, once it has.
    pub fn end_reason(&self) -> Option<SegmentEnd> {
        self.end
    }

    /// Transport failure that ended the pass, if any.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Payloads skipped because they could not be parsed.
    pub fn malformed_count(&self) -> usize {
        self.malformed
    }

    /// Next sentence, or `None` once the stream has ended and the buffer is flushed.
    pub async fn next_sentence(&mut self) -> Option<String> {
        loop {
            if let Some(sentence) = self.ready.pop_front() {
                return Some(sentence);
            }
            if self.end.is_some() {
                return None;
            }

            match tokio::time::timeout_at(self.deadline, self.source.recv()).await {
                Ok(Some(ChatEvent::Delta(delta))) => {
                    self.deadline = Instant::now() + self.inactivity;
                    self.ready.extend(self.splitter.push(&delta));
                }
                Ok(Some(ChatEvent::Malformed(payload))) => {
                    self.malformed += 1;
                    warn!(target: "parley::segmenter", payload = %payload, "skipping malformed stream payload");
                }
                Ok(Some(ChatEvent::Done)) => self.close(SegmentEnd::Done),
                Ok(Some(ChatEvent::Failed(reason))) => {
                    warn!(
                        target: "parley::segmenter",
                        discarded = self.splitter.buffered().len(),
                        "chat stream failed: {}", reason
                    );
                    self.failure = Some(reason);
                    self.splitter.discard();
                    self.close(SegmentEnd::Failed);
                }
                Ok(None) => self.close(SegmentEnd::Closed),
                Err(_) => {
                    debug!(
                        target: "parley::segmenter",
                        buffered = self.splitter.buffered().len(),
                        "stream stalled; flushing buffer"
                    );
                    self.close(SegmentEnd::Stalled);
                }
            }
        }
    }

    /// Consume the pass as a lazy stream of sentences.
    pub fn into_stream(self) -> impl Stream<Item = String> {
        futures_util::stream::unfold(self, |mut segmenter| async move {
            segmenter.next_sentence().await.map(|s| (s, segmenter))
        })
    }

    fn close(&mut self, reason: SegmentEnd) {
        self.ready.extend(self.splitter.finish());
        self.end = Some(reason);
        // Stop the producer; late deltas are not part of this pass.
        self.source.close();
    }
}
