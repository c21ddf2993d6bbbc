//! Voice Orchestrator - drives one conversation turn end to end
//!
//! ```text
//!  text / final transcript
//!        │
//!        ▼
//!  ChatBackend::stream ──deltas──▶ Segmenter ──sentence──▶ SynthesisBackend ──clip──▶ PlaybackQueue
//! ```
//!
//! Sentences are synthesized one at a time, in order, and each clip is enqueued as soon as it
//! exists, so the first sentence plays while the model is still writing the rest.
//!
//! `interrupt()` bumps the conversation epoch: the queue is flushed and any synthesis or chat
//! result belonging to an older epoch is dropped instead of enqueued. Clips carry the queue
//! generation seen at turn start, so one that races past the epoch check is still dropped by the
//! queue worker.

use crate::chat::{ChatBackend, ChatMessage, OpenAiChat};
use crate::config::PipelineConfig;
use crate::error::{VoiceError, VoiceResult};
use crate::playback::{AudioClip, AudioPlayer, PlaybackEvent, PlaybackQueue};
use crate::segmenter::Segmenter;
use crate::session::{
    ActivityState, ConversationEvent, ConversationEventKind, SessionParameters, Transcript,
};
use crate::synth::{self, SynthesisBackend};
use serde::Serialize;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

const CONVERSATION_EVENT_CAPACITY: usize = 256;

/// Outcome of one `send_message` turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TurnReport {
    /// Sentences produced by the segmenter.
    pub sentences: usize,
    /// Clips handed to the playback queue.
    pub enqueued: usize,
    /// Sentences whose synthesis failed.
    pub skipped: usize,
    /// The turn was cut short by `interrupt()`.
    pub interrupted: bool,
}

struct SessionState {
    params: SessionParameters,
    conversation_id: String,
    /// Epoch of the turn still reading the chat stream, if any.
    active_turn: Option<u64>,
}

struct Inner {
    chat: Arc<dyn ChatBackend>,
    synth: Arc<dyn SynthesisBackend>,
    queue: PlaybackQueue,
    config: PipelineConfig,
    session: Mutex<SessionState>,
    activity: watch::Sender<ActivityState>,
    epoch: watch::Sender<u64>,
    events: broadcast::Sender<ConversationEvent>,
}

/// Cloneable handle; all clones drive the same conversation.
#[derive(Clone)]
pub struct VoiceOrchestrator {
    inner: Arc<Inner>,
}

impl VoiceOrchestrator {
    /// Assemble a pipeline from explicit collaborators. Must be called inside a tokio runtime.
    pub fn new(
        config: PipelineConfig,
        chat: Arc<dyn ChatBackend>,
        synth: Arc<dyn SynthesisBackend>,
        player: Arc<dyn AudioPlayer>,
    ) -> Self {
        info!(target: "parley::orchestrator", "🎭 Initializing Voice Orchestrator");
        let queue = PlaybackQueue::spawn(player, config.playback.clone());
        let (activity, _) = watch::channel(ActivityState::Idle);
        let (epoch, _) = watch::channel(0u64);
        let (events, _) = broadcast::channel(CONVERSATION_EVENT_CAPACITY);
        let params = SessionParameters::new(
            config.synthesis.default_voice.clone(),
            config.synthesis.default_emotion.clone(),
        );

        let inner = Arc::new(Inner {
            chat,
            synth,
            queue,
            config,
            session: Mutex::new(SessionState {
                params,
                conversation_id: uuid::Uuid::new_v4().to_string(),
                active_turn: None,
            }),
            activity,
            epoch,
            events,
        });
        spawn_activity_watcher(&inner);
        Self { inner }
    }

    /// Build the HTTP collaborators from configuration. An empty `synthesis.base_url` selects
    /// placeholder clips.
    pub fn from_config(config: PipelineConfig, player: Arc<dyn AudioPlayer>) -> VoiceResult<Self> {
        let chat: Arc<dyn ChatBackend> = Arc::new(OpenAiChat::new(&config.chat)?);
        let synth = synth::backend_from_config(&config.synthesis)?;
        Ok(Self::new(config, chat, synth, player))
    }

    /// Run one turn. Returns once every sentence has been synthesized and enqueued; playback
    /// continues in the background.
    pub async fn send_message(&self, text: &str) -> VoiceResult<TurnReport> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(TurnReport::default());
        }
        let inner = &self.inner;

        let mut epoch_rx = inner.epoch.subscribe();
        let (epoch, generation, voice, emotion) = {
            let mut session = inner.session.lock().await;
            if session.active_turn.is_some() {
                return Err(VoiceError::TurnInProgress);
            }
            let epoch = *epoch_rx.borrow_and_update();
            session.active_turn = Some(epoch);
            session.params.lock();
            (
                epoch,
                inner.queue.generation(),
                session.params.voice.clone(),
                session.params.emotion.clone(),
            )
        };

        info!(target: "parley::orchestrator", epoch, voice = %voice, emotion = %emotion, "💬 turn started");
        inner.emit(ConversationEventKind::UserMessage { text: text.to_string() });
        inner.set_activity_for(epoch, ActivityState::Thinking);

        let messages = vec![
            ChatMessage::system(inner.config.chat.system_prompt.clone()),
            ChatMessage::user(text),
        ];
        let mut report = TurnReport::default();

        let stream = tokio::select! {
            result = inner.chat.stream(messages) => result,
            _ = epoch_rx.changed() => {
                report.interrupted = true;
                return Ok(inner.finish_turn(epoch, report).await);
            }
        };
        let stream = match stream {
            Ok(rx) => rx,
            Err(e) => {
                error!(target: "parley::orchestrator", "chat request failed: {}", e);
                inner.abort_turn(epoch, &e).await;
                return Err(e);
            }
        };

        let mut segmenter = Segmenter::new(inner.config.segmenter.clone(), stream);
        loop {
            let next = tokio::select! {
                sentence = segmenter.next_sentence() => sentence,
                _ = epoch_rx.changed() => {
                    report.interrupted = true;
                    break;
                }
            };
            let Some(sentence) = next else { break };
            report.sentences += 1;
            debug!(target: "parley::orchestrator", index = report.sentences, sentence = %sentence, "sentence ready");
            inner.emit(ConversationEventKind::AssistantSentence { text: sentence.clone() });

            let synthesized = tokio::select! {
                result = inner.synth.synthesize(&sentence, &voice, &emotion) => result,
                _ = epoch_rx.changed() => {
                    report.interrupted = true;
                    break;
                }
            };
            if !inner.is_current(epoch) {
                report.interrupted = true;
                break;
            }

            match synthesized {
                Ok(locator) => match inner.queue.enqueue_in(AudioClip::new(locator, sentence), generation) {
                    Ok(()) => report.enqueued += 1,
                    Err(e) => {
                        warn!(target: "parley::orchestrator", "enqueue failed: {}", e);
                        report.skipped += 1;
                    }
                },
                Err(e) => {
                    warn!(target: "parley::orchestrator", sentence = %sentence, "synthesis failed, skipping sentence: {}", e);
                    report.skipped += 1;
                }
            }
        }

        if segmenter.malformed_count() > 0 {
            warn!(
                target: "parley::orchestrator",
                malformed = segmenter.malformed_count(),
                "chat stream carried malformed payloads"
            );
        }
        debug!(target: "parley::orchestrator", end = ?segmenter.end_reason(), "segmentation pass ended");
        if let Some(reason) = segmenter.failure() {
            let err = VoiceError::Stream(reason.to_string());
            error!(
                target: "parley::orchestrator",
                sentences = report.sentences,
                enqueued = report.enqueued,
                "chat stream broke mid-reply: {}", reason
            );
            inner.abort_turn(epoch, &err).await;
            return Err(err);
        }
        drop(segmenter);

        Ok(inner.finish_turn(epoch, report).await)
    }

    /// Stop speaking now: flush the queue and drop in-flight results. Returns discarded clips.
    pub async fn interrupt(&self) -> usize {
        let inner = &self.inner;
        let discarded = {
            // Held across the flush so a turn cannot start between the epoch bump and the
            // queue generation bump.
            let mut session = inner.session.lock().await;
            inner.epoch.send_modify(|epoch| *epoch += 1);
            let discarded = inner.queue.interrupt().await;
            session.active_turn = None;
            discarded
        };
        inner.set_activity(ActivityState::Idle);
        info!(target: "parley::orchestrator", discarded, "🛑 interrupted");
        discarded
    }

    pub fn set_muted(&self, muted: bool) {
        self.inner.queue.set_muted(muted);
    }

    /// Change the voice. Rejected once the conversation's first message was accepted.
    pub async fn set_voice(&self, voice: &str) -> VoiceResult<()> {
        self.inner.session.lock().await.params.set_voice(voice)
    }

    pub async fn set_emotion(&self, emotion: &str) -> VoiceResult<()> {
        self.inner.session.lock().await.params.set_emotion(emotion)
    }

    pub async fn parameters(&self) -> SessionParameters {
        self.inner.session.lock().await.params.clone()
    }

    pub async fn conversation_id(&self) -> String {
        self.inner.session.lock().await.conversation_id.clone()
    }

    /// Interrupt, then unlock parameters back to the configured defaults. Returns the new id.
    pub async fn new_conversation(&self) -> String {
        self.interrupt().await;
        let inner = &self.inner;
        let conversation_id = uuid::Uuid::new_v4().to_string();
        {
            let mut session = inner.session.lock().await;
            session.params.reset(
                inner.config.synthesis.default_voice.clone(),
                inner.config.synthesis.default_emotion.clone(),
            );
            session.conversation_id = conversation_id.clone();
        }
        info!(target: "parley::orchestrator", conversation_id = %conversation_id, "new conversation");
        inner.emit(ConversationEventKind::ConversationReset {
            conversation_id: conversation_id.clone(),
        });
        conversation_id
    }

    /// Voice capture started. Not allowed while a turn is still being produced.
    pub async fn start_listening(&self) -> VoiceResult<()> {
        if self.inner.session.lock().await.active_turn.is_some() {
            return Err(VoiceError::TurnInProgress);
        }
        self.inner.set_activity(ActivityState::Listening);
        Ok(())
    }

    /// Voice capture ended without an utterance.
    pub fn stop_listening(&self) {
        if self.activity() == ActivityState::Listening {
            self.inner.set_activity(ActivityState::Idle);
        }
    }

    /// Interim transcripts are published only; a final transcript runs a turn.
    pub async fn handle_transcript(&self, transcript: Transcript) -> VoiceResult<Option<TurnReport>> {
        match transcript {
            Transcript::Interim(text) => {
                self.inner.emit(ConversationEventKind::InterimTranscript { text });
                Ok(None)
            }
            Transcript::Final(text) if text.trim().is_empty() => {
                self.stop_listening();
                Ok(None)
            }
            Transcript::Final(text) => self.send_message(&text).await.map(Some),
        }
    }

    /// One capture pass: listen until a final transcript (runs the turn) or the source closes.
    pub async fn capture_turn(
        &self,
        mut transcripts: mpsc::Receiver<Transcript>,
    ) -> VoiceResult<Option<TurnReport>> {
        self.start_listening().await?;
        let mut epoch_rx = self.inner.epoch.subscribe();
        loop {
            let next = tokio::select! {
                t = transcripts.recv() => t,
                _ = epoch_rx.changed() => {
                    debug!(target: "parley::orchestrator", "capture interrupted");
                    return Ok(None);
                }
            };
            match next {
                Some(Transcript::Final(text)) => {
                    return self.handle_transcript(Transcript::Final(text)).await;
                }
                Some(interim) => {
                    self.handle_transcript(interim).await?;
                }
                None => {
                    self.stop_listening();
                    return Ok(None);
                }
            }
        }
    }

    pub fn activity(&self) -> ActivityState {
        *self.inner.activity.borrow()
    }

    pub fn watch_activity(&self) -> watch::Receiver<ActivityState> {
        self.inner.activity.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.inner.events.subscribe()
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.inner.queue
    }
}

impl Inner {
    fn is_current(&self, epoch: u64) -> bool {
        *self.epoch.borrow() == epoch
    }

    fn emit(&self, kind: ConversationEventKind) {
        let _ = self.events.send(ConversationEvent::now(kind));
    }

    fn set_activity(&self, state: ActivityState) {
        let changed = self.activity.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            debug!(target: "parley::orchestrator", state = %state, "activity changed");
            self.emit(ConversationEventKind::Activity { state });
        }
    }

    /// Activity writes from a turn only land while that turn is still current.
    fn set_activity_for(&self, epoch: u64, state: ActivityState) {
        if self.is_current(epoch) {
            self.set_activity(state);
        }
    }

    async fn release_turn(&self, epoch: u64) {
        let mut session = self.session.lock().await;
        if session.active_turn == Some(epoch) {
            session.active_turn = None;
        }
    }

    async fn finish_turn(&self, epoch: u64, report: TurnReport) -> TurnReport {
        self.release_turn(epoch).await;
        if self.is_current(epoch) {
            // A short reply may sit below the start threshold.
            self.queue.release();
            if self.queue.is_idle() {
                self.set_activity(ActivityState::Idle);
            }
        }
        info!(
            target: "parley::orchestrator",
            epoch,
            sentences = report.sentences,
            enqueued = report.enqueued,
            skipped = report.skipped,
            interrupted = report.interrupted,
            "turn finished"
        );
        report
    }

    /// Error notice; clips already enqueued by the turn still play.
    async fn abort_turn(&self, epoch: u64, err: &VoiceError) {
        self.release_turn(epoch).await;
        if self.is_current(epoch) {
            self.emit(ConversationEventKind::Error { message: err.to_string() });
            self.queue.release();
            if self.queue.is_idle() {
                self.set_activity(ActivityState::Idle);
            }
        }
    }
}

/// Mirror queue activity into the activity state: speaking while a clip plays, idle once the
/// queue drains with no turn still producing clips.
fn spawn_activity_watcher(inner: &Arc<Inner>) {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let mut events = inner.queue.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(target: "parley::orchestrator", skipped, "activity watcher lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let Some(inner) = weak.upgrade() else { break };

            match event {
                PlaybackEvent::Started(_) => {
                    let playing = inner.queue.snapshot().active.is_some();
                    let listening = *inner.activity.borrow() == ActivityState::Listening;
                    if playing && !listening {
                        inner.set_activity(ActivityState::Speaking);
                    }
                }
                PlaybackEvent::Drained => {
                    let producing = inner.session.lock().await.active_turn.is_some();
                    let listening = *inner.activity.borrow() == ActivityState::Listening;
                    if !producing && !listening {
                        inner.set_activity(ActivityState::Idle);
                    }
                }
                _ => {}
            }
        }
        debug!(target: "parley::orchestrator", "activity watcher stopped");
    });
}
