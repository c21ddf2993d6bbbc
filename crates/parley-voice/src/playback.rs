//! **Playback queue**: ordered, gapless playback of synthesized clips.
//!
//! A single worker task owns the queue state; callers talk to it through a cheap, cloneable
//! `PlaybackQueue` handle. The audio backend (`AudioPlayer`) starts one clip at a time and reports
//! its end through a `PlaybackReporter`; the worker then advances to the next clip after the
//! configured inter-clip delay (failures advance immediately).
//!
//! ```text
//!  enqueue ──▶ [pending FIFO] ──start──▶ active ──finished──▶ (delay) ──▶ next
//!                                           │
//!  interrupt ──────────── stop + discard ───┘
//! ```

use crate::config::PlaybackConfig;
use crate::error::{VoiceError, VoiceResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

static NEXT_CLIP_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one synthesized clip, unique within the process.
pub type ClipId = u64;

/// A playable audio asset for one sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub id: ClipId,
    /// Locator understood by the audio player (usually a URL).
    pub locator: String,
    /// The sentence this clip speaks.
    pub sentence: String,
}

impl AudioClip {
    pub fn new(locator: impl Into<String>, sentence: impl Into<String>) -> Self {
        Self {
            id: NEXT_CLIP_ID.fetch_add(1, Ordering::Relaxed),
            locator: locator.into(),
            sentence: sentence.into(),
        }
    }
}

/// How a clip's playback ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Finished,
    Failed(String),
}

/// Reports the end of exactly one clip back to the queue.
///
/// Dropping a reporter without calling either method counts as a failure, so a backend that
/// loses track of a clip cannot stall the queue.
pub struct PlaybackReporter {
    seq: u64,
    tx: mpsc::UnboundedSender<Report>,
    reported: bool,
}

impl PlaybackReporter {
    /// The clip played to its natural end.
    pub fn finished(mut self) {
        self.send(PlaybackOutcome::Finished);
    }

    /// The clip could not be played.
    pub fn failed(mut self, reason: impl Into<String>) {
        self.send(PlaybackOutcome::Failed(reason.into()));
    }

    fn send(&mut self, outcome: PlaybackOutcome) {
        self.reported = true;
        // Worker gone means the queue was dropped; nothing left to advance.
        let _ = self.tx.send(Report { seq: self.seq, outcome });
    }
}

impl Drop for PlaybackReporter {
    fn drop(&mut self) {
        if !self.reported {
            self.send(PlaybackOutcome::Failed("playback handle dropped".to_string()));
        }
    }
}

/// Audio-playback backend. `play` must return quickly; the end of playback is signalled through
/// the reporter, from any thread or task.
pub trait AudioPlayer: Send + Sync {
    /// Begin playing `clip`. An `Err` means playback never started and the clip is skipped.
    fn play(&self, clip: &AudioClip, reporter: PlaybackReporter) -> VoiceResult<()>;

    /// Halt the current clip immediately. Its reporter may be dropped.
    fn stop(&self);

    /// Silence (or restore) current and future clips.
    fn set_muted(&self, muted: bool);
}

/// Queue notifications for presentation and orchestration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started(AudioClip),
    Finished(AudioClip),
    Failed { clip: AudioClip, reason: String },
    /// Nothing active and nothing pending after a batch of playback.
    Drained,
    /// `interrupt()` discarded this many clips (active included).
    Interrupted { discarded: usize },
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub active: Option<AudioClip>,
    pub pending: usize,
    pub muted: bool,
}

enum Command {
    Enqueue { clip: AudioClip, generation: u64 },
    Release,
    Interrupt { ack: oneshot::Sender<usize>, generation: u64 },
    SetMuted(bool),
}

struct Report {
    seq: u64,
    outcome: PlaybackOutcome,
}

/// Handle to a running playback queue. Clones share the same queue.
#[derive(Clone)]
pub struct PlaybackQueue {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<PlaybackEvent>,
    snapshot: watch::Receiver<QueueSnapshot>,
    outstanding: Arc<AtomicUsize>,
    generation: Arc<AtomicU64>,
}

impl PlaybackQueue {
    /// Spawn the queue worker on the current tokio runtime.
    pub fn spawn(player: Arc<dyn AudioPlayer>, config: PlaybackConfig) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(QueueSnapshot::default());
        let outstanding = Arc::new(AtomicUsize::new(0));

        let worker = QueueWorker {
            player,
            config,
            pending: VecDeque::new(),
            active: None,
            next_seq: 0,
            advance_at: None,
            primed: false,
            muted: false,
            generation: 0,
            reports_tx,
            events: events.clone(),
            snapshot: snapshot_tx,
            outstanding: Arc::clone(&outstanding),
        };
        tokio::spawn(worker.run(commands_rx, reports_rx));

        Self {
            commands: commands_tx,
            events,
            snapshot: snapshot_rx,
            outstanding,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Append a clip. Never blocks; playback starts as soon as the queue policy allows.
    pub fn enqueue(&self, clip: AudioClip) -> VoiceResult<()> {
        self.enqueue_in(clip, self.generation())
    }

    /// Append a clip produced during `generation`. The worker drops it if an `interrupt()`
    /// has happened since.
    pub fn enqueue_in(&self, clip: AudioClip, generation: u64) -> VoiceResult<()> {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        if self.commands.send(Command::Enqueue { clip, generation }).is_err() {
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            return Err(VoiceError::ChannelSend("playback queue worker stopped".to_string()));
        }
        Ok(())
    }

    /// Start whatever is pending even if fewer than `start_threshold` clips arrived.
    pub fn release(&self) {
        let _ = self.commands.send(Command::Release);
    }

    /// Stop the active clip and discard everything queued. Returns the number of discarded clips.
    pub async fn interrupt(&self) -> usize {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (ack, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Interrupt { ack, generation }).is_err() {
            return 0;
        }
        ack_rx.await.unwrap_or(0)
    }

    /// Number of interrupts issued so far. Tag clips with it through `enqueue_in`.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn set_muted(&self, muted: bool) {
        let _ = self.commands.send(Command::SetMuted(muted));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Clips enqueued and not yet finished, failed or discarded.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.outstanding() == 0
    }

    /// Resolve once every enqueued clip has been played, skipped or discarded.
    pub async fn wait_idle(&self) {
        let mut rx = self.snapshot.clone();
        while !self.is_idle() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

struct QueueWorker {
    player: Arc<dyn AudioPlayer>,
    config: PlaybackConfig,
    pending: VecDeque<AudioClip>,
    active: Option<(u64, AudioClip)>,
    next_seq: u64,
    /// Set while waiting out the inter-clip delay.
    advance_at: Option<Instant>,
    /// A batch has started playing; later clips follow without the start threshold.
    primed: bool,
    muted: bool,
    /// Clips tagged with an older generation arrived after an interrupt and are dropped.
    generation: u64,
    reports_tx: mpsc::UnboundedSender<Report>,
    events: broadcast::Sender<PlaybackEvent>,
    snapshot: watch::Sender<QueueSnapshot>,
    outstanding: Arc<AtomicUsize>,
}

impl QueueWorker {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut reports: mpsc::UnboundedReceiver<Report>,
    ) {
        debug!(target: "parley::playback", "queue worker started");
        loop {
            let advance_at = self.advance_at;
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                Some(report) = reports.recv() => self.handle_report(report),
                _ = sleep_until_opt(advance_at) => {
                    self.advance_at = None;
                    self.start_next();
                }
            }
            self.check_drained();
            self.publish();
        }

        if self.active.is_some() {
            self.player.stop();
        }
        debug!(target: "parley::playback", "queue worker stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Enqueue { clip, generation } if generation < self.generation => {
                debug!(target: "parley::playback", clip = clip.id, generation, "dropping clip from before the last interrupt");
                self.retire_one();
            }
            Command::Enqueue { clip, .. } => {
                debug!(target: "parley::playback", clip = clip.id, pending = self.pending.len() + 1, "clip enqueued");
                self.pending.push_back(clip);
                self.maybe_start();
            }
            Command::Release => {
                if self.is_waiting_to_start() {
                    debug!(target: "parley::playback", pending = self.pending.len(), "released below start threshold");
                    self.start_next();
                }
            }
            Command::Interrupt { ack, generation } => {
                self.generation = self.generation.max(generation);
                let discarded = self.interrupt();
                // Callers read the snapshot right after the ack.
                self.publish();
                let _ = ack.send(discarded);
            }
            Command::SetMuted(muted) => {
                if muted != self.muted {
                    self.muted = muted;
                    self.player.set_muted(muted);
                    info!(target: "parley::playback", muted, "mute toggled");
                }
            }
        }
    }

    fn handle_report(&mut self, report: Report) {
        let is_current = matches!(self.active, Some((seq, _)) if seq == report.seq);
        if !is_current {
            debug!(target: "parley::playback", seq = report.seq, "ignoring stale playback report");
            return;
        }
        let Some((_, clip)) = self.active.take() else {
            return;
        };
        self.retire_one();

        match report.outcome {
            PlaybackOutcome::Finished => {
                debug!(target: "parley::playback", clip = clip.id, "clip finished");
                self.emit(PlaybackEvent::Finished(clip));
                if !self.pending.is_empty() {
                    let delay = self.config.inter_clip_delay();
                    if delay.is_zero() {
                        self.start_next();
                    } else {
                        self.advance_at = Some(Instant::now() + delay);
                    }
                }
            }
            PlaybackOutcome::Failed(reason) => {
                warn!(target: "parley::playback", clip = clip.id, reason = %reason, "clip failed; skipping");
                self.emit(PlaybackEvent::Failed { clip, reason });
                self.start_next();
            }
        }
    }

    fn is_waiting_to_start(&self) -> bool {
        self.active.is_none() && self.advance_at.is_none() && !self.pending.is_empty()
    }

    fn maybe_start(&mut self) {
        if !self.is_waiting_to_start() {
            return;
        }
        if self.primed || self.pending.len() >= self.config.start_threshold {
            self.start_next();
        }
    }

    /// Pop clips until one starts playing; clips the player rejects are skipped.
    fn start_next(&mut self) {
        while let Some(clip) = self.pending.pop_front() {
            self.primed = true;
            let seq = self.next_seq;
            self.next_seq += 1;
            let reporter = PlaybackReporter {
                seq,
                tx: self.reports_tx.clone(),
                reported: false,
            };
            match self.player.play(&clip, reporter) {
                Ok(()) => {
                    info!(target: "parley::playback", clip = clip.id, sentence = %clip.sentence, "▶️ playing");
                    self.active = Some((seq, clip.clone()));
                    self.emit(PlaybackEvent::Started(clip));
                    return;
                }
                Err(e) => {
                    warn!(target: "parley::playback", clip = clip.id, "player rejected clip: {}", e);
                    self.retire_one();
                    self.emit(PlaybackEvent::Failed {
                        clip,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    fn interrupt(&mut self) -> usize {
        let had_active = self.active.is_some();
        if had_active {
            self.player.stop();
        }
        let discarded = self.pending.len() + usize::from(had_active);
        self.pending.clear();
        self.active = None;
        self.advance_at = None;
        self.primed = false;
        if discarded > 0 {
            self.outstanding.fetch_sub(discarded, Ordering::SeqCst);
            info!(target: "parley::playback", discarded, "⏹️ playback interrupted");
            self.emit(PlaybackEvent::Interrupted { discarded });
        }
        discarded
    }

    fn check_drained(&mut self) {
        if self.primed && self.active.is_none() && self.advance_at.is_none() && self.pending.is_empty() {
            self.primed = false;
            debug!(target: "parley::playback", "queue drained");
            self.emit(PlaybackEvent::Drained);
        }
    }

    fn retire_one(&self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }

    fn emit(&self, event: PlaybackEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        self.snapshot.send_replace(QueueSnapshot {
            active: self.active.as_ref().map(|(_, clip)| clip.clone()),
            pending: self.pending.len(),
            muted: self.muted,
        });
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every play call and keeps the reporters so tests decide when clips end.
    #[derive(Default)]
    struct ManualPlayer {
        played: Mutex<Vec<String>>,
        reporters: Mutex<Vec<PlaybackReporter>>,
        stops: AtomicUsize,
        mutes: Mutex<Vec<bool>>,
        /// Locators `play` refuses with an error.
        reject: Vec<&'static str>,
    }

    impl ManualPlayer {
        fn played(&self) -> Vec<String> {
            self.played.lock().unwrap().clone()
        }

        fn finish_current(&self) {
            if let Some(r) = self.reporters.lock().unwrap().pop() {
                r.finished();
            }
        }

        fn fail_current(&self, reason: &str) {
            if let Some(r) = self.reporters.lock().unwrap().pop() {
                r.failed(reason);
            }
        }
    }

    impl AudioPlayer for ManualPlayer {
        fn play(&self, clip: &AudioClip, reporter: PlaybackReporter) -> VoiceResult<()> {
            self.played.lock().unwrap().push(clip.locator.clone());
            if self.reject.contains(&clip.locator.as_str()) {
                return Err(VoiceError::Playback(format!("cannot decode {}", clip.locator)));
            }
            self.reporters.lock().unwrap().push(reporter);
            Ok(())
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            // Keep the reporters alive: a late report must be ignored as stale.
        }

        fn set_muted(&self, muted: bool) {
            self.mutes.lock().unwrap().push(muted);
        }
    }

    fn no_delay() -> PlaybackConfig {
        PlaybackConfig {
            start_threshold: 1,
            inter_clip_delay_ms: 0,
        }
    }

    async fn next_started(rx: &mut broadcast::Receiver<PlaybackEvent>) -> AudioClip {
        loop {
            if let PlaybackEvent::Started(clip) = rx.recv().await.unwrap() {
                return clip;
            }
        }
    }

    #[tokio::test]
    async fn test_plays_in_order() {
        let player = Arc::new(ManualPlayer::default());
        let queue = PlaybackQueue::spawn(player.clone(), no_delay());
        let mut events = queue.subscribe();

        queue.enqueue(AudioClip::new("A", "a")).unwrap();
        assert_eq!(next_started(&mut events).await.locator, "A");

        queue.enqueue(AudioClip::new("B", "b")).unwrap();
        queue.enqueue(AudioClip::new("C", "c")).unwrap();

        player.finish_current();
        assert_eq!(next_started(&mut events).await.locator, "B");
        player.finish_current();
        assert_eq!(next_started(&mut events).await.locator, "C");
        player.finish_current();
        queue.wait_idle().await;

        assert_eq!(player.played(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_interrupt_then_enqueue_plays_immediately() {
        let player = Arc::new(ManualPlayer::default());
        let queue = PlaybackQueue::spawn(player.clone(), no_delay());
        let mut events = queue.subscribe();

        queue.enqueue(AudioClip::new("B", "b")).unwrap();
        queue.enqueue(AudioClip::new("C", "c")).unwrap();
        assert_eq!(next_started(&mut events).await.locator, "B");

        assert_eq!(queue.interrupt().await, 2);
        assert_eq!(player.stops.load(Ordering::SeqCst), 1);
        assert_eq!(queue.snapshot().pending, 0);
        assert!(queue.snapshot().active.is_none());
        assert!(queue.is_idle());

        // B's late completion must not advance anything
        player.finish_current();
        queue.enqueue(AudioClip::new("D", "d")).unwrap();
        assert_eq!(next_started(&mut events).await.locator, "D");
        assert_eq!(player.played(), vec!["B", "D"]);
    }

    #[tokio::test]
    async fn test_interrupt_is_idempotent_on_empty_queue() {
        let player = Arc::new(ManualPlayer::default());
        let queue = PlaybackQueue::spawn(player.clone(), no_delay());
        assert_eq!(queue.interrupt().await, 0);
        assert_eq!(queue.interrupt().await, 0);
        assert_eq!(player.stops.load(Ordering::SeqCst), 0);
        assert_eq!(queue.snapshot(), QueueSnapshot::default());
    }

    #[tokio::test]
    async fn test_start_threshold_and_release() {
        let player = Arc::new(ManualPlayer::default());
        let config = PlaybackConfig {
            start_threshold: 2,
            inter_clip_delay_ms: 0,
        };
        let queue = PlaybackQueue::spawn(player.clone(), config);
        let mut events = queue.subscribe();

        queue.enqueue(AudioClip::new("only", "x")).unwrap();
        tokio::task::yield_now().await;
        assert!(player.played().is_empty());
        assert_eq!(queue.outstanding(), 1);

        queue.release();
        assert_eq!(next_started(&mut events).await.locator, "only");
    }

    #[tokio::test]
    async fn test_failed_clip_is_skipped() {
        let player = Arc::new(ManualPlayer::default());
        let queue = PlaybackQueue::spawn(player.clone(), no_delay());
        let mut events = queue.subscribe();

        for name in ["A", "B", "C"] {
            queue.enqueue(AudioClip::new(name, name)).unwrap();
        }
        assert_eq!(next_started(&mut events).await.locator, "A");
        player.finish_current();
        assert_eq!(next_started(&mut events).await.locator, "B");
        player.fail_current("device lost");

        let failed = loop {
            if let PlaybackEvent::Failed { clip, reason } = events.recv().await.unwrap() {
                break (clip.locator, reason);
            }
        };
        assert_eq!(failed, ("B".to_string(), "device lost".to_string()));
        assert_eq!(next_started(&mut events).await.locator, "C");
        player.finish_current();
        queue.wait_idle().await;
        assert_eq!(player.played(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_rejected_clip_is_skipped() {
        let player = Arc::new(ManualPlayer {
            reject: vec!["B"],
            ..Default::default()
        });
        let queue = PlaybackQueue::spawn(player.clone(), no_delay());
        let mut events = queue.subscribe();

        queue.enqueue(AudioClip::new("A", "a")).unwrap();
        assert_eq!(next_started(&mut events).await.locator, "A");
        queue.enqueue(AudioClip::new("B", "b")).unwrap();
        queue.enqueue(AudioClip::new("C", "c")).unwrap();

        player.finish_current();
        assert_eq!(next_started(&mut events).await.locator, "C");
        assert_eq!(player.played(), vec!["A", "B", "C"]);
        player.finish_current();
        queue.wait_idle().await;
        assert_eq!(queue.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inter_clip_delay() {
        let player = Arc::new(ManualPlayer::default());
        let config = PlaybackConfig {
            start_threshold: 1,
            inter_clip_delay_ms: 150,
        };
        let queue = PlaybackQueue::spawn(player.clone(), config);
        let mut events = queue.subscribe();

        queue.enqueue(AudioClip::new("A", "a")).unwrap();
        queue.enqueue(AudioClip::new("B", "b")).unwrap();
        queue.enqueue(AudioClip::new("C", "c")).unwrap();
        assert_eq!(next_started(&mut events).await.locator, "A");

        let finished_at = Instant::now();
        player.finish_current();
        assert_eq!(next_started(&mut events).await.locator, "B");
        assert!(finished_at.elapsed() >= Duration::from_millis(150));

        // A failure advances without the pause.
        let failed_at = Instant::now();
        player.fail_current("decode error");
        assert_eq!(next_started(&mut events).await.locator, "C");
        assert!(failed_at.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_during_delay_cancels_next_clip() {
        let player = Arc::new(ManualPlayer::default());
        let config = PlaybackConfig {
            start_threshold: 1,
            inter_clip_delay_ms: 150,
        };
        let queue = PlaybackQueue::spawn(player.clone(), config);
        let mut events = queue.subscribe();

        queue.enqueue(AudioClip::new("A", "a")).unwrap();
        queue.enqueue(AudioClip::new("B", "b")).unwrap();
        assert_eq!(next_started(&mut events).await.locator, "A");
        player.finish_current();
        while !matches!(events.recv().await.unwrap(), PlaybackEvent::Finished(_)) {}

        assert_eq!(queue.interrupt().await, 1);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(player.played(), vec!["A"]);
        assert!(queue.is_idle());
    }

    #[tokio::test]
    async fn test_mute_reaches_player_and_keeps_order() {
        let player = Arc::new(ManualPlayer::default());
        let queue = PlaybackQueue::spawn(player.clone(), no_delay());
        let mut events = queue.subscribe();

        queue.enqueue(AudioClip::new("A", "a")).unwrap();
        queue.enqueue(AudioClip::new("B", "b")).unwrap();
        assert_eq!(next_started(&mut events).await.locator, "A");

        queue.set_muted(true);
        queue.set_muted(true);
        while !queue.snapshot().muted {
            tokio::task::yield_now().await;
        }
        let snapshot = queue.snapshot();
        assert_eq!(snapshot.active.map(|c| c.locator).as_deref(), Some("A"));
        assert_eq!(snapshot.pending, 1);

        player.finish_current();
        assert_eq!(next_started(&mut events).await.locator, "B");
        queue.set_muted(false);
        while queue.snapshot().muted {
            tokio::task::yield_now().await;
        }
        assert_eq!(*player.mutes.lock().unwrap(), vec![true, false]);
        assert_eq!(player.played(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_clip_from_before_interrupt_is_dropped() {
        let player = Arc::new(ManualPlayer::default());
        let queue = PlaybackQueue::spawn(player.clone(), no_delay());
        let mut events = queue.subscribe();

        let before = queue.generation();
        assert_eq!(queue.interrupt().await, 0);
        assert_eq!(queue.generation(), before + 1);

        queue.enqueue_in(AudioClip::new("stale", "s"), before).unwrap();
        queue.enqueue(AudioClip::new("D", "d")).unwrap();
        assert_eq!(next_started(&mut events).await.locator, "D");
        assert_eq!(player.played(), vec!["D"]);
        assert_eq!(queue.outstanding(), 1);
    }
}
