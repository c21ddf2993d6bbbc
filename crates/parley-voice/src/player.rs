//! Audio players for the playback queue.
//!
//! - `SimulatedPlayer`: no audio device; "plays" each clip for a duration proportional to its
//!   sentence length. Used by the terminal client and tests.
//! - `RodioPlayer` (feature `rodio`): downloads the clip and plays it on the default output device.

use crate::error::VoiceResult;
use crate::playback::{AudioClip, AudioPlayer, PlaybackReporter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Roughly 180 words per minute of speech.
const DEFAULT_PER_CHAR: Duration = Duration::from_millis(55);
const MIN_CLIP_DURATION: Duration = Duration::from_millis(300);

/// Timer-backed player: each clip "plays" for `per_char * sentence length`.
pub struct SimulatedPlayer {
    per_char: Duration,
    current: Mutex<Option<JoinHandle<()>>>,
    muted: AtomicBool,
}

impl Default for SimulatedPlayer {
    fn default() -> Self {
        Self::new(DEFAULT_PER_CHAR)
    }
}

impl SimulatedPlayer {
    pub fn new(per_char: Duration) -> Self {
        Self {
            per_char,
            current: Mutex::new(None),
            muted: AtomicBool::new(false),
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    fn clip_duration(&self, clip: &AudioClip) -> Duration {
        let chars = clip.sentence.chars().count() as u32;
        (self.per_char * chars).max(MIN_CLIP_DURATION)
    }
}

impl AudioPlayer for SimulatedPlayer {
    fn play(&self, clip: &AudioClip, reporter: PlaybackReporter) -> VoiceResult<()> {
        let duration = self.clip_duration(clip);
        info!(
            target: "parley::playback",
            clip = clip.id,
            muted = self.is_muted(),
            duration_ms = duration.as_millis() as u64,
            "🔊 {}",
            clip.sentence
        );
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            reporter.finished();
        });
        if let Ok(mut current) = self.current.lock() {
            if let Some(previous) = current.replace(handle) {
                previous.abort();
            }
        }
        Ok(())
    }

    fn stop(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some(handle) = current.take() {
                handle.abort();
                debug!(target: "parley::playback", "simulated clip stopped");
            }
        }
    }

    fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }
}

#[cfg(feature = "rodio")]
pub use self::device::RodioPlayer;

#[cfg(feature = "rodio")]
mod device {
    //! Output on the default audio device via a dedicated thread that owns the `rodio` stream
    //! (`OutputStream` is not `Send`).

    use crate::error::{VoiceError, VoiceResult};
    use crate::playback::{AudioClip, AudioPlayer, PlaybackReporter};
    use rodio::{OutputStream, Sink, Source};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::mpsc as std_mpsc;
    use std::sync::Arc;
    use std::time::Duration;
    use tracing::{debug, error, warn};

    const POLL_INTERVAL: Duration = Duration::from_millis(20);

    /// Locators produced when no TTS server is configured; nothing to fetch.
    const SILENT_SCHEME: &str = "silent://";

    enum DeviceCommand {
        Play { bytes: Vec<u8>, reporter: PlaybackReporter },
        Stop,
        SetMuted(bool),
    }

    pub struct RodioPlayer {
        commands: std_mpsc::Sender<DeviceCommand>,
        client: reqwest::Client,
        /// Bumped by `stop`; downloads started under an older generation are dropped.
        generation: Arc<AtomicU64>,
        muted: Arc<AtomicBool>,
    }

    impl RodioPlayer {
        /// Open the default output device. Fails when no device is available.
        pub fn new() -> VoiceResult<Self> {
            let (tx, rx) = std_mpsc::channel();
            let (ready_tx, ready_rx) = std_mpsc::channel();
            std::thread::Builder::new()
                .name("parley-audio".to_string())
                .spawn(move || device_thread(rx, ready_tx))?;
            ready_rx
                .recv()
                .map_err(|_| VoiceError::Playback("audio thread exited".to_string()))??;
            Ok(Self {
                commands: tx,
                client: reqwest::Client::new(),
                generation: Arc::new(AtomicU64::new(0)),
                muted: Arc::new(AtomicBool::new(false)),
            })
        }
    }

    impl AudioPlayer for RodioPlayer {
        fn play(&self, clip: &AudioClip, reporter: PlaybackReporter) -> VoiceResult<()> {
            if clip.locator.starts_with(SILENT_SCHEME) {
                reporter.finished();
                return Ok(());
            }
            let generation = self.generation.load(Ordering::SeqCst);
            let current = Arc::clone(&self.generation);
            let commands = self.commands.clone();
            let client = self.client.clone();
            let url = clip.locator.clone();
            tokio::spawn(async move {
                let bytes = match fetch(&client, &url).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        reporter.failed(e.to_string());
                        return;
                    }
                };
                if current.load(Ordering::SeqCst) != generation {
                    debug!(target: "parley::playback", url = %url, "download finished after stop; dropped");
                    return;
                }
                let _ = commands.send(DeviceCommand::Play { bytes, reporter });
            });
            Ok(())
        }

        fn stop(&self) {
            self.generation.fetch_add(1, Ordering::SeqCst);
            let _ = self.commands.send(DeviceCommand::Stop);
        }

        fn set_muted(&self, muted: bool) {
            self.muted.store(muted, Ordering::SeqCst);
            let _ = self.commands.send(DeviceCommand::SetMuted(muted));
        }
    }

    async fn fetch(client: &reqwest::Client, url: &str) -> VoiceResult<Vec<u8>> {
        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(VoiceError::Playback(format!("GET {} returned {}", url, response.status())));
        }
        Ok(response.bytes().await?.to_vec())
    }

    fn device_thread(rx: std_mpsc::Receiver<DeviceCommand>, ready: std_mpsc::Sender<VoiceResult<()>>) {
        let (_stream, handle) = match OutputStream::try_default() {
            Ok(pair) => pair,
            Err(e) => {
                let _ = ready.send(Err(VoiceError::Playback(format!("no audio output: {}", e))));
                return;
            }
        };
        let _ = ready.send(Ok(()));

        let mut muted = false;
        let mut current: Option<(Sink, PlaybackReporter)> = None;

        loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(DeviceCommand::Play { bytes, reporter }) => {
                    if let Some((sink, _)) = current.take() {
                        sink.stop();
                    }
                    let sink = match Sink::try_new(&handle) {
                        Ok(sink) => sink,
                        Err(e) => {
                            error!(target: "parley::playback", "sink creation failed: {}", e);
                            reporter.failed(e.to_string());
                            continue;
                        }
                    };
                    match rodio::Decoder::new(Cursor::new(bytes)) {
                        Ok(source) => {
                            sink.set_volume(if muted { 0.0 } else { 1.0 });
                            sink.append(source.convert_samples::<f32>());
                            current = Some((sink, reporter));
                        }
                        Err(e) => {
                            warn!(target: "parley::playback", "undecodable clip: {}", e);
                            reporter.failed(format!("decode failed: {}", e));
                        }
                    }
                }
                Ok(DeviceCommand::Stop) => {
                    if let Some((sink, _reporter)) = current.take() {
                        sink.stop();
                    }
                }
                Ok(DeviceCommand::SetMuted(m)) => {
                    muted = m;
                    if let Some((sink, _)) = current.as_ref() {
                        sink.set_volume(if muted { 0.0 } else { 1.0 });
                    }
                }
                Err(std_mpsc::RecvTimeoutError::Timeout) => {}
                Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
            }

            if current.as_ref().is_some_and(|(sink, _)| sink.empty()) {
                if let Some((_, reporter)) = current.take() {
                    reporter.finished();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlaybackConfig;
    use crate::playback::{PlaybackEvent, PlaybackQueue};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_simulated_player_finishes_after_duration() {
        let player = Arc::new(SimulatedPlayer::new(Duration::from_millis(100)));
        let queue = PlaybackQueue::spawn(player, PlaybackConfig::default());
        let mut events = queue.subscribe();

        queue.enqueue(AudioClip::new("sim://1", "Hello there.")).unwrap();
        let started = tokio::time::Instant::now();
        loop {
            if let PlaybackEvent::Finished(clip) = events.recv().await.unwrap() {
                assert_eq!(clip.locator, "sim://1");
                break;
            }
        }
        // 12 chars at 100ms each
        assert!(started.elapsed() >= Duration::from_millis(1200));
        queue.wait_idle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_player_stop_cancels_report() {
        let player = Arc::new(SimulatedPlayer::new(Duration::from_millis(100)));
        let queue = PlaybackQueue::spawn(player, PlaybackConfig::default());
        let mut events = queue.subscribe();

        queue.enqueue(AudioClip::new("sim://1", "A long sentence here.")).unwrap();
        queue.enqueue(AudioClip::new("sim://2", "Another one.")).unwrap();
        assert!(matches!(events.recv().await.unwrap(), PlaybackEvent::Started(_)));

        assert_eq!(queue.interrupt().await, 2);
        assert!(queue.is_idle());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(matches!(events.recv().await.unwrap(), PlaybackEvent::Interrupted { discarded: 2 }));
        assert!(events.try_recv().is_err());
    }
}
