//! Audio playback to speakers

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;

use super::{AudioOutput, SAMPLE_RATE};
use crate::{Error, Result};

/// High-water mark for queued playback audio (1s); writes pend above this
const MAX_QUEUED_SAMPLES: usize = SAMPLE_RATE as usize;

/// Poll interval while the playback queue drains
const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Commands for the playback thread
enum OutputCmd {
    Resume,
    Shutdown,
}

/// Plays 16-bit PCM to the default output device
///
/// A continuous output stream runs on a dedicated thread from construction;
/// sessions push samples into a bounded queue and underruns play silence.
pub struct CpalOutput {
    shared: Arc<OutputShared>,
    cmd: Mutex<mpsc::Sender<OutputCmd>>,
}

struct OutputShared {
    queue: Mutex<VecDeque<i16>>,
    /// Playback gain as f32 bits, 0.0..=1.0 of device maximum
    gain: AtomicU32,
}

impl CpalOutput {
    /// Create a playback instance and start its output stream
    ///
    /// # Errors
    ///
    /// Returns error if no output device supports the fixed playback format
    pub fn new() -> Result<Self> {
        let shared = Arc::new(OutputShared {
            queue: Mutex::new(VecDeque::new()),
            gain: AtomicU32::new(1.0f32.to_bits()),
        });

        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let thread_shared = Arc::clone(&shared);
        std::thread::Builder::new()
            .name("audio-playback".to_string())
            .spawn(move || playback_thread(&thread_shared, &cmd_rx, &ready_tx))
            .map_err(|e| Error::Audio(format!("failed to spawn playback thread: {e}")))?;

        ready_rx
            .recv()
            .map_err(|_| Error::Audio("playback thread exited during init".to_string()))??;

        Ok(Self {
            shared,
            cmd: Mutex::new(cmd_tx),
        })
    }

    fn send(&self, cmd: OutputCmd) -> Result<()> {
        self.cmd
            .lock()
            .map_err(|_| Error::Audio("playback state poisoned".to_string()))?
            .send(cmd)
            .map_err(|_| Error::Audio("playback thread stopped".to_string()))
    }
}

#[async_trait]
impl AudioOutput for CpalOutput {
    async fn write(&self, pcm: &[u8]) -> Result<()> {
        let samples: Vec<i16> = pcm
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();

        loop {
            {
                let mut queue = self
                    .shared
                    .queue
                    .lock()
                    .map_err(|_| Error::Audio("playback queue poisoned".to_string()))?;
                if queue.len() <= MAX_QUEUED_SAMPLES {
                    queue.extend(samples);
                    return Ok(());
                }
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
    }

    fn set_volume(&self, gain: f32) {
        let gain = gain.clamp(0.0, 1.0);
        self.shared.gain.store(gain.to_bits(), Ordering::SeqCst);
        tracing::debug!(gain, "playback gain set");
    }

    fn resume(&self) -> Result<()> {
        self.send(OutputCmd::Resume)
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        let _ = self.send(OutputCmd::Shutdown);
    }
}

/// Body of the playback thread: owns the stream for the process lifetime
fn playback_thread(
    shared: &Arc<OutputShared>,
    cmd_rx: &mpsc::Receiver<OutputCmd>,
    ready_tx: &mpsc::Sender<Result<()>>,
) {
    let stream = match build_output_stream(shared) {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(Error::Audio(e.to_string())));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    loop {
        match cmd_rx.recv() {
            Ok(OutputCmd::Resume) => {
                if let Err(e) = stream.play() {
                    tracing::error!(error = %e, "failed to resume playback stream");
                }
            }
            Ok(OutputCmd::Shutdown) | Err(_) => break,
        }
    }

    drop(stream);
}

/// Open the default output device at the fixed format (stereo fallback)
fn build_output_stream(shared: &Arc<OutputShared>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
        .or_else(|| {
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
        })
        .ok_or_else(|| Error::Audio("no suitable playback config found".to_string()))?;

    let config = supported.with_sample_rate(SampleRate(SAMPLE_RATE)).config();
    let channels = config.channels as usize;

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = SAMPLE_RATE,
        channels,
        "audio playback initialized"
    );

    let data_shared = Arc::clone(shared);
    device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let gain = f32::from_bits(data_shared.gain.load(Ordering::SeqCst));
                let mut queue = data_shared.queue.lock().ok();

                for frame in data.chunks_mut(channels) {
                    let sample = queue
                        .as_deref_mut()
                        .and_then(VecDeque::pop_front)
                        .map_or(0.0, |s| f32::from(s) / 32768.0 * gain);

                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))
}
