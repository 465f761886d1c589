//! Audio capture from microphone

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use tokio::sync::Notify;

use super::{AudioInput, FRAME_SAMPLES, SAMPLE_RATE};
use crate::{Error, Result};

/// Cap on buffered capture audio (10s); older samples are dropped past this
const MAX_BUFFERED_SAMPLES: usize = SAMPLE_RATE as usize * 10;

/// Captures audio from the default input device
///
/// The `cpal::Stream` lives on a dedicated capture thread; this handle is
/// cheap to share and `Send + Sync`.
pub struct CpalInput {
    shared: Arc<InputShared>,
    worker: Mutex<Option<mpsc::Sender<()>>>,
}

struct InputShared {
    samples: Mutex<VecDeque<i16>>,
    notify: Notify,
    running: AtomicBool,
    failed: AtomicBool,
}

impl CpalInput {
    /// Create a new capture instance, probing the default input device
    ///
    /// # Errors
    ///
    /// Returns error if no input device supports the fixed capture format
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable capture config found".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = supported.channels(),
            "audio capture initialized"
        );

        Ok(Self {
            shared: Arc::new(InputShared {
                samples: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                running: AtomicBool::new(false),
                failed: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        })
    }
}

#[async_trait]
impl AudioInput for CpalInput {
    fn start(&self) -> Result<()> {
        let mut worker = self
            .worker
            .lock()
            .map_err(|_| Error::Audio("capture state poisoned".to_string()))?;
        if worker.is_some() {
            return Ok(());
        }

        if let Ok(mut buf) = self.shared.samples.lock() {
            buf.clear();
        }
        self.shared.failed.store(false, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);

        let (stop_tx, stop_rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        std::thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || capture_thread(&shared, &stop_rx))
            .map_err(|e| Error::Audio(format!("failed to spawn capture thread: {e}")))?;

        *worker = Some(stop_tx);
        tracing::debug!("audio capture started");
        Ok(())
    }

    fn stop(&self) {
        let stop_tx = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(tx) = stop_tx {
            self.shared.running.store(false, Ordering::SeqCst);
            let _ = tx.send(());
            // Wake any pending read so it observes the stopped state.
            self.shared.notify.notify_one();
            tracing::debug!("audio capture stopped");
        }
    }

    async fn read_frame(&self) -> Result<Vec<u8>> {
        loop {
            if let Ok(mut buf) = self.shared.samples.lock() {
                if buf.len() >= FRAME_SAMPLES {
                    let mut frame = Vec::with_capacity(FRAME_SAMPLES * 2);
                    for sample in buf.drain(..FRAME_SAMPLES) {
                        frame.extend_from_slice(&sample.to_le_bytes());
                    }
                    return Ok(frame);
                }
            }

            if self.shared.failed.load(Ordering::SeqCst) {
                return Err(Error::Audio("capture device failed".to_string()));
            }
            if !self.shared.running.load(Ordering::SeqCst) {
                return Err(Error::Audio("capture not running".to_string()));
            }

            self.shared.notify.notified().await;
        }
    }
}

/// Body of the capture thread: owns the stream until told to stop
fn capture_thread(shared: &Arc<InputShared>, stop_rx: &mpsc::Receiver<()>) {
    let host = cpal::default_host();
    let Some(device) = host.default_input_device() else {
        tracing::error!("no input device");
        fail(shared);
        return;
    };

    let config = cpal::StreamConfig {
        channels: 1,
        sample_rate: SampleRate(SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    };

    let data_shared = Arc::clone(shared);
    let error_shared = Arc::clone(shared);
    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if let Ok(mut buf) = data_shared.samples.lock() {
                for &sample in data {
                    #[allow(clippy::cast_possible_truncation)]
                    let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                    buf.push_back(sample_i16);
                }
                while buf.len() > MAX_BUFFERED_SAMPLES {
                    buf.pop_front();
                }
            }
            data_shared.notify.notify_one();
        },
        move |err| {
            tracing::error!(error = %err, "audio capture error");
            fail(&error_shared);
        },
        None,
    );

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to build capture stream");
            fail(shared);
            return;
        }
    };

    if let Err(e) = stream.play() {
        tracing::error!(error = %e, "failed to start capture stream");
        fail(shared);
        return;
    }

    // Park until stop() fires or the handle is dropped; the stream dies here.
    let _ = stop_rx.recv();
    drop(stream);
}

fn fail(shared: &Arc<InputShared>) {
    shared.failed.store(true, Ordering::SeqCst);
    shared.notify.notify_one();
}
