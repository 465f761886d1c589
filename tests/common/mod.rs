//! Shared test doubles
//!
//! Mock peripherals, audio endpoints, transport and store used by the
//! controller tests. No audio hardware, GPIO or network is touched.

// Each integration test target compiles this module separately; not every
// target uses every helper.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};
use tokio_stream::wrappers::ReceiverStream;

use lantern_device::assistant::proto::{
    AudioOut, ConverseRequest, ConverseResponse, ConverseResult, converse_response,
};
use lantern_device::assistant::{ConversationTransport, ResponseStream, StreamHandle};
use lantern_device::audio::{AudioInput, AudioOutput};
use lantern_device::gpio::DigitalOutput;
use lantern_device::store::ActivationStore;
use lantern_device::{Error, Result};

/// Records every level written to a digital output
#[derive(Default)]
pub struct MockPin {
    pub levels: Mutex<Vec<bool>>,
}

impl MockPin {
    pub fn last(&self) -> Option<bool> {
        self.levels.lock().unwrap().last().copied()
    }

    pub fn low_transitions(&self) -> usize {
        self.levels.lock().unwrap().iter().filter(|v| !**v).count()
    }
}

impl DigitalOutput for MockPin {
    fn set(&self, value: bool) -> Result<()> {
        self.levels.lock().unwrap().push(value);
        Ok(())
    }
}

/// Records removed record keys
#[derive(Default)]
pub struct MockStore {
    pub removed: Mutex<Vec<String>>,
}

impl MockStore {
    pub fn removed_keys(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActivationStore for MockStore {
    async fn remove(&self, key: &str) -> Result<()> {
        self.removed.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

/// Scripted capture device
#[derive(Default)]
pub struct MockInput {
    frames: Mutex<VecDeque<std::result::Result<Vec<u8>, String>>>,
    notify: Notify,
    pub start_count: Mutex<usize>,
    pub stop_count: Mutex<usize>,
}

impl MockInput {
    /// Queue one frame for the next read
    pub fn push_frame(&self, frame: Vec<u8>) {
        self.frames.lock().unwrap().push_back(Ok(frame));
        self.notify.notify_one();
    }

    /// Queue a read failure
    pub fn push_error(&self, reason: &str) {
        self.frames
            .lock()
            .unwrap()
            .push_back(Err(reason.to_string()));
        self.notify.notify_one();
    }

    pub fn starts(&self) -> usize {
        *self.start_count.lock().unwrap()
    }

    pub fn stops(&self) -> usize {
        *self.stop_count.lock().unwrap()
    }
}

#[async_trait]
impl AudioInput for MockInput {
    fn start(&self) -> Result<()> {
        *self.start_count.lock().unwrap() += 1;
        Ok(())
    }

    fn stop(&self) {
        *self.stop_count.lock().unwrap() += 1;
    }

    async fn read_frame(&self) -> Result<Vec<u8>> {
        loop {
            if let Some(frame) = self.frames.lock().unwrap().pop_front() {
                return frame.map_err(Error::Audio);
            }
            self.notify.notified().await;
        }
    }
}

/// Recording playback device
#[derive(Default)]
pub struct MockOutput {
    pub written: Mutex<Vec<Vec<u8>>>,
    pub gains: Mutex<Vec<f32>>,
    pub resumes: Mutex<usize>,
}

impl MockOutput {
    pub fn last_gain(&self) -> Option<f32> {
        self.gains.lock().unwrap().last().copied()
    }

    pub fn resume_count(&self) -> usize {
        *self.resumes.lock().unwrap()
    }
}

#[async_trait]
impl AudioOutput for MockOutput {
    async fn write(&self, pcm: &[u8]) -> Result<()> {
        self.written.lock().unwrap().push(pcm.to_vec());
        Ok(())
    }

    fn set_volume(&self, gain: f32) {
        self.gains.lock().unwrap().push(gain);
    }

    fn resume(&self) -> Result<()> {
        *self.resumes.lock().unwrap() += 1;
        Ok(())
    }
}

/// One recorded conversation session opened through [`MockTransport`]
pub struct SessionProbe {
    /// Outbound frames as the transport would see them (audio only; the
    /// config arguments are recorded separately)
    pub outbound: mpsc::Receiver<ConverseRequest>,
    /// Feed for the session's inbound responses
    pub inbound: mpsc::Sender<std::result::Result<ConverseResponse, tonic::Status>>,
}

/// Scripted conversation transport
#[derive(Default)]
pub struct MockTransport {
    pub sessions: Mutex<Vec<SessionProbe>>,
    /// Arguments of every `begin` call: (prior state, volume)
    pub begins: Mutex<Vec<(Option<Vec<u8>>, u32)>>,
    pub fail_next: Mutex<bool>,
}

impl MockTransport {
    pub fn session_count(&self) -> usize {
        self.begins.lock().unwrap().len()
    }

    /// Take the probe for session `index`
    pub fn probe(&self, index: usize) -> SessionProbe {
        self.sessions.lock().unwrap().remove(index)
    }

    pub fn fail_next_begin(&self) {
        *self.fail_next.lock().unwrap() = true;
    }
}

#[async_trait]
impl ConversationTransport for MockTransport {
    async fn begin(
        &self,
        prior_state: Option<Vec<u8>>,
        volume_percentage: u32,
    ) -> Result<(StreamHandle, ResponseStream)> {
        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            return Err(Error::Connection("mock connect failure".to_string()));
        }

        self.begins
            .lock()
            .unwrap()
            .push((prior_state, volume_percentage));

        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);

        self.sessions.lock().unwrap().push(SessionProbe {
            outbound: out_rx,
            inbound: in_tx,
        });

        let inbound: ResponseStream = Box::pin(ReceiverStream::new(in_rx));
        Ok((StreamHandle::new(out_tx), inbound))
    }
}

/// Build a result response frame
pub fn result_response(state: &[u8], volume: i32, text: &str) -> ConverseResponse {
    ConverseResponse {
        payload: Some(converse_response::Payload::Result(ConverseResult {
            spoken_request_text: text.to_string(),
            conversation_state: state.to_vec(),
            volume_percentage: volume,
        })),
    }
}

/// Build an audio-out response frame
pub fn audio_response(pcm: &[u8]) -> ConverseResponse {
    ConverseResponse {
        payload: Some(converse_response::Payload::AudioOut(AudioOut {
            audio_data: pcm.to_vec(),
        })),
    }
}
