//! Push-to-talk controller
//!
//! One worker task owns the whole session lifecycle, so stream calls and
//! frame sends are strictly ordered and never overlap. The select loop is
//! biased: shutdown, trigger transitions and session events are always
//! observed before the next frame read, which is what lets a release cancel
//! the pending read promptly.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use super::client::{ConversationTransport, SessionEvent, StreamHandle, pump_responses};
use crate::audio::{AudioInput, AudioOutput};
use crate::gpio::{DigitalOutput, TriggerEvent};
use crate::prefs::Prefs;
use crate::Result;

/// Session event queue depth
const SESSION_EVENTS: usize = 16;

/// Push-to-talk session states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PttState {
    /// No session; a press starts one
    Idle,
    /// Trigger held, capture frames flowing to the stream
    Streaming,
    /// Session teardown in progress
    Stopping,
}

/// Binds the physical trigger to conversation stream sessions
pub struct PushToTalkController {
    transport: Arc<dyn ConversationTransport>,
    input: Arc<dyn AudioInput>,
    output: Arc<dyn AudioOutput>,
    led: Arc<dyn DigitalOutput>,
    prefs: Prefs,
    state: PttState,
    conversation_state: Option<Vec<u8>>,
    volume_percentage: u32,
    handle: Option<StreamHandle>,
    /// Frame loop enabled; cleared on read errors so a dead device is not
    /// polled again until the next session
    reading: bool,
}

impl PushToTalkController {
    /// Create a controller; `volume_percentage` is the restored preference
    #[must_use]
    pub fn new(
        transport: Arc<dyn ConversationTransport>,
        input: Arc<dyn AudioInput>,
        output: Arc<dyn AudioOutput>,
        led: Arc<dyn DigitalOutput>,
        prefs: Prefs,
        volume_percentage: u32,
    ) -> Self {
        Self {
            transport,
            input,
            output,
            led,
            prefs,
            state: PttState::Idle,
            conversation_state: None,
            volume_percentage: volume_percentage.min(100),
            handle: None,
            reading: false,
        }
    }

    /// Run until shutdown fires or the trigger source closes
    pub async fn run(
        mut self,
        mut trigger: mpsc::Receiver<TriggerEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let (session_tx, mut session_rx) = mpsc::channel(SESSION_EVENTS);

        loop {
            if self.state == PttState::Streaming && self.reading {
                let input = Arc::clone(&self.input);
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => {
                        self.shutdown_session();
                        break;
                    }
                    event = trigger.recv() => match event {
                        Some(event) => self.handle_trigger(event, &session_tx).await,
                        None => {
                            self.shutdown_session();
                            break;
                        }
                    },
                    Some(event) = session_rx.recv() => self.handle_session_event(event),
                    frame = input.read_frame() => self.forward_frame(frame).await,
                }
            } else {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => {
                        self.shutdown_session();
                        break;
                    }
                    event = trigger.recv() => match event {
                        Some(event) => self.handle_trigger(event, &session_tx).await,
                        None => {
                            self.shutdown_session();
                            break;
                        }
                    },
                    Some(event) = session_rx.recv() => self.handle_session_event(event),
                }
            }
        }

        tracing::info!("push-to-talk controller stopped");
    }

    /// Dispatch a debounced trigger transition
    async fn handle_trigger(
        &mut self,
        event: TriggerEvent,
        session_tx: &mpsc::Sender<SessionEvent>,
    ) {
        // The LED mirrors the raw trigger level; failures are not fatal.
        if let Err(e) = self.led.set(event == TriggerEvent::Pressed) {
            tracing::debug!(error = %e, "error toggling LED");
        }

        match (event, self.state) {
            (TriggerEvent::Pressed, PttState::Idle) => self.start_session(session_tx).await,
            (TriggerEvent::Pressed, _) => {
                tracing::debug!(state = ?self.state, "ignoring trigger press");
            }
            (TriggerEvent::Released, PttState::Streaming) => self.stop_session(),
            (TriggerEvent::Released, _) => {}
        }
    }

    /// Trigger-press from `Idle`: open a stream and enter `Streaming`
    async fn start_session(&mut self, session_tx: &mpsc::Sender<SessionEvent>) {
        tracing::info!("starting assistant request");

        if let Err(e) = self.input.start() {
            tracing::error!(error = %e, "failed to start audio capture");
            return;
        }

        match self
            .transport
            .begin(self.conversation_state.clone(), self.volume_percentage)
            .await
        {
            Ok((handle, inbound)) => {
                self.handle = Some(handle);
                tokio::spawn(pump_responses(
                    inbound,
                    Arc::clone(&self.output),
                    Arc::clone(&self.led),
                    session_tx.clone(),
                ));
                self.state = PttState::Streaming;
                self.reading = true;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to open conversation stream");
                self.input.stop();
            }
        }
    }

    /// Trigger-release from `Streaming`: finalize and return to `Idle`
    ///
    /// The response pump keeps draining independently; it does not hold the
    /// session open.
    fn stop_session(&mut self) {
        self.state = PttState::Stopping;
        tracing::info!("ending assistant request");

        if let Some(handle) = self.handle.as_mut() {
            handle.end();
        }
        self.reading = false;
        self.input.stop();

        if let Err(e) = self.output.resume() {
            tracing::warn!(error = %e, "error resuming playback");
        }

        self.state = PttState::Idle;
    }

    /// Forward one capture frame to the open stream
    async fn forward_frame(&mut self, frame: Result<Vec<u8>>) {
        match frame {
            Ok(frame) => {
                if let Some(handle) = self.handle.as_mut() {
                    if let Err(e) = handle.send_audio(frame).await {
                        tracing::warn!(error = %e, "dropping audio frame");
                        self.reading = false;
                    }
                }
            }
            Err(e) => {
                // A failed read ends the frame loop; the session itself stays
                // up until the trigger is released.
                tracing::error!(error = %e, "error reading from audio stream");
                self.reading = false;
            }
        }
    }

    /// Apply an event from the response pump
    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Result {
                text,
                state,
                volume,
            } => {
                if !state.is_empty() {
                    self.conversation_state = Some(state);
                }
                if volume != 0 {
                    self.apply_volume(volume);
                }
                if !text.is_empty() {
                    tracing::info!(text = %text, "assistant request text");
                }
            }
            SessionEvent::Failed(reason) => {
                tracing::error!(reason = %reason, "conversation stream failed");
            }
            SessionEvent::Closed => {
                if self.state == PttState::Streaming {
                    // The stream died while the trigger is still held; tear
                    // down exactly as on a normal completion.
                    tracing::warn!("conversation stream closed mid-session");
                    self.stop_session();
                }
                self.handle = None;
            }
        }
    }

    /// Apply and persist an assistant-issued volume change
    fn apply_volume(&mut self, volume: u32) {
        let volume = volume.min(100);
        self.volume_percentage = volume;

        #[allow(clippy::cast_precision_loss)]
        let gain = volume as f32 / 100.0;
        self.output.set_volume(gain);

        if let Err(e) = self.prefs.set_volume_percentage(volume) {
            tracing::warn!(error = %e, "failed to persist volume");
        }
        tracing::info!(volume, "assistant volume changed");
    }

    /// Process shutdown: finalize any live session without panicking
    fn shutdown_session(&mut self) {
        if self.state == PttState::Streaming {
            if let Some(handle) = self.handle.as_mut() {
                handle.end();
            }
            self.reading = false;
            self.input.stop();
        }

        if let Err(e) = self.led.set(false) {
            tracing::debug!(error = %e, "error turning off LED");
        }
    }
}
