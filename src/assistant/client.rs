//! Duplex conversation stream to the assistant service
//!
//! One `Converse` call per push-to-talk session: the config frame goes out
//! first, audio frames follow while the trigger is held, and the inbound
//! side is pumped in arrival order until the transport completes.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};

use super::proto::{
    AudioEncoding, AudioInConfig, AudioOutConfig, ConverseConfig, ConverseRequest,
    ConverseResponse, ConverseState, EventType, converse_request, converse_response,
};
use crate::audio::{AudioOutput, SAMPLE_RATE};
use crate::gpio::DigitalOutput;
use crate::{Error, Result};

/// Full method path of the duplex call
const CONVERSE_METHOD: &str = "/assistant.embedded.v1.EmbeddedAssistant/Converse";

/// Outbound frame queue depth; small so frame sends backpressure the reader
const OUTBOUND_QUEUE: usize = 16;

/// Inbound half of an open conversation stream
pub type ResponseStream =
    Pin<Box<dyn Stream<Item = std::result::Result<ConverseResponse, tonic::Status>> + Send>>;

/// Events surfaced to the controller while a session's responses drain
#[derive(Debug)]
pub enum SessionEvent {
    /// A result frame arrived: transcript, continuation token, volume
    Result {
        /// Transcribed request text; empty when no new text this frame
        text: String,
        /// Updated continuation token; empty when unchanged
        state: Vec<u8>,
        /// New volume percentage; 0 means unchanged
        volume: u32,
    },
    /// Terminal failure, either an error frame or a transport error
    Failed(String),
    /// The inbound stream completed; no further frames will arrive
    Closed,
}

/// Opens duplex conversation streams against a fixed endpoint
#[async_trait]
pub trait ConversationTransport: Send + Sync {
    /// Open a new stream and queue its config frame
    ///
    /// `prior_state` is the continuation token from the previous turn, absent
    /// on the first call of a process lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the stream cannot be established; the
    /// caller must not send audio in that case.
    async fn begin(
        &self,
        prior_state: Option<Vec<u8>>,
        volume_percentage: u32,
    ) -> Result<(StreamHandle, ResponseStream)>;
}

/// gRPC-backed conversation transport
pub struct ConversationClient {
    channel: Channel,
}

impl ConversationClient {
    /// Create a client for the given endpoint URL
    ///
    /// The underlying channel connects lazily; connectivity errors surface
    /// from [`ConversationTransport::begin`], not here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the endpoint URL is invalid.
    pub fn connect(endpoint: &str) -> Result<Self> {
        let channel = Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| Error::Connection(format!("invalid endpoint {endpoint}: {e}")))?
            .connect_lazy();

        tracing::debug!(endpoint, "conversation client created");
        Ok(Self { channel })
    }
}

#[async_trait]
impl ConversationTransport for ConversationClient {
    async fn begin(
        &self,
        prior_state: Option<Vec<u8>>,
        volume_percentage: u32,
    ) -> Result<(StreamHandle, ResponseStream)> {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| Error::Connection(format!("service not ready: {e}")))?;

        let (tx, rx) = mpsc::channel::<ConverseRequest>(OUTBOUND_QUEUE);
        tx.send(config_request(prior_state, volume_percentage))
            .await
            .map_err(|_| Error::Connection("request queue closed".to_string()))?;

        let codec: tonic::codec::ProstCodec<ConverseRequest, ConverseResponse> =
            tonic::codec::ProstCodec::default();
        let path = PathAndQuery::from_static(CONVERSE_METHOD);

        let response = grpc
            .streaming(tonic::Request::new(ReceiverStream::new(rx)), path, codec)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let inbound: ResponseStream = Box::pin(response.into_inner());
        Ok((StreamHandle::new(tx), inbound))
    }
}

/// Exclusive write-handle for one open conversation stream
///
/// Owned by exactly one session at a time. Dropping or [`end`]ing the handle
/// half-closes the transport; the inbound side keeps draining independently.
///
/// [`end`]: StreamHandle::end
pub struct StreamHandle {
    tx: Option<mpsc::Sender<ConverseRequest>>,
}

impl StreamHandle {
    /// Wrap an outbound frame queue; used by transport implementations
    #[must_use]
    pub const fn new(tx: mpsc::Sender<ConverseRequest>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Append one raw audio chunk to the open stream
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stream`] if called after [`end`](Self::end) or after
    /// the transport dropped the stream.
    pub async fn send_audio(&mut self, frame: Vec<u8>) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::Stream("audio frame sent after end of request".to_string()))?;

        tx.send(audio_request(frame))
            .await
            .map_err(|_| Error::Stream("request stream closed by transport".to_string()))
    }

    /// Signal that no more audio will be sent
    ///
    /// Idempotent: the first call half-closes the transport, later calls are
    /// no-ops.
    pub fn end(&mut self) {
        if self.tx.take().is_some() {
            tracing::debug!("request stream half-closed");
        }
    }

    /// Whether the handle can still send audio
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.tx.is_some()
    }
}

/// Build the config frame sent at the head of every stream
fn config_request(prior_state: Option<Vec<u8>>, volume_percentage: u32) -> ConverseRequest {
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    let config = ConverseConfig {
        audio_in_config: Some(AudioInConfig {
            encoding: AudioEncoding::Linear16 as i32,
            sample_rate_hertz: SAMPLE_RATE as i32,
        }),
        audio_out_config: Some(AudioOutConfig {
            encoding: AudioEncoding::Linear16 as i32,
            sample_rate_hertz: SAMPLE_RATE as i32,
            volume_percentage: volume_percentage as i32,
        }),
        converse_state: prior_state.map(|conversation_state| ConverseState { conversation_state }),
    };

    ConverseRequest {
        payload: Some(converse_request::Payload::Config(config)),
    }
}

/// Wrap one capture chunk as an audio-in frame
fn audio_request(frame: Vec<u8>) -> ConverseRequest {
    ConverseRequest {
        payload: Some(converse_request::Payload::AudioIn(frame)),
    }
}

/// Drain inbound frames in arrival order until the transport completes
///
/// Audio-out payloads are written to the playback device before the next
/// frame is taken; the bounded playback queue is the intended backpressure.
/// On completion the LED is forced off and [`SessionEvent::Closed`] is sent.
pub(crate) async fn pump_responses(
    mut inbound: ResponseStream,
    output: Arc<dyn AudioOutput>,
    led: Arc<dyn DigitalOutput>,
    events: mpsc::Sender<SessionEvent>,
) {
    let mut heartbeat = true;

    loop {
        match inbound.next().await {
            Some(Ok(response)) => {
                dispatch_response(response, &output, &led, &events, &mut heartbeat).await;
            }
            Some(Err(status)) => {
                tracing::error!(error = %status, "conversation stream transport error");
                let _ = events.send(SessionEvent::Failed(status.to_string())).await;
                break;
            }
            None => break,
        }
    }

    if let Err(e) = led.set(false) {
        tracing::warn!(error = %e, "error turning off LED");
    }

    tracing::info!("assistant response finished");
    let _ = events.send(SessionEvent::Closed).await;
}

/// Handle one inbound frame
async fn dispatch_response(
    response: ConverseResponse,
    output: &Arc<dyn AudioOutput>,
    led: &Arc<dyn DigitalOutput>,
    events: &mpsc::Sender<SessionEvent>,
    heartbeat: &mut bool,
) {
    match response.payload {
        Some(converse_response::Payload::EventType(event)) => {
            tracing::debug!(
                event = ?EventType::try_from(event).unwrap_or(EventType::Unspecified),
                "converse response event"
            );
        }
        Some(converse_response::Payload::Result(result)) => {
            let volume = u32::try_from(result.volume_percentage.max(0)).unwrap_or(0);
            let _ = events
                .send(SessionEvent::Result {
                    text: result.spoken_request_text,
                    state: result.conversation_state,
                    volume,
                })
                .await;
        }
        Some(converse_response::Payload::AudioOut(audio)) => {
            tracing::debug!(bytes = audio.audio_data.len(), "converse audio frame");
            if let Err(e) = output.write(&audio.audio_data).await {
                tracing::error!(error = %e, "error writing playback audio");
            }
            *heartbeat = !*heartbeat;
            if let Err(e) = led.set(*heartbeat) {
                tracing::warn!(error = %e, "error toggling LED");
            }
        }
        Some(converse_response::Payload::Error(status)) => {
            tracing::error!(code = status.code, message = %status.message, "converse response error");
            let _ = events
                .send(SessionEvent::Failed(format!(
                    "service error {}: {}",
                    status.code, status.message
                )))
                .await;
        }
        None => tracing::debug!("empty converse response frame"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_config_carries_no_state() {
        let request = config_request(None, 100);
        let Some(converse_request::Payload::Config(config)) = request.payload else {
            panic!("expected config payload");
        };

        assert!(config.converse_state.is_none());
        let out = config.audio_out_config.expect("audio out config");
        assert_eq!(out.volume_percentage, 100);
        assert_eq!(out.sample_rate_hertz, 16000);
    }

    #[test]
    fn config_carries_prior_state_token() {
        let request = config_request(Some(vec![1, 2, 3]), 40);
        let Some(converse_request::Payload::Config(config)) = request.payload else {
            panic!("expected config payload");
        };

        let state = config.converse_state.expect("converse state");
        assert_eq!(state.conversation_state, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn end_is_idempotent() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut handle = StreamHandle::new(tx);

        handle.send_audio(vec![0u8; 4]).await.unwrap();
        handle.end();
        handle.end();

        // Exactly one audio frame, then a clean close with no second signal.
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_after_end_is_rejected() {
        let (tx, _rx) = mpsc::channel(4);
        let mut handle = StreamHandle::new(tx);

        handle.end();
        let err = handle.send_audio(vec![0u8; 4]).await.unwrap_err();
        assert!(matches!(err, Error::Stream(_)));
    }
}
