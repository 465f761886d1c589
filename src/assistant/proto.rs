//! Wire frames for the assistant `Converse` stream
//!
//! Hand-rolled prost messages mirroring the service's protobuf schema.
//! Requests are a oneof of `{config, audio_in}`; responses a oneof of
//! `{error, event_type, audio_out, result}`.

/// Audio encoding for capture and synthesis
#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum AudioEncoding {
    /// Not set; rejected by the service
    Unspecified = 0,
    /// Uncompressed 16-bit signed little-endian PCM
    Linear16 = 1,
    /// Free lossless codec
    Flac = 2,
}

/// Capture-side audio configuration
#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct AudioInConfig {
    /// Encoding of the audio frames sent on this stream
    #[prost(enumeration = "AudioEncoding", tag = "1")]
    pub encoding: i32,

    /// Sample rate of the audio frames in hertz
    #[prost(int32, tag = "2")]
    pub sample_rate_hertz: i32,
}

/// Synthesis-side audio configuration
#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct AudioOutConfig {
    /// Encoding requested for synthesized audio
    #[prost(enumeration = "AudioEncoding", tag = "1")]
    pub encoding: i32,

    /// Sample rate requested for synthesized audio in hertz
    #[prost(int32, tag = "2")]
    pub sample_rate_hertz: i32,

    /// Current device volume, 1-100; informs the service's gain decisions
    #[prost(int32, tag = "3")]
    pub volume_percentage: i32,
}

/// Opaque multi-turn continuation token wrapper
#[derive(Clone, PartialEq, prost::Message)]
pub struct ConverseState {
    /// Token returned by the previous turn's result frame
    #[prost(bytes = "vec", tag = "1")]
    pub conversation_state: Vec<u8>,
}

/// Configuration frame; sent exactly once, before any audio
#[derive(Clone, PartialEq, prost::Message)]
pub struct ConverseConfig {
    /// Capture audio format
    #[prost(message, optional, tag = "1")]
    pub audio_in_config: Option<AudioInConfig>,

    /// Synthesis audio format and volume
    #[prost(message, optional, tag = "2")]
    pub audio_out_config: Option<AudioOutConfig>,

    /// Continuation state from the prior turn, when one exists
    #[prost(message, optional, tag = "3")]
    pub converse_state: Option<ConverseState>,
}

/// One outbound frame on the duplex stream
#[derive(Clone, PartialEq, prost::Message)]
pub struct ConverseRequest {
    #[prost(oneof = "converse_request::Payload", tags = "1, 2")]
    pub payload: Option<converse_request::Payload>,
}

pub mod converse_request {
    /// Request payload variants
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Payload {
        /// Stream configuration; first frame only
        #[prost(message, tag = "1")]
        Config(super::ConverseConfig),

        /// One chunk of raw capture audio
        #[prost(bytes = "vec", tag = "2")]
        AudioIn(Vec<u8>),
    }
}

/// Service-reported error status
#[derive(Clone, PartialEq, prost::Message)]
pub struct ServiceStatus {
    /// Canonical status code
    #[prost(int32, tag = "1")]
    pub code: i32,

    /// Developer-facing error message
    #[prost(string, tag = "2")]
    pub message: String,
}

/// Mid-stream service event
#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum EventType {
    /// Not set
    Unspecified = 0,
    /// The service detected the end of the spoken request
    EndOfUtterance = 1,
}

/// Synthesized speech payload
#[derive(Clone, PartialEq, prost::Message)]
pub struct AudioOut {
    /// Raw PCM bytes to play immediately
    #[prost(bytes = "vec", tag = "1")]
    pub audio_data: Vec<u8>,
}

/// Semantic result of a turn
#[derive(Clone, PartialEq, prost::Message)]
pub struct ConverseResult {
    /// Transcription of the spoken request; empty when no new text
    #[prost(string, tag = "1")]
    pub spoken_request_text: String,

    /// Continuation token to carry into the next turn
    #[prost(bytes = "vec", tag = "2")]
    pub conversation_state: Vec<u8>,

    /// New device volume; 0 means unchanged
    #[prost(int32, tag = "3")]
    pub volume_percentage: i32,
}

/// One inbound frame on the duplex stream
#[derive(Clone, PartialEq, prost::Message)]
pub struct ConverseResponse {
    #[prost(oneof = "converse_response::Payload", tags = "1, 2, 3, 5")]
    pub payload: Option<converse_response::Payload>,
}

pub mod converse_response {
    /// Response payload variants
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Payload {
        /// Terminal failure for this session
        #[prost(message, tag = "1")]
        Error(super::ServiceStatus),

        /// Informational service event
        #[prost(enumeration = "super::EventType", tag = "2")]
        EventType(i32),

        /// Synthesized speech to play back
        #[prost(message, tag = "3")]
        AudioOut(super::AudioOut),

        /// Turn result: transcript, continuation token, volume
        #[prost(message, tag = "5")]
        Result(super::ConverseResult),
    }
}
