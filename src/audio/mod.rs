//! Audio capture and playback
//!
//! The device pipeline is fixed-format: 16 kHz, 16-bit linear PCM, mono, with
//! a fixed capture frame size. Controllers talk to the [`AudioInput`] and
//! [`AudioOutput`] traits; the cpal backends confine their streams to
//! dedicated threads because `cpal::Stream` is not `Send`.

mod capture;
mod playback;

use async_trait::async_trait;

use crate::{Error, Result};

pub use capture::CpalInput;
pub use playback::CpalOutput;

/// Sample rate for capture and playback (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Samples per capture frame
pub const FRAME_SAMPLES: usize = 1024;

/// Bytes per capture frame (16-bit samples)
pub const FRAME_BYTES: usize = FRAME_SAMPLES * 2;

/// Microphone-side PCM source
#[async_trait]
pub trait AudioInput: Send + Sync {
    /// Start capturing; idempotent while already capturing
    ///
    /// # Errors
    ///
    /// Returns error if the capture device cannot be opened
    fn start(&self) -> Result<()>;

    /// Stop capturing and discard any buffered samples
    fn stop(&self);

    /// Read exactly one frame ([`FRAME_BYTES`] of little-endian PCM)
    ///
    /// Pends until a full frame is available. Cancel-safe: no samples are
    /// consumed until a full frame is returned.
    ///
    /// # Errors
    ///
    /// Returns error if the device failed or capture was stopped
    async fn read_frame(&self) -> Result<Vec<u8>>;
}

/// Speaker-side PCM sink
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Queue raw little-endian PCM for playback
    ///
    /// Pends while the playback queue is full; callers that await this get
    /// natural backpressure instead of unbounded buffering.
    ///
    /// # Errors
    ///
    /// Returns error if the playback device is gone
    async fn write(&self, pcm: &[u8]) -> Result<()>;

    /// Set the playback gain, 0.0 to 1.0 of device maximum
    fn set_volume(&self, gain: f32);

    /// Ensure the output stream is running again after a session ends
    ///
    /// # Errors
    ///
    /// Returns error if the playback device is gone
    fn resume(&self) -> Result<()>;
}

/// Encode raw 16-bit PCM as WAV bytes (mic-test dumps)
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for sample in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_to_wav_writes_header() {
        let pcm: Vec<u8> = [0i16, 1000, -1000, 32767]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();

        let wav = pcm_to_wav(&pcm, SAMPLE_RATE).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert!(wav.len() > 44);
    }
}
