//! Audio capture and encoding collaborators.
//!
//! The task core talks to audio hardware through two narrow interfaces:
//! [`AudioRecorder`] blocks until the recording ends (stop signal,
//! cancellation or max-duration timeout) and returns raw PCM; [`AudioEncoder`]
//! turns the PCM into an upload-ready blob.

pub mod capture;
pub mod encode;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use capture::CpalRecorder;
pub use encode::WavEncoder;

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

/// Raw captured audio: mono, signed 16-bit PCM.
#[derive(Debug, Clone)]
pub struct Recording {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl Recording {
    /// Duration of the recording in seconds.
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// AudioError
// ---------------------------------------------------------------------------

/// Errors from recording or encoding.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The recording ended before the minimum duration; treated as an
    /// accidental tap and discarded.
    #[error("recording too short: {actual_secs:.1}s, minimum is {min_secs:.1}s")]
    TooShort { actual_secs: f32, min_secs: f32 },

    /// The recording was cancelled (abort or max-duration timeout).
    #[error("recording cancelled")]
    Cancelled,

    /// The capture device could not be opened or failed mid-stream.
    #[error("audio device error: {0}")]
    Device(String),

    /// Encoding the captured samples failed.
    #[error("audio encoding failed: {0}")]
    Encode(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Captures audio until stopped.
///
/// `record` blocks until one of: `stop` is triggered (normal end of
/// recording), `cancel` fires (abort or timeout), or an internal failure.
/// Implementations enforce the minimum and maximum recording durations.
#[async_trait]
pub trait AudioRecorder: Send + Sync {
    async fn record(
        &self,
        cancel: CancellationToken,
        stop: CancellationToken,
    ) -> Result<Recording, AudioError>;
}

/// Pure transform from captured PCM to an encoded blob; no external I/O.
pub trait AudioEncoder: Send + Sync {
    fn encode(&self, recording: &Recording) -> Result<Vec<u8>, AudioError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
