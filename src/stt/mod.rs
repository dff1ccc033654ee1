//! Speech-to-text collaborator.
//!
//! [`Transcriber`] is the narrow interface the task core drives: one
//! network-bound `transcribe` pass over the encoded audio, plus an optional
//! `repair` pass that rewrites the raw transcript using a context hint.
//! Both must honor the task's cancellation token.

pub mod openai;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use openai::OpenAiTranscriber;

// ---------------------------------------------------------------------------
// SttError
// ---------------------------------------------------------------------------

/// Errors from the transcription service.
#[derive(Debug, Error)]
pub enum SttError {
    /// HTTP transport or connection error.
    #[error("transcription request failed: {0}")]
    Request(String),

    /// The request did not complete within the client timeout.
    #[error("transcription request timed out")]
    Timeout,

    /// The response could not be parsed as expected JSON.
    #[error("failed to parse transcription response: {0}")]
    Parse(String),

    /// The service returned no usable text.
    #[error("transcription service returned an empty response")]
    EmptyResponse,

    /// The call was cancelled through the task's cancellation token.
    #[error("transcription cancelled")]
    Cancelled,

    /// No API key in the environment or the config file.
    #[error("OpenAI API key is not set")]
    MissingApiKey,
}

impl From<reqwest::Error> for SttError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SttError::Timeout
        } else {
            SttError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Transcriber trait
// ---------------------------------------------------------------------------

/// Two-pass transcription service.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn Transcriber>` between tasks.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// First pass: raw transcript of the encoded audio.
    async fn transcribe(
        &self,
        cancel: CancellationToken,
        audio: &[u8],
    ) -> Result<String, SttError>;

    /// Second pass: rewrite `raw` using `hint`.  Failure is non-fatal for
    /// the caller, which falls back to the raw transcript.
    async fn repair(
        &self,
        cancel: CancellationToken,
        raw: &str,
        hint: &str,
    ) -> Result<String, SttError>;
}
