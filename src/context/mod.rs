//! Context gathering — auxiliary hint text collected in parallel with audio
//! capture to bias transcription repair.
//!
//! Three interchangeable strategies, selected by configuration:
//!
//! * [`ContextGatherer::None`] — yields an empty hint immediately.
//! * [`ContextGatherer::Screen`] — screenshots the display and asks a
//!   vision-capable model for a description plus salient keywords.
//! * [`ContextGatherer::Editor`] — extracts the viewport or cursor-adjacent
//!   text from a running editor session.
//!
//! Gathering is always non-fatal: any failure is logged and treated as an
//! empty hint, and every strategy honors the task's cancellation token.

pub mod editor;
pub mod screen;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use editor::NvimContextProvider;
pub use screen::VisionScreenDescriber;

// ---------------------------------------------------------------------------
// ContextError
// ---------------------------------------------------------------------------

/// Errors from context gathering.  All of them are non-fatal to the task.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Screenshot capture failed.
    #[error("screen capture failed: {0}")]
    Capture(String),

    /// The vision endpoint failed or returned nothing usable.
    #[error("screen description failed: {0}")]
    Describe(String),

    /// The editor session could not be located or queried.
    #[error("editor context unavailable: {0}")]
    Editor(String),

    /// The gather was cancelled through the task's cancellation token.
    #[error("context gathering cancelled")]
    Cancelled,

    /// No API key in the environment or the config file.
    #[error("OpenAI API key is not set")]
    MissingApiKey,
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Captures the current screen and describes it in natural language.
#[async_trait]
pub trait ScreenDescriber: Send + Sync {
    async fn describe(&self, cancel: CancellationToken) -> Result<String, ContextError>;
}

/// Extracts viewport or cursor-adjacent text from an active editor session.
#[async_trait]
pub trait EditorContextProvider: Send + Sync {
    async fn context(&self, cancel: CancellationToken) -> Result<String, ContextError>;
}

// ---------------------------------------------------------------------------
// ContextGatherer
// ---------------------------------------------------------------------------

/// The configured gathering strategy, dispatched once per task.
#[derive(Clone)]
pub enum ContextGatherer {
    None,
    Screen(Arc<dyn ScreenDescriber>),
    Editor(Arc<dyn EditorContextProvider>),
}

impl ContextGatherer {
    /// Produce the hint string for one task.
    ///
    /// Runs concurrently with audio capture; errors are logged and degrade
    /// to an empty hint.
    pub async fn gather(&self, cancel: CancellationToken) -> String {
        let outcome = match self {
            ContextGatherer::None => return String::new(),
            ContextGatherer::Screen(describer) => describer.describe(cancel).await,
            ContextGatherer::Editor(provider) => provider.context(cancel).await,
        };

        match outcome {
            Ok(hint) => {
                log::debug!("context: gathered hint ({} chars)", hint.len());
                hint
            }
            Err(e) => {
                log::warn!("context: gather failed, continuing without a hint: {e}");
                String::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
