//! Task lifecycle core — single-flight supervision of capture/transcribe jobs.
//!
//! # Architecture
//!
//! ```text
//! trigger (hotkey / HTTP)          observers (typist, HTTP, UI)
//!        │                                ▲            ▲
//!        ▼                        states  │            │ results
//! ┌──────────────┐  phase events  ┌───────┴────────────┴──────┐
//! │ TaskManager  │◀───────────────│  forwarding worker        │
//! │  current slot│                └───────────────────────────┘
//! └──────┬───────┘                        ▲
//!        │ creates / aborts               │ per-task mpsc
//!        ▼                                │
//! ┌──────────────┐    drives      ┌───────┴───────┐
//! │TranscribeTask│───────────────▶│ task driver   │
//! └──────────────┘                └───────────────┘
//! ```
//!
//! [`TaskManager`] guarantees at most one [`TranscribeTask`] is live at any
//! instant and fans its phase events out to any number of subscribers.
//! Completed results land in the bounded [`HistoryStore`].

pub mod history;
pub mod manager;
pub mod transcribe;

use serde::Serialize;
use uuid::Uuid;

pub use history::HistoryStore;
pub use manager::{Collaborators, TaskManager};
pub use transcribe::TranscribeTask;

// ---------------------------------------------------------------------------
// TaskState
// ---------------------------------------------------------------------------

/// Externally observable phase of the current task.
///
/// Within one task the phases are emitted in order
/// `Recording → [Transcribing] → Idle`, each at most once.  `Idle` is
/// synthesized by the manager once the task's own stream has closed, so a
/// subscriber always sees a terminal event even when the task failed or was
/// aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// No task is running.
    Idle,
    /// Microphone is live, samples are being captured.
    Recording,
    /// Audio is encoded and the transcription request is in flight.
    Transcribing,
}

impl TaskState {
    /// Short label for log lines and the HTTP status endpoint.
    pub fn label(&self) -> &'static str {
        match self {
            TaskState::Idle => "idle",
            TaskState::Recording => "recording",
            TaskState::Transcribing => "transcribing",
        }
    }
}

// ---------------------------------------------------------------------------
// TranscriptionResult
// ---------------------------------------------------------------------------

/// The outcome of one completed transcribe task.
///
/// `original` is the raw transcript from the speech-to-text pass; `modified`
/// is the repaired transcript from the optional second pass and stays empty
/// when no repair ran (no hint, or the repair call failed).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TranscriptionResult {
    /// Unique id for this result.
    pub id: Uuid,
    /// Raw transcript text.
    pub original: String,
    /// Repaired transcript text; empty if no repair was performed.
    pub modified: String,
    /// The hint text the repair pass was given, if any.
    pub repair_prompt: String,
    /// Encoded audio of the recording, omitted from serialized output.
    #[serde(skip)]
    pub audio: Option<Vec<u8>>,
}

impl TranscriptionResult {
    /// The effective text: `modified` when a repair produced one, otherwise
    /// the raw transcript.
    pub fn text(&self) -> &str {
        if !self.modified.is_empty() {
            &self.modified
        } else {
            &self.original
        }
    }

    /// Sentinel for "no usable result": both texts are empty.
    pub fn is_empty(&self) -> bool {
        self.original.is_empty() && self.modified.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
