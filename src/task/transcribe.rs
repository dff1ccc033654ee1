//! One-shot, cancelable capture → transcribe task.
//!
//! A [`TranscribeTask`] executes a single pipeline run:
//!
//! ```text
//! Recording ──▶ encode ──▶ Transcribing ──▶ (repair) ──▶ done
//!     │                         │
//!     └── context gather runs concurrently with capture ──┘
//! ```
//!
//! The driver emits each phase on a bounded mpsc channel and closes the
//! channel on every exit path, so the supervising [`TaskManager`] never
//! blocks waiting for a terminal event.  Cancellation (abort, supersession,
//! max-duration timeout) makes the current blocking collaborator call return
//! promptly; the task then stores no result.
//!
//! [`TaskManager`]: super::TaskManager

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::manager::Collaborators;
use super::{TaskState, TranscriptionResult};

/// Capacity of the per-task phase channel.  The forwarding worker drains it
/// continuously, so this only needs to absorb short bursts.
const PHASE_CHANNEL_CAPACITY: usize = 8;

// ---------------------------------------------------------------------------
// TranscribeTask
// ---------------------------------------------------------------------------

/// A single capture/transcribe invocation.
///
/// Owns two independent one-way signals:
///
/// * `stop` — ends the recording phase so transcription can begin.
/// * `cancel` — aborts the whole task regardless of phase.
///
/// Both are [`CancellationToken`]s, so triggering either more than once is
/// harmless and stop-after-finish is a no-op.
pub struct TranscribeTask {
    cancel: CancellationToken,
    stop: CancellationToken,
    result: Mutex<Option<TranscriptionResult>>,
}

impl TranscribeTask {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            stop: CancellationToken::new(),
            result: Mutex::new(None),
        }
    }

    /// Signal the end of the recording phase.  Idempotent.
    pub fn stop_recording(&self) {
        self.stop.cancel();
    }

    /// Cancel the task, regardless of phase.  Idempotent.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// The stored result, if the pipeline completed.
    pub fn result(&self) -> Option<TranscriptionResult> {
        self.result.lock().unwrap().clone()
    }

    fn set_result(&self, result: TranscriptionResult) {
        *self.result.lock().unwrap() = Some(result);
    }

    /// Spawn the task driver and return its phase-event stream.
    ///
    /// The stream emits `Recording`, then possibly `Transcribing`, then
    /// closes.  It closes on every exit path — success, failure and abort —
    /// exactly once.
    ///
    /// `annotation` is the shared context string read from the manager at
    /// task start; it is folded into the repair hint.
    pub(crate) fn spawn(
        self: &Arc<Self>,
        collab: Arc<Collaborators>,
        annotation: String,
    ) -> mpsc::Receiver<TaskState> {
        let (tx, rx) = mpsc::channel(PHASE_CHANNEL_CAPACITY);
        let task = Arc::clone(self);

        tokio::spawn(async move {
            task.run(collab, annotation, tx).await;
        });

        rx
    }

    /// The pipeline body.  Returning early (after a log line) is the failure
    /// path: dropping `tx` closes the phase stream and no result is stored.
    async fn run(
        &self,
        collab: Arc<Collaborators>,
        annotation: String,
        tx: mpsc::Sender<TaskState>,
    ) {
        let _ = tx.send(TaskState::Recording).await;

        // Context gathering runs concurrently with capture to hide its
        // latency; its completion is awaited only after the audio is ready.
        // The gather runs on a child token guarded by this scope, so every
        // early return below also releases it — a failed recording must not
        // leave a vision request running for a dead task.
        let gather_cancel = self.cancel.child_token();
        let _gather_guard = gather_cancel.clone().drop_guard();
        let gather = {
            let gatherer = Arc::clone(&collab);
            tokio::spawn(async move { gatherer.gatherer.gather(gather_cancel).await })
        };

        let recording = match collab
            .recorder
            .record(self.cancel.clone(), self.stop.clone())
            .await
        {
            Ok(recording) => recording,
            Err(e) => {
                log::warn!("task: recording ended without audio: {e}");
                return;
            }
        };

        let blob = match collab.encoder.encode(&recording) {
            Ok(blob) => blob,
            Err(e) => {
                log::error!("task: encoding failed: {e}");
                return;
            }
        };

        let _ = tx.send(TaskState::Transcribing).await;

        log::debug!("task: audio ready, waiting for context gather");
        let gathered = tokio::select! {
            joined = gather => joined.unwrap_or_else(|e| {
                log::warn!("task: context gather panicked: {e}");
                String::new()
            }),
            _ = self.cancel.cancelled() => {
                log::info!("task: aborted while waiting for context");
                return;
            }
        };

        let hint = join_hint(&annotation, &gathered);

        let original = match collab.transcriber.transcribe(self.cancel.clone(), &blob).await {
            Ok(text) => text,
            Err(e) => {
                log::error!("task: transcription failed: {e}");
                return;
            }
        };

        // Second pass: rewrite the raw transcript using the hint.  Failure
        // is non-fatal; the raw transcript stands on its own.
        let modified = if hint.is_empty() {
            String::new()
        } else {
            match collab
                .transcriber
                .repair(self.cancel.clone(), &original, &hint)
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("task: repair failed, keeping raw transcript: {e}");
                    String::new()
                }
            }
        };

        // An aborted task stores nothing, even if the pipeline raced past
        // the cancellation point.
        if self.cancel.is_cancelled() {
            log::info!("task: aborted, discarding transcript");
            return;
        }

        let result = TranscriptionResult {
            id: Uuid::new_v4(),
            original,
            modified,
            repair_prompt: hint,
            audio: Some(blob),
        };
        log::info!("task: transcription complete: {:?}", result.text());
        self.set_result(result);
    }
}

impl Default for TranscribeTask {
    fn default() -> Self {
        Self::new()
    }
}

/// Join the shared annotation and the gathered context into one hint string,
/// skipping empty parts.  Returns the empty string when neither is set.
fn join_hint(annotation: &str, gathered: &str) -> String {
    match (annotation.is_empty(), gathered.is_empty()) {
        (true, true) => String::new(),
        (false, true) => annotation.to_string(),
        (true, false) => gathered.to_string(),
        (false, false) => format!("{annotation}\n\n{gathered}"),
    }
}

// ---------------------------------------------------------------------------
// Test doubles shared by the task and manager tests
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
