//! Single-flight task supervisor.
//!
//! [`TaskManager`] owns the current-task slot, the shared context annotation,
//! the history store, and the two broadcast streams observers subscribe to.
//! Starting a new task supersedes (aborts) whatever was running — newest
//! request wins, and the superseded task's eventual result is dropped.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::audio::{AudioEncoder, AudioRecorder};
use crate::context::ContextGatherer;
use crate::stt::Transcriber;

use super::{HistoryStore, TaskState, TranscribeTask, TranscriptionResult};

/// Fan-out capacity of the manager's phase and result streams.  A subscriber
/// that lags further than this loses the oldest unread events; the producing
/// task never blocks on a slow observer.
const BROADCAST_CAPACITY: usize = 16;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// The external collaborators each task drives.
///
/// Held behind `Arc<dyn …>` trait objects so the manager can be wired with
/// production implementations in `main` and with mocks in tests.
pub struct Collaborators {
    pub recorder: Arc<dyn AudioRecorder>,
    pub encoder: Arc<dyn AudioEncoder>,
    pub transcriber: Arc<dyn Transcriber>,
    pub gatherer: ContextGatherer,
}

// ---------------------------------------------------------------------------
// TaskManager
// ---------------------------------------------------------------------------

/// Thread-safe supervisor ensuring only one task runs at a time.
///
/// Construct once at startup with [`TaskManager::new`] and share the
/// `Arc<TaskManager>` with every trigger and observer (hotkey listener, HTTP
/// handlers, typing worker).
pub struct TaskManager {
    collab: Arc<Collaborators>,
    current: Mutex<Option<Arc<TranscribeTask>>>,
    state_tx: broadcast::Sender<TaskState>,
    result_tx: broadcast::Sender<TranscriptionResult>,
    annotation: Mutex<String>,
    history: HistoryStore,
}

impl TaskManager {
    pub fn new(collab: Collaborators, history_limit: usize) -> Arc<Self> {
        let (state_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (result_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Arc::new(Self {
            collab: Arc::new(collab),
            current: Mutex::new(None),
            state_tx,
            result_tx,
            annotation: Mutex::new(String::new()),
            history: HistoryStore::new(history_limit),
        })
    }

    /// Unconditionally start a new task, superseding any running one.
    ///
    /// The displaced task, if any, is aborted and its eventual result is
    /// dropped.  A forwarding worker republishes the new task's phase events
    /// on the manager stream; once the task stream closes it publishes a
    /// synthetic terminal [`TaskState::Idle`], clears the current slot only
    /// if it still holds this task, and — only then — archives and publishes
    /// a non-empty result.
    pub fn start_new_task(self: &Arc<Self>) -> Arc<TranscribeTask> {
        let task = Arc::new(TranscribeTask::new());

        let displaced = self
            .current
            .lock()
            .unwrap()
            .replace(Arc::clone(&task));
        if let Some(old) = displaced {
            log::info!("manager: superseding running task");
            old.abort();
        }

        let mut phase_rx = task.spawn(Arc::clone(&self.collab), self.context());

        let manager = Arc::clone(self);
        let finished = Arc::clone(&task);
        tokio::spawn(async move {
            while let Some(state) = phase_rx.recv().await {
                let _ = manager.state_tx.send(state);
            }
            let _ = manager.state_tx.send(TaskState::Idle);

            // Compare-and-clear: a newer task may already occupy the slot,
            // in which case this task was superseded and its result is
            // dropped.
            let cleared = {
                let mut slot = manager.current.lock().unwrap();
                match slot.as_ref() {
                    Some(current) if Arc::ptr_eq(current, &finished) => {
                        *slot = None;
                        true
                    }
                    _ => false,
                }
            };
            if !cleared {
                log::debug!("manager: task was superseded, dropping its result");
                return;
            }

            if let Some(result) = finished.result() {
                if !result.is_empty() {
                    manager.append_to_history(result.clone());
                    let _ = manager.result_tx.send(result);
                }
            }
        });

        task
    }

    /// Toggle: stop the running task's recording, or start a new task when
    /// none is running.  This is the hotkey/menu-click contract.
    pub fn start_or_stop_task(self: &Arc<Self>) {
        let active = self.current.lock().unwrap().clone();
        match active {
            Some(task) => task.stop_recording(),
            None => {
                self.start_new_task();
            }
        }
    }

    /// End the recording phase of the current task, letting it proceed to
    /// transcription.  No-op when no task is running.
    pub fn stop_recording(&self) {
        if let Some(task) = self.current.lock().unwrap().clone() {
            task.stop_recording();
        }
    }

    /// Cancel the current task outright, regardless of phase.  No-op when no
    /// task is running.
    pub fn abort(&self) {
        if let Some(task) = self.current.lock().unwrap().clone() {
            task.abort();
        }
    }

    /// Set the shared context annotation.  Last write wins.
    pub fn set_context(&self, text: impl Into<String>) {
        *self.annotation.lock().unwrap() = text.into();
    }

    /// The shared context annotation.
    pub fn context(&self) -> String {
        self.annotation.lock().unwrap().clone()
    }

    /// Archive a result.  The forwarding worker calls this for every task
    /// that completed while still holding the current slot; it is public so
    /// results produced outside the normal pipeline can be archived too.
    pub fn append_to_history(&self, result: TranscriptionResult) {
        self.history.append(result);
    }

    /// An independent snapshot of the completed-result history.
    pub fn history(&self) -> Vec<TranscriptionResult> {
        self.history.snapshot()
    }

    /// Subscribe to phase transitions of whichever task is current.
    pub fn subscribe_states(&self) -> broadcast::Receiver<TaskState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to completed, non-empty results.
    pub fn subscribe_results(&self) -> broadcast::Receiver<TranscriptionResult> {
        self.result_tx.subscribe()
    }

    /// Whether a task is currently installed (recording or transcribing).
    pub fn is_busy(&self) -> bool {
        self.current.lock().unwrap().is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::broadcast;
    use tokio::time::timeout;

    use crate::context::ContextGatherer;
    use crate::task::transcribe::mocks::{
        BrokenRecorder, CancelAwareDescriber, FailingDescriber, FixedDescriber, FixedEncoder,
        ScriptedTranscriber, SignalRecorder, TooShortRecorder,
    };
    use crate::task::{TaskState, TranscriptionResult};

    use super::{Collaborators, TaskManager};

    const TICK: Duration = Duration::from_millis(500);

    fn manager_with(
        recorder: Arc<dyn crate::audio::AudioRecorder>,
        transcriber: Arc<ScriptedTranscriber>,
        gatherer: ContextGatherer,
    ) -> Arc<TaskManager> {
        TaskManager::new(
            Collaborators {
                recorder,
                encoder: Arc::new(FixedEncoder),
                transcriber,
                gatherer,
            },
            100,
        )
    }

    fn plain_manager(transcriber: Arc<ScriptedTranscriber>) -> Arc<TaskManager> {
        manager_with(Arc::new(SignalRecorder), transcriber, ContextGatherer::None)
    }

    async fn next_state(rx: &mut broadcast::Receiver<TaskState>) -> TaskState {
        timeout(TICK, rx.recv())
            .await
            .expect("timed out waiting for a phase event")
            .expect("phase stream closed")
    }

    async fn next_result(
        rx: &mut broadcast::Receiver<TranscriptionResult>,
    ) -> TranscriptionResult {
        timeout(TICK, rx.recv())
            .await
            .expect("timed out waiting for a result")
            .expect("result stream closed")
    }

    // -- happy path, no hint -------------------------------------------

    #[tokio::test]
    async fn stop_after_recording_produces_raw_result() {
        let transcriber = ScriptedTranscriber::new("r1", None);
        let manager = plain_manager(Arc::clone(&transcriber));
        let mut states = manager.subscribe_states();
        let mut results = manager.subscribe_results();

        manager.start_new_task();
        assert_eq!(next_state(&mut states).await, TaskState::Recording);

        manager.stop_recording();
        assert_eq!(next_state(&mut states).await, TaskState::Transcribing);
        assert_eq!(next_state(&mut states).await, TaskState::Idle);

        let result = next_result(&mut results).await;
        assert_eq!(result.original, "r1");
        assert_eq!(result.modified, "");
        assert_eq!(result.repair_prompt, "");
        assert_eq!(result.text(), "r1");

        // No hint was available, so the repair pass must not have run.
        assert_eq!(transcriber.repair_calls.load(Ordering::SeqCst), 0);

        let history = manager.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].original, "r1");
    }

    // -- hint + repair ---------------------------------------------------

    #[tokio::test]
    async fn gathered_hint_drives_repair_pass() {
        let transcriber = ScriptedTranscriber::new("r1", Some("r2"));
        let manager = manager_with(
            Arc::new(SignalRecorder),
            Arc::clone(&transcriber),
            ContextGatherer::Screen(Arc::new(FixedDescriber("h".into()))),
        );
        let mut states = manager.subscribe_states();
        let mut results = manager.subscribe_results();

        manager.start_new_task();
        assert_eq!(next_state(&mut states).await, TaskState::Recording);
        manager.stop_recording();
        assert_eq!(next_state(&mut states).await, TaskState::Transcribing);
        assert_eq!(next_state(&mut states).await, TaskState::Idle);

        let result = next_result(&mut results).await;
        assert_eq!(result.original, "r1");
        assert_eq!(result.modified, "r2");
        assert_eq!(result.repair_prompt, "h");
        assert_eq!(result.text(), "r2");
        assert_eq!(transcriber.repair_calls.load(Ordering::SeqCst), 1);
    }

    // -- repair failure is non-fatal -------------------------------------

    #[tokio::test]
    async fn repair_failure_falls_back_to_raw_transcript() {
        let transcriber = ScriptedTranscriber::new("r1", None);
        let manager = manager_with(
            Arc::new(SignalRecorder),
            Arc::clone(&transcriber),
            ContextGatherer::Screen(Arc::new(FixedDescriber("h".into()))),
        );
        let mut states = manager.subscribe_states();
        let mut results = manager.subscribe_results();

        manager.start_new_task();
        assert_eq!(next_state(&mut states).await, TaskState::Recording);
        manager.stop_recording();
        assert_eq!(next_state(&mut states).await, TaskState::Transcribing);
        assert_eq!(next_state(&mut states).await, TaskState::Idle);

        let result = next_result(&mut results).await;
        assert_eq!(result.original, "r1");
        assert_eq!(result.modified, "");
        assert_eq!(result.text(), "r1");
    }

    // -- gather failure degrades to no hint ------------------------------

    #[tokio::test]
    async fn gather_failure_proceeds_without_hint() {
        let transcriber = ScriptedTranscriber::new("r1", Some("r2"));
        let manager = manager_with(
            Arc::new(SignalRecorder),
            Arc::clone(&transcriber),
            ContextGatherer::Screen(Arc::new(FailingDescriber)),
        );
        let mut states = manager.subscribe_states();
        let mut results = manager.subscribe_results();

        manager.start_new_task();
        assert_eq!(next_state(&mut states).await, TaskState::Recording);
        manager.stop_recording();
        assert_eq!(next_state(&mut states).await, TaskState::Transcribing);
        assert_eq!(next_state(&mut states).await, TaskState::Idle);

        let result = next_result(&mut results).await;
        // No hint means no repair pass.
        assert_eq!(result.modified, "");
        assert_eq!(transcriber.repair_calls.load(Ordering::SeqCst), 0);
    }

    // -- abort before stop -----------------------------------------------

    #[tokio::test]
    async fn abort_emits_recording_then_idle_and_no_result() {
        let manager = plain_manager(ScriptedTranscriber::new("r1", None));
        let mut states = manager.subscribe_states();
        let mut results = manager.subscribe_results();

        manager.start_new_task();
        assert_eq!(next_state(&mut states).await, TaskState::Recording);

        manager.abort();
        // No Transcribing phase: the next event is the terminal Idle.
        assert_eq!(next_state(&mut states).await, TaskState::Idle);

        assert!(timeout(TICK, results.recv()).await.is_err());
        assert!(manager.history().is_empty());
        assert!(!manager.is_busy());
    }

    // -- a failed pipeline releases its context gather --------------------

    #[tokio::test]
    async fn failed_recording_cancels_context_gather() {
        let gather_cancelled = Arc::new(AtomicBool::new(false));
        let manager = manager_with(
            Arc::new(BrokenRecorder),
            ScriptedTranscriber::new("r1", None),
            ContextGatherer::Screen(Arc::new(CancelAwareDescriber(Arc::clone(
                &gather_cancelled,
            )))),
        );
        let mut states = manager.subscribe_states();
        let mut results = manager.subscribe_results();

        manager.start_new_task();
        assert_eq!(next_state(&mut states).await, TaskState::Recording);
        assert_eq!(next_state(&mut states).await, TaskState::Idle);

        // The gather must be released promptly, not left running until its
        // request finishes on its own.
        let deadline = tokio::time::Instant::now() + TICK;
        while !gather_cancelled.load(Ordering::SeqCst) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "context gather was never cancelled"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(timeout(TICK, results.recv()).await.is_err());
        assert!(manager.history().is_empty());
    }

    // -- too-short recording ---------------------------------------------

    #[tokio::test]
    async fn too_short_recording_yields_no_result() {
        let manager = manager_with(
            Arc::new(TooShortRecorder),
            ScriptedTranscriber::new("r1", None),
            ContextGatherer::None,
        );
        let mut states = manager.subscribe_states();
        let mut results = manager.subscribe_results();

        manager.start_new_task();
        assert_eq!(next_state(&mut states).await, TaskState::Recording);
        manager.stop_recording();
        assert_eq!(next_state(&mut states).await, TaskState::Idle);

        assert!(timeout(TICK, results.recv()).await.is_err());
        assert!(manager.history().is_empty());
    }

    // -- single-flight supersession ---------------------------------------

    #[tokio::test]
    async fn start_new_task_supersedes_the_running_one() {
        let transcriber = ScriptedTranscriber::new("r1", None);
        let manager = plain_manager(Arc::clone(&transcriber));
        let mut states = manager.subscribe_states();
        let mut results = manager.subscribe_results();

        let first = manager.start_new_task();
        assert_eq!(next_state(&mut states).await, TaskState::Recording);

        let second = manager.start_new_task();
        assert!(!Arc::ptr_eq(&first, &second));

        // The second task starts recording; the superseded first task's
        // trailing terminal Idle may interleave with it.
        let mut seen_recording_again = false;
        let mut seen_idle = false;
        for _ in 0..2 {
            match next_state(&mut states).await {
                TaskState::Recording => seen_recording_again = true,
                TaskState::Idle => seen_idle = true,
                TaskState::Transcribing => panic!("no task should be transcribing yet"),
            }
        }
        assert!(seen_recording_again && seen_idle);

        // Finish the second task normally.
        manager.stop_recording();
        assert_eq!(next_state(&mut states).await, TaskState::Transcribing);
        assert_eq!(next_state(&mut states).await, TaskState::Idle);

        // Exactly one result: the superseded task contributed nothing.
        let result = next_result(&mut results).await;
        assert_eq!(result.original, "r1");
        assert!(timeout(TICK, results.recv()).await.is_err());
        assert_eq!(manager.history().len(), 1);
        assert!(first.result().is_none());
    }

    // -- no-ops and idempotence -------------------------------------------

    #[tokio::test]
    async fn stop_and_abort_without_a_task_are_noops() {
        let manager = plain_manager(ScriptedTranscriber::new("r1", None));
        manager.stop_recording();
        manager.abort();
        assert!(!manager.is_busy());
        assert!(manager.history().is_empty());
    }

    #[tokio::test]
    async fn double_stop_is_idempotent() {
        let manager = plain_manager(ScriptedTranscriber::new("r1", None));
        let mut states = manager.subscribe_states();
        let mut results = manager.subscribe_results();

        manager.start_new_task();
        assert_eq!(next_state(&mut states).await, TaskState::Recording);
        manager.stop_recording();
        manager.stop_recording();
        assert_eq!(next_state(&mut states).await, TaskState::Transcribing);
        assert_eq!(next_state(&mut states).await, TaskState::Idle);

        // Stop after the task finished must also be harmless.
        let _ = next_result(&mut results).await;
        manager.stop_recording();
    }

    // -- toggle contract ---------------------------------------------------

    #[tokio::test]
    async fn start_or_stop_toggles() {
        let manager = plain_manager(ScriptedTranscriber::new("r1", None));
        let mut states = manager.subscribe_states();
        let mut results = manager.subscribe_results();

        // First press: starts.
        manager.start_or_stop_task();
        assert_eq!(next_state(&mut states).await, TaskState::Recording);
        assert!(manager.is_busy());

        // Second press: stops the recording (does not abort).
        manager.start_or_stop_task();
        assert_eq!(next_state(&mut states).await, TaskState::Transcribing);
        assert_eq!(next_state(&mut states).await, TaskState::Idle);
        let result = next_result(&mut results).await;
        assert_eq!(result.original, "r1");
    }

    // -- context annotation -------------------------------------------------

    #[tokio::test]
    async fn context_annotation_roundtrips() {
        let manager = plain_manager(ScriptedTranscriber::new("r1", None));
        assert_eq!(manager.context(), "");
        manager.set_context("foo");
        assert_eq!(manager.context(), "foo");
    }

    #[tokio::test]
    async fn context_annotation_survives_concurrent_writers() {
        let manager = plain_manager(ScriptedTranscriber::new("r1", None));
        let mut handles = Vec::new();
        for i in 0..8 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                for j in 0..50 {
                    manager.set_context(format!("w{i}-{j}"));
                    let _ = manager.context();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        // Last write wins: the final value is whatever some writer set last,
        // never corrupted.
        assert!(manager.context().starts_with('w'));

        manager.set_context("foo");
        assert_eq!(manager.context(), "foo");
    }

    // -- annotation feeds the repair hint ---------------------------------------

    #[tokio::test]
    async fn annotation_is_used_as_repair_hint() {
        let transcriber = ScriptedTranscriber::new("r1", Some("r2"));
        let manager = plain_manager(Arc::clone(&transcriber));
        let mut states = manager.subscribe_states();
        let mut results = manager.subscribe_results();

        manager.set_context("project glossary");
        manager.start_new_task();
        assert_eq!(next_state(&mut states).await, TaskState::Recording);
        manager.stop_recording();
        assert_eq!(next_state(&mut states).await, TaskState::Transcribing);
        assert_eq!(next_state(&mut states).await, TaskState::Idle);

        let result = next_result(&mut results).await;
        assert_eq!(result.repair_prompt, "project glossary");
        assert_eq!(result.modified, "r2");
    }

    // -- history bound through the manager ---------------------------------------

    #[tokio::test]
    async fn direct_append_shows_up_in_snapshots() {
        let manager = plain_manager(ScriptedTranscriber::new("r1", None));
        manager.append_to_history(TranscriptionResult {
            original: "imported".into(),
            ..Default::default()
        });

        let history = manager.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].original, "imported");
    }

    #[tokio::test]
    async fn repeated_tasks_accumulate_history_in_order() {
        let transcriber = ScriptedTranscriber::new("r1", None);
        let manager = plain_manager(transcriber);
        let mut states = manager.subscribe_states();
        let mut results = manager.subscribe_results();

        for _ in 0..3 {
            manager.start_new_task();
            assert_eq!(next_state(&mut states).await, TaskState::Recording);
            manager.stop_recording();
            assert_eq!(next_state(&mut states).await, TaskState::Transcribing);
            assert_eq!(next_state(&mut states).await, TaskState::Idle);
            let _ = next_result(&mut results).await;
        }

        assert_eq!(manager.history().len(), 3);
    }
}
