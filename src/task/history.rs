//! Bounded, thread-safe log of completed transcription results.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::TranscriptionResult;

/// Default number of results retained.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Append-only log with oldest-eviction past the bound.
///
/// Entries are immutable once appended.  All access is through a short-held
/// mutex: `append` and `snapshot` never block each other for longer than one
/// clone of the deque, and a reader never observes a partially updated list.
pub struct HistoryStore {
    limit: usize,
    entries: Mutex<VecDeque<TranscriptionResult>>,
}

impl HistoryStore {
    /// Create a store retaining at most `limit` entries.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Append a result, evicting from the front once the bound is exceeded.
    pub fn append(&self, result: TranscriptionResult) {
        let mut entries = self.entries.lock().unwrap();
        entries.push_back(result);
        while entries.len() > self.limit {
            entries.pop_front();
        }
    }

    /// An independent copy of the current contents, oldest first.
    ///
    /// Safe to call while appends continue concurrently; the snapshot
    /// reflects some consistent prior state.
    pub fn snapshot(&self) -> Vec<TranscriptionResult> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
