// In-memory submission store.
// Every submission is kept by id; the (attempt, question) key only points at
// the most recent one.
use codegrade_common::types::Submission;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
struct StoreInner {
    by_id: HashMap<Uuid, Arc<Submission>>,
    latest: HashMap<(String, String), Uuid>,
    by_attempt: HashMap<String, Vec<Uuid>>,
}

/// Concurrency-safe submission store, shared via `Arc` and injected into the
/// grader. Writes are serialized, last write wins on the latest key.
#[derive(Debug, Default)]
pub struct SubmissionStore {
    inner: RwLock<StoreInner>,
}

impl SubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Stored submissions are immutable, so a poisoned lock still guards
    // consistent data
    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a new submission and make it the latest for its pair
    pub fn record(&self, submission: Submission) -> Arc<Submission> {
        let submission = Arc::new(submission);
        let key = (submission.attempt_id.clone(), submission.question_id.clone());

        let mut inner = self.write();
        inner.by_id.insert(submission.id, Arc::clone(&submission));
        let replaced = inner.latest.insert(key, submission.id);
        inner
            .by_attempt
            .entry(submission.attempt_id.clone())
            .or_default()
            .push(submission.id);
        drop(inner);

        debug!(
            submission_id = %submission.id,
            attempt_id = %submission.attempt_id,
            question_id = %submission.question_id,
            replaced = ?replaced,
            "Submission recorded"
        );
        submission
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<Submission>> {
        self.read().by_id.get(id).cloned()
    }

    /// Latest submission for an (attempt, question) pair
    pub fn latest(&self, attempt_id: &str, question_id: &str) -> Option<Arc<Submission>> {
        let inner = self.read();
        let id = inner
            .latest
            .get(&(attempt_id.to_string(), question_id.to_string()))?;
        inner.by_id.get(id).cloned()
    }

    /// Every submission of an attempt, oldest first
    pub fn for_attempt(&self, attempt_id: &str) -> Vec<Arc<Submission>> {
        let inner = self.read();
        inner
            .by_attempt
            .get(attempt_id)
            .map(|ids| ids.iter().filter_map(|id| inner.by_id.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
