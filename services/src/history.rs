//! Admission history: when each requester last asked for feedback, and which
//! results have already been delivered.
//!
//! The admission controller only reads through [`AdmissionHistory`]. Writes
//! happen at the boundary, after a request is admitted or a result is
//! delivered. [`InMemoryAdmissionHistory::transaction`] holds the write lock
//! across a check and the write that follows it.

use common::types::FeedbackRecord;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub trait AdmissionHistory: Send + Sync {
    /// Timestamp (epoch ms) of the requester's last admitted request for `deliv_id`.
    fn last_request_timestamp(&self, user_name: &str, deliv_id: &str) -> Option<i64>;

    /// Whether feedback for exactly this commit has been delivered to the user.
    fn has_feedback(&self, user_name: &str, deliv_id: &str, commit_url: &str) -> bool;
}

#[derive(Default)]
struct HistoryInner {
    requests: HashMap<(String, String), i64>,
    feedback: Vec<FeedbackRecord>,
}

impl HistoryInner {
    fn record_request(&mut self, user_name: &str, deliv_id: &str, timestamp: i64) {
        let entry = self
            .requests
            .entry((user_name.to_string(), deliv_id.to_string()))
            .or_insert(timestamp);
        *entry = (*entry).max(timestamp);
    }

    fn last_request_timestamp(&self, user_name: &str, deliv_id: &str) -> Option<i64> {
        self.requests
            .get(&(user_name.to_string(), deliv_id.to_string()))
            .copied()
    }

    fn has_feedback(&self, user_name: &str, deliv_id: &str, commit_url: &str) -> bool {
        self.feedback.iter().any(|r| {
            r.user_name == user_name && r.deliv_id == deliv_id && r.commit_url == commit_url
        })
    }
}

/// Exclusive view of the history handed out by
/// [`InMemoryAdmissionHistory::transaction`].
pub struct HistoryTxn<'a> {
    inner: &'a mut HistoryInner,
}

impl HistoryTxn<'_> {
    pub fn record_request(&mut self, user_name: &str, deliv_id: &str, timestamp: i64) {
        self.inner.record_request(user_name, deliv_id, timestamp);
    }
}

impl AdmissionHistory for HistoryTxn<'_> {
    fn last_request_timestamp(&self, user_name: &str, deliv_id: &str) -> Option<i64> {
        self.inner.last_request_timestamp(user_name, deliv_id)
    }

    fn has_feedback(&self, user_name: &str, deliv_id: &str, commit_url: &str) -> bool {
        self.inner.has_feedback(user_name, deliv_id, commit_url)
    }
}

/// Process-local history store.
#[derive(Default)]
pub struct InMemoryAdmissionHistory {
    inner: RwLock<HistoryInner>,
}

impl InMemoryAdmissionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HistoryInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HistoryInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records an admitted request. Older timestamps never replace newer ones.
    pub fn record_request(&self, user_name: &str, deliv_id: &str, timestamp: i64) {
        self.write().record_request(user_name, deliv_id, timestamp);
    }

    /// Runs `f` with exclusive access to the history. No other reader or
    /// writer observes the store until `f` returns.
    pub fn transaction<R>(&self, f: impl FnOnce(&mut HistoryTxn<'_>) -> R) -> R {
        let mut inner = self.write();
        f(&mut HistoryTxn { inner: &mut *inner })
    }

    /// Appends a delivered-feedback record.
    ///
    /// Returns `false` (and stores nothing) when a record for the same
    /// (user, deliverable, commit) already exists.
    pub fn record_feedback(&self, record: FeedbackRecord) -> bool {
        let mut inner = self.write();
        if inner.has_feedback(&record.user_name, &record.deliv_id, &record.commit_url) {
            return false;
        }
        inner.feedback.push(record);
        true
    }

    /// All feedback delivered to `user_name` for `deliv_id`, oldest first.
    pub fn feedback_for(&self, user_name: &str, deliv_id: &str) -> Vec<FeedbackRecord> {
        let mut records: Vec<FeedbackRecord> = self
            .read()
            .feedback
            .iter()
            .filter(|r| r.user_name == user_name && r.deliv_id == deliv_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.timestamp);
        records
    }
}

impl AdmissionHistory for InMemoryAdmissionHistory {
    fn last_request_timestamp(&self, user_name: &str, deliv_id: &str) -> Option<i64> {
        self.read().last_request_timestamp(user_name, deliv_id)
    }

    fn has_feedback(&self, user_name: &str, deliv_id: &str, commit_url: &str) -> bool {
        self.read().has_feedback(user_name, deliv_id, commit_url)
    }
}
