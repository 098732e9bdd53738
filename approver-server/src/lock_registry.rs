//! Registry of in-flight evaluation attempts.
//!
//! GitHub sends one `review_requested` event per requested reviewer and a
//! `synchronize` event on every push, so the same pull request commit is
//! often delivered several times. The registry admits one attempt per
//! (pull request, head sha) and lets a newer commit cancel attempts for older
//! ones.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use approver_core::{CommitSha, PullRequestId};
use tracing::{debug, info};

use crate::cancel::CancelHandle;

/// Identity of one evaluation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub pr: PullRequestId,
    pub head_sha: CommitSha,
}

impl LockKey {
    pub fn new(pr: PullRequestId, head_sha: CommitSha) -> Self {
        Self { pr, head_sha }
    }
}

type Entries = HashMap<PullRequestId, HashMap<CommitSha, CancelHandle>>;

/// Thread-safe table of active attempts keyed by pull request, then head sha.
#[derive(Debug, Default)]
pub struct LockRegistry {
    entries: Mutex<Entries>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        // Entries hold no invariants a panicking holder could break halfway.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an attempt. Returns false, without touching the existing
    /// entry, when the same pull request commit is already being processed.
    pub fn acquire(&self, key: &LockKey, cancel: CancelHandle) -> bool {
        let mut entries = self.entries();
        let shas = entries.entry(key.pr.clone()).or_default();
        if shas.contains_key(&key.head_sha) {
            debug!(
                "Attempt for {} at {} already registered",
                key.pr,
                key.head_sha.short()
            );
            return false;
        }
        shas.insert(key.head_sha.clone(), cancel);
        true
    }

    /// Remove an attempt, dropping the pull request's table once it is empty.
    pub fn release(&self, key: &LockKey) {
        let mut entries = self.entries();
        if let Some(shas) = entries.get_mut(&key.pr) {
            shas.remove(&key.head_sha);
            if shas.is_empty() {
                entries.remove(&key.pr);
            }
        }
    }

    /// Cancel every attempt for `pr` whose sha differs from `keep_sha`.
    ///
    /// Entries stay registered until their owners observe the cancellation
    /// and release them. Returns how many attempts were newly cancelled.
    pub fn supersede_others(&self, pr: &PullRequestId, keep_sha: &CommitSha) -> usize {
        let entries = self.entries();
        let Some(shas) = entries.get(pr) else {
            return 0;
        };
        let mut cancelled = 0;
        for (sha, handle) in shas {
            if sha != keep_sha && handle.cancel() {
                info!(
                    "Cancelling attempt for {} at {}, superseded by {}",
                    pr,
                    sha.short(),
                    keep_sha.short()
                );
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Acquire and return a guard that releases the entry when dropped.
    pub fn try_lock(self: &Arc<Self>, key: LockKey, cancel: CancelHandle) -> Option<LockGuard> {
        if self.acquire(&key, cancel) {
            Some(LockGuard {
                registry: Arc::clone(self),
                key,
            })
        } else {
            None
        }
    }

    /// Number of registered attempts across all pull requests.
    pub fn active_attempts(&self) -> usize {
        self.entries().values().map(HashMap::len).sum()
    }

    /// Whether an attempt for this exact pull request commit is registered.
    pub fn is_locked(&self, key: &LockKey) -> bool {
        self.entries()
            .get(&key.pr)
            .is_some_and(|shas| shas.contains_key(&key.head_sha))
    }
}

/// Releases its registry entry on drop, whatever path the attempt exits by.
#[derive(Debug)]
pub struct LockGuard {
    registry: Arc<LockRegistry>,
    key: LockKey,
}

impl LockGuard {
    pub fn key(&self) -> &LockKey {
        &self.key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}
