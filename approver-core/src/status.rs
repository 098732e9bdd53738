//! Combined commit status model and per-poll classification.

use serde::{Deserialize, Serialize};

/// Status context that stays pending until the pull request is approved and
/// ready to merge. Waiting on it would never finish.
pub const DEFAULT_MERGE_QUEUE_CONTEXT: &str = "tide";

/// State of a commit status or of the combined status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    Success,
    Pending,
    Failure,
    Error,
    #[serde(other)]
    Unknown,
}

/// One status context reported against a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStatus {
    pub context: String,
    pub state: StatusState,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
}

/// Aggregate of all status contexts for a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedStatus {
    pub state: StatusState,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub statuses: Vec<CommitStatus>,
}

/// What a single combined-status poll means for the waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollVerdict {
    /// Checks are green (the merge queue context may still be pending).
    Success,
    /// A check is still running; poll again later.
    Pending { context: String },
    /// A check failed; stop waiting.
    Failure { reason: String },
}

impl CombinedStatus {
    /// Classify this status, ignoring `merge_queue_context` inside a pending
    /// aggregate.
    ///
    /// Only `failure` is terminal. Any overall state other than `failure` or
    /// `pending`, `error` included, counts as success, and inside a pending
    /// aggregate only `failure` and `pending` checks are considered.
    pub fn classify(&self, merge_queue_context: &str) -> PollVerdict {
        match self.state {
            StatusState::Failure => PollVerdict::Failure {
                reason: "combined status is failure".to_string(),
            },
            StatusState::Pending => {
                let mut pending = None;
                for status in &self.statuses {
                    if status.context == merge_queue_context {
                        continue;
                    }
                    match status.state {
                        StatusState::Failure => {
                            return PollVerdict::Failure {
                                reason: format!("status check {} failed", status.context),
                            };
                        }
                        StatusState::Pending if pending.is_none() => {
                            pending = Some(status.context.clone());
                        }
                        _ => {}
                    }
                }
                match pending {
                    Some(context) => PollVerdict::Pending { context },
                    None => PollVerdict::Success,
                }
            }
            StatusState::Success | StatusState::Error | StatusState::Unknown => {
                PollVerdict::Success
            }
        }
    }
}
