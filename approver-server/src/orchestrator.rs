//! Runs one approval attempt per pull request event.

use std::sync::Arc;

use approver_core::{first_match, CommitSha};
use tracing::{debug, error, info};

use crate::cancel::cancellation_pair;
use crate::config_store::ConfigStore;
use crate::github::{GitHubApi, PullRequestInfo};
use crate::lock_registry::{LockKey, LockRegistry};
use crate::review::{ApprovalOutcome, ReviewSubmitter};
use crate::status_waiter::{StatusWaiter, StatusWaiterConfig, WaitOutcome};

/// Webhook actions that start an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    ReviewRequested,
    /// New commits were pushed; attempts for older commits are stale.
    Synchronize,
    ReviewDismissed,
}

impl Trigger {
    pub fn from_pull_request_action(action: &str) -> Option<Self> {
        match action {
            "review_requested" => Some(Self::ReviewRequested),
            "synchronize" => Some(Self::Synchronize),
            _ => None,
        }
    }

    pub fn from_review_action(action: &str) -> Option<Self> {
        match action {
            "dismissed" => Some(Self::ReviewDismissed),
            _ => None,
        }
    }
}

/// Everything the engine needs to know about a triggering event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestEvent {
    pub installation_id: Option<u64>,
    pub repo_owner: String,
    pub repo_name: String,
    pub pr_number: u64,
    pub head_sha: CommitSha,
    pub author: String,
    pub labels: Vec<String>,
    pub trigger: Trigger,
}

impl PullRequestEvent {
    pub fn pull_request_info(&self) -> PullRequestInfo {
        PullRequestInfo {
            installation_id: self.installation_id,
            repo_owner: self.repo_owner.clone(),
            repo_name: self.repo_name.clone(),
            pr_number: self.pr_number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The same commit is already being processed.
    Duplicate,
    /// No conditions are configured for this author.
    NoRules,
    ChangedFilesUnavailable,
    ConditionsNotMet,
    StatusNotSuccessful(WaitOutcome),
    Cancelled,
    ReviewFailed,
    Approved { labelled: bool },
}

pub struct Orchestrator {
    github: Arc<dyn GitHubApi>,
    config_store: Arc<ConfigStore>,
    locks: Arc<LockRegistry>,
    waiter: StatusWaiter,
    submitter: ReviewSubmitter,
}

impl Orchestrator {
    pub fn new(
        github: Arc<dyn GitHubApi>,
        config_store: Arc<ConfigStore>,
        locks: Arc<LockRegistry>,
        waiter_config: StatusWaiterConfig,
        approved_label: impl Into<String>,
    ) -> Self {
        Self {
            waiter: StatusWaiter::new(github.clone(), waiter_config),
            submitter: ReviewSubmitter::new(github.clone(), approved_label),
            github,
            config_store,
            locks,
        }
    }

    pub fn locks(&self) -> &Arc<LockRegistry> {
        &self.locks
    }

    pub fn config_store(&self) -> &Arc<ConfigStore> {
        &self.config_store
    }

    /// Process one event from lock acquisition through approval.
    ///
    /// The lock entry is held by a guard for the whole attempt, so every
    /// return path below releases it.
    pub async fn handle(&self, event: PullRequestEvent) -> AttemptOutcome {
        let pr = event.pull_request_info();
        let head_sha = event.head_sha.clone();
        let key = LockKey::new(pr.id(), head_sha.clone());

        if event.trigger == Trigger::Synchronize {
            let cancelled = self.locks.supersede_others(&key.pr, &head_sha);
            if cancelled > 0 {
                info!(
                    "Cancelled {} stale attempt(s) for {} after push of {}",
                    cancelled,
                    key.pr,
                    head_sha.short()
                );
            }
        }

        let (handle, token) = cancellation_pair();
        let Some(_guard) = self.locks.try_lock(key, handle) else {
            info!(
                "{} at {} is already being processed, skipping",
                pr.id(),
                head_sha.short()
            );
            return AttemptOutcome::Duplicate;
        };

        let rules = self.config_store.current();
        let Some(conditions) =
            rules.conditions_for(&event.repo_owner, &event.repo_name, &event.author)
        else {
            debug!(
                "No approval conditions for {} in {}/{}",
                event.author, event.repo_owner, event.repo_name
            );
            return AttemptOutcome::NoRules;
        };

        info!(
            "Evaluating {} at {} by {} ({:?})",
            pr.id(),
            head_sha.short(),
            event.author,
            event.trigger
        );

        let files = tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!("Attempt for {} at {} cancelled", pr.id(), head_sha.short());
                return AttemptOutcome::Cancelled;
            }
            files = self.github.get_pull_request_files(&pr) => files,
        };
        let files = match files {
            Ok(files) => files,
            Err(e) => {
                error!("Failed to get changed files for {}: {:#}", pr.id(), e);
                return AttemptOutcome::ChangedFilesUnavailable;
            }
        };
        let filenames: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();

        match first_match(conditions, &event.labels, &filenames) {
            Some((index, condition)) => {
                info!(
                    "{} matches condition #{} ({})",
                    pr.id(),
                    index,
                    condition
                );
            }
            None => {
                info!("{} does not meet any approval condition", pr.id());
                return AttemptOutcome::ConditionsNotMet;
            }
        }

        match self.waiter.wait(&token, &pr, &head_sha).await {
            WaitOutcome::Success => {}
            WaitOutcome::Cancelled => {
                info!("Attempt for {} at {} cancelled", pr.id(), head_sha.short());
                return AttemptOutcome::Cancelled;
            }
            other => {
                info!(
                    "Not approving {} at {}: {:?}",
                    pr.id(),
                    head_sha.short(),
                    other
                );
                return AttemptOutcome::StatusNotSuccessful(other);
            }
        }

        match self.submitter.approve(&token, &pr, &head_sha).await {
            Ok(ApprovalOutcome::Approved { labelled }) => AttemptOutcome::Approved { labelled },
            Ok(ApprovalOutcome::Cancelled) => AttemptOutcome::Cancelled,
            Err(e) => {
                error!("{:#}", e);
                AttemptOutcome::ReviewFailed
            }
        }
    }
}
