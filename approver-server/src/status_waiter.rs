//! Waits for a commit's CI statuses to settle before approval.

use std::sync::Arc;
use std::time::Duration;

use approver_core::{CommitSha, PollVerdict, DEFAULT_MERGE_QUEUE_CONTEXT};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::github::{GitHubApi, PullRequestInfo};

pub const DEFAULT_WARM_UP: Duration = Duration::from_secs(30);
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_MULTIPLIER: f64 = 1.5;
pub const DEFAULT_MAX_ELAPSED: Duration = Duration::from_secs(60 * 60);

/// Exponential backoff between status polls, without jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    /// Total budget, measured from the first poll.
    pub max_elapsed: Duration,
}

impl BackoffPolicy {
    pub fn with_max_elapsed(max_elapsed: Duration) -> Self {
        Self {
            max_elapsed,
            ..Self::default()
        }
    }

    pub fn next_interval(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier).min(self.max_interval)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
            multiplier: DEFAULT_MULTIPLIER,
            max_elapsed: DEFAULT_MAX_ELAPSED,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusWaiterConfig {
    pub warm_up: Duration,
    pub backoff: BackoffPolicy,
    /// Context that stays pending until merge time and is not waited on.
    pub merge_queue_context: String,
}

impl Default for StatusWaiterConfig {
    fn default() -> Self {
        Self {
            warm_up: DEFAULT_WARM_UP,
            backoff: BackoffPolicy::default(),
            merge_queue_context: DEFAULT_MERGE_QUEUE_CONTEXT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Success,
    Failure { reason: String },
    Cancelled,
    Timeout { elapsed: Duration, waiting_on: String },
}

pub struct StatusWaiter {
    github: Arc<dyn GitHubApi>,
    config: StatusWaiterConfig,
}

impl StatusWaiter {
    pub fn new(github: Arc<dyn GitHubApi>, config: StatusWaiterConfig) -> Self {
        Self { github, config }
    }

    /// Poll the combined status of `head_sha` until it settles, the budget
    /// runs out, or `cancel` fires.
    ///
    /// The warm-up, every backoff sleep and every status fetch race the
    /// cancellation token.
    pub async fn wait(
        &self,
        cancel: &CancelToken,
        pr: &PullRequestInfo,
        head_sha: &CommitSha,
    ) -> WaitOutcome {
        if cancel.is_cancelled() {
            return WaitOutcome::Cancelled;
        }

        debug!(
            "Waiting {:?} before polling statuses for {}",
            self.config.warm_up,
            head_sha.short()
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return WaitOutcome::Cancelled,
            _ = sleep(self.config.warm_up) => {}
        }

        let policy = &self.config.backoff;
        let started = Instant::now();
        let mut interval = policy.initial_interval;

        loop {
            if cancel.is_cancelled() {
                return WaitOutcome::Cancelled;
            }

            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => return WaitOutcome::Cancelled,
                polled = self.github.get_combined_status(pr, head_sha) => polled,
            };

            let waiting_on = match polled {
                Ok(status) => match status.classify(&self.config.merge_queue_context) {
                    PollVerdict::Success => {
                        info!("Statuses for {} are successful", head_sha.short());
                        return WaitOutcome::Success;
                    }
                    PollVerdict::Failure { reason } => {
                        info!("Statuses for {} failed: {}", head_sha.short(), reason);
                        return WaitOutcome::Failure { reason };
                    }
                    PollVerdict::Pending { context } => context,
                },
                Err(e) => {
                    warn!(
                        "Failed to fetch combined status for {}, will retry: {:#}",
                        head_sha.short(),
                        e
                    );
                    "combined status".to_string()
                }
            };

            let elapsed = started.elapsed();
            if elapsed + interval > policy.max_elapsed {
                info!(
                    "Gave up waiting on {} for {} after {:?}",
                    waiting_on,
                    head_sha.short(),
                    elapsed
                );
                return WaitOutcome::Timeout {
                    elapsed,
                    waiting_on,
                };
            }

            debug!(
                "Status {} still pending for {}, retrying in {:?}",
                waiting_on,
                head_sha.short(),
                interval
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return WaitOutcome::Cancelled,
                _ = sleep(interval) => {}
            }
            interval = policy.next_interval(interval);
        }
    }
}
