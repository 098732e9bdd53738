pub mod cancel;
pub mod config;
pub mod config_store;
pub mod github;
pub mod lock_registry;
pub mod orchestrator;
pub mod review;
pub mod status_waiter;
pub mod webhook;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

pub use cancel::{cancellation_pair, CancelHandle, CancelToken};
pub use config_store::ConfigStore;
pub use github::{GitHubApi, GitHubAuth, GitHubClient, PullRequestInfo};
pub use lock_registry::{LockGuard, LockKey, LockRegistry};
pub use orchestrator::{AttemptOutcome, Orchestrator, PullRequestEvent, Trigger};
pub use review::{ApprovalOutcome, ReviewSubmitter};
pub use status_waiter::{BackoffPolicy, StatusWaiter, StatusWaiterConfig, WaitOutcome};

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

fn short_hash(git_hash: &str) -> String {
    git_hash.chars().take(8).collect()
}

pub fn get_bot_version() -> String {
    // Hash injected by the packaging environment wins over git detection
    if let Some(git_hash) = option_env!("APPROVER_GIT_HASH") {
        short_hash(git_hash)
    } else if let Some(git_hash) = built_info::GIT_COMMIT_HASH {
        short_hash(git_hash)
    } else {
        "unknown".to_string()
    }
}

pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub webhook_secret: String,
}
