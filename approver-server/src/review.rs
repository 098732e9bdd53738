use std::sync::Arc;

use anyhow::{Context, Result};
use approver_core::CommitSha;
use tracing::{error, info};

use crate::cancel::CancelToken;
use crate::github::{DraftReview, GitHubApi, PullRequestInfo};

pub const DEFAULT_APPROVED_LABEL: &str = "auto-approved";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// The review was submitted; `labelled` reports whether the marker
    /// label was applied as well.
    Approved { labelled: bool },
    /// Cancellation was observed before anything was submitted.
    Cancelled,
}

/// Performs the approval side effects for a pull request commit.
pub struct ReviewSubmitter {
    github: Arc<dyn GitHubApi>,
    approved_label: String,
}

impl ReviewSubmitter {
    pub fn new(github: Arc<dyn GitHubApi>, approved_label: impl Into<String>) -> Self {
        Self {
            github,
            approved_label: approved_label.into(),
        }
    }

    /// Approve `head_sha` and mark the pull request with the approved label.
    ///
    /// The review is bound to `head_sha`, so it can never land on a newer
    /// commit. A label failure is logged and reported through `labelled`.
    pub async fn approve(
        &self,
        cancel: &CancelToken,
        pr: &PullRequestInfo,
        head_sha: &CommitSha,
    ) -> Result<ApprovalOutcome> {
        if cancel.is_cancelled() {
            info!(
                "Skipping approval of {} at {}: attempt was cancelled",
                pr.id(),
                head_sha.short()
            );
            return Ok(ApprovalOutcome::Cancelled);
        }

        self.github
            .create_review(pr, &DraftReview::approve(head_sha))
            .await
            .with_context(|| format!("Failed to approve {} at {}", pr.id(), head_sha.short()))?;
        info!("Approved {} at {}", pr.id(), head_sha.short());

        let labelled = match self.github.add_label(pr, &self.approved_label).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Approved {} but failed to add label {}: {:#}",
                    pr.id(),
                    self.approved_label,
                    e
                );
                false
            }
        };

        Ok(ApprovalOutcome::Approved { labelled })
    }
}
