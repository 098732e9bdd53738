//! Scripted `GitHubApi` implementation for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use approver_core::{CombinedStatus, CommitSha, CommitStatus, StatusState};
use async_trait::async_trait;

use crate::github::{ChangedFile, DraftReview, GitHubApi, PullRequestInfo};

pub fn combined(state: StatusState, statuses: &[(&str, StatusState)]) -> CombinedStatus {
    CombinedStatus {
        state,
        sha: None,
        statuses: statuses
            .iter()
            .map(|(context, state)| CommitStatus {
                context: context.to_string(),
                state: *state,
                description: None,
                target_url: None,
            })
            .collect(),
    }
}

pub fn green() -> CombinedStatus {
    combined(
        StatusState::Pending,
        &[
            ("unit-tests", StatusState::Success),
            ("tide", StatusState::Pending),
        ],
    )
}

pub fn still_running() -> CombinedStatus {
    combined(
        StatusState::Pending,
        &[
            ("unit-tests", StatusState::Pending),
            ("tide", StatusState::Pending),
        ],
    )
}

pub fn pr_info(pr_number: u64) -> PullRequestInfo {
    PullRequestInfo {
        installation_id: Some(1),
        repo_owner: "kyma-project".to_string(),
        repo_name: "test-infra".to_string(),
        pr_number,
    }
}

/// Statuses are served in order; the last one repeats once the script runs out.
#[derive(Default)]
pub struct MockGitHub {
    files: Mutex<Vec<String>>,
    statuses: Mutex<VecDeque<Result<CombinedStatus, String>>>,
    pub status_polls: AtomicUsize,
    pub files_requests: AtomicUsize,
    pub reviews: Mutex<Vec<(u64, DraftReview)>>,
    pub labels: Mutex<Vec<(u64, String)>>,
    pub comments: Mutex<Vec<(u64, String)>>,
    pub fail_files: AtomicBool,
    pub fail_review: AtomicBool,
    pub fail_label: AtomicBool,
}

impl MockGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files(self, files: &[&str]) -> Self {
        *self.files.lock().unwrap() = files.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_statuses(self, statuses: Vec<CombinedStatus>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into_iter().map(Ok).collect();
        self
    }

    pub fn push_status_error(&self, message: &str) {
        self.statuses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn push_status(&self, status: CombinedStatus) {
        self.statuses.lock().unwrap().push_back(Ok(status));
    }

    pub fn polls(&self) -> usize {
        self.status_polls.load(Ordering::SeqCst)
    }

    pub fn review_count(&self) -> usize {
        self.reviews.lock().unwrap().len()
    }

    pub fn label_names(&self) -> Vec<String> {
        self.labels
            .lock()
            .unwrap()
            .iter()
            .map(|(_, label)| label.clone())
            .collect()
    }
}

#[async_trait]
impl GitHubApi for MockGitHub {
    async fn get_pull_request_files(&self, _pr: &PullRequestInfo) -> Result<Vec<ChangedFile>> {
        self.files_requests.fetch_add(1, Ordering::SeqCst);
        if self.fail_files.load(Ordering::SeqCst) {
            return Err(anyhow!("GitHub API error fetching pull request files: 502"));
        }
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .map(|filename| ChangedFile {
                filename: filename.clone(),
                status: "modified".to_string(),
            })
            .collect())
    }

    async fn get_combined_status(
        &self,
        _pr: &PullRequestInfo,
        _sha: &CommitSha,
    ) -> Result<CombinedStatus> {
        self.status_polls.fetch_add(1, Ordering::SeqCst);
        let mut statuses = self.statuses.lock().unwrap();
        let next = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        match next {
            Some(Ok(status)) => Ok(status),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no status scripted")),
        }
    }

    async fn create_review(&self, pr: &PullRequestInfo, review: &DraftReview) -> Result<()> {
        if self.fail_review.load(Ordering::SeqCst) {
            return Err(anyhow!("GitHub API error creating review: 422"));
        }
        self.reviews
            .lock()
            .unwrap()
            .push((pr.pr_number, review.clone()));
        Ok(())
    }

    async fn add_label(&self, pr: &PullRequestInfo, label: &str) -> Result<()> {
        if self.fail_label.load(Ordering::SeqCst) {
            return Err(anyhow!("GitHub API error adding label: 403"));
        }
        self.labels
            .lock()
            .unwrap()
            .push((pr.pr_number, label.to_string()));
        Ok(())
    }

    async fn create_comment(&self, pr: &PullRequestInfo, body: &str) -> Result<()> {
        self.comments
            .lock()
            .unwrap()
            .push((pr.pr_number, body.to_string()));
        Ok(())
    }
}
