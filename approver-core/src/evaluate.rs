//! Condition evaluation against pull request labels and changed files.
//!
//! Conditions are ORed in order (the first fully satisfied one wins); within
//! a condition the label clause and the file clause are ANDed.

use std::collections::HashSet;

use tracing::debug;

use crate::rules::ApproveCondition;

impl ApproveCondition {
    /// Every required label is present. No required labels always passes.
    pub fn labels_satisfied<S: AsRef<str>>(&self, pr_labels: &[S]) -> bool {
        if self.required_labels().is_empty() {
            debug!("No required labels defined");
            return true;
        }
        let present: HashSet<&str> = pr_labels.iter().map(AsRef::as_ref).collect();
        for required in self.required_labels() {
            if !present.contains(required.as_str()) {
                debug!("PR is missing required label: {}", required);
                return false;
            }
        }
        debug!("All required labels are present");
        true
    }

    /// Every changed file matches at least one pattern.
    ///
    /// With no patterns configured this only holds for an empty change set.
    pub fn files_satisfied<S: AsRef<str>>(&self, changed_files: &[S]) -> bool {
        for file in changed_files {
            let file = file.as_ref();
            if !self.matches_file(file) {
                debug!("File {} not matched", file);
                return false;
            }
        }
        debug!("All files matched");
        true
    }

    /// Both clauses hold.
    pub fn is_satisfied_by<L: AsRef<str>, F: AsRef<str>>(
        &self,
        pr_labels: &[L],
        changed_files: &[F],
    ) -> bool {
        if !self.labels_satisfied(pr_labels) {
            debug!("Labels not matched");
            return false;
        }
        if !self.files_satisfied(changed_files) {
            debug!("Files not matched");
            return false;
        }
        true
    }
}

/// The first condition satisfied by the pull request, with its index.
pub fn first_match<'a, L: AsRef<str>, F: AsRef<str>>(
    conditions: &'a [ApproveCondition],
    pr_labels: &[L],
    changed_files: &[F],
) -> Option<(usize, &'a ApproveCondition)> {
    for (index, condition) in conditions.iter().enumerate() {
        debug!("Checking condition {}: {}", index, condition);
        if condition.is_satisfied_by(pr_labels, changed_files) {
            return Some((index, condition));
        }
    }
    debug!("No conditions matched");
    None
}

/// Whether any condition authorizes approval.
pub fn evaluate<L: AsRef<str>, F: AsRef<str>>(
    conditions: &[ApproveCondition],
    pr_labels: &[L],
    changed_files: &[F],
) -> bool {
    first_match(conditions, pr_labels, changed_files).is_some()
}
