pub mod evaluate;
pub mod rules;
pub mod status;
pub mod types;

pub use evaluate::{evaluate, first_match};
pub use rules::{ApproveCondition, ConditionSet, RuleKey, RulesError};
pub use status::{
    CombinedStatus, CommitStatus, PollVerdict, StatusState, DEFAULT_MERGE_QUEUE_CONTEXT,
};
pub use types::{CommitSha, PullRequestId};
