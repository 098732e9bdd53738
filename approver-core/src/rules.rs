//! Approval rule file model.
//!
//! Rules are loaded from YAML of the form
//!
//! ```yaml
//! conditions:
//!   <org>:
//!     <repo>:
//!       <author>:
//!         - requiredLabels: [ok-to-approve]
//!           changedFiles: ["^docs/.*"]
//! ```
//!
//! Every `changedFiles` entry is compiled once, anchored to the whole path,
//! when the file is loaded. A pattern that fails to compile rejects the
//! whole file.

use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    #[error("failed to read rules file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse rules: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid changedFiles pattern {pattern:?} for {org}/{repo} author {author}: {source}")]
    InvalidPattern {
        org: String,
        repo: String,
        author: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A single condition as written in the rules file.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawApproveCondition {
    #[serde(rename = "requiredLabels", default)]
    pub required_labels: Vec<String>,
    #[serde(rename = "changedFiles", default)]
    pub changed_files: Vec<String>,
}

type RawConditions = HashMap<String, HashMap<String, HashMap<String, Vec<RawApproveCondition>>>>;

#[derive(Debug, Default, Deserialize)]
struct RulesFile {
    #[serde(default)]
    conditions: RawConditions,
}

/// A compiled approval condition.
///
/// Labels are ANDed; a changed file must match at least one pattern. An empty
/// pattern list permits no changed file at all.
#[derive(Debug, Clone)]
pub struct ApproveCondition {
    required_labels: BTreeSet<String>,
    changed_file_patterns: Vec<Regex>,
}

impl ApproveCondition {
    /// Compile a condition. Each pattern must match the entire file path.
    pub fn new<L, P>(required_labels: L, changed_file_patterns: P) -> Result<Self, regex::Error>
    where
        L: IntoIterator,
        L::Item: Into<String>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let changed_file_patterns = changed_file_patterns
            .into_iter()
            .map(|pattern| anchored(pattern.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            required_labels: required_labels.into_iter().map(Into::into).collect(),
            changed_file_patterns,
        })
    }

    pub fn required_labels(&self) -> &BTreeSet<String> {
        &self.required_labels
    }

    pub fn changed_file_patterns(&self) -> &[Regex] {
        &self.changed_file_patterns
    }

    /// True when `path` matches at least one configured pattern.
    pub fn matches_file(&self, path: &str) -> bool {
        self.changed_file_patterns
            .iter()
            .any(|pattern| pattern.is_match(path))
    }
}

impl fmt::Display for ApproveCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patterns: Vec<&str> = self
            .changed_file_patterns
            .iter()
            .map(|p| p.as_str())
            .collect();
        write!(
            f,
            "requiredLabels={:?} changedFiles={:?}",
            self.required_labels, patterns
        )
    }
}

/// Lookup key for the conditions of one author in one repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleKey {
    pub org: String,
    pub repo: String,
    pub author: String,
}

impl RuleKey {
    pub fn new(org: impl Into<String>, repo: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            repo: repo.into(),
            author: author.into(),
        }
    }
}

/// The full, immutable rule set. Reloads replace it wholesale.
#[derive(Debug, Clone, Default)]
pub struct ConditionSet {
    rules: HashMap<RuleKey, Vec<ApproveCondition>>,
}

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and compile a rules file.
    pub fn load(path: &Path) -> Result<Self, RulesError> {
        let contents = std::fs::read_to_string(path).map_err(|source| RulesError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    /// Parse and compile rules from YAML text.
    pub fn from_yaml(contents: &str) -> Result<Self, RulesError> {
        // An empty document deserializes as null rather than an empty mapping.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let file: RulesFile = serde_yaml::from_str(contents)?;
        Self::compile(file.conditions)
    }

    fn compile(raw: RawConditions) -> Result<Self, RulesError> {
        let mut rules = HashMap::new();
        for (org, repos) in raw {
            for (repo, authors) in repos {
                for (author, conditions) in authors {
                    let compiled = conditions
                        .into_iter()
                        .map(|condition| {
                            compile_condition(condition).map_err(|(pattern, source)| {
                                RulesError::InvalidPattern {
                                    org: org.clone(),
                                    repo: repo.clone(),
                                    author: author.clone(),
                                    pattern,
                                    source,
                                }
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    rules.insert(RuleKey::new(org.clone(), repo.clone(), author), compiled);
                }
            }
        }
        Ok(Self { rules })
    }

    /// Add (or replace) the conditions for one author.
    pub fn insert(&mut self, key: RuleKey, conditions: Vec<ApproveCondition>) {
        self.rules.insert(key, conditions);
    }

    /// Conditions configured for `author` in `org/repo`, if any.
    pub fn conditions_for(&self, org: &str, repo: &str, author: &str) -> Option<&[ApproveCondition]> {
        self.rules
            .get(&RuleKey::new(org, repo, author))
            .map(Vec::as_slice)
    }

    /// Number of (org, repo, author) entries.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Total number of conditions across all entries.
    pub fn condition_count(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn keys(&self) -> impl Iterator<Item = &RuleKey> {
        self.rules.keys()
    }
}

fn compile_condition(raw: RawApproveCondition) -> Result<ApproveCondition, (String, regex::Error)> {
    let changed_file_patterns = raw
        .changed_files
        .into_iter()
        .map(|pattern| anchored(&pattern).map_err(|e| (pattern, e)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ApproveCondition {
        required_labels: raw.required_labels.into_iter().collect(),
        changed_file_patterns,
    })
}

fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})$", pattern))
}
