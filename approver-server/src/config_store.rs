//! Current rule set, swapped atomically on reload.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use approver_core::{ConditionSet, RulesError};
use tracing::{debug, error, info};

#[derive(Debug)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<ConditionSet>>,
}

/// Modification time and length of the rule file.
type Fingerprint = (Option<SystemTime>, u64);

fn fingerprint(path: &Path) -> Option<Fingerprint> {
    fs::metadata(path)
        .ok()
        .map(|meta| (meta.modified().ok(), meta.len()))
}

impl ConfigStore {
    /// Load the rule file at `path`. Failure here is fatal to startup.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RulesError> {
        let path = path.into();
        let conditions = ConditionSet::load(&path)?;
        info!(
            "Loaded {} rule entries from {}",
            conditions.len(),
            path.display()
        );
        Ok(Self {
            path: Some(path),
            current: RwLock::new(Arc::new(conditions)),
        })
    }

    /// A store with fixed contents and no backing file.
    pub fn from_conditions(conditions: ConditionSet) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(conditions)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot of the rule set. Later reloads do not affect it.
    pub fn current(&self) -> Arc<ConditionSet> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, conditions: ConditionSet) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(conditions);
    }

    /// Re-read the rule file. On error the previous rule set stays in effect.
    pub fn reload(&self) -> Result<usize> {
        let Some(path) = &self.path else {
            return Ok(self.current().len());
        };

        match ConditionSet::load(path) {
            Ok(conditions) => {
                let entries = conditions.len();
                self.replace(conditions);
                info!("Reloaded {} rule entries from {}", entries, path.display());
                Ok(entries)
            }
            Err(e) => {
                error!(
                    "Keeping previous rules, failed to reload {}: {}",
                    path.display(),
                    e
                );
                Err(e).with_context(|| format!("Failed to reload rules from {}", path.display()))
            }
        }
    }

    /// Reload whenever the rule file's metadata changes. Runs forever.
    pub async fn watch(self: Arc<Self>, poll_interval: Duration) {
        let Some(path) = self.path.clone() else {
            return;
        };

        let mut last = fingerprint(&path);
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        info!(
            "Watching {} for changes every {:?}",
            path.display(),
            poll_interval
        );

        loop {
            ticker.tick().await;
            let seen = fingerprint(&path);
            if seen == last {
                continue;
            }
            debug!("Rule file {} changed", path.display());
            last = seen;
            // Errors are logged by reload and the old rules stay active.
            let _ = self.reload();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ALICE_RULES: &str = r#"
conditions:
  kyma-project:
    test-infra:
      alice:
        - requiredLabels: ["ok-to-approve"]
          changedFiles: ["docs/.*"]
"#;

    const BOB_RULES: &str = r#"
conditions:
  kyma-project:
    test-infra:
      bob:
        - changedFiles: [".*"]
      carol:
        - changedFiles: [".*\\.md"]
"#;

    fn write_rules(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn rewrite(file: &NamedTempFile, contents: &str) {
        fs::write(file.path(), contents).unwrap();
    }

    #[test]
    fn test_load_and_lookup() {
        let file = write_rules(ALICE_RULES);
        let store = ConfigStore::load(file.path()).unwrap();
        let rules = store.current();
        assert!(rules
            .conditions_for("kyma-project", "test-infra", "alice")
            .is_some());
        assert!(rules
            .conditions_for("kyma-project", "test-infra", "bob")
            .is_none());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = ConfigStore::load("/nonexistent/rules.yaml").unwrap_err();
        assert!(matches!(err, RulesError::Read { .. }));
    }

    #[test]
    fn test_reload_replaces_wholesale() {
        let file = write_rules(ALICE_RULES);
        let store = ConfigStore::load(file.path()).unwrap();
        let before = store.current();

        rewrite(&file, BOB_RULES);
        assert_eq!(store.reload().unwrap(), 2);

        let after = store.current();
        assert!(after
            .conditions_for("kyma-project", "test-infra", "alice")
            .is_none());
        assert!(after
            .conditions_for("kyma-project", "test-infra", "bob")
            .is_some());

        // Snapshots taken before the reload are unaffected.
        assert!(before
            .conditions_for("kyma-project", "test-infra", "alice")
            .is_some());
    }

    #[test]
    fn test_invalid_reload_keeps_previous_rules() {
        let file = write_rules(ALICE_RULES);
        let store = ConfigStore::load(file.path()).unwrap();

        rewrite(&file, "conditions:\n  org:\n    repo:\n      dave:\n        - changedFiles: [\"(\"]\n");
        assert!(store.reload().is_err());

        let rules = store.current();
        assert!(rules
            .conditions_for("kyma-project", "test-infra", "alice")
            .is_some());
    }

    #[test]
    fn test_store_without_file_ignores_reload() {
        let store = ConfigStore::from_conditions(ConditionSet::new());
        assert!(store.path().is_none());
        assert_eq!(store.reload().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_watch_picks_up_changes() {
        let file = write_rules(ALICE_RULES);
        let store = Arc::new(ConfigStore::load(file.path()).unwrap());
        let watcher = tokio::spawn(store.clone().watch(Duration::from_millis(20)));
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Different length, so the fingerprint changes even on coarse mtimes.
        rewrite(&file, BOB_RULES);

        let reloaded = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if store
                    .current()
                    .conditions_for("kyma-project", "test-infra", "bob")
                    .is_some()
                {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        watcher.abort();
        assert!(reloaded.is_ok(), "watcher did not reload the rule file");
    }
}
