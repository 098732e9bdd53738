use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

use crate::github::{GitHubAuth, DEFAULT_API_URL};
use crate::review::DEFAULT_APPROVED_LABEL;
use approver_core::DEFAULT_MERGE_QUEUE_CONTEXT;

#[derive(Clone)]
pub struct Config {
    pub github_auth: GitHubAuth,
    pub github_api_url: String,
    pub github_webhook_secret: String,
    pub port: u16,
    pub rules_path: PathBuf,
    /// How often the rule file is checked for changes.
    pub rules_poll_interval: Duration,
    /// Budget for waiting on CI statuses, measured from the first poll.
    pub wait_for_statuses_timeout: Duration,
    pub approved_label: String,
    pub merge_queue_context: String,
    pub log_level: Level,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| non_blank(lookup(name));

        let github_auth = match var("GITHUB_TOKEN") {
            Some(token) => GitHubAuth::Token(token),
            None => {
                let app_id = var("GITHUB_APP_ID")
                    .context("GITHUB_TOKEN or GITHUB_APP_ID environment variable is required")?
                    .parse::<u64>()
                    .context("GITHUB_APP_ID must be a valid number")?;
                let private_key = var("GITHUB_PRIVATE_KEY")
                    .context("GITHUB_PRIVATE_KEY environment variable is required with GITHUB_APP_ID")?
                    .replace("\\n", "\n");
                GitHubAuth::App {
                    app_id,
                    private_key,
                }
            }
        };

        let github_api_url = var("GITHUB_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let github_webhook_secret = var("GITHUB_WEBHOOK_SECRET")
            .context("GITHUB_WEBHOOK_SECRET environment variable is required")?;

        let port = var("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let rules_path = var("RULES_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("rules.yaml"));

        let rules_poll_interval = parse_seconds(var("RULES_POLL_INTERVAL_SECS"), 10)
            .context("RULES_POLL_INTERVAL_SECS must be a positive number of seconds")?;

        let wait_for_statuses_timeout =
            parse_seconds(var("WAIT_FOR_STATUSES_TIMEOUT_SECS"), 3600)
                .context("WAIT_FOR_STATUSES_TIMEOUT_SECS must be a positive number of seconds")?;

        let approved_label =
            var("APPROVED_LABEL").unwrap_or_else(|| DEFAULT_APPROVED_LABEL.to_string());

        let merge_queue_context =
            var("MERGE_QUEUE_CONTEXT").unwrap_or_else(|| DEFAULT_MERGE_QUEUE_CONTEXT.to_string());

        let log_level = parse_log_level(var("LOG_LEVEL"))?;

        Ok(Config {
            github_auth,
            github_api_url,
            github_webhook_secret,
            port,
            rules_path,
            rules_poll_interval,
            wait_for_statuses_timeout,
            approved_label,
            merge_queue_context,
            log_level,
        })
    }
}

/// Treat missing, empty and whitespace-only values alike.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Parse a whole number of seconds, falling back to `default_secs` when unset.
pub fn parse_seconds(value: Option<String>, default_secs: u64) -> Result<Duration> {
    let secs = match value {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid number of seconds: {:?}", raw))?,
        None => default_secs,
    };
    if secs == 0 {
        bail!("duration must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}

pub fn parse_log_level(value: Option<String>) -> Result<Level> {
    match value {
        Some(raw) => raw
            .trim()
            .parse::<Level>()
            .with_context(|| format!("LOG_LEVEL must be one of trace, debug, info, warn, error, got {:?}", raw)),
        None => Ok(Level::INFO),
    }
}
