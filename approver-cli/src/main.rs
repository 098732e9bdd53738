use anyhow::{Context, Result};
use approver_core::{first_match, ConditionSet};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::Level;

/// Approver: offline tooling for automated approval rules
#[derive(Parser, Debug)]
#[command(name = "approver")]
#[command(about = "Validate and dry-run automated approval rules", long_about = None)]
struct Cli {
    /// Log every label and file check
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and compile a rule file
    Validate(ValidateArgs),
    /// Check whether a pull request would qualify for approval
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Path to the rule file
    #[arg(long, default_value = "rules.yaml")]
    rules: PathBuf,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Path to the rule file
    #[arg(long, default_value = "rules.yaml")]
    rules: PathBuf,

    /// Organization owning the repository
    #[arg(long)]
    org: String,

    /// Repository name
    #[arg(long)]
    repo: String,

    /// Pull request author login
    #[arg(long)]
    author: String,

    /// Label present on the pull request (repeatable)
    #[arg(long = "label")]
    labels: Vec<String>,

    /// Path changed by the pull request (repeatable)
    #[arg(long = "file")]
    files: Vec<String>,
}

fn load_rules(path: &Path) -> Result<ConditionSet> {
    ConditionSet::load(path).with_context(|| format!("Invalid rule file {}", path.display()))
}

fn run_validate(args: ValidateArgs) -> Result<String> {
    let rules = load_rules(&args.rules)?;
    let mut keys: Vec<_> = rules.keys().collect();
    keys.sort();

    let mut report = format!(
        "{}: {} author entries, {} conditions\n",
        args.rules.display(),
        rules.len(),
        rules.condition_count()
    );
    for key in keys {
        let count = rules
            .conditions_for(&key.org, &key.repo, &key.author)
            .map_or(0, <[_]>::len);
        report.push_str(&format!(
            "  {}/{} {}: {} condition(s)\n",
            key.org, key.repo, key.author, count
        ));
    }
    Ok(report)
}

fn run_check(args: CheckArgs) -> Result<String> {
    let rules = load_rules(&args.rules)?;

    let Some(conditions) = rules.conditions_for(&args.org, &args.repo, &args.author) else {
        return Ok(format!(
            "No rules for {} in {}/{}: would not approve\n",
            args.author, args.org, args.repo
        ));
    };

    Ok(match first_match(conditions, &args.labels, &args.files) {
        Some((index, condition)) => format!(
            "Condition #{} matches ({}): would approve once statuses pass\n",
            index, condition
        ),
        None => format!(
            "None of {} condition(s) match: would not approve\n",
            conditions.len()
        ),
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let report = match cli.command {
        Commands::Validate(args) => run_validate(args)?,
        Commands::Check(args) => run_check(args)?,
    };
    print!("{}", report);
    Ok(())
}
