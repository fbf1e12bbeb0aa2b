//! `lorekeep validate` - collect, score, and optionally promote

use anyhow::{Context, Result};
use clap::Args;
use lorekeep_core::collect::{quality, runtime_log, tests_xml};
use lorekeep_core::evidence::{CodeChange, CodeChanges, EvidenceKind};
use lorekeep_core::promote::Promoter;
use lorekeep_core::score::aggregate;
use lorekeep_core::store::{Store, LEARNINGS_COLLECTION};
use lorekeep_core::Config;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Args)]
pub struct ValidateArgs {
    /// JUnit XML report from before the change
    #[arg(long)]
    tests_before: Option<PathBuf>,

    /// JUnit XML report from after the change
    #[arg(long)]
    tests_after: Option<PathBuf>,

    /// Runtime log from before the change
    #[arg(long)]
    log_before: Option<PathBuf>,

    /// Runtime log from after the change
    #[arg(long)]
    log_after: Option<PathBuf>,

    /// Captured lint output from before the change (raw tool stdout)
    #[arg(long)]
    lint_before: Option<PathBuf>,

    /// Paths to lint now, compared against the captured baseline
    #[arg(long)]
    lint: Vec<PathBuf>,

    /// Diagnostics tool for the lint runs: ruff, pylint, or flake8
    #[arg(long, default_value = "ruff")]
    tool: String,

    /// Changed files to snapshot into the evidence records
    #[arg(long)]
    changed_file: Vec<PathBuf>,

    /// Promote the result into the learnings collection when it clears
    /// the threshold
    #[arg(long)]
    promote: bool,

    /// Originating chat or interaction id to record on the learning
    #[arg(long)]
    chat_id: Option<String>,

    /// Output format: text (default) or json
    #[arg(short, long, default_value = "text")]
    format: String,
}

pub fn run(store: &Store, config: &Config, args: ValidateArgs) -> Result<()> {
    let changes = snapshot_changes(&args.changed_file)?;

    let transitions = match (&args.tests_before, &args.tests_after) {
        (Some(before), Some(after)) => tests_xml::collect(before, after, true, &changes)
            .context("failed to collect test transitions")?,
        (None, None) => Vec::new(),
        _ => anyhow::bail!("--tests-before and --tests-after must be given together"),
    };

    let resolutions = match (&args.log_before, &args.log_after) {
        (Some(before), Some(after)) => {
            let supplied = (!changes.is_empty()).then_some(&changes);
            runtime_log::collect(before, after, supplied)
                .context("failed to collect runtime error resolutions")?
        }
        (None, None) => Vec::new(),
        _ => anyhow::bail!("--log-before and --log-after must be given together"),
    };

    let improvements = match (&args.lint_before, args.lint.is_empty()) {
        (Some(baseline_path), false) => {
            let tool = quality::LintTool::from_str(&args.tool)?;
            let baseline = std::fs::read_to_string(baseline_path).with_context(|| {
                format!("failed to read lint baseline {}", baseline_path.display())
            })?;
            let supplied = (!changes.is_empty()).then_some(&changes);
            quality::collect_against_baseline(
                &quality::CommandProvider,
                tool,
                &baseline,
                &args.lint,
                supplied,
            )
            .context("failed to collect code quality evidence")?
        }
        (None, true) => Vec::new(),
        _ => anyhow::bail!("--lint-before and --lint must be given together"),
    };

    let envelope = aggregate(transitions, resolutions, improvements, &config.scoring);

    let promoter = Promoter::with_threshold(store, config.promotion.threshold);
    let evidence_id = promoter.store_evidence(&envelope)?;

    let learning_id = if args.promote {
        promoter.promote_learning(&envelope, args.chat_id.as_deref(), LEARNINGS_COLLECTION, None)?
    } else {
        None
    };

    if args.format == "json" {
        let report = serde_json::json!({
            "evidence_id": evidence_id,
            "score": envelope.score,
            "evidence_types": &envelope.evidence_types,
            "meets_threshold": envelope.meets_threshold(config.promotion.threshold),
            "learning_id": learning_id,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Evidence {} scored {:.2}", evidence_id, envelope.score);
    if envelope.is_empty() {
        println!("No qualifying evidence found in the given artifacts.");
    } else {
        for kind in &envelope.evidence_types {
            let count = match kind {
                EvidenceKind::TestTransition => {
                    envelope.test_transitions.as_ref().map_or(0, Vec::len)
                }
                EvidenceKind::RuntimeErrorResolution => {
                    envelope.runtime_errors.as_ref().map_or(0, Vec::len)
                }
                _ => envelope
                    .code_quality_improvements
                    .as_ref()
                    .map_or(0, Vec::len),
            };
            println!("  {} x{}", kind.as_str(), count);
        }
    }

    match (args.promote, &learning_id) {
        (true, Some(id)) => println!("Promoted learning {}", id),
        (true, None) => println!(
            "Score below promotion threshold {}; nothing promoted.",
            config.promotion.threshold
        ),
        (false, _) => println!(
            "Re-run with --promote, or later: lorekeep promote {}",
            evidence_id
        ),
    }
    Ok(())
}

/// Read each changed file into an after-snapshot code change.
fn snapshot_changes(files: &[PathBuf]) -> Result<CodeChanges> {
    let mut changes = CodeChanges::new();
    for file in files {
        let after = std::fs::read_to_string(file)
            .with_context(|| format!("failed to read changed file {}", file.display()))?;
        changes.insert(
            file.display().to_string(),
            CodeChange {
                before: String::new(),
                after,
            },
        );
    }
    Ok(changes)
}
