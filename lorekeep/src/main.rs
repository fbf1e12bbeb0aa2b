//! lorekeep - evidence-based validation and promotion of coding learnings
//!
//! Collects before/after artifacts (test reports, runtime logs, lint output),
//! scores them, and promotes validated learnings into the local store.

mod review;
mod validate;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lorekeep_core::promote::Promoter;
use lorekeep_core::store::{Store, LEARNINGS_COLLECTION};
use lorekeep_core::Config;

#[derive(Parser)]
#[command(name = "lorekeep")]
#[command(about = "Validate and promote learnings from coding sessions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect evidence from before/after artifacts, score it, and
    /// optionally promote the result
    Validate(validate::ValidateArgs),

    /// Promote previously stored evidence by id
    Promote {
        /// Evidence id returned by a prior validate run
        evidence_id: String,

        /// Originating chat or interaction id to record on the learning
        #[arg(long)]
        chat_id: Option<String>,
    },

    /// Review the dormant interaction backlog interactively
    Review(review::ReviewArgs),

    /// List promoted learnings
    Learnings {
        /// Maximum number of learnings to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Output format: text (default) or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = lorekeep_core::logging::init(&config.logging)
        .context("failed to initialize logging")?;

    let db_path = Config::database_path();
    tracing::info!(path = %db_path.display(), "Opening store");
    let store = Store::open(&db_path).context("failed to open store")?;

    match cli.command {
        Commands::Validate(args) => validate::run(&store, &config, args),
        Commands::Promote { evidence_id, chat_id } => {
            promote_by_id(&store, &config, &evidence_id, chat_id.as_deref())
        }
        Commands::Review(args) => review::run(&store, &config, args),
        Commands::Learnings { limit, format } => list_learnings(&store, limit, &format),
    }
}

fn promote_by_id(
    store: &Store,
    config: &Config,
    evidence_id: &str,
    chat_id: Option<&str>,
) -> Result<()> {
    let promoter = Promoter::with_threshold(store, config.promotion.threshold);
    match promoter.promote_by_evidence_id(evidence_id, chat_id, LEARNINGS_COLLECTION, None)? {
        Some(learning_id) => {
            println!("Promoted learning {}", learning_id);
        }
        None => {
            println!(
                "Evidence {} was not promoted (missing, malformed, or below threshold {}).",
                evidence_id, config.promotion.threshold
            );
        }
    }
    Ok(())
}

fn list_learnings(store: &Store, limit: usize, format: &str) -> Result<()> {
    let result = store.get(LEARNINGS_COLLECTION, None, None)?;

    if result.ids.is_empty() {
        println!("No learnings stored yet. Run 'lorekeep validate --promote' first.");
        return Ok(());
    }

    // Newest first, by the timestamp recorded in the sidecar
    let mut rows: Vec<(&String, &String, &serde_json::Value)> = result
        .ids
        .iter()
        .zip(&result.documents)
        .zip(&result.metadatas)
        .map(|((id, doc), meta)| (id, doc, meta))
        .collect();
    rows.sort_by(|a, b| {
        let ts = |m: &serde_json::Value| m["timestamp"].as_str().unwrap_or("").to_string();
        ts(b.2).cmp(&ts(a.2))
    });
    rows.truncate(limit);

    if format == "json" {
        let docs: Vec<serde_json::Value> = rows
            .iter()
            .filter_map(|(_, doc, _)| serde_json::from_str(doc).ok())
            .collect();
        println!("{}", serde_json::to_string_pretty(&docs)?);
        return Ok(());
    }

    for (id, _, meta) in rows {
        let title = meta["title"].as_str().unwrap_or("(untitled)");
        let score = meta["validation_score"].as_f64().unwrap_or(0.0);
        let timestamp = meta["timestamp"].as_str().unwrap_or("");
        println!("{:.2}  {}  {}", score, timestamp, title);
        println!("      id: {}", id);
        let files = meta["affected_files"].as_str().unwrap_or("");
        if !files.is_empty() {
            println!("      files: {}", files);
        }
    }
    Ok(())
}
