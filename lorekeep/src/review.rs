//! `lorekeep review` - interactive promotion of the dormant backlog

use anyhow::{Context, Result};
use clap::Args;
use lorekeep_core::promote::Promoter;
use lorekeep_core::review::{
    self, AutoPromote, Candidate, CodeHit, CodeSearch, ModificationType, ReviewOutcome,
    ReviewRoute, ReviewSummary,
};
use lorekeep_core::store::{Store, INTERACTIONS_COLLECTION, LEARNINGS_COLLECTION};
use lorekeep_core::Config;
use std::io::{BufRead, Write};

#[derive(Args)]
pub struct ReviewArgs {
    /// Only review interactions of this type (bug_fix, refactor, feature,
    /// optimization, error_handling)
    #[arg(short = 't', long = "type")]
    type_filter: Option<String>,

    /// Minimum capture-time confidence to surface a candidate
    #[arg(long)]
    min_confidence: Option<f64>,

    /// Auto-promote high-confidence candidates without prompting
    #[arg(long)]
    auto: bool,

    /// Maximum number of candidates to review
    #[arg(short, long, default_value_t = 25)]
    limit: usize,
}

pub fn run(store: &Store, config: &Config, args: ReviewArgs) -> Result<()> {
    let type_filter = match args.type_filter.as_deref() {
        Some(raw) => {
            let parsed = ModificationType::from_storage(raw);
            if parsed == ModificationType::Unknown && raw != "unknown" {
                anyhow::bail!("unrecognized interaction type '{}'", raw);
            }
            Some(parsed)
        }
        None => None,
    };
    let min_confidence = args.min_confidence.unwrap_or(config.promotion.min_confidence);
    let auto = AutoPromote {
        enabled: args.auto,
        threshold: config.promotion.auto_promote_threshold,
    };

    let candidates = review::load_candidates(store, INTERACTIONS_COLLECTION)?;
    let mut candidates = review::filter_candidates(candidates, type_filter, min_confidence);
    review::sort_candidates(&mut candidates);
    candidates.truncate(args.limit);

    if candidates.is_empty() {
        println!("No dormant interactions match the current filters.");
        return Ok(());
    }

    println!("{} candidate(s) to review.\n", candidates.len());

    let promoter = Promoter::with_threshold(store, config.promotion.threshold);
    let search = StoreSearch { store };
    let mut summary = ReviewSummary::default();
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    for candidate in &candidates {
        let outcome = match review::route(candidate, &auto) {
            ReviewRoute::Auto => {
                let defaults = review::auto_defaults(candidate, Some(&search));
                let learning_id = review::promote_candidate(
                    store,
                    &promoter,
                    INTERACTIONS_COLLECTION,
                    LEARNINGS_COLLECTION,
                    candidate,
                    &defaults,
                    ReviewOutcome::AutoPromoted,
                )?;
                println!(
                    "Auto-promoted {} (confidence {:.2}) -> learning {}",
                    candidate.id,
                    candidate.confidence_score.unwrap_or(0.0),
                    learning_id
                );
                summary.record(ReviewOutcome::AutoPromoted);
                continue;
            }
            ReviewRoute::Prompt => {
                print_candidate(candidate);
                match prompt(&mut lines)? {
                    Decision::Promote => {
                        let defaults = review::auto_defaults(candidate, Some(&search));
                        let learning_id = review::promote_candidate(
                            store,
                            &promoter,
                            INTERACTIONS_COLLECTION,
                            LEARNINGS_COLLECTION,
                            candidate,
                            &defaults,
                            ReviewOutcome::Promoted,
                        )?;
                        println!("Promoted as learning {}\n", learning_id);
                        ReviewOutcome::Promoted
                    }
                    Decision::Ignore => {
                        review::apply_outcome(
                            store,
                            INTERACTIONS_COLLECTION,
                            candidate,
                            ReviewOutcome::Ignored,
                        )?;
                        ReviewOutcome::Ignored
                    }
                    Decision::Skip => ReviewOutcome::Skipped,
                    Decision::Quit => break,
                }
            }
        };
        summary.record(outcome);
    }

    println!(
        "\nReview complete: {} promoted, {} auto-promoted, {} ignored, {} skipped.",
        summary.promoted, summary.auto_promoted, summary.ignored, summary.skipped
    );
    Ok(())
}

/// Substring matcher over promoted learnings.
///
/// Stands in for a real semantic index: a learning whose document text
/// contains a query word contributes its first affected file as a
/// suggested reference.
struct StoreSearch<'a> {
    store: &'a Store,
}

impl CodeSearch for StoreSearch<'_> {
    fn query(&self, text: &str, n_results: usize) -> lorekeep_core::Result<Vec<CodeHit>> {
        let result = self.store.get(LEARNINGS_COLLECTION, None, None)?;
        let needles: Vec<String> = text
            .split_whitespace()
            .filter(|w| w.len() >= 4)
            .map(str::to_lowercase)
            .collect();

        let mut hits = Vec::new();
        for (index, (id, document)) in result.ids.iter().zip(&result.documents).enumerate() {
            let haystack = document.to_lowercase();
            let matched = needles
                .iter()
                .filter(|n| haystack.contains(n.as_str()))
                .count();
            if matched == 0 {
                continue;
            }
            let files = result.metadatas[index]["affected_files"]
                .as_str()
                .unwrap_or("");
            let Some(file_path) = files.split(',').find(|f| !f.is_empty()) else {
                continue;
            };
            hits.push(CodeHit {
                id: id.clone(),
                file_path: file_path.to_string(),
                snippet: document.chars().take(120).collect(),
                distance: 1.0 / matched as f64,
            });
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(n_results);
        Ok(hits)
    }
}

enum Decision {
    Promote,
    Ignore,
    Skip,
    Quit,
}

fn prompt<I>(lines: &mut I) -> Result<Decision>
where
    I: Iterator<Item = std::io::Result<String>>,
{
    loop {
        print!("[p]romote / [i]gnore / [s]kip / [q]uit > ");
        std::io::stdout().flush().context("failed to flush stdout")?;

        let Some(line) = lines.next() else {
            // EOF behaves like quit
            return Ok(Decision::Quit);
        };
        match line.context("failed to read input")?.trim() {
            "p" => return Ok(Decision::Promote),
            "i" => return Ok(Decision::Ignore),
            "s" | "" => return Ok(Decision::Skip),
            "q" => return Ok(Decision::Quit),
            other => println!("Unrecognized choice '{}'.", other),
        }
    }
}

fn print_candidate(candidate: &Candidate) {
    println!(
        "--- {} [{}] confidence {} richness {:.0}% captured {}",
        candidate.id,
        candidate.modification_type.as_str(),
        candidate
            .confidence_score
            .map_or("n/a".to_string(), |c| format!("{:.2}", c)),
        candidate.context_richness() * 100.0,
        candidate.captured_at.format("%Y-%m-%d %H:%M")
    );
    if let Some(summary) = &candidate.diff_summary {
        println!("    diff: {}", summary);
    }
    if let Some(context) = &candidate.code_context {
        println!("    context: {}", clip(context, 120));
    }
    if let Some(tools) = &candidate.tool_sequence {
        println!("    tools: {}", tools);
    }
}

fn clip(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    }
}
