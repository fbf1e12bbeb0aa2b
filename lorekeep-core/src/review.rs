//! Review backlog decision logic
//!
//! Pure decisions for the human-in-the-loop reviewer: which dormant
//! interactions to surface, in what order, which ones bypass prompting
//! via auto-promotion, and what defaults an auto-promotion uses. The
//! terminal prompting itself lives in the CLI; everything that encodes a
//! business rule is here so it can be tested without a terminal.

use crate::error::Result;
use crate::evidence::Learning;
use crate::promote::Promoter;
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default confidence above which a candidate is auto-promoted.
pub const DEFAULT_AUTO_PROMOTE_THRESHOLD: f64 = 0.8;

/// Number of optional context fields richness is measured over.
const RICHNESS_FIELD_COUNT: usize = 6;

// ============================================
// Candidates
// ============================================

/// What kind of change an interaction captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationType {
    BugFix,
    Refactor,
    Feature,
    Optimization,
    ErrorHandling,
    Unknown,
}

impl ModificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModificationType::BugFix => "bug_fix",
            ModificationType::Refactor => "refactor",
            ModificationType::Feature => "feature",
            ModificationType::Optimization => "optimization",
            ModificationType::ErrorHandling => "error_handling",
            ModificationType::Unknown => "unknown",
        }
    }

    /// Parse the value stored at capture time; anything unrecognized maps
    /// to `Unknown` rather than failing the review run.
    pub fn from_storage(value: &str) -> Self {
        match value {
            "bug_fix" => ModificationType::BugFix,
            "refactor" => ModificationType::Refactor,
            "feature" => ModificationType::Feature,
            "optimization" => ModificationType::Optimization,
            "error_handling" => ModificationType::ErrorHandling,
            _ => ModificationType::Unknown,
        }
    }

    /// Default pattern label applied by auto-promotion.
    pub fn default_pattern(&self) -> &'static str {
        match self {
            ModificationType::BugFix => "bug-fix",
            ModificationType::Refactor => "refactoring",
            ModificationType::Feature => "feature-implementation",
            ModificationType::Optimization => "performance-tuning",
            ModificationType::ErrorHandling => "error-handling",
            ModificationType::Unknown => "general",
        }
    }
}

/// Review status of a backlog interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Dormant,
    Promoted,
    Ignored,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Dormant => "dormant",
            CandidateStatus::Promoted => "promoted",
            CandidateStatus::Ignored => "ignored",
        }
    }
}

/// A dormant interaction awaiting review.
///
/// `confidence_score` is a heuristic attached at capture time; it is not
/// derived from the evidence pipeline and is unrelated to
/// [`crate::evidence::ValidationEvidence::score`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub modification_type: ModificationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_sequence: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_code_chunks: Vec<String>,
    pub status: CandidateStatus,
    pub captured_at: DateTime<Utc>,
}

impl Candidate {
    /// Fraction of the fixed optional-context field set that is populated.
    ///
    /// Used only for sort ordering, never for scoring.
    pub fn context_richness(&self) -> f64 {
        let mut present = 0usize;
        if self.code_context.as_deref().is_some_and(|s| !s.is_empty()) {
            present += 1;
        }
        if self.diff_summary.as_deref().is_some_and(|s| !s.is_empty()) {
            present += 1;
        }
        if self.tool_sequence.as_deref().is_some_and(|s| !s.is_empty()) {
            present += 1;
        }
        if !self.related_code_chunks.is_empty() {
            present += 1;
        }
        if self.confidence_score.is_some() {
            present += 1;
        }
        if self.modification_type != ModificationType::Unknown {
            present += 1;
        }
        present as f64 / RICHNESS_FIELD_COUNT as f64
    }

    fn confidence(&self) -> f64 {
        self.confidence_score.unwrap_or(0.0)
    }
}

// ============================================
// Filtering, sorting, routing
// ============================================

/// Keep candidates matching the requested type (or all) at or above the
/// minimum confidence.
pub fn filter_candidates(
    candidates: Vec<Candidate>,
    type_filter: Option<ModificationType>,
    min_confidence: f64,
) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|c| type_filter.map_or(true, |t| c.modification_type == t))
        .filter(|c| c.confidence() >= min_confidence)
        .collect()
}

/// Order candidates by (confidence, richness), both descending.
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.confidence()
            .total_cmp(&a.confidence())
            .then(b.context_richness().total_cmp(&a.context_richness()))
    });
}

/// Auto-promotion gate configuration.
#[derive(Debug, Clone, Copy)]
pub struct AutoPromote {
    pub enabled: bool,
    pub threshold: f64,
}

impl Default for AutoPromote {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: DEFAULT_AUTO_PROMOTE_THRESHOLD,
        }
    }
}

/// How a candidate should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewRoute {
    /// Promote with auto-generated defaults, no prompting
    Auto,
    /// Present interactively
    Prompt,
}

/// Route a candidate: auto-promotion bypasses prompting when enabled and
/// the capture-time confidence clears the threshold.
pub fn route(candidate: &Candidate, auto: &AutoPromote) -> ReviewRoute {
    if auto.enabled && candidate.confidence() >= auto.threshold {
        ReviewRoute::Auto
    } else {
        ReviewRoute::Prompt
    }
}

// ============================================
// Auto-promotion defaults
// ============================================

/// Code-reference lookup boundary (semantic search over indexed code).
///
/// Only used to suggest a default reference; promotion never requires it.
pub trait CodeSearch {
    fn query(&self, text: &str, n_results: usize) -> Result<Vec<CodeHit>>;
}

/// One ranked result from a code-reference lookup.
#[derive(Debug, Clone)]
pub struct CodeHit {
    pub id: String,
    pub file_path: String,
    pub snippet: String,
    pub distance: f64,
}

/// Values used in place of the normally-prompted fields.
#[derive(Debug, Clone, PartialEq)]
pub struct PromotionDefaults {
    pub description: String,
    pub pattern: String,
    pub tags: Vec<String>,
    pub confidence: f64,
    pub code_reference: Option<String>,
}

/// Compute the defaults an auto-promotion uses for a candidate.
///
/// The pattern label varies by modification type; the description prefers
/// the captured diff summary, then the code context, then a generic line.
/// A code search, when available, contributes a suggested reference and
/// its failure is ignored.
pub fn auto_defaults(candidate: &Candidate, code_search: Option<&dyn CodeSearch>) -> PromotionDefaults {
    let description = candidate
        .diff_summary
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| candidate.code_context.clone().filter(|s| !s.is_empty()))
        .unwrap_or_else(|| {
            format!(
                "Auto-promoted {} interaction {}",
                candidate.modification_type.as_str(),
                candidate.id
            )
        });

    let code_reference = code_search.and_then(|search| {
        match search.query(&description, 1) {
            Ok(hits) => hits.into_iter().next().map(|h| h.file_path),
            Err(e) => {
                tracing::debug!(error = %e, "Code search unavailable for default reference");
                None
            }
        }
    });

    PromotionDefaults {
        description,
        pattern: candidate.modification_type.default_pattern().to_string(),
        tags: vec![
            "auto-promoted".to_string(),
            candidate.modification_type.as_str().to_string(),
        ],
        confidence: candidate.confidence(),
        code_reference,
    }
}

/// Build the learning an auto- or manual promotion writes for a candidate.
pub fn learning_from_candidate(candidate: &Candidate, defaults: &PromotionDefaults) -> Learning {
    let mut description = defaults.description.clone();
    if let Some(reference) = &defaults.code_reference {
        description.push_str(&format!(" (see {})", reference));
    }
    Learning {
        title: format!(
            "{}: {}",
            defaults.pattern,
            truncate(&defaults.description, 60)
        ),
        description,
        code_snippets: Vec::new(),
        validation_score: defaults.confidence,
        validation_evidence: None,
        timestamp: Utc::now(),
        chat_id: Some(candidate.id.clone()),
        metadata: None,
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}...", cut.trim_end())
    }
}

// ============================================
// Outcomes
// ============================================

/// Terminal outcome of reviewing one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    Promoted,
    AutoPromoted,
    Ignored,
    Skipped,
}

/// Counts per outcome for one review run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewSummary {
    pub promoted: usize,
    pub auto_promoted: usize,
    pub ignored: usize,
    pub skipped: usize,
}

impl ReviewSummary {
    pub fn record(&mut self, outcome: ReviewOutcome) {
        match outcome {
            ReviewOutcome::Promoted => self.promoted += 1,
            ReviewOutcome::AutoPromoted => self.auto_promoted += 1,
            ReviewOutcome::Ignored => self.ignored += 1,
            ReviewOutcome::Skipped => self.skipped += 1,
        }
    }
}

// ============================================
// Store integration
// ============================================

/// Load dormant candidates from an interactions collection.
///
/// Candidates whose sidecar fails to parse are skipped with a diagnostic;
/// one corrupt capture must not block the review of the rest.
pub fn load_candidates(store: &Store, collection: &str) -> Result<Vec<Candidate>> {
    let mut filter = serde_json::Map::new();
    filter.insert(
        "status".to_string(),
        serde_json::Value::String(CandidateStatus::Dormant.as_str().to_string()),
    );
    let result = store.get(collection, None, Some(&filter))?;

    let mut candidates = Vec::new();
    for (id, document) in result.ids.iter().zip(&result.documents) {
        match serde_json::from_str::<Candidate>(document) {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "Skipping unparseable candidate");
            }
        }
    }
    Ok(candidates)
}

/// Record a candidate's terminal outcome back into its collection.
///
/// Promoted and ignored candidates get their status updated so they are
/// not re-surfaced on the next run; skipped ones are left dormant. This
/// is a last-writer-wins update: concurrent reviewers are out of scope.
pub fn apply_outcome(
    store: &Store,
    collection: &str,
    candidate: &Candidate,
    outcome: ReviewOutcome,
) -> Result<()> {
    let new_status = match outcome {
        ReviewOutcome::Promoted | ReviewOutcome::AutoPromoted => CandidateStatus::Promoted,
        ReviewOutcome::Ignored => CandidateStatus::Ignored,
        ReviewOutcome::Skipped => return Ok(()),
    };

    let result = store.get(collection, Some(&[candidate.id.clone()]), None)?;
    let mut metadata = result
        .metadatas
        .into_iter()
        .next()
        .unwrap_or_else(|| serde_json::json!({}));
    metadata["status"] = serde_json::Value::String(new_status.as_str().to_string());

    // Rewrite the document too; its own status field must agree with
    // the sidecar
    let mut updated = candidate.clone();
    updated.status = new_status;
    let document = serde_json::to_string(&updated)?;
    store.add(collection, &[candidate.id.clone()], &[document], &[metadata])?;
    Ok(())
}

/// Promote a candidate and update its backing status in one step.
pub fn promote_candidate(
    store: &Store,
    promoter: &Promoter,
    interactions_collection: &str,
    learnings_collection: &str,
    candidate: &Candidate,
    defaults: &PromotionDefaults,
    outcome: ReviewOutcome,
) -> Result<String> {
    let learning = learning_from_candidate(candidate, defaults);
    let learning_id = promoter.write_learning(&learning, learnings_collection)?;
    apply_outcome(store, interactions_collection, candidate, outcome)?;
    Ok(learning_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{INTERACTIONS_COLLECTION, LEARNINGS_COLLECTION};
    use serde_json::json;

    fn candidate(id: &str, confidence: Option<f64>) -> Candidate {
        Candidate {
            id: id.to_string(),
            modification_type: ModificationType::BugFix,
            confidence_score: confidence,
            code_context: None,
            diff_summary: None,
            tool_sequence: None,
            related_code_chunks: Vec::new(),
            status: CandidateStatus::Dormant,
            captured_at: Utc::now(),
        }
    }

    fn rich_candidate(id: &str, confidence: f64) -> Candidate {
        Candidate {
            code_context: Some("def parse(raw): ...".to_string()),
            diff_summary: Some("Strip whitespace before parsing".to_string()),
            tool_sequence: Some("Read,Edit,Bash".to_string()),
            related_code_chunks: vec!["chunk-1".to_string()],
            ..candidate(id, Some(confidence))
        }
    }

    struct FixedSearch(Vec<CodeHit>);

    impl CodeSearch for FixedSearch {
        fn query(&self, _text: &str, n_results: usize) -> Result<Vec<CodeHit>> {
            Ok(self.0.iter().take(n_results).cloned().collect())
        }
    }

    #[test]
    fn richness_is_fraction_of_populated_fields() {
        assert_eq!(rich_candidate("a", 0.9).context_richness(), 1.0);

        // Only modification_type present out of the six
        let mut bare = candidate("b", None);
        assert_eq!(bare.context_richness(), 1.0 / 6.0);

        bare.modification_type = ModificationType::Unknown;
        assert_eq!(bare.context_richness(), 0.0);
    }

    #[test]
    fn filter_honors_type_and_min_confidence() {
        let mut other = candidate("c2", Some(0.9));
        other.modification_type = ModificationType::Refactor;
        let candidates = vec![candidate("c1", Some(0.9)), other, candidate("c3", Some(0.2))];

        let kept = filter_candidates(candidates.clone(), Some(ModificationType::BugFix), 0.5);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "c1");

        let all_types = filter_candidates(candidates, None, 0.5);
        assert_eq!(all_types.len(), 2);
    }

    #[test]
    fn sort_orders_by_confidence_then_richness() {
        let mut candidates = vec![
            candidate("low", Some(0.4)),
            candidate("high-bare", Some(0.9)),
            rich_candidate("high-rich", 0.9),
        ];
        sort_candidates(&mut candidates);

        let ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["high-rich", "high-bare", "low"]);
    }

    #[test]
    fn missing_confidence_sorts_last() {
        let mut candidates = vec![candidate("none", None), candidate("some", Some(0.1))];
        sort_candidates(&mut candidates);
        assert_eq!(candidates[0].id, "some");
    }

    #[test]
    fn auto_route_requires_enabled_gate_and_confidence() {
        let c = candidate("c", Some(0.85));

        let disabled = AutoPromote::default();
        assert_eq!(route(&c, &disabled), ReviewRoute::Prompt);

        let enabled = AutoPromote {
            enabled: true,
            threshold: 0.8,
        };
        assert_eq!(route(&c, &enabled), ReviewRoute::Auto);
        assert_eq!(route(&candidate("d", Some(0.7)), &enabled), ReviewRoute::Prompt);
        assert_eq!(route(&candidate("e", None), &enabled), ReviewRoute::Prompt);
    }

    #[test]
    fn defaults_vary_pattern_by_modification_type() {
        let c = rich_candidate("c", 0.9);
        let defaults = auto_defaults(&c, None);
        assert_eq!(defaults.pattern, "bug-fix");
        assert_eq!(defaults.description, "Strip whitespace before parsing");
        assert_eq!(defaults.confidence, 0.9);
        assert!(defaults.tags.contains(&"auto-promoted".to_string()));

        let mut refactor = rich_candidate("r", 0.9);
        refactor.modification_type = ModificationType::Refactor;
        assert_eq!(auto_defaults(&refactor, None).pattern, "refactoring");
    }

    #[test]
    fn defaults_fall_back_to_generic_description() {
        let c = candidate("bare-1", Some(0.85));
        let defaults = auto_defaults(&c, None);
        assert!(defaults.description.contains("bug_fix"));
        assert!(defaults.description.contains("bare-1"));
    }

    #[test]
    fn code_search_suggests_reference_when_available() {
        let c = rich_candidate("c", 0.9);
        let search = FixedSearch(vec![CodeHit {
            id: "h1".to_string(),
            file_path: "src/parse.py".to_string(),
            snippet: "def parse".to_string(),
            distance: 0.1,
        }]);

        let defaults = auto_defaults(&c, Some(&search));
        assert_eq!(defaults.code_reference.as_deref(), Some("src/parse.py"));

        let empty = FixedSearch(Vec::new());
        assert!(auto_defaults(&c, Some(&empty)).code_reference.is_none());
    }

    #[test]
    fn promoted_and_ignored_candidates_are_not_resurfaced() {
        let store = Store::open_in_memory().unwrap();
        let c = rich_candidate("i1", 0.9);
        store
            .add(
                INTERACTIONS_COLLECTION,
                &[c.id.clone()],
                &[serde_json::to_string(&c).unwrap()],
                &[json!({ "status": "dormant", "confidence_score": 0.9 })],
            )
            .unwrap();

        let loaded = load_candidates(&store, INTERACTIONS_COLLECTION).unwrap();
        assert_eq!(loaded.len(), 1);

        apply_outcome(&store, INTERACTIONS_COLLECTION, &c, ReviewOutcome::Ignored).unwrap();
        assert!(load_candidates(&store, INTERACTIONS_COLLECTION)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn outcome_rewrites_document_and_sidecar_together() {
        let store = Store::open_in_memory().unwrap();
        let c = rich_candidate("d1", 0.9);
        store
            .add(
                INTERACTIONS_COLLECTION,
                &[c.id.clone()],
                &[serde_json::to_string(&c).unwrap()],
                &[json!({ "status": "dormant" })],
            )
            .unwrap();

        apply_outcome(&store, INTERACTIONS_COLLECTION, &c, ReviewOutcome::Promoted).unwrap();

        let result = store
            .get(INTERACTIONS_COLLECTION, Some(&[c.id.clone()]), None)
            .unwrap();
        assert_eq!(result.metadatas[0]["status"], "promoted");
        let stored: Candidate = serde_json::from_str(&result.documents[0]).unwrap();
        assert_eq!(stored.status, CandidateStatus::Promoted);
    }

    #[test]
    fn skipped_candidates_stay_dormant() {
        let store = Store::open_in_memory().unwrap();
        let c = rich_candidate("s1", 0.6);
        store
            .add(
                INTERACTIONS_COLLECTION,
                &[c.id.clone()],
                &[serde_json::to_string(&c).unwrap()],
                &[json!({ "status": "dormant" })],
            )
            .unwrap();

        apply_outcome(&store, INTERACTIONS_COLLECTION, &c, ReviewOutcome::Skipped).unwrap();
        assert_eq!(load_candidates(&store, INTERACTIONS_COLLECTION).unwrap().len(), 1);
    }

    #[test]
    fn auto_promotion_writes_learning_and_flips_status() {
        let store = Store::open_in_memory().unwrap();
        let promoter = Promoter::new(&store);
        let c = rich_candidate("a1", 0.85);
        store
            .add(
                INTERACTIONS_COLLECTION,
                &[c.id.clone()],
                &[serde_json::to_string(&c).unwrap()],
                &[json!({ "status": "dormant" })],
            )
            .unwrap();

        let auto = AutoPromote {
            enabled: true,
            threshold: 0.8,
        };
        assert_eq!(route(&c, &auto), ReviewRoute::Auto);

        let defaults = auto_defaults(&c, None);
        let learning_id = promote_candidate(
            &store,
            &promoter,
            INTERACTIONS_COLLECTION,
            LEARNINGS_COLLECTION,
            &c,
            &defaults,
            ReviewOutcome::AutoPromoted,
        )
        .unwrap();

        assert_eq!(store.count(LEARNINGS_COLLECTION).unwrap(), 1);
        let result = store
            .get(LEARNINGS_COLLECTION, Some(&[learning_id]), None)
            .unwrap();
        let learning: Learning = serde_json::from_str(&result.documents[0]).unwrap();
        assert_eq!(learning.chat_id.as_deref(), Some("a1"));
        assert!(learning.validation_evidence.is_none());

        // Backlog entry no longer dormant
        assert!(load_candidates(&store, INTERACTIONS_COLLECTION)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn summary_counts_each_outcome_once() {
        let mut summary = ReviewSummary::default();
        summary.record(ReviewOutcome::Promoted);
        summary.record(ReviewOutcome::AutoPromoted);
        summary.record(ReviewOutcome::AutoPromoted);
        summary.record(ReviewOutcome::Skipped);
        assert_eq!(summary.promoted, 1);
        assert_eq!(summary.auto_promoted, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.ignored, 0);
    }
}
