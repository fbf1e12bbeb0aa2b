//! Evidence schemas
//!
//! Typed records for each evidence kind plus the aggregate envelope.
//! These are pure data: the only behavior they carry is validation-by
//! construction and the threshold predicate on [`ValidationEvidence`].
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Evidence** | An objective, parsed signal that a code change improved something |
//! | **Envelope** | A [`ValidationEvidence`] combining all evidence from one validation run |
//! | **Promotion** | Converting a scored envelope into a persisted [`Learning`] |
//! | **Threshold** | Minimum aggregate score (default 0.7) required for promotion |
//!
//! ## Wire format
//!
//! The serde representation of these types is the store wire format and
//! must round-trip exactly: optional lists serialize as absent (never
//! `null`) when empty, and the deserializer accepts the legacy key
//! aliases `quality_type`, `before_issues` and `after_issues` that older
//! stored documents carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default aggregate score required for promotion.
pub const DEFAULT_PROMOTION_THRESHOLD: f64 = 0.7;

// ============================================
// Evidence kinds
// ============================================

/// Kinds of evidence an envelope can carry.
///
/// Only the first three are produced by the built-in collectors; the rest
/// are reserved for future collectors and accepted on deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    TestTransition,
    RuntimeErrorResolution,
    CodeQualityImprovement,
    SecurityFix,
    PerformanceImprovement,
    KnowledgeGap,
    EdgeCaseHandling,
    PatternEstablishment,
}

impl EvidenceKind {
    /// Identifier used in store metadata and wire documents
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::TestTransition => "test_transition",
            EvidenceKind::RuntimeErrorResolution => "runtime_error_resolution",
            EvidenceKind::CodeQualityImprovement => "code_quality_improvement",
            EvidenceKind::SecurityFix => "security_fix",
            EvidenceKind::PerformanceImprovement => "performance_improvement",
            EvidenceKind::KnowledgeGap => "knowledge_gap",
            EvidenceKind::EdgeCaseHandling => "edge_case_handling",
            EvidenceKind::PatternEstablishment => "pattern_establishment",
        }
    }
}

impl std::str::FromStr for EvidenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test_transition" => Ok(EvidenceKind::TestTransition),
            "runtime_error_resolution" => Ok(EvidenceKind::RuntimeErrorResolution),
            "code_quality_improvement" => Ok(EvidenceKind::CodeQualityImprovement),
            "security_fix" => Ok(EvidenceKind::SecurityFix),
            "performance_improvement" => Ok(EvidenceKind::PerformanceImprovement),
            "knowledge_gap" => Ok(EvidenceKind::KnowledgeGap),
            "edge_case_handling" => Ok(EvidenceKind::EdgeCaseHandling),
            "pattern_establishment" => Ok(EvidenceKind::PatternEstablishment),
            _ => Err(format!("unknown evidence kind: {}", s)),
        }
    }
}

impl std::fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// Test status
// ============================================

/// Outcome of a single test case in a JUnit report.
///
/// `None` marks a test absent from the before report (newly introduced).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Pass,
    Fail,
    Error,
    Skip,
    None,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Pass => "pass",
            TestStatus::Fail => "fail",
            TestStatus::Error => "error",
            TestStatus::Skip => "skip",
            TestStatus::None => "none",
        }
    }

    /// Statuses that count as a failure in the before report
    pub fn is_failing(&self) -> bool {
        matches!(self, TestStatus::Fail | TestStatus::Error)
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// Code changes
// ============================================

/// Before/after source snippets for one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeChange {
    pub before: String,
    pub after: String,
}

/// Mapping of file path to before/after snippets.
///
/// A `BTreeMap` keeps wire output deterministic across runs.
pub type CodeChanges = BTreeMap<String, CodeChange>;

// ============================================
// Per-kind evidence records
// ============================================

/// A test that changed status between the before and after reports.
///
/// Only materially positive transitions (`fail|error -> pass`) are built
/// by the collector; the scorer re-checks the invariant anyway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestTransitionEvidence {
    /// Stable key: `"{classname}.{name}"`
    pub test_id: String,
    /// Source file the test lives in
    pub test_file: String,
    /// Bare test name (without the class prefix)
    pub test_name: String,
    pub before_status: TestStatus,
    pub after_status: TestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message_after: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub code_changes: CodeChanges,
}

impl TestTransitionEvidence {
    /// Whether this transition is a qualifying fix (`fail|error -> pass`)
    pub fn is_positive(&self) -> bool {
        self.before_status.is_failing() && self.after_status == TestStatus::Pass
    }
}

/// A runtime error that was present before and gone after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeErrorEvidence {
    /// Generated per record; never used for cross-parse comparison
    pub error_id: String,
    /// Exception class name (e.g., `ValueError`)
    pub error_type: String,
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<String>,
    pub first_occurrence: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_timestamp: Option<DateTime<Utc>>,
    pub resolution_verified: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub code_changes: CodeChanges,
}

impl RuntimeErrorEvidence {
    /// Build a verified resolution.
    ///
    /// The `resolution_verified => resolution_timestamp` invariant is
    /// enforced here: verified records always carry a timestamp.
    pub fn verified(
        error_type: String,
        error_message: String,
        stacktrace: Option<String>,
        first_occurrence: DateTime<Utc>,
        resolved_at: DateTime<Utc>,
        code_changes: CodeChanges,
    ) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            error_type,
            error_message,
            stacktrace,
            first_occurrence,
            resolution_timestamp: Some(resolved_at),
            resolution_verified: true,
            code_changes,
        }
    }
}

/// A per-file lint issue-count reduction.
///
/// The collector only builds records for files where `after < before`,
/// so `percentage_improvement` is always positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeQualityEvidence {
    /// Metric family, e.g. `"linting"` (legacy documents say `quality_type`)
    #[serde(alias = "quality_type")]
    pub metric_type: String,
    /// Issue count before the change (legacy alias: `before_issues`)
    #[serde(alias = "before_issues")]
    pub before_value: f64,
    /// Issue count after the change (legacy alias: `after_issues`)
    #[serde(alias = "after_issues")]
    pub after_value: f64,
    pub percentage_improvement: f64,
    /// Diagnostics tool that produced the counts
    pub tool: String,
    pub file_path: String,
    pub measured_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub code_changes: CodeChanges,
}

/// Derive `percentage_improvement` from raw counts.
///
/// `(before - after) / before * 100` when `before > 0`, else `0.0`.
pub fn percentage_improvement(before: f64, after: f64) -> f64 {
    if before > 0.0 {
        (before - after) / before * 100.0
    } else {
        0.0
    }
}

// ============================================
// Aggregate envelope
// ============================================

/// The combined evidence from one validation run, with its score.
///
/// Built once by the aggregator, immutable after scoring. Persisted by the
/// promotion engine under a generated `evidence_id`; never mutated after
/// persistence (a new analysis run produces a new record).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationEvidence {
    /// Kinds with at least one record, in ascending [`EvidenceKind`] order
    pub evidence_types: Vec<EvidenceKind>,
    /// Aggregate score in `[0.0, 1.0]`
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_transitions: Option<Vec<TestTransitionEvidence>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_errors: Option<Vec<RuntimeErrorEvidence>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_quality_improvements: Option<Vec<CodeQualityEvidence>>,
}

impl ValidationEvidence {
    /// Threshold predicate at an explicit cutoff.
    ///
    /// Pure; evaluated lazily and never cached on the object.
    pub fn meets_threshold(&self, threshold: f64) -> bool {
        self.score >= threshold
    }

    /// Threshold predicate at [`DEFAULT_PROMOTION_THRESHOLD`].
    pub fn meets_default_threshold(&self) -> bool {
        self.meets_threshold(DEFAULT_PROMOTION_THRESHOLD)
    }

    /// Whether the envelope carries no records at all.
    ///
    /// An empty envelope with score 0.0 is a valid, non-error result.
    pub fn is_empty(&self) -> bool {
        self.evidence_types.is_empty()
    }

    /// All file paths touched by any record's code changes, deduplicated.
    pub fn affected_files(&self) -> Vec<String> {
        let mut files: Vec<String> = Vec::new();
        let mut push = |changes: &CodeChanges| {
            for path in changes.keys() {
                if !files.contains(path) {
                    files.push(path.clone());
                }
            }
        };
        for t in self.test_transitions.iter().flatten() {
            push(&t.code_changes);
        }
        for e in self.runtime_errors.iter().flatten() {
            push(&e.code_changes);
        }
        for q in self.code_quality_improvements.iter().flatten() {
            push(&q.code_changes);
        }
        files
    }
}

// ============================================
// Promotion output
// ============================================

/// A before/after snippet attached to a promoted learning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeSnippet {
    pub file_path: String,
    /// Guessed from the file extension; `"text"` when unknown
    pub language: String,
    pub before: String,
    pub after: String,
}

/// A promoted learning, the write-once output of the promotion engine.
///
/// Re-promotion creates a new learning with a new id; learnings are never
/// mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Learning {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_snippets: Vec<CodeSnippet>,
    pub validation_score: f64,
    /// Embedded copy of the scored envelope; absent for learnings promoted
    /// directly from a backlog interaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_evidence: Option<ValidationEvidence>,
    pub timestamp: DateTime<Utc>,
    /// Originating interaction, when promoted from the review backlog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    /// Caller-supplied fields, merged into the metadata sidecar at write
    /// time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Map a file extension to a display language for snippets.
pub fn language_for_path(path: &str) -> &'static str {
    match std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
    {
        "py" => "python",
        "rs" => "rust",
        "js" => "javascript",
        "ts" => "typescript",
        "go" => "go",
        "java" => "java",
        "rb" => "ruby",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        "sh" => "shell",
        "sql" => "sql",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        _ => "text",
    }
}
