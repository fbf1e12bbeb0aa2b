//! Evidence aggregation and scoring
//!
//! Combines collector outputs into one [`ValidationEvidence`] envelope
//! and computes its 0.0-1.0 score as a weighted, capped sum.
//!
//! The scheme rewards independent corroborating signals: a fix confirmed
//! by a passing test and by a vanished runtime error scores higher than
//! either alone, while the cap at 1.0 keeps stacked low-value signals
//! from reaching certainty. Scoring is a pure function of its inputs.

use crate::evidence::{
    CodeQualityEvidence, EvidenceKind, RuntimeErrorEvidence, TestTransitionEvidence,
    ValidationEvidence,
};
use serde::Deserialize;

/// Weight constants for the scorer.
///
/// The defaults are the empirically tuned values the system ships with;
/// they are configuration (`[scoring]` in config.toml), not hard-coded
/// logic.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringWeights {
    /// Per qualifying fail/error -> pass transition
    #[serde(default = "default_test_transition")]
    pub test_transition: f64,
    /// Per verified resolved runtime error
    #[serde(default = "default_runtime_error")]
    pub runtime_error: f64,
    /// Base weight per improved file
    #[serde(default = "default_code_quality")]
    pub code_quality: f64,
    /// Issue reduction (%) earning the full quality weight
    #[serde(default = "default_quality_full_threshold")]
    pub quality_full_threshold: f64,
    /// Issue reduction (%) earning half the quality weight
    #[serde(default = "default_quality_half_threshold")]
    pub quality_half_threshold: f64,
    /// Factor applied below the half threshold whenever before > after;
    /// any concrete improvement is still rewarded
    #[serde(default = "default_quality_partial_factor")]
    pub quality_partial_factor: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            test_transition: default_test_transition(),
            runtime_error: default_runtime_error(),
            code_quality: default_code_quality(),
            quality_full_threshold: default_quality_full_threshold(),
            quality_half_threshold: default_quality_half_threshold(),
            quality_partial_factor: default_quality_partial_factor(),
        }
    }
}

fn default_test_transition() -> f64 {
    0.7
}

fn default_runtime_error() -> f64 {
    0.6
}

fn default_code_quality() -> f64 {
    0.4
}

fn default_quality_full_threshold() -> f64 {
    20.0
}

fn default_quality_half_threshold() -> f64 {
    10.0
}

fn default_quality_partial_factor() -> f64 {
    0.8
}

impl ScoringWeights {
    /// Contribution of one quality record, by improvement magnitude.
    fn quality_contribution(&self, q: &CodeQualityEvidence) -> f64 {
        if q.percentage_improvement >= self.quality_full_threshold {
            self.code_quality
        } else if q.percentage_improvement >= self.quality_half_threshold {
            self.code_quality * 0.5
        } else if q.before_value > q.after_value {
            self.code_quality * self.quality_partial_factor
        } else {
            0.0
        }
    }
}

/// Compute the aggregate score for a set of evidence records.
///
/// Deterministic and order-independent: contributions are summed across
/// all records of all lists, then clamped to `[0.0, 1.0]`.
pub fn calculate_score(
    test_transitions: &[TestTransitionEvidence],
    runtime_errors: &[RuntimeErrorEvidence],
    quality_improvements: &[CodeQualityEvidence],
    weights: &ScoringWeights,
) -> f64 {
    let mut total = 0.0;

    for t in test_transitions {
        if t.is_positive() {
            total += weights.test_transition;
        }
    }

    for e in runtime_errors {
        if e.resolution_verified {
            total += weights.runtime_error;
        }
    }

    for q in quality_improvements {
        total += weights.quality_contribution(q);
    }

    total.clamp(0.0, 1.0)
}

/// Combine collector outputs into a scored envelope.
///
/// `evidence_types` lists only kinds with at least one record; empty
/// inputs yield an empty envelope with score 0.0, which is a valid
/// non-error result.
pub fn aggregate(
    test_transitions: Vec<TestTransitionEvidence>,
    runtime_errors: Vec<RuntimeErrorEvidence>,
    quality_improvements: Vec<CodeQualityEvidence>,
    weights: &ScoringWeights,
) -> ValidationEvidence {
    let score = calculate_score(
        &test_transitions,
        &runtime_errors,
        &quality_improvements,
        weights,
    );

    let mut evidence_types = Vec::new();
    if !test_transitions.is_empty() {
        evidence_types.push(EvidenceKind::TestTransition);
    }
    if !runtime_errors.is_empty() {
        evidence_types.push(EvidenceKind::RuntimeErrorResolution);
    }
    if !quality_improvements.is_empty() {
        evidence_types.push(EvidenceKind::CodeQualityImprovement);
    }

    ValidationEvidence {
        evidence_types,
        score,
        test_transitions: (!test_transitions.is_empty()).then_some(test_transitions),
        runtime_errors: (!runtime_errors.is_empty()).then_some(runtime_errors),
        code_quality_improvements: (!quality_improvements.is_empty())
            .then_some(quality_improvements),
    }
}
