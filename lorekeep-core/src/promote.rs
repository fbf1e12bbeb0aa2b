//! Promotion engine
//!
//! Converts evidence that clears the threshold into a persisted
//! [`Learning`]. Promotion is strictly threshold-gated: below the cutoff
//! nothing is written and `None` comes back. A promotion that cannot be
//! persisted is a failure, never a silent success.

use crate::error::Result;
use crate::evidence::{
    language_for_path, CodeSnippet, EvidenceKind, Learning, ValidationEvidence,
    DEFAULT_PROMOTION_THRESHOLD,
};
use crate::store::{Store, EVIDENCE_COLLECTION};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

/// Promotion engine over a document store.
///
/// Owns nothing long-lived: the store handle is injected by the caller
/// and the engine is cheap to construct per operation.
pub struct Promoter<'a> {
    store: &'a Store,
    threshold: f64,
}

impl<'a> Promoter<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self {
            store,
            threshold: DEFAULT_PROMOTION_THRESHOLD,
        }
    }

    /// Override the promotion threshold (configured via `[promotion]`).
    pub fn with_threshold(store: &'a Store, threshold: f64) -> Self {
        Self { store, threshold }
    }

    /// Persist a scored envelope under a fresh evidence id.
    ///
    /// The document is the wire JSON of the envelope; the sidecar holds
    /// the queryable scalars.
    pub fn store_evidence(&self, evidence: &ValidationEvidence) -> Result<String> {
        let evidence_id = Uuid::new_v4().to_string();
        let document = serde_json::to_string(evidence)?;
        let metadata = json!({
            "score": evidence.score,
            "timestamp": Utc::now().to_rfc3339(),
            "evidence_types": kinds_csv(&evidence.evidence_types),
            "test_transition_count": evidence.test_transitions.as_ref().map_or(0, Vec::len),
            "runtime_error_count": evidence.runtime_errors.as_ref().map_or(0, Vec::len),
            "code_quality_count": evidence.code_quality_improvements.as_ref().map_or(0, Vec::len),
            "affected_files": evidence.affected_files().join(","),
        });

        self.store.add(
            EVIDENCE_COLLECTION,
            &[evidence_id.clone()],
            &[document],
            &[metadata],
        )?;

        tracing::info!(evidence_id = %evidence_id, score = evidence.score, "Stored validation evidence");
        Ok(evidence_id)
    }

    /// Derive a learning record from scored evidence.
    ///
    /// Title and description come from the first record of the evidence
    /// type with the strongest narrative: test transitions, then runtime
    /// errors, then quality improvements, then a generic fallback. Caller
    /// metadata, when given, rides on the learning and is merged into the
    /// sidecar at write time.
    pub fn format_learning(
        &self,
        evidence: &ValidationEvidence,
        chat_id: Option<&str>,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Learning {
        let (title, description, snippets) = if let Some(t) = evidence
            .test_transitions
            .as_ref()
            .and_then(|list| list.first())
        {
            let mut description = format!(
                "Test {} transitioned from {} to {}.",
                t.test_id, t.before_status, t.after_status
            );
            if let Some(msg) = &t.error_message_before {
                description.push_str(&format!(" Previous failure: {}", msg));
            }
            let snippets = snippets_of(
                evidence
                    .test_transitions
                    .iter()
                    .flatten()
                    .map(|t| &t.code_changes),
            );
            (format!("Fixed failing test {}", t.test_name), description, snippets)
        } else if let Some(e) = evidence.runtime_errors.as_ref().and_then(|list| list.first()) {
            let description = format!(
                "Runtime error '{}: {}' no longer occurs after the change.",
                e.error_type, e.error_message
            );
            let snippets = snippets_of(
                evidence
                    .runtime_errors
                    .iter()
                    .flatten()
                    .map(|e| &e.code_changes),
            );
            (format!("Resolved runtime {}", e.error_type), description, snippets)
        } else if let Some(q) = evidence
            .code_quality_improvements
            .as_ref()
            .and_then(|list| list.first())
        {
            let description = format!(
                "{} issues in {} dropped from {} to {} ({:.1}% improvement).",
                q.tool, q.file_path, q.before_value, q.after_value, q.percentage_improvement
            );
            let snippets = snippets_of(
                evidence
                    .code_quality_improvements
                    .iter()
                    .flatten()
                    .map(|q| &q.code_changes),
            );
            (
                format!("Reduced lint issues in {}", q.file_path),
                description,
                snippets,
            )
        } else {
            (
                "Validated code change".to_string(),
                "A code change passed validation scoring.".to_string(),
                Vec::new(),
            )
        };

        Learning {
            title,
            description,
            code_snippets: snippets,
            validation_score: evidence.score,
            validation_evidence: Some(evidence.clone()),
            timestamp: Utc::now(),
            chat_id: chat_id.map(str::to_string),
            metadata,
        }
    }

    /// Promote evidence into the given learnings collection.
    ///
    /// Returns `Ok(None)` without touching the store when the score is
    /// below the threshold. Store errors during the write propagate.
    pub fn promote_learning(
        &self,
        evidence: &ValidationEvidence,
        chat_id: Option<&str>,
        collection: &str,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<Option<String>> {
        if !evidence.meets_threshold(self.threshold) {
            tracing::info!(
                score = evidence.score,
                threshold = self.threshold,
                "Evidence below promotion threshold, nothing written"
            );
            return Ok(None);
        }

        let learning = self.format_learning(evidence, chat_id, metadata);
        let learning_id = self.write_learning(&learning, collection)?;
        Ok(Some(learning_id))
    }

    /// Fetch stored evidence by id and promote it.
    ///
    /// A missing or undeserializable document is a business "not found"
    /// (expected in a multi-actor system), reported and answered with
    /// `Ok(None)` rather than an error.
    pub fn promote_by_evidence_id(
        &self,
        evidence_id: &str,
        chat_id: Option<&str>,
        collection: &str,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<Option<String>> {
        let result = self
            .store
            .get(EVIDENCE_COLLECTION, Some(&[evidence_id.to_string()]), None)?;

        let Some(document) = result.documents.first() else {
            tracing::warn!(evidence_id, "No stored evidence with this id");
            return Ok(None);
        };

        let evidence: ValidationEvidence = match serde_json::from_str(document) {
            Ok(evidence) => evidence,
            Err(e) => {
                tracing::warn!(evidence_id, error = %e, "Stored evidence is malformed, treating as missing");
                return Ok(None);
            }
        };

        self.promote_learning(&evidence, chat_id, collection, metadata)
    }

    /// Promote a learning built outside the evidence pipeline (the
    /// review workflow's direct path from a backlog interaction).
    pub fn write_learning(&self, learning: &Learning, collection: &str) -> Result<String> {
        let learning_id = Uuid::new_v4().to_string();
        let document = serde_json::to_string(learning)?;
        let evidence_types = learning
            .validation_evidence
            .as_ref()
            .map(|e| kinds_csv(&e.evidence_types))
            .unwrap_or_default();
        let affected_files = learning
            .validation_evidence
            .as_ref()
            .map(|e| e.affected_files().join(","))
            .unwrap_or_default();
        let mut metadata = json!({
            "title": learning.title,
            "timestamp": learning.timestamp.to_rfc3339(),
            "validation_score": learning.validation_score,
            "evidence_types": evidence_types,
            "snippet_count": learning.code_snippets.len(),
            "affected_files": affected_files,
        });
        if let Some(chat_id) = &learning.chat_id {
            metadata["chat_id"] = json!(chat_id);
        }
        // Caller-supplied fields win over the derived ones
        if let Some(extra) = &learning.metadata {
            for (key, value) in extra {
                metadata[key.as_str()] = value.clone();
            }
        }

        self.store
            .add(collection, &[learning_id.clone()], &[document], &[metadata])?;

        tracing::info!(
            learning_id = %learning_id,
            title = %learning.title,
            score = learning.validation_score,
            "Promoted learning"
        );
        Ok(learning_id)
    }
}

fn kinds_csv(kinds: &[EvidenceKind]) -> String {
    kinds
        .iter()
        .map(EvidenceKind::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Flatten code-change maps into snippets, one per distinct file.
fn snippets_of<'a, I>(changes: I) -> Vec<CodeSnippet>
where
    I: Iterator<Item = &'a crate::evidence::CodeChanges>,
{
    let mut snippets: Vec<CodeSnippet> = Vec::new();
    for map in changes {
        for (file_path, change) in map {
            if snippets.iter().any(|s| &s.file_path == file_path) {
                continue;
            }
            snippets.push(CodeSnippet {
                file_path: file_path.clone(),
                language: language_for_path(file_path).to_string(),
                before: change.before.clone(),
                after: change.after.clone(),
            });
        }
    }
    snippets
}
