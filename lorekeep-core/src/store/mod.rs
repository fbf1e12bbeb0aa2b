//! Document store
//!
//! SQLite-backed store for evidence, learnings and review candidates.
//! Documents are the JSON serialization of their schema objects; a
//! metadata sidecar per document holds the scalar, queryable fields.

mod repo;
mod schema;

pub use repo::{GetResult, Store};
pub use schema::SCHEMA_VERSION;

/// Collection holding scored [`crate::evidence::ValidationEvidence`] documents.
pub const EVIDENCE_COLLECTION: &str = "validation_evidence";
/// Collection holding promoted [`crate::evidence::Learning`] documents.
pub const LEARNINGS_COLLECTION: &str = "learnings";
/// Collection holding captured interactions awaiting review.
pub const INTERACTIONS_COLLECTION: &str = "interactions";
