//! # lorekeep-core
//!
//! Core library for lorekeep - evidence-based validation and promotion of
//! learnings captured from coding sessions.
//!
//! This library provides:
//! - Evidence domain types (test transitions, resolved runtime errors,
//!   code quality improvements)
//! - Collectors that extract evidence from test reports, runtime logs,
//!   and lint output
//! - A weighted, capped evidence scorer
//! - Threshold-gated promotion of validated learnings into a document store
//! - Review backlog decision logic for human-in-the-loop promotion
//!
//! ## Architecture
//!
//! Evidence flows through three stages:
//! - **Collect:** Parse before/after artifacts into typed evidence records
//! - **Score:** Aggregate records into a `ValidationEvidence` envelope with
//!   a combined score in [0.0, 1.0]
//! - **Promote:** Persist the envelope, and derive a `Learning` from it when
//!   the score clears the promotion threshold
//!
//! ## Example
//!
//! ```rust,no_run
//! use lorekeep_core::{Config, Store};
//!
//! // Load configuration
//! let config = Config::load().expect("failed to load config");
//!
//! // Open the document store
//! let store = Store::open(&Config::database_path()).expect("failed to open store");
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use evidence::{Learning, ValidationEvidence};
pub use promote::Promoter;
pub use store::Store;

// Public modules
pub mod collect;
pub mod config;
pub mod error;
pub mod evidence;
pub mod logging;
pub mod promote;
pub mod review;
pub mod score;
pub mod store;
