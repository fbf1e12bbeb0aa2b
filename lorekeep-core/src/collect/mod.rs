//! Evidence collectors
//!
//! Each collector parses artifacts that some external process already
//! produced (JUnit XML reports, runtime log files, linter output) and
//! derives typed evidence records from a before/after comparison. No
//! collector executes tests or runs the target program.
//!
//! ## Failure semantics
//!
//! - Missing or malformed input artifacts are fatal: a garbled report
//!   cannot be trusted for scoring.
//! - A diagnostics tool that cannot be launched degrades to zero issues
//!   (see [`quality::DiagnosticsProvider`]).
//! - "No evidence found" is never an error; collectors return empty
//!   vectors and the scorer yields 0.0.

pub mod quality;
pub mod runtime_log;
pub mod tests_xml;

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse a timestamp as it appears in reports and logs.
///
/// Accepts RFC 3339 as well as the naive `YYYY-MM-DDTHH:MM:SS` /
/// `YYYY-MM-DD HH:MM:SS` forms JUnit emitters and log formatters use;
/// naive times are taken as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S,%3f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}
