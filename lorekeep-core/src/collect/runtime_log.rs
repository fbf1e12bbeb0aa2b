//! Runtime-error collector
//!
//! Parses two unstructured log files into discrete error records and
//! computes which errors disappeared between them.
//!
//! Parsing is a small line-oriented state machine: an `ERROR ...
//! SomethingError: message` line starts a record, subsequent lines feed
//! its stacktrace until the next error line, and `File "...", line N`
//! frames contribute affected files. Lines matching nothing are ignored.
//!
//! ## Error identity
//!
//! Two records are "the same error" iff their `(error_type,
//! error_message)` pair is equal. Identity is never keyed on the
//! generated per-record id: that id is fresh on every parse, and
//! comparing by it would make every error look new and none resolved.

use crate::error::Result;
use crate::evidence::{CodeChange, CodeChanges, RuntimeErrorEvidence};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

/// One error parsed out of a log file.
#[derive(Debug, Clone, PartialEq)]
pub struct LogError {
    /// Exception class, e.g. `ValueError`
    pub error_type: String,
    pub message: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub stacktrace: Vec<String>,
    /// Files named in stack frames, deduplicated, first-appearance order
    pub affected_files: Vec<String>,
}

impl LogError {
    /// Content identity used for before/after comparison.
    fn identity(&self) -> (String, String) {
        (
            self.error_type.trim().to_string(),
            self.message.trim().to_string(),
        )
    }
}

struct LogPatterns {
    error_start: Regex,
    timestamp: Regex,
    stack_frame: Regex,
}

impl LogPatterns {
    fn new() -> Self {
        // The unwraps are safe: the patterns are literals.
        Self {
            error_start: Regex::new(r"ERROR.*?(\w+(?:Error|Exception))\s*:\s*(.+)").unwrap(),
            timestamp: Regex::new(
                r"(\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?)",
            )
            .unwrap(),
            stack_frame: Regex::new(r#"File "([^"]+)", line \d+"#).unwrap(),
        }
    }
}

/// Parse a log file into error records. A missing file is fatal.
pub fn parse_log(path: &Path) -> Result<Vec<LogError>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_log_text(&content))
}

/// Parse log text already in memory.
pub fn parse_log_text(content: &str) -> Vec<LogError> {
    let patterns = LogPatterns::new();
    let mut errors = Vec::new();
    let mut current: Option<LogError> = None;

    for line in content.lines() {
        if let Some(caps) = patterns.error_start.captures(line) {
            // Previous record ends where the next error starts
            if let Some(done) = current.take() {
                errors.push(done);
            }
            let timestamp = patterns
                .timestamp
                .captures(line)
                .and_then(|c| super::parse_timestamp(&c[1]));
            current = Some(LogError {
                error_type: caps[1].to_string(),
                message: caps[2].trim().to_string(),
                timestamp,
                stacktrace: Vec::new(),
                affected_files: Vec::new(),
            });
        } else if let Some(record) = current.as_mut() {
            record.stacktrace.push(line.to_string());
            if let Some(caps) = patterns.stack_frame.captures(line) {
                let file = caps[1].to_string();
                if !record.affected_files.contains(&file) {
                    record.affected_files.push(file);
                }
            }
        }
    }

    if let Some(done) = current.take() {
        errors.push(done);
    }

    errors
}

/// Errors present in `before` with no content-equal entry in `after`.
pub fn resolved_errors<'a>(before: &'a [LogError], after: &[LogError]) -> Vec<&'a LogError> {
    let after_keys: HashSet<(String, String)> = after.iter().map(LogError::identity).collect();
    before
        .iter()
        .filter(|e| !after_keys.contains(&e.identity()))
        .collect()
}

/// Parse both logs and build evidence for every resolved error.
///
/// Code changes come from caller-supplied snippets when given; otherwise
/// each affected file is read from disk best-effort, with a placeholder
/// for files that cannot be read.
pub fn collect(
    before_path: &Path,
    after_path: &Path,
    code_changes: Option<&CodeChanges>,
) -> Result<Vec<RuntimeErrorEvidence>> {
    let before = parse_log(before_path)?;
    let after = parse_log(after_path)?;

    let resolved = resolved_errors(&before, &after);
    let now = Utc::now();

    let evidence: Vec<RuntimeErrorEvidence> = resolved
        .into_iter()
        .map(|e| {
            let changes = match code_changes {
                Some(supplied) => supplied.clone(),
                None => snapshot_affected_files(&e.affected_files),
            };
            let stacktrace = if e.stacktrace.is_empty() {
                None
            } else {
                Some(e.stacktrace.join("\n"))
            };
            RuntimeErrorEvidence::verified(
                e.error_type.clone(),
                e.message.clone(),
                stacktrace,
                e.timestamp.unwrap_or(now),
                now,
                changes,
            )
        })
        .collect();

    tracing::debug!(
        before = %before_path.display(),
        after = %after_path.display(),
        resolved = evidence.len(),
        "Collected runtime error resolutions"
    );

    Ok(evidence)
}

/// Read the current content of each affected file, best-effort.
fn snapshot_affected_files(files: &[String]) -> CodeChanges {
    let mut changes = CodeChanges::new();
    for file in files {
        let after = match std::fs::read_to_string(file) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(file = %file, error = %e, "Affected file not readable");
                format!("<unreadable: {}>", file)
            }
        };
        changes.insert(
            file.clone(),
            CodeChange {
                before: String::new(),
                after,
            },
        );
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    const BEFORE_LOG: &str = r#"2024-05-01 10:00:00,123 INFO app starting
2024-05-01 10:00:01,500 ERROR app ValueError: invalid literal for int()
Traceback (most recent call last):
  File "src/app.py", line 42, in parse
  File "src/util.py", line 7, in to_int
  File "src/app.py", line 42, in parse
2024-05-01 10:00:02,000 ERROR worker KeyError: 'missing'
  File "src/worker.py", line 10, in run
2024-05-01 10:00:03,000 INFO app done
"#;

    const AFTER_LOG: &str = r#"2024-05-01 11:00:00,000 INFO app starting
2024-05-01 11:00:02,000 ERROR worker KeyError: 'missing'
  File "src/worker.py", line 10, in run
2024-05-01 11:00:03,000 INFO app done
"#;

    #[test]
    fn state_machine_splits_records_at_error_lines() {
        let errors = parse_log_text(BEFORE_LOG);
        assert_eq!(errors.len(), 2);

        let first = &errors[0];
        assert_eq!(first.error_type, "ValueError");
        assert_eq!(first.message, "invalid literal for int()");
        assert!(first.timestamp.is_some());
        assert_eq!(first.stacktrace.len(), 4);
        // Deduplicated, first-appearance order
        assert_eq!(
            first.affected_files,
            vec!["src/app.py".to_string(), "src/util.py".to_string()]
        );

        assert_eq!(errors[1].error_type, "KeyError");
    }

    #[test]
    fn non_matching_lines_are_ignored_outside_records() {
        let errors = parse_log_text("INFO nothing to see\nDEBUG still nothing\n");
        assert!(errors.is_empty());
    }

    #[test]
    fn trailing_record_is_finalized_at_eof() {
        let errors = parse_log_text("ERROR app TypeError: oops\n  File \"a.py\", line 1, in x");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].affected_files, vec!["a.py".to_string()]);
    }

    #[test]
    fn resolution_is_keyed_by_type_and_message() {
        let before = parse_log_text(BEFORE_LOG);
        let after = parse_log_text(AFTER_LOG);

        let resolved = resolved_errors(&before, &after);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].error_type, "ValueError");

        // The surviving KeyError is unchanged in content, so it must not
        // count as resolved even though both parses are fresh.
        assert!(!resolved.iter().any(|e| e.error_type == "KeyError"));
    }

    #[test]
    fn collect_builds_verified_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let before_path = dir.path().join("before.log");
        let after_path = dir.path().join("after.log");
        std::fs::write(&before_path, BEFORE_LOG).unwrap();
        std::fs::write(&after_path, AFTER_LOG).unwrap();

        let evidence = collect(&before_path, &after_path, None).unwrap();
        assert_eq!(evidence.len(), 1);

        let e = &evidence[0];
        assert_eq!(e.error_type, "ValueError");
        assert!(e.resolution_verified);
        assert!(e.resolution_timestamp.is_some());
        assert!(e.stacktrace.is_some());
        // Affected files were not on disk: placeholders, not a failure
        assert!(e
            .code_changes
            .get("src/app.py")
            .unwrap()
            .after
            .starts_with("<unreadable:"));
    }

    #[test]
    fn caller_snippets_take_precedence_over_disk() {
        let dir = tempfile::tempdir().unwrap();
        let before_path = dir.path().join("before.log");
        let after_path = dir.path().join("after.log");
        std::fs::write(&before_path, BEFORE_LOG).unwrap();
        std::fs::write(&after_path, AFTER_LOG).unwrap();

        let mut supplied = CodeChanges::new();
        supplied.insert(
            "src/app.py".to_string(),
            CodeChange {
                before: "x = int(raw)".to_string(),
                after: "x = int(raw.strip())".to_string(),
            },
        );

        let evidence = collect(&before_path, &after_path, Some(&supplied)).unwrap();
        assert_eq!(
            evidence[0].code_changes.get("src/app.py").unwrap().after,
            "x = int(raw.strip())"
        );
    }

    #[test]
    fn missing_log_is_fatal() {
        let err = parse_log(Path::new("/nonexistent/app.log")).unwrap_err();
        assert!(matches!(err, crate::error::Error::Io(_)));
    }
}
