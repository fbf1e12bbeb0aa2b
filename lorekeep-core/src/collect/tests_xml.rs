//! Test-transition collector
//!
//! Parses two JUnit-style XML reports (before/after) and derives
//! fail->pass and error->pass transitions.
//!
//! A test's stable key is `"{classname}.{name}"`. Status comes from the
//! presence of a `<failure>`, `<error>` or `<skipped>` child; a testcase
//! with none of those passed. When the report carries no `file`
//! attribute, the test file is derived from the classname by replacing
//! `.` with `/` and appending `.py` (the pytest convention these reports
//! come from).

use crate::error::{Error, Result};
use crate::evidence::{CodeChanges, TestStatus, TestTransitionEvidence};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::path::Path;

/// One test case as read from a single report.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCaseResult {
    pub status: TestStatus,
    /// Message of the failure/error/skipped child, if any
    pub error_message: Option<String>,
    /// Timestamp of the enclosing testsuite, if present
    pub timestamp: Option<DateTime<Utc>>,
    pub test_file: String,
}

/// A status change between the two reports.
///
/// Not yet evidence: transitions also cover regressions and new tests so
/// callers can inspect the full diff before the positive filter.
#[derive(Debug, Clone, PartialEq)]
pub struct TestTransition {
    pub test_id: String,
    pub test_file: String,
    pub test_name: String,
    pub before_status: TestStatus,
    pub after_status: TestStatus,
    pub before_timestamp: Option<DateTime<Utc>>,
    pub after_timestamp: Option<DateTime<Utc>>,
    pub error_message_before: Option<String>,
    pub error_message_after: Option<String>,
}

/// Parse a JUnit XML report into `test_id -> result`.
///
/// A missing file or malformed XML is fatal; a garbled report must not
/// silently contribute to scoring.
pub fn parse_report(path: &Path) -> Result<BTreeMap<String, TestCaseResult>> {
    let content = std::fs::read_to_string(path)?;
    parse_report_str(&content).map_err(|e| match e {
        Error::Xml(inner) => Error::Parse {
            artifact: path.display().to_string(),
            message: inner.to_string(),
        },
        other => other,
    })
}

/// Parse report content already in memory.
pub fn parse_report_str(content: &str) -> Result<BTreeMap<String, TestCaseResult>> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut results = BTreeMap::new();
    let mut suite_timestamp: Option<DateTime<Utc>> = None;
    // Key of the testcase whose children we are currently inside
    let mut current: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"testsuite" => {
                    if let Some(ts) = attr_value(&e, b"timestamp")? {
                        suite_timestamp = super::parse_timestamp(&ts);
                    }
                }
                b"testcase" => {
                    let (id, result) = read_testcase(&e, suite_timestamp)?;
                    current = Some(id.clone());
                    results.insert(id, result);
                }
                b"failure" | b"error" | b"skipped" => {
                    mark_status(&mut results, current.as_deref(), &e)?;
                }
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                // Self-closing testcase: passed, no children to wait for
                b"testcase" => {
                    let (id, result) = read_testcase(&e, suite_timestamp)?;
                    results.insert(id, result);
                }
                b"failure" | b"error" | b"skipped" => {
                    mark_status(&mut results, current.as_deref(), &e)?;
                }
                _ => {}
            },
            Event::End(e) => {
                if e.name().as_ref() == b"testcase" {
                    current = None;
                } else if e.name().as_ref() == b"testsuite" {
                    suite_timestamp = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(results)
}

fn mark_status(
    results: &mut BTreeMap<String, TestCaseResult>,
    current: Option<&str>,
    e: &BytesStart,
) -> Result<()> {
    let Some(id) = current else { return Ok(()) };
    let status = match e.name().as_ref() {
        b"failure" => TestStatus::Fail,
        b"error" => TestStatus::Error,
        _ => TestStatus::Skip,
    };
    let message = attr_value(e, b"message")?;
    if let Some(entry) = results.get_mut(id) {
        entry.status = status;
        entry.error_message = message;
    }
    Ok(())
}

fn read_testcase(
    e: &BytesStart,
    suite_timestamp: Option<DateTime<Utc>>,
) -> Result<(String, TestCaseResult)> {
    let name = attr_value(e, b"name")?.unwrap_or_default();
    let classname = attr_value(e, b"classname")?.unwrap_or_default();
    let file = attr_value(e, b"file")?;

    let test_id = if classname.is_empty() {
        name.clone()
    } else {
        format!("{}.{}", classname, name)
    };
    let test_file = file.unwrap_or_else(|| derive_test_file(&classname));

    Ok((
        test_id,
        TestCaseResult {
            status: TestStatus::Pass,
            error_message: None,
            timestamp: suite_timestamp,
            test_file,
        },
    ))
}

fn attr_value(e: &BytesStart, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::InvalidAttr)?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Derive a source path from a dotted classname (`tests.test_mod` ->
/// `tests/test_mod.py`).
fn derive_test_file(classname: &str) -> String {
    if classname.is_empty() {
        return String::new();
    }
    format!("{}.py", classname.replace('.', "/"))
}

/// Diff two parsed reports.
///
/// Emits a transition for every test id present in both maps whose status
/// changed, plus `none -> X` entries for tests only present in `after`
/// unless `filter_new_tests` is set (some call sites opt out to avoid
/// double-counting already-covered tests).
pub fn find_transitions(
    before: &BTreeMap<String, TestCaseResult>,
    after: &BTreeMap<String, TestCaseResult>,
    filter_new_tests: bool,
) -> Vec<TestTransition> {
    let mut transitions = Vec::new();

    for (test_id, after_result) in after {
        match before.get(test_id) {
            Some(before_result) => {
                if before_result.status != after_result.status {
                    transitions.push(TestTransition {
                        test_id: test_id.clone(),
                        test_file: after_result.test_file.clone(),
                        test_name: test_name_of(test_id),
                        before_status: before_result.status,
                        after_status: after_result.status,
                        before_timestamp: before_result.timestamp,
                        after_timestamp: after_result.timestamp,
                        error_message_before: before_result.error_message.clone(),
                        error_message_after: after_result.error_message.clone(),
                    });
                }
            }
            None if !filter_new_tests => {
                transitions.push(TestTransition {
                    test_id: test_id.clone(),
                    test_file: after_result.test_file.clone(),
                    test_name: test_name_of(test_id),
                    before_status: TestStatus::None,
                    after_status: after_result.status,
                    before_timestamp: None,
                    after_timestamp: after_result.timestamp,
                    error_message_before: None,
                    error_message_after: after_result.error_message.clone(),
                });
            }
            None => {}
        }
    }

    transitions
}

fn test_name_of(test_id: &str) -> String {
    test_id
        .rsplit('.')
        .next()
        .unwrap_or(test_id)
        .to_string()
}

/// Parse both reports and build evidence from the qualifying transitions.
///
/// Only `fail|error -> pass` transitions become evidence. `code_changes`
/// is a thin hook for the caller's version-control integration: supplied
/// snippets are attached verbatim, otherwise records carry none.
pub fn collect(
    before_path: &Path,
    after_path: &Path,
    filter_new_tests: bool,
    code_changes: &CodeChanges,
) -> Result<Vec<TestTransitionEvidence>> {
    let before = parse_report(before_path)?;
    let after = parse_report(after_path)?;

    let transitions = find_transitions(&before, &after, filter_new_tests);
    let evidence: Vec<TestTransitionEvidence> = transitions
        .into_iter()
        .filter(|t| t.before_status.is_failing() && t.after_status == TestStatus::Pass)
        .map(|t| TestTransitionEvidence {
            test_id: t.test_id,
            test_file: t.test_file,
            test_name: t.test_name,
            before_status: t.before_status,
            after_status: t.after_status,
            before_timestamp: t.before_timestamp,
            after_timestamp: t.after_timestamp,
            error_message_before: t.error_message_before,
            error_message_after: t.error_message_after,
            code_changes: code_changes.clone(),
        })
        .collect();

    tracing::debug!(
        before = %before_path.display(),
        after = %after_path.display(),
        transitions = evidence.len(),
        "Collected test transitions"
    );

    Ok(evidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BEFORE_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<testsuites>
  <testsuite name="pytest" timestamp="2024-05-01T10:00:00">
    <testcase classname="tests.test_mod" name="test_x" time="0.01">
      <failure message="AssertionError: 1 != 2">traceback here</failure>
    </testcase>
    <testcase classname="tests.test_mod" name="test_y" time="0.01"/>
  </testsuite>
</testsuites>
"#;

    const AFTER_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<testsuites>
  <testsuite name="pytest" timestamp="2024-05-01T11:00:00">
    <testcase classname="tests.test_mod" name="test_x" time="0.01"/>
    <testcase classname="tests.test_mod" name="test_y" time="0.01"/>
    <testcase classname="tests.test_mod" name="test_new" time="0.01"/>
  </testsuite>
</testsuites>
"#;

    #[test]
    fn parse_report_reads_status_and_message() {
        let report = parse_report_str(BEFORE_XML).unwrap();
        assert_eq!(report.len(), 2);

        let failing = &report["tests.test_mod.test_x"];
        assert_eq!(failing.status, TestStatus::Fail);
        assert_eq!(
            failing.error_message.as_deref(),
            Some("AssertionError: 1 != 2")
        );
        assert_eq!(failing.test_file, "tests/test_mod.py");
        assert!(failing.timestamp.is_some());

        let passing = &report["tests.test_mod.test_y"];
        assert_eq!(passing.status, TestStatus::Pass);
        assert!(passing.error_message.is_none());
    }

    #[test]
    fn file_attribute_overrides_classname_derivation() {
        let xml = r#"<testsuite><testcase classname="pkg.Suite" name="t" file="pkg/custom.py"/></testsuite>"#;
        let report = parse_report_str(xml).unwrap();
        assert_eq!(report["pkg.Suite.t"].test_file, "pkg/custom.py");
    }

    #[test]
    fn exactly_one_transition_for_single_fix() {
        let before = parse_report_str(BEFORE_XML).unwrap();
        let after = parse_report_str(AFTER_XML).unwrap();

        let transitions = find_transitions(&before, &after, true);
        assert_eq!(transitions.len(), 1);

        let t = &transitions[0];
        assert_eq!(t.test_id, "tests.test_mod.test_x");
        assert_eq!(t.test_name, "test_x");
        assert_eq!(t.before_status, TestStatus::Fail);
        assert_eq!(t.after_status, TestStatus::Pass);
        assert_eq!(
            t.error_message_before.as_deref(),
            Some("AssertionError: 1 != 2")
        );
    }

    #[test]
    fn new_tests_surface_unless_filtered() {
        let before = parse_report_str(BEFORE_XML).unwrap();
        let after = parse_report_str(AFTER_XML).unwrap();

        let with_new = find_transitions(&before, &after, false);
        assert_eq!(with_new.len(), 2);
        let new = with_new
            .iter()
            .find(|t| t.test_id == "tests.test_mod.test_new")
            .unwrap();
        assert_eq!(new.before_status, TestStatus::None);
        assert_eq!(new.after_status, TestStatus::Pass);

        let without_new = find_transitions(&before, &after, true);
        assert_eq!(without_new.len(), 1);
    }

    #[test]
    fn collect_keeps_only_positive_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let before_path = dir.path().join("before.xml");
        let after_path = dir.path().join("after.xml");
        std::fs::write(&before_path, BEFORE_XML).unwrap();
        std::fs::write(&after_path, AFTER_XML).unwrap();

        // New tests pass the diff but are not fail->pass, so with the
        // filter off the evidence set is still just the one fix.
        let evidence = collect(&before_path, &after_path, false, &CodeChanges::new()).unwrap();
        assert_eq!(evidence.len(), 1);
        assert!(evidence[0].is_positive());
        assert!(evidence[0].code_changes.is_empty());
    }

    #[test]
    fn missing_report_is_fatal() {
        let err = parse_report(Path::new("/nonexistent/report.xml")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn malformed_xml_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.xml");
        std::fs::write(&path, "<testsuite><testcase name=").unwrap();
        assert!(parse_report(&path).is_err());
    }
}
