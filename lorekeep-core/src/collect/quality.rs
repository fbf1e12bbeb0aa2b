//! Code-quality collector
//!
//! Parses line-oriented linter output (`path:line:col: CODE message`)
//! from a captured baseline and a live run, then computes per-file
//! issue-count deltas. Only files whose issue count went down become
//! evidence.
//!
//! The tool invocation sits behind [`DiagnosticsProvider`] so tests and
//! other frontends can inject captured output; the default provider
//! shells out. A tool that cannot be launched reports no output rather
//! than failing the pipeline, so a missing linter degrades validation
//! instead of aborting it.

use crate::error::{Error, Result};
use crate::evidence::{
    percentage_improvement, CodeChange, CodeChanges, CodeQualityEvidence,
};
use chrono::Utc;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;

/// Supported diagnostics tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LintTool {
    Ruff,
    Pylint,
    Flake8,
}

impl LintTool {
    pub fn as_str(&self) -> &'static str {
        match self {
            LintTool::Ruff => "ruff",
            LintTool::Pylint => "pylint",
            LintTool::Flake8 => "flake8",
        }
    }

    /// Command line for one run over the given paths.
    fn command(&self, paths: &[PathBuf]) -> Command {
        let mut cmd = Command::new(self.as_str());
        match self {
            LintTool::Ruff => {
                cmd.arg("check");
            }
            LintTool::Pylint => {
                // Parseable single-line output, no summary banner
                cmd.args(["--output-format=parseable", "--score=n"]);
            }
            LintTool::Flake8 => {}
        }
        cmd.args(paths);
        cmd
    }

    /// Regex over one output line, capturing (path, line, col, code, message).
    fn diagnostic_pattern(&self) -> Regex {
        let pattern = match self {
            LintTool::Ruff | LintTool::Flake8 => {
                r"^(.+?):(\d+):(\d+):\s+([A-Z]+\d+)\s+(.+)$"
            }
            LintTool::Pylint => r"^(.+?):(\d+):(\d+):\s+([A-Z]\d+):\s+(.+)$",
        };
        Regex::new(pattern).unwrap()
    }
}

impl std::str::FromStr for LintTool {
    type Err = Error;

    /// Unknown tool names are rejected here, before anything is spawned.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ruff" => Ok(LintTool::Ruff),
            "pylint" => Ok(LintTool::Pylint),
            "flake8" => Ok(LintTool::Flake8),
            other => Err(Error::UnknownTool(other.to_string())),
        }
    }
}

impl std::fmt::Display for LintTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One diagnostic parsed from tool output.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub line: u32,
    pub column: u32,
    pub code: String,
    pub description: String,
}

/// Diagnostics grouped by file path.
pub type DiagnosticsByFile = BTreeMap<String, Vec<Diagnostic>>;

/// Boundary for running a diagnostics tool.
///
/// `Ok(None)` means the tool could not be invoked at all (not installed);
/// callers treat that as zero issues.
pub trait DiagnosticsProvider {
    fn run(&self, tool: LintTool, paths: &[PathBuf]) -> Result<Option<String>>;
}

/// Default provider: invoke the tool as a subprocess and capture stdout.
///
/// Linters exit non-zero when they find issues, so the exit status is
/// deliberately not checked; only a spawn failure maps to `None`.
pub struct CommandProvider;

impl DiagnosticsProvider for CommandProvider {
    fn run(&self, tool: LintTool, paths: &[PathBuf]) -> Result<Option<String>> {
        match tool.command(paths).output() {
            Ok(output) => Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned())),
            Err(e) => {
                tracing::warn!(tool = tool.as_str(), error = %e, "Lint tool not available");
                Ok(None)
            }
        }
    }
}

/// Parse tool output into diagnostics grouped by file.
pub fn parse_output(tool: LintTool, output: &str) -> DiagnosticsByFile {
    let pattern = tool.diagnostic_pattern();
    let mut by_file: DiagnosticsByFile = BTreeMap::new();

    for line in output.lines() {
        let Some(caps) = pattern.captures(line) else { continue };
        let (Ok(line_no), Ok(column)) = (caps[2].parse(), caps[3].parse()) else {
            continue;
        };
        by_file.entry(caps[1].to_string()).or_default().push(Diagnostic {
            line: line_no,
            column,
            code: caps[4].to_string(),
            description: caps[5].trim().to_string(),
        });
    }

    by_file
}

/// Per-file issue delta between two runs, improvements only.
#[derive(Debug, Clone, PartialEq)]
pub struct FileImprovement {
    pub file_path: String,
    pub before_count: usize,
    pub after_count: usize,
}

/// Compare two runs; keep only files where issues went down.
///
/// Files where quality regressed or stayed equal are dropped here, before
/// any evidence is constructed.
pub fn compare_runs(before: &DiagnosticsByFile, after: &DiagnosticsByFile) -> Vec<FileImprovement> {
    let mut files: Vec<&String> = before.keys().chain(after.keys()).collect();
    files.sort();
    files.dedup();

    files
        .into_iter()
        .filter_map(|file| {
            let before_count = before.get(file).map_or(0, Vec::len);
            let after_count = after.get(file).map_or(0, Vec::len);
            (after_count < before_count).then(|| FileImprovement {
                file_path: file.clone(),
                before_count,
                after_count,
            })
        })
        .collect()
}

/// Build evidence from two parsed runs.
///
/// Snippets mirror the runtime collector: caller-supplied when given,
/// otherwise a best-effort read of the improved file.
pub fn collect_improvements(
    tool: LintTool,
    before: &DiagnosticsByFile,
    after: &DiagnosticsByFile,
    code_changes: Option<&CodeChanges>,
) -> Vec<CodeQualityEvidence> {
    let now = Utc::now();

    compare_runs(before, after)
        .into_iter()
        .map(|imp| {
            let before_value = imp.before_count as f64;
            let after_value = imp.after_count as f64;
            let changes = match code_changes {
                Some(supplied) => supplied.clone(),
                None => snapshot_file(&imp.file_path),
            };
            CodeQualityEvidence {
                metric_type: "linting".to_string(),
                before_value,
                after_value,
                percentage_improvement: percentage_improvement(before_value, after_value),
                tool: tool.as_str().to_string(),
                file_path: imp.file_path,
                measured_at: now,
                code_changes: changes,
            }
        })
        .collect()
}

/// Build evidence from a captured baseline report and one live run.
///
/// The baseline is raw tool output captured before the change; only the
/// after state comes from the provider. A provider that reports the tool
/// missing yields no evidence, so an absent linter never looks like an
/// improvement over the baseline.
pub fn collect_against_baseline(
    provider: &dyn DiagnosticsProvider,
    tool: LintTool,
    baseline_output: &str,
    after_paths: &[PathBuf],
    code_changes: Option<&CodeChanges>,
) -> Result<Vec<CodeQualityEvidence>> {
    let Some(output) = provider.run(tool, after_paths)? else {
        return Ok(Vec::new());
    };
    let before = parse_output(tool, baseline_output);
    let after = parse_output(tool, &output);

    let evidence = collect_improvements(tool, &before, &after, code_changes);
    tracing::debug!(
        tool = tool.as_str(),
        improved_files = evidence.len(),
        "Collected code quality improvements"
    );
    Ok(evidence)
}

fn snapshot_file(path: &str) -> CodeChanges {
    let after = std::fs::read_to_string(path)
        .unwrap_or_else(|_| format!("<unreadable: {}>", path));
    let mut changes = CodeChanges::new();
    changes.insert(
        path.to_string(),
        CodeChange {
            before: String::new(),
            after,
        },
    );
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    struct FixedOutput(Option<&'static str>);

    impl DiagnosticsProvider for FixedOutput {
        fn run(&self, _tool: LintTool, _paths: &[PathBuf]) -> Result<Option<String>> {
            Ok(self.0.map(str::to_string))
        }
    }

    const RUFF_BEFORE: &str = "\
a.py:1:1: F401 `os` imported but unused
a.py:3:5: E501 line too long
a.py:9:1: F841 local variable assigned but never used
b.py:2:1: F401 `sys` imported but unused
";

    const RUFF_AFTER: &str = "\
a.py:3:5: E501 line too long
b.py:2:1: F401 `sys` imported but unused
";

    #[test]
    fn unknown_tool_is_rejected_before_spawn() {
        let err = LintTool::from_str("eslint").unwrap_err();
        assert!(matches!(err, Error::UnknownTool(_)));
        assert_eq!(LintTool::from_str("ruff").unwrap(), LintTool::Ruff);
    }

    #[test]
    fn ruff_output_parses_into_per_file_diagnostics() {
        let by_file = parse_output(LintTool::Ruff, RUFF_BEFORE);
        assert_eq!(by_file.len(), 2);
        assert_eq!(by_file["a.py"].len(), 3);
        assert_eq!(by_file["a.py"][0].code, "F401");
        assert_eq!(by_file["a.py"][1].line, 3);
        assert_eq!(by_file["a.py"][1].column, 5);
        assert_eq!(by_file["b.py"].len(), 1);
    }

    #[test]
    fn pylint_output_uses_its_own_shape() {
        let output = "src/app.py:12:0: C0114: Missing module docstring (missing-module-docstring)";
        let by_file = parse_output(LintTool::Pylint, output);
        assert_eq!(by_file["src/app.py"][0].code, "C0114");
        assert!(by_file["src/app.py"][0]
            .description
            .contains("Missing module docstring"));
    }

    #[test]
    fn unparseable_lines_are_skipped() {
        let output = "*** Module app\ntotal issues: 3\na.py:1:1: F401 unused\n";
        let by_file = parse_output(LintTool::Ruff, output);
        assert_eq!(by_file.len(), 1);
        assert_eq!(by_file["a.py"].len(), 1);
    }

    #[test]
    fn compare_keeps_only_improved_files() {
        let before = parse_output(LintTool::Ruff, RUFF_BEFORE);
        let after = parse_output(LintTool::Ruff, RUFF_AFTER);

        let improvements = compare_runs(&before, &after);
        assert_eq!(improvements.len(), 1);
        assert_eq!(improvements[0].file_path, "a.py");
        assert_eq!(improvements[0].before_count, 3);
        assert_eq!(improvements[0].after_count, 1);
    }

    #[test]
    fn unchanged_counts_produce_no_evidence() {
        let before = parse_output(LintTool::Ruff, "f.py:1:1: F401 unused\n");
        let after = parse_output(LintTool::Ruff, "f.py:1:1: F401 unused\n");
        assert!(collect_improvements(LintTool::Ruff, &before, &after, None).is_empty());
    }

    #[test]
    fn regressions_produce_no_evidence() {
        let before = parse_output(LintTool::Ruff, "f.py:1:1: F401 unused\n");
        let after = parse_output(LintTool::Ruff, RUFF_BEFORE);
        assert!(collect_improvements(LintTool::Ruff, &before, &after, None).is_empty());
    }

    #[test]
    fn evidence_carries_derived_percentage() {
        let before = parse_output(LintTool::Ruff, RUFF_BEFORE);
        let after = parse_output(LintTool::Ruff, RUFF_AFTER);

        let evidence = collect_improvements(LintTool::Ruff, &before, &after, None);
        assert_eq!(evidence.len(), 1);
        let q = &evidence[0];
        assert_eq!(q.metric_type, "linting");
        assert_eq!(q.tool, "ruff");
        assert_eq!(q.before_value, 3.0);
        assert_eq!(q.after_value, 1.0);
        assert!((q.percentage_improvement - 66.666).abs() < 0.01);
    }

    #[test]
    fn baseline_and_live_run_produce_evidence() {
        let provider = FixedOutput(Some(RUFF_AFTER));
        let evidence = collect_against_baseline(
            &provider,
            LintTool::Ruff,
            RUFF_BEFORE,
            &[PathBuf::from("a.py")],
            None,
        )
        .unwrap();

        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].file_path, "a.py");
        assert_eq!(evidence[0].before_value, 3.0);
        assert_eq!(evidence[0].after_value, 1.0);
    }

    #[test]
    fn live_run_matching_baseline_yields_nothing() {
        let provider = FixedOutput(Some(RUFF_BEFORE));
        let evidence = collect_against_baseline(
            &provider,
            LintTool::Ruff,
            RUFF_BEFORE,
            &[PathBuf::from("a.py")],
            None,
        )
        .unwrap();
        assert!(evidence.is_empty());
    }

    #[test]
    fn missing_tool_yields_no_evidence_against_baseline() {
        // The baseline has issues; an uninvokable tool must not read as
        // "all issues fixed"
        let provider = FixedOutput(None);
        let evidence = collect_against_baseline(
            &provider,
            LintTool::Flake8,
            RUFF_BEFORE,
            &[PathBuf::from("a.py")],
            None,
        )
        .unwrap();
        assert!(evidence.is_empty());
    }

    #[test]
    fn supplied_changes_flow_through_evidence() {
        let before = parse_output(LintTool::Ruff, RUFF_BEFORE);
        let after = parse_output(LintTool::Ruff, RUFF_AFTER);
        let mut supplied = CodeChanges::new();
        supplied.insert(
            "a.py".to_string(),
            CodeChange {
                before: "import os".to_string(),
                after: "".to_string(),
            },
        );

        let evidence = collect_improvements(LintTool::Ruff, &before, &after, Some(&supplied));
        assert_eq!(
            evidence[0].code_changes.get("a.py").unwrap().before,
            "import os"
        );
    }
}
