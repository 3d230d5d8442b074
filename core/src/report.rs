//! Files written after (and during) a stress run: the text result file, the JSON report
//! and the per-candidate failure artifacts.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::testing::{
    AggregateRow, CandidateFailure, CheckerKind, SeedPolicy, StressSummary, TestCaseResult,
};

/// Number of characters of each stream shown in `status.txt`.
pub const PREVIEW_CHARS: usize = 256;

/// First `max_chars` characters of `bytes` (lossy UTF-8), followed by a note with the number of
/// characters left out.
pub fn preview(bytes: &[u8], max_chars: usize) -> String {
    let s = String::from_utf8_lossy(bytes);
    let total = s.chars().count();
    if total <= max_chars {
        return s.into_owned();
    }
    let mut head: String = s.chars().take(max_chars).collect();
    let rest = total - max_chars;
    let _ = write!(
        head,
        "\n({} character{} remain)",
        rest,
        if rest == 1 { "" } else { "s" }
    );
    head
}

pub fn render_result_table(rows: &[AggregateRow]) -> String {
    let name_width = rows
        .iter()
        .map(|r| r.name.chars().count())
        .chain(std::iter::once("solution".len()))
        .max()
        .unwrap_or_default();

    let mut s = String::new();
    let _ = writeln!(s, "General status");
    let _ = writeln!(s, "{:<w$}  status", "solution", w = name_width);
    for r in rows {
        let _ = writeln!(s, "{:<w$}  {}", r.name, r.status, w = name_width);
    }

    let _ = writeln!(s, "\nExecution time statistics (ms)");
    let _ = writeln!(
        s,
        "{:<w$}  {:>8}  {:>8}  {:>10}  {:>10}",
        "solution",
        "min",
        "max",
        "average",
        "median",
        w = name_width
    );
    for r in rows {
        let t = &r.time_ms;
        let _ = writeln!(
            s,
            "{:<w$}  {:>8}  {:>8}  {:>10.2}  {:>10.1}",
            r.name,
            t.min,
            t.max,
            t.mean,
            t.median,
            w = name_width
        );
    }
    s
}

pub fn write_result_file(path: impl AsRef<Path>, rows: &[AggregateRow]) -> fsutil::Result<()> {
    fsutil::write_with_mkdir(path, render_result_table(rows))
}

/// Effective run parameters, echoed in the JSON report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunParameters {
    pub test_count: u32,
    pub worker_count: u32,
    pub time_limit_sec: f64,
    pub seed: SeedPolicy,
    pub checker: CheckerKind,
}

#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub generated_at: DateTime<Local>,
    pub parameters: &'a RunParameters,
    #[serde(flatten)]
    pub summary: &'a StressSummary,
}

impl<'a> JsonReport<'a> {
    pub fn new(parameters: &'a RunParameters, summary: &'a StressSummary) -> Self {
        Self {
            generated_at: Local::now(),
            parameters,
            summary,
        }
    }

    pub fn write(&self, path: impl AsRef<Path>) -> fsutil::Result<()> {
        fsutil::write_json_with_mkdir(path, self)
    }
}

/// Writes `<log_dir>/<candidate>/{input,answer,output,status}.txt` for a candidate's first
/// failing test. `output.txt` is omitted when the candidate produced no output (TLE, RE).
/// A candidate name that is not a plain file name is rejected before anything is removed.
pub fn write_failure_artifacts(
    log_dir: impl AsRef<Path>,
    failure: &CandidateFailure,
    result: &TestCaseResult,
) -> fsutil::Result<PathBuf> {
    let dir = fsutil::child_path(log_dir, &failure.candidate)?;
    fsutil::recreate_dir(&dir)?;

    let output = result
        .candidates
        .iter()
        .find(|r| r.candidate == failure.candidate)
        .and_then(|r| r.output.as_deref());

    fsutil::write(dir.join("input.txt"), &result.input)?;
    fsutil::write(dir.join("answer.txt"), &result.answer)?;
    if let Some(output) = output {
        fsutil::write(dir.join("output.txt"), output)?;
    }
    fsutil::write(dir.join("status.txt"), render_status(failure, result, output))?;
    Ok(dir)
}

fn render_status(failure: &CandidateFailure, result: &TestCaseResult, output: Option<&[u8]>) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "solution: {}", failure.candidate);
    let _ = writeln!(s, "verdict: {}", failure.verdict);
    let _ = writeln!(s, "test index: {}", failure.test_index);
    let _ = writeln!(s, "seed: {}", failure.seed);
    let _ = writeln!(s, "comment: {}", failure.comment.trim_end());

    let sections = [
        ("input", Some(result.input.as_slice())),
        ("answer", Some(result.answer.as_slice())),
        ("output", output),
    ];
    for (title, bytes) in sections {
        let _ = writeln!(s, "\n[{}]", title);
        match bytes {
            Some(b) => {
                let p = preview(b, PREVIEW_CHARS);
                s.push_str(&p);
                if !p.ends_with('\n') {
                    s.push('\n');
                }
            }
            None => s.push_str("<none>\n"),
        }
    }
    s
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;
    use crate::testing::{CandidateResult, CandidateStatus, TimeStats, Verdict};

    #[test]
    fn preview_counts_remaining_characters() {
        assert_eq!(preview(b"abc", 3), "abc");
        assert_eq!(preview(b"abcd", 3), "abc\n(1 character remain)");
        assert_eq!(preview(b"abcdef", 3), "abc\n(3 characters remain)");
        // counted in characters, not bytes
        assert_eq!(preview("ああああ".as_bytes(), 2), "ああ\n(2 characters remain)");
    }

    fn row(name: &str, status: CandidateStatus, samples: &[u64]) -> AggregateRow {
        AggregateRow {
            name: name.to_owned(),
            status,
            time_ms: TimeStats::from_samples(samples),
        }
    }

    #[test]
    fn result_table_has_both_sections() {
        let rows = [
            row("fast", CandidateStatus::Accepted { tests: 2 }, &[10, 20]),
            row(
                "naive",
                CandidateStatus::Failed {
                    verdict: Verdict::TimeLimitExceeded,
                    test_index: 7,
                },
                &[2000],
            ),
        ];
        let table = render_result_table(&rows);
        let lines: Vec<_> = table.lines().collect();

        assert_eq!(lines[0], "General status");
        assert_eq!(lines[2], "fast      accepted, 2 tests");
        assert_eq!(
            lines[3],
            "naive     failed with verdict time limit exceeded at test index 7"
        );
        assert_eq!(lines[5], "Execution time statistics (ms)");
        assert!(lines[7].starts_with("fast"));
        assert!(lines[7].contains("15.00"));
        assert!(lines[8].contains("2000"));
    }

    fn failing_result() -> (CandidateFailure, TestCaseResult) {
        let failure = CandidateFailure {
            candidate: "b".to_owned(),
            verdict: Verdict::WrongAnswer,
            test_index: 1,
            seed: 42,
            comment: "1st token differs: answer is '12', output is '13'".to_owned(),
        };
        let result = TestCaseResult {
            index: 1,
            seed: 42,
            input: b"5 7\n".to_vec(),
            answer: b"12\n".to_vec(),
            reference_time_ms: 3,
            candidates: vec![CandidateResult {
                candidate: "b".to_owned(),
                verdict: Verdict::WrongAnswer,
                wall_time_ms: 4,
                comment: failure.comment.clone(),
                output: Some(b"13\n".to_vec()),
            }],
        };
        (failure, result)
    }

    #[test]
    fn artifacts_for_wrong_answer() {
        let tmp = TempDir::new().unwrap();
        let (failure, result) = failing_result();

        let dir = write_failure_artifacts(tmp.path(), &failure, &result).unwrap();

        assert_eq!(dir, tmp.path().join("b"));
        assert_eq!(std::fs::read(dir.join("input.txt")).unwrap(), b"5 7\n");
        assert_eq!(std::fs::read(dir.join("answer.txt")).unwrap(), b"12\n");
        assert_eq!(std::fs::read(dir.join("output.txt")).unwrap(), b"13\n");

        let status = std::fs::read_to_string(dir.join("status.txt")).unwrap();
        assert!(status.contains("verdict: wrong answer\n"), "{}", status);
        assert!(status.contains("seed: 42\n"));
        assert!(status.contains("[output]\n13\n"));
    }

    #[test]
    fn artifacts_without_output() {
        let tmp = TempDir::new().unwrap();
        let (mut failure, mut result) = failing_result();
        failure.verdict = Verdict::TimeLimitExceeded;
        result.candidates[0].output = None;
        result.input = vec![b'x'; 300];

        let dir = write_failure_artifacts(tmp.path(), &failure, &result).unwrap();

        assert!(!dir.join("output.txt").exists());
        let status = std::fs::read_to_string(dir.join("status.txt")).unwrap();
        assert!(status.contains("(44 characters remain)"), "{}", status);
        assert!(status.ends_with("[output]\n<none>\n"));
    }

    #[test]
    fn json_report_is_flat() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sub/report.json");
        let params = RunParameters {
            test_count: 10,
            worker_count: 2,
            time_limit_sec: 1.5,
            seed: SeedPolicy::Sequential,
            checker: CheckerKind::Float6,
        };
        let (failure, _) = failing_result();
        let summary = StressSummary {
            tests_requested: 10,
            tests_run: 1,
            stopped_early: true,
            rows: vec![row("b", CandidateStatus::Accepted { tests: 1 }, &[4])],
            failures: vec![failure],
        };

        JsonReport::new(&params, &summary).write(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(json["generated_at"].is_string());
        assert_eq!(json["parameters"]["seed"], "sequential");
        assert_eq!(json["parameters"]["checker"], "float6");
        assert_eq!(json["tests_run"], 1);
        assert_eq!(json["stopped_early"], true);
        assert_eq!(json["failures"][0]["verdict"], "wrong_answer");
        assert_eq!(json["rows"][0]["status"], "accepted");
    }

    #[test]
    fn artifacts_never_leave_the_log_dir() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("project");
        let source = project.join("src/main.cpp");
        fsutil::write_with_mkdir(&source, "int main() {}").unwrap();
        let log_dir = project.join("logs");

        let (mut failure, result) = failing_result();
        for name in ["..", "../src", "", ".", "/abs"] {
            failure.candidate = name.to_owned();
            let err = write_failure_artifacts(&log_dir, &failure, &result).unwrap_err();
            assert!(matches!(err, fsutil::Error::NotAFileName(_)), "{:?}: {:?}", name, err);
        }

        assert!(source.is_file(), "sources next to the log dir are left alone");
    }

    #[test]
    fn result_table_aligns_non_ascii_names() {
        // 9 characters, 27 bytes
        let rows = [
            row("とても速い解法です", CandidateStatus::Accepted { tests: 1 }, &[1]),
            row("fast", CandidateStatus::Accepted { tests: 1 }, &[1]),
        ];
        let table = render_result_table(&rows);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines[2], "とても速い解法です  accepted, 1 tests");
        assert_eq!(lines[3], "fast       accepted, 1 tests");
    }
}
