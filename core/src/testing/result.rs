use std::time::Duration;

use serde::Serialize;

/// Classification of one candidate run on one test.
///
/// Ordinals follow the testlib exit-code convention so that external checkers can report a
/// verdict through their exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    #[strum(serialize = "accepted")]
    Accepted,
    #[strum(serialize = "wrong answer")]
    WrongAnswer,
    #[strum(serialize = "presentation error")]
    PresentationError,
    #[strum(serialize = "checker failure")]
    CheckerFailure,
    #[strum(serialize = "time limit exceeded")]
    TimeLimitExceeded,
    #[strum(serialize = "runtime error")]
    RuntimeError,
    #[strum(serialize = "memory limit exceeded")]
    MemoryLimitExceeded,
    /// Marks the reference program's own statistics row.
    #[strum(serialize = "reference")]
    Reference,
}

impl Verdict {
    pub fn ordinal(self) -> Option<i32> {
        use Verdict::*;
        match self {
            Accepted => Some(0),
            WrongAnswer => Some(1),
            PresentationError => Some(2),
            CheckerFailure => Some(3),
            TimeLimitExceeded => Some(400),
            MemoryLimitExceeded => Some(401),
            RuntimeError => Some(402),
            Reference => None,
        }
    }

    /// Maps an external checker's exit code to a verdict.
    /// Only the four verdicts a checker may produce are recognized.
    pub fn from_checker_exit_code(code: i32) -> Option<Self> {
        use Verdict::*;
        [Accepted, WrongAnswer, PresentationError, CheckerFailure]
            .into_iter()
            .find(|v| v.ordinal() == Some(code))
    }

    /// Verdicts produced by the process itself misbehaving. The checker never sees these.
    pub fn is_terminal(self) -> bool {
        use Verdict::*;
        matches!(self, TimeLimitExceeded | RuntimeError | MemoryLimitExceeded)
    }

    pub fn short_code(self) -> &'static str {
        use Verdict::*;
        match self {
            Accepted => "AC",
            WrongAnswer => "WA",
            PresentationError => "PE",
            CheckerFailure => "FAIL",
            TimeLimitExceeded => "TLE",
            RuntimeError => "RE",
            MemoryLimitExceeded => "MLE",
            Reference => "REF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalState {
    Completed,
    TimedOut,
    CrashedNonZero,
}

/// What one process run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// `None` when the process timed out or was killed by a signal.
    pub exit_code: Option<i32>,
    pub wall_time: Duration,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub terminal_state: TerminalState,
}

impl ExecutionOutcome {
    pub fn wall_time_ms(&self) -> u64 {
        self.wall_time.as_millis() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateResult {
    pub candidate: String,
    pub verdict: Verdict,
    pub wall_time_ms: u64,
    pub comment: String,
    /// Absent when the candidate timed out or crashed.
    pub output: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCaseResult {
    /// 1-based.
    pub index: u32,
    pub seed: u32,
    pub input: Vec<u8>,
    pub answer: Vec<u8>,
    pub reference_time_ms: u64,
    pub candidates: Vec<CandidateResult>,
}

impl TestCaseResult {
    pub fn failures(&self) -> impl Iterator<Item = &CandidateResult> {
        self.candidates
            .iter()
            .filter(|r| r.verdict != Verdict::Accepted)
    }
}
