use std::{borrow::Cow, time::Duration};

use serde::{Deserialize, Serialize};

use super::{
    error::CheckerError,
    result::{TerminalState, Verdict},
    runner::{ProcessRunner, ProgramCommand},
};

/// Checker names as they appear in `kstress.toml` and on the command line.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
pub enum CheckerKind {
    #[serde(rename = "byte")]
    #[strum(serialize = "byte")]
    Byte,
    #[serde(rename = "token")]
    #[strum(serialize = "token")]
    Token,
    #[serde(rename = "line")]
    #[strum(serialize = "line")]
    Line,
    #[serde(rename = "float4")]
    #[strum(serialize = "float4")]
    Float4,
    #[serde(rename = "float6")]
    #[strum(serialize = "float6")]
    Float6,
    #[serde(rename = "float9")]
    #[strum(serialize = "float9")]
    Float9,
    #[serde(rename = "external")]
    #[strum(serialize = "external")]
    External,
    #[serde(rename = "accept-all")]
    #[strum(serialize = "accept-all")]
    AcceptAll,
}

impl CheckerKind {
    pub fn description(self) -> &'static str {
        use CheckerKind::*;
        match self {
            Byte => "outputs must be byte-for-byte identical",
            Token => "whitespace-separated tokens must be identical",
            Line => "non-blank lines must be identical",
            Float4 => "like token, numbers may differ by at most 1e-4",
            Float6 => "like token, numbers may differ by at most 1e-6",
            Float9 => "like token, numbers may differ by at most 1e-9",
            External => "exit code of an external checker program decides (testlib codes)",
            AcceptAll => "every output is accepted (timing runs)",
        }
    }

    pub fn needs_program(self) -> bool {
        self == CheckerKind::External
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub verdict: Verdict,
    pub comment: String,
}

impl CheckOutcome {
    fn accepted(comment: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Accepted,
            comment: comment.into(),
        }
    }

    fn wrong_answer(comment: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::WrongAnswer,
            comment: comment.into(),
        }
    }
}

/// Decides whether a candidate's output is correct.
#[derive(Debug, Clone)]
pub enum Checker {
    Byte,
    Token,
    Line,
    Numeric { epsilon: f64 },
    External {
        command: ProgramCommand,
        runner: ProcessRunner,
    },
    AcceptAll,
}

impl Checker {
    /// Returns `None` only for [`CheckerKind::External`] without a checker program.
    pub fn new(kind: CheckerKind, program: Option<ProgramCommand>, deadline: Duration) -> Option<Self> {
        use CheckerKind::*;
        let checker = match kind {
            Byte => Self::Byte,
            Token => Self::Token,
            Line => Self::Line,
            Float4 => Self::Numeric { epsilon: 1e-4 },
            Float6 => Self::Numeric { epsilon: 1e-6 },
            Float9 => Self::Numeric { epsilon: 1e-9 },
            External => Self::External {
                command: program?,
                runner: ProcessRunner::new(deadline),
            },
            AcceptAll => Self::AcceptAll,
        };
        Some(checker)
    }

    pub async fn check(
        &self,
        input: &[u8],
        answer: &[u8],
        output: &[u8],
    ) -> Result<CheckOutcome, CheckerError> {
        match self {
            Self::Byte => Ok(check_bytes(answer, output)),
            Self::Token => Ok(check_tokens(answer, output, |a, b| a == b)),
            Self::Line => Ok(check_lines(answer, output)),
            Self::Numeric { epsilon } => Ok(check_tokens(answer, output, |a, b| {
                tokens_close(a, b, *epsilon)
            })),
            Self::External { command, runner } => {
                run_external(command, runner, input, answer, output).await
            }
            Self::AcceptAll => Ok(CheckOutcome::accepted("Output was not checked")),
        }
    }
}

pub fn check_bytes(answer: &[u8], output: &[u8]) -> CheckOutcome {
    if answer == output {
        CheckOutcome::accepted("Answer and output are exactly the same")
    } else {
        CheckOutcome::wrong_answer(match first_difference(answer, output) {
            Some(pos) => format!("Answer and output differ at byte {}", pos),
            None => "Answer and output differ".to_owned(),
        })
    }
}

fn first_difference(a: &[u8], b: &[u8]) -> Option<usize> {
    a.iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .or_else(|| (a.len() != b.len()).then(|| a.len().min(b.len())))
}

fn tokens(s: &[u8]) -> Vec<&[u8]> {
    s.split(|b| b.is_ascii_whitespace())
        .filter(|t| !t.is_empty())
        .collect()
}

pub fn check_tokens<F>(answer: &[u8], output: &[u8], eq: F) -> CheckOutcome
where
    F: Fn(&[u8], &[u8]) -> bool,
{
    let answer_tokens = tokens(answer);
    let output_tokens = tokens(output);

    let mismatch = (0..answer_tokens.len().max(output_tokens.len())).find(|&i| {
        match (answer_tokens.get(i), output_tokens.get(i)) {
            (Some(a), Some(b)) => !eq(*a, *b),
            _ => true,
        }
    });

    let Some(i) = mismatch else {
        return CheckOutcome::accepted(format!("{} token(s) all match", answer_tokens.len()));
    };

    let mut comment = format!(
        "{} token differs: answer is {}, output is {}",
        ordinal(i + 1),
        quoted(answer_tokens.get(i)),
        quoted(output_tokens.get(i)),
    );
    if answer_tokens.len() != output_tokens.len() {
        comment += &format!(
            " (answer has {} tokens, output has {})",
            answer_tokens.len(),
            output_tokens.len()
        );
    }
    CheckOutcome::wrong_answer(comment)
}

fn quoted(token: Option<&&[u8]>) -> Cow<'static, str> {
    match token {
        Some(t) => format!("'{}'", String::from_utf8_lossy(t)).into(),
        None => "<none>".into(),
    }
}

fn parse_number(token: &[u8]) -> Option<f64> {
    std::str::from_utf8(token)
        .ok()?
        .parse::<f64>()
        .ok()
        .filter(|x| x.is_finite())
}

/// Numbers compare with an absolute tolerance; anything else must match exactly.
pub fn tokens_close(a: &[u8], b: &[u8], epsilon: f64) -> bool {
    match (parse_number(a), parse_number(b)) {
        (Some(x), Some(y)) => (x - y).abs() <= epsilon,
        _ => a == b,
    }
}

fn non_blank_lines(s: &[u8]) -> Vec<&[u8]> {
    s.split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .collect()
}

pub fn check_lines(answer: &[u8], output: &[u8]) -> CheckOutcome {
    let answer_lines = non_blank_lines(answer);
    let output_lines = non_blank_lines(output);

    if answer_lines == output_lines {
        return CheckOutcome::accepted(format!("{} line(s) all match", answer_lines.len()));
    }

    let i = answer_lines
        .iter()
        .zip(&output_lines)
        .position(|(a, b)| a != b)
        .unwrap_or_else(|| answer_lines.len().min(output_lines.len()));

    let mut comment = format!("{} line differs", ordinal(i + 1));
    if answer_lines.len() != output_lines.len() {
        comment += &format!(
            " (answer has {} non-blank lines, output has {})",
            answer_lines.len(),
            output_lines.len()
        );
    }
    CheckOutcome::wrong_answer(comment)
}

/// `1` => `"1st"`, `12` => `"12th"`, `22` => `"22nd"`.
pub fn ordinal(n: usize) -> String {
    let suffix = if (11..=13).contains(&(n % 100)) {
        "th"
    } else {
        match n % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        }
    };
    format!("{}{}", n, suffix)
}

fn new_boundary() -> String {
    format!("{:032x}", rand::random::<u128>())
}

async fn run_external(
    command: &ProgramCommand,
    runner: &ProcessRunner,
    input: &[u8],
    answer: &[u8],
    output: &[u8],
) -> Result<CheckOutcome, CheckerError> {
    let boundary1 = new_boundary();
    let boundary2 = new_boundary();

    let mut stdin = Vec::with_capacity(
        input.len() + boundary1.len() + answer.len() + boundary2.len() + output.len(),
    );
    stdin.extend_from_slice(input);
    stdin.extend_from_slice(boundary1.as_bytes());
    stdin.extend_from_slice(answer);
    stdin.extend_from_slice(boundary2.as_bytes());
    stdin.extend_from_slice(output);

    let cmd = command.clone().args([boundary1, boundary2]);
    let res = runner
        .run(&cmd, &stdin)
        .await
        .map_err(|e| CheckerError::Process(Box::new(e)))?;

    if res.terminal_state == TerminalState::TimedOut {
        return Err(CheckerError::TimedOut {
            wall_time_ms: res.wall_time_ms(),
        });
    }

    let comment = String::from_utf8_lossy(&res.stderr).into_owned();
    let Some(code) = res.exit_code else {
        return Err(CheckerError::Signaled { comment });
    };
    match Verdict::from_checker_exit_code(code) {
        Some(Verdict::CheckerFailure) => Err(CheckerError::Failure(comment)),
        Some(verdict) => Ok(CheckOutcome { verdict, comment }),
        None => Err(CheckerError::UnknownExitCode { code, comment }),
    }
}
