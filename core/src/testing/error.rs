use std::{io, path::PathBuf};

pub type Result<T> = ::std::result::Result<T, HarnessError>;

/// Conditions that abort the whole stress run.
///
/// Candidate misbehavior is never reported through this type; it is recorded as a
/// [`Verdict`](super::Verdict) instead.
#[derive(thiserror::Error, Debug)]
pub enum HarnessError {
    #[error("Cannot find executable '{program}' for {role} '{name}'")]
    NotFound {
        role: &'static str,
        name: String,
        program: PathBuf,

        #[source]
        source: which::Error,
    },

    #[error("Failed to spawn '{program}'")]
    Spawn {
        program: PathBuf,

        #[source]
        source: io::Error,
    },

    #[error("Failed to communicate with '{program}'")]
    Communicate {
        program: PathBuf,

        #[source]
        source: io::Error,
    },

    #[error("{role} '{name}' {reason} (test {test_index}, {wall_time_ms}ms){}", fmt_stderr(.stderr))]
    TrustedProgramFailed {
        role: &'static str,
        name: String,
        reason: String,
        test_index: u32,
        wall_time_ms: u64,
        stderr: String,
    },

    #[error("Checker failed on test {test_index}")]
    Checker {
        test_index: u32,

        #[source]
        source: CheckerError,
    },

    #[error("Worker task did not finish")]
    Join(#[from] tokio::task::JoinError),
}

/// Failures of the checker itself. Always fatal, unlike a wrong answer.
#[derive(thiserror::Error, Debug)]
pub enum CheckerError {
    #[error("checker reported an internal failure: {0}")]
    Failure(String),

    #[error("checker exited with unrecognized code {code}: {comment}")]
    UnknownExitCode { code: i32, comment: String },

    #[error("checker was killed by a signal: {comment}")]
    Signaled { comment: String },

    #[error("checker timed out after {wall_time_ms}ms")]
    TimedOut { wall_time_ms: u64 },

    #[error("cannot run checker process")]
    Process(#[source] Box<HarnessError>),
}

fn fmt_stderr(stderr: &str) -> String {
    if stderr.trim().is_empty() {
        String::new()
    } else {
        format!("\nstderr:\n{}", stderr.trim_end())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn trusted_program_failure_message_names_program_and_timing() {
        let e = HarnessError::TrustedProgramFailed {
            role: "reference solution",
            name: "main".into(),
            reason: "exited with code 3".into(),
            test_index: 7,
            wall_time_ms: 12,
            stderr: "assertion failed\n".into(),
        };
        assert_eq!(
            e.to_string(),
            "reference solution 'main' exited with code 3 (test 7, 12ms)\nstderr:\nassertion failed"
        );
    }

    #[test]
    fn checker_killed_by_signal_says_so() {
        let e = CheckerError::Signaled {
            comment: String::new(),
        };
        assert_eq!(e.to_string(), "checker was killed by a signal: ");
        let e = CheckerError::UnknownExitCode {
            code: 7,
            comment: "odd".into(),
        };
        assert_eq!(e.to_string(), "checker exited with unrecognized code 7: odd");
    }
}
