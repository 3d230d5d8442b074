use std::{
    fmt,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    process::Command,
    time::Instant,
};

use super::{error::*, result::*};

/// An executable plus its argument list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ProgramCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Builds a command from an argv-style list: the first element is the program.
    pub fn from_argv<S: AsRef<str>>(argv: &[S]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.as_ref()).args(args.iter().map(|s| s.as_ref().to_owned())))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Checks that the program exists and is executable, looking it up in `PATH` when it is a
    /// bare name. `role` and `name` only label the error.
    pub fn resolve_executable(&self, role: &'static str, name: &str) -> Result<PathBuf> {
        which::which(&self.program).map_err(|source| HarnessError::NotFound {
            role,
            name: name.to_owned(),
            program: self.program.clone(),
            source,
        })
    }
}

impl fmt::Display for ProgramCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Runs one child process at a time under a wall-clock deadline.
#[derive(Debug, Clone, Copy)]
pub struct ProcessRunner {
    deadline: Duration,
}

impl ProcessRunner {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Runs `cmd` with `input` as its stdin and captures stdout and stderr in memory.
    ///
    /// Only failures of the environment (spawn, pipes) are errors; timeouts and nonzero exits
    /// are reported through [`ExecutionOutcome::terminal_state`].
    pub async fn run(&self, cmd: &ProgramCommand, input: &[u8]) -> Result<ExecutionOutcome> {
        let comm_err = |source: io::Error| HarnessError::Communicate {
            program: cmd.program.clone(),
            source,
        };

        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();

        let start_at = Instant::now();
        let mut proc = Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HarnessError::Spawn {
                program: cmd.program.clone(),
                source,
            })?;

        let missing_pipe = |name: &str| comm_err(io::Error::new(ErrorKind::Other, name.to_owned()));
        let mut stdin = proc
            .stdin
            .take()
            .ok_or_else(|| missing_pipe("Failed to open stdin"))?;
        let mut stdout = proc
            .stdout
            .take()
            .ok_or_else(|| missing_pipe("Failed to open stdout"))?;
        let mut stderr = proc
            .stderr
            .take()
            .ok_or_else(|| missing_pipe("Failed to open stderr"))?;

        let res = {
            let fut_stdin = async move {
                match stdin.write_all(input).await {
                    // The child may exit without consuming its input.
                    Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
                    other => other,
                }
                // stdin is dropped here so the child sees EOF
            };
            let fut_stdout = stdout.read_to_end(&mut stdout_buf);
            let fut_stderr = stderr.read_to_end(&mut stderr_buf);
            let fut_exit_status = proc.wait();

            tokio::time::timeout(self.deadline, async {
                tokio::try_join!(fut_stdin, fut_stdout, fut_stderr, fut_exit_status)
            })
            .await
        };

        let outcome = match res {
            Err(_) => {
                proc.kill().await.unwrap_or_else(|e| {
                    log::warn!("Failed to kill timed out process {}: {:#}", cmd, e)
                });
                ExecutionOutcome {
                    exit_code: None,
                    wall_time: start_at.elapsed(),
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                    terminal_state: TerminalState::TimedOut,
                }
            }

            Ok(Err(e)) => return Err(comm_err(e)),

            Ok(Ok((_, _, _, exit_status))) => {
                let wall_time = start_at.elapsed();
                let terminal_state = if exit_status.success() {
                    TerminalState::Completed
                } else {
                    TerminalState::CrashedNonZero
                };
                ExecutionOutcome {
                    exit_code: exit_status.code(),
                    wall_time,
                    stdout: stdout_buf,
                    stderr: stderr_buf,
                    terminal_state,
                }
            }
        };

        log::trace!(
            "{} finished: {:?} in {}ms",
            cmd,
            outcome.terminal_state,
            outcome.wall_time_ms()
        );
        Ok(outcome)
    }
}
