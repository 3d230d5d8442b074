use std::time::Duration;

use super::{
    checker::Checker,
    error::*,
    result::*,
    runner::ProcessRunner,
    testcase::{Generator, Program},
};

/// Runs one test case: generate, answer with the reference, then judge every live candidate.
#[derive(Debug)]
pub struct TestExecutor {
    generator: Generator,
    reference: Program,
    checker: Checker,
    runner: ProcessRunner,
}

impl TestExecutor {
    pub fn new(generator: Generator, reference: Program, checker: Checker, time_limit: Duration) -> Self {
        Self {
            generator,
            reference,
            checker,
            runner: ProcessRunner::new(time_limit),
        }
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub fn reference(&self) -> &Program {
        &self.reference
    }

    pub fn time_limit(&self) -> Duration {
        self.runner.deadline()
    }

    pub async fn execute(
        &self,
        index: u32,
        seed: u32,
        candidates: &[Program],
    ) -> Result<TestCaseResult> {
        let gen_cmd = self.generator.command_for(seed);
        log::debug!("Test {}: {}", index, gen_cmd);

        let generated = self.runner.run(&gen_cmd, &[]).await?;
        ensure_trusted_completed("test generator", &self.generator.name, index, &generated)?;
        let input = generated.stdout;

        let reference = self.runner.run(&self.reference.command, &input).await?;
        ensure_trusted_completed("reference solution", &self.reference.name, index, &reference)?;
        let reference_time_ms = reference.wall_time_ms();
        let answer = reference.stdout;

        let mut results = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let res = self.run_candidate(index, candidate, &input, &answer).await?;
            results.push(res);
        }

        Ok(TestCaseResult {
            index,
            seed,
            input,
            answer,
            reference_time_ms,
            candidates: results,
        })
    }

    async fn run_candidate(
        &self,
        index: u32,
        candidate: &Program,
        input: &[u8],
        answer: &[u8],
    ) -> Result<CandidateResult> {
        let res = self.runner.run(&candidate.command, input).await?;
        let wall_time_ms = res.wall_time_ms();

        let (verdict, comment, output) = match res.terminal_state {
            TerminalState::TimedOut => (
                Verdict::TimeLimitExceeded,
                format!(
                    "Time limit exceeded ({}ms)",
                    self.time_limit().as_millis()
                ),
                None,
            ),
            TerminalState::CrashedNonZero => (
                Verdict::RuntimeError,
                match res.exit_code {
                    Some(code) => format!("The solution terminated with code {}", code),
                    None => "The solution was killed by a signal".to_owned(),
                },
                None,
            ),
            TerminalState::Completed => {
                let checked = self
                    .checker
                    .check(input, answer, &res.stdout)
                    .await
                    .map_err(|source| HarnessError::Checker {
                        test_index: index,
                        source,
                    })?;
                (checked.verdict, checked.comment, Some(res.stdout))
            }
        };

        Ok(CandidateResult {
            candidate: candidate.name.clone(),
            verdict,
            wall_time_ms,
            comment,
            output,
        })
    }
}

/// The generator and the reference are trusted: any misbehavior aborts the run.
fn ensure_trusted_completed(
    role: &'static str,
    name: &str,
    test_index: u32,
    outcome: &ExecutionOutcome,
) -> Result<()> {
    let reason = match (outcome.terminal_state, outcome.exit_code) {
        (TerminalState::Completed, _) => return Ok(()),
        (TerminalState::TimedOut, _) => "timed out".to_owned(),
        (TerminalState::CrashedNonZero, Some(code)) => format!("exited with code {}", code),
        (TerminalState::CrashedNonZero, None) => "was killed by a signal".to_owned(),
    };
    Err(HarnessError::TrustedProgramFailed {
        role,
        name: name.to_owned(),
        reason,
        test_index,
        wall_time_ms: outcome.wall_time_ms(),
        stderr: String::from_utf8_lossy(&outcome.stderr).into_owned(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{checker::CheckerKind, runner::test::sh};

    const SUM: &str = "read a b; echo $((a + b))";

    fn executor(generator: &str, reference: &str, kind: CheckerKind) -> TestExecutor {
        let limit = Duration::from_millis(500);
        TestExecutor::new(
            Generator::new("gen", sh(generator)),
            Program::new("main", sh(reference)),
            Checker::new(kind, None, limit).unwrap(),
            limit,
        )
    }

    fn candidate(name: &str, script: &str) -> Program {
        Program::new(name, sh(script))
    }

    #[tokio::test]
    async fn judges_every_candidate_on_the_same_input() {
        let ex = executor("echo 5 7", SUM, CheckerKind::Token);
        let candidates = [
            candidate("a", SUM),
            candidate("b", "read a b; echo $((a + b + 1))"),
        ];

        let res = ex.execute(1, 0, &candidates).await.unwrap();

        assert_eq!(res.index, 1);
        assert_eq!(res.input, b"5 7\n");
        assert_eq!(res.answer, b"12\n");
        assert_eq!(res.candidates.len(), 2);

        let a = &res.candidates[0];
        assert_eq!(a.candidate, "a");
        assert_eq!(a.verdict, Verdict::Accepted);
        assert_eq!(a.output.as_deref(), Some(&b"12\n"[..]));

        let b = &res.candidates[1];
        assert_eq!(b.verdict, Verdict::WrongAnswer);
        assert_eq!(b.comment, "1st token differs: answer is '12', output is '13'");
        assert_eq!(b.output.as_deref(), Some(&b"13\n"[..]));
    }

    #[tokio::test]
    async fn generator_receives_the_seed() {
        // $0 = gen, $1 = --seed, $2 = the seed
        let ex = TestExecutor::new(
            Generator::new("gen", sh(r#"echo "$2""#).arg("gen")),
            Program::new("main", sh("cat")),
            Checker::Byte,
            Duration::from_secs(1),
        );
        let res = ex.execute(3, 1234, &[]).await.unwrap();
        assert_eq!(res.seed, 1234);
        assert_eq!(res.input, b"1234\n");
        assert_eq!(res.answer, b"1234\n");
    }

    #[tokio::test]
    async fn crashing_and_slow_candidates_never_reach_the_checker() {
        // The checker would abort the run if it were consulted.
        let limit = Duration::from_millis(300);
        let failing_checker = Checker::new(
            CheckerKind::External,
            Some(sh("exit 3").arg("checker")),
            limit,
        )
        .unwrap();
        let ex = TestExecutor::new(
            Generator::new("gen", sh("echo 5 7")),
            Program::new("main", sh(SUM)),
            failing_checker,
            limit,
        );
        let candidates = [
            candidate("slow", "sleep 2; echo 12"),
            candidate("crash", "echo 12; exit 139"),
        ];

        let res = ex.execute(1, 0, &candidates).await.unwrap();

        let slow = &res.candidates[0];
        assert_eq!(slow.verdict, Verdict::TimeLimitExceeded);
        assert_eq!(slow.output, None);
        assert!(slow.wall_time_ms >= 300);

        let crash = &res.candidates[1];
        assert_eq!(crash.verdict, Verdict::RuntimeError);
        assert_eq!(crash.output, None);
        assert_eq!(crash.comment, "The solution terminated with code 139");
    }

    #[tokio::test]
    async fn failing_generator_is_fatal() {
        let ex = executor("echo broken >&2; exit 1", SUM, CheckerKind::Token);
        let err = ex.execute(4, 0, &[candidate("a", SUM)]).await.unwrap_err();
        match err {
            HarnessError::TrustedProgramFailed {
                role,
                name,
                reason,
                test_index,
                stderr,
                ..
            } => {
                assert_eq!(role, "test generator");
                assert_eq!(name, "gen");
                assert_eq!(reason, "exited with code 1");
                assert_eq!(test_index, 4);
                assert_eq!(stderr, "broken\n");
            }
            e => panic!("unexpected error: {:?}", e),
        }
    }

    #[tokio::test]
    async fn slow_reference_is_fatal() {
        let ex = executor("echo 5 7", "sleep 2", CheckerKind::Token);
        let err = ex.execute(1, 0, &[]).await.unwrap_err();
        assert!(
            matches!(
                err,
                HarnessError::TrustedProgramFailed {
                    role: "reference solution",
                    ..
                }
            ),
            "{:?}",
            err
        );
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn checker_failure_is_fatal() {
        let limit = Duration::from_secs(1);
        let ex = TestExecutor::new(
            Generator::new("gen", sh("echo 5 7")),
            Program::new("main", sh(SUM)),
            Checker::new(
                CheckerKind::External,
                Some(sh("echo 'bad answer file' >&2; exit 3").arg("checker")),
                limit,
            )
            .unwrap(),
            limit,
        );
        let err = ex.execute(2, 0, &[candidate("a", SUM)]).await.unwrap_err();
        match err {
            HarnessError::Checker {
                test_index: 2,
                source: CheckerError::Failure(comment),
            } => assert_eq!(comment, "bad answer file\n"),
            e => panic!("unexpected error: {:?}", e),
        }
    }

    #[tokio::test]
    async fn candidate_killed_by_signal_is_a_runtime_error() {
        let ex = executor("echo 5 7", SUM, CheckerKind::Token);
        let res = ex
            .execute(1, 0, &[candidate("killed", "kill -9 $$")])
            .await
            .unwrap();

        let killed = &res.candidates[0];
        assert_eq!(killed.verdict, Verdict::RuntimeError);
        assert_eq!(killed.comment, "The solution was killed by a signal");
        assert_eq!(killed.output, None);
    }
}
