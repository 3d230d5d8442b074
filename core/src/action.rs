pub mod error {
    #[allow(unused_imports)]
    pub(crate) use anyhow::{anyhow, bail, ensure, Context as _};
    pub use anyhow::{Error, Result};
}
use std::path::{Path, PathBuf};
use std::time::Duration;

use colored::Colorize;
use error::*;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::process::Command;

use crate::config::Config;
use crate::report::{self, JsonReport, RunParameters};
use crate::style;
use crate::testing::{
    Batch, CandidateFailure, StressObserver, StressSession, StressSummary, TestCaseResult,
    TestExecutor,
};

/// Writes the example `kstress.toml` into `dir`. Never overwrites an existing config.
pub fn init_stress_dir(dir: impl AsRef<Path>) -> Result<PathBuf> {
    let path = dir.as_ref().join(Config::FILENAME);
    fsutil::write_new_with_mkdir(&path, Config::example_toml())
        .context("Failed to write example config")?;
    Ok(path)
}

/// Runs every configured compile command through `shell -c`, in the config's directory.
pub async fn compile_programs(cfg: &Config) -> Result<()> {
    for prog in cfg.programs() {
        let Some(cmd) = &prog.compile else {
            continue;
        };
        log::info!("Compiling {}", prog.name);
        log::info!("{}", cmd);
        compile(&cfg.stress.shell, &cfg.source_config_dir, cmd)
            .await
            .with_context(|| format!("Failed to compile '{}'", prog.name))?;
    }
    Ok(())
}

async fn compile(shell: &Path, dir: &Path, cmd: &str) -> Result<()> {
    let mut command = Command::new(shell);
    command.args(["-c", cmd]);
    if !dir.as_os_str().is_empty() {
        command.current_dir(dir);
    }
    let status = command.status().await.with_context(|| {
        format!("Failed to spawn '{} -c {}'", shell.to_string_lossy(), cmd)
    })?;

    match status.code() {
        Some(0) => Ok(()),
        Some(code) => bail!("Compile error: exitcode={}", code),
        None => bail!("Failed to compile: process terminated by signal"),
    }
}

/// Checks that every program the run needs can be executed, before any test starts.
pub fn preflight(cfg: &Config) -> Result<()> {
    let roles = [("test generator", &cfg.generator), ("reference solution", &cfg.reference)]
        .into_iter()
        .chain(cfg.candidates.iter().map(|c| ("candidate", c)));

    for (role, prog) in roles {
        let exe = prog.to_program()?.command.resolve_executable(role, &prog.name)?;
        log::debug!("{} '{}': {}", role, prog.name, exe.to_string_lossy());
    }
    if let Some(path) = &cfg.checker.path {
        crate::testing::ProgramCommand::new(path).resolve_executable("checker", "checker")?;
    }
    Ok(())
}

pub fn build_session(cfg: &Config) -> Result<StressSession> {
    let executor = TestExecutor::new(
        cfg.build_generator()?,
        cfg.reference.to_program()?,
        cfg.build_checker()?,
        cfg.time_limit(),
    );
    let candidates = cfg
        .candidates
        .iter()
        .map(|c| c.to_program())
        .collect::<Result<Vec<_>>>()?;

    Ok(StressSession::new(executor, candidates, cfg.stress.seed)
        .include_reference_in_stats(cfg.stress.include_reference_in_stats))
}

pub fn run_parameters(cfg: &Config) -> RunParameters {
    RunParameters {
        test_count: cfg.stress.test_count,
        worker_count: cfg.stress.worker_count,
        time_limit_sec: cfg.stress.time_limit,
        seed: cfg.stress.seed,
        checker: cfg.checker.kind,
    }
}

/// Compiles (if configured), checks the programs, runs the stress test with a progress bar, and
/// writes the result files and failure artifacts.
pub async fn do_stress(cfg: &Config) -> Result<StressSummary> {
    cfg.validate()?;

    if cfg.stress.compile_before_run {
        compile_programs(cfg).await?;
    }
    preflight(cfg)?;

    let s = &cfg.stress;
    let artifacts_dir = (!s.status_only).then(|| s.log_dir.clone());
    if let Some(dir) = &artifacts_dir {
        fsutil::recreate_dir(dir).context("Failed to prepare the log dir")?;
    }

    log::info!(
        "Running {} tests on {} workers (time limit {}s, {} checker, {} seeds)",
        s.test_count,
        s.worker_count,
        s.time_limit,
        cfg.checker.kind,
        s.seed,
    );

    let mut session = build_session(cfg)?;
    let mut observer = ConsoleObserver::new(s.test_count, artifacts_dir);
    let summary = session
        .run_all(s.test_count, s.worker_count, &mut observer)
        .await;
    observer.bar.finish_and_clear();
    let summary = summary?;
    if let Some(e) = observer.artifact_error {
        return Err(e);
    }

    for (failure, result) in &observer.first_failures {
        style::print_failure_detail(failure, result);
    }
    println!();
    style::print_summary(&summary);

    report::write_result_file(&s.result_file, &summary.rows)
        .context("Failed to write the result file")?;
    log::info!("Result written to {}", s.result_file.to_string_lossy());

    if let Some(path) = &s.json_result_file {
        let params = run_parameters(cfg);
        JsonReport::new(&params, &summary)
            .write(path)
            .context("Failed to write the JSON report")?;
        log::info!("JSON report written to {}", path.to_string_lossy());
    }

    Ok(summary)
}

struct ConsoleObserver {
    bar: ProgressBar,
    artifacts_dir: Option<PathBuf>,
    first_failures: Vec<(CandidateFailure, TestCaseResult)>,
    artifact_error: Option<Error>,
}

impl ConsoleObserver {
    fn new(test_count: u32, artifacts_dir: Option<PathBuf>) -> Self {
        let style = ProgressStyle::default_bar()
            .template("{spinner} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap();
        let bar = ProgressBar::new(test_count as u64).with_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));
        Self {
            bar,
            artifacts_dir,
            first_failures: Vec::new(),
            artifact_error: None,
        }
    }
}

impl StressObserver for ConsoleObserver {
    fn on_batch_start(&mut self, batch: &Batch, live_candidates: usize) {
        self.bar.set_message(format!(
            "batch {} ({} solution{} left)",
            batch.number,
            live_candidates,
            if live_candidates == 1 { "" } else { "s" }
        ));
    }

    fn on_test_finished(&mut self, _result: &TestCaseResult) {
        self.bar.inc(1);
    }

    fn on_candidate_failed(&mut self, failure: &CandidateFailure, result: &TestCaseResult) {
        self.bar.println(style::failure_line(failure));

        if let Some(dir) = &self.artifacts_dir {
            match report::write_failure_artifacts(dir, failure, result) {
                Ok(path) => log::debug!("Artifacts saved in {}", path.to_string_lossy()),
                Err(e) => {
                    let e = Error::new(e).context(format!(
                        "Failed to save the failing test of '{}'",
                        failure.candidate
                    ));
                    self.artifact_error.get_or_insert(e);
                }
            }
        }
        self.first_failures.push((failure.clone(), result.clone()));
    }

    fn on_early_stop(&mut self, next_test: u32) {
        self.bar.println(
            format!("Every solution failed; tests from {} on are skipped", next_test)
                .dimmed()
                .to_string(),
        );
    }
}
