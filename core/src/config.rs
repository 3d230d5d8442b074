use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::result::Result as StdResult;
use std::time::Duration;

use anyhow::{bail, ensure, Context as _};
use rust_embed::RustEmbed;
use serde::Deserialize;

use crate::testing::{
    checker::{Checker, CheckerKind},
    Generator, Program, ProgramCommand, SeedPolicy, MAX_SEED,
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    /// Directory of the file this config was read from. Relative paths are resolved against it.
    #[serde(skip)]
    pub source_config_dir: PathBuf,
    pub stress: StressConfig,
    pub checker: CheckerConfig,
    pub generator: ProgramConfig,
    pub reference: ProgramConfig,
    #[serde(default)]
    pub candidates: Vec<ProgramConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StressConfig {
    pub test_count: u32,
    pub worker_count: u32,
    /// Seconds.
    pub time_limit: f64,
    #[serde(default)]
    pub seed: SeedPolicy,
    #[serde(default = "default_seed_flag")]
    pub seed_flag: String,
    #[serde(default)]
    pub include_reference_in_stats: bool,
    #[serde(default)]
    pub status_only: bool,
    pub log_dir: PathBuf,
    pub result_file: PathBuf,
    pub json_result_file: Option<PathBuf>,
    #[serde(default = "default_shell")]
    pub shell: PathBuf,
    #[serde(default)]
    pub compile_before_run: bool,
}

impl StressConfig {
    /// One distinct 31-bit seed per test.
    pub const MAX_TEST_COUNT: u32 = MAX_SEED + 1;
    /// Seconds.
    pub const MAX_TIME_LIMIT: f64 = 24.0 * 60.0 * 60.0;
}

fn default_seed_flag() -> String {
    Generator::DEFAULT_SEED_FLAG.to_owned()
}

fn default_shell() -> PathBuf {
    PathBuf::from("/bin/sh")
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckerConfig {
    pub kind: CheckerKind,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProgramConfig {
    pub name: String,
    /// Executable followed by its arguments.
    pub run: Vec<String>,
    /// Shell command run before the stress test when `compile_before_run` is on.
    pub compile: Option<String>,
}

/// Values given on the command line, taking precedence over the file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub test_count: Option<u32>,
    pub worker_count: Option<u32>,
    pub time_limit: Option<f64>,
    pub seed: Option<SeedPolicy>,
    pub checker: Option<CheckerKind>,
    pub status_only: bool,
}

#[derive(RustEmbed)]
#[folder = "assets/"]
struct Asset;

impl Config {
    pub const FILENAME: &str = "kstress.toml";

    pub fn example_toml() -> String {
        let file = Asset::get(Self::FILENAME).unwrap();
        std::str::from_utf8(file.data.as_ref()).unwrap().to_owned()
    }

    pub fn from_toml(s: &str) -> StdResult<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn from_toml_file(filepath: PathBuf) -> anyhow::Result<Self> {
        let toml = fsutil::read_to_string(&filepath).context("Cannot read a file")?;
        let mut cfg = Self::from_toml(&toml)
            .with_context(|| format!("Invalid config TOML: {:?}", filepath))?;
        let dir = filepath.parent().unwrap_or(Path::new("."));
        cfg.resolve_paths(dir);
        log::debug!("Loaded config from {:?}", filepath);
        Ok(cfg)
    }

    /// Find config file ancestor dirs, including current dir.
    pub fn find_file_in_ancestors(cur_dir: impl AsRef<Path>) -> anyhow::Result<PathBuf> {
        let cur_dir = cur_dir.as_ref();
        cur_dir
            .ancestors()
            .map(|dir| dir.join(Self::FILENAME))
            .find(|path| path.is_file())
            .with_context(|| {
                format!(
                    "Not in a kstress dir: Cannot find '{}' (try `kstress init`)",
                    Self::FILENAME
                )
            })
    }

    pub fn from_file_finding_in_ancestors(cur_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config_filepath = Config::find_file_in_ancestors(cur_dir)?;
        Self::from_toml_file(config_filepath)
    }

    fn resolve_paths(&mut self, dir: &Path) {
        self.source_config_dir = dir.to_owned();

        let s = &mut self.stress;
        s.log_dir = fsutil::resolve_relative_to(dir, &s.log_dir);
        s.result_file = fsutil::resolve_relative_to(dir, &s.result_file);
        if let Some(json) = &mut s.json_result_file {
            *json = fsutil::resolve_relative_to(dir, &json);
        }
        if let Some(path) = &mut self.checker.path {
            *path = fsutil::resolve_relative_to(dir, &path);
        }

        let programs = std::iter::once(&mut self.generator)
            .chain(std::iter::once(&mut self.reference))
            .chain(self.candidates.iter_mut());
        for prog in programs {
            // Bare names ("python3") are looked up in PATH, anything with a separator is a path.
            if let Some(exe) = prog.run.first_mut() {
                if exe.contains('/') {
                    *exe = fsutil::resolve_relative_to(dir, &exe)
                        .to_string_lossy()
                        .into_owned();
                }
            }
        }
    }

    pub fn apply(&mut self, o: &Overrides) {
        let s = &mut self.stress;
        if let Some(n) = o.test_count {
            s.test_count = n;
        }
        if let Some(n) = o.worker_count {
            s.worker_count = n;
        }
        if let Some(t) = o.time_limit {
            s.time_limit = t;
        }
        if let Some(seed) = o.seed {
            s.seed = seed;
        }
        if let Some(kind) = o.checker {
            self.checker.kind = kind;
        }
        s.status_only |= o.status_only;
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let s = &self.stress;
        ensure!(s.worker_count >= 1, "stress.worker_count must be at least 1");
        ensure!(
            s.test_count <= StressConfig::MAX_TEST_COUNT,
            "stress.test_count must be at most {}, got {}",
            StressConfig::MAX_TEST_COUNT,
            s.test_count
        );
        ensure!(
            s.time_limit.is_finite() && s.time_limit > 0.0,
            "stress.time_limit must be a positive number of seconds, got {}",
            s.time_limit
        );
        ensure!(
            s.time_limit <= StressConfig::MAX_TIME_LIMIT,
            "stress.time_limit must be at most {} seconds, got {}",
            StressConfig::MAX_TIME_LIMIT,
            s.time_limit
        );
        if self.checker.kind.needs_program() && self.checker.path.is_none() {
            bail!("checker.path is required for the '{}' checker", self.checker.kind);
        }

        let mut names = HashSet::new();
        for prog in self.programs() {
            ensure!(
                !prog.run.is_empty(),
                "Program '{}' has an empty `run` command",
                prog.name
            );
            ensure!(
                fsutil::is_plain_file_name(&prog.name),
                "Invalid program name '{}': it names a directory under stress.log_dir, \
                 so it must be non-empty, not '.' or '..', and contain no '/'",
                prog.name
            );
            ensure!(
                names.insert(prog.name.as_str()),
                "Duplicate program name '{}'",
                prog.name
            );
        }
        Ok(())
    }

    /// Generator, reference, then candidates in file order.
    pub fn programs(&self) -> impl Iterator<Item = &ProgramConfig> {
        [&self.generator, &self.reference]
            .into_iter()
            .chain(&self.candidates)
    }

    pub fn time_limit(&self) -> Duration {
        Duration::from_secs_f64(self.stress.time_limit)
    }

    pub fn build_generator(&self) -> anyhow::Result<Generator> {
        let prog = self.generator.to_program()?;
        Ok(Generator::new(prog.name, prog.command).seed_flag(Some(self.stress.seed_flag.clone())))
    }

    pub fn build_checker(&self) -> anyhow::Result<Checker> {
        let program = self.checker.path.as_ref().map(ProgramCommand::new);
        Checker::new(self.checker.kind, program, self.time_limit())
            .with_context(|| format!("checker.path is required for the '{}' checker", self.checker.kind))
    }
}

impl ProgramConfig {
    pub fn to_program(&self) -> anyhow::Result<Program> {
        let command = ProgramCommand::from_argv(&self.run)
            .with_context(|| format!("Program '{}' has an empty `run` command", self.name))?;
        Ok(Program::new(&self.name, command))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn example_toml_should_be_parsable() {
        let toml = Config::example_toml();
        let cfg = dbg!(Config::from_toml(&toml)).unwrap();

        let Config {
            source_config_dir,
            stress,
            checker,
            generator,
            reference,
            candidates,
        } = cfg.clone();

        assert_eq!(source_config_dir, PathBuf::new());
        assert_eq!(stress.test_count, 100);
        assert_eq!(stress.worker_count, 4);
        assert_eq!(stress.time_limit, 2.0);
        assert_eq!(stress.seed, SeedPolicy::Random);
        assert_eq!(stress.seed_flag, "--seed");
        assert_eq!(stress.shell, Path::new("/bin/sh"));
        assert_eq!(stress.compile_before_run, true);
        assert_eq!(checker.kind, CheckerKind::Token);
        assert_eq!(generator.run, ["./gen"]);
        assert_eq!(reference.name, "main");
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].compile, None);

        cfg.validate().unwrap();
    }

    const MINIMAL: &str = r#"
        [stress]
        test_count = 10
        worker_count = 2
        time_limit = 0.5
        log_dir = "logs"
        result_file = "out/result.txt"

        [checker]
        kind = "external"
        path = "./chk"

        [generator]
        name = "gen"
        run = ["./bin/gen", "10"]

        [reference]
        name = "main"
        run = ["/usr/bin/main"]

        [[candidates]]
        name = "py"
        run = ["python3", "a.py"]
    "#;

    #[test]
    fn defaults_and_relative_paths() {
        let mut cfg = Config::from_toml(MINIMAL).unwrap();
        cfg.resolve_paths(Path::new("/work"));

        assert_eq!(cfg.stress.seed, SeedPolicy::Random);
        assert_eq!(cfg.stress.seed_flag, "--seed");
        assert_eq!(cfg.stress.include_reference_in_stats, false);
        assert_eq!(cfg.stress.json_result_file, None);
        assert_eq!(cfg.stress.log_dir, Path::new("/work/logs"));
        assert_eq!(cfg.stress.result_file, Path::new("/work/out/result.txt"));
        assert_eq!(cfg.checker.path.as_deref(), Some(Path::new("/work/chk")));
        assert_eq!(cfg.generator.run, ["/work/bin/gen", "10"]);
        assert_eq!(cfg.reference.run, ["/usr/bin/main"]);
        assert_eq!(cfg.candidates[0].run, ["python3", "a.py"]);
        assert_eq!(cfg.time_limit(), Duration::from_millis(500));
    }

    #[test]
    fn overrides_win_over_the_file() {
        let mut cfg = Config::from_toml(MINIMAL).unwrap();
        cfg.apply(&Overrides {
            test_count: Some(3),
            checker: Some(CheckerKind::Line),
            status_only: true,
            ..Default::default()
        });
        assert_eq!(cfg.stress.test_count, 3);
        assert_eq!(cfg.stress.worker_count, 2);
        assert_eq!(cfg.checker.kind, CheckerKind::Line);
        assert!(cfg.stress.status_only);
    }

    #[test]
    fn validation_errors() {
        let base = Config::from_toml(MINIMAL).unwrap();
        base.validate().unwrap();

        let mut cfg = base.clone();
        cfg.stress.worker_count = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = base.clone();
        cfg.stress.time_limit = f64::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = base.clone();
        cfg.checker.path = None;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("checker.path"), "{}", err);

        let mut cfg = base.clone();
        cfg.candidates[0].name = "main".to_owned();
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.to_string(), "Duplicate program name 'main'");

        let mut cfg = base;
        cfg.candidates[0].run.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn program_names_must_be_plain_file_names() {
        let base = Config::from_toml(MINIMAL).unwrap();
        for bad in ["", ".", "..", "../src", "sub/dir", "/tmp"] {
            let mut cfg = base.clone();
            cfg.candidates[0].name = bad.to_owned();
            let err = cfg.validate().unwrap_err();
            assert!(err.to_string().starts_with("Invalid program name"), "{:?}: {}", bad, err);
        }
        let mut cfg = base;
        cfg.generator.name = "..".to_owned();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_count_and_time_limit_are_bounded() {
        let base = Config::from_toml(MINIMAL).unwrap();

        let mut cfg = base.clone();
        cfg.stress.test_count = StressConfig::MAX_TEST_COUNT;
        cfg.validate().unwrap();
        cfg.stress.test_count = u32::MAX;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("stress.test_count"), "{}", err);

        let mut cfg = base;
        cfg.stress.time_limit = StressConfig::MAX_TIME_LIMIT;
        cfg.validate().unwrap();
        cfg.stress.time_limit = 1e30;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("stress.time_limit"), "{}", err);
    }

    #[test]
    fn builds_engine_types() {
        let mut cfg = Config::from_toml(MINIMAL).unwrap();
        cfg.stress.seed_flag = String::new();
        let gen = cfg.build_generator().unwrap();
        assert_eq!(gen.seed_flag, None);
        assert_eq!(gen.command_for(5).args, ["10", "5"]);

        assert!(matches!(cfg.build_checker().unwrap(), Checker::External { .. }));

        let prog = cfg.candidates[0].to_program().unwrap();
        assert_eq!(prog.command.program(), Path::new("python3"));
    }
}
