use std::path::PathBuf;

use kstress_core::{
    action,
    config::{Config, Overrides},
    testing::{CheckerKind, SeedPolicy},
};

use super::{GlobalArgs, SubcmdResult};
use crate::util;

#[derive(Debug, clap::Args)]
pub struct Args {
    /// Config file (default: kstress.toml in the current dir or its ancestors)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(short = 'n', long)]
    pub tests: Option<u32>,

    #[arg(short = 'j', long)]
    pub workers: Option<u32>,

    /// Seconds
    #[arg(short = 't', long)]
    pub time_limit: Option<f64>,

    /// Write no failure artifacts
    #[arg(short, long)]
    pub status_only: bool,

    #[arg(long)]
    pub seed: Option<SeedPolicy>,

    #[arg(long)]
    pub checker: Option<CheckerKind>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            test_count: self.tests,
            worker_count: self.workers,
            time_limit: self.time_limit,
            seed: self.seed,
            checker: self.checker,
            status_only: self.status_only,
        }
    }
}

pub async fn exec(args: &Args, _global_args: &GlobalArgs) -> SubcmdResult {
    let mut cfg = match &args.config {
        Some(path) => Config::from_toml_file(path.clone())?,
        None => Config::from_file_finding_in_ancestors(util::current_dir())?,
    };
    cfg.apply(&args.overrides());

    let summary = action::do_stress(&cfg).await?;
    if !summary.all_accepted() {
        std::process::exit(2);
    }
    Ok(())
}
