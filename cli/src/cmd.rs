pub mod checkers;
pub mod init;
pub mod run;

use std::io::Write as _;

use colored::Colorize as _;
use kstress_core::style::ColorTheme as _;

#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct GlobalArgs {
    #[command(subcommand)]
    pub subcmd: Subcommand,

    /// Print debug logs (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, clap::Subcommand)]
pub enum Subcommand {
    Checkers(checkers::Args),
    Init(init::Args),

    #[command(alias("r"))]
    Run(run::Args),
}

pub type SubcmdResult = anyhow::Result<()>;

impl GlobalArgs {
    pub async fn exec_subcmd(&self) -> SubcmdResult {
        use Subcommand::*;
        match &self.subcmd {
            Checkers(args) => checkers::exec(args, self),
            Init(args) => init::exec(args, self),
            Run(args) => run::exec(args, self).await,
        }
    }

    pub fn init_logger(&self) {
        let level = if self.verbose { "debug" } else { "info" };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
            .format(|buf, record| {
                let level = record.level();
                writeln!(
                    buf,
                    "{} {}",
                    format!("[{}]", level).color(level.color()),
                    record.args()
                )
            })
            .init();
    }
}
