use colored::Colorize as _;
use kstress_core::testing::CheckerKind;
use strum::IntoEnumIterator as _;

use super::{GlobalArgs, SubcmdResult};

#[derive(Debug, clap::Args)]
pub struct Args {}

pub fn exec(_: &Args, _: &GlobalArgs) -> SubcmdResult {
    for kind in CheckerKind::iter() {
        println!("{:<12} {}", kind.to_string().bold(), kind.description());
    }
    Ok(())
}
