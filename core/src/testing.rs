pub mod checker;
pub mod error;
pub mod executor;
pub mod result;
pub mod runner;
pub mod scheduler;
pub mod stats;
pub mod testcase;

pub use checker::{CheckOutcome, Checker, CheckerKind};
pub use executor::TestExecutor;
pub use result::*;
pub use runner::*;
pub use scheduler::*;
pub use stats::*;
pub use testcase::*;
