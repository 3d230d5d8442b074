pub mod action;
pub mod config;
pub mod report;
pub mod style;
pub mod testing;

pub use crate::config::Config;
