use std::collections::HashSet;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::runner::ProgramCommand;

/// Largest seed handed to a generator; seeds are 31-bit unsigned.
pub const MAX_SEED: u32 = (1 << 31) - 1;

/// A named program: the reference solution or a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Program {
    pub name: String,
    pub command: ProgramCommand,
}

impl Program {
    pub fn new(name: impl Into<String>, command: ProgramCommand) -> Self {
        Self {
            name: name.into(),
            command,
        }
    }
}

/// A test-data generator parameterized only by its seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generator {
    pub name: String,
    pub command: ProgramCommand,
    /// Flag placed before the seed. `None` passes the seed as a bare trailing argument.
    pub seed_flag: Option<String>,
}

impl Generator {
    pub const DEFAULT_SEED_FLAG: &str = "--seed";

    pub fn new(name: impl Into<String>, command: ProgramCommand) -> Self {
        Self {
            name: name.into(),
            command,
            seed_flag: Some(Self::DEFAULT_SEED_FLAG.to_owned()),
        }
    }

    pub fn seed_flag(mut self, flag: Option<String>) -> Self {
        self.seed_flag = flag.filter(|f| !f.is_empty());
        self
    }

    pub fn command_for(&self, seed: u32) -> ProgramCommand {
        let cmd = self.command.clone();
        match &self.seed_flag {
            Some(flag) => cmd.arg(flag.as_str()).arg(seed.to_string()),
            None => cmd.arg(seed.to_string()),
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SeedPolicy {
    /// Test `i` gets seed `i - 1`.
    Sequential,
    #[default]
    Random,
}

/// Hands out one distinct seed per test index.
#[derive(Debug)]
pub struct SeedSource {
    policy: SeedPolicy,
    rng: StdRng,
    used: HashSet<u32>,
}

impl SeedSource {
    pub fn new(policy: SeedPolicy) -> Self {
        Self {
            policy,
            rng: StdRng::from_entropy(),
            used: HashSet::new(),
        }
    }

    pub fn policy(&self) -> SeedPolicy {
        self.policy
    }

    /// `index` is 1-based.
    pub fn seed_for(&mut self, index: u32) -> u32 {
        match self.policy {
            SeedPolicy::Sequential => index.saturating_sub(1) & MAX_SEED,
            SeedPolicy::Random => loop {
                let seed = self.rng.gen_range(0..=MAX_SEED);
                if self.used.insert(seed) {
                    break seed;
                }
            },
        }
    }
}
