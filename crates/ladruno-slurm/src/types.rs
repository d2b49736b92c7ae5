//! SLURM job types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// SLURM job identifier as printed by sbatch.
///
/// Only ever used as an opaque token for polling and for the archive
/// manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Program names used to talk to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlurmCommands {
    /// Submission command (sbatch)
    pub submit: String,

    /// Queue status command (squeue)
    pub queue: String,
}

impl Default for SlurmCommands {
    fn default() -> Self {
        Self {
            submit: "sbatch".to_string(),
            queue: "squeue".to_string(),
        }
    }
}
