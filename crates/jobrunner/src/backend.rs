//! Backend selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RunnerError;

/// The kind of batch scheduler (or local fallback) jobs are sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BackendType {
    /// Sun/Univa/Son of Grid Engine (`qsub -terse`).
    Grid,
    /// SLURM (`sbatch --parsable`).
    Slurm,
    /// Torque / PBS (`qsub`).
    Torque,
    /// Local execution through a bounded process pool.
    #[default]
    Local,
}

impl BackendType {
    /// All accepted backend names.
    pub const NAMES: [&'static str; 4] = ["grid", "slurm", "torque", "local"];

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Grid => "grid",
            BackendType::Slurm => "slurm",
            BackendType::Torque => "torque",
            BackendType::Local => "local",
        }
    }

    /// Whether jobs are handed to an external scheduler.
    pub fn is_remote(&self) -> bool {
        !matches!(self, BackendType::Local)
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "grid" => Ok(BackendType::Grid),
            "slurm" => Ok(BackendType::Slurm),
            "torque" => Ok(BackendType::Torque),
            "local" => Ok(BackendType::Local),
            _ => Err(RunnerError::Configuration(
                r#"hpc_type must be one of: "grid", "slurm", "torque", "local""#.to_string(),
            )),
        }
    }
}

impl TryFrom<String> for BackendType {
    type Error = RunnerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BackendType> for String {
    fn from(value: BackendType) -> Self {
        value.as_str().to_string()
    }
}
