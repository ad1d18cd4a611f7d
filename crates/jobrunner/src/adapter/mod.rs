//! Scheduler adapters: translate a job description into a submission command line.
//!
//! Builders are pure. Everything environment-dependent (working directory,
//! site-wide extra options) arrives through [`BuildContext`]. Flag order is
//! fixed per backend and is part of the contract.

mod grid;
mod slurm;
mod torque;

use std::path::{Path, PathBuf};

pub use grid::GridAdapter;
pub use slurm::SlurmAdapter;
pub use torque::TorqueAdapter;

use crate::backend::BackendType;
use crate::error::{RunnerError, RunnerResult};
use crate::job::{ArrayRequest, DependencySet, JobDescriptor};

/// Submission-time facts supplied by the caller of a builder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildContext {
    /// Directory the job should run in. Only Torque puts it on the command line.
    pub working_dir: PathBuf,

    /// Options appended to every submission, before any per-job options.
    pub extra_params: Option<String>,
}

impl BuildContext {
    /// Create a context for the given working directory.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            extra_params: None,
        }
    }

    /// Set site-wide extra submission options.
    pub fn with_extra_params(mut self, extra_params: Option<String>) -> Self {
        self.extra_params = extra_params;
        self
    }
}

/// Capability shared by every remote scheduler adapter.
pub trait CommandBuilder {
    /// Backend this adapter targets.
    fn backend(&self) -> BackendType;

    /// Environment variable the scheduler sets to the subtask index.
    fn subtask_env_var(&self) -> &'static str;

    /// Log path for an array job, with the scheduler's index token appended.
    fn array_log_file(&self, log_file: &Path) -> PathBuf;

    /// Turn a command into the script piped to the submission tool.
    fn job_script(&self, command: &str) -> String {
        format!("{command}\n")
    }

    /// Build the submission command line.
    ///
    /// `array` turns the job into an array job. `job.log_file` is used as given.
    fn build(
        &self,
        job: &JobDescriptor,
        deps: &DependencySet,
        array: Option<ArrayRequest>,
        ctx: &BuildContext,
    ) -> RunnerResult<String>;
}

/// Closed set of remote adapters, chosen once from the configured backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerAdapter {
    Grid(GridAdapter),
    Slurm(SlurmAdapter),
    Torque(TorqueAdapter),
}

impl SchedulerAdapter {
    /// Select the adapter for a backend. Local mode has none.
    pub fn for_backend(backend: BackendType) -> RunnerResult<Self> {
        match backend {
            BackendType::Grid => Ok(SchedulerAdapter::Grid(GridAdapter)),
            BackendType::Slurm => Ok(SchedulerAdapter::Slurm(SlurmAdapter)),
            BackendType::Torque => Ok(SchedulerAdapter::Torque(TorqueAdapter)),
            BackendType::Local => Err(RunnerError::UnsupportedBackend {
                operation: "build",
                backend: backend.to_string(),
            }),
        }
    }

    fn inner(&self) -> &dyn CommandBuilder {
        match self {
            SchedulerAdapter::Grid(a) => a,
            SchedulerAdapter::Slurm(a) => a,
            SchedulerAdapter::Torque(a) => a,
        }
    }
}

impl CommandBuilder for SchedulerAdapter {
    fn backend(&self) -> BackendType {
        self.inner().backend()
    }

    fn subtask_env_var(&self) -> &'static str {
        self.inner().subtask_env_var()
    }

    fn array_log_file(&self, log_file: &Path) -> PathBuf {
        self.inner().array_log_file(log_file)
    }

    fn job_script(&self, command: &str) -> String {
        self.inner().job_script(command)
    }

    fn build(
        &self,
        job: &JobDescriptor,
        deps: &DependencySet,
        array: Option<ArrayRequest>,
        ctx: &BuildContext,
    ) -> RunnerResult<String> {
        self.inner().build(job, deps, array, ctx)
    }
}

/// Append site-wide, then per-job, extra options.
fn push_extra_params(command: &mut String, job: &JobDescriptor, ctx: &BuildContext) {
    for params in [&ctx.extra_params, &job.extra_params].into_iter().flatten() {
        if !params.is_empty() {
            command.push_str(&format!(" {params}"));
        }
    }
}

/// Append `suffix` to the file name of `path`.
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}
