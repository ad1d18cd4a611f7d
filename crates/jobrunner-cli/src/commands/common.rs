//! Shared helpers for CLI commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use jobrunner::{ArrayJobSpec, DependencySet, JobDescriptor, JobRunner, ResourceSpec, RunnerConfig};

/// Options common to `run` and `run-array`.
#[derive(Args, Debug)]
pub struct JobOptions {
    /// Job name shown by the scheduler
    #[arg(short, long)]
    pub name: String,

    /// Log file for the combined stdout and stderr of the job
    #[arg(short, long)]
    pub log: PathBuf,

    /// Wait for this job to finish (repeatable)
    #[arg(long, value_name = "JOB_ID")]
    pub after: Vec<String>,

    /// Wait for this array job to finish (repeatable)
    #[arg(long, value_name = "JOB_ID")]
    pub after_array: Vec<String>,

    /// CPU threads per task
    #[arg(short, long, default_value = "1")]
    pub threads: u32,

    /// Grid Engine parallel environment, required with more than one thread
    #[arg(long)]
    pub parallel_environment: Option<String>,

    /// Wall clock limit (HH:MM:SS)
    #[arg(long, value_name = "HH:MM:SS")]
    pub time: Option<String>,

    /// Request exclusive use of the node (SLURM only)
    #[arg(long)]
    pub exclusive: bool,

    /// Send job output to the log file only
    #[arg(short, long)]
    pub quiet: bool,

    /// Extra options passed verbatim to the submission tool
    #[arg(long, allow_hyphen_values = true)]
    pub extra_params: Option<String>,

    /// Command to run
    #[arg(last = true, required = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl JobOptions {
    /// Build the job description from the parsed options.
    pub fn descriptor(&self) -> JobDescriptor {
        let mut resources = ResourceSpec::default().with_threads(self.threads);
        if let Some(ref env) = self.parallel_environment {
            resources = resources.with_parallel_environment(env);
        }
        if let Some(ref time) = self.time {
            resources = resources.with_wall_clock_limit(time);
        }
        if self.exclusive {
            resources = resources.exclusive();
        }

        let mut job = JobDescriptor::new(&self.name, self.command.join(" "), &self.log)
            .with_resources(resources)
            .quiet(self.quiet);
        if let Some(ref params) = self.extra_params {
            job = job.with_extra_params(params);
        }
        job
    }

    /// Dependencies in the order given on the command line.
    pub fn dependencies(&self) -> DependencySet {
        DependencySet::new()
            .after_all(&self.after)
            .after_arrays(&self.after_array)
    }
}

/// Options specific to `run-array`.
#[derive(Args, Debug)]
pub struct ArrayOptions {
    /// Argument file, one subtask per line
    #[arg(short = 'a', long)]
    pub array_file: PathBuf,

    /// Number of subtasks (default: number of non-empty lines)
    #[arg(long)]
    pub tasks: Option<u32>,

    /// Maximum simultaneously running subtasks
    #[arg(short = 'p', long)]
    pub max_processes: Option<u32>,

    /// Bind each subtask to the same subtask of the array dependencies
    #[arg(long)]
    pub slot_dependency: bool,

    /// Pass the command to the dispatcher without a subshell
    #[arg(long)]
    pub no_subshell: bool,
}

impl ArrayOptions {
    /// Build the array description from the parsed options.
    pub fn spec(&self) -> ArrayJobSpec {
        let mut spec = ArrayJobSpec::new(&self.array_file).with_subshell(!self.no_subshell);
        if let Some(tasks) = self.tasks {
            spec = spec.with_task_count(tasks);
        }
        if let Some(max) = self.max_processes {
            spec = spec.with_max_concurrent(max);
        }
        spec
    }
}

/// Return the default configuration file (`~/.config/jobrunner/config.yaml`), if present.
pub fn default_config_file() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join("jobrunner").join("config.yaml");
    path.is_file().then_some(path)
}

/// Load configuration and apply the global command-line overrides.
pub fn load_config(
    config_file: Option<&Path>,
    backend: Option<&str>,
    verbose: u8,
) -> Result<RunnerConfig> {
    let config_file = config_file.map(Path::to_path_buf).or_else(default_config_file);

    let mut config = RunnerConfig::load(config_file.as_deref()).with_context(|| match config_file {
        Some(ref path) => format!("Failed to load configuration from {}", path.display()),
        None => "Failed to load configuration".to_string(),
    })?;

    if let Some(name) = backend {
        config.backend = name.parse()?;
    }
    if verbose > 0 {
        config.verbose = true;
    }
    Ok(config)
}

/// Create a runner for the command-line configuration.
pub fn create_runner(
    config_file: Option<&Path>,
    backend: Option<&str>,
    verbose: u8,
) -> Result<JobRunner> {
    let config = load_config(config_file, backend, verbose)?;
    tracing::debug!(?config, "loaded configuration");
    Ok(JobRunner::new(config)?)
}
