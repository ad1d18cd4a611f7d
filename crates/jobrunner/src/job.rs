//! Job types shared by every backend.

use std::path::{Path, PathBuf};

use crate::error::{RunnerError, RunnerResult};

/// Compute resources requested per job (or per array subtask).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    /// CPU slots per (sub)task.
    pub threads: u32,

    /// Grid Engine parallel environment. Required by grid when `threads > 1`.
    pub parallel_environment: Option<String>,

    /// Wall clock limit, `HH:MM:SS`. Passed through verbatim.
    pub wall_clock_limit: Option<String>,

    /// Exclusive node access. Only SLURM honors this.
    pub exclusive: bool,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            threads: 1,
            parallel_environment: None,
            wall_clock_limit: None,
            exclusive: false,
        }
    }
}

impl ResourceSpec {
    /// Request `threads` CPU slots.
    pub fn with_threads(mut self, threads: u32) -> Self {
        self.threads = threads;
        self
    }

    /// Set the grid parallel environment.
    pub fn with_parallel_environment(mut self, env: impl Into<String>) -> Self {
        self.parallel_environment = Some(env.into());
        self
    }

    /// Set the wall clock limit.
    pub fn with_wall_clock_limit(mut self, limit: impl Into<String>) -> Self {
        self.wall_clock_limit = Some(limit.into());
        self
    }

    /// Request exclusive node access.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }
}

/// Description of one unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    /// Name shown in the scheduler queue.
    pub name: String,

    /// Shell command. Array jobs may use `{1}`..`{9}` placeholders.
    pub command_line: String,

    /// Combined stdout/stderr log.
    pub log_file: PathBuf,

    /// Requested resources.
    pub resources: ResourceSpec,

    /// Appended verbatim to the end of the submission command.
    pub extra_params: Option<String>,

    /// Local mode only: write output to the log file without echoing it.
    pub quiet: bool,
}

impl JobDescriptor {
    /// Create a new job description.
    pub fn new(
        name: impl Into<String>,
        command_line: impl Into<String>,
        log_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            command_line: command_line.into(),
            log_file: log_file.into(),
            resources: ResourceSpec::default(),
            extra_params: None,
            quiet: false,
        }
    }

    /// Set the requested resources.
    pub fn with_resources(mut self, resources: ResourceSpec) -> Self {
        self.resources = resources;
        self
    }

    /// Append extra scheduler options for this job only.
    pub fn with_extra_params(mut self, params: impl Into<String>) -> Self {
        self.extra_params = Some(params.into());
        self
    }

    /// Keep job output out of the caller's stdout.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Check the invariants every backend relies on.
    pub fn validate(&self) -> RunnerResult<()> {
        if self.name.is_empty() {
            return Err(RunnerError::Configuration(
                "job name must not be empty".to_string(),
            ));
        }
        if self.resources.threads == 0 {
            return Err(RunnerError::Configuration(
                "threads must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Predecessors a job must wait for.
///
/// Values are built per call; nothing is shared between submissions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySet {
    /// Job ids to wait for.
    pub job_deps: Vec<String>,

    /// Array job ids to wait for.
    pub array_deps: Vec<String>,

    /// Bind each subtask to the same-index subtask of every array dependency.
    pub slot_dependency: bool,
}

impl DependencySet {
    /// No dependencies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for a job. Duplicates are ignored.
    pub fn after(mut self, job_id: impl Into<String>) -> Self {
        push_unique(&mut self.job_deps, job_id.into());
        self
    }

    /// Wait for several jobs.
    pub fn after_all(mut self, job_ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        for id in job_ids {
            push_unique(&mut self.job_deps, id.into());
        }
        self
    }

    /// Wait for an array job.
    pub fn after_array(mut self, job_id: impl Into<String>) -> Self {
        push_unique(&mut self.array_deps, job_id.into());
        self
    }

    /// Wait for several array jobs.
    pub fn after_arrays(mut self, job_ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        for id in job_ids {
            push_unique(&mut self.array_deps, id.into());
        }
        self
    }

    /// Enable or disable per-slot binding to array dependencies.
    pub fn with_slot_dependency(mut self, slot_dependency: bool) -> Self {
        self.slot_dependency = slot_dependency;
        self
    }

    /// True when there is nothing to wait for.
    pub fn is_empty(&self) -> bool {
        self.job_deps.is_empty() && self.array_deps.is_empty()
    }

    /// Job dependencies followed by array dependencies, as one list.
    pub fn merged(&self) -> Vec<&str> {
        self.job_deps
            .iter()
            .chain(self.array_deps.iter())
            .map(String::as_str)
            .collect()
    }

    /// Split into `(whole-job, per-slot)` lists.
    ///
    /// Without slot binding everything lands in the first list.
    pub fn partitioned(&self) -> (Vec<&str>, Vec<&str>) {
        if self.slot_dependency {
            (
                self.job_deps.iter().map(String::as_str).collect(),
                self.array_deps.iter().map(String::as_str).collect(),
            )
        } else {
            (self.merged(), Vec::new())
        }
    }
}

fn push_unique(list: &mut Vec<String>, id: String) {
    if !list.contains(&id) {
        list.push(id);
    }
}

/// Array-specific parameters of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayJobSpec {
    /// One line of arguments per subtask, 1-indexed.
    pub array_input_file: PathBuf,

    /// Number of subtasks. Derived from the input file when absent.
    pub task_count: Option<u32>,

    /// Maximum simultaneously running subtasks.
    pub max_concurrent: Option<u32>,

    /// Quote the compute-node command so the dispatcher runs it in a subshell.
    pub subshell: bool,
}

impl ArrayJobSpec {
    /// Create an array spec over an argument file.
    pub fn new(array_input_file: impl Into<PathBuf>) -> Self {
        Self {
            array_input_file: array_input_file.into(),
            task_count: None,
            max_concurrent: None,
            subshell: true,
        }
    }

    /// Fix the number of subtasks instead of counting lines.
    ///
    /// Needed when the argument file is produced by a job that has not run yet.
    pub fn with_task_count(mut self, task_count: u32) -> Self {
        self.task_count = Some(task_count);
        self
    }

    /// Cap the number of concurrent subtasks.
    pub fn with_max_concurrent(mut self, max_concurrent: u32) -> Self {
        self.max_concurrent = Some(max_concurrent);
        self
    }

    /// Choose whether the compute-node command runs in a subshell.
    pub fn with_subshell(mut self, subshell: bool) -> Self {
        self.subshell = subshell;
        self
    }

    /// Reject explicit zero task counts and concurrency caps.
    pub fn validate(&self) -> RunnerResult<()> {
        if self.task_count == Some(0) {
            return Err(RunnerError::Configuration(
                "task_count must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent == Some(0) {
            return Err(RunnerError::Configuration(
                "max_concurrent must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the task count, reading the argument file when none was given.
    pub async fn resolve(&self, job_name: &str) -> RunnerResult<ArrayRequest> {
        self.validate()?;
        let task_count = match self.task_count {
            Some(n) => n,
            None => count_tasks(&self.array_input_file, job_name).await?,
        };
        Ok(ArrayRequest {
            task_count,
            max_concurrent: self.max_concurrent,
        })
    }
}

/// Array dimensions after the task count has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayRequest {
    /// Number of subtasks.
    pub task_count: u32,

    /// Concurrency cap; `None` leaves the backend default in place.
    pub max_concurrent: Option<u32>,
}

impl ArrayRequest {
    /// Create an array request.
    pub fn new(task_count: u32) -> Self {
        Self {
            task_count,
            max_concurrent: None,
        }
    }

    /// Cap the number of concurrent subtasks.
    pub fn with_max_concurrent(mut self, max_concurrent: u32) -> Self {
        self.max_concurrent = Some(max_concurrent);
        self
    }
}

/// Read the non-empty lines of an array argument file.
///
/// Fails with [`RunnerError::MissingArrayInput`] if the file is missing or empty.
pub async fn read_task_lines(path: &Path, job_name: &str) -> RunnerResult<Vec<String>> {
    let missing = |reason| RunnerError::MissingArrayInput {
        path: path.display().to_string(),
        reason,
        job_name: job_name.to_string(),
    };

    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => {}
        Ok(_) => return Err(missing("does not exist")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(missing("does not exist"));
        }
        Err(e) => return Err(e.into()),
    }

    let contents = tokio::fs::read_to_string(path).await?;

    let lines: Vec<String> = contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect();

    if lines.is_empty() {
        return Err(missing("is empty"));
    }
    Ok(lines)
}

async fn count_tasks(path: &Path, job_name: &str) -> RunnerResult<u32> {
    let lines = read_task_lines(path, job_name).await?;
    u32::try_from(lines.len()).map_err(|_| {
        RunnerError::Configuration(format!("too many array tasks in {}", path.display()))
    })
}
