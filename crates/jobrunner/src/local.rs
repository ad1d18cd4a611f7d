//! Local execution: single jobs and emulated array jobs.
//!
//! Array subtasks run in a bounded pool of `bash` processes. Subtask `i`
//! receives its number as `$0` and the fields of input line `i` as `$1..$9`;
//! its combined output goes to `<log>-i`, and also to stdout unless quiet.

use std::io::{self, Write};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::error::{ExecutionFailure, RunnerError, RunnerResult};
use crate::job::{ArrayJobSpec, JobDescriptor, read_task_lines};
use crate::process::ProcessRunner;

/// Maximum number of positional fields taken from one array input line.
pub const MAX_ARRAY_FIELDS: usize = 9;

/// Runs jobs on this host.
#[derive(Clone)]
pub struct LocalExecutor {
    runner: Arc<dyn ProcessRunner>,
    verbose: bool,
}

impl LocalExecutor {
    /// Create an executor on top of a process runner.
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            verbose: false,
        }
    }

    /// Log every script at `info` instead of `debug`.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Run a single job to completion.
    pub async fn run(&self, job: &JobDescriptor) -> RunnerResult<()> {
        let log = quote(&job.log_file.to_string_lossy())?;
        let script = pipeline(&job.command_line, &log, job.quiet);
        self.log_script(&script);

        flush_stdout();
        let status = self.runner.inherit(&script, &[]).await?;
        if status != 0 {
            return Err(ExecutionFailure {
                command: script,
                status,
                subtask: None,
            }
            .into());
        }
        Ok(())
    }

    /// Run every subtask of an array job, at most `max_concurrent` at a time.
    ///
    /// All subtasks run even if some fail; the failure of the lowest-numbered
    /// failing subtask is returned.
    pub async fn run_array(&self, job: &JobDescriptor, array: &ArrayJobSpec) -> RunnerResult<()> {
        array.validate()?;
        let lines = read_task_lines(&array.array_input_file, &job.name).await?;
        let task_count = match array.task_count {
            Some(n) => lines.len().min(n as usize),
            None => lines.len(),
        };
        let max_concurrent = array
            .max_concurrent
            .map_or_else(num_cpus::get, |n| n as usize);

        let log = quote(&job.log_file.to_string_lossy())?;
        let script = pipeline(
            &positional_placeholders(&job.command_line),
            &format!("{log}-$0"),
            job.quiet,
        );
        self.log_script(&script);
        debug!(task_count, max_concurrent, "dispatching local array job");

        flush_stdout();
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let mut tasks = JoinSet::new();

        for (idx, line) in lines.into_iter().take(task_count).enumerate() {
            let subtask = (idx + 1) as u32;
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(io::Error::other)?;

            let mut args = Vec::with_capacity(MAX_ARRAY_FIELDS + 1);
            args.push(subtask.to_string());
            args.extend(
                line.split_whitespace()
                    .take(MAX_ARRAY_FIELDS)
                    .map(str::to_string),
            );

            let runner = Arc::clone(&self.runner);
            let script = script.clone();
            tasks.spawn(async move {
                let status = runner.inherit(&script, &args).await;
                drop(permit);
                (subtask, status)
            });
        }

        // Drain every subtask before reporting, so no child outlives the call.
        let mut first_failure: Option<ExecutionFailure> = None;
        let mut io_error: Option<io::Error> = None;
        while let Some(joined) = tasks.join_next().await {
            let (subtask, status) = match joined {
                Ok((subtask, Ok(status))) => (subtask, status),
                Ok((subtask, Err(e))) => {
                    debug!(subtask, error = %e, "array subtask could not run");
                    io_error.get_or_insert(e);
                    continue;
                }
                Err(e) => {
                    io_error.get_or_insert(io::Error::other(e));
                    continue;
                }
            };
            if status == 0 {
                continue;
            }
            debug!(subtask, status, "array subtask failed");
            if first_failure.as_ref().is_none_or(|f| f.subtask > Some(subtask)) {
                first_failure = Some(ExecutionFailure {
                    command: script.clone(),
                    status,
                    subtask: Some(subtask),
                });
            }
        }

        if let Some(e) = io_error {
            return Err(e.into());
        }
        match first_failure {
            Some(failure) => Err(RunnerError::ExecutionFailed(failure)),
            None => Ok(()),
        }
    }

    fn log_script(&self, script: &str) {
        if self.verbose {
            info!(script, "running locally");
        } else {
            debug!(script, "running locally");
        }
    }
}

impl std::fmt::Debug for LocalExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalExecutor")
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

/// Rewrite `{1}`..`{9}` into `$1`..`$9`.
pub fn positional_placeholders(command_line: &str) -> String {
    (1..=MAX_ARRAY_FIELDS).fold(command_line.to_string(), |acc, n| {
        acc.replace(&format!("{{{n}}}"), &format!("${n}"))
    })
}

/// Wrap a command so its combined output lands in `log` (already quoted).
///
/// `pipefail` keeps a failing command from being masked by `tee`.
fn pipeline(command_line: &str, log: &str, quiet: bool) -> String {
    if quiet {
        format!("set -o pipefail; {command_line} > {log} 2>&1")
    } else {
        format!("set -o pipefail; {command_line} 2>&1 | tee {log}")
    }
}

fn quote(path: &str) -> RunnerResult<String> {
    shlex::try_quote(path)
        .map(|quoted| quoted.into_owned())
        .map_err(|e| RunnerError::Configuration(format!("invalid log file path: {e}")))
}

// Our own buffered output must precede anything the children write.
fn flush_stdout() {
    let _ = io::stdout().flush();
}
