//! The `JobRunner` facade.
//!
//! A runner is configured once with a backend and then accepts any number of
//! independent `run` / `run_array` calls. Remote backends build a command
//! line, pipe a job script into the submission tool and return the
//! normalized job id. Local mode executes the job on this host and returns
//! [`LOCAL_JOB_ID`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::adapter::{BuildContext, CommandBuilder, SchedulerAdapter};
use crate::backend::BackendType;
use crate::config::RunnerConfig;
use crate::error::{ExecutionFailure, RunnerError, RunnerResult};
use crate::job::{ArrayJobSpec, DependencySet, JobDescriptor};
use crate::local::LocalExecutor;
use crate::normalize::{LOCAL_JOB_ID, normalize_job_id};
use crate::process::{BashRunner, ProcessRunner};
use crate::submit::{BackendSubmitter, compute_node_command};

/// Callback receiving local execution failures instead of the caller.
pub type ExceptionHandler = Arc<dyn Fn(&ExecutionFailure) + Send + Sync>;

#[derive(Debug, Clone)]
enum Dispatch {
    Remote {
        adapter: SchedulerAdapter,
        submitter: BackendSubmitter,
    },
    Local(LocalExecutor),
}

/// Uniform entry point for job submission.
#[derive(Clone)]
pub struct JobRunner {
    config: RunnerConfig,
    dispatch: Dispatch,
    exception_handler: Option<ExceptionHandler>,
}

impl JobRunner {
    /// Create a runner that executes everything through `bash`.
    pub fn new(config: RunnerConfig) -> RunnerResult<Self> {
        Self::with_process_runner(config, Arc::new(BashRunner::default()))
    }

    /// Create a runner on top of a custom process runner.
    pub fn with_process_runner(
        config: RunnerConfig,
        runner: Arc<dyn ProcessRunner>,
    ) -> RunnerResult<Self> {
        config.validate()?;

        let dispatch = match config.backend {
            BackendType::Local => {
                Dispatch::Local(LocalExecutor::new(runner).with_verbose(config.verbose))
            }
            backend => Dispatch::Remote {
                adapter: SchedulerAdapter::for_backend(backend)?,
                submitter: BackendSubmitter::new(runner, config.encoding),
            },
        };

        debug!(backend = %config.backend, "job runner configured");
        Ok(Self {
            config,
            dispatch,
            exception_handler: None,
        })
    }

    /// Route local execution failures to `handler`.
    ///
    /// A handled failure is reported exactly once and the call that produced
    /// it returns [`LOCAL_JOB_ID`] as if it had succeeded.
    pub fn with_exception_handler(
        mut self,
        handler: impl Fn(&ExecutionFailure) + Send + Sync + 'static,
    ) -> Self {
        self.exception_handler = Some(Arc::new(handler));
        self
    }

    /// The configured backend.
    pub fn backend(&self) -> BackendType {
        self.config.backend
    }

    /// The configuration captured at construction.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Submit or run a single job and return its id.
    ///
    /// Slot binding only applies to array jobs and is ignored here.
    pub async fn run(&self, job: &JobDescriptor, deps: &DependencySet) -> RunnerResult<String> {
        job.validate()?;

        match &self.dispatch {
            Dispatch::Remote { adapter, submitter } => {
                let deps = deps.clone().with_slot_dependency(false);
                let command = adapter.build(job, &deps, None, &self.build_context()?)?;
                let script = adapter.job_script(&job.command_line);
                self.submit(submitter, &command, &script).await
            }
            Dispatch::Local(executor) => {
                if !deps.is_empty() {
                    debug!(job = %job.name, "dependencies are implied by sequential local execution");
                }
                self.settle(executor.run(job).await)
            }
        }
    }

    /// Submit or run an array job and return its id.
    ///
    /// Remote backends fail with [`RunnerError::MissingArrayInput`] before
    /// submitting when the task count must be derived from a missing or empty
    /// argument file.
    pub async fn run_array(
        &self,
        job: &JobDescriptor,
        array: &ArrayJobSpec,
        deps: &DependencySet,
    ) -> RunnerResult<String> {
        job.validate()?;

        match &self.dispatch {
            Dispatch::Remote { adapter, submitter } => {
                let request = array.resolve(&job.name).await?;

                let mut array_job = job.clone();
                array_job.log_file = adapter.array_log_file(&job.log_file);

                let command =
                    adapter.build(&array_job, deps, Some(request), &self.build_context()?)?;
                let node_command = compute_node_command(
                    adapter.subtask_env_var(),
                    &array.array_input_file,
                    &job.command_line,
                    array.subshell,
                );
                let script = adapter.job_script(&node_command);
                self.submit(submitter, &command, &script).await
            }
            Dispatch::Local(executor) => self.settle(executor.run_array(job, array).await),
        }
    }

    async fn submit(
        &self,
        submitter: &BackendSubmitter,
        command: &str,
        script: &str,
    ) -> RunnerResult<String> {
        if self.config.verbose {
            info!("{command}");
        } else {
            debug!(command, "submitting");
        }

        let raw = submitter.submit(command, script).await?;
        let job_id = normalize_job_id(&raw, self.config.strip_array_suffix);

        if self.config.verbose {
            info!("Job id={job_id}");
        } else {
            debug!(job_id, "submitted");
        }
        Ok(job_id)
    }

    fn build_context(&self) -> RunnerResult<BuildContext> {
        let working_dir = std::env::current_dir()?;
        Ok(BuildContext::new(working_dir).with_extra_params(self.config.extra_params.clone()))
    }

    fn settle(&self, result: RunnerResult<()>) -> RunnerResult<String> {
        match (result, &self.exception_handler) {
            (Ok(()), _) => Ok(LOCAL_JOB_ID.to_string()),
            (Err(RunnerError::ExecutionFailed(failure)), Some(handler)) => {
                warn!(status = failure.status, subtask = ?failure.subtask, "local job failed");
                handler(&failure);
                Ok(LOCAL_JOB_ID.to_string())
            }
            (Err(e), _) => Err(e),
        }
    }
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("config", &self.config)
            .field("dispatch", &self.dispatch)
            .field("exception_handler", &self.exception_handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::job::ResourceSpec;
    use crate::process::ProcessOutput;

    /// Answers every submission with a fixed id and records what it was sent.
    struct RecordingRunner {
        job_id: &'static str,
        inherit_status: i32,
        submissions: Mutex<Vec<(String, String)>>,
        scripts: Mutex<Vec<String>>,
    }

    impl RecordingRunner {
        fn new(job_id: &'static str) -> Arc<Self> {
            Arc::new(Self {
                job_id,
                inherit_status: 0,
                submissions: Mutex::new(Vec::new()),
                scripts: Mutex::new(Vec::new()),
            })
        }

        fn failing(status: i32) -> Arc<Self> {
            Arc::new(Self {
                job_id: "",
                inherit_status: status,
                submissions: Mutex::new(Vec::new()),
                scripts: Mutex::new(Vec::new()),
            })
        }

        fn last_submission(&self) -> (String, String) {
            self.submissions.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl ProcessRunner for RecordingRunner {
        async fn capture(&self, command_line: &str, stdin: &[u8]) -> io::Result<ProcessOutput> {
            self.submissions.lock().unwrap().push((
                command_line.to_string(),
                String::from_utf8_lossy(stdin).into_owned(),
            ));
            Ok(ProcessOutput {
                status: 0,
                stdout: format!("{}\n", self.job_id).into_bytes(),
                stderr: Vec::new(),
            })
        }

        async fn inherit(&self, script: &str, _args: &[String]) -> io::Result<i32> {
            self.scripts.lock().unwrap().push(script.to_string());
            Ok(self.inherit_status)
        }
    }

    fn runner(backend: BackendType, process: Arc<RecordingRunner>) -> JobRunner {
        JobRunner::with_process_runner(RunnerConfig::for_backend(backend), process).unwrap()
    }

    #[tokio::test]
    async fn test_grid_run_submits_command_and_strips_id() {
        let process = RecordingRunner::new("4567.headnode");
        let runner = runner(BackendType::Grid, process.clone());

        let job = JobDescriptor::new("Align", "bwa mem ref.fa r1.fq", "align.log");
        let id = runner
            .run(&job, &DependencySet::new().after("111"))
            .await
            .unwrap();
        assert_eq!(id, "4567");

        let (command, script) = process.last_submission();
        assert_eq!(
            command,
            "qsub -terse -V -j y -cwd -N Align -o align.log -hold_jid 111"
        );
        assert_eq!(script, "bwa mem ref.fa r1.fq\n");
    }

    #[tokio::test]
    async fn test_suffix_kept_when_stripping_disabled() {
        let process = RecordingRunner::new("4567.headnode");
        let config = RunnerConfig::for_backend(BackendType::Torque).with_strip_array_suffix(false);
        let runner = JobRunner::with_process_runner(config, process).unwrap();

        let job = JobDescriptor::new("Job", "true", "log");
        let id = runner.run(&job, &DependencySet::new()).await.unwrap();
        assert_eq!(id, "4567.headnode");
    }

    #[tokio::test]
    async fn test_single_job_ignores_slot_dependency() {
        let process = RecordingRunner::new("9");
        let runner = runner(BackendType::Slurm, process.clone());

        let deps = DependencySet::new()
            .after("1")
            .after_array("2")
            .with_slot_dependency(true);
        runner
            .run(&JobDescriptor::new("Job", "true", "log"), &deps)
            .await
            .unwrap();

        let (command, script) = process.last_submission();
        assert_eq!(
            command,
            "sbatch --parsable --export=ALL --job-name=Job -o log --dependency=afterok:1:2"
        );
        assert_eq!(script, "#!/bin/sh\ntrue\n");
    }

    #[tokio::test]
    async fn test_slurm_array_payload() {
        let process = RecordingRunner::new("77");
        let runner = runner(BackendType::Slurm, process.clone());

        let job = JobDescriptor::new("Snps", "call {1} {2}", "logs/snps.log");
        let array = ArrayJobSpec::new("samples.txt")
            .with_task_count(4)
            .with_max_concurrent(2);
        let deps = DependencySet::new()
            .after_array("70")
            .with_slot_dependency(true);

        assert_eq!(runner.run_array(&job, &array, &deps).await.unwrap(), "77");

        let (command, script) = process.last_submission();
        assert_eq!(
            command,
            "sbatch --parsable --array=1-4%2 --export=ALL --job-name=Snps -o logs/snps.log-%a --dependency=aftercorr:70"
        );
        assert_eq!(
            script,
            "#!/bin/sh\nqarrayrun --shell SLURM_ARRAY_TASK_ID samples.txt \"call {1} {2}\"\n"
        );
    }

    #[tokio::test]
    async fn test_grid_array_without_subshell() {
        let process = RecordingRunner::new("88.1-3:1");
        let runner = runner(BackendType::Grid, process.clone());

        let job = JobDescriptor::new("Trim", "trim {1}", "trim.log");
        let array = ArrayJobSpec::new("reads.txt")
            .with_task_count(3)
            .with_subshell(false);

        let id = runner
            .run_array(&job, &array, &DependencySet::new())
            .await
            .unwrap();
        assert_eq!(id, "88");

        let (command, script) = process.last_submission();
        assert_eq!(
            command,
            r"qsub -terse -t 1-3 -V -j y -cwd -N Trim -o trim.log-\$TASK_ID"
        );
        assert_eq!(script, "qarrayrun SGE_TASK_ID reads.txt trim {1}\n");
    }

    #[tokio::test]
    async fn test_remote_array_counts_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.txt");
        std::fs::write(&path, "a\n\nb\nc\n").unwrap();

        let process = RecordingRunner::new("5");
        let runner = runner(BackendType::Grid, process.clone());

        let job = JobDescriptor::new("Job", "echo {1}", "log");
        runner
            .run_array(&job, &ArrayJobSpec::new(&path), &DependencySet::new())
            .await
            .unwrap();

        let (command, _) = process.last_submission();
        assert!(command.starts_with("qsub -terse -t 1-3 "));
    }

    #[tokio::test]
    async fn test_remote_array_missing_file_submits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let process = RecordingRunner::new("5");
        let runner = runner(BackendType::Torque, process.clone());

        let job = JobDescriptor::new("Job", "echo {1}", "log");
        let err = runner
            .run_array(
                &job,
                &ArrayJobSpec::new(dir.path().join("absent.txt")),
                &DependencySet::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RunnerError::MissingArrayInput { .. }));
        assert!(process.submissions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_torque_runs_in_current_directory() {
        let process = RecordingRunner::new("31.torque-server");
        let runner = runner(BackendType::Torque, process.clone());

        let job = JobDescriptor::new("Job", "true", "log");
        let id = runner
            .run(&job, &DependencySet::new().after("30"))
            .await
            .unwrap();
        assert_eq!(id, "31");

        let cwd = std::env::current_dir().unwrap();
        let (command, _) = process.last_submission();
        assert_eq!(
            command,
            format!(
                "qsub -V -j oe -d {} -N Job -o log -W depend=afterok:30",
                cwd.display()
            )
        );
    }

    #[tokio::test]
    async fn test_config_extra_params_precede_job_params() {
        let process = RecordingRunner::new("1");
        let config = RunnerConfig::for_backend(BackendType::Grid).with_extra_params("-q short.q");
        let runner = JobRunner::with_process_runner(config, process.clone()).unwrap();

        let job = JobDescriptor::new("Job", "true", "log").with_extra_params("-l mem_free=2G");
        runner.run(&job, &DependencySet::new()).await.unwrap();

        let (command, _) = process.last_submission();
        assert_eq!(
            command,
            "qsub -terse -V -j y -cwd -N Job -o log -q short.q -l mem_free=2G"
        );
    }

    #[tokio::test]
    async fn test_grid_threads_need_parallel_environment() {
        let process = RecordingRunner::new("1");
        let runner = runner(BackendType::Grid, process.clone());

        let job = JobDescriptor::new("Job", "true", "log")
            .with_resources(ResourceSpec::default().with_threads(4));
        let err = runner.run(&job, &DependencySet::new()).await.unwrap_err();
        assert!(matches!(err, RunnerError::Configuration(_)));
        assert!(process.submissions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_local_run_returns_zero_id() {
        let process = RecordingRunner::new("");
        let runner = runner(BackendType::Local, process.clone());

        let job = JobDescriptor::new("Job", "echo hi", "out.log");
        let id = runner.run(&job, &DependencySet::new()).await.unwrap();
        assert_eq!(id, LOCAL_JOB_ID);
        assert_eq!(
            process.scripts.lock().unwrap().as_slice(),
            ["set -o pipefail; echo hi 2>&1 | tee out.log"]
        );
    }

    #[tokio::test]
    async fn test_local_failure_propagates_without_handler() {
        let runner = runner(BackendType::Local, RecordingRunner::failing(100));

        let job = JobDescriptor::new("Job", "exit 100", "out.log");
        let err = runner.run(&job, &DependencySet::new()).await.unwrap_err();
        assert_eq!(err.exit_status(), Some(100));
        assert!(matches!(err, RunnerError::ExecutionFailed(_)));
    }

    #[tokio::test]
    async fn test_local_failure_routed_to_handler_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(None));

        let runner = runner(BackendType::Local, RecordingRunner::failing(100))
            .with_exception_handler({
                let calls = Arc::clone(&calls);
                let seen = Arc::clone(&seen);
                move |failure: &ExecutionFailure| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    *seen.lock().unwrap() = Some(failure.status);
                }
            });

        let job = JobDescriptor::new("Job", "exit 100", "out.log");
        let id = runner.run(&job, &DependencySet::new()).await.unwrap();

        assert_eq!(id, LOCAL_JOB_ID);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), Some(100));
    }

    #[tokio::test]
    async fn test_handler_does_not_swallow_other_errors() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(BackendType::Local, RecordingRunner::new(""))
            .with_exception_handler(|_: &ExecutionFailure| panic!("handler must not run"));

        let job = JobDescriptor::new("Job", "echo {1}", "out.log");
        let err = runner
            .run_array(
                &job,
                &ArrayJobSpec::new(dir.path().join("absent")),
                &DependencySet::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::MissingArrayInput { .. }));
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = RunnerConfig::for_backend(BackendType::Slurm).with_extra_params("a\nb");
        assert!(JobRunner::new(config).is_err());
    }
}
