//! Uniform job submission for HPC schedulers and local execution
//!
//! This crate describes a unit of work once (command, name, log file,
//! dependencies, resources) and turns it into the submission each batch
//! scheduler expects, or runs it on the local host when no scheduler is
//! available.
//!
//! # Overview
//!
//! Every call moves through the same stages:
//! 1. **Building**: a [`CommandBuilder`] renders the scheduler command line
//! 2. **Submitting**: the [`BackendSubmitter`] pipes the job script into the tool
//! 3. **Executing** (local mode): the [`LocalExecutor`] runs the job directly
//! 4. **Normalizing**: the returned id is stripped of its server suffix
//!
//! # Supported Backends
//!
//! | Backend | Submission tool | Subtask variable | Array log token |
//! |---------|-----------------|------------------|-----------------|
//! | Grid Engine | `qsub -terse` | `SGE_TASK_ID` | `-\$TASK_ID` |
//! | SLURM | `sbatch --parsable` | `SLURM_ARRAY_TASK_ID` | `-%a` |
//! | Torque | `qsub` | `PBS_ARRAYID` | (added by Torque) |
//! | Local | `bash` | `$0` | `-<subtask>` |
//!
//! # Example: Single Job
//!
//! ```ignore
//! use jobrunner::{DependencySet, JobDescriptor, JobRunner, ResourceSpec, RunnerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runner = JobRunner::new(RunnerConfig::new("slurm")?)?;
//!
//!     let job = JobDescriptor::new("Align", "bwa mem ref.fa r1.fq > out.sam", "align.log")
//!         .with_resources(ResourceSpec::default().with_threads(8));
//!
//!     let job_id = runner.run(&job, &DependencySet::new()).await?;
//!     println!("Submitted: {}", job_id);
//!     Ok(())
//! }
//! ```
//!
//! # Example: Array Job with Slot Dependencies
//!
//! ```ignore
//! use jobrunner::{ArrayJobSpec, DependencySet, JobDescriptor};
//!
//! // One subtask per line of samples.txt, at most 4 at a time.
//! let job = JobDescriptor::new("Snps", "call_snps {1} {2}", "logs/snps.log");
//! let array = ArrayJobSpec::new("samples.txt").with_max_concurrent(4);
//!
//! // Subtask i waits for subtask i of the alignment array.
//! let deps = DependencySet::new()
//!     .after_array(&align_id)
//!     .with_slot_dependency(true);
//!
//! let job_id = runner.run_array(&job, &array, &deps).await?;
//! ```
//!
//! # Local Failures
//!
//! In local mode a non-zero exit is an error unless an exception handler is
//! registered:
//!
//! ```ignore
//! let runner = JobRunner::new(RunnerConfig::new("local")?)?
//!     .with_exception_handler(|failure| eprintln!("{failure}"));
//! ```

pub mod adapter;
pub mod backend;
pub mod config;
pub mod error;
pub mod job;
pub mod local;
pub mod normalize;
pub mod process;
pub mod runner;
pub mod submit;

// Re-exports
pub use adapter::{
    BuildContext, CommandBuilder, GridAdapter, SchedulerAdapter, SlurmAdapter, TorqueAdapter,
};
pub use backend::BackendType;
pub use config::RunnerConfig;
pub use error::{ExecutionFailure, RunnerError, RunnerResult};
pub use job::{ArrayJobSpec, ArrayRequest, DependencySet, JobDescriptor, ResourceSpec};
pub use local::LocalExecutor;
pub use normalize::{LOCAL_JOB_ID, OutputEncoding, normalize_job_id};
pub use process::{BashRunner, ProcessOutput, ProcessRunner};
pub use runner::{ExceptionHandler, JobRunner};
pub use submit::{BackendSubmitter, compute_node_command};
