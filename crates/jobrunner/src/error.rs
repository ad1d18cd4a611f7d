//! Error handling for job submission and local execution.

use thiserror::Error;

/// Result type for job runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// A local job (or one subtask of a local array job) exited non-zero.
///
/// This is the payload handed to an exception handler, and the payload of
/// [`RunnerError::ExecutionFailed`] when no handler is registered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Command '{command}' returned non-zero exit status {status}")]
pub struct ExecutionFailure {
    /// The shell text that was executed.
    pub command: String,

    /// Exit status of the pipeline. Signals are reported as `128 + signo`.
    pub status: i32,

    /// 1-based subtask number, for array jobs.
    pub subtask: Option<u32>,
}

/// Errors that can occur while building, submitting, or running jobs.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Invalid backend name or a missing required setting.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Array job without an explicit task count whose input file is absent or empty.
    #[error("The file {path} {reason}.\nCannot start array job {job_name}.")]
    MissingArrayInput {
        path: String,
        reason: &'static str,
        job_name: String,
    },

    /// The remote submission tool exited non-zero.
    #[error("Submission failed with exit status {status}: {diagnostics}")]
    SubmissionFailed { status: i32, diagnostics: String },

    /// A local job or array batch exited non-zero.
    #[error(transparent)]
    ExecutionFailed(#[from] ExecutionFailure),

    /// The operation is not available for the configured backend.
    #[error("{operation} does not support backend {backend}")]
    UnsupportedBackend {
        operation: &'static str,
        backend: String,
    },

    /// IO error while spawning processes or reading input files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Exit status carried by a failed submission or execution, if any.
    pub fn exit_status(&self) -> Option<i32> {
        match self {
            RunnerError::SubmissionFailed { status, .. } => Some(*status),
            RunnerError::ExecutionFailed(failure) => Some(failure.status),
            _ => None,
        }
    }
}
