//! Hand built command lines to a remote submission tool.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{RunnerError, RunnerResult};
use crate::normalize::OutputEncoding;
use crate::process::ProcessRunner;

/// Name of the per-node array dispatcher program.
pub const ARRAY_DISPATCHER: &str = "qarrayrun";

/// Runs a submission command with the job script on its stdin.
#[derive(Clone)]
pub struct BackendSubmitter {
    runner: Arc<dyn ProcessRunner>,
    encoding: OutputEncoding,
}

impl BackendSubmitter {
    /// Create a submitter that decodes tool output with `encoding`.
    pub fn new(runner: Arc<dyn ProcessRunner>, encoding: OutputEncoding) -> Self {
        Self { runner, encoding }
    }

    /// Submit `job_script` through `command_line` and return the raw job id.
    ///
    /// The id is decoded and trimmed but not normalized.
    pub async fn submit(&self, command_line: &str, job_script: &str) -> RunnerResult<String> {
        debug!(command_line, "invoking submission tool");
        let output = self
            .runner
            .capture(command_line, job_script.as_bytes())
            .await?;

        if !output.success() {
            let mut diagnostics = self.encoding.decode(&output.stderr).trim().to_string();
            if diagnostics.is_empty() {
                diagnostics = self.encoding.decode(&output.stdout).trim().to_string();
            }
            return Err(RunnerError::SubmissionFailed {
                status: output.status,
                diagnostics,
            });
        }

        let job_id = self.encoding.decode(&output.stdout).trim().to_string();
        if job_id.is_empty() {
            warn!(command_line, "submission tool succeeded without printing a job id");
        }
        Ok(job_id)
    }
}

impl std::fmt::Debug for BackendSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSubmitter")
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

/// Command executed on the compute node for every array subtask.
///
/// The dispatcher reads line `$<env_var>` of `array_file` and substitutes it
/// into `command_line`. With `subshell`, the command is quoted and run via
/// `--shell` so it may contain several statements.
pub fn compute_node_command(
    env_var: &str,
    array_file: &Path,
    command_line: &str,
    subshell: bool,
) -> String {
    if subshell {
        format!(
            "{ARRAY_DISPATCHER} --shell {env_var} {} \"{command_line}\"",
            array_file.display()
        )
    } else {
        format!(
            "{ARRAY_DISPATCHER} {env_var} {} {command_line}",
            array_file.display()
        )
    }
}
