//! SLURM (`sbatch --parsable`) command builder.

use std::path::{Path, PathBuf};

use super::{BuildContext, CommandBuilder, push_extra_params, with_suffix};
use crate::backend::BackendType;
use crate::error::RunnerResult;
use crate::job::{ArrayRequest, DependencySet, JobDescriptor};

/// Adapter for SLURM.
///
/// The concurrency cap is folded into `--array`, and per-slot array
/// dependencies map to `aftercorr`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlurmAdapter;

impl CommandBuilder for SlurmAdapter {
    fn backend(&self) -> BackendType {
        BackendType::Slurm
    }

    fn subtask_env_var(&self) -> &'static str {
        "SLURM_ARRAY_TASK_ID"
    }

    fn array_log_file(&self, log_file: &Path) -> PathBuf {
        with_suffix(log_file, "-%a")
    }

    // sbatch refuses scripts without an interpreter line.
    fn job_script(&self, command: &str) -> String {
        format!("#!/bin/sh\n{command}\n")
    }

    fn build(
        &self,
        job: &JobDescriptor,
        deps: &DependencySet,
        array: Option<ArrayRequest>,
        ctx: &BuildContext,
    ) -> RunnerResult<String> {
        let resources = &job.resources;

        let mut command = String::from("sbatch --parsable");
        if resources.exclusive {
            command.push_str(" --exclusive");
        }
        if let Some(array) = array {
            command.push_str(&format!(" --array=1-{}", array.task_count));
            if let Some(max) = array.max_concurrent {
                command.push_str(&format!("%{max}"));
            }
        }
        command.push_str(&format!(
            " --export=ALL --job-name={} -o {}",
            job.name,
            job.log_file.display()
        ));

        let (after, after_corr) = deps.partitioned();
        let mut clauses = Vec::with_capacity(2);
        if !after.is_empty() {
            clauses.push(format!("afterok:{}", after.join(":")));
        }
        if !after_corr.is_empty() {
            clauses.push(format!("aftercorr:{}", after_corr.join(":")));
        }
        if !clauses.is_empty() {
            command.push_str(&format!(" --dependency={}", clauses.join(",")));
        }

        if resources.threads > 1 {
            command.push_str(&format!(" --cpus-per-task={}", resources.threads));
        }

        if let Some(ref limit) = resources.wall_clock_limit {
            command.push_str(&format!(" --time {limit}"));
        }

        push_extra_params(&mut command, job, ctx);
        Ok(command)
    }
}
