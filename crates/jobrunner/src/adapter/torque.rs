//! Torque / PBS (`qsub`) command builder.

use std::path::{Path, PathBuf};

use super::{BuildContext, CommandBuilder, push_extra_params};
use crate::backend::BackendType;
use crate::error::RunnerResult;
use crate::job::{ArrayRequest, DependencySet, JobDescriptor};

/// Adapter for Torque.
///
/// Torque has no per-slot array binding: array dependencies are always
/// `afterokarray`, whatever the slot flag says. Exclusive access is not
/// supported and is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TorqueAdapter;

impl CommandBuilder for TorqueAdapter {
    fn backend(&self) -> BackendType {
        BackendType::Torque
    }

    fn subtask_env_var(&self) -> &'static str {
        "PBS_ARRAYID"
    }

    // Torque appends the array index to the output path itself.
    fn array_log_file(&self, log_file: &Path) -> PathBuf {
        log_file.to_path_buf()
    }

    fn build(
        &self,
        job: &JobDescriptor,
        deps: &DependencySet,
        array: Option<ArrayRequest>,
        ctx: &BuildContext,
    ) -> RunnerResult<String> {
        let mut command = String::from("qsub");
        if let Some(array) = array {
            command.push_str(&format!(" -t 1-{}", array.task_count));
            if let Some(max) = array.max_concurrent {
                command.push_str(&format!("%{max}"));
            }
        }
        command.push_str(&format!(
            " -V -j oe -d {} -N {} -o {}",
            ctx.working_dir.display(),
            job.name,
            job.log_file.display()
        ));

        let mut clauses = Vec::with_capacity(2);
        if !deps.job_deps.is_empty() {
            clauses.push(format!("afterok:{}", deps.job_deps.join(":")));
        }
        if !deps.array_deps.is_empty() {
            clauses.push(format!("afterokarray:{}", deps.array_deps.join(":")));
        }
        if !clauses.is_empty() {
            command.push_str(&format!(" -W depend={}", clauses.join(",")));
        }

        let resources = &job.resources;
        if resources.threads > 1 {
            command.push_str(&format!(" -l nodes=1:ppn={}", resources.threads));
        }

        if let Some(ref limit) = resources.wall_clock_limit {
            command.push_str(&format!(" -l walltime={limit}"));
        }

        push_extra_params(&mut command, job, ctx);
        Ok(command)
    }
}
