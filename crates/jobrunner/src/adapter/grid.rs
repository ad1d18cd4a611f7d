//! Grid Engine (`qsub -terse`) command builder.

use std::path::{Path, PathBuf};

use super::{BuildContext, CommandBuilder, push_extra_params, with_suffix};
use crate::backend::BackendType;
use crate::error::{RunnerError, RunnerResult};
use crate::job::{ArrayRequest, DependencySet, JobDescriptor};

/// Adapter for Grid Engine.
///
/// Supports per-slot array dependencies through `-hold_jid_ad`, and requires
/// a parallel environment for multi-threaded jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridAdapter;

impl CommandBuilder for GridAdapter {
    fn backend(&self) -> BackendType {
        BackendType::Grid
    }

    fn subtask_env_var(&self) -> &'static str {
        "SGE_TASK_ID"
    }

    fn array_log_file(&self, log_file: &Path) -> PathBuf {
        // Escaped so the submitting shell hands the literal token to qsub.
        with_suffix(log_file, r"-\$TASK_ID")
    }

    fn build(
        &self,
        job: &JobDescriptor,
        deps: &DependencySet,
        array: Option<ArrayRequest>,
        ctx: &BuildContext,
    ) -> RunnerResult<String> {
        let mut command = String::from("qsub -terse");
        if let Some(array) = array {
            command.push_str(&format!(" -t 1-{}", array.task_count));
        }
        command.push_str(&format!(
            " -V -j y -cwd -N {} -o {}",
            job.name,
            job.log_file.display()
        ));

        let (hold, hold_slots) = deps.partitioned();
        if !hold.is_empty() {
            command.push_str(&format!(" -hold_jid {}", hold.join(",")));
        }
        if !hold_slots.is_empty() {
            command.push_str(&format!(" -hold_jid_ad {}", hold_slots.join(",")));
        }

        if let Some(max) = array.and_then(|a| a.max_concurrent) {
            command.push_str(&format!(" -tc {max}"));
        }

        let resources = &job.resources;
        if resources.threads > 1 {
            let env = resources
                .parallel_environment
                .as_deref()
                .filter(|env| !env.is_empty())
                .ok_or_else(|| {
                    RunnerError::Configuration(
                        "You must use a parallel environment when consuming more than one thread on grid engine"
                            .to_string(),
                    )
                })?;
            command.push_str(&format!(" -pe {env} {}", resources.threads));
        }

        if let Some(ref limit) = resources.wall_clock_limit {
            command.push_str(&format!(" -l h_rt={limit}"));
        }

        push_extra_params(&mut command, job, ctx);
        Ok(command)
    }
}
