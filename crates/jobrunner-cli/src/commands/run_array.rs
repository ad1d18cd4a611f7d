//! Run-array command implementation.
//!
//! Submits an array job with one subtask per line of the argument file. In
//! local mode the subtasks run here, in a bounded pool.

use std::path::Path;

use anyhow::Result;
use tracing::info;

use super::common::{ArrayOptions, JobOptions, create_runner};

/// Execute the run-array command.
pub async fn execute(
    config_file: Option<&Path>,
    backend: Option<&str>,
    verbose: u8,
    options: &JobOptions,
    array: &ArrayOptions,
) -> Result<()> {
    let runner = create_runner(config_file, backend, verbose)?;
    let job = options.descriptor();
    let spec = array.spec();
    let deps = options
        .dependencies()
        .with_slot_dependency(array.slot_dependency);

    info!(
        backend = %runner.backend(),
        name = %job.name,
        array_file = %spec.array_input_file.display(),
        "starting array job"
    );

    let job_id = runner.run_array(&job, &spec, &deps).await?;
    println!("{job_id}");
    Ok(())
}
