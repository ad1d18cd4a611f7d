//! Run command implementation.
//!
//! Submits a single job, or runs it in the foreground in local mode.

use std::path::Path;

use anyhow::Result;
use tracing::info;

use super::common::{JobOptions, create_runner};

/// Execute the run command.
pub async fn execute(
    config_file: Option<&Path>,
    backend: Option<&str>,
    verbose: u8,
    options: &JobOptions,
) -> Result<()> {
    let runner = create_runner(config_file, backend, verbose)?;
    let job = options.descriptor();
    info!(backend = %runner.backend(), name = %job.name, "starting job");

    let job_id = runner.run(&job, &options.dependencies()).await?;
    println!("{job_id}");
    Ok(())
}
