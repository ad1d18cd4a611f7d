//! Version command implementation.

use console::style;

/// Execute the version command.
pub fn execute() {
    let version = env!("CARGO_PKG_VERSION");

    println!(
        "{} {} - uniform job submission for HPC schedulers",
        style("jobrunner").cyan().bold(),
        style(format!("v{version}")).yellow()
    );
    println!();
    println!("Backends: grid, slurm, torque, local");
    println!(
        "Repository: {}",
        style(env!("CARGO_PKG_REPOSITORY")).underlined()
    );
    println!("License:    {}", style(env!("CARGO_PKG_LICENSE")).dim());
}
