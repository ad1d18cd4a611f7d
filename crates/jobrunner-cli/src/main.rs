//! jobrunner Command-Line Interface
//!
//! Submits a command to Grid Engine, SLURM or Torque, or runs it locally,
//! and prints the job id on stdout so shell pipelines can chain dependencies:
//!
//! ```text
//! align=$(jobrunner --backend slurm run-array --name Align --log logs/align.log \
//!     --array-file samples.txt -- 'bwa mem ref.fa {1} > {1}.sam')
//! jobrunner --backend slurm run-array --name Call --log logs/call.log \
//!     --array-file samples.txt --after-array "$align" --slot-dependency -- 'call {1}.sam'
//! ```

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::common::{ArrayOptions, JobOptions};
use commands::{run, run_array, version};

/// jobrunner - one job description for every HPC scheduler
#[derive(Parser)]
#[command(name = "jobrunner")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// YAML configuration file
    #[arg(long, global = true, env = "JOBRUNNER_CONFIG")]
    config: Option<PathBuf>,

    /// Backend override (grid, slurm, torque, local)
    #[arg(long, global = true)]
    backend: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit or run a single job
    Run {
        #[command(flatten)]
        job: JobOptions,
    },

    /// Submit or run an array job, one subtask per line of an argument file
    RunArray {
        #[command(flatten)]
        array: ArrayOptions,

        #[command(flatten)]
        job: JobOptions,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging; job output owns stdout.
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_file = cli.config.as_deref();
    let backend = cli.backend.as_deref();

    // Execute command
    let result = match cli.command {
        Commands::Run { job } => run::execute(config_file, backend, cli.verbose, &job).await,

        Commands::RunArray { array, job } => {
            run_array::execute(config_file, backend, cli.verbose, &job, &array).await
        }

        Commands::Version => {
            version::execute();
            Ok(())
        }
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
