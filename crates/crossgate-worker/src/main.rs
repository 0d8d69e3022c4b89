//! crossgate Worker
//!
//! Runs exactly one pipeline job on the worker it is started on. A CI host
//! starts one `crossgate-worker` per job: `native` first, then one
//! `target <triple>` per matrix entry once `native` has succeeded.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crossgate_core::{JobSpec, PipelineDefinition, TargetSpec};
use crossgate_worker::{
    describe_worker, HttpFetcher, JobExecutor, ProcessRunner, WorkerConfig,
};

#[derive(Parser)]
#[command(name = "crossgate-worker")]
#[command(about = "Run one crossgate job on this worker")]
#[command(version)]
struct Cli {
    /// Pipeline definition (defaults to crossgate.toml in the project, then built-in)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Project checkout to test
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Toolchain home (defaults to $CARGO_HOME, then ~/.cargo)
    #[arg(long)]
    cargo_home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ensure the toolchain is installed and current
    Provision,

    /// Run the native test job
    Native,

    /// Run one matrix entry through the cross helper
    Target {
        /// Target triple; must be declared in the pipeline's matrix
        triple: String,
    },

    /// Print the tools found on this worker
    Inventory,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crossgate=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let pipeline = Arc::new(PipelineDefinition::load(cli.config.as_deref(), &cli.project_dir)?);

    let mut config = WorkerConfig {
        project_dir: cli.project_dir,
        ..WorkerConfig::default()
    };
    if let Some(home) = cli.cargo_home {
        config.cargo_home = home;
    }

    let runner = Arc::new(ProcessRunner::new());
    let fetcher = Arc::new(HttpFetcher::new());
    let executor = JobExecutor::new(runner.clone(), fetcher, pipeline.clone());

    let job = match cli.command {
        Commands::Provision => {
            let mut env = config.worker_env(&crossgate_core::JobId::generate());
            let report = executor.provisioner().ensure_toolchain(&mut env).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }
        Commands::Inventory => {
            let env = config.worker_env(&crossgate_core::JobId::generate());
            let info = describe_worker(runner.as_ref(), &env).await;
            println!("{}", serde_json::to_string_pretty(&info)?);
            return Ok(());
        }
        Commands::Native => pipeline.native_job(),
        Commands::Target { triple } => {
            let target = TargetSpec::parse(&triple)?;
            if !pipeline.matrix.targets.contains(&target) {
                return Err(format!(
                    "target '{}' is not declared in the '{}' matrix",
                    target, pipeline.matrix.name
                )
                .into());
            }
            JobSpec::matrix_entry(&pipeline.matrix.name, target, &pipeline.matrix.needs)
        }
    };

    info!(job = %job.name, pipeline = %pipeline.name, "Running job on this worker");

    let mut env = config.worker_env(&job.id);
    let outcome = executor.execute(&job, &mut env).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    match outcome.failure {
        None => Ok(()),
        Some((kind, message)) => Err(format!("{} failed ({:?}): {}", job.name, kind, message).into()),
    }
}
