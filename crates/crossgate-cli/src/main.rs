//! crossgate CLI - evaluate triggers, plan and run pipelines locally.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crossgate_core::{
    AggregationPolicy, JobSpec, PipelineDefinition, PipelineEvent, PipelineEventType,
    TriggerDecision, TriggerEvent,
};
use crossgate_orchestrator::{LocalDispatcher, Orchestrator, OrchestratorConfig, ToolchainHome};
use crossgate_worker::{HttpFetcher, ProcessRunner, WorkerConfig};

/// crossgate - native gate plus cross-target test matrix
#[derive(Parser)]
#[command(name = "crossgate")]
#[command(about = "Native-then-cross test pipeline runner", long_about = None)]
#[command(version)]
struct Cli {
    /// Pipeline definition (defaults to crossgate.toml in the project, then built-in)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project checkout to test
    #[arg(long, global = true, default_value = ".")]
    project_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide whether an event starts a run
    Check {
        /// Event JSON file, or '-' for stdin
        #[arg(short, long)]
        event: PathBuf,
    },

    /// Print the jobs a run would start
    Plan {
        /// Event JSON file, or '-' for stdin
        #[arg(short, long)]
        event: Option<PathBuf>,
    },

    /// Run the pipeline on this machine
    Run {
        /// Event JSON file, or '-' for stdin; without one the run is unconditional
        #[arg(short, long)]
        event: Option<PathBuf>,

        /// How job results decide the run verdict
        #[arg(long, value_parser = parse_policy)]
        policy: Option<AggregationPolicy>,

        /// Install the toolchain here and share it between jobs
        #[arg(long)]
        cargo_home: Option<PathBuf>,

        /// Maximum matrix jobs in flight (at least 1)
        #[arg(long)]
        max_parallel: Option<NonZeroUsize>,
    },

    /// Print the effective pipeline definition
    #[command(name = "show-config")]
    ShowConfig,
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
    let pipeline = PipelineDefinition::load(cli.config.as_deref(), &cli.project_dir)?;

    match cli.command {
        Commands::Check { event } => {
            check(&pipeline, &event)?;
        }
        Commands::Plan { event } => {
            plan(&pipeline, event.as_deref())?;
        }
        Commands::Run {
            event,
            policy,
            cargo_home,
            max_parallel,
        } => {
            let config = OrchestratorConfig {
                policy,
                max_parallel,
            };
            run(pipeline, event.as_deref(), config, cli.project_dir, cargo_home).await?;
        }
        Commands::ShowConfig => {
            print!("{}", pipeline.to_toml_string()?);
        }
    }

    Ok(())
}

fn check(pipeline: &PipelineDefinition, event: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let decision = evaluate(pipeline, event)?;
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

fn plan(
    pipeline: &PipelineDefinition,
    event: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let decision = match event {
        Some(path) => Some(evaluate(pipeline, path)?),
        None => None,
    };

    let jobs: Vec<JobSpec> = if decision.as_ref().map_or(true, |d| d.should_run()) {
        std::iter::once(pipeline.native_job())
            .chain(pipeline.expand_matrix())
            .collect()
    } else {
        Vec::new()
    };

    let plan = serde_json::json!({
        "pipeline": pipeline.name,
        "policy": pipeline.policy,
        "decision": decision,
        "helper": {
            "version": pipeline.matrix.helper.version,
            "url": pipeline.matrix.helper.archive_url(),
        },
        "jobs": jobs,
    });
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

async fn run(
    pipeline: PipelineDefinition,
    event: Option<&Path>,
    config: OrchestratorConfig,
    project_dir: PathBuf,
    cargo_home: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = event {
        let decision = evaluate(&pipeline, path)?;
        if !decision.should_run() {
            info!(decision = ?decision, "Event does not start a run");
            println!("{}", serde_json::to_string_pretty(&decision)?);
            return Ok(());
        }
    }

    let pipeline = Arc::new(pipeline);
    let worker = WorkerConfig {
        project_dir,
        ..WorkerConfig::default()
    };
    let home = match cargo_home {
        Some(path) => ToolchainHome::Shared(path),
        None => ToolchainHome::PerJob,
    };
    let dispatcher = LocalDispatcher::new(
        Arc::new(ProcessRunner::new()),
        Arc::new(HttpFetcher::new()),
        pipeline.clone(),
        worker,
        home,
    );

    let config = limit_for_shared_toolchain(config, dispatcher.shares_toolchain());

    let (tx, rx) = mpsc::channel(64);
    let progress = tokio::spawn(print_progress(rx));

    let orchestrator = Orchestrator::new(pipeline, Arc::new(dispatcher))
        .with_config(config)
        .with_events(tx);

    let report = tokio::select! {
        result = orchestrator.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, aborting in-flight jobs");
            return Err("run interrupted".into());
        }
    };

    drop(orchestrator);
    let _ = progress.await;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.succeeded() {
        Ok(())
    } else {
        Err(format!(
            "run {} failed ({}, {:?} policy)",
            report.run_id, report.phase, report.policy
        )
        .into())
    }
}

/// Jobs sharing one toolchain home run one at a time.
fn limit_for_shared_toolchain(mut config: OrchestratorConfig, shared: bool) -> OrchestratorConfig {
    if shared && config.max_parallel != Some(NonZeroUsize::MIN) {
        info!("Shared toolchain home, running matrix jobs one at a time");
        config.max_parallel = Some(NonZeroUsize::MIN);
    }
    config
}

/// Read an event from `path` (or stdin for `-`) and evaluate it.
fn evaluate(
    pipeline: &PipelineDefinition,
    path: &Path,
) -> Result<TriggerDecision, Box<dyn std::error::Error>> {
    let event = read_event(path)?;
    Ok(pipeline.trigger_rules()?.evaluate(&event))
}

fn read_event(path: &Path) -> Result<TriggerEvent, Box<dyn std::error::Error>> {
    let contents = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read event '{}': {}", path.display(), e))?
    };
    Ok(serde_json::from_str(&contents)?)
}

fn parse_policy(s: &str) -> Result<AggregationPolicy, String> {
    match s {
        "native-only" => Ok(AggregationPolicy::NativeOnly),
        "all-targets" => Ok(AggregationPolicy::AllTargets),
        other => Err(format!(
            "unknown policy '{}', expected 'native-only' or 'all-targets'",
            other
        )),
    }
}

async fn print_progress(mut rx: mpsc::Receiver<PipelineEvent>) {
    while let Some(event) = rx.recv().await {
        eprintln!("{}", format_event(&event));
    }
}

fn format_event(event: &PipelineEvent) -> String {
    let detail = match event.event_type {
        PipelineEventType::RunStarted => event.metadata.get("pipeline"),
        PipelineEventType::JobStarted => event.metadata.get("job_name"),
        PipelineEventType::JobPassed => event.metadata.get("duration_ms"),
        PipelineEventType::JobFailed => event.metadata.get("error"),
        PipelineEventType::JobSkipped => event.metadata.get("reason"),
        PipelineEventType::RunFinished => event.metadata.get("success"),
    };
    let job = event.job_id.as_ref().map(|id| id.as_str()).unwrap_or("-");

    format!(
        "{}  {:<12}  {:<36}  {}",
        format_timestamp(event.timestamp_ms),
        event_type_name(event.event_type),
        job,
        detail.map(String::as_str).unwrap_or("")
    )
}

fn event_type_name(event_type: PipelineEventType) -> &'static str {
    match event_type {
        PipelineEventType::RunStarted => "RUN_STARTED",
        PipelineEventType::JobStarted => "STARTED",
        PipelineEventType::JobPassed => "PASSED",
        PipelineEventType::JobFailed => "FAILED",
        PipelineEventType::JobSkipped => "SKIPPED",
        PipelineEventType::RunFinished => "RUN_FINISHED",
    }
}

fn format_timestamp(ms: i64) -> String {
    use std::time::{Duration, UNIX_EPOCH};
    let d = Duration::from_millis(ms as u64);
    let dt = UNIX_EPOCH + d;
    let datetime: chrono::DateTime<chrono::Utc> = dt.into();
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}
