//! C4Forge CLI
//!
//! Command-line front end: generate a C4 model from one brief, a directory of
//! briefs, or a saved checkpoint, and inspect generated artifacts.

use anyhow::Context;
use c4forge_core::backend::BackendRegistry;
use c4forge_core::config::{AnalysisStrategy, WorkflowConfig};
use c4forge_core::state::io::{load_artifacts, load_briefs_from_dir, read_brief, save_artifacts};
use c4forge_core::state::{Checkpointer, LevelOutput, SqliteCheckpointer};
use c4forge_core::workflow::{BatchRunner, Coordinator, WorkflowEvent, WorkflowEventKind};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Parser)]
#[command(author, version, about = "C4Forge - level-by-level C4 architecture model generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a model from one brief file
    Run {
        /// Brief file (plain text or YAML)
        brief: PathBuf,
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Generate one model per *.yaml / *.yml brief in a directory
    Batch {
        dir: PathBuf,
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Continue a failed run from its last checkpoint (requires --checkpoint-db)
    Resume {
        run_id: String,
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Print per-level completeness of an artifacts directory
    Show { dir: PathBuf },
}

#[derive(Args, Clone)]
struct RunOpts {
    /// Generation capability (model name, e.g. gpt-4o or claude-3-5-sonnet-latest)
    #[arg(short, long)]
    model: Option<String>,
    /// Analysis strategy: simple or collaborative
    #[arg(short, long)]
    strategy: Option<AnalysisStrategy>,
    /// Discussion rounds for collaborative analysis
    #[arg(short, long)]
    rounds: Option<u32>,
    /// Results directory (artifacts go to <out>/<run-id>/)
    #[arg(short, long)]
    out: Option<PathBuf>,
    /// Save a checkpoint after every step to this SQLite database
    #[arg(long)]
    checkpoint_db: Option<PathBuf>,
    /// Config file (defaults to .c4forge/config.json)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl RunOpts {
    async fn config(&self) -> anyhow::Result<WorkflowConfig> {
        let mut config = match &self.config {
            Some(path) => WorkflowConfig::load_from(path).await?,
            None => WorkflowConfig::load().await?,
        };
        if let Some(model) = &self.model {
            config.capability = model.clone();
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(rounds) = self.rounds {
            config.collab_rounds = rounds;
        }
        if let Some(out) = &self.out {
            config.results_dir = out.clone();
        }
        config.validate()?;
        Ok(config)
    }

    fn checkpointer(&self) -> anyhow::Result<Option<Arc<dyn Checkpointer>>> {
        let Some(path) = &self.checkpoint_db else {
            return Ok(None);
        };
        let checkpointer: Arc<dyn Checkpointer> = Arc::new(SqliteCheckpointer::open_at(path)?);
        Ok(Some(checkpointer))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { brief, opts } => run(&brief, &opts).await,
        Command::Batch { dir, opts } => batch(&dir, &opts).await,
        Command::Resume { run_id, opts } => resume(&run_id, &opts).await,
        Command::Show { dir } => show(&dir).await,
    }
}

/// Print events as they arrive
fn spawn_event_printer() -> (mpsc::Sender<WorkflowEvent>, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<WorkflowEvent>(256);
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let location = match (&event.level, &event.target) {
                (Some(level), Some(target)) => format!("{} '{}'", level, target),
                (Some(level), None) => level.to_string(),
                (None, Some(target)) => format!("'{}'", target),
                (None, None) => String::new(),
            };
            match event.kind {
                WorkflowEventKind::FieldGenerated => {
                    let field = event
                        .data
                        .as_ref()
                        .and_then(|d| d.get("field"))
                        .and_then(|f| f.as_str())
                        .unwrap_or("field");
                    println!("   ✅ {} {}", location, field);
                }
                WorkflowEventKind::TeamTurn => {
                    let role = event
                        .data
                        .as_ref()
                        .and_then(|d| d.get("role"))
                        .and_then(|r| r.as_str())
                        .unwrap_or("member");
                    println!("   💬 {} ({})", role, location);
                }
                WorkflowEventKind::QueuePopulated => {
                    let targets = event
                        .data
                        .as_ref()
                        .and_then(|d| d.get("targets"))
                        .map(|t| t.to_string())
                        .unwrap_or_default();
                    println!("   📋 Component targets: {}", targets);
                }
                WorkflowEventKind::TargetCompleted => println!("   🏁 Completed {}", location),
                WorkflowEventKind::RunFailed => println!("   ❌ Run {} failed", event.run_id),
                _ => {}
            }
        }
    });
    (tx, handle)
}

async fn run_coordinator(
    mut coordinator: Coordinator,
    config: &WorkflowConfig,
) -> anyhow::Result<()> {
    let (tx, printer) = spawn_event_printer();
    coordinator = coordinator.with_event_channel(tx);

    let run_id = coordinator.run_id().to_string();
    println!("🚀 Run {}", run_id);
    let result = coordinator.run().await;

    let dir = config.results_dir.join(&run_id);
    save_artifacts(&dir, &coordinator.state().model).await?;
    drop(coordinator);
    let _ = printer.await;

    match result {
        Ok(outcome) => {
            println!(
                "✅ Done in {} steps, {} components. Artifacts: {}",
                outcome.steps_taken,
                outcome.model.completed_components(),
                dir.display()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Run failed: {}", e);
            eprintln!("   Partial artifacts: {}", dir.display());
            Err(e.into())
        }
    }
}

async fn run(brief_path: &Path, opts: &RunOpts) -> anyhow::Result<()> {
    let config = opts.config().await?;
    let (name, brief) = read_brief(brief_path).await?;

    let mut coordinator =
        Coordinator::for_brief(config.clone(), &BackendRegistry::new(), &name, &brief)?;
    if let Some(checkpointer) = opts.checkpointer()? {
        coordinator = coordinator.with_checkpointer(checkpointer);
    }
    run_coordinator(coordinator, &config).await
}

async fn resume(run_id: &str, opts: &RunOpts) -> anyhow::Result<()> {
    let config = opts.config().await?;
    let checkpointer = opts
        .checkpointer()?
        .context("resume needs --checkpoint-db")?;
    let checkpoint = checkpointer
        .load(run_id)?
        .with_context(|| format!("No checkpoint for run '{}'", run_id))?;

    println!("🔄 Resuming {} at {}", run_id, checkpoint.step);
    let backend = BackendRegistry::new().resolve(&config.capability, config.temperature)?;
    let coordinator =
        Coordinator::resume(config.clone(), backend, checkpoint)?.with_checkpointer(checkpointer);
    run_coordinator(coordinator, &config).await
}

async fn batch(dir: &Path, opts: &RunOpts) -> anyhow::Result<()> {
    let config = opts.config().await?;
    let briefs = load_briefs_from_dir(dir).await?;
    if briefs.is_empty() {
        println!("No briefs found in {}", dir.display());
        return Ok(());
    }
    println!("🚀 Running {} briefs ({} at a time)", briefs.len(), config.max_concurrent_runs);

    let (tx, printer) = spawn_event_printer();
    let mut runner =
        BatchRunner::from_registry(config, &BackendRegistry::new())?.with_event_channel(tx);
    if let Some(checkpointer) = opts.checkpointer()? {
        runner = runner.with_checkpointer(checkpointer);
    }
    let results = runner.run(briefs).await;
    drop(runner);
    let _ = printer.await;

    let mut failed = 0;
    for result in &results {
        let location = result
            .artifacts_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "(not saved)".to_string());
        match &result.error {
            None => println!("✅ {} -> {}", result.name, location),
            Some(e) => {
                failed += 1;
                println!("❌ {}: {} (partial: {})", result.name, e, location);
            }
        }
    }
    println!("{} of {} runs succeeded", results.len() - failed, results.len());

    if failed > 0 {
        anyhow::bail!("{} run(s) failed", failed);
    }
    Ok(())
}

fn completeness(output: &LevelOutput) -> String {
    let mark = |present: bool| if present { "✅" } else { "·" };
    format!(
        "analysis {}  definition {}  diagram {}",
        mark(output.analysis.is_some()),
        mark(output.structured_definition.is_some()),
        mark(output.diagram.is_some())
    )
}

async fn show(dir: &Path) -> anyhow::Result<()> {
    let model = load_artifacts(dir).await?;

    println!("📂 {}", dir.display());
    println!("   Level 1 context:    {}", completeness(&model.context));
    println!("   Level 2 containers: {}", completeness(&model.containers));
    if model.components.is_empty() {
        println!("   Level 3 components: none");
    }
    for (name, output) in &model.components {
        println!("   Level 3 '{}': {}", name, completeness(output));
    }
    println!(
        "   {} of {} components complete",
        model.completed_components(),
        model.components.len()
    );
    Ok(())
}
