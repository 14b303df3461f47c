// crates/stepcli/src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use stepactions::{ActionHandlers, DEFAULT_LATENCY};
use stepcore::{Position, ProgressEvent, RunOutcome, StepStatus, TypeRegistry, WorkflowGraph};
use stepruntime::{
    Canvas, CoalescedRenderer, ExecutionEngine, FlowSession, SessionConfig, TokioTicks,
    UpdateScheduler,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

#[derive(Parser)]
#[command(name = "flowrun")]
#[command(about = "Step flow runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a flow file
    Run {
        /// Path to flow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Session configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Simulated latency of stubbed steps, in milliseconds
        #[arg(long)]
        latency_ms: Option<u64>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Import a flow file and check that it can be ordered
    Validate {
        /// Path to flow JSON file
        file: PathBuf,
    },

    /// List available step types
    Types {
        /// Restrict the listing to these type ids
        #[arg(long, value_delimiter = ',')]
        enabled: Vec<String>,
    },

    /// Create an example flow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            config,
            latency_ms,
            verbose,
        } => {
            if verbose {
                tracing_subscriber::fmt()
                    .with_max_level(tracing::Level::DEBUG)
                    .init();
            } else {
                tracing_subscriber::fmt()
                    .with_max_level(tracing::Level::INFO)
                    .init();
            }

            let config = match config {
                Some(path) => SessionConfig::from_file(&path)?,
                None => SessionConfig::default(),
            };
            let latency = latency_ms.map(Duration::from_millis).unwrap_or(DEFAULT_LATENCY);
            run_flow(file, config, latency).await?;
        }

        Commands::Validate { file } => {
            validate_flow(file)?;
        }

        Commands::Types { enabled } => {
            list_types(enabled);
        }

        Commands::Init { output } => {
            create_example_flow(output)?;
        }
    }

    Ok(())
}

/// Headless canvas: redraws are only traced
struct LogCanvas;

impl Canvas for LogCanvas {
    fn redraw_edges(&self) -> Result<()> {
        tracing::debug!("Edge geometry recomputed");
        Ok(())
    }

    fn resize_bounds(&self) -> Result<()> {
        tracing::debug!("Canvas bounds recomputed");
        Ok(())
    }
}

async fn run_flow(file: PathBuf, config: SessionConfig, latency: Duration) -> Result<()> {
    println!("🚀 Loading flow from: {}", file.display());

    let ticks = TokioTicks::current(Duration::from_millis(config.tick_interval_ms))?;
    let session = FlowSession::new(Arc::new(TypeRegistry::builtin()), config);
    let scheduler = UpdateScheduler::new(Arc::new(ticks));
    let renderer = CoalescedRenderer::new(scheduler, Arc::new(LogCanvas));
    session.attach_renderer(Arc::new(renderer)).await;

    let summary = session.load_file(&file).await?;
    {
        let graph = session.graph().read().await;
        println!("📋 Steps: {}", graph.steps().len());
        println!("   Edges: {}", graph.edges().len());
    }
    if summary.invalid > 0 || summary.dropped_edges > 0 {
        println!(
            "⚠️  Skipped {} invalid step(s) and {} edge(s)",
            summary.invalid, summary.dropped_edges
        );
    }
    println!();

    let event_task = tokio::spawn(print_progress(session.subscribe_events()));

    let handlers = ActionHandlers::standard(latency);
    let report = session.run(&handlers).await?;

    // closes the bus so the listener drains what is buffered and stops
    drop(session);
    event_task.await?;

    println!();
    println!("📊 Run Summary:");
    println!("   Run ID: {}", report.run_id);
    println!(
        "   Completed: {}/{} steps",
        report.results.len(),
        report.order.len()
    );

    let mut outputs: Vec<_> = report
        .results
        .iter()
        .filter(|(_, output)| !output.is_null())
        .collect();
    if !outputs.is_empty() {
        outputs.sort_by(|a, b| a.0.cmp(b.0));
        println!();
        println!("📤 Outputs:");
        for (step_id, output) in outputs {
            println!("   {}: {}", step_id, output);
        }
    }

    if !report.is_completed() {
        anyhow::bail!("run did not complete");
    }
    Ok(())
}

/// Prints progress until the run finishes or the bus closes, returning the
/// number of events printed
async fn print_progress(mut events: broadcast::Receiver<ProgressEvent>) -> usize {
    let mut printed = 0;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Progress listener fell behind, {} event(s) skipped", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        printed += 1;
        match event {
            ProgressEvent::RunStarted { total_steps, .. } => {
                println!("▶️  Run started ({} steps)", total_steps);
            }
            ProgressEvent::StepUpdate { progress, .. } => match progress.status {
                StepStatus::Running => {
                    println!("  ⚡ Starting step: {}", progress.step_id);
                }
                StepStatus::Ok => match progress.message {
                    Some(message) => println!("  ✅ Step {}: {}", progress.step_id, message),
                    None => println!("  ✅ Step {} completed", progress.step_id),
                },
                StepStatus::Error => {
                    println!(
                        "  ❌ Step {} failed: {}",
                        progress.step_id,
                        progress.message.unwrap_or_default()
                    );
                }
            },
            ProgressEvent::RunFinished {
                outcome,
                duration_ms,
                ..
            } => {
                match outcome {
                    RunOutcome::Completed => {
                        println!("✨ Run completed successfully in {}ms", duration_ms);
                    }
                    RunOutcome::Aborted(reason) => {
                        println!("💥 Run aborted after {}ms: {}", duration_ms, reason);
                    }
                }
                break;
            }
        }
    }
    printed
}

fn validate_flow(file: PathBuf) -> Result<()> {
    println!("🔍 Validating flow: {}", file.display());

    let text = std::fs::read_to_string(&file)?;
    let registry = TypeRegistry::builtin();
    let mut graph = WorkflowGraph::new();
    let summary = graph.import_json(&text, &registry)?;

    println!("   Imported steps: {}", summary.imported);
    println!("   Edges: {}", graph.edges().len());
    for issue in &summary.issues {
        println!("   ⚠️  {}", issue);
    }

    match ExecutionEngine::default().run_order(&graph.snapshot()) {
        Ok(order) => {
            println!("✅ Flow is valid");
            println!("   Order: {}", order.join(" → "));
            Ok(())
        }
        Err(e) => {
            println!("❌ {}", e);
            Err(e.into())
        }
    }
}

fn list_types(enabled: Vec<String>) {
    println!("📦 Available Step Types:");

    let mut registry = TypeRegistry::builtin();
    if !enabled.is_empty() {
        registry = registry.with_enabled(enabled);
    }

    for (category, defs) in registry.list_by_category() {
        println!();
        println!("  [{}]", category);
        for def in defs {
            println!("  • {} ({})", def.id, def.name);
            if !def.description.is_empty() {
                println!("    {}", def.description);
            }
        }
    }
}

fn create_example_flow(output: PathBuf) -> Result<()> {
    let registry = TypeRegistry::builtin();
    let mut graph = WorkflowGraph::new();

    let chain = [
        ("open_page", Position::new(100.0, 100.0)),
        ("read_csv", Position::new(300.0, 100.0)),
        ("write_txt", Position::new(500.0, 100.0)),
        ("close_browser", Position::new(700.0, 100.0)),
    ];
    let mut ids = Vec::new();
    for (type_id, position) in chain {
        let def = registry
            .get_def_by_id(type_id)
            .ok_or_else(|| anyhow::anyhow!("unknown step type {}", type_id))?;
        ids.push(graph.place_step(def, position));
    }

    graph.set_property(&ids[0], "url", "https://example.com");
    graph.set_property(&ids[1], "path", "data.csv");
    graph.set_property(&ids[2], "variable", serde_json::json!(["a", "b", "c"]));
    graph.set_property(&ids[2], "path", "out.txt");
    graph.set_property(&ids[2], "delimiter", ";");

    std::fs::write(&output, graph.export_json()?)?;

    println!("✨ Created example flow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  flowrun run --file {}", output.display());

    Ok(())
}
