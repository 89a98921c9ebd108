//! CLI front end for the graphcfg resource pipeline: builds the fixture
//! graph, runs the Pipeline Driver over it, and prints the result. This is
//! a thin illustrative surface, not a production configuration-management
//! front end.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use graphcfg_core::record::AsRecord;
use graphcfg_pipeline::{PipelineConfig, PreparerRegistry, VertexOutcome, run};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

mod fixtures;

#[derive(Parser)]
#[command(name = "graphcfg", about = "Graph-based configuration resource pipeline")]
struct Cli {
    /// Project root to load `graphcfg.toml` from (defaults to current directory)
    #[arg(short, long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the fixture graph, run the pipeline, and print each vertex's
    /// rendered fields as JSON
    Render,
    /// Print vertex and edge counts for the fixture graph
    Info,
}

fn get_project_root(cli: &Cli) -> Result<PathBuf> {
    match &cli.project {
        Some(p) => Ok(p.clone()),
        None => std::env::current_dir().context("failed to get current directory"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let project_root = get_project_root(&cli)?;

    match cli.command {
        Commands::Render => cmd_render(&project_root).await,
        Commands::Info => cmd_info(),
    }
}

async fn cmd_render(project_root: &PathBuf) -> Result<()> {
    let config = PipelineConfig::load(project_root).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "falling back to default pipeline config");
        PipelineConfig::default()
    });

    let graph = Arc::new(fixtures::build());
    let preparers = Arc::new(PreparerRegistry::with_builtins());
    let cancel = Arc::new(AtomicBool::new(false));

    let report = run(graph, preparers, config, cancel)
        .await
        .context("pipeline run failed")?;

    let mut ids: Vec<_> = report.outcomes.keys().cloned().collect();
    ids.sort();

    let mut by_vertex = serde_json::Map::new();
    for id in &ids {
        let entry = match &report.outcomes[id] {
            VertexOutcome::Rendered { fields, task } => serde_json::json!({
                "status": "rendered",
                "fields": fields,
                "task": task.summary,
            }),
            VertexOutcome::Failed(reason) => serde_json::json!({
                "status": "failed",
                "reason": reason,
            }),
            VertexOutcome::Skipped => serde_json::json!({ "status": "skipped" }),
            VertexOutcome::Aborted => serde_json::json!({ "status": "aborted" }),
        };
        by_vertex.insert(id.to_string(), entry);
    }

    println!("{}", serde_json::to_string_pretty(&by_vertex)?);

    if !report.succeeded() {
        eprintln!("warning: one or more vertices did not render successfully");
    }
    Ok(())
}

fn cmd_info() -> Result<()> {
    let graph = fixtures::build();
    println!("vertices: {}", graph.vertex_count());
    println!("edges: {}", graph.edge_count());

    let mut ids: Vec<_> = graph.vertices().collect();
    ids.sort();
    for id in ids {
        let kind = graph
            .get(id)
            .map(|v| v.as_record().type_name())
            .unwrap_or("?");
        println!("  {id} ({kind})");
    }
    Ok(())
}
