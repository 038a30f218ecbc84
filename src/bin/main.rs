use clap::Parser;
use retail_analytics_copilot::{
    agent::Orchestrator,
    batch::{read_questions, run_batch, write_outputs},
    config::AgentConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "copilot", about = "Answer a JSONL batch of retail analytics questions")]
struct Cli {
    /// Input questions, one JSON object per line
    #[arg(long)]
    batch: PathBuf,
    /// Output records, one JSON object per line
    #[arg(long)]
    out: PathBuf,
    /// Directory for per-question trace files
    #[arg(long, default_value = "traces")]
    trace_dir: PathBuf,
    /// Questions answered at once
    #[arg(long, default_value_t = 1)]
    concurrency: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AgentConfig::from_env()?;

    info!(
        batch = %cli.batch.display(),
        out = %cli.out.display(),
        docs = %config.docs_dir.display(),
        db = %config.db_path.display(),
        model = %config.gemini_model,
        "Retail analytics copilot starting"
    );

    let orchestrator = Orchestrator::from_config(&config)?;
    orchestrator.index().ensure_built();

    let questions = read_questions(&cli.batch).await?;
    info!(count = questions.len(), "Questions loaded");

    let outputs = run_batch(
        Arc::new(orchestrator),
        questions,
        cli.concurrency,
        Some(cli.trace_dir),
    )
    .await;

    write_outputs(&cli.out, &outputs).await?;

    info!(count = outputs.len(), out = %cli.out.display(), "Results written");

    Ok(())
}
