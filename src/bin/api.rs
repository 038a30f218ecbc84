use retail_analytics_copilot::{agent::Orchestrator, api::start_server, config::AgentConfig};
use std::sync::Arc;
use tracing::info;

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

    let config = AgentConfig::from_env()?;

    info!("Retail Analytics Copilot - API Server");
    info!("Port: {}", config.port);

    let orchestrator = Orchestrator::from_config(&config)?;
    let index = orchestrator.index().ensure_built();
    info!(chunks = index.chunks().len(), "Document index ready");

    start_server(Arc::new(orchestrator), config.port).await?;

    Ok(())
}
