use stock_chat_orchestrator::{
    agent::Orchestrator,
    api::start_server,
    config::OrchestratorConfig,
    gemini::GeminiClient,
    state::InMemorySessionStore,
    tools::{create_default_registry, FinancialApiClient},
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = OrchestratorConfig::from_env()?;

    if config.gemini_api_key.is_empty() {
        warn!("GEMINI_API_KEY not set; every turn will answer with an apology");
    }

    info!("Stock Chat Orchestrator - API Server");
    info!(
        port = config.port,
        model = %config.gemini_model,
        backend = %config.financial_api_base_url,
        "Configuration loaded"
    );

    // Create components
    let api = FinancialApiClient::new(&config.financial_api_base_url)?;
    let registry = create_default_registry(api)?;
    let model = GeminiClient::new(config.gemini_api_key.clone(), config.gemini_model.clone())?;
    let sessions = Arc::new(InMemorySessionStore::new());

    let orchestrator = Orchestrator::new(Arc::new(model), registry, sessions, &config);

    info!("Orchestrator initialized");

    start_server(orchestrator, config.port).await?;

    Ok(())
}
