//! Interactive terminal chat against the configured model and backend.

use stock_chat_orchestrator::{
    agent::Orchestrator,
    api::SUGGESTIONS,
    config::OrchestratorConfig,
    gemini::GeminiClient,
    generation::ViewUpdate,
    models::View,
    state::InMemorySessionStore,
    tools::{create_default_registry, FinancialApiClient},
};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Logs go to stderr so they don't interleave with the streamed reply
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = OrchestratorConfig::from_env()?;

    let api = FinancialApiClient::new(&config.financial_api_base_url)?;
    let registry = create_default_registry(api)?;
    let model = GeminiClient::new(config.gemini_api_key.clone(), config.gemini_model.clone())?;
    let orchestrator = Orchestrator::new(
        Arc::new(model),
        registry,
        Arc::new(InMemorySessionStore::new()),
        &config,
    );

    let session_id = orchestrator.create_session().await?;
    info!(session_id = %session_id, "Chat session started");

    println!("Stock chat. Try one of:");
    for suggestion in SUGGESTIONS {
        println!("  - {}", suggestion);
    }
    println!("Type 'exit' to quit.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "exit" || text == "quit" {
            break;
        }

        let mut handle = orchestrator.send_message(session_id, text).await?;
        let mut shown = 0;

        while let Some(update) = handle.next().await {
            match update {
                ViewUpdate::Partial { text } => {
                    // Partials carry the full text so far; print only what's new.
                    if let Some(delta) = text.get(shown..) {
                        print!("{}", delta);
                        std::io::stdout().flush()?;
                    }
                    shown = text.len();
                }
                ViewUpdate::Final { view } => match view {
                    // Already streamed in full
                    View::Text(_) if shown > 0 => println!(),
                    view => {
                        if shown > 0 {
                            println!();
                        }
                        println!("{}", view);
                    }
                },
            }
        }
        println!();
    }

    orchestrator.end_session(session_id).await?;
    Ok(())
}
