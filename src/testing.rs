//! Shared test fixtures: an in-process financial backend and a
//! capability that counts its external calls.

use crate::error::OrchestrationError;
use crate::models::{StockQuote, View};
use crate::tools::{Capability, FinancialApiClient, ToolRegistry};
use crate::Result;
use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Symbol the fake backend answers with a 500
pub const FAILING_SYMBOL: &str = "FAIL";
/// Symbol the fake backend answers only after a long delay
pub const SLOW_SYMBOL: &str = "SLOW";

pub struct TestBackend {
    pub base_url: String,
    handle: JoinHandle<()>,
}

impl TestBackend {
    pub fn client(&self) -> FinancialApiClient {
        FinancialApiClient::new(&self.base_url).unwrap()
    }

    pub fn registry(&self) -> ToolRegistry {
        crate::tools::create_default_registry(self.client()).unwrap()
    }
}

impl Drop for TestBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn stock_price(
    Query(params): Query<HashMap<String, String>>,
) -> std::result::Result<Json<Value>, StatusCode> {
    let symbol = params.get("symbol").cloned().unwrap_or_default();
    match symbol.as_str() {
        FAILING_SYMBOL => Err(StatusCode::INTERNAL_SERVER_ERROR),
        SLOW_SYMBOL => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Json(json!({"symbol": symbol, "price": 1.0})))
        }
        "TSLA" => Ok(Json(json!({"symbol": "TSLA", "price": 250.13}))),
        _ => Ok(Json(json!({"symbol": symbol, "price": 100.0}))),
    }
}

async fn trade_history() -> Json<Value> {
    Json(json!([
        {
            "id": "t-1",
            "symbol": "AAPL",
            "quantity": 10,
            "price": 189.5,
            "action": "buy",
            "timestamp": "2024-03-01T14:30:00Z"
        },
        {
            "id": "t-2",
            "symbol": "TSLA",
            "quantity": 2,
            "price": 250.13,
            "action": "sell",
            "timestamp": "2024-03-02T09:00:00Z"
        }
    ]))
}

/// Serve the fake backend on an ephemeral local port
pub async fn spawn_backend() -> TestBackend {
    let router = Router::new()
        .route("/api/stock-price", get(stock_price))
        .route("/api/trade-history", get(trade_history));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    TestBackend {
        base_url: format!("http://{}", addr),
        handle,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CountingArgs {
    pub symbol: String,
}

/// Capability that records how often its external call ran
#[derive(Default)]
pub struct CountingTool {
    calls: Arc<AtomicUsize>,
}

impl CountingTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Capability for CountingTool {
    type Args = CountingArgs;
    type Output = StockQuote;

    fn name(&self) -> &'static str {
        "counting"
    }

    fn description(&self) -> &'static str {
        "counts external calls"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {"symbol": {"type": "string"}}, "required": ["symbol"]})
    }

    fn check(&self, args: &CountingArgs) -> Result<()> {
        if args.symbol.is_empty() {
            return Err(OrchestrationError::InvalidToolInput("empty symbol".to_string()));
        }
        Ok(())
    }

    async fn fetch(&self, args: &CountingArgs) -> Result<StockQuote> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(StockQuote {
            symbol: args.symbol.clone(),
            price: 1.0,
        })
    }

    fn render(&self, quote: &StockQuote) -> View {
        View::StockInfo(quote.clone())
    }

    fn summary(&self, args: &CountingArgs) -> String {
        format!("counted {}", args.symbol)
    }

    fn apology(&self) -> &'static str {
        "Sorry, counting failed."
    }
}
