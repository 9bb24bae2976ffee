//! `lookup-price`: current price for one stock symbol

use super::{Capability, FinancialApiClient};
use crate::error::OrchestrationError;
use crate::models::{StockQuote, View};
use crate::Result;
use serde::Deserialize;
use serde_json::{json, Value};

pub const LOOKUP_PRICE: &str = "lookup-price";

#[derive(Debug, Clone, Deserialize)]
pub struct PriceArgs {
    pub symbol: String,
}

pub struct StockPriceTool {
    api: FinancialApiClient,
}

impl StockPriceTool {
    pub fn new(api: FinancialApiClient) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl Capability for StockPriceTool {
    type Args = PriceArgs;
    type Output = StockQuote;

    fn name(&self) -> &'static str {
        LOOKUP_PRICE
    }

    fn description(&self) -> &'static str {
        "search for a stock price and display basic information"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": {
                    "type": "string",
                    "description": "The stock symbol to search for"
                }
            },
            "required": ["symbol"]
        })
    }

    fn check(&self, args: &PriceArgs) -> Result<()> {
        if args.symbol.trim().is_empty() {
            return Err(OrchestrationError::InvalidToolInput(
                "lookup-price: 'symbol' must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    async fn fetch(&self, args: &PriceArgs) -> Result<StockQuote> {
        self.api
            .get_json("/api/stock-price", &[("symbol", args.symbol.trim())])
            .await
    }

    fn render(&self, quote: &StockQuote) -> View {
        View::StockInfo(quote.clone())
    }

    fn summary(&self, args: &PriceArgs) -> String {
        format!(
            "Stock information for {} has been fetched and is displayed on the screen",
            args.symbol.trim()
        )
    }

    fn apology(&self) -> &'static str {
        "Sorry, I couldn't fetch the stock information at the moment. Please try again later."
    }
}
