//! `list-trade-history`: every recorded buy and sell

use super::{Capability, FinancialApiClient};
use crate::models::{Trade, View};
use crate::Result;
use serde::Deserialize;
use serde_json::{json, Value};

pub const LIST_TRADE_HISTORY: &str = "list-trade-history";

/// Takes no arguments; anything but an object is rejected.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeHistoryArgs {}

pub struct TradeHistoryTool {
    api: FinancialApiClient,
}

impl TradeHistoryTool {
    pub fn new(api: FinancialApiClient) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl Capability for TradeHistoryTool {
    type Args = TradeHistoryArgs;
    type Output = Vec<Trade>;

    fn name(&self) -> &'static str {
        LIST_TRADE_HISTORY
    }

    fn description(&self) -> &'static str {
        "view the history of trades"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn fetch(&self, _args: &TradeHistoryArgs) -> Result<Vec<Trade>> {
        self.api.get_json("/api/trade-history", &[]).await
    }

    fn render(&self, trades: &Vec<Trade>) -> View {
        View::TradeHistory(trades.clone())
    }

    fn summary(&self, _args: &TradeHistoryArgs) -> String {
        "Trade history has been fetched and is displayed on the screen".to_string()
    }

    fn apology(&self) -> &'static str {
        "Sorry, I couldn't fetch the trade history at the moment. Please try again later."
    }
}
