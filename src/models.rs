//! Core data models for the stock chat orchestrator

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

//
// ================= Messages =================
//

/// One entry of the conversation, tagged by who produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "kebab-case")]
pub enum Message {
    User { content: String },
    AssistantText { content: String },
    AssistantToolCall { calls: Vec<CallRecord> },
    ToolResult { results: Vec<ResultRecord> },
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Message::AssistantText {
            content: content.into(),
        }
    }

    pub fn tool_call(call: CallRecord) -> Self {
        Message::AssistantToolCall { calls: vec![call] }
    }

    pub fn tool_result(result: ResultRecord) -> Self {
        Message::ToolResult {
            results: vec![result],
        }
    }

    /// Call ids declared by this message (empty unless it is a tool call).
    pub fn call_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        let calls: &[CallRecord] = match self {
            Message::AssistantToolCall { calls } => calls,
            _ => &[],
        };
        calls.iter().map(|c| c.call_id)
    }

    /// Call ids answered by this message (empty unless it is a tool result).
    pub fn result_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        let results: &[ResultRecord] = match self {
            Message::ToolResult { results } => results,
            _ => &[],
        };
        results.iter().map(|r| r.call_id)
    }

    pub fn role_name(&self) -> &'static str {
        match self {
            Message::User { .. } => "user",
            Message::AssistantText { .. } => "assistant-text",
            Message::AssistantToolCall { .. } => "assistant-tool-call",
            Message::ToolResult { .. } => "tool-result",
        }
    }
}

//
// ================= Call / Result Records =================
//

/// A model-declared intent to invoke a capability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallRecord {
    pub call_id: Uuid,
    pub capability_name: String,
    pub arguments: Value,
}

impl CallRecord {
    /// Mint a record with a fresh process-unique call id.
    pub fn new(capability_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: Uuid::new_v4(),
            capability_name: capability_name.into(),
            arguments,
        }
    }
}

/// The outcome paired with exactly one [`CallRecord`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultRecord {
    pub call_id: Uuid,
    pub capability_name: String,
    pub outcome: ToolOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolOutcome {
    Success { summary: String, data: Value },
    Failure { kind: FailureKind },
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }
}

/// Failure marker stored in place of the raw error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnknownCapability,
    InvalidArguments,
    Unavailable,
    TimedOut,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::UnknownCapability => "unknown capability",
            FailureKind::InvalidArguments => "invalid arguments",
            FailureKind::Unavailable => "unavailable",
            FailureKind::TimedOut => "timed out",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Market Data =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockQuote {
    pub symbol: String,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    #[serde(alias = "BUY", alias = "Buy")]
    Buy,
    #[serde(alias = "SELL", alias = "Sell")]
    Sell,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TradeAction::Buy => "buy",
            TradeAction::Sell => "sell",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trade {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub symbol: String,
    pub quantity: f64,
    pub price: f64,
    pub action: TradeAction,
    /// Kept as sent by the backend; see [`Trade::display_timestamp`].
    pub timestamp: String,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

impl Trade {
    /// Backends send either RFC 3339 or naive ISO timestamps.
    pub fn display_timestamp(&self) -> String {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&self.timestamp) {
            return parsed
                .with_timezone(&Utc)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string();
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(&self.timestamp, "%Y-%m-%dT%H:%M:%S%.f") {
            return naive.format("%Y-%m-%d %H:%M:%S").to_string();
        }
        self.timestamp.clone()
    }
}

//
// ================= Views =================
//

/// Renderable outcome of a turn, handed to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum View {
    Text(String),
    StockInfo(StockQuote),
    TradeHistory(Vec<Trade>),
}

impl View {
    pub fn text(content: impl Into<String>) -> Self {
        View::Text(content.into())
    }

    /// Plain-text rendering for terminals and logs.
    pub fn to_plain_text(&self) -> String {
        match self {
            View::Text(text) => text.clone(),
            View::StockInfo(quote) => format!("{}\n${:.2}", quote.symbol, quote.price),
            View::TradeHistory(trades) => {
                if trades.is_empty() {
                    return "No trades yet.".to_string();
                }

                let mut out = String::from("Symbol | Quantity | Price | Action | Timestamp\n");
                for trade in trades {
                    out.push_str(&format!(
                        "{} | {} | ${:.2} | {} | {}\n",
                        trade.symbol,
                        trade.quantity,
                        trade.price,
                        trade.action,
                        trade.display_timestamp()
                    ));
                }
                out
            }
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_plain_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_role_tags() {
        let msg = Message::user("hi");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "user");

        let call = CallRecord::new("lookup-price", json!({"symbol": "TSLA"}));
        let value = serde_json::to_value(Message::tool_call(call)).unwrap();
        assert_eq!(value["role"], "assistant-tool-call");
        assert_eq!(value["calls"][0]["capability_name"], "lookup-price");
    }

    #[test]
    fn test_call_and_result_ids() {
        let call = CallRecord::new("list-trade-history", json!({}));
        let id = call.call_id;
        let result = ResultRecord {
            call_id: id,
            capability_name: "list-trade-history".to_string(),
            outcome: ToolOutcome::Failure {
                kind: FailureKind::Unavailable,
            },
        };

        assert_eq!(Message::tool_call(call).call_ids().collect::<Vec<_>>(), vec![id]);
        assert_eq!(Message::tool_result(result).result_ids().collect::<Vec<_>>(), vec![id]);
        assert_eq!(Message::user("x").call_ids().count(), 0);
    }

    #[test]
    fn test_stock_info_rendering() {
        let view = View::StockInfo(StockQuote {
            symbol: "TSLA".to_string(),
            price: 250.13,
        });
        let text = view.to_plain_text();
        assert!(text.contains("TSLA"));
        assert!(text.contains("$250.13"));
    }

    #[test]
    fn test_trade_history_rendering() {
        let trades = vec![Trade {
            id: "1".to_string(),
            symbol: "AAPL".to_string(),
            quantity: 10.0,
            price: 189.5,
            action: TradeAction::Buy,
            timestamp: "2024-03-01T14:30:00Z".to_string(),
        }];
        let text = View::TradeHistory(trades).to_plain_text();
        assert!(text.starts_with("Symbol | Quantity"));
        assert!(text.contains("AAPL | 10 | $189.50 | buy | 2024-03-01 14:30:00"));

        assert_eq!(View::TradeHistory(vec![]).to_plain_text(), "No trades yet.");
    }

    #[test]
    fn test_trade_deserializes_uppercase_action() {
        let trade: Trade = serde_json::from_value(json!({
            "id": 7,
            "symbol": "MSFT",
            "quantity": 3,
            "price": 410.0,
            "action": "SELL",
            "timestamp": "2024-03-01T14:30:00"
        }))
        .unwrap();
        assert_eq!(trade.id, "7");
        assert_eq!(trade.action, TradeAction::Sell);
        assert_eq!(trade.display_timestamp(), "2024-03-01 14:30:00");
    }
}
