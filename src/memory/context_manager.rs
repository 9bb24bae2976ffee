//! Context Window Management
//!
//! Chooses which part of the conversation is sent to the model.
//! The store itself is never truncated; only the model's view is bounded.

use crate::models::Message;
use tracing::debug;

/// Configuration for context window management
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Maximum number of messages handed to the model per turn
    pub max_context_messages: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_messages: 40,
        }
    }
}

/// Bounds the history handed to the model
pub struct ContextManager {
    config: ContextConfig,
}

impl ContextManager {
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
        }
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Most recent suffix of `messages` that fits the window.
    ///
    /// The window never opens on a tool result, since its call would be
    /// cut off. A zero-sized config still keeps the newest message.
    pub fn select_window<'a>(&self, messages: &'a [Message]) -> &'a [Message] {
        let max = self.config.max_context_messages.max(1);
        if messages.len() <= max {
            return messages;
        }

        let mut start = messages.len() - max;
        while start < messages.len() - 1
            && matches!(messages[start], Message::ToolResult { .. })
        {
            start += 1;
        }

        debug!(
            total = messages.len(),
            dropped = start,
            "Context window truncated oldest messages"
        );

        &messages[start..]
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CallRecord, FailureKind, ResultRecord, ToolOutcome};
    use serde_json::json;

    fn manager(max: usize) -> ContextManager {
        ContextManager::with_config(ContextConfig {
            max_context_messages: max,
        })
    }

    #[test]
    fn test_context_manager_creation() {
        let manager = ContextManager::new();
        assert_eq!(manager.config().max_context_messages, 40);
    }

    #[test]
    fn test_short_history_untouched() {
        let messages = vec![Message::user("hi"), Message::assistant_text("hello")];
        assert_eq!(manager(10).select_window(&messages), &messages[..]);
    }

    #[test]
    fn test_keeps_most_recent() {
        let messages: Vec<Message> = (0..10)
            .map(|i| Message::user(format!("Question {}", i)))
            .collect();

        let window = manager(3).select_window(&messages);
        assert_eq!(window.len(), 3);
        assert_eq!(window[0], Message::user("Question 7"));
    }

    #[test]
    fn test_window_never_opens_on_tool_result() {
        let call = CallRecord::new("list-trade-history", json!({}));
        let result = ResultRecord {
            call_id: call.call_id,
            capability_name: "list-trade-history".to_string(),
            outcome: ToolOutcome::Failure {
                kind: FailureKind::Unavailable,
            },
        };
        let messages = vec![
            Message::user("show trades"),
            Message::tool_call(call),
            Message::tool_result(result),
            Message::user("thanks"),
            Message::assistant_text("you're welcome"),
        ];

        let window = manager(3).select_window(&messages);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0], Message::user("thanks"));
    }

    #[test]
    fn test_zero_window_keeps_latest() {
        let messages = vec![Message::user("a"), Message::user("b")];
        let window = manager(0).select_window(&messages);
        assert_eq!(window, &messages[1..]);
    }
}
