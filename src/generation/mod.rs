//! Generation session
//!
//! Drives one streamed reply as a two-state machine:
//!
//! STREAMING --(text delta)--> STREAMING
//! STREAMING --(done)--------> SETTLED(text)   commits one assistant-text message
//! STREAMING --(tool call)---> SETTLED(tool)   commits nothing; dispatcher takes over
//!
//! Partial text is published to the live view but never committed.

use crate::error::OrchestrationError;
use crate::llm::{LanguageModel, ModelEvent, ModelRequest};
use crate::memory::ConversationStore;
use crate::models::Message;
use crate::Result;
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info};

pub mod view;

pub use view::{live_view, LiveView, ViewHandle, ViewUpdate};

/// How a turn settled
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Full reply text, already committed to the store
    Text(String),
    /// Capability the model asked for; nothing committed yet
    ToolCall { name: String, arguments: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnState {
    Streaming { text: String },
    Settled(TurnOutcome),
}

impl TurnState {
    pub fn new() -> Self {
        TurnState::Streaming {
            text: String::new(),
        }
    }

    /// Pure transition function. Settled is terminal.
    pub fn apply(self, event: ModelEvent) -> TurnState {
        match (self, event) {
            (settled @ TurnState::Settled(_), _) => settled,
            (TurnState::Streaming { mut text }, ModelEvent::TextDelta(delta)) => {
                text.push_str(&delta);
                TurnState::Streaming { text }
            }
            // A tool declaration wins over any text streamed before it.
            (TurnState::Streaming { .. }, ModelEvent::ToolCall { name, arguments }) => {
                TurnState::Settled(TurnOutcome::ToolCall { name, arguments })
            }
            (TurnState::Streaming { text }, ModelEvent::Done) => {
                TurnState::Settled(TurnOutcome::Text(text))
            }
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, TurnState::Settled(_))
    }
}

impl Default for TurnState {
    fn default() -> Self {
        Self::new()
    }
}

/// One streamed reply against one session's store
pub struct GenerationSession<'a> {
    model: &'a dyn LanguageModel,
    store: &'a ConversationStore,
    live: &'a LiveView,
    state: TurnState,
}

impl<'a> GenerationSession<'a> {
    pub fn new(model: &'a dyn LanguageModel, store: &'a ConversationStore, live: &'a LiveView) -> Self {
        Self {
            model,
            store,
            live,
            state: TurnState::new(),
        }
    }

    /// Stream the reply until it settles.
    ///
    /// On error or cancellation the store is left untouched.
    pub async fn run(mut self, request: ModelRequest) -> Result<TurnOutcome> {
        let session_id = self.store.session_id();
        let cancel = self.live.cancel_token().clone();

        let mut stream = tokio::select! {
            _ = cancel.cancelled() => return Err(OrchestrationError::Cancelled),
            started = self.model.stream(request) => started?,
        };

        debug!(session_id = %session_id, model = %self.model.model_id(), "Streaming reply");

        let outcome = loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(OrchestrationError::Cancelled),
                next = stream.next() => next,
            };

            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(e)) => return Err(e),
                // A stream that ends without `Done` still settles its text.
                None => ModelEvent::Done,
            };

            let is_delta = matches!(event, ModelEvent::TextDelta(_));
            self.state = std::mem::take(&mut self.state).apply(event);

            match &self.state {
                TurnState::Settled(outcome) => break outcome.clone(),
                TurnState::Streaming { text } if is_delta => self.live.update(text).await?,
                TurnState::Streaming { .. } => {}
            }
        };

        match &outcome {
            TurnOutcome::Text(text) => {
                if self.live.is_cancelled() {
                    return Err(OrchestrationError::Cancelled);
                }
                self.store
                    .finalize(vec![Message::assistant_text(text.clone())])
                    .await;
                info!(session_id = %session_id, chars = text.len(), "Turn settled with text");
            }
            TurnOutcome::ToolCall { name, .. } => {
                info!(session_id = %session_id, tool = %name, "Turn settled with tool call");
            }
        }

        Ok(outcome)
    }
}
