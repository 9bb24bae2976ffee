//! Main orchestrator - one user message in, one view out
//!
//! USER → STORE → GENERATE → (TEXT | DISPATCH) → VIEW

use crate::config::OrchestratorConfig;
use crate::error::OrchestrationError;
use crate::execution::ToolDispatcher;
use crate::generation::{live_view, GenerationSession, LiveView, TurnOutcome, ViewHandle};
use crate::llm::{LanguageModel, ModelRequest};
use crate::memory::{ContextConfig, ContextManager, ConversationState, ConversationStore};
use crate::models::{CallRecord, Message, View};
use crate::state::SessionStore;
use crate::tools::ToolRegistry;
use crate::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Fixed policy text sent with every turn
pub const SYSTEM_INSTRUCTIONS: &str = "You are a friendly assistant that helps the user with \
looking up stock prices and viewing their trade history. When the user asks for the price of \
a stock, call lookup-price with its ticker symbol. When the user asks about their past trades, \
call list-trade-history. Otherwise answer briefly. Reply in lower case.";

/// Shown when the language model cannot be reached
pub const MODEL_FAILURE_APOLOGY: &str = "Sorry, I couldn't respond right now. Please try again later.";

struct Inner {
    model: Arc<dyn LanguageModel>,
    dispatcher: ToolDispatcher,
    sessions: Arc<dyn SessionStore>,
    context: ContextManager,
}

/// Entry point coordinating store, generation and dispatch.
///
/// Cheap to clone; all clones share the same sessions.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        registry: ToolRegistry,
        sessions: Arc<dyn SessionStore>,
        config: &OrchestratorConfig,
    ) -> Self {
        let dispatcher = ToolDispatcher::new(Arc::new(registry), config.tool_timeout);
        let context = ContextManager::with_config(ContextConfig {
            max_context_messages: config.max_context_messages,
        });

        Self {
            inner: Arc::new(Inner {
                model,
                dispatcher,
                sessions,
                context,
            }),
        }
    }

    pub async fn create_session(&self) -> Result<Uuid> {
        Ok(self.inner.sessions.create_session().await?.id())
    }

    pub async fn end_session(&self, session_id: Uuid) -> Result<()> {
        self.inner.sessions.end_session(session_id).await
    }

    /// Everything said so far in a session
    pub async fn conversation(&self, session_id: Uuid) -> Result<ConversationState> {
        let session = self.inner.sessions.load_session(session_id).await?;
        Ok(session.store().state().await)
    }

    /// Start one turn and return a handle to its view.
    ///
    /// The user message is recorded before this returns. A second call on
    /// the same session fails with `TurnInProgress` until the first settles.
    pub async fn send_message(&self, session_id: Uuid, text: &str) -> Result<ViewHandle> {
        let session = self.inner.sessions.load_session(session_id).await?;
        let guard = session
            .try_begin_turn()
            .ok_or(OrchestrationError::TurnInProgress(session_id))?;

        session.store().append(vec![Message::user(text)]).await;

        info!(session_id = %session_id, chars = text.len(), "User message admitted");

        let (live, handle) = live_view(session_id);
        let inner = self.inner.clone();

        tokio::spawn(async move {
            let view = inner.run_turn(session.store(), &live).await;
            // Release before publishing so a caller that saw the final view can send again.
            drop(guard);
            if let Some(view) = view {
                live.finish(view).await;
            }
        });

        Ok(handle)
    }
}

impl Inner {
    /// Drive one turn to its final view, or `None` if it was cancelled
    async fn run_turn(&self, store: &ConversationStore, live: &LiveView) -> Option<View> {
        let start = Instant::now();
        let session_id = store.session_id();
        let cancel = live.cancel_token().clone();

        let snapshot = store.snapshot().await;
        let request = ModelRequest {
            system: SYSTEM_INSTRUCTIONS.to_string(),
            messages: self.context.select_window(&snapshot).to_vec(),
            tools: self.dispatcher.registry().definitions(),
        };

        debug!(
            session_id = %session_id,
            history = snapshot.len(),
            sent = request.messages.len(),
            "Starting generation"
        );

        let generated = GenerationSession::new(self.model.as_ref(), store, live)
            .run(request)
            .await;

        let view = match generated {
            Ok(TurnOutcome::Text(text)) => View::Text(text),
            Ok(TurnOutcome::ToolCall { name, arguments }) => {
                let call = CallRecord::new(name, arguments);
                match self.dispatcher.dispatch(store, call, &cancel).await {
                    Ok(result) => result.view,
                    Err(OrchestrationError::Cancelled) => {
                        info!(session_id = %session_id, "Turn cancelled during dispatch");
                        return None;
                    }
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "Dispatch failed");
                        View::text(MODEL_FAILURE_APOLOGY)
                    }
                }
            }
            Err(OrchestrationError::Cancelled) => {
                info!(session_id = %session_id, "Turn cancelled during generation");
                return None;
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Generation failed");
                View::text(MODEL_FAILURE_APOLOGY)
            }
        };

        info!(
            session_id = %session_id,
            execution_time_ms = start.elapsed().as_millis() as u64,
            "Turn complete"
        );

        Some(view)
    }
}
