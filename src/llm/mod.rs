//! Language-model collaborator
//!
//! The model streams text deltas or declares a capability call. The core
//! only depends on [`LanguageModel`]; `GeminiClient` is the production
//! implementation and [`ScriptedModel`] replays canned turns.

use crate::error::OrchestrationError;
use crate::models::Message;
use crate::tools::ToolDefinition;
use crate::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// One streamed unit of model output
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    TextDelta(String),
    ToolCall { name: String, arguments: Value },
    Done,
}

pub type ModelStream = BoxStream<'static, Result<ModelEvent>>;

/// Everything the model sees for one turn
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
}

/// Trait for streaming generation (LLM controlled)
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Start a streamed reply. Errors here mean the call never started.
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream>;

    fn model_id(&self) -> &str;
}

/// Step of a scripted turn
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Event(ModelEvent),
    /// Error surfaced mid-stream
    Error(String),
    Delay(Duration),
}

#[derive(Debug, Clone)]
enum Script {
    Steps(Vec<ScriptStep>),
    /// The call itself fails
    Fail(String),
}

/// Deterministic model replaying one script per turn
#[derive(Default)]
pub struct ScriptedModel {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn answering with `chunks` streamed one delta at a time
    pub fn with_text(self, chunks: &[&str]) -> Self {
        let mut steps: Vec<ScriptStep> = chunks
            .iter()
            .map(|c| ScriptStep::Event(ModelEvent::TextDelta(c.to_string())))
            .collect();
        steps.push(ScriptStep::Event(ModelEvent::Done));
        self.with_steps(steps)
    }

    /// Turn declaring a single capability call
    pub fn with_tool_call(self, name: &str, arguments: Value) -> Self {
        self.with_steps(vec![
            ScriptStep::Event(ModelEvent::ToolCall {
                name: name.to_string(),
                arguments,
            }),
            ScriptStep::Event(ModelEvent::Done),
        ])
    }

    /// Turn whose model call fails before streaming
    pub fn with_failure(self, message: &str) -> Self {
        self.push(Script::Fail(message.to_string()));
        self
    }

    pub fn with_steps(self, steps: Vec<ScriptStep>) -> Self {
        self.push(Script::Steps(steps));
        self
    }

    fn push(&self, script: Script) {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(script);
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        let script = self
            .scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| OrchestrationError::LlmError("no scripted turn left".to_string()))?;

        let steps = match script {
            Script::Fail(message) => return Err(OrchestrationError::LlmError(message)),
            Script::Steps(steps) => steps,
        };

        let events = stream::iter(steps)
            .then(|step| async move {
                match step {
                    ScriptStep::Event(event) => Some(Ok(event)),
                    ScriptStep::Error(message) => Some(Err(OrchestrationError::LlmError(message))),
                    ScriptStep::Delay(duration) => {
                        tokio::time::sleep(duration).await;
                        None
                    }
                }
            })
            .filter_map(|item| async move { item });

        Ok(events.boxed())
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}
