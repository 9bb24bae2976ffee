//! Tool dispatcher
//!
//! Turns a model-declared call into an external fetch, commits the call and
//! its result to the store as one batch, and produces the turn's final view.
//! Failures never escape as faults: they become a failure marker in the store
//! and a fixed apology on screen.

use crate::error::OrchestrationError;
use crate::memory::ConversationStore;
use crate::models::{CallRecord, FailureKind, Message, ResultRecord, ToolOutcome, View};
use crate::tools::{Tool, ToolRegistry};
use crate::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shown when the model asks for a capability that does not exist
pub const UNKNOWN_CAPABILITY_APOLOGY: &str = "Sorry, I can't do that yet.";

/// Committed result plus what the caller should see
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub record: ResultRecord,
    pub view: View,
}

/// Executes capability calls with a bounded timeout
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run one call and record it.
    ///
    /// Only cancellation is returned as an error; in that case nothing is
    /// committed.
    pub async fn dispatch(
        &self,
        store: &ConversationStore,
        call: CallRecord,
        cancel: &CancellationToken,
    ) -> Result<DispatchResult> {
        let start = Instant::now();

        debug!(
            session_id = %store.session_id(),
            call_id = %call.call_id,
            tool = %call.capability_name,
            "Dispatching capability"
        );

        let (outcome, view) = match self.registry.resolve(&call.capability_name) {
            None => {
                warn!(tool = %call.capability_name, "Model asked for an unknown capability");
                (
                    ToolOutcome::Failure {
                        kind: FailureKind::UnknownCapability,
                    },
                    View::text(UNKNOWN_CAPABILITY_APOLOGY),
                )
            }
            Some(tool) => self.run(tool.as_ref(), &call, cancel).await?,
        };

        // Nothing is committed once the caller has gone away.
        if cancel.is_cancelled() {
            return Err(OrchestrationError::Cancelled);
        }

        let record = ResultRecord {
            call_id: call.call_id,
            capability_name: call.capability_name.clone(),
            outcome,
        };

        store
            .finalize(vec![Message::tool_call(call), Message::tool_result(record.clone())])
            .await;

        info!(
            session_id = %store.session_id(),
            tool = %record.capability_name,
            success = record.outcome.is_success(),
            execution_time_ms = start.elapsed().as_millis() as u64,
            "Capability dispatched"
        );

        Ok(DispatchResult { record, view })
    }

    async fn run(
        &self,
        tool: &dyn Tool,
        call: &CallRecord,
        cancel: &CancellationToken,
    ) -> Result<(ToolOutcome, View)> {
        let apology = || View::text(tool.apology());

        let args = match tool.validate(&call.arguments) {
            Ok(args) => args,
            Err(e) => {
                warn!(tool = %tool.name(), error = %e, "Rejected capability arguments");
                return Ok((
                    ToolOutcome::Failure {
                        kind: FailureKind::InvalidArguments,
                    },
                    apology(),
                ));
            }
        };

        let executed = tokio::select! {
            _ = cancel.cancelled() => return Err(OrchestrationError::Cancelled),
            executed = tokio::time::timeout(self.timeout, tool.execute(&args)) => executed,
        };

        let outcome = match executed {
            Ok(Ok(output)) => (
                ToolOutcome::Success {
                    summary: output.summary,
                    data: output.data,
                },
                output.view,
            ),
            Ok(Err(e)) => {
                warn!(tool = %tool.name(), error = %e, "Capability call failed");
                (
                    ToolOutcome::Failure {
                        kind: FailureKind::Unavailable,
                    },
                    apology(),
                )
            }
            Err(_) => {
                warn!(
                    tool = %tool.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Capability call timed out"
                );
                (
                    ToolOutcome::Failure {
                        kind: FailureKind::TimedOut,
                    },
                    apology(),
                )
            }
        };

        Ok(outcome)
    }
}
