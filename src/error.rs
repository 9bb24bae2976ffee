//! Error types for the stock chat orchestrator

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Boot / Configuration Errors
    // =============================

    #[error("Duplicate capability name: {0}")]
    DuplicateCapability(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // Tool Dispatch Errors
    // =============================

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("Tool error: {0}")]
    ToolError(String),

    // =============================
    // Turn / Session Errors
    // =============================

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("A turn is already in progress for session {0}")]
    TurnInProgress(Uuid),

    #[error("Turn cancelled")]
    Cancelled,

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}
