//! Stock Chat Orchestrator
//!
//! A conversational assistant that:
//! - Streams model replies token-by-token into a live view
//! - Lets the model call two capabilities: price lookup and trade history
//! - Records every call together with its result in an append-only store
//! - Degrades every failure to a fixed apology instead of a fault
//!
//! TURN LOOP:
//! USER → STORE → GENERATE → (TEXT | DISPATCH → RENDER) → VIEW

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod gemini;
pub mod generation;
pub mod llm;
pub mod memory;
pub mod models;
pub mod state;
pub mod tools;

#[cfg(test)]
mod testing;

pub use error::Result;

// Re-export common types
pub use agent::Orchestrator;
pub use error::OrchestrationError;
pub use generation::{ViewHandle, ViewUpdate};
pub use models::*;
