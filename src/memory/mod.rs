//! Conversation Memory
//!
//! The per-session conversation store and the context window applied
//! before each model call.

pub mod store;
pub mod context_manager;

pub use store::{orphaned_results, ConversationState, ConversationStore};
pub use context_manager::{ContextConfig, ContextManager};
