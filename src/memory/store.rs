//! Conversation store
//!
//! Append-only, per-session record of everything that has been said.
//! Insertion order is the conversation's canonical order.

use crate::models::Message;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Serializable view of a session's conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationState {
    pub session_id: Uuid,
    pub messages: Vec<Message>,
}

#[derive(Debug, Default)]
struct StoreInner {
    messages: Vec<Message>,
    /// Length of the log at the last `finalize`
    settled_len: usize,
    /// Every call id in `messages`, so pairing is checked per batch only
    call_ids: HashSet<Uuid>,
}

impl StoreInner {
    fn extend(&mut self, entries: Vec<Message>) {
        for message in &entries {
            self.call_ids.extend(message.call_ids());
            if cfg!(debug_assertions) {
                let orphans: Vec<Uuid> = message
                    .result_ids()
                    .filter(|id| !self.call_ids.contains(id))
                    .collect();
                assert!(
                    orphans.is_empty(),
                    "tool-result without a prior assistant-tool-call: {:?}",
                    orphans
                );
            }
        }
        self.messages.extend(entries);
    }
}

/// Authoritative message log for one session.
///
/// Cloning yields another handle to the same log.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    session_id: Uuid,
    inner: Arc<RwLock<StoreInner>>,
}

impl ConversationStore {
    /// Create an empty store with a freshly generated session id
    pub fn new() -> Self {
        Self::with_session_id(Uuid::new_v4())
    }

    pub fn with_session_id(session_id: Uuid) -> Self {
        Self {
            session_id,
            inner: Arc::new(RwLock::new(StoreInner::default())),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Append entries as one batch. Visible to the next `snapshot`.
    pub async fn append(&self, entries: Vec<Message>) {
        let mut inner = self.inner.write().await;
        inner.extend(entries);

        debug!(
            session_id = %self.session_id,
            len = inner.messages.len(),
            "Conversation store appended"
        );
    }

    /// Append entries and mark the turn's state as settled.
    pub async fn finalize(&self, entries: Vec<Message>) {
        let mut inner = self.inner.write().await;
        inner.extend(entries);
        inner.settled_len = inner.messages.len();

        debug!(
            session_id = %self.session_id,
            len = inner.messages.len(),
            "Conversation store finalized"
        );
    }

    /// Immutable copy of the full log
    pub async fn snapshot(&self) -> Vec<Message> {
        self.inner.read().await.messages.clone()
    }

    pub async fn state(&self) -> ConversationState {
        ConversationState {
            session_id: self.session_id,
            messages: self.snapshot().await,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.messages.is_empty()
    }

    /// Number of entries covered by the last `finalize`
    pub async fn settled_len(&self) -> usize {
        self.inner.read().await.settled_len
    }

    /// True when nothing has been appended since the last `finalize`
    pub async fn is_settled(&self) -> bool {
        let inner = self.inner.read().await;
        inner.settled_len == inner.messages.len()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Result ids in `messages` that have no earlier matching call id.
pub fn orphaned_results(messages: &[Message]) -> Vec<Uuid> {
    let mut seen_calls = HashSet::new();
    let mut orphans = Vec::new();

    for message in messages {
        seen_calls.extend(message.call_ids());
        orphans.extend(message.result_ids().filter(|id| !seen_calls.contains(id)));
    }

    orphans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CallRecord, FailureKind, ResultRecord, ToolOutcome};
    use serde_json::json;

    fn paired(name: &str) -> (Message, Message) {
        let call = CallRecord::new(name, json!({}));
        let result = ResultRecord {
            call_id: call.call_id,
            capability_name: name.to_string(),
            outcome: ToolOutcome::Failure {
                kind: FailureKind::Unavailable,
            },
        };
        (Message::tool_call(call), Message::tool_result(result))
    }

    #[tokio::test]
    async fn test_new_store_is_empty_with_fresh_id() {
        let a = ConversationStore::new();
        let b = ConversationStore::new();
        assert!(a.is_empty().await);
        assert_ne!(a.session_id(), b.session_id());
    }

    #[tokio::test]
    async fn test_append_only_law() {
        let store = ConversationStore::new();
        let mut previous: Vec<Message> = Vec::new();

        for i in 0..5 {
            store.append(vec![Message::user(format!("q{}", i))]).await;
            store
                .finalize(vec![Message::assistant_text(format!("a{}", i))])
                .await;

            let current = store.snapshot().await;
            assert!(current.len() > previous.len());
            assert_eq!(&current[..previous.len()], &previous[..]);
            previous = current;
        }
    }

    #[tokio::test]
    async fn test_snapshot_idempotent() {
        let store = ConversationStore::new();
        store.append(vec![Message::user("hi")]).await;
        assert_eq!(store.snapshot().await, store.snapshot().await);
    }

    #[tokio::test]
    async fn test_finalize_marks_settled() {
        let store = ConversationStore::new();
        store.append(vec![Message::user("hi")]).await;
        assert!(!store.is_settled().await);

        store.finalize(vec![Message::assistant_text("hello")]).await;
        assert!(store.is_settled().await);
        assert_eq!(store.settled_len().await, 2);
    }

    #[tokio::test]
    async fn test_paired_batch_accepted() {
        let store = ConversationStore::new();
        let (call, result) = paired("lookup-price");
        store.finalize(vec![call, result]).await;
        assert!(orphaned_results(&store.snapshot().await).is_empty());
    }

    #[tokio::test]
    async fn test_pairing_checked_against_earlier_batches() {
        let store = ConversationStore::new();
        for _ in 0..50 {
            let (call, result) = paired("lookup-price");
            store.append(vec![Message::user("price?")]).await;
            store.append(vec![call]).await;
            store.finalize(vec![result]).await;
        }

        assert_eq!(store.len().await, 150);
        assert!(orphaned_results(&store.snapshot().await).is_empty());
    }

    #[cfg(debug_assertions)]
    #[tokio::test]
    #[should_panic(expected = "tool-result without a prior assistant-tool-call")]
    async fn test_result_before_its_call_in_one_batch_fails_loudly() {
        let store = ConversationStore::new();
        let (call, result) = paired("lookup-price");
        store.append(vec![result, call]).await;
    }

    #[test]
    fn test_orphaned_results_detected() {
        let (call, result) = paired("lookup-price");
        assert_eq!(orphaned_results(&[call.clone(), result.clone()]).len(), 0);
        assert_eq!(orphaned_results(&[result.clone(), call]).len(), 1);
        assert_eq!(orphaned_results(&[result]).len(), 1);
    }

    #[cfg(debug_assertions)]
    #[tokio::test]
    #[should_panic(expected = "tool-result without a prior assistant-tool-call")]
    async fn test_orphan_append_fails_loudly() {
        let store = ConversationStore::new();
        let (_call, result) = paired("lookup-price");
        store.append(vec![result]).await;
    }
}
