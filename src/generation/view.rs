//! Live view plumbing between a running turn and its caller
//!
//! The turn holds a [`LiveView`] and pushes partial text into it; the caller
//! holds the matching [`ViewHandle`] and observes partial updates followed by
//! exactly one final view. Dropping the handle cancels the turn.

use crate::error::OrchestrationError;
use crate::models::View;
use crate::Result;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const UPDATE_BUFFER: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewUpdate {
    /// Full text accumulated so far
    Partial { text: String },
    Final { view: View },
}

impl ViewUpdate {
    pub fn is_final(&self) -> bool {
        matches!(self, ViewUpdate::Final { .. })
    }
}

/// Producer side, owned by the running turn
pub struct LiveView {
    tx: mpsc::Sender<ViewUpdate>,
    cancel: CancellationToken,
}

impl LiveView {
    /// Publish the accumulated text. Fails once the caller has gone away.
    pub async fn update(&self, text: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(OrchestrationError::Cancelled);
        }
        self.tx
            .send(ViewUpdate::Partial {
                text: text.to_string(),
            })
            .await
            .map_err(|_| OrchestrationError::Cancelled)
    }

    /// Publish the terminal view. Consumes the live view so it happens once.
    pub async fn finish(self, view: View) {
        // The caller may already be gone; nothing is left to tell it then.
        let _ = self.tx.send(ViewUpdate::Final { view }).await;
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}

/// Consumer side, returned to whoever sent the message
pub struct ViewHandle {
    session_id: Uuid,
    rx: mpsc::Receiver<ViewUpdate>,
    cancel: CancellationToken,
}

impl ViewHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Next update, or `None` once the turn is over
    pub async fn next(&mut self) -> Option<ViewUpdate> {
        self.rx.recv().await
    }

    /// Wait for the final view, skipping partial updates.
    /// `None` if the turn was cancelled.
    pub async fn finish(mut self) -> Option<View> {
        while let Some(update) = self.rx.recv().await {
            if let ViewUpdate::Final { view } = update {
                return Some(view);
            }
        }
        None
    }

    /// Abandon the turn; nothing further is committed for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn into_stream(self) -> impl Stream<Item = ViewUpdate> + Send {
        stream::unfold(self, |mut handle| async move {
            handle.next().await.map(|update| (update, handle))
        })
    }
}

impl Drop for ViewHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Create a connected producer/consumer pair for one turn
pub fn live_view(session_id: Uuid) -> (LiveView, ViewHandle) {
    let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
    let cancel = CancellationToken::new();

    (
        LiveView {
            tx,
            cancel: cancel.clone(),
        },
        ViewHandle {
            session_id,
            rx,
            cancel,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_partials_then_final() {
        let (live, handle) = live_view(Uuid::new_v4());

        tokio::spawn(async move {
            live.update("he").await.unwrap();
            live.update("hello").await.unwrap();
            live.finish(View::text("hello")).await;
        });

        let updates: Vec<ViewUpdate> = handle.into_stream().collect().await;
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[1], ViewUpdate::Partial { text: "hello".to_string() });
        assert!(updates[2].is_final());
    }

    #[tokio::test]
    async fn test_dropped_handle_cancels() {
        let (live, handle) = live_view(Uuid::new_v4());
        drop(handle);

        assert!(live.is_cancelled());
        assert!(matches!(live.update("x").await, Err(OrchestrationError::Cancelled)));
    }

    #[tokio::test]
    async fn test_finish_skips_partials() {
        let (live, handle) = live_view(Uuid::new_v4());
        tokio::spawn(async move {
            live.update("a").await.unwrap();
            live.finish(View::text("ab")).await;
        });

        assert_eq!(handle.finish().await, Some(View::text("ab")));
    }
}
