//! Cross-store domain events and the bus that carries them.
//!
//! The checklist store publishes; the item store consumes through its own
//! queue. Neither store holds a reference to the other.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// A fact one store announces for others to react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DomainEvent {
    /// A checklist removal was confirmed by the gateway. Items with this
    /// `checklist_id` must be dropped.
    ChecklistRemoved {
        /// Id of the removed checklist.
        checklist_id: String,
    },
}

/// Fan-out bus for [`DomainEvent`]s.
///
/// Every subscriber gets its own unbounded queue, so a slow consumer never
/// loses events. `Clone` is cheap; every clone publishes to the same
/// subscribers.
///
/// # Examples
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use quicklists::{DomainEvent, DomainEvents};
///
/// let events = DomainEvents::new();
/// let mut rx = events.subscribe();
/// events.publish(DomainEvent::ChecklistRemoved { checklist_id: "groceries".into() });
/// assert_eq!(
///     rx.recv().await.unwrap(),
///     DomainEvent::ChecklistRemoved { checklist_id: "groceries".into() }
/// );
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct DomainEvents {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<DomainEvent>>>>,
}

impl DomainEvents {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `event` to every current subscriber.
    ///
    /// Returns the number of subscribers reached. Publishing with no
    /// subscribers is not an error. Subscribers whose receiver was dropped
    /// are forgotten.
    pub fn publish(&self, event: DomainEvent) -> usize {
        tracing::debug!(?event, "publishing domain event");
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<DomainEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Subscribe as a [`Stream`](tokio_stream::Stream).
    pub fn stream(&self) -> UnboundedReceiverStream<DomainEvent> {
        UnboundedReceiverStream::new(self.subscribe())
    }
}
