//! Lifecycle events published by the dispatcher
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender};

use crate::lock::with_lock;

/// Lifecycle notifications delivered to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum LifecycleEvent {
    /// The debugging client disconnected
    Close,
}

/// Publish/subscribe surface for [`LifecycleEvent`]s
///
/// Cloning shares the same set of listeners.
#[derive(Clone, Default)]
pub struct Listeners {
    senders: Arc<Mutex<Vec<Sender<LifecycleEvent>>>>,
}

impl Listeners {
    /// Register a new listener
    pub fn subscribe(&self) -> Receiver<LifecycleEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        with_lock("Listeners.senders", self.senders.as_ref(), |mut senders| {
            senders.push(tx);
        });
        rx
    }

    /// Deliver `event` to every listener, forgetting listeners that have gone away
    pub fn publish(&self, event: LifecycleEvent) {
        with_lock("Listeners.senders", self.senders.as_ref(), |mut senders| {
            senders.retain(|tx| tx.send(event).is_ok());
            tracing::debug!(?event, listeners = senders.len(), "published lifecycle event");
        });
    }

    pub fn len(&self) -> usize {
        with_lock("Listeners.senders", self.senders.as_ref(), |senders| {
            senders.len()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
