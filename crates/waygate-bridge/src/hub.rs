//! Single-subscriber status delivery.
//!
//! The native layer keeps exactly one long-lived status callback. The hub
//! models it as a slot holding one channel sender: subscribing again replaces
//! the previous subscriber, so an event is never delivered twice.

use std::{
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::{sync::mpsc, task::JoinHandle};
use waygate_core::StatusEvent;

#[derive(Debug)]
struct Slot {
    id: u64,
    tx: mpsc::UnboundedSender<StatusEvent>,
}

/// Fan-in point between a bridge and its one subscriber.
#[derive(Debug, Default)]
pub struct StatusHub {
    slot: Mutex<Option<Slot>>,
    next_id: AtomicU64,
}

impl StatusHub {
    /// Create an empty hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register the subscriber, replacing any previous one.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if self.lock().replace(Slot { id, tx }).is_some() {
            tracing::debug!(subscription = id, "status_subscriber_replaced");
        }
        Subscription { id, rx, hub: Arc::clone(self) }
    }

    /// Deliver an event to the subscriber, if any.
    ///
    /// Never fails: a missing or departed subscriber is logged.
    pub fn publish(&self, event: StatusEvent) {
        let mut slot = self.lock();
        let Some(current) = slot.as_ref() else {
            tracing::debug!(tunnel_id = %event.tunnel_id, status = %event.status, "status_event_unobserved");
            return;
        };
        if current.tx.send(event).is_err() {
            tracing::warn!(subscription = current.id, "status_subscriber_gone");
            *slot = None;
        }
    }

    /// Whether a subscriber is registered.
    pub fn has_subscriber(&self) -> bool {
        self.lock().is_some()
    }

    fn release(&self, id: u64) {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|s| s.id == id) {
            *slot = None;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Slot>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to the status stream. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<StatusEvent>,
    hub: Arc<StatusHub>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish_non_exhaustive()
    }
}

impl Subscription {
    /// Next event. `None` once this subscription has been replaced or the
    /// bridge is gone.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        self.rx.recv().await
    }

    /// Stop receiving events.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Drive `callback` with every event on a background task.
    ///
    /// Callback errors are logged and delivery continues.
    pub fn listen<F, E>(mut self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(StatusEvent) -> Result<(), E> + Send + 'static,
        E: fmt::Display,
    {
        tokio::spawn(async move {
            while let Some(event) = self.rx.recv().await {
                let tunnel_id = event.tunnel_id.clone();
                if let Err(e) = callback(event) {
                    tracing::warn!(tunnel_id = %tunnel_id, error = %e, "status_callback_failed");
                }
            }
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.release(self.id);
    }
}
