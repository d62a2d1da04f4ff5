//! Subscriber registry
//!
//! Fans each new [`Description`] out to every subscriber's mailbox. A
//! mailbox holds a single value: publishing replaces whatever the
//! subscriber has not read yet, so a slow reader only ever sees the most
//! recent description and never a backlog.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::debug;

use crate::metrics::metrics;

use super::description::Description;

/// Error returned when subscribing to a stopped monitor
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscribeError {
    #[error("cannot subscribe to monitor after stopping it")]
    Closed,
}

/// Error returned by [`Mailbox::try_recv`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TryRecvError {
    #[error("no new description")]
    Empty,
    #[error("mailbox closed")]
    Closed,
}

/// Registry state, guarded as a whole
struct RegistryInner {
    subscribers: HashMap<u64, watch::Sender<Arc<Description>>>,
    last_id: u64,
    closed: bool,
}

/// Registry of subscriber mailboxes
pub struct SubscriberRegistry {
    inner: Mutex<RegistryInner>,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                subscribers: HashMap::new(),
                last_id: 0,
                closed: false,
            }),
        }
    }

    /// Register a new mailbox seeded with the current description
    ///
    /// The closed check, id assignment and insert happen under one lock, so
    /// a concurrent [`shutdown`](Self::shutdown) either sees the mailbox and
    /// closes it or this call fails.
    pub fn subscribe(
        self: &Arc<Self>,
        current: &RwLock<Arc<Description>>,
    ) -> Result<(Mailbox, Unsubscribe), SubscribeError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(SubscribeError::Closed);
        }

        let seed = current.read().clone();
        let (tx, mut rx) = watch::channel(seed);
        // The seed is the first value the subscriber reads
        rx.mark_changed();

        inner.last_id += 1;
        let id = inner.last_id;
        inner.subscribers.insert(id, tx);
        metrics().monitor_subscribers.inc();
        debug!(subscriber_id = id, total = inner.subscribers.len(), "Subscriber added");

        Ok((
            Mailbox { id, rx },
            Unsubscribe {
                id,
                registry: Arc::downgrade(self),
            },
        ))
    }

    /// Swap in a new current description and deliver it to every mailbox
    ///
    /// Never blocks on subscribers.
    pub fn publish(&self, desc: Arc<Description>, current: &RwLock<Arc<Description>>) {
        let inner = self.inner.lock();
        *current.write() = desc.clone();
        for tx in inner.subscribers.values() {
            tx.send_replace(desc.clone());
        }
    }

    /// Remove a mailbox, closing it. Unknown ids are ignored.
    fn remove(&self, id: u64) {
        let removed = self.inner.lock().subscribers.remove(&id);
        if removed.is_some() {
            metrics().monitor_subscribers.dec();
            debug!(subscriber_id = id, "Subscriber removed");
        }
    }

    /// Close every mailbox and refuse further subscriptions
    ///
    /// Returns the number of mailboxes closed.
    pub fn shutdown(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.closed = true;
        let closed = inner.subscribers.len();
        inner.subscribers.clear();
        metrics().monitor_subscribers.sub(closed as i64);
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of registered mailboxes
    pub fn len(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Receiving side of a subscription
///
/// Holds at most one unread description.
#[derive(Debug)]
pub struct Mailbox {
    id: u64,
    rx: watch::Receiver<Arc<Description>>,
}

impl Mailbox {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next description
    ///
    /// Returns `None` once the mailbox has been closed and its last value
    /// read.
    pub async fn recv(&mut self) -> Option<Arc<Description>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Take the unread description without waiting
    pub fn try_recv(&mut self) -> Result<Arc<Description>, TryRecvError> {
        match self.recv().now_or_never() {
            Some(Some(desc)) => Ok(desc),
            Some(None) => Err(TryRecvError::Closed),
            None => Err(TryRecvError::Empty),
        }
    }

    /// Most recent description delivered, read or not
    pub fn latest(&self) -> Arc<Description> {
        self.rx.borrow().clone()
    }
}

/// Handle that ends a subscription
///
/// Calling [`unsubscribe`](Self::unsubscribe) more than once, or after the
/// monitor stopped, does nothing.
#[derive(Debug, Clone)]
pub struct Unsubscribe {
    id: u64,
    registry: Weak<SubscriberRegistry>,
}

impl Unsubscribe {
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}
