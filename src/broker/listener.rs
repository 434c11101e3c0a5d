//! Listener handle
//!
//! A `Listener` is the receiving end of one registration on the bus. It is a
//! `Stream` of shared events and unregisters itself when unsubscribed or
//! dropped, so a listener can never outlive the session that owns it.

use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::broker::engine::BusInner;
use crate::broker::topic::ListenerId;

pub struct Listener<E> {
    id: ListenerId,
    topic: String,
    receiver: mpsc::Receiver<Arc<E>>,
    bus: Weak<BusInner<E>>,
    active: bool,
}

impl<E> Listener<E> {
    pub(crate) fn new(
        id: ListenerId,
        topic: &str,
        receiver: mpsc::Receiver<Arc<E>>,
        bus: Weak<BusInner<E>>,
        active: bool,
    ) -> Self {
        let mut listener = Self {
            id,
            topic: topic.to_string(),
            receiver,
            bus,
            active,
        };
        if !active {
            listener.receiver.close();
        }
        listener
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// False once the listener has been unsubscribed.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Wait for the next event. `None` once unsubscribed or the bus closed.
    pub async fn recv(&mut self) -> Option<Arc<E>> {
        self.receiver.recv().await
    }

    /// Take an already queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<E>> {
        self.receiver.try_recv().ok()
    }

    /// Unregister from the bus and discard anything still queued.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        // Closing first makes any in-flight publish fail its try_send.
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}

        if let Some(bus) = self.bus.upgrade() {
            bus.remove(&self.topic, self.id);
        }
        debug!(topic = %self.topic, listener = self.id, "listener unsubscribed");
    }
}

impl<E> Unpin for Listener<E> {}

impl<E> Stream for Listener<E> {
    type Item = Arc<E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl<E> Drop for Listener<E> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl<E> std::fmt::Debug for Listener<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("active", &self.active)
            .finish()
    }
}
