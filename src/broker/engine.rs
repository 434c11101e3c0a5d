//! Bus engine
//!
//! `TopicBus` is the one structure shared by the producer, every connection
//! and every subscription session. It is responsible for:
//! - keeping the topic -> listener registry
//! - fanning each published event out to the listeners of its topic
//! - removing listeners on unsubscribe, drop or bus shutdown
//!
//! Concurrency notes:
//! - The registry lives behind an `RwLock`. Subscribe, unsubscribe and close
//!   take the write side; publish only takes the read side long enough to copy
//!   the listener set, then delivers with `try_send` after releasing it.
//! - No lock is ever held across an `.await`.
//! - A full or closed listener queue drops the event for that listener only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

use crate::broker::listener::Listener;
use crate::broker::topic::{ListenerId, Topic};
use crate::utils::error::BusError;

/// Queue size used by `TopicBus::new`.
pub const DEFAULT_LISTENER_CAPACITY: usize = 64;

#[derive(Debug)]
pub(crate) struct Registry<E> {
    pub(crate) topics: HashMap<String, Topic<E>>,
    pub(crate) closed: bool,
}

#[derive(Debug)]
pub(crate) struct BusInner<E> {
    registry: RwLock<Registry<E>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl<E> BusInner<E> {
    fn read(&self) -> RwLockReadGuard<'_, Registry<E>> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry<E>> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop `id` from `topic`, pruning the topic once it has no listeners.
    pub(crate) fn remove(&self, topic: &str, id: ListenerId) -> bool {
        let mut registry = self.write();
        let Some(entry) = registry.topics.get_mut(topic) else {
            return false;
        };
        let removed = entry.unsubscribe(&id);
        if entry.is_empty() {
            registry.topics.remove(topic);
        }
        removed
    }
}

pub struct TopicBus<E> {
    inner: Arc<BusInner<E>>,
}

impl<E> Clone for TopicBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> std::fmt::Debug for TopicBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicBus")
            .field("topics", &self.topic_count())
            .field("capacity", &self.inner.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<E> Default for TopicBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> TopicBus<E> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LISTENER_CAPACITY)
    }

    /// Create a bus whose listener queues hold up to `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                registry: RwLock::new(Registry {
                    topics: HashMap::new(),
                    closed: false,
                }),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Register a new listener under `topic`. Always succeeds; on a closed bus
    /// the listener is returned already finished.
    pub fn subscribe(&self, topic: &str) -> Listener<E> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.inner.capacity);

        let registered = {
            let mut registry = self.inner.write();
            if registry.closed {
                false
            } else {
                registry
                    .topics
                    .entry(topic.to_string())
                    .or_insert_with(|| Topic::new(topic))
                    .subscribe(id, sender);
                true
            }
        };

        if registered {
            debug!(topic, listener = id, "listener subscribed");
        } else {
            debug!(topic, listener = id, "subscribe on closed bus");
        }

        Listener::new(id, topic, receiver, Arc::downgrade(&self.inner), registered)
    }

    /// Remove `listener` from the bus. Calling it twice is a no-op.
    pub fn unsubscribe(&self, listener: &mut Listener<E>) {
        listener.unsubscribe();
    }

    /// Deliver `event` to every listener registered under `topic` right now.
    ///
    /// Returns how many listeners accepted the event. Listeners whose queue is
    /// full or closed miss this event; that is never reported as an error.
    pub fn publish(&self, topic: &str, event: E) -> Result<usize, BusError> {
        self.publish_shared(topic, Arc::new(event))
    }

    pub fn publish_shared(&self, topic: &str, event: Arc<E>) -> Result<usize, BusError> {
        let targets = {
            let registry = self.inner.read();
            if registry.closed {
                return Err(BusError::Closed);
            }
            match registry.topics.get(topic) {
                Some(entry) => entry.snapshot(),
                None => {
                    trace!(topic, "publish to topic without listeners");
                    return Ok(0);
                }
            }
        };

        let mut delivered = 0;
        for (id, sender) in targets {
            match sender.try_send(Arc::clone(&event)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    trace!(topic, listener = id, "listener queue full, event dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    trace!(topic, listener = id, "listener closed, event dropped");
                }
            }
        }
        Ok(delivered)
    }

    /// Remove every listener and refuse further publishes.
    ///
    /// Dropping the queues ends every listener stream, so sessions still
    /// attached to the bus observe end-of-stream.
    pub fn close(&self) {
        let removed: usize = {
            let mut registry = self.inner.write();
            registry.closed = true;
            registry.topics.drain().map(|(_, topic)| topic.len()).sum()
        };
        debug!(removed, "topic bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().closed
    }

    /// Number of listeners currently registered under `topic`.
    pub fn listener_count(&self, topic: &str) -> usize {
        self.inner.read().topics.get(topic).map_or(0, Topic::len)
    }

    pub fn topic_count(&self) -> usize {
        self.inner.read().topics.len()
    }
}
