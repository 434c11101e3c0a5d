//! Topic management
//!
//! A `Topic` holds the delivery queues of every listener registered under one
//! topic name. Callers must synchronize access (the bus keeps topics behind
//! its registry lock).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

pub type ListenerId = u64;

#[derive(Debug)]
pub struct Topic<E> {
    pub name: String,
    pub listeners: HashMap<ListenerId, mpsc::Sender<Arc<E>>>,
}

impl<E> Topic<E> {
    /// Create a new topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            listeners: HashMap::new(),
        }
    }

    /// Register a listener queue. Re-registering an id replaces its queue.
    pub fn subscribe(&mut self, id: ListenerId, sender: mpsc::Sender<Arc<E>>) {
        self.listeners.insert(id, sender);
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: &ListenerId) -> bool {
        self.listeners.remove(id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Copy of the current listener set, taken so delivery can happen
    /// without holding the registry lock.
    pub fn snapshot(&self) -> Vec<(ListenerId, mpsc::Sender<Arc<E>>)> {
        self.listeners
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect()
    }
}
