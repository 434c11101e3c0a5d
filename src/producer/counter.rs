use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counter advanced by the event producer.
///
/// Cloning shares the same value. Only the producer module can advance it;
/// every other holder can only read.
#[derive(Debug, Clone, Default)]
pub struct NumberCounter {
    value: Arc<AtomicU64>,
}

impl NumberCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Advance by one and return the new value.
    pub(crate) fn increment(&self) -> u64 {
        self.value.fetch_add(1, Ordering::AcqRel) + 1
    }
}
