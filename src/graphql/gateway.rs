use crate::producer::NumberCounter;

/// Stateless read path over the counter.
#[derive(Debug, Clone)]
pub struct QueryGateway {
    counter: NumberCounter,
}

impl QueryGateway {
    pub fn new(counter: NumberCounter) -> Self {
        Self { counter }
    }

    /// Counter value visible right now.
    pub fn current_number(&self) -> u64 {
        self.counter.get()
    }
}
