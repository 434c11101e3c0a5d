//! Event producer
//!
//! A single background task that, once per interval, advances the shared
//! counter and publishes a fresh `Event` to the increment topic. It runs until
//! its cancellation token fires; publish failures are logged and the loop
//! carries on.

mod counter;

pub use counter::NumberCounter;

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::{Event, TopicBus};

/// Topic every increment notification is published to.
pub const NUMBER_INCREMENTED: &str = "NUMBER_INCREMENTED";

pub struct EventProducer {
    bus: TopicBus<Event>,
    counter: NumberCounter,
    topic: String,
    interval: Duration,
}

impl EventProducer {
    pub fn new(bus: TopicBus<Event>, counter: NumberCounter) -> Self {
        Self {
            bus,
            counter,
            topic: NUMBER_INCREMENTED.to_string(),
            interval: Duration::from_secs(1),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Set the tick period. Clamped to at least one millisecond.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Advance the counter and publish one event. Returns the new value.
    pub fn tick(&self) -> u64 {
        let current = self.counter.increment();
        match self.bus.publish(&self.topic, Event::new(current)) {
            Ok(delivered) => {
                debug!(topic = %self.topic, current, delivered, "published increment");
            }
            Err(e) => {
                warn!(topic = %self.topic, current, error = %e, "failed to publish increment");
            }
        }
        current
    }

    /// Run the timer loop until `shutdown` is cancelled.
    ///
    /// The first tick fires one full interval after start.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(topic = %self.topic, interval_ms = self.interval.as_millis() as u64, "event producer started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }

        info!(last = self.counter.get(), "event producer stopped");
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
