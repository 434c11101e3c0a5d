//! In-memory topic bus.
//!
//! The bus maps topic names to the listeners currently registered under them
//! and fans every published event out to a snapshot of those listeners.
//! Each listener owns a bounded queue; publishing never waits on a listener.

pub mod engine;
pub mod listener;
pub mod message;
pub mod topic;

pub use engine::TopicBus;
pub use listener::Listener;
pub use message::Event;
pub use topic::ListenerId;

#[cfg(test)]
mod tests;
