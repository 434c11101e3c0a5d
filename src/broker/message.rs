//! Event definitions for the bus
//!
//! `Event` is the payload published on every producer tick. It is built once
//! per publish and shared read-only (`Arc<Event>`) with every listener.
//!
//! Notes on fields:
//! - `current_number`: counter value at the time of publish
//! - `timestamp`: milliseconds since UNIX epoch, rendered as a decimal string

use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub current_number: u64,
    pub timestamp: String,
}

impl Event {
    /// Build an event for `current_number`, stamped with the current time.
    pub fn new(current_number: u64) -> Self {
        Self {
            current_number,
            timestamp: Utc::now().timestamp_millis().to_string(),
        }
    }
}
