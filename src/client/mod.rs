//! The `client` module defines the representation of a connected client.
//!
//! It provides the `Client` struct: a connection identifier plus the sending
//! side of the connection's outbound queue, shared by the connection loop and
//! every subscription session running on that connection.

pub mod pubsub_client;
pub use pubsub_client::Client;
