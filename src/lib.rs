//! # tickbus
//!
//! `tickbus` is a real-time publish/subscribe bridge. A server-side counter
//! ticks once per second and every increment is pushed to GraphQL
//! subscription clients over WebSockets, while a plain GraphQL query reads
//! the current value.
//!
//! ## Core Modules
//!
//! - `broker`: The topic bus that fans events out to listeners.
//! - `producer`: The shared counter and the periodic task that publishes it.
//! - `graphql`: Query and subscription resolvers on top of `async-graphql`.
//! - `session`: One subscription operation on one connection, and its lifecycle.
//! - `client`: The outbound side of a connected WebSocket client.
//! - `transport`: HTTP/WebSocket multiplexing, the subscription protocols and graceful shutdown.
//! - `config`: Handles loading and managing server configuration.
//! - `app`: Wires the pieces together and orders startup and shutdown.
//! - `utils`: Shared error types and logging setup.

pub mod app;
pub mod broker;
pub mod client;
pub mod config;
pub mod graphql;
pub mod producer;
pub mod session;
pub mod transport;
pub mod utils;
