//! The `transport` module is responsible for everything that touches the
//! network.
//!
//! It multiplexes one listening socket between GraphQL subscription
//! connections (WebSocket, `graphql-transport-ws` or legacy `graphql-ws`),
//! single GraphQL queries over `POST`, and an opaque handler for every other
//! request. It also owns graceful shutdown of the socket and its
//! connections.

pub mod http;
pub mod message;
pub mod protocol;
pub mod server;
pub mod websocket;

pub use http::{FallbackHandler, RequestHandler};
pub use protocol::Protocol;
pub use server::{Server, ServerState};
