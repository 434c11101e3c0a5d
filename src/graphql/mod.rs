//! GraphQL surface of the bridge.
//!
//! Schema declaration, validation and execution are handled by
//! `async-graphql`; this module only supplies the resolvers: the query-side
//! counter lookup and the subscription resolver that plugs a topic bus
//! listener into the engine.

pub mod gateway;
pub mod request;
pub mod schema;

pub use gateway::QueryGateway;
pub use request::GraphQLRequest;
pub use schema::{NumberIncremented, NumberSchema, build_schema};

#[cfg(test)]
mod tests;
