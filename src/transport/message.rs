//! Frames exchanged over an upgraded subscription connection.
//!
//! `ClientMessage` accepts the union of the `graphql-transport-ws` and legacy
//! `graphql-ws` vocabularies; `Protocol::command` rejects the half that does
//! not belong to the negotiated one.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graphql::GraphQLRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "connection_init")]
    ConnectionInit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },

    #[serde(rename = "ping")]
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },

    #[serde(rename = "pong")]
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },

    #[serde(rename = "subscribe")]
    Subscribe { id: String, payload: GraphQLRequest },

    #[serde(rename = "complete")]
    Complete { id: String },

    // legacy graphql-ws
    #[serde(rename = "start")]
    Start { id: String, payload: GraphQLRequest },

    #[serde(rename = "stop")]
    Stop { id: String },

    #[serde(rename = "connection_terminate")]
    ConnectionTerminate,
}

impl ClientMessage {
    /// The wire `type` of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::ConnectionInit { .. } => "connection_init",
            ClientMessage::Ping { .. } => "ping",
            ClientMessage::Pong { .. } => "pong",
            ClientMessage::Subscribe { .. } => "subscribe",
            ClientMessage::Complete { .. } => "complete",
            ClientMessage::Start { .. } => "start",
            ClientMessage::Stop { .. } => "stop",
            ClientMessage::ConnectionTerminate => "connection_terminate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "connection_ack")]
    ConnectionAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },

    #[serde(rename = "ping")]
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },

    #[serde(rename = "pong")]
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },

    #[serde(rename = "next")]
    Next { id: String, payload: Value },

    #[serde(rename = "error")]
    Error { id: String, payload: Value },

    #[serde(rename = "complete")]
    Complete { id: String },

    // legacy graphql-ws
    #[serde(rename = "data")]
    Data { id: String, payload: Value },

    #[serde(rename = "connection_error")]
    ConnectionError { payload: Value },

    #[serde(rename = "ka")]
    KeepAlive,
}
