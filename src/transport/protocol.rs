//! Subprotocol negotiation and the mapping from wire frames to commands.
//!
//! Two subprotocols are spoken on the GraphQL path:
//! - `graphql-transport-ws`: the current protocol. Violations close the
//!   socket with a 44xx code.
//! - `graphql-ws`: the legacy Apollo protocol. Violations are reported with a
//!   `connection_error` frame and the socket stays open; the server sends
//!   `ka` keep-alive frames while the connection is acknowledged.

use serde_json::{Value, json};

use crate::graphql::GraphQLRequest;
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::utils::error::ProtocolError;

/// WebSocket close codes used on subscription connections.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const BAD_REQUEST: u16 = 4400;
    pub const UNAUTHORIZED: u16 = 4401;
    pub const INIT_TIMEOUT: u16 = 4408;
    pub const SUBSCRIBER_EXISTS: u16 = 4409;
    pub const TOO_MANY_INIT_REQUESTS: u16 = 4429;
}

/// Close frame reasons are limited to 123 bytes of UTF-8.
const MAX_CLOSE_REASON: usize = 123;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    GraphQLTransportWs,
    GraphQLWs,
}

/// What a client frame asks the connection to do, independent of protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Init,
    Ping(Option<Value>),
    Pong,
    Subscribe { id: String, request: GraphQLRequest },
    Unsubscribe { id: String },
    Terminate,
}

impl Protocol {
    pub const fn name(&self) -> &'static str {
        match self {
            Protocol::GraphQLTransportWs => "graphql-transport-ws",
            Protocol::GraphQLWs => "graphql-ws",
        }
    }

    /// Pick the protocol for a `Sec-WebSocket-Protocol` offer.
    ///
    /// A missing or empty offer selects `graphql-transport-ws`. Otherwise the
    /// first supported entry wins, and `None` means nothing offered is spoken.
    pub fn negotiate(offered: Option<&str>) -> Option<Protocol> {
        let offered = match offered.map(str::trim) {
            None | Some("") => return Some(Protocol::GraphQLTransportWs),
            Some(list) => list,
        };
        offered
            .split(',')
            .map(str::trim)
            .find_map(|name| match name {
                "graphql-transport-ws" => Some(Protocol::GraphQLTransportWs),
                "graphql-ws" => Some(Protocol::GraphQLWs),
                _ => None,
            })
    }

    /// Decode a text frame into a command.
    pub fn parse(&self, text: &str) -> Result<Command, ProtocolError> {
        let message: ClientMessage = serde_json::from_str(text)
            .map_err(|e| ProtocolError::InvalidMessage(e.to_string()))?;
        self.command(message)
    }

    pub fn command(&self, message: ClientMessage) -> Result<Command, ProtocolError> {
        match (self, message) {
            (_, ClientMessage::ConnectionInit { .. }) => Ok(Command::Init),

            (Protocol::GraphQLTransportWs, ClientMessage::Ping { payload }) => {
                Ok(Command::Ping(payload))
            }
            (Protocol::GraphQLTransportWs, ClientMessage::Pong { .. }) => Ok(Command::Pong),
            (Protocol::GraphQLTransportWs, ClientMessage::Subscribe { id, payload }) => {
                Ok(Command::Subscribe {
                    id,
                    request: payload,
                })
            }
            (Protocol::GraphQLTransportWs, ClientMessage::Complete { id }) => {
                Ok(Command::Unsubscribe { id })
            }

            (Protocol::GraphQLWs, ClientMessage::Start { id, payload }) => Ok(Command::Subscribe {
                id,
                request: payload,
            }),
            (Protocol::GraphQLWs, ClientMessage::Stop { id }) => Ok(Command::Unsubscribe { id }),
            (Protocol::GraphQLWs, ClientMessage::ConnectionTerminate) => Ok(Command::Terminate),

            (_, other) => Err(ProtocolError::UnexpectedMessage(other.kind())),
        }
    }

    /// Frame carrying one execution result.
    pub fn next(&self, id: &str, payload: Value) -> ServerMessage {
        let id = id.to_string();
        match self {
            Protocol::GraphQLTransportWs => ServerMessage::Next { id, payload },
            Protocol::GraphQLWs => ServerMessage::Data { id, payload },
        }
    }

    /// Frame reporting that an operation could not be executed.
    pub fn error(&self, id: &str, payload: Value) -> ServerMessage {
        ServerMessage::Error {
            id: id.to_string(),
            payload,
        }
    }

    pub fn complete(&self, id: &str) -> ServerMessage {
        ServerMessage::Complete { id: id.to_string() }
    }

    /// Whether a client stop is answered with `complete`.
    pub fn completes_on_stop(&self) -> bool {
        matches!(self, Protocol::GraphQLWs)
    }

    /// Keep-alive frame, for protocols that have one.
    pub fn keep_alive(&self) -> Option<ServerMessage> {
        match self {
            Protocol::GraphQLTransportWs => None,
            Protocol::GraphQLWs => Some(ServerMessage::KeepAlive),
        }
    }

    /// How the connection answers a client violation.
    pub fn on_violation(&self, error: &ProtocolError) -> Violation {
        match self {
            Protocol::GraphQLTransportWs => Violation::Close {
                code: violation_code(error),
                reason: close_reason(&error.to_string()),
            },
            Protocol::GraphQLWs => Violation::Report(ServerMessage::ConnectionError {
                payload: json!({ "message": error.to_string() }),
            }),
        }
    }
}

/// Response to a protocol violation.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    Close { code: u16, reason: String },
    Report(ServerMessage),
}

fn violation_code(error: &ProtocolError) -> u16 {
    match error {
        ProtocolError::InvalidMessage(_) | ProtocolError::UnexpectedMessage(_) => {
            close_code::BAD_REQUEST
        }
        ProtocolError::Unauthorized => close_code::UNAUTHORIZED,
        ProtocolError::DuplicateSubscription(_) => close_code::SUBSCRIBER_EXISTS,
        ProtocolError::TooManyInitRequests => close_code::TOO_MANY_INIT_REQUESTS,
    }
}

/// Truncate `reason` to fit a close frame without splitting a character.
pub fn close_reason(reason: &str) -> String {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason.to_string();
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}
