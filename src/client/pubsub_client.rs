use serde::Serialize;
use tokio::sync::mpsc::{self, error::SendError};
use tungstenite::protocol::{CloseFrame, Message as WsMessage, frame::coding::CloseCode};
use uuid::Uuid;

/// Represents a connected WebSocket client.
///
/// Cloning is cheap; every clone feeds the same outbound queue, which the
/// connection's writer task drains onto the socket.
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique identifier for the connection.
    pub id: String,

    /// Channel to send WebSocket messages to the client.
    pub sender: mpsc::Sender<WsMessage>,
}

impl Client {
    pub fn new(sender: mpsc::Sender<WsMessage>) -> Self {
        Self {
            id: format!("client-{}", Uuid::new_v4()),
            sender,
        }
    }

    /// Serialize `message` as a JSON text frame and queue it.
    ///
    /// Waits for queue space; fails only once the writer side is gone.
    pub async fn send_json<T: Serialize>(&self, message: &T) -> Result<(), SendError<WsMessage>> {
        let text = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(client = %self.id, error = %e, "failed to serialize outbound message");
                return Ok(());
            }
        };
        self.sender.send(WsMessage::text(text)).await
    }

    /// Queue a close frame with the given code and reason.
    pub async fn close(&self, code: u16, reason: &str) -> Result<(), SendError<WsMessage>> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        self.sender.send(WsMessage::Close(Some(frame))).await
    }

    /// Queue a close frame only if there is room right now.
    ///
    /// Returns whether the frame was queued.
    pub fn try_close(&self, code: u16, reason: &str) -> bool {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        self.sender.try_send(WsMessage::Close(Some(frame))).is_ok()
    }

    /// Whether the writer side has gone away.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
