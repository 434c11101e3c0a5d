//! Subscription sessions
//!
//! One `SubscriptionSession` exists per active subscription operation on a
//! connection. It owns the execution stream the GraphQL engine produced for
//! that operation, which in turn owns the bus listener, and forwards each
//! result to the connection's outbound queue.
//!
//! Lifecycle: `Pending -> Active -> Draining -> Closed`. A session never
//! goes back to an earlier state. Whatever ends it (client `complete`,
//! connection close, server shutdown, source exhaustion, execution error),
//! the listener is released before the session reports `Closed`.

use std::fmt;
use std::task::Poll;

use async_graphql::Response;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::client::Client;
use crate::graphql::{GraphQLRequest, NumberSchema};
use crate::transport::message::ServerMessage;
use crate::transport::protocol::Protocol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Created, operation not yet executing.
    Pending,
    /// The resolver has run and its listener is registered; results are
    /// forwarded as they arrive.
    Active,
    /// No further results are accepted; the listener is being released.
    Draining,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Pending => "pending",
            SessionState::Active => "active",
            SessionState::Draining => "draining",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The result stream ran out; `complete` was sent.
    Completed,
    /// Stopped from outside: client `complete`, disconnect or shutdown.
    Cancelled,
    /// The operation failed to execute; `error` was sent.
    Rejected,
    /// The connection's outbound queue is gone.
    Disconnected,
}

/// An operation's result stream, plus whatever its first poll produced.
pub struct Execution {
    stream: BoxStream<'static, Response>,
    first: Option<Option<Response>>,
}

pub struct SubscriptionSession {
    id: String,
    client: Client,
    protocol: Protocol,
    state: SessionState,
}

impl SubscriptionSession {
    pub fn new(id: impl Into<String>, client: Client, protocol: Protocol) -> Self {
        Self {
            id: id.into(),
            client,
            protocol,
            state: SessionState::Pending,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(next > self.state, "session state moved backwards");
        trace!(client = %self.client.id, session = %self.id, from = %self.state, to = %next, "session transition");
        self.state = next;
    }

    /// Execute `request` and forward its results until the stream ends or
    /// `cancel` fires.
    ///
    /// Cancellation sends nothing further to the client. Every path drops
    /// the execution stream, and with it the bus listener, before returning.
    pub async fn run(
        mut self,
        schema: NumberSchema,
        request: GraphQLRequest,
        cancel: CancellationToken,
    ) -> EndReason {
        let execution = self.activate(&schema, request).await;
        self.forward(execution, cancel).await
    }

    /// Start executing `request`.
    ///
    /// The first poll of the result stream runs the subscription resolver,
    /// which registers the bus listener. The session is `Active` only after
    /// that poll.
    pub async fn activate(&mut self, schema: &NumberSchema, request: GraphQLRequest) -> Execution {
        let mut stream = schema.execute_stream(request).boxed();
        let first = match futures::poll!(stream.next()) {
            Poll::Ready(item) => Some(item),
            Poll::Pending => None,
        };
        self.transition(SessionState::Active);
        debug!(client = %self.client.id, session = %self.id, "subscription started");
        Execution { stream, first }
    }

    async fn forward(mut self, execution: Execution, cancel: CancellationToken) -> EndReason {
        let Execution { mut stream, mut first } = execution;

        let reason = loop {
            let response = match first.take() {
                Some(response) => response,
                None => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break EndReason::Cancelled,
                    response = stream.next() => response,
                },
            };

            let Some(response) = response else {
                break EndReason::Completed;
            };

            if response.is_err() && matches!(response.data, async_graphql::Value::Null) {
                let payload = serde_json::to_value(&response.errors).unwrap_or(Value::Null);
                let message = self.protocol.error(&self.id, payload);
                break match self.deliver(&message, &cancel).await {
                    Ok(()) => EndReason::Rejected,
                    Err(reason) => reason,
                };
            }

            let payload = serde_json::to_value(&response).unwrap_or(Value::Null);
            let message = self.protocol.next(&self.id, payload);
            if let Err(reason) = self.deliver(&message, &cancel).await {
                break reason;
            }
        };

        self.transition(SessionState::Draining);
        drop(stream);

        if reason == EndReason::Completed {
            let message = self.protocol.complete(&self.id);
            // a closed queue at this point changes nothing for the caller
            let _ = self.deliver(&message, &cancel).await;
        }

        self.transition(SessionState::Closed);
        debug!(client = %self.client.id, session = %self.id, ?reason, "subscription closed");
        reason
    }

    /// Queue `message`, giving up if the session is cancelled while waiting
    /// for space.
    async fn deliver(
        &self,
        message: &ServerMessage,
        cancel: &CancellationToken,
    ) -> Result<(), EndReason> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EndReason::Cancelled),
            sent = self.client.send_json(message) => sent.map_err(|_| EndReason::Disconnected),
        }
    }
}

impl fmt::Debug for SubscriptionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionSession")
            .field("id", &self.id)
            .field("client", &self.client.id)
            .field("protocol", &self.protocol.name())
            .field("state", &self.state)
            .finish()
    }
}
