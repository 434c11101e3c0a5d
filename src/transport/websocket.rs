//! Upgraded subscription connections.
//!
//! Each connection runs two halves: a writer task that drains the bounded
//! outbound queue onto the socket, and the loop below that reads client
//! frames, drives the protocol handshake and starts or stops subscription
//! sessions. Sessions only ever write through the outbound queue.
//!
//! The writer and session tasks are held through `AbortOnDropHandle`, so
//! aborting the connection task also stops them and releases the socket.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::client::Client;
use crate::config::Settings;
use crate::graphql::{GraphQLRequest, NumberSchema};
use crate::session::{EndReason, SubscriptionSession};
use crate::transport::message::ServerMessage;
use crate::transport::protocol::{Command, Protocol, Violation, close_code};
use crate::utils::error::ProtocolError;

/// How long the writer gets to flush queued frames after the loop ends.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-connection limits and timers.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub init_timeout: Duration,
    pub keep_alive: Option<Duration>,
    pub outbound_capacity: usize,
}

impl ConnectionOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        let keep_alive = settings.protocol.keep_alive_ms;
        Self {
            init_timeout: Duration::from_millis(settings.protocol.connection_init_timeout_ms),
            keep_alive: (keep_alive > 0).then(|| Duration::from_millis(keep_alive)),
            outbound_capacity: settings.server.outbound_capacity.max(1),
        }
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Why the read loop stopped.
enum Disconnect {
    /// The peer closed, vanished or terminated.
    Client,
    /// The server closes with this code and reason.
    Close(u16, String),
    Shutdown,
}

enum Flow {
    Continue,
    Stop(Disconnect),
}

struct SessionHandle {
    generation: u64,
    cancel: CancellationToken,
    task: AbortOnDropHandle<EndReason>,
}

struct Connection {
    client: Client,
    protocol: Protocol,
    schema: NumberSchema,
    shutdown: CancellationToken,
    init_received: bool,
    sessions: HashMap<String, SessionHandle>,
    generation: u64,
    finished: mpsc::UnboundedSender<(String, u64)>,
}

impl Connection {
    /// Queue `message` unless shutdown starts while waiting for space.
    async fn send(&self, message: &ServerMessage) {
        // a failed send means the writer is gone; the read side notices next
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {}
            _ = self.client.send_json(message) => {}
        }
    }

    async fn close(&self, code: u16, reason: &str) {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {}
            _ = self.client.close(code, reason) => {}
        }
    }

    async fn handle_text(&mut self, text: &str) -> Flow {
        let command = match self.protocol.parse(text) {
            Ok(command) => command,
            Err(e) => return self.violation(e).await,
        };

        match command {
            Command::Init => {
                if self.init_received {
                    return self.violation(ProtocolError::TooManyInitRequests).await;
                }
                self.init_received = true;
                self.send(&ServerMessage::ConnectionAck { payload: None })
                    .await;
                if let Some(ka) = self.protocol.keep_alive() {
                    self.send(&ka).await;
                }
                debug!(client = %self.client.id, "connection acknowledged");
            }
            Command::Ping(payload) => self.send(&ServerMessage::Pong { payload }).await,
            Command::Pong => {}
            Command::Subscribe { id, request } => {
                if !self.init_received {
                    return self.violation(ProtocolError::Unauthorized).await;
                }
                if self.sessions.contains_key(&id) {
                    return self.violation(ProtocolError::DuplicateSubscription(id)).await;
                }
                self.start_session(id, request);
            }
            Command::Unsubscribe { id } => self.stop_session(&id).await,
            Command::Terminate => return Flow::Stop(Disconnect::Client),
        }
        Flow::Continue
    }

    async fn violation(&self, error: ProtocolError) -> Flow {
        warn!(client = %self.client.id, protocol = self.protocol.name(), error = %error, "protocol violation");
        match self.protocol.on_violation(&error) {
            Violation::Close { code, reason } => Flow::Stop(Disconnect::Close(code, reason)),
            Violation::Report(message) => {
                self.send(&message).await;
                Flow::Continue
            }
        }
    }

    fn start_session(&mut self, id: String, request: GraphQLRequest) {
        self.generation += 1;
        let generation = self.generation;
        let cancel = self.shutdown.child_token();

        let session = SubscriptionSession::new(id.clone(), self.client.clone(), self.protocol);
        let schema = self.schema.clone();
        let finished = self.finished.clone();
        let token = cancel.clone();
        let key = id.clone();
        let task = AbortOnDropHandle::new(tokio::spawn(async move {
            let reason = session.run(schema, request, token).await;
            let _ = finished.send((key, generation));
            reason
        }));

        debug!(client = %self.client.id, session = %id, "session registered");
        self.sessions.insert(
            id,
            SessionHandle {
                generation,
                cancel,
                task,
            },
        );
    }

    /// Client-requested stop. Unknown ids are ignored.
    ///
    /// Waits for the session to release its listener, then confirms with
    /// `complete` where the protocol expects it.
    async fn stop_session(&mut self, id: &str) {
        let Some(handle) = self.sessions.remove(id) else {
            return;
        };
        handle.cancel.cancel();
        if let Err(e) = handle.task.await {
            warn!(client = %self.client.id, session = %id, error = %e, "session task failed");
        }
        debug!(client = %self.client.id, session = %id, "session stopped by client");

        if self.protocol.completes_on_stop() {
            self.send(&self.protocol.complete(id)).await;
        }
    }

    /// Forget a session that ended on its own, unless the id was reused.
    fn reap(&mut self, id: &str, generation: u64) {
        if self
            .sessions
            .get(id)
            .is_some_and(|handle| handle.generation == generation)
        {
            self.sessions.remove(id);
        }
    }

    /// Cancel every session and wait until each has released its listener.
    async fn drain(&mut self) {
        let sessions: Vec<_> = self.sessions.drain().collect();
        for (_, handle) in &sessions {
            handle.cancel.cancel();
        }
        for (id, handle) in sessions {
            if let Err(e) = handle.task.await {
                warn!(client = %self.client.id, session = %id, error = %e, "session task failed");
            }
        }
    }
}

async fn keep_alive_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Serve one upgraded connection until the peer leaves, the protocol says
/// to close, or `shutdown` fires.
///
/// On return every session of the connection has released its listener.
pub async fn serve_connection<S>(
    ws: WebSocketStream<S>,
    protocol: Protocol,
    schema: NumberSchema,
    options: ConnectionOptions,
    shutdown: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut ws_sender, mut ws_receiver) = ws.split();
    let (tx, mut rx) = mpsc::channel::<WsMessage>(options.outbound_capacity);
    let client = Client::new(tx);
    let client_id = client.id.clone();
    info!(client = %client_id, protocol = protocol.name(), "connection opened");

    // Forward queued frames to the socket
    let mut writer = {
        let client_id = client_id.clone();
        AbortOnDropHandle::new(tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let closing = msg.is_close();
                if let Err(e) = ws_sender.send(msg).await {
                    debug!(client = %client_id, error = %e, "failed to write frame");
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = ws_sender.close().await;
        }))
    };

    let (finished_tx, mut finished_rx) = mpsc::unbounded_channel();
    let mut conn = Connection {
        client,
        protocol,
        schema,
        shutdown: shutdown.clone(),
        init_received: false,
        sessions: HashMap::new(),
        generation: 0,
        finished: finished_tx,
    };

    let init_deadline = time::sleep(options.init_timeout);
    tokio::pin!(init_deadline);

    let mut keep_alive = match (protocol.keep_alive(), options.keep_alive) {
        (Some(_), Some(period)) => {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Some(interval)
        }
        _ => None,
    };

    let disconnect = loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break Disconnect::Shutdown,

            _ = &mut init_deadline, if !conn.init_received => {
                warn!(client = %client_id, "connection_init not received in time");
                break Disconnect::Close(
                    close_code::INIT_TIMEOUT,
                    "Connection initialisation timeout".to_string(),
                );
            }

            _ = keep_alive_tick(&mut keep_alive), if conn.init_received => {
                if let Some(ka) = protocol.keep_alive() {
                    conn.send(&ka).await;
                }
            }

            Some((id, generation)) = finished_rx.recv() => conn.reap(&id, generation),

            frame = ws_receiver.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Flow::Stop(reason) = conn.handle_text(text.as_str()).await {
                        break reason;
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => break Disconnect::Client,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(client = %client_id, error = %e, "read failed");
                    break Disconnect::Client;
                }
            },
        }
    };

    conn.drain().await;

    match &disconnect {
        Disconnect::Shutdown => {
            // a full queue means the peer stopped reading; skip the frame
            conn.client
                .try_close(close_code::GOING_AWAY, "Server shutting down");
        }
        Disconnect::Close(code, reason) => conn.close(*code, reason).await,
        Disconnect::Client if protocol == Protocol::GraphQLWs => {
            conn.close(close_code::NORMAL, "").await;
        }
        Disconnect::Client => {}
    }
    drop(conn);

    if time::timeout(WRITER_FLUSH_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }

    let reason = match disconnect {
        Disconnect::Client => "client",
        Disconnect::Close(..) => "protocol",
        Disconnect::Shutdown => "shutdown",
    };
    info!(client = %client_id, reason, "connection closed");
}
