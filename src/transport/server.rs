//! Transport multiplexer.
//!
//! One listening socket serves both surfaces:
//! - WebSocket upgrades on the GraphQL path become subscription connections,
//! - `POST` on the GraphQL path executes a single query,
//! - everything else goes to the configured `RequestHandler`.
//!
//! `run_until` stops accepting when its shutdown future resolves, tells every
//! open connection to close, and waits up to the drain timeout for them
//! before aborting whatever is left.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tungstenite::http::{Method, Request, StatusCode};
use tungstenite::protocol::Role;

use crate::config::Settings;
use crate::graphql::{GraphQLRequest, NumberSchema};
use crate::transport::http::{
    self, RequestHandler, handshake_response, is_websocket_upgrade, json_response,
    method_not_allowed, offered_protocols, read_body, read_head, text_response, write_response,
};
use crate::transport::protocol::Protocol;
use crate::transport::websocket::{ConnectionOptions, serve_connection};
use crate::utils::error::{HttpError, ServerError};

/// Everything a connection task needs, shared by all of them.
pub struct ServerState {
    pub schema: NumberSchema,
    pub handler: Arc<dyn RequestHandler>,
    pub settings: Settings,
}

pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: Arc<ServerState>,
}

impl Server {
    /// Bind the configured host and port.
    pub async fn bind(state: ServerState) -> Result<Self, ServerError> {
        let addr = format!("{}:{}", state.settings.server.host, state.settings.server.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            state: Arc::new(state),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` resolves, then drain them.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let Server {
            listener,
            local_addr,
            state,
        } = self;
        let token = CancellationToken::new();
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        info!(
            "Ready on http://{}{}",
            local_addr, state.settings.server.graphql_path
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, no longer accepting connections");
                    break;
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let state = Arc::clone(&state);
                        let token = token.child_token();
                        connections.spawn(handle_connection(stream, peer, state, token));
                    }
                    Err(e) => error!(error = %e, "failed to accept connection"),
                },

                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "connection task failed");
                    }
                }
            }
        }

        token.cancel();
        let drain_timeout = Duration::from_millis(state.settings.shutdown.drain_timeout_ms);
        info!(open = connections.len(), "draining connections");

        let drained = time::timeout(drain_timeout, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = connections.len(),
                timeout_ms = drain_timeout.as_millis() as u64,
                "drain timed out, aborting remaining connections"
            );
            connections.shutdown().await;
        }

        drop(listener);
        info!("listener released");
        Ok(())
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
) {
    let server = &state.settings.server;
    let handshake_timeout = Duration::from_millis(server.handshake_timeout_ms);

    let head = tokio::select! {
        _ = shutdown.cancelled() => return,
        head = time::timeout(handshake_timeout, read_head(&mut stream, server.max_request_bytes)) => {
            head.unwrap_or(Err(HttpError::Timeout))
        }
    };
    let (request, leftover) = match head {
        Ok(head) => head,
        Err(HttpError::Incomplete) => return,
        Err(e) => {
            debug!(%peer, error = %e, "bad request head");
            let _ = write_response(&mut stream, error_response(&e)).await;
            return;
        }
    };

    let on_graphql_path = request.uri().path() == server.graphql_path;
    debug!(%peer, method = %request.method(), path = request.uri().path(), "request");

    if on_graphql_path && is_websocket_upgrade(&request) {
        upgrade(stream, request, leftover, &state, shutdown).await;
    } else if on_graphql_path {
        execute_query(stream, request, leftover, &state, &shutdown).await;
    } else {
        forward(stream, request, leftover, &state, &shutdown).await;
    }
}

async fn upgrade(
    mut stream: TcpStream,
    request: Request<()>,
    leftover: Vec<u8>,
    state: &ServerState,
    shutdown: CancellationToken,
) {
    let offered = offered_protocols(&request);
    let Some(protocol) = Protocol::negotiate(offered.as_deref()) else {
        debug!(offered = ?offered, "no supported subprotocol offered");
        let response = text_response(StatusCode::BAD_REQUEST, "Unsupported subprotocol\n");
        let _ = write_response(&mut stream, response).await;
        return;
    };

    let response = match handshake_response(&request, protocol) {
        Ok(response) => response,
        Err(e) => {
            debug!(error = %e, "rejected websocket upgrade");
            let _ = write_response(&mut stream, error_response(&e)).await;
            return;
        }
    };
    if let Err(e) = write_response(&mut stream, response).await {
        debug!(error = %e, "failed to complete websocket handshake");
        return;
    }

    let ws = WebSocketStream::from_partially_read(stream, leftover, Role::Server, None).await;
    serve_connection(
        ws,
        protocol,
        state.schema.clone(),
        ConnectionOptions::from_settings(&state.settings),
        shutdown,
    )
    .await;
}

/// Read the request body within the handshake budget.
///
/// `None` once shutdown starts; the caller drops the connection unanswered.
async fn receive_body(
    stream: &mut TcpStream,
    request: &Request<()>,
    leftover: Vec<u8>,
    state: &ServerState,
    shutdown: &CancellationToken,
) -> Option<Result<Vec<u8>, HttpError>> {
    let server = &state.settings.server;
    let budget = Duration::from_millis(server.handshake_timeout_ms);
    tokio::select! {
        _ = shutdown.cancelled() => None,
        body = time::timeout(budget, read_body(stream, request, leftover, server.max_request_bytes)) => {
            Some(body.unwrap_or(Err(HttpError::Timeout)))
        }
    }
}

async fn execute_query(
    mut stream: TcpStream,
    request: Request<()>,
    leftover: Vec<u8>,
    state: &ServerState,
    shutdown: &CancellationToken,
) {
    if request.method() != Method::POST {
        let _ = write_response(&mut stream, method_not_allowed()).await;
        return;
    }

    let Some(body) = receive_body(&mut stream, &request, leftover, state, shutdown).await else {
        return;
    };
    let response = match body {
        Err(e) => error_response(&e),
        Ok(body) => match serde_json::from_slice::<GraphQLRequest>(&body) {
            Err(e) => {
                let errors = serde_json::json!({ "errors": [{ "message": e.to_string() }] });
                json_response(StatusCode::BAD_REQUEST, errors.to_string().into_bytes())
            }
            Ok(query) => {
                let result = state.schema.execute(query).await;
                match serde_json::to_vec(&result) {
                    Ok(body) => json_response(StatusCode::OK, body),
                    Err(e) => {
                        error!(error = %e, "failed to serialize query result");
                        text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error\n")
                    }
                }
            }
        },
    };
    let _ = write_response(&mut stream, response).await;
}

async fn forward(
    mut stream: TcpStream,
    request: Request<()>,
    leftover: Vec<u8>,
    state: &ServerState,
    shutdown: &CancellationToken,
) {
    let Some(body) = receive_body(&mut stream, &request, leftover, state, shutdown).await else {
        return;
    };
    let response = match body {
        Ok(body) => {
            let (parts, ()) = request.into_parts();
            state.handler.handle(http::HttpRequest::from_parts(parts, body))
        }
        Err(e) => error_response(&e),
    };
    let _ = write_response(&mut stream, response).await;
}

fn error_response(error: &HttpError) -> http::HttpResponse {
    let status = match error {
        HttpError::HeadTooLarge(_) => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
        HttpError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        HttpError::Timeout => StatusCode::REQUEST_TIMEOUT,
        _ => StatusCode::BAD_REQUEST,
    };
    text_response(status, format!("{error}\n"))
}
