//! The `error` module defines the error types used within `tickbus`.
//!
//! Each layer owns one enum. Per-listener and per-connection failures stay
//! inside their layer; only `ServerError` reaches `main`.

use std::io;

use config::ConfigError;
use thiserror::Error;

/// Errors returned by the topic bus.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("topic bus is closed")]
    Closed,
}

/// Violations of the subscription protocol by a client.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid message received: {0}")]
    InvalidMessage(String),

    #[error("Invalid message received: unexpected `{0}`")]
    UnexpectedMessage(&'static str),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Subscriber for {0} already exists")]
    DuplicateSubscription(String),

    #[error("Too many initialisation requests")]
    TooManyInitRequests,
}

/// Failures while reading or answering a plain HTTP request.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("connection closed before the request was complete")]
    Incomplete,

    #[error("timed out waiting for the request")]
    Timeout,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Fatal errors: anything that stops the server from starting or running.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}
