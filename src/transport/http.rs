//! Minimal HTTP/1.1 handling for the multiplexer.
//!
//! Only what the bridge needs: read one request head (and, for plain
//! requests, a `Content-Length` body), decide whether it is a WebSocket
//! upgrade, and write one response. Every plain response carries
//! `Connection: close`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tungstenite::handshake::derive_accept_key;
use tungstenite::http::header::{
    self, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HeaderName, HeaderValue,
    SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_PROTOCOL, SEC_WEBSOCKET_VERSION,
    TRANSFER_ENCODING, UPGRADE,
};
use tungstenite::http::{Method, Request, Response, StatusCode, Version};

use crate::config::RunMode;
use crate::transport::protocol::Protocol;
use crate::utils::error::HttpError;

pub type HttpRequest = Request<Vec<u8>>;
pub type HttpResponse = Response<Vec<u8>>;

const MAX_HEADERS: usize = 64;
const READ_CHUNK: usize = 4096;

/// Handles every request that is not addressed to the GraphQL path.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, request: HttpRequest) -> HttpResponse;
}

/// Answers everything with `404 Not Found`. In development the body names
/// the unmatched route.
#[derive(Debug, Clone, Copy)]
pub struct FallbackHandler {
    mode: RunMode,
}

impl FallbackHandler {
    pub fn new(mode: RunMode) -> Self {
        Self { mode }
    }
}

impl RequestHandler for FallbackHandler {
    fn handle(&self, request: HttpRequest) -> HttpResponse {
        let body = match self.mode {
            RunMode::Development => {
                format!("No route for {} {}\n", request.method(), request.uri().path())
            }
            RunMode::Production => "Not Found\n".to_string(),
        };
        text_response(StatusCode::NOT_FOUND, body)
    }
}

/// Read a request head from `stream`.
///
/// Returns the parsed head and whatever bytes arrived after it, which belong
/// to the body or to the first WebSocket frame.
pub async fn read_head<S>(
    stream: &mut S,
    max_bytes: usize,
) -> Result<(Request<()>, Vec<u8>), HttpError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(HttpError::Incomplete);
        }
        buf.extend_from_slice(&chunk[..n]);

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Request::new(&mut headers);
        let status = parsed
            .parse(&buf)
            .map_err(|e| HttpError::Malformed(e.to_string()))?;

        match status {
            httparse::Status::Complete(len) => {
                let request = to_request(&parsed)?;
                let leftover = buf.split_off(len);
                return Ok((request, leftover));
            }
            httparse::Status::Partial if buf.len() >= max_bytes => {
                return Err(HttpError::HeadTooLarge(max_bytes));
            }
            httparse::Status::Partial => {}
        }
    }
}

fn to_request(parsed: &httparse::Request<'_, '_>) -> Result<Request<()>, HttpError> {
    let method = parsed
        .method
        .ok_or_else(|| HttpError::Malformed("missing method".to_string()))?;
    let path = parsed
        .path
        .ok_or_else(|| HttpError::Malformed("missing path".to_string()))?;
    let version = match parsed.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut builder = Request::builder().method(method).uri(path).version(version);
    for h in parsed.headers.iter() {
        builder = builder.header(h.name, h.value);
    }
    builder
        .body(())
        .map_err(|e| HttpError::Malformed(e.to_string()))
}

/// Read the body announced by `Content-Length`, starting with `leftover`.
pub async fn read_body<S>(
    stream: &mut S,
    head: &Request<()>,
    mut leftover: Vec<u8>,
    max_bytes: usize,
) -> Result<Vec<u8>, HttpError>
where
    S: AsyncRead + Unpin,
{
    if head.headers().contains_key(TRANSFER_ENCODING) {
        return Err(HttpError::Malformed(
            "transfer-encoding is not supported".to_string(),
        ));
    }

    let length = match head.headers().get(CONTENT_LENGTH) {
        None => 0,
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .ok_or_else(|| HttpError::Malformed("invalid content-length".to_string()))?,
    };
    if length > max_bytes {
        return Err(HttpError::BodyTooLarge(max_bytes));
    }

    let mut chunk = [0u8; READ_CHUNK];
    while leftover.len() < length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(HttpError::Incomplete);
        }
        leftover.extend_from_slice(&chunk[..n]);
    }
    leftover.truncate(length);
    Ok(leftover)
}

fn header_has_token(request: &Request<()>, name: HeaderName, token: &str) -> bool {
    request
        .headers()
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Whether the request asks to switch to the WebSocket protocol.
pub fn is_websocket_upgrade(request: &Request<()>) -> bool {
    header_has_token(request, UPGRADE, "websocket")
        && header_has_token(request, CONNECTION, "upgrade")
}

/// Every `Sec-WebSocket-Protocol` value the client sent, joined into one list.
pub fn offered_protocols(request: &Request<()>) -> Option<String> {
    let values: Vec<&str> = request
        .headers()
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join(","))
    }
}

/// Build the `101 Switching Protocols` answer for a validated upgrade.
pub fn handshake_response(
    request: &Request<()>,
    protocol: Protocol,
) -> Result<HttpResponse, HttpError> {
    if request.method() != Method::GET {
        return Err(HttpError::Malformed("upgrade must use GET".to_string()));
    }
    let version_ok = request
        .headers()
        .get(SEC_WEBSOCKET_VERSION)
        .is_some_and(|v| v.as_bytes() == b"13");
    if !version_ok {
        return Err(HttpError::Malformed(
            "unsupported websocket version".to_string(),
        ));
    }
    let key = request
        .headers()
        .get(SEC_WEBSOCKET_KEY)
        .ok_or_else(|| HttpError::Malformed("missing sec-websocket-key".to_string()))?;
    let accept = HeaderValue::from_str(&derive_accept_key(key.as_bytes()))
        .map_err(|e| HttpError::Malformed(e.to_string()))?;

    let mut response = Response::new(Vec::new());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(SEC_WEBSOCKET_ACCEPT, accept);
    // echo the subprotocol only when one was offered
    if request.headers().contains_key(SEC_WEBSOCKET_PROTOCOL) {
        headers.insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(protocol.name()),
        );
    }
    Ok(response)
}

pub fn text_response(status: StatusCode, body: impl Into<String>) -> HttpResponse {
    with_content_type(status, "text/plain; charset=utf-8", body.into().into_bytes())
}

pub fn json_response(status: StatusCode, body: Vec<u8>) -> HttpResponse {
    with_content_type(status, "application/json", body)
}

fn with_content_type(status: StatusCode, content_type: &'static str, body: Vec<u8>) -> HttpResponse {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// `405` listing the methods the GraphQL path accepts.
pub fn method_not_allowed() -> HttpResponse {
    let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed\n");
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static("GET, POST"));
    response
}

/// Serialize `response` onto `stream`.
///
/// Final responses get `Content-Length` and `Connection: close`; the `101`
/// handshake answer is written as built.
pub async fn write_response<S>(stream: &mut S, response: HttpResponse) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let (mut parts, body) = response.into_parts();
    if !parts.status.is_informational() {
        parts.headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        parts
            .headers
            .insert(CONNECTION, HeaderValue::from_static("close"));
    }

    let mut out = Vec::with_capacity(256 + body.len());
    out.extend_from_slice(
        format!(
            "HTTP/1.1 {} {}\r\n",
            parts.status.as_u16(),
            parts.status.canonical_reason().unwrap_or("")
        )
        .as_bytes(),
    );
    for (name, value) in parts.headers.iter() {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&body);

    stream.write_all(&out).await?;
    stream.flush().await
}
