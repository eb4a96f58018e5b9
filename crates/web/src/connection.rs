//! The transport seam: framed requests and responses over one connection.

use std::sync::Arc;

use async_trait::async_trait;
use scribe_feed::Session;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Request verb, covering both HTTP and WebSocket framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// HTTP GET.
    Get,
    /// HTTP POST.
    Post,
    /// A WebSocket text message.
    WsMessage,
}

/// One framed client request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Request verb.
    pub method: Method,
    /// Request path; empty for WebSocket messages.
    pub target: String,
    /// Raw request body.
    pub body: String,
}

impl Request {
    /// An HTTP GET request.
    pub fn get(target: impl Into<String>) -> Self {
        Self { method: Method::Get, target: target.into(), body: String::new() }
    }

    /// An HTTP POST request.
    pub fn post(target: impl Into<String>, body: impl Into<String>) -> Self {
        Self { method: Method::Post, target: target.into(), body: body.into() }
    }

    /// A WebSocket text message.
    pub fn ws(body: impl Into<String>) -> Self {
        Self { method: Method::WsMessage, target: String::new(), body: body.into() }
    }
}

/// Response status, mapped onto HTTP codes by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Success.
    Ok,
    /// Request-level failure the client can fix.
    BadRequest,
    /// Unknown target.
    NotFound,
    /// Server-side failure.
    InternalServerError,
}

/// One framed response.
///
/// The body carries the client's correlation verbatim (WebSocket handlers
/// echo the request `id`), so responses may be written out of request order
/// under the parallel policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response status.
    pub status: Status,
    /// Response body.
    pub body: String,
}

impl Response {
    /// A successful response.
    pub fn ok(body: impl Into<String>) -> Self {
        Self { status: Status::Ok, body: body.into() }
    }

    /// An error response with a JSON `{"error": ...}` body.
    pub fn error(status: Status, message: &str) -> Self {
        Self { status, body: json!({ "error": message }).to_string() }
    }
}

/// Per-request context handed to handlers.
#[derive(Clone)]
pub struct ConnectionContext {
    /// Feed identity of the connection; present for WebSocket connections
    /// so subscription commands can attach and detach listeners.
    pub session: Option<Arc<dyn Session>>,
    /// Negotiated API version.
    pub api_version: u32,
    /// Observed by handlers at suspension points; fires on `stop()` or
    /// connection teardown.
    pub cancellation: CancellationToken,
}

/// One live client connection, driven by the connection handler.
///
/// Implementations use interior mutability: `receive` is only ever called
/// from the handler's single read loop, while `send` may be called from
/// several in-flight request tasks under the parallel policy.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Reads the next framed request.
    ///
    /// Returns [`Eof`](crate::error::Error::Eof) on clean client close,
    /// [`Transport`](crate::error::Error::Transport) on socket failure,
    /// and [`Protocol`](crate::error::Error::Protocol) on malformed framing.
    async fn receive(&self) -> Result<Request>;

    /// Writes one response.
    async fn send(&self, response: Response) -> Result<()>;

    /// Closes the connection.
    async fn close(&self);

    /// Feed identity for subscription wiring, if this transport has one.
    fn session(&self) -> Option<Arc<dyn Session>>;

    /// Negotiated API version.
    fn api_version(&self) -> u32;
}
