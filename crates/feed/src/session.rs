//! The session seam between the transport layer and the feeds.

use std::sync::Arc;

use snafu::Snafu;

/// Stable identity of a live client connection, used as a registry key.
pub type SessionId = u64;

/// Error returned by [`Session::send`].
///
/// A failing send is never retried: the session is presumed dead and its
/// registry entries are collected the next time its weak reference fails
/// to promote.
#[derive(Debug, Snafu)]
pub enum SendError {
    /// The connection's outbound queue is gone.
    #[snafu(display("Session is closed"))]
    Closed,
}

/// A live client connection capable of receiving server-pushed JSON.
///
/// Lifetime is owned by the transport layer; the feeds hold only weak
/// references and must tolerate the session being released between any two
/// calls. `send` enqueues on the connection's outbound queue and must not
/// block.
pub trait Session: Send + Sync {
    /// Stable registry key for this session.
    fn id(&self) -> SessionId;

    /// Negotiated API version (1 unless the client selected another).
    fn api_version(&self) -> u32;

    /// Enqueues a message for delivery to the client.
    fn send(&self, message: Arc<String>) -> Result<(), SendError>;
}
