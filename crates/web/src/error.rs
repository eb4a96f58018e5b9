//! Connection-level error classification.

use snafu::{Location, Snafu};

/// Result alias for connection handling.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while driving a connection.
///
/// The variants map one-to-one onto the handler's close policy, centralized
/// in `ConnectionHandler::handle_error`:
///
/// | Variant              | Response sent?  | Connection |
/// |----------------------|-----------------|------------|
/// | `Validation`         | yes             | stays      |
/// | `NotFound`           | yes             | stays      |
/// | `Internal`           | yes (generic)   | stays      |
/// | `Protocol`           | best effort     | closes     |
/// | `Transport` / `Eof`  | no              | closes     |
/// | `Cancelled`          | no              | closes     |
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Request input failed a handler's spec.
    #[snafu(display("Invalid request: {message}"))]
    Validation {
        /// What failed.
        message: String,
    },

    /// No handler registered for the request target.
    #[snafu(display("Unknown target: {target}"))]
    NotFound {
        /// The unmatched target.
        target: String,
    },

    /// Framing or handshake violation.
    #[snafu(display("Protocol error: {message}"))]
    Protocol {
        /// What was malformed.
        message: String,
    },

    /// Socket-level I/O failure.
    #[snafu(display("Transport error: {message}"))]
    Transport {
        /// Underlying failure description.
        message: String,
    },

    /// The client closed its end of the connection.
    #[snafu(display("End of stream"))]
    Eof,

    /// `stop()` fired while the operation was in flight.
    #[snafu(display("Operation cancelled"))]
    Cancelled,

    /// Programming bug; translated to a generic server error response.
    #[snafu(display("Internal error at {location}: {message}"))]
    Internal {
        /// What went wrong.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },
}
