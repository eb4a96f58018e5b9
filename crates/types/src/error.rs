//! Shared error types for Scribe using snafu.

use snafu::{Location, Snafu};

/// Unified result type for storage-facing operations.
pub type Result<T, E = StorageError> = std::result::Result<T, E>;

/// Errors surfaced by the storage driver seam.
///
/// The ingestion writer never exposes these to its callers — it reports a
/// single boolean and logs the cause — but the driver and its test doubles
/// speak this vocabulary.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Acquiring a pooled connection failed.
    #[snafu(display("Failed to acquire storage connection: {message}"))]
    Acquire {
        /// Error description.
        message: String,
    },

    /// A statement failed to execute.
    #[snafu(display("Statement failed at {location}: {message}"))]
    Execute {
        /// Error description.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// Transaction control (begin/commit/rollback) failed.
    #[snafu(display("Transaction error: {message}"))]
    Transaction {
        /// Error description.
        message: String,
    },

    /// The store is unreachable or shutting down.
    #[snafu(display("Storage unavailable: {message}"))]
    Unavailable {
        /// Error description.
        message: String,
    },
}
