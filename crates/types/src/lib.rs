//! Core types, wire codecs, and errors for Scribe.
//!
//! This crate provides the foundational types used throughout the indexer:
//! - Ledger headers, transactions, and the rows the writer persists
//! - Wire codecs for the canonical header and fee-settings layouts
//! - Offer detection and order-book keying helpers
//! - Error types using snafu

pub mod codec;
pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{Result, StorageError};
pub use types::*;
