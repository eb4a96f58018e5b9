//! Batched transactional ledger writer for Scribe.
//!
//! [`LedgerWriter`] turns a decoded ledger — header plus per-transaction
//! [`scribe_types::AccountTransactionsData`] — into durable rows with
//! at-most-once visibility: a reader observing sequence `N` observes every
//! row committed for `N`. Successful commits fire a [`CommitEvent`] the
//! subscription manager listens to.

pub mod config;
mod metrics;
pub mod writer;

pub use crate::config::{IngestConfig, RetryPolicy};
pub use crate::writer::{CommitEvent, LedgerWriter};
