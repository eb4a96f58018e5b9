//! Read API over the durable store.
//!
//! Only the three reads the subscription manager needs for the ledger
//! stream bootstrap; query handlers get their own richer interface upstream.

use async_trait::async_trait;
use scribe_types::{Hash256, LedgerHeader, LedgerRange, Result};

/// Read access to validated-ledger data.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Returns the contiguous validated range on hand, if any ledger has
    /// been ingested yet.
    async fn fetch_ledger_range(&self) -> Result<Option<LedgerRange>>;

    /// Fetches the header of the ledger with the given sequence.
    async fn fetch_ledger_by_sequence(&self, sequence: u32) -> Result<Option<LedgerHeader>>;

    /// Fetches a raw ledger object by key as of the given sequence.
    ///
    /// The subscription manager uses this to read the fee-settings object.
    async fn fetch_ledger_object(&self, key: Hash256, sequence: u32) -> Result<Option<Vec<u8>>>;
}
