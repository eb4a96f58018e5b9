//! The pooled write-connection seam the ingestion writer commits through.
//!
//! Shaped like a pooled SQL client: synchronous-looking `acquire`, async
//! statement execution, multi-statement transactions. The writer treats
//! statements opaquely; implementations interpret them.

use async_trait::async_trait;
use scribe_types::{Hash256, Result};

/// A statement parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    /// 32-bit unsigned integer.
    U32(u32),
    /// 64-bit unsigned integer.
    U64(u64),
    /// Raw bytes (hashes, serialized objects).
    Bytes(Vec<u8>),
    /// Text (account addresses).
    Text(String),
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        Self::U32(value)
    }
}

impl From<u64> for SqlValue {
    fn from(value: u64) -> Self {
        Self::U64(value)
    }
}

impl From<Hash256> for SqlValue {
    fn from(value: Hash256) -> Self {
        Self::Bytes(value.as_bytes().to_vec())
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// One pooled connection with transactional semantics.
///
/// Statements executed between `begin` and `commit` become visible
/// atomically at `commit`; `rollback` discards them.
#[async_trait]
pub trait WriteConnection: Send {
    /// Opens a transaction.
    async fn begin(&mut self) -> Result<()>;

    /// Executes a statement, returning the number of rows affected.
    async fn execute(&mut self, statement: &str, params: &[SqlValue]) -> Result<u64>;

    /// Commits the open transaction, returning once the store acknowledges
    /// durability.
    async fn commit(&mut self) -> Result<()>;

    /// Rolls back the open transaction.
    async fn rollback(&mut self) -> Result<()>;
}

/// A pool of write connections.
#[async_trait]
pub trait WritePool: Send + Sync {
    /// The connection type handed out by this pool.
    type Connection: WriteConnection;

    /// Acquires a connection from the pool.
    async fn acquire(&self) -> Result<Self::Connection>;
}
