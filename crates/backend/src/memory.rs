//! In-memory backend for testing and embedding demos.
//!
//! Implements both storage seams over process-local tables. The write side
//! interprets the indexer's fixed statement set (matched by target table),
//! staging statements between `begin` and `commit` so that partially
//! executed transactions are never visible. All data is lost on drop.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use scribe_types::error::{ExecuteSnafu, TransactionSnafu};
use scribe_types::{Hash256, LedgerHeader, LedgerRange, Result};
use snafu::ensure;

use crate::pool::{SqlValue, WriteConnection, WritePool};
use crate::read::Backend;

/// In-memory implementation of the read API and the write pool.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    tables: Mutex<Tables>,
    /// Countdown of statements to execute successfully before injecting a
    /// failure; `None` disables injection.
    fail_after: Mutex<Option<u32>>,
    /// When set, every statement fails until cleared.
    fail_always: std::sync::atomic::AtomicBool,
}

#[derive(Default)]
struct Tables {
    headers: BTreeMap<u32, LedgerHeader>,
    objects: HashMap<Hash256, Vec<u8>>,
    transactions: HashMap<Vec<u8>, (u32, u32, Vec<u8>)>,
    account_transactions: BTreeSet<(String, u32, u32)>,
    max_validated: Option<u32>,
    /// Explicit range override set by tests; otherwise derived from headers.
    seeded_range: Option<LedgerRange>,
}

impl Tables {
    fn range(&self) -> Option<LedgerRange> {
        if let Some(range) = self.seeded_range {
            return Some(range);
        }
        let min = *self.headers.keys().next()?;
        let max = *self.headers.keys().next_back()?;
        Some(LedgerRange { min, max })
    }
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the validated range reported by [`Backend::fetch_ledger_range`].
    pub fn set_range(&self, min: u32, max: u32) {
        self.inner.tables.lock().seeded_range = Some(LedgerRange { min, max });
    }

    /// Seeds a ledger header for the read API.
    pub fn put_header(&self, header: LedgerHeader) {
        self.inner.tables.lock().headers.insert(header.sequence, header);
    }

    /// Seeds a raw ledger object for the read API.
    pub fn put_ledger_object(&self, key: Hash256, data: Vec<u8>) {
        self.inner.tables.lock().objects.insert(key, data);
    }

    /// Injects one failure after `n` further successful statements.
    pub fn fail_after_executes(&self, n: u32) {
        *self.inner.fail_after.lock() = Some(n);
    }

    /// Makes every statement fail until called again with `false`.
    pub fn set_fail_always(&self, fail: bool) {
        self.inner.fail_always.store(fail, std::sync::atomic::Ordering::Release);
    }

    /// Current max-validated-sequence marker.
    pub fn max_validated_sequence(&self) -> Option<u32> {
        self.inner.tables.lock().max_validated
    }

    /// Number of committed ledger header rows.
    pub fn ledger_count(&self) -> usize {
        self.inner.tables.lock().headers.len()
    }

    /// Number of committed transaction rows.
    pub fn transaction_count(&self) -> usize {
        self.inner.tables.lock().transactions.len()
    }

    /// Number of committed account-transaction rows.
    pub fn account_transaction_count(&self) -> usize {
        self.inner.tables.lock().account_transactions.len()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn fetch_ledger_range(&self) -> Result<Option<LedgerRange>> {
        Ok(self.inner.tables.lock().range())
    }

    async fn fetch_ledger_by_sequence(&self, sequence: u32) -> Result<Option<LedgerHeader>> {
        Ok(self.inner.tables.lock().headers.get(&sequence).cloned())
    }

    async fn fetch_ledger_object(&self, key: Hash256, _sequence: u32) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.tables.lock().objects.get(&key).cloned())
    }
}

#[async_trait]
impl WritePool for MemoryBackend {
    type Connection = MemoryConnection;

    async fn acquire(&self) -> Result<MemoryConnection> {
        Ok(MemoryConnection { inner: Arc::clone(&self.inner), staged: Vec::new(), in_txn: false })
    }
}

/// A pooled connection into a [`MemoryBackend`].
pub struct MemoryConnection {
    inner: Arc<Inner>,
    staged: Vec<(String, Vec<SqlValue>)>,
    in_txn: bool,
}

impl MemoryConnection {
    fn check_injected_failure(&self) -> Result<()> {
        if self.inner.fail_always.load(std::sync::atomic::Ordering::Acquire) {
            return ExecuteSnafu { message: "injected failure".to_owned() }.fail();
        }
        let mut fail_after = self.inner.fail_after.lock();
        if let Some(remaining) = fail_after.as_mut() {
            if *remaining == 0 {
                *fail_after = None;
                return ExecuteSnafu { message: "injected failure".to_owned() }.fail();
            }
            *remaining -= 1;
        }
        Ok(())
    }

    /// Returns how many rows the statement would affect given committed and
    /// already-staged state. Inserts are insert-if-absent.
    fn would_affect(&self, tables: &Tables, statement: &str, params: &[SqlValue]) -> Result<u64> {
        let affected = match table_of(statement)? {
            Table::Ledgers => {
                let seq = param_u32(params, 0)?;
                let staged = self.staged_contains(Table::Ledgers, params);
                u64::from(!tables.headers.contains_key(&seq) && !staged)
            },
            Table::Transactions => {
                let hash = param_bytes(params, 0)?;
                let staged = self.staged_contains(Table::Transactions, params);
                u64::from(!tables.transactions.contains_key(hash) && !staged)
            },
            Table::AccountTransactions => {
                let key =
                    (param_text(params, 0)?.to_owned(), param_u32(params, 1)?, param_u32(params, 2)?);
                let staged = self.staged_contains(Table::AccountTransactions, params);
                u64::from(!tables.account_transactions.contains(&key) && !staged)
            },
            Table::ValidatedState => 1,
        };
        Ok(affected)
    }

    fn staged_contains(&self, table: Table, params: &[SqlValue]) -> bool {
        self.staged.iter().any(|(statement, staged_params)| {
            table_of(statement).is_ok_and(|t| t == table)
                && key_params(table, staged_params) == key_params(table, params)
        })
    }
}

fn key_params(table: Table, params: &[SqlValue]) -> &[SqlValue] {
    let key_len = match table {
        Table::Ledgers | Table::Transactions | Table::ValidatedState => 1,
        Table::AccountTransactions => 3,
    };
    &params[..key_len.min(params.len())]
}

#[async_trait]
impl WriteConnection for MemoryConnection {
    async fn begin(&mut self) -> Result<()> {
        ensure!(!self.in_txn, TransactionSnafu { message: "transaction already open".to_owned() });
        self.in_txn = true;
        Ok(())
    }

    async fn execute(&mut self, statement: &str, params: &[SqlValue]) -> Result<u64> {
        self.check_injected_failure()?;

        let mut tables = self.inner.tables.lock();
        let affected = self.would_affect(&tables, statement, params)?;

        if self.in_txn {
            if affected > 0 {
                self.staged.push((statement.to_owned(), params.to_vec()));
            }
        } else if affected > 0 {
            apply(&mut tables, statement, params)?;
        }
        Ok(affected)
    }

    async fn commit(&mut self) -> Result<()> {
        ensure!(self.in_txn, TransactionSnafu { message: "no open transaction".to_owned() });
        let mut tables = self.inner.tables.lock();
        for (statement, params) in self.staged.drain(..) {
            apply(&mut tables, &statement, &params)?;
        }
        self.in_txn = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.staged.clear();
        self.in_txn = false;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Table {
    Ledgers,
    Transactions,
    AccountTransactions,
    ValidatedState,
}

fn table_of(statement: &str) -> Result<Table> {
    if statement.starts_with("INSERT INTO ledgers") {
        Ok(Table::Ledgers)
    } else if statement.starts_with("INSERT INTO transactions") {
        Ok(Table::Transactions)
    } else if statement.starts_with("INSERT INTO account_transactions") {
        Ok(Table::AccountTransactions)
    } else if statement.starts_with("UPDATE validated_state") {
        Ok(Table::ValidatedState)
    } else {
        ExecuteSnafu { message: format!("unrecognized statement: {statement}") }.fail()
    }
}

fn apply(tables: &mut Tables, statement: &str, params: &[SqlValue]) -> Result<()> {
    match table_of(statement)? {
        Table::Ledgers => {
            let header = LedgerHeader {
                sequence: param_u32(params, 0)?,
                hash: param_hash(params, 1)?,
                parent_hash: param_hash(params, 2)?,
                drops: param_u64(params, 3)?,
                close_time: param_u32(params, 4)?,
                parent_close_time: param_u32(params, 5)?,
                close_time_resolution: param_u32(params, 6)? as u8,
                close_flags: param_u32(params, 7)? as u8,
                account_hash: param_hash(params, 8)?,
                tx_hash: param_hash(params, 9)?,
            };
            tables.headers.entry(header.sequence).or_insert(header);
        },
        Table::Transactions => {
            let hash = param_bytes(params, 0)?.to_vec();
            let row = (param_u32(params, 1)?, param_u32(params, 2)?, param_bytes(params, 3)?.to_vec());
            tables.transactions.entry(hash).or_insert(row);
        },
        Table::AccountTransactions => {
            let key =
                (param_text(params, 0)?.to_owned(), param_u32(params, 1)?, param_u32(params, 2)?);
            tables.account_transactions.insert(key);
        },
        Table::ValidatedState => {
            let seq = param_u32(params, 0)?;
            let current = tables.max_validated.unwrap_or(0);
            tables.max_validated = Some(current.max(seq));
        },
    }
    Ok(())
}

fn param_u32(params: &[SqlValue], index: usize) -> Result<u32> {
    match params.get(index) {
        Some(SqlValue::U32(value)) => Ok(*value),
        other => ExecuteSnafu { message: format!("param {index}: expected u32, got {other:?}") }.fail(),
    }
}

fn param_u64(params: &[SqlValue], index: usize) -> Result<u64> {
    match params.get(index) {
        Some(SqlValue::U64(value)) => Ok(*value),
        other => ExecuteSnafu { message: format!("param {index}: expected u64, got {other:?}") }.fail(),
    }
}

fn param_bytes(params: &[SqlValue], index: usize) -> Result<&[u8]> {
    match params.get(index) {
        Some(SqlValue::Bytes(value)) => Ok(value),
        other => ExecuteSnafu { message: format!("param {index}: expected bytes, got {other:?}") }.fail(),
    }
}

fn param_text(params: &[SqlValue], index: usize) -> Result<&str> {
    match params.get(index) {
        Some(SqlValue::Text(value)) => Ok(value),
        other => ExecuteSnafu { message: format!("param {index}: expected text, got {other:?}") }.fail(),
    }
}

fn param_hash(params: &[SqlValue], index: usize) -> Result<Hash256> {
    let bytes = param_bytes(params, index)?;
    let arr: [u8; 32] = bytes.try_into().map_err(|_| {
        ExecuteSnafu { message: format!("param {index}: expected 32 bytes, got {}", bytes.len()) }
            .build()
    })?;
    Ok(Hash256::new(arr))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn header(sequence: u32) -> LedgerHeader {
        LedgerHeader {
            sequence,
            drops: 0,
            parent_hash: Hash256::default(),
            tx_hash: Hash256::default(),
            account_hash: Hash256::default(),
            parent_close_time: 0,
            close_time: 0,
            close_time_resolution: 10,
            close_flags: 0,
            hash: Hash256::new([sequence as u8; 32]),
        }
    }

    #[tokio::test]
    async fn test_read_api_seeding() {
        let backend = MemoryBackend::new();
        backend.set_range(10, 30);
        backend.put_header(header(30));
        backend.put_ledger_object(Hash256::new([1u8; 32]), vec![0xAA]);

        let range = backend.fetch_ledger_range().await.unwrap().unwrap();
        assert_eq!(range.to_string(), "10-30");
        assert_eq!(backend.fetch_ledger_by_sequence(30).await.unwrap().unwrap().sequence, 30);
        assert_eq!(
            backend.fetch_ledger_object(Hash256::new([1u8; 32]), 30).await.unwrap().unwrap(),
            vec![0xAA]
        );
        assert!(backend.fetch_ledger_by_sequence(29).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_staged_writes_invisible_until_commit() {
        let backend = MemoryBackend::new();
        let mut conn = backend.acquire().await.unwrap();
        conn.begin().await.unwrap();
        conn.execute("UPDATE validated_state SET max_sequence = ?", &[SqlValue::U32(5)])
            .await
            .unwrap();
        assert_eq!(backend.max_validated_sequence(), None);

        conn.commit().await.unwrap();
        assert_eq!(backend.max_validated_sequence(), Some(5));
    }

    #[tokio::test]
    async fn test_rollback_discards_staged_writes() {
        let backend = MemoryBackend::new();
        let mut conn = backend.acquire().await.unwrap();
        conn.begin().await.unwrap();
        conn.execute("UPDATE validated_state SET max_sequence = ?", &[SqlValue::U32(5)])
            .await
            .unwrap();
        conn.rollback().await.unwrap();
        assert_eq!(backend.max_validated_sequence(), None);
    }

    #[tokio::test]
    async fn test_marker_never_regresses() {
        let backend = MemoryBackend::new();
        let mut conn = backend.acquire().await.unwrap();
        for seq in [7u32, 3] {
            conn.begin().await.unwrap();
            conn.execute("UPDATE validated_state SET max_sequence = ?", &[SqlValue::U32(seq)])
                .await
                .unwrap();
            conn.commit().await.unwrap();
        }
        assert_eq!(backend.max_validated_sequence(), Some(7));
    }

    #[tokio::test]
    async fn test_insert_if_absent_reports_zero_rows() {
        let backend = MemoryBackend::new();
        let mut conn = backend.acquire().await.unwrap();
        let params = [
            SqlValue::Bytes(vec![9u8; 32]),
            SqlValue::U32(4),
            SqlValue::U32(0),
            SqlValue::Bytes(vec![8u8; 32]),
        ];

        conn.begin().await.unwrap();
        assert_eq!(conn.execute("INSERT INTO transactions ...", &params).await.unwrap(), 1);
        assert_eq!(conn.execute("INSERT INTO transactions ...", &params).await.unwrap(), 0);
        conn.commit().await.unwrap();
        assert_eq!(backend.transaction_count(), 1);

        // Duplicate after commit is also a no-op.
        conn.begin().await.unwrap();
        assert_eq!(conn.execute("INSERT INTO transactions ...", &params).await.unwrap(), 0);
        conn.commit().await.unwrap();
        assert_eq!(backend.transaction_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let backend = MemoryBackend::new();
        backend.fail_after_executes(1);
        let mut conn = backend.acquire().await.unwrap();
        conn.begin().await.unwrap();
        assert!(conn
            .execute("UPDATE validated_state SET max_sequence = ?", &[SqlValue::U32(1)])
            .await
            .is_ok());
        assert!(conn
            .execute("UPDATE validated_state SET max_sequence = ?", &[SqlValue::U32(2)])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_unrecognized_statement_rejected() {
        let backend = MemoryBackend::new();
        let mut conn = backend.acquire().await.unwrap();
        assert!(conn.execute("DROP TABLE ledgers", &[]).await.is_err());
    }
}
