//! The transactional ledger writer.
//!
//! Commits one ledger's rows — header, transactions, account-transaction
//! index — as a single storage transaction, advances the max-validated
//! marker, and fires a post-commit event. Either every row of a ledger is
//! visible or none is; there is no partial success.

use std::time::Instant;

use backon::{ExponentialBuilder, Retryable};
use scribe_backend::{SqlValue, WriteConnection, WritePool};
use scribe_types::{AccountTransactionsData, LedgerHeader, Result};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RetryPolicy;
use crate::metrics;

/// Header row insert. Insert-if-absent: replaying a committed sequence is a
/// row-level no-op.
pub const INSERT_LEDGER: &str = "INSERT INTO ledgers \
    (ledger_seq, ledger_hash, prev_hash, total_coins, closing_time, prev_closing_time, \
     close_time_res, close_flags, account_set_hash, trans_set_hash) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) ON CONFLICT DO NOTHING";

/// Transaction row insert, unique on the transaction hash.
pub const INSERT_TRANSACTION: &str = "INSERT INTO transactions \
    (trans_id, ledger_seq, trans_index, nodestore_hash) \
    VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING";

/// One row per (affected account, transaction) pair.
pub const INSERT_ACCOUNT_TRANSACTION: &str = "INSERT INTO account_transactions \
    (account, ledger_seq, trans_index, trans_id) \
    VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING";

/// Monotonic max-validated-sequence marker; never regresses.
pub const ADVANCE_MAX_VALIDATED: &str =
    "UPDATE validated_state SET max_sequence = GREATEST(max_sequence, $1)";

/// Fired after a ledger's commit is durable.
#[derive(Debug, Clone)]
pub struct CommitEvent {
    /// The committed header.
    pub header: LedgerHeader,
    /// Number of transactions in the commit.
    pub txn_count: usize,
}

/// Writes validated ledgers to durable storage.
///
/// Multiple ledgers may commit in parallel on different pool connections;
/// the marker update is monotonic, so commit order does not matter.
pub struct LedgerWriter<P> {
    pool: P,
    commits: broadcast::Sender<CommitEvent>,
}

impl<P: WritePool> LedgerWriter<P> {
    /// Creates a writer over a connection pool.
    pub fn new(pool: P) -> Self {
        let (commits, _) = broadcast::channel(64);
        Self { pool, commits }
    }

    /// Subscribes to post-commit events (the subscription manager's driver).
    pub fn subscribe_commits(&self) -> broadcast::Receiver<CommitEvent> {
        self.commits.subscribe()
    }

    /// Commits one ledger as a single logical transaction.
    ///
    /// Returns true once the store acknowledges durability. On any error
    /// the whole commit is rolled back, the cause is logged, and false is
    /// returned; the caller decides whether to retry.
    pub async fn write_ledger(
        &self,
        header: &LedgerHeader,
        account_tx_data: &[AccountTransactionsData],
    ) -> bool {
        let start = Instant::now();
        match self.try_write(header, account_tx_data).await {
            Ok(()) => {
                self.finish_commit(header, account_tx_data.len(), start);
                true
            },
            Err(error) => {
                metrics::record_write_failure();
                warn!(
                    sequence = header.sequence,
                    %error,
                    "ledger commit failed and was rolled back"
                );
                false
            },
        }
    }

    /// Like [`write_ledger`](Self::write_ledger), replaying failed commits
    /// with exponential backoff until the policy is exhausted or the token
    /// fires.
    pub async fn write_ledger_with_retry(
        &self,
        header: &LedgerHeader,
        account_tx_data: &[AccountTransactionsData],
        policy: &RetryPolicy,
        cancellation: &CancellationToken,
    ) -> bool {
        let start = Instant::now();
        let backoff = ExponentialBuilder::new()
            .with_min_delay(policy.initial_backoff())
            .with_max_delay(policy.max_backoff())
            .with_factor(policy.multiplier)
            .with_jitter()
            .with_max_times(policy.max_attempts.saturating_sub(1) as usize);

        let attempt = || self.try_write(header, account_tx_data);
        let retried = attempt.retry(backoff).sleep(tokio::time::sleep).notify(
            |error: &scribe_types::StorageError, delay| {
                debug!(
                    sequence = header.sequence,
                    backoff_ms = delay.as_millis() as u64,
                    %error,
                    "retrying ledger commit after backoff"
                );
            },
        );

        let outcome = tokio::select! {
            _ = cancellation.cancelled() => {
                debug!(sequence = header.sequence, "ledger commit cancelled");
                return false;
            },
            outcome = retried => outcome,
        };

        match outcome {
            Ok(()) => {
                self.finish_commit(header, account_tx_data.len(), start);
                true
            },
            Err(error) => {
                metrics::record_write_failure();
                warn!(
                    sequence = header.sequence,
                    attempts = policy.max_attempts,
                    %error,
                    "ledger commit failed after retries"
                );
                false
            },
        }
    }

    fn finish_commit(&self, header: &LedgerHeader, txn_count: usize, start: Instant) {
        metrics::record_write_success(txn_count, start.elapsed());
        info!(
            sequence = header.sequence,
            ledger_hash = %header.hash,
            txn_count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ledger committed"
        );
        let _ = self.commits.send(CommitEvent { header: header.clone(), txn_count });
    }

    async fn try_write(
        &self,
        header: &LedgerHeader,
        account_tx_data: &[AccountTransactionsData],
    ) -> Result<()> {
        let mut connection = self.pool.acquire().await?;
        connection.begin().await?;

        match stage(&mut connection, header, account_tx_data).await {
            Ok(()) => connection.commit().await,
            Err(error) => {
                // Rollback failures are dominated by the original error.
                let _ = connection.rollback().await;
                Err(error)
            },
        }
    }
}

/// Stages every row of the commit on an open transaction.
async fn stage<C: WriteConnection>(
    connection: &mut C,
    header: &LedgerHeader,
    account_tx_data: &[AccountTransactionsData],
) -> Result<()> {
    connection
        .execute(
            INSERT_LEDGER,
            &[
                header.sequence.into(),
                header.hash.into(),
                header.parent_hash.into(),
                header.drops.into(),
                header.close_time.into(),
                header.parent_close_time.into(),
                u32::from(header.close_time_resolution).into(),
                u32::from(header.close_flags).into(),
                header.account_hash.into(),
                header.tx_hash.into(),
            ],
        )
        .await?;

    for data in account_tx_data {
        connection
            .execute(
                INSERT_TRANSACTION,
                &[
                    data.tx_hash.into(),
                    data.ledger_sequence.into(),
                    data.transaction_index.into(),
                    data.nodestore_hash.into(),
                ],
            )
            .await?;

        for account in &data.accounts {
            connection
                .execute(
                    INSERT_ACCOUNT_TRANSACTION,
                    &[
                        account.as_str().into(),
                        data.ledger_sequence.into(),
                        data.transaction_index.into(),
                        data.tx_hash.into(),
                    ],
                )
                .await?;
        }
    }

    connection.execute(ADVANCE_MAX_VALIDATED, &[header.sequence.into()]).await?;
    Ok(())
}
