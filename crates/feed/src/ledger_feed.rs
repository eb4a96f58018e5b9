//! The `ledger` stream: closed-ledger notifications with a snapshot
//! bootstrap.
//!
//! Subscribing is the only subscribe that returns data: the current
//! validated range, latest header, and fee schedule, shaped like a
//! `ledgerClosed` message without `type` and `txn_count`.

use std::sync::Arc;

use scribe_backend::Backend;
use scribe_types::codec;
use scribe_types::error::UnavailableSnafu;
use scribe_types::{Fees, Hash256, LedgerHeader, Result};
use serde_json::{Value, json};
use snafu::OptionExt;
use tracing::warn;

use crate::executor::FeedExecutor;
use crate::metrics;
use crate::session::{Session, SessionId};
use crate::subscription::Subscribers;

/// Key of the fee-settings singleton ledger object (hash of its space key).
pub const FEE_SETTINGS_KEY: &str = "4BC50C9B0D8515D3EAAE1E74B29A95804346C491EE1A95BF25E4AAB854A6A652";

pub(crate) struct LedgerFeed {
    subscribers: Subscribers,
    executor: FeedExecutor,
}

impl LedgerFeed {
    pub fn new() -> Self {
        Self { subscribers: Subscribers::new(), executor: FeedExecutor::new("ledger") }
    }

    /// Subscribes and returns the bootstrap snapshot.
    ///
    /// Fails with `Unavailable` until at least one ledger has been ingested.
    pub async fn sub(
        &self,
        session: &Arc<dyn Session>,
        backend: &dyn Backend,
    ) -> Result<Value> {
        let range = backend.fetch_ledger_range().await?.context(UnavailableSnafu {
            message: "no validated ledger range on hand".to_owned(),
        })?;
        let header = backend.fetch_ledger_by_sequence(range.max).await?.context(
            UnavailableSnafu { message: "latest validated ledger header missing".to_owned() },
        )?;
        let fees = self.fetch_fees(backend, range.max).await?;

        self.subscribers.subscribe(session);

        Ok(json!({
            "validated_ledgers": range.to_string(),
            "ledger_index": header.sequence,
            "ledger_hash": header.hash.to_string(),
            "ledger_time": header.close_time,
            "fee_base": fees.base,
            "reserve_base": fees.reserve_base,
            "reserve_inc": fees.reserve_inc,
        }))
    }

    pub fn unsub(&self, session_id: SessionId) {
        self.subscribers.unsubscribe(session_id);
    }

    pub fn count(&self) -> usize {
        self.subscribers.count()
    }

    /// Broadcasts a `ledgerClosed` message for a freshly committed ledger.
    pub fn pub_ledger(
        &self,
        header: &LedgerHeader,
        fees: &Fees,
        validated_range: &str,
        txn_count: usize,
    ) {
        let message = Arc::new(
            json!({
                "type": "ledgerClosed",
                "ledger_index": header.sequence,
                "ledger_hash": header.hash.to_string(),
                "ledger_time": header.close_time,
                "fee_base": fees.base,
                "reserve_base": fees.reserve_base,
                "reserve_inc": fees.reserve_inc,
                "validated_ledgers": validated_range,
                "txn_count": txn_count,
            })
            .to_string(),
        );

        let subscribers = self.subscribers.clone();
        metrics::record_event_published("ledger");
        self.executor.enqueue(move || {
            for session in subscribers.live() {
                if session.send(Arc::clone(&message)).is_err() {
                    metrics::record_send_failure("ledger");
                }
            }
        });
    }

    /// Reads the fee schedule as of `sequence`.
    ///
    /// A missing or undecodable fee object downgrades to defaults rather
    /// than failing the subscribe; the ledger stream is still useful
    /// without fees.
    async fn fetch_fees(&self, backend: &dyn Backend, sequence: u32) -> Result<Fees> {
        #[allow(clippy::expect_used)]
        let key: Hash256 = FEE_SETTINGS_KEY.parse().expect("fee settings key is valid hex");

        match backend.fetch_ledger_object(key, sequence).await? {
            Some(blob) => match codec::deserialize_fee_settings(&blob) {
                Ok(fees) => Ok(fees),
                Err(error) => {
                    warn!(%error, sequence, "fee settings object undecodable, using defaults");
                    Ok(Fees::default())
                },
            },
            None => {
                warn!(sequence, "fee settings object missing, using defaults");
                Ok(Fees::default())
            },
        }
    }
}
