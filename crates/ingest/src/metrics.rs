//! Ingestion writer metrics.

use std::time::Duration;

use metrics::{counter, histogram};

const LEDGERS_WRITTEN: &str = "scribe_ingest_ledgers_written_total";
const WRITE_FAILURES: &str = "scribe_ingest_write_failures_total";
const TRANSACTIONS_WRITTEN: &str = "scribe_ingest_transactions_written_total";
const WRITE_LATENCY: &str = "scribe_ingest_write_latency_seconds";

pub(crate) fn record_write_success(txn_count: usize, elapsed: Duration) {
    counter!(LEDGERS_WRITTEN).increment(1);
    counter!(TRANSACTIONS_WRITTEN).increment(txn_count as u64);
    histogram!(WRITE_LATENCY).record(elapsed.as_secs_f64());
}

pub(crate) fn record_write_failure() {
    counter!(WRITE_FAILURES).increment(1);
}
