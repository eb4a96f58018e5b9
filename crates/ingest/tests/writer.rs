//! Ledger writer commit semantics against the in-memory backend.

use std::collections::BTreeSet;

use scribe_backend::{Backend, MemoryBackend};
use scribe_ingest::{LedgerWriter, RetryPolicy};
use scribe_types::{AccountId, AccountTransactionsData, Hash256, LedgerHeader};
use tokio_util::sync::CancellationToken;

fn make_header(sequence: u32) -> LedgerHeader {
    LedgerHeader::builder()
        .sequence(sequence)
        .drops(99_999_999_999_000_000)
        .parent_hash(Hash256::new([1u8; 32]))
        .tx_hash(Hash256::new([2u8; 32]))
        .account_hash(Hash256::new([3u8; 32]))
        .parent_close_time(100)
        .close_time(110)
        .close_time_resolution(10)
        .close_flags(0)
        .hash(Hash256::new([sequence as u8; 32]))
        .build()
}

fn make_tx(sequence: u32, index: u32, accounts: &[&str]) -> AccountTransactionsData {
    AccountTransactionsData {
        accounts: accounts.iter().map(|a| AccountId::from(*a)).collect::<BTreeSet<_>>(),
        ledger_sequence: sequence,
        transaction_index: index,
        tx_hash: Hash256::new([(10 + index) as u8; 32]),
        nodestore_hash: Hash256::new([(100 + index) as u8; 32]),
    }
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy { max_attempts, initial_backoff_ms: 1, max_backoff_ms: 5, multiplier: 2.0 }
}

#[tokio::test]
async fn commit_makes_all_rows_visible() {
    let backend = MemoryBackend::new();
    let writer = LedgerWriter::new(backend.clone());
    let mut commits = writer.subscribe_commits();

    let header = make_header(5);
    let data = vec![
        make_tx(5, 0, &["rf1BiGeXwwQoi8Z2ueFYTEXSwuJYfV2Jpn"]),
        make_tx(5, 1, &["rf1BiGeXwwQoi8Z2ueFYTEXSwuJYfV2Jpn", "rLEsXccBGNR3UPuPu2hUXPjziKC3qKSBun"]),
    ];

    assert!(writer.write_ledger(&header, &data).await);

    assert_eq!(backend.ledger_count(), 1);
    assert_eq!(backend.transaction_count(), 2);
    assert_eq!(backend.account_transaction_count(), 3);
    assert_eq!(backend.max_validated_sequence(), Some(5));

    // The committed header is visible through the read API.
    let read_back = backend.fetch_ledger_by_sequence(5).await.expect("read").expect("present");
    assert_eq!(read_back, header);
    assert_eq!(backend.fetch_ledger_range().await.expect("read").expect("present").max, 5);

    // The post-commit event fired once, after durability.
    let event = commits.try_recv().expect("commit event");
    assert_eq!(event.header.sequence, 5);
    assert_eq!(event.txn_count, 2);
    assert!(commits.try_recv().is_err());
}

#[tokio::test]
async fn failed_commit_leaves_nothing_visible() {
    let backend = MemoryBackend::new();
    let writer = LedgerWriter::new(backend.clone());
    let mut commits = writer.subscribe_commits();

    // The header insert succeeds, then the first transaction insert fails:
    // the whole commit must roll back.
    backend.fail_after_executes(1);

    let data = vec![make_tx(5, 0, &["rf1BiGeXwwQoi8Z2ueFYTEXSwuJYfV2Jpn"])];
    assert!(!writer.write_ledger(&make_header(5), &data).await);

    assert_eq!(backend.ledger_count(), 0);
    assert_eq!(backend.transaction_count(), 0);
    assert_eq!(backend.account_transaction_count(), 0);
    assert_eq!(backend.max_validated_sequence(), None);
    assert!(commits.try_recv().is_err());
}

#[tokio::test]
async fn duplicate_commit_is_idempotent() {
    let backend = MemoryBackend::new();
    let writer = LedgerWriter::new(backend.clone());

    let header = make_header(5);
    let data = vec![make_tx(5, 0, &["rf1BiGeXwwQoi8Z2ueFYTEXSwuJYfV2Jpn"])];

    assert!(writer.write_ledger(&header, &data).await);
    assert!(writer.write_ledger(&header, &data).await);

    assert_eq!(backend.ledger_count(), 1);
    assert_eq!(backend.transaction_count(), 1);
    assert_eq!(backend.account_transaction_count(), 1);
    assert_eq!(backend.max_validated_sequence(), Some(5));
}

#[tokio::test]
async fn marker_never_regresses() {
    let backend = MemoryBackend::new();
    let writer = LedgerWriter::new(backend.clone());

    assert!(writer.write_ledger(&make_header(7), &[]).await);
    assert!(writer.write_ledger(&make_header(5), &[]).await);

    assert_eq!(backend.max_validated_sequence(), Some(7));
    assert_eq!(backend.ledger_count(), 2);
}

#[tokio::test]
async fn retry_replays_transient_failure() {
    let backend = MemoryBackend::new();
    let writer = LedgerWriter::new(backend.clone());

    // First statement of the first attempt fails; the replay succeeds.
    backend.fail_after_executes(0);

    let committed = writer
        .write_ledger_with_retry(
            &make_header(5),
            &[make_tx(5, 0, &["rf1BiGeXwwQoi8Z2ueFYTEXSwuJYfV2Jpn"])],
            &fast_retry(3),
            &CancellationToken::new(),
        )
        .await;

    assert!(committed);
    assert_eq!(backend.ledger_count(), 1);
    assert_eq!(backend.max_validated_sequence(), Some(5));
}

#[tokio::test]
async fn retry_gives_up_after_policy_attempts() {
    let backend = MemoryBackend::new();
    let writer = LedgerWriter::new(backend.clone());
    backend.set_fail_always(true);

    let committed = writer
        .write_ledger_with_retry(&make_header(5), &[], &fast_retry(2), &CancellationToken::new())
        .await;

    assert!(!committed);
    assert_eq!(backend.ledger_count(), 0);

    // The store recovering later allows a clean commit.
    backend.set_fail_always(false);
    assert!(writer.write_ledger(&make_header(5), &[]).await);
}

#[tokio::test]
async fn retry_observes_cancellation() {
    let backend = MemoryBackend::new();
    let writer = LedgerWriter::new(backend.clone());
    backend.set_fail_always(true);

    let cancellation = CancellationToken::new();
    cancellation.cancel();

    let committed = writer
        .write_ledger_with_retry(&make_header(5), &[], &fast_retry(100), &cancellation)
        .await;
    assert!(!committed);
}
