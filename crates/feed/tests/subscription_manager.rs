//! End-to-end subscription manager scenarios.

use std::collections::BTreeSet;
use std::sync::Arc;

use scribe_backend::MemoryBackend;
use scribe_feed::mock::MockSession;
use scribe_feed::{FEE_SETTINGS_KEY, Session, SubscriptionManager};
use scribe_types::{
    AccountId, Asset, Book, Fees, Hash256, LedgerHeader, TransactionAndMetadata, TransactionMeta,
    codec,
};
use serde_json::json;

const ACCOUNT1: &str = "rf1BiGeXwwQoi8Z2ueFYTEXSwuJYfV2Jpn";
const ACCOUNT2: &str = "rLEsXccBGNR3UPuPu2hUXPjziKC3qKSBun";
const CURRENCY: &str = "0158415500000000C1F76FF6ECB0BAC600000000";
const ISSUER: &str = "rK9DrarGKnVEo2nYp5MfVRXRYf5yRX3mwD";
const LEDGERHASH: &str = "4BC50C9B0D8515D3EAAE1E74B29A95804346C491EE1A95BF25E4AAB854A6A652";

fn make_manager() -> SubscriptionManager {
    SubscriptionManager::new(Arc::new(MemoryBackend::new()))
}

fn make_header(sequence: u32) -> LedgerHeader {
    LedgerHeader::builder()
        .sequence(sequence)
        .drops(0)
        .parent_hash(Hash256::default())
        .tx_hash(Hash256::default())
        .account_hash(Hash256::default())
        .parent_close_time(0)
        .close_time(0)
        .close_time_resolution(10)
        .close_flags(0)
        .hash(LEDGERHASH.parse().expect("valid hash"))
        .build()
}

/// A payment whose metadata modifies one offer in the XRP/IOU book,
/// affecting the given accounts.
fn payment_with_book_change(affected: &[&str]) -> TransactionAndMetadata {
    let affected_accounts: BTreeSet<AccountId> =
        affected.iter().map(|address| AccountId::from(*address)).collect();
    TransactionAndMetadata {
        tx: json!({
            "Account": ACCOUNT1,
            "Destination": ACCOUNT2,
            "Amount": "1",
            "Fee": "1",
            "Sequence": 32,
            "TransactionType": "Payment",
            "hash": "51D2AAA6B8E4E16EF22F6424854283D8391B56875858A711B8CE4D5B9A422CC2",
            "date": 0
        }),
        meta: TransactionMeta {
            affected_accounts,
            ledger_sequence: 32,
            transaction_index: 22,
            tx_hash: "51D2AAA6B8E4E16EF22F6424854283D8391B56875858A711B8CE4D5B9A422CC2"
                .parse()
                .expect("valid hash"),
            json: json!({
                "AffectedNodes": [{
                    "ModifiedNode": {
                        "LedgerEntryType": "Offer",
                        "FinalFields": {
                            "TakerGets": "3",
                            "TakerPays": {
                                "currency": CURRENCY,
                                "issuer": ISSUER,
                                "value": "1"
                            }
                        },
                        "PreviousFields": {
                            "TakerGets": "1",
                            "TakerPays": {
                                "currency": CURRENCY,
                                "issuer": ISSUER,
                                "value": "3"
                            }
                        }
                    }
                }],
                "TransactionIndex": 22,
                "TransactionResult": "tesSUCCESS"
            }),
        },
    }
}

fn xrp_iou_book() -> Book {
    Book { pays: Asset::issued(CURRENCY, ISSUER), gets: Asset::xrp() }
}

#[tokio::test]
async fn report_counts_subscribers_and_reflects_release() {
    let manager = make_manager();
    let mock1 = MockSession::new();
    let mock2 = MockSession::new();
    mock2.set_api_version(2);
    let session1: Arc<dyn Session> = mock1.clone();
    let session2: Arc<dyn Session> = mock2.clone();
    let account = AccountId::from(ACCOUNT1);
    let book = xrp_iou_book();

    for session in [&session1, &session2] {
        manager.sub_book_changes(session);
        manager.sub_manifests(session);
        manager.sub_validations(session);
        manager.sub_transactions(session);
        manager.sub_proposed_transactions(session);
        manager.sub_account(account.clone(), session);
        manager.sub_proposed_account(account.clone(), session);
        manager.sub_book(book.clone(), session);
    }

    assert_eq!(
        manager.report(),
        json!({
            "ledger": 0,
            "transactions": 2,
            "transactions_proposed": 2,
            "manifests": 2,
            "validations": 2,
            "account": 2,
            "accounts_proposed": 2,
            "books": 2,
            "book_changes": 2
        })
    );

    // Manual unsubscribe counts down.
    manager.unsub_book_changes(session1.id());
    manager.unsub_manifests(session1.id());
    manager.unsub_validations(session1.id());
    manager.unsub_transactions(session1.id());
    manager.unsub_proposed_transactions(session1.id());
    manager.unsub_account(&account, session1.id());
    manager.unsub_proposed_account(&account, session1.id());
    manager.unsub_book(&book, session1.id());

    // Unsubscribing an account that was never subscribed is a no-op.
    let other = AccountId::from(ACCOUNT2);
    manager.unsub_account(&other, session1.id());
    manager.unsub_proposed_account(&other, session1.id());

    let report = manager.report();
    for topic in [
        "book_changes",
        "validations",
        "transactions_proposed",
        "transactions",
        "manifests",
        "accounts_proposed",
        "account",
        "books",
    ] {
        assert_eq!(report[topic], 1, "topic {topic}");
    }

    // Releasing the session externally counts down on the next report.
    drop(session2);
    drop(mock2);
    let report = manager.report();
    for topic in [
        "book_changes",
        "validations",
        "transactions_proposed",
        "transactions",
        "manifests",
        "accounts_proposed",
        "account",
        "books",
    ] {
        assert_eq!(report[topic], 0, "topic {topic}");
    }
}

#[tokio::test]
async fn transactions_and_proposed_overlap_sends_twice() {
    let manager = make_manager();
    let mock = MockSession::new();
    let session: Arc<dyn Session> = mock.clone();
    manager.sub_proposed_transactions(&session);
    manager.sub_transactions(&session);

    manager.pub_transaction(&payment_with_book_change(&[ACCOUNT1]), &make_header(33));

    assert!(mock.wait_for(2).await);
    assert_eq!(mock.settled_count().await, 2);
}

#[tokio::test]
async fn account_and_proposed_account_overlap_sends_once() {
    let manager = make_manager();
    let mock = MockSession::new();
    let session: Arc<dyn Session> = mock.clone();
    let account = AccountId::from(ACCOUNT1);
    manager.sub_proposed_account(account.clone(), &session);
    manager.sub_account(account, &session);

    manager.pub_transaction(&payment_with_book_change(&[ACCOUNT1]), &make_header(33));

    assert!(mock.wait_for(1).await);
    assert_eq!(mock.settled_count().await, 1);
}

#[tokio::test]
async fn transaction_account_book_overlap_sends_three_times() {
    let manager = make_manager();
    let mock = MockSession::new();
    let session: Arc<dyn Session> = mock.clone();
    manager.sub_transactions(&session);
    manager.sub_account(AccountId::from(ISSUER), &session);
    manager.sub_book(xrp_iou_book(), &session);

    manager.pub_transaction(&payment_with_book_change(&[ISSUER]), &make_header(33));

    assert!(mock.wait_for(3).await);
    assert_eq!(mock.settled_count().await, 3);

    let envelope = &mock.sent_json()[0];
    assert_eq!(envelope["type"], "transaction");
    assert_eq!(envelope["validated"], true);
    assert_eq!(envelope["status"], "closed");
    assert_eq!(envelope["ledger_index"], 33);
    assert_eq!(envelope["ledger_hash"], LEDGERHASH);
    assert_eq!(envelope["engine_result"], "tesSUCCESS");
    assert_eq!(envelope["engine_result_code"], 0);
    assert_eq!(
        envelope["engine_result_message"],
        "The transaction was applied. Only final in a validated ledger."
    );
    assert_eq!(envelope["close_time_iso"], "2000-01-01T00:00:00Z");
}

#[tokio::test]
async fn proposed_transaction_forward_and_validated_publish() {
    let manager = make_manager();
    let mock = MockSession::new();
    let session: Arc<dyn Session> = mock.clone();
    let account = AccountId::from(ACCOUNT1);
    manager.sub_proposed_account(account, &session);
    manager.sub_proposed_transactions(&session);

    let proposed = json!({
        "transaction": {
            "Account": ACCOUNT1,
            "Destination": ACCOUNT2
        }
    });

    // One send per scope: transactions_proposed and accounts_proposed.
    manager.forward_proposed_transaction(&proposed);
    assert!(mock.wait_for(2).await);
    assert_eq!(mock.sent_json()[0], proposed);

    // A validated transaction also reaches both scopes once each.
    manager.pub_transaction(&payment_with_book_change(&[ACCOUNT1]), &make_header(33));
    assert!(mock.wait_for(4).await);
    assert_eq!(mock.settled_count().await, 4);
}

#[tokio::test]
async fn book_changes_event_shape() {
    let manager = make_manager();
    let mock = MockSession::new();
    let session: Arc<dyn Session> = mock.clone();
    manager.sub_book_changes(&session);
    assert_eq!(manager.report()["book_changes"], 1);

    manager.pub_book_changes(&make_header(32), &[payment_with_book_change(&[ACCOUNT1])]);

    assert!(mock.wait_for(1).await);
    assert_eq!(
        mock.sent_json()[0],
        json!({
            "type": "bookChanges",
            "ledger_index": 32,
            "ledger_hash": LEDGERHASH,
            "ledger_time": 0,
            "changes": [{
                "currency_a": "XRP_drops",
                "currency_b": format!("{ISSUER}/{CURRENCY}"),
                "volume_a": "2",
                "volume_b": "2",
                "high": "-1",
                "low": "-1",
                "open": "-1",
                "close": "-1"
            }]
        })
    );

    manager.unsub_book_changes(session.id());
    assert_eq!(manager.report()["book_changes"], 0);
}

#[tokio::test]
async fn ledger_snapshot_and_closed_broadcast() {
    let backend = Arc::new(MemoryBackend::new());
    backend.set_range(10, 30);
    backend.put_header(make_header(30));
    let fees = Fees { base: 1, reserve_base: 3, reserve_inc: 2 };
    backend.put_ledger_object(
        FEE_SETTINGS_KEY.parse().expect("valid key"),
        codec::serialize_fee_settings(&fees, 4, 0).to_vec(),
    );

    let manager = SubscriptionManager::new(backend);
    let mock = MockSession::new();
    let session: Arc<dyn Session> = mock.clone();

    let snapshot = manager.sub_ledger(&session).await.expect("snapshot");
    assert_eq!(
        snapshot,
        json!({
            "validated_ledgers": "10-30",
            "ledger_index": 30,
            "ledger_hash": LEDGERHASH,
            "ledger_time": 0,
            "fee_base": 1,
            "reserve_base": 3,
            "reserve_inc": 2
        })
    );
    assert_eq!(manager.report()["ledger"], 1);

    let fees2 = Fees { base: 0, reserve_base: 10, reserve_inc: 0 };
    manager.pub_ledger(&make_header(31), &fees2, "10-31", 8);
    assert!(mock.wait_for(1).await);
    assert_eq!(
        mock.sent_json()[0],
        json!({
            "type": "ledgerClosed",
            "ledger_index": 31,
            "ledger_hash": LEDGERHASH,
            "ledger_time": 0,
            "fee_base": 0,
            "reserve_base": 10,
            "reserve_inc": 0,
            "validated_ledgers": "10-31",
            "txn_count": 8
        })
    );

    manager.unsub_ledger(session.id());
    assert_eq!(manager.report()["ledger"], 0);
}

#[tokio::test]
async fn sub_ledger_without_data_is_unavailable() {
    let manager = make_manager();
    let mock = MockSession::new();
    let session: Arc<dyn Session> = mock.clone();
    assert!(manager.sub_ledger(&session).await.is_err());
    assert_eq!(manager.report()["ledger"], 0);
}

#[tokio::test]
async fn released_session_receives_nothing() {
    let manager = make_manager();
    let mock = MockSession::new();
    let session: Arc<dyn Session> = mock.clone();
    manager.sub_manifests(&session);
    manager.sub_validations(&session);

    drop(session);
    drop(mock);

    // Publishing to released sessions must not fail and must prune them.
    manager.forward_manifest(&json!({"manifest": "test"}));
    manager.forward_validation(&json!({"validation": "test"}));

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let report = manager.report();
    assert_eq!(report["manifests"], 0);
    assert_eq!(report["validations"], 0);
}

#[tokio::test]
async fn delivery_is_fifo_per_topic() {
    let manager = make_manager();
    let mock = MockSession::new();
    let session: Arc<dyn Session> = mock.clone();
    manager.sub_manifests(&session);

    for n in 0..20 {
        manager.forward_manifest(&json!({"manifest": n}));
    }

    assert!(mock.wait_for(20).await);
    let received: Vec<i64> = mock
        .sent_json()
        .iter()
        .map(|msg| msg["manifest"].as_i64().expect("sequence number"))
        .collect();
    assert_eq!(received, (0..20).collect::<Vec<_>>());
}

#[tokio::test]
async fn api_version_selects_envelope() {
    let manager = make_manager();
    let mock_v1 = MockSession::new();
    let mock_v2 = MockSession::new();
    mock_v2.set_api_version(2);
    let session_v1: Arc<dyn Session> = mock_v1.clone();
    let session_v2: Arc<dyn Session> = mock_v2.clone();
    manager.sub_transactions(&session_v1);
    manager.sub_transactions(&session_v2);

    manager.pub_transaction(&payment_with_book_change(&[ACCOUNT1]), &make_header(33));

    assert!(mock_v1.wait_for(1).await);
    assert!(mock_v2.wait_for(1).await);
    assert!(mock_v1.sent_json()[0]["transaction"].get("DeliverMax").is_none());
    assert_eq!(mock_v2.sent_json()[0]["transaction"]["DeliverMax"], "1");
}
