//! Validated and proposed transaction streams.
//!
//! One worker serializes every topic in the transaction family
//! (`transactions`, `transactions_proposed`, `account`, `accounts_proposed`,
//! `books`), so validated and proposed events interleave in publish order on
//! each topic.
//!
//! Delivery contract for one validated transaction, per session:
//! - `transactions` and `transactions_proposed` deliver independently (a
//!   session subscribed to both gets the event twice);
//! - the account scope — `account[a]` and `accounts_proposed[a]` across all
//!   affected accounts — delivers at most once;
//! - the book scope delivers at most once across all touched books.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use scribe_types::{
    AccountId, Asset, Book, EngineResult, LedgerHeader, TransactionAndMetadata,
};
use serde_json::{Value, json};

use crate::executor::FeedExecutor;
use crate::metrics;
use crate::session::{Session, SessionId};
use crate::subscription::{KeyedSubscribers, Subscribers};

pub(crate) struct TransactionFeed {
    transactions: Subscribers,
    proposed_transactions: Subscribers,
    accounts: KeyedSubscribers<AccountId>,
    proposed_accounts: KeyedSubscribers<AccountId>,
    books: KeyedSubscribers<Book>,
    executor: FeedExecutor,
}

impl TransactionFeed {
    pub fn new() -> Self {
        Self {
            transactions: Subscribers::new(),
            proposed_transactions: Subscribers::new(),
            accounts: KeyedSubscribers::new(),
            proposed_accounts: KeyedSubscribers::new(),
            books: KeyedSubscribers::new(),
            executor: FeedExecutor::new("transactions"),
        }
    }

    pub fn sub_transactions(&self, session: &Arc<dyn Session>) {
        self.transactions.subscribe(session);
    }

    pub fn unsub_transactions(&self, session_id: SessionId) {
        self.transactions.unsubscribe(session_id);
    }

    pub fn sub_proposed_transactions(&self, session: &Arc<dyn Session>) {
        self.proposed_transactions.subscribe(session);
    }

    pub fn unsub_proposed_transactions(&self, session_id: SessionId) {
        self.proposed_transactions.unsubscribe(session_id);
    }

    pub fn sub_account(&self, account: AccountId, session: &Arc<dyn Session>) {
        self.accounts.subscribe(account, session);
    }

    pub fn unsub_account(&self, account: &AccountId, session_id: SessionId) {
        self.accounts.unsubscribe(account, session_id);
    }

    pub fn sub_proposed_account(&self, account: AccountId, session: &Arc<dyn Session>) {
        self.proposed_accounts.subscribe(account, session);
    }

    pub fn unsub_proposed_account(&self, account: &AccountId, session_id: SessionId) {
        self.proposed_accounts.unsubscribe(account, session_id);
    }

    pub fn sub_book(&self, book: Book, session: &Arc<dyn Session>) {
        self.books.subscribe(book, session);
    }

    pub fn unsub_book(&self, book: &Book, session_id: SessionId) {
        self.books.unsubscribe(book, session_id);
    }

    pub fn transactions_count(&self) -> usize {
        self.transactions.count()
    }

    pub fn proposed_transactions_count(&self) -> usize {
        self.proposed_transactions.count()
    }

    pub fn accounts_count(&self) -> usize {
        self.accounts.count()
    }

    pub fn proposed_accounts_count(&self) -> usize {
        self.proposed_accounts.count()
    }

    pub fn books_count(&self) -> usize {
        self.books.count()
    }

    /// Publishes a validated transaction to every matching topic.
    pub fn pub_transaction(&self, tx: &TransactionAndMetadata, header: &LedgerHeader) {
        let tx = tx.clone();
        let header = header.clone();
        let transactions = self.transactions.clone();
        let proposed_transactions = self.proposed_transactions.clone();
        let accounts = self.accounts.clone();
        let proposed_accounts = self.proposed_accounts.clone();
        let books = self.books.clone();

        metrics::record_event_published("transactions");
        self.executor.enqueue(move || {
            let touched_books = books_touched(&tx.meta.json);

            // One envelope per API version, built lazily.
            let mut envelopes: HashMap<u32, Arc<String>> = HashMap::new();
            let mut deliver = |session: &Arc<dyn Session>| {
                let version = session.api_version();
                let message = envelopes
                    .entry(version)
                    .or_insert_with(|| Arc::new(build_envelope(&tx, &header, version)));
                if session.send(Arc::clone(message)).is_err() {
                    metrics::record_send_failure("transactions");
                }
            };

            for session in transactions.live() {
                deliver(&session);
            }

            for session in proposed_transactions.live() {
                deliver(&session);
            }

            // Account scope: validated-account subscriptions dominate
            // proposed-account for the same session, and a session
            // subscribed through several affected accounts is sent once.
            let mut notified: HashSet<SessionId> = HashSet::new();
            for account in &tx.meta.affected_accounts {
                for session in accounts.live(account).into_iter().chain(proposed_accounts.live(account))
                {
                    if notified.insert(session.id()) {
                        deliver(&session);
                    }
                }
            }

            notified.clear();
            for book in &touched_books {
                for session in books.live(book) {
                    if notified.insert(session.id()) {
                        deliver(&session);
                    }
                }
            }
        });
    }

    /// Forwards a pre-consensus transaction to the proposed streams.
    pub fn forward_proposed_transaction(&self, object: &Value) {
        let message = Arc::new(object.to_string());
        let accounts = proposed_accounts_of(object);
        let proposed_transactions = self.proposed_transactions.clone();
        let proposed_accounts = self.proposed_accounts.clone();

        metrics::record_event_published("transactions_proposed");
        self.executor.enqueue(move || {
            for session in proposed_transactions.live() {
                if session.send(Arc::clone(&message)).is_err() {
                    metrics::record_send_failure("transactions_proposed");
                }
            }

            let mut notified: HashSet<SessionId> = HashSet::new();
            for account in &accounts {
                for session in proposed_accounts.live(account) {
                    if notified.insert(session.id())
                        && session.send(Arc::clone(&message)).is_err()
                    {
                        metrics::record_send_failure("accounts_proposed");
                    }
                }
            }
        });
    }
}

/// Builds the validated-transaction push envelope for one API version.
fn build_envelope(tx: &TransactionAndMetadata, header: &LedgerHeader, api_version: u32) -> String {
    let mut tx_json = tx.tx.clone();

    // API v2 mirrors a payment's Amount as DeliverMax.
    if api_version >= 2
        && tx_json.get("TransactionType").and_then(Value::as_str) == Some("Payment")
    {
        if let (Some(amount), Some(obj)) = (tx_json.get("Amount").cloned(), tx_json.as_object_mut())
        {
            obj.insert("DeliverMax".to_owned(), amount);
        }
    }

    let token = tx.meta.result_token().to_owned();
    let result = EngineResult::from_token(&token);

    json!({
        "transaction": tx_json,
        "meta": tx.meta.json,
        "type": "transaction",
        "validated": true,
        "status": "closed",
        "ledger_index": header.sequence,
        "ledger_hash": header.hash.to_string(),
        "engine_result": token,
        "engine_result_code": result.code,
        "engine_result_message": result.message,
        "close_time_iso": header.close_time_iso(),
    })
    .to_string()
}

/// Order books touched by the offer nodes in transaction metadata.
fn books_touched(meta_json: &Value) -> Vec<Book> {
    let Some(nodes) = meta_json.get("AffectedNodes").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut books = Vec::new();
    for node in nodes {
        let Some(inner) = ["ModifiedNode", "DeletedNode", "CreatedNode"]
            .iter()
            .find_map(|kind| node.get(kind))
        else {
            continue;
        };
        if inner.get("LedgerEntryType").and_then(Value::as_str) != Some("Offer") {
            continue;
        }
        let Some(fields) = inner.get("FinalFields").or_else(|| inner.get("NewFields")) else {
            continue;
        };
        let gets = fields.get("TakerGets").and_then(Asset::from_amount_json);
        let pays = fields.get("TakerPays").and_then(Asset::from_amount_json);
        if let (Some(gets), Some(pays)) = (gets, pays) {
            let book = Book { pays, gets };
            if !books.contains(&book) {
                books.push(book);
            }
        }
    }
    books
}

/// Accounts named by a proposed transaction's JSON.
fn proposed_accounts_of(object: &Value) -> Vec<AccountId> {
    let Some(tx) = object.get("transaction") else {
        return Vec::new();
    };
    let mut accounts = Vec::new();
    for field in ["Account", "Destination"] {
        if let Some(address) = tx.get(field).and_then(Value::as_str) {
            let account = AccountId::from(address);
            if !accounts.contains(&account) {
                accounts.push(account);
            }
        }
    }
    accounts
}
