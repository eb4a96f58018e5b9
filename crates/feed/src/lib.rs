//! Subscription manager and push feeds for Scribe.
//!
//! [`SubscriptionManager`] maintains topic membership and fans structured
//! JSON events out to subscribed sessions. Publishing is non-blocking: each
//! feed owns a worker task that delivers in publish order, so ordering holds
//! per topic while independent topics proceed in parallel. Sessions are held
//! weakly — releasing a connection implicitly unsubscribes it everywhere.

mod book_changes;
mod executor;
mod forward;
mod ledger_feed;
mod metrics;
pub mod mock;
pub mod session;
mod subscription;
mod transaction_feed;

use std::sync::Arc;

use scribe_backend::Backend;
use scribe_types::{AccountId, Book, Fees, LedgerHeader, Result, TransactionAndMetadata};
use serde_json::{Value, json};

use crate::book_changes::BookChangesFeed;
use crate::forward::ForwardFeed;
use crate::ledger_feed::LedgerFeed;
use crate::transaction_feed::TransactionFeed;

pub use crate::ledger_feed::FEE_SETTINGS_KEY;
pub use crate::session::{SendError, Session, SessionId};

/// Many-topic fan-out broker for server-pushed ledger events.
///
/// Owned by the server bootstrap as a process-wide collaborator; dropped at
/// shutdown, which stops every feed worker after it drains.
pub struct SubscriptionManager {
    backend: Arc<dyn Backend>,
    ledger: LedgerFeed,
    manifests: ForwardFeed,
    validations: ForwardFeed,
    book_changes: BookChangesFeed,
    transactions: TransactionFeed,
}

impl SubscriptionManager {
    /// Creates the manager and spawns its feed workers on the current
    /// runtime.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            ledger: LedgerFeed::new(),
            manifests: ForwardFeed::new("manifests"),
            validations: ForwardFeed::new("validations"),
            book_changes: BookChangesFeed::new(),
            transactions: TransactionFeed::new(),
        }
    }

    // --- ledger stream ---

    /// Subscribes to closed-ledger notifications and returns the bootstrap
    /// snapshot (validated range, latest header, fee schedule).
    pub async fn sub_ledger(&self, session: &Arc<dyn Session>) -> Result<Value> {
        self.ledger.sub(session, self.backend.as_ref()).await
    }

    pub fn unsub_ledger(&self, session_id: SessionId) {
        self.ledger.unsub(session_id);
    }

    /// Broadcasts `ledgerClosed` for a freshly committed ledger.
    pub fn pub_ledger(
        &self,
        header: &LedgerHeader,
        fees: &Fees,
        validated_range: &str,
        txn_count: usize,
    ) {
        self.ledger.pub_ledger(header, fees, validated_range, txn_count);
    }

    // --- pass-through streams ---

    pub fn sub_manifests(&self, session: &Arc<dyn Session>) {
        self.manifests.sub(session);
    }

    pub fn unsub_manifests(&self, session_id: SessionId) {
        self.manifests.unsub(session_id);
    }

    /// Forwards a validator manifest verbatim.
    pub fn forward_manifest(&self, object: &Value) {
        self.manifests.forward(object);
    }

    pub fn sub_validations(&self, session: &Arc<dyn Session>) {
        self.validations.sub(session);
    }

    pub fn unsub_validations(&self, session_id: SessionId) {
        self.validations.unsub(session_id);
    }

    /// Forwards a validation vote verbatim.
    pub fn forward_validation(&self, object: &Value) {
        self.validations.forward(object);
    }

    // --- transaction streams ---

    pub fn sub_transactions(&self, session: &Arc<dyn Session>) {
        self.transactions.sub_transactions(session);
    }

    pub fn unsub_transactions(&self, session_id: SessionId) {
        self.transactions.unsub_transactions(session_id);
    }

    pub fn sub_proposed_transactions(&self, session: &Arc<dyn Session>) {
        self.transactions.sub_proposed_transactions(session);
    }

    pub fn unsub_proposed_transactions(&self, session_id: SessionId) {
        self.transactions.unsub_proposed_transactions(session_id);
    }

    pub fn sub_account(&self, account: AccountId, session: &Arc<dyn Session>) {
        self.transactions.sub_account(account, session);
    }

    pub fn unsub_account(&self, account: &AccountId, session_id: SessionId) {
        self.transactions.unsub_account(account, session_id);
    }

    pub fn sub_proposed_account(&self, account: AccountId, session: &Arc<dyn Session>) {
        self.transactions.sub_proposed_account(account, session);
    }

    pub fn unsub_proposed_account(&self, account: &AccountId, session_id: SessionId) {
        self.transactions.unsub_proposed_account(account, session_id);
    }

    pub fn sub_book(&self, book: Book, session: &Arc<dyn Session>) {
        self.transactions.sub_book(book, session);
    }

    pub fn unsub_book(&self, book: &Book, session_id: SessionId) {
        self.transactions.unsub_book(book, session_id);
    }

    /// Publishes a validated transaction to every matching topic, applying
    /// the per-scope deduplication contract.
    pub fn pub_transaction(&self, tx: &TransactionAndMetadata, header: &LedgerHeader) {
        self.transactions.pub_transaction(tx, header);
    }

    /// Forwards a pre-consensus transaction to the proposed streams.
    pub fn forward_proposed_transaction(&self, object: &Value) {
        self.transactions.forward_proposed_transaction(object);
    }

    // --- book changes stream ---

    pub fn sub_book_changes(&self, session: &Arc<dyn Session>) {
        self.book_changes.sub(session);
    }

    pub fn unsub_book_changes(&self, session_id: SessionId) {
        self.book_changes.unsub(session_id);
    }

    /// Aggregates one ledger's offer effects into a single `bookChanges`
    /// event.
    pub fn pub_book_changes(
        &self,
        header: &LedgerHeader,
        transactions: &[TransactionAndMetadata],
    ) {
        self.book_changes.pub_book_changes(header, transactions);
    }

    // --- introspection ---

    /// Current subscriber counts per stream. Released sessions are pruned
    /// as a side effect, so the report reflects drops on its next call.
    pub fn report(&self) -> Value {
        json!({
            "ledger": self.ledger.count(),
            "transactions": self.transactions.transactions_count(),
            "transactions_proposed": self.transactions.proposed_transactions_count(),
            "manifests": self.manifests.count(),
            "validations": self.validations.count(),
            "account": self.transactions.accounts_count(),
            "accounts_proposed": self.transactions.proposed_accounts_count(),
            "books": self.transactions.books_count(),
            "book_changes": self.book_changes.count(),
        })
    }
}
