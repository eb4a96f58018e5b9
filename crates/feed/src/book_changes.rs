//! The `book_changes` stream: per-ledger OHLC/volume aggregation of
//! offer-crossing effects.

use std::collections::BTreeMap;
use std::sync::Arc;

use scribe_types::{Asset, LedgerHeader, TransactionAndMetadata};
use serde_json::{Value, json};

use crate::executor::FeedExecutor;
use crate::metrics;
use crate::session::{Session, SessionId};
use crate::subscription::Subscribers;

/// Sentinel rate used when a price is not determinable (an offer shrank on
/// one side while growing on the other, e.g. a cancellation).
const UNKNOWN_RATE: f64 = -1.0;

pub(crate) struct BookChangesFeed {
    subscribers: Subscribers,
    executor: FeedExecutor,
}

impl BookChangesFeed {
    pub fn new() -> Self {
        Self { subscribers: Subscribers::new(), executor: FeedExecutor::new("book_changes") }
    }

    pub fn sub(&self, session: &Arc<dyn Session>) {
        self.subscribers.subscribe(session);
    }

    pub fn unsub(&self, session_id: SessionId) {
        self.subscribers.unsubscribe(session_id);
    }

    pub fn count(&self) -> usize {
        self.subscribers.count()
    }

    /// Aggregates one ledger's offer effects and broadcasts a single event.
    pub fn pub_book_changes(&self, header: &LedgerHeader, transactions: &[TransactionAndMetadata]) {
        let header = header.clone();
        let transactions = transactions.to_vec();
        let subscribers = self.subscribers.clone();

        metrics::record_event_published("book_changes");
        self.executor.enqueue(move || {
            let message = Arc::new(
                json!({
                    "type": "bookChanges",
                    "ledger_index": header.sequence,
                    "ledger_hash": header.hash.to_string(),
                    "ledger_time": header.close_time,
                    "changes": compute_book_changes(&transactions),
                })
                .to_string(),
            );
            for session in subscribers.live() {
                if session.send(Arc::clone(&message)).is_err() {
                    metrics::record_send_failure("book_changes");
                }
            }
        });
    }
}

/// Running aggregate for one currency pair.
struct PairAggregate {
    volume_a: f64,
    volume_b: f64,
    high: f64,
    low: f64,
    open: f64,
    close: f64,
}

/// Computes the per-pair change summaries for one ledger's transactions.
///
/// Only modified and deleted offer nodes with both previous and final
/// taker amounts contribute; created offers move no funds.
pub(crate) fn compute_book_changes(transactions: &[TransactionAndMetadata]) -> Vec<Value> {
    let mut pairs: BTreeMap<(String, String), PairAggregate> = BTreeMap::new();

    for tx in transactions {
        let Some(nodes) = tx.meta.json.get("AffectedNodes").and_then(Value::as_array) else {
            continue;
        };
        for node in nodes {
            let Some(inner) =
                ["ModifiedNode", "DeletedNode"].iter().find_map(|kind| node.get(kind))
            else {
                continue;
            };
            if inner.get("LedgerEntryType").and_then(Value::as_str) != Some("Offer") {
                continue;
            }
            let (Some(final_fields), Some(previous_fields)) =
                (inner.get("FinalFields"), inner.get("PreviousFields"))
            else {
                continue;
            };

            let amounts = (
                amount_value(previous_fields.get("TakerGets")),
                amount_value(final_fields.get("TakerGets")),
                amount_value(previous_fields.get("TakerPays")),
                amount_value(final_fields.get("TakerPays")),
            );
            let (Some(prev_gets), Some(final_gets), Some(prev_pays), Some(final_pays)) = amounts
            else {
                continue;
            };

            let delta_gets = prev_gets - final_gets;
            let delta_pays = prev_pays - final_pays;
            if delta_gets == 0.0 && delta_pays == 0.0 {
                continue;
            }

            let gets_key = final_fields.get("TakerGets").and_then(Asset::from_amount_json);
            let pays_key = final_fields.get("TakerPays").and_then(Asset::from_amount_json);
            let (Some(gets), Some(pays)) = (gets_key, pays_key) else {
                continue;
            };

            // Canonical side ordering: XRP first, else lexicographic.
            let gets_name = currency_key(&gets);
            let pays_name = currency_key(&pays);
            let gets_first = if gets.is_xrp() {
                true
            } else if pays.is_xrp() {
                false
            } else {
                gets_name < pays_name
            };

            let (name_a, delta_a, name_b, delta_b) = if gets_first {
                (gets_name, delta_gets, pays_name, delta_pays)
            } else {
                (pays_name, delta_pays, gets_name, delta_gets)
            };

            // A genuine crossing shrinks both sides of the offer; anything
            // else has no determinable price.
            let rate =
                if delta_a > 0.0 && delta_b > 0.0 { delta_b / delta_a } else { UNKNOWN_RATE };

            let volume_a = delta_a.abs();
            let volume_b = delta_b.abs();

            pairs
                .entry((name_a, name_b))
                .and_modify(|aggregate| {
                    aggregate.volume_a += volume_a;
                    aggregate.volume_b += volume_b;
                    aggregate.high = aggregate.high.max(rate);
                    aggregate.low = aggregate.low.min(rate);
                    aggregate.close = rate;
                })
                .or_insert(PairAggregate {
                    volume_a,
                    volume_b,
                    high: rate,
                    low: rate,
                    open: rate,
                    close: rate,
                });
        }
    }

    pairs
        .into_iter()
        .map(|((currency_a, currency_b), aggregate)| {
            json!({
                "currency_a": currency_a,
                "currency_b": currency_b,
                "volume_a": format_amount(aggregate.volume_a),
                "volume_b": format_amount(aggregate.volume_b),
                "high": format_amount(aggregate.high),
                "low": format_amount(aggregate.low),
                "open": format_amount(aggregate.open),
                "close": format_amount(aggregate.close),
            })
        })
        .collect()
}

/// Numeric value of an amount field: XRP drops for strings, the `value`
/// field for issued-currency objects.
fn amount_value(amount: Option<&Value>) -> Option<f64> {
    match amount? {
        Value::String(drops) => drops.parse().ok(),
        Value::Object(obj) => obj.get("value")?.as_str()?.parse().ok(),
        _ => None,
    }
}

/// Client-facing currency key: `XRP_drops` or `issuer/currencyHex`.
fn currency_key(asset: &Asset) -> String {
    match &asset.issuer {
        None => "XRP_drops".to_owned(),
        Some(issuer) => format!("{}/{}", issuer, asset.currency),
    }
}

/// Renders an amount as a decimal string, integers without a fraction.
fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 9e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
