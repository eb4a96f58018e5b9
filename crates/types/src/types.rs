//! Core type definitions for Scribe.
//!
//! These types model the validated-ledger data the indexer ingests and
//! serves: headers, decoded transactions with metadata, and the row set
//! the ingestion writer persists.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Seconds between the Unix epoch and the ripple epoch (2000-01-01T00:00:00Z).
pub const RIPPLE_EPOCH_OFFSET: i64 = 946_684_800;

/// A 256-bit value (ledger hash, transaction hash, nodestore hash, book key).
///
/// Renders as uppercase hex, the way every XRPL-facing API expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// Creates a hash from raw bytes.
    #[inline]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl FromStr for Hash256 {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An XRPL account identifier in its classic address form (`r...`).
///
/// The wire codec owns the base58 derivation; inside the indexer the address
/// is an opaque key used for subscription registries and index rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Creates an account id from a classic address.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Returns the classic address.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(address: &str) -> Self {
        Self(address.to_owned())
    }
}

/// A validated ledger header.
///
/// Field layout matches the canonical wire encoding (see [`crate::codec`]):
/// all integers big-endian, close times in seconds since the ripple epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
pub struct LedgerHeader {
    /// Ledger sequence number, strictly increasing across commits.
    pub sequence: u32,
    /// Total XRP drops in existence as of this ledger.
    pub drops: u64,
    /// Hash of the parent ledger.
    pub parent_hash: Hash256,
    /// Root hash of the transaction tree.
    pub tx_hash: Hash256,
    /// Root hash of the account state tree.
    pub account_hash: Hash256,
    /// Parent ledger close time (ripple epoch seconds).
    pub parent_close_time: u32,
    /// Close time of this ledger (ripple epoch seconds).
    pub close_time: u32,
    /// Close time resolution in seconds.
    pub close_time_resolution: u8,
    /// Close flags.
    pub close_flags: u8,
    /// Hash of this ledger.
    pub hash: Hash256,
}

impl LedgerHeader {
    /// Renders the close time as an ISO-8601 UTC timestamp.
    ///
    /// A close time of 0 renders as `2000-01-01T00:00:00Z` (the ripple epoch).
    pub fn close_time_iso(&self) -> String {
        let secs = RIPPLE_EPOCH_OFFSET + i64::from(self.close_time);
        match chrono::DateTime::from_timestamp(secs, 0) {
            Some(dt) => dt.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            None => String::new(),
        }
    }
}

/// The current fee schedule, decoded from the fee-settings ledger object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fees {
    /// Base transaction cost in drops.
    pub base: u64,
    /// Account reserve in drops.
    pub reserve_base: u32,
    /// Owner reserve increment in drops.
    pub reserve_inc: u32,
}

/// The contiguous range of validated ledgers held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRange {
    /// Lowest validated sequence on hand.
    pub min: u32,
    /// Highest validated sequence on hand.
    pub max: u32,
}

impl fmt::Display for LedgerRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// One side of an order book: a currency and, for issued currencies, its issuer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Asset {
    /// Currency code: `"XRP"` or a 40-char hex currency.
    pub currency: String,
    /// Issuing account; `None` for XRP.
    pub issuer: Option<AccountId>,
}

impl Asset {
    /// The native XRP asset.
    pub fn xrp() -> Self {
        Self { currency: "XRP".to_owned(), issuer: None }
    }

    /// Creates an issued-currency asset.
    pub fn issued(currency: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self { currency: currency.into(), issuer: Some(AccountId::new(issuer)) }
    }

    /// Returns true for the native asset.
    pub fn is_xrp(&self) -> bool {
        self.issuer.is_none()
    }

    /// Extracts the asset from an amount field in decoded transaction JSON.
    ///
    /// XRP amounts are JSON strings of drops; issued amounts are objects with
    /// `currency`, `issuer`, and `value` fields.
    pub fn from_amount_json(amount: &Value) -> Option<Self> {
        match amount {
            Value::String(_) => Some(Self::xrp()),
            Value::Object(obj) => {
                let currency = obj.get("currency")?.as_str()?.to_owned();
                let issuer = obj.get("issuer")?.as_str()?;
                Some(Self { currency, issuer: Some(AccountId::new(issuer)) })
            },
            _ => None,
        }
    }
}

/// An order book, identified by what the taker pays and what the taker gets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Book {
    /// Asset the taker pays.
    pub pays: Asset,
    /// Asset the taker gets.
    pub gets: Asset,
}

/// Decoded transaction metadata, as produced by the wire codec.
#[derive(Debug, Clone)]
pub struct TransactionMeta {
    /// Accounts whose ledger entries the transaction modified.
    pub affected_accounts: BTreeSet<AccountId>,
    /// Sequence of the ledger that includes the transaction.
    pub ledger_sequence: u32,
    /// Position of the transaction within its ledger.
    pub transaction_index: u32,
    /// Transaction hash.
    pub tx_hash: Hash256,
    /// Metadata JSON (`AffectedNodes`, `TransactionResult`, ...).
    pub json: Value,
}

impl TransactionMeta {
    /// Returns the engine result token from the metadata, e.g. `tesSUCCESS`.
    pub fn result_token(&self) -> &str {
        self.json.get("TransactionResult").and_then(Value::as_str).unwrap_or("tesSUCCESS")
    }
}

/// A validated transaction paired with its metadata, both decoded.
#[derive(Debug, Clone)]
pub struct TransactionAndMetadata {
    /// Transaction JSON as decoded by the codec.
    pub tx: Value,
    /// Decoded metadata.
    pub meta: TransactionMeta,
}

/// Row set the ingestion writer persists for one transaction: the
/// transaction row plus one account-transaction row per affected account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountTransactionsData {
    /// Affected accounts derived from the metadata.
    pub accounts: BTreeSet<AccountId>,
    /// Sequence of the containing ledger.
    pub ledger_sequence: u32,
    /// Position within the ledger.
    pub transaction_index: u32,
    /// Transaction hash.
    pub tx_hash: Hash256,
    /// Content address of the serialized transaction in the nodestore.
    pub nodestore_hash: Hash256,
}

impl AccountTransactionsData {
    /// Builds the row set from decoded metadata and the nodestore address.
    pub fn new(meta: &TransactionMeta, nodestore_hash: Hash256) -> Self {
        Self {
            accounts: meta.affected_accounts.clone(),
            ledger_sequence: meta.ledger_sequence,
            transaction_index: meta.transaction_index,
            tx_hash: meta.tx_hash,
            nodestore_hash,
        }
    }
}

/// A transaction engine result: numeric code plus human-readable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineResult {
    /// Numeric result code.
    pub code: i32,
    /// Fixed explanatory message.
    pub message: &'static str,
}

impl EngineResult {
    /// Looks up the result for an engine result token.
    pub fn from_token(token: &str) -> Self {
        let (code, message) = match token {
            "tesSUCCESS" => (0, "The transaction was applied. Only final in a validated ledger."),
            "tecCLAIM" => (100, "Fee claimed. Sequence used. No action."),
            "tecPATH_PARTIAL" => (101, "Path could not send full amount."),
            "tecUNFUNDED_OFFER" => (103, "Insufficient balance to fund created offer."),
            "tecUNFUNDED_PAYMENT" => (104, "Insufficient XRP balance to send."),
            "tecNO_DST" => (124, "Destination does not exist. Send XRP to create it."),
            "tecPATH_DRY" => (128, "Path could not send partial amount."),
            "tecDST_TAG_NEEDED" => (143, "A destination tag is required."),
            _ => (-1, "Unknown transaction result."),
        };
        Self { code, message }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const LEDGERHASH: &str = "4BC50C9B0D8515D3EAAE1E74B29A95804346C491EE1A95BF25E4AAB854A6A652";

    #[test]
    fn test_hash256_display_roundtrip() {
        let hash: Hash256 = LEDGERHASH.parse().unwrap();
        assert_eq!(hash.to_string(), LEDGERHASH);
    }

    #[test]
    fn test_hash256_rejects_short_input() {
        assert!("4BC5".parse::<Hash256>().is_err());
    }

    #[test]
    fn test_hash256_serde_as_hex_string() {
        let hash: Hash256 = LEDGERHASH.parse().unwrap();
        let json = serde_json::to_value(hash).unwrap();
        assert_eq!(json, Value::String(LEDGERHASH.to_owned()));
        let back: Hash256 = serde_json::from_value(json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_ledger_range_display() {
        let range = LedgerRange { min: 10, max: 30 };
        assert_eq!(range.to_string(), "10-30");
    }

    #[test]
    fn test_close_time_iso_epoch() {
        let header = LedgerHeader::builder()
            .sequence(30)
            .drops(0)
            .parent_hash(Hash256::default())
            .tx_hash(Hash256::default())
            .account_hash(Hash256::default())
            .parent_close_time(0)
            .close_time(0)
            .close_time_resolution(0)
            .close_flags(0)
            .hash(LEDGERHASH.parse().unwrap())
            .build();
        assert_eq!(header.close_time_iso(), "2000-01-01T00:00:00Z");
    }

    #[test]
    fn test_asset_from_amount_json() {
        let drops = Asset::from_amount_json(&serde_json::json!("100")).unwrap();
        assert!(drops.is_xrp());

        let iou = Asset::from_amount_json(&serde_json::json!({
            "currency": "0158415500000000C1F76FF6ECB0BAC600000000",
            "issuer": "rK9DrarGKnVEo2nYp5MfVRXRYf5yRX3mwD",
            "value": "3"
        }))
        .unwrap();
        assert!(!iou.is_xrp());
        assert_eq!(iou.issuer.unwrap().as_str(), "rK9DrarGKnVEo2nYp5MfVRXRYf5yRX3mwD");

        assert!(Asset::from_amount_json(&serde_json::json!(42)).is_none());
    }

    #[test]
    fn test_engine_result_lookup() {
        let ok = EngineResult::from_token("tesSUCCESS");
        assert_eq!(ok.code, 0);
        assert!(ok.message.contains("applied"));

        let unknown = EngineResult::from_token("tefMAX_LEDGER");
        assert_eq!(unknown.code, -1);
    }

    #[test]
    fn test_account_transactions_data_from_meta() {
        let meta = TransactionMeta {
            affected_accounts: [AccountId::from("rf1BiGeXwwQoi8Z2ueFYTEXSwuJYfV2Jpn")]
                .into_iter()
                .collect(),
            ledger_sequence: 32,
            transaction_index: 4,
            tx_hash: LEDGERHASH.parse().unwrap(),
            json: Value::Null,
        };
        let data = AccountTransactionsData::new(&meta, Hash256::new([7u8; 32]));
        assert_eq!(data.ledger_sequence, 32);
        assert_eq!(data.transaction_index, 4);
        assert_eq!(data.accounts.len(), 1);
        assert_eq!(data.nodestore_hash, Hash256::new([7u8; 32]));
    }
}
