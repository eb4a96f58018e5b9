//! Wire codecs for the fixed binary layouts Scribe understands itself.
//!
//! The full XRPL binary codec lives upstream; this module covers only the
//! two fixed layouts the indexer must read without it — the canonical ledger
//! header and the legacy fee-settings blob — plus the raw-object helpers for
//! offer detection and order-book keying.

use snafu::Snafu;

use crate::types::{Fees, Hash256, LedgerHeader};

/// Canonical ledger header encoding size in bytes.
pub const HEADER_SIZE: usize = 150;

/// Legacy fee-settings blob size in bytes.
pub const FEE_SETTINGS_SIZE: usize = 24;

/// Ledger entry type tag for offers, big-endian, at object bytes `[1..3]`.
const OFFER_TYPE_TAG: u16 = 0x006F;

/// Error type for codec operations.
#[derive(Debug, Snafu)]
pub enum CodecError {
    /// Input does not match the fixed layout size.
    #[snafu(display("Unexpected {what} length: expected {expected} bytes, got {actual}"))]
    UnexpectedLength {
        /// Which layout was being decoded.
        what: &'static str,
        /// Required size.
        expected: usize,
        /// Size of the provided input.
        actual: usize,
    },
}

/// Decodes a ledger header from its canonical wire layout.
///
/// Layout, all integers big-endian:
/// `seq (u32)`, `drops (u64)`, `parentHash (256)`, `txHash (256)`,
/// `accountHash (256)`, `parentCloseTime (u32)`, `closeTime (u32)`,
/// `closeTimeResolution (u8)`, `closeFlags (u8)`, `hash (256)`.
pub fn deserialize_header(data: &[u8]) -> Result<LedgerHeader, CodecError> {
    if data.len() != HEADER_SIZE {
        return UnexpectedLengthSnafu { what: "ledger header", expected: HEADER_SIZE, actual: data.len() }
            .fail();
    }

    let mut cursor = Cursor { data, offset: 0 };
    Ok(LedgerHeader {
        sequence: cursor.read_u32(),
        drops: cursor.read_u64(),
        parent_hash: cursor.read_hash(),
        tx_hash: cursor.read_hash(),
        account_hash: cursor.read_hash(),
        parent_close_time: cursor.read_u32(),
        close_time: cursor.read_u32(),
        close_time_resolution: cursor.read_u8(),
        close_flags: cursor.read_u8(),
        hash: cursor.read_hash(),
    })
}

/// Encodes a ledger header into its canonical wire layout.
pub fn serialize_header(header: &LedgerHeader) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    let mut offset = 0;

    let mut put = |bytes: &[u8]| {
        buf[offset..offset + bytes.len()].copy_from_slice(bytes);
        offset += bytes.len();
    };

    put(&header.sequence.to_be_bytes());
    put(&header.drops.to_be_bytes());
    put(header.parent_hash.as_bytes());
    put(header.tx_hash.as_bytes());
    put(header.account_hash.as_bytes());
    put(&header.parent_close_time.to_be_bytes());
    put(&header.close_time.to_be_bytes());
    put(&[header.close_time_resolution]);
    put(&[header.close_flags]);
    put(header.hash.as_bytes());

    buf
}

/// Decodes the legacy fee-settings ledger object.
///
/// Layout, all integers big-endian: `base_fee (u64)`,
/// `reference_fee_units (u32)`, `reserve_base (u32)`, `reserve_inc (u32)`,
/// `flags (u32)`.
pub fn deserialize_fee_settings(data: &[u8]) -> Result<Fees, CodecError> {
    if data.len() != FEE_SETTINGS_SIZE {
        return UnexpectedLengthSnafu {
            what: "fee settings",
            expected: FEE_SETTINGS_SIZE,
            actual: data.len(),
        }
        .fail();
    }

    let mut cursor = Cursor { data, offset: 0 };
    let base = cursor.read_u64();
    let _reference_fee_units = cursor.read_u32();
    let reserve_base = cursor.read_u32();
    let reserve_inc = cursor.read_u32();

    Ok(Fees { base, reserve_base, reserve_inc })
}

/// Encodes a legacy fee-settings blob.
pub fn serialize_fee_settings(fees: &Fees, reference_fee_units: u32, flags: u32) -> [u8; FEE_SETTINGS_SIZE] {
    let mut buf = [0u8; FEE_SETTINGS_SIZE];
    buf[0..8].copy_from_slice(&fees.base.to_be_bytes());
    buf[8..12].copy_from_slice(&reference_fee_units.to_be_bytes());
    buf[12..16].copy_from_slice(&fees.reserve_base.to_be_bytes());
    buf[16..20].copy_from_slice(&fees.reserve_inc.to_be_bytes());
    buf[20..24].copy_from_slice(&flags.to_be_bytes());
    buf
}

/// Returns true when a raw ledger object is an offer.
///
/// The second and third bytes, read big-endian, carry the entry type tag.
/// Inputs shorter than three bytes are never offers.
pub fn is_offer(object: &[u8]) -> bool {
    if object.len() < 3 {
        return false;
    }
    u16::from_be_bytes([object[1], object[2]]) == OFFER_TYPE_TAG
}

/// Derives the book key from an offer's `BookDirectory` field.
///
/// The low 8 bytes of a directory key index quality within the book; zeroing
/// them yields the key shared by every offer in the same book.
pub fn book_base(book_directory: Hash256) -> Hash256 {
    let mut bytes = *book_directory.as_bytes();
    for byte in bytes.iter_mut().rev().take(8) {
        *byte = 0;
    }
    Hash256::new(bytes)
}

/// Big-endian read cursor over a length-checked slice.
struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl Cursor<'_> {
    fn read_u8(&mut self) -> u8 {
        let value = self.data[self.offset];
        self.offset += 1;
        value
    }

    fn read_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.data[self.offset..self.offset + 4]);
        self.offset += 4;
        u32::from_be_bytes(bytes)
    }

    fn read_u64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.data[self.offset..self.offset + 8]);
        self.offset += 8;
        u64::from_be_bytes(bytes)
    }

    fn read_hash(&mut self) -> Hash256 {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&self.data[self.offset..self.offset + 32]);
        self.offset += 32;
        Hash256::new(bytes)
    }
}
