//! Address parsing and canonical formatting.
//!
//! Addresses enter the engine as text from pages, URLs and configuration.
//! Every ingestion boundary goes through [`parse_address`], which accepts
//! exactly 40 hex digits after an optional `0x`/`0X` marker and ignores case.
//! Once parsed, an [`Address`] is a 20-byte value, so equality and hashing are
//! case-insensitive by construction.

use alloy::primitives::{Address, hex};

/// Number of hex digits in a full address body.
pub const ADDRESS_HEX_LEN: usize = 40;

/// Parse a full address, rejecting anything that is not exactly 40 hex digits.
#[must_use]
pub fn parse_address(text: &str) -> Option<Address> {
    let body = strip_marker(text);
    if body.len() != ADDRESS_HEX_LEN || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    body.parse().ok()
}

/// Whether `text` is a syntactically valid full address.
#[must_use]
pub fn is_address(text: &str) -> bool {
    parse_address(text).is_some()
}

/// Canonical text form: `0x` followed by 40 lowercase hex digits.
#[must_use]
pub fn to_lower_hex(address: &Address) -> String {
    format!("0x{}", hex_body(address))
}

/// The 40 lowercase hex digits of an address, without the marker.
#[must_use]
pub fn hex_body(address: &Address) -> String {
    hex::encode(address.as_slice())
}

fn strip_marker(text: &str) -> &str {
    text.strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text)
}
