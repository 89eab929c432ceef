//! ABI codec for batched reverse resolution.
//!
//! One batch is a single `aggregate3` call against the Multicall3 contract.
//! Each element is a `reverseResolve(address)` sub-call against the name
//! service with `allowFailure = true`, so one reverting lookup does not sink
//! the others.
//!
//! ```text
//! aggregate3((address target, bool allowFailure, bytes callData)[])
//!   └─ callData = reverseResolve(address)  →  returns (string)
//! ```
//!
//! Encoding uses the `sol!` call types and is therefore the canonical
//! Solidity layout byte for byte. Decoding is done by hand: the return
//! payload is walked word by word and every slot is decoded independently,
//! so a malformed slot becomes a [`SlotError`] for that slot alone.

use alloy::primitives::{Address, Bytes, address};
use alloy::sol_types::SolCall;

use crate::error::{Error, Result};
use crate::name::Name;

/// Multicall3 deployment (same address on every EVM chain).
pub const MULTICALL_ADDRESS: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

/// Name-service contract queried for reverse records.
pub const NAME_SERVICE_ADDRESS: Address = address!("0000000000696760e15f265e828db644a0c242eb");

/// Selector of `aggregate3((address,bool,bytes)[])`.
pub const AGGREGATE3_SELECTOR: [u8; 4] = calls::aggregate3Call::SELECTOR;

/// Selector of `reverseResolve(address)`.
pub const REVERSE_RESOLVE_SELECTOR: [u8; 4] = calls::reverseResolveCall::SELECTOR;

/// ABI word size in bytes.
pub const WORD: usize = 32;

/// Contract interfaces for the two call shapes the engine needs.
mod calls {
    alloy::sol! {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Call3Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls)
            external
            payable
            returns (Call3Result[] memory returnData);

        function reverseResolve(address addr) external view returns (string memory);
    }
}

/// Outcome of decoding one result slot.
///
/// `Ok(None)` covers every "no name" case the contract can legitimately
/// produce: a failed sub-call, empty return data, an empty string, or a string
/// that sanitizes to nothing.
pub type SlotResult = std::result::Result<Option<Name>, SlotError>;

/// Structural problem with a single result slot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SlotError {
    /// A read ran past the end of the payload.
    #[error("read of {len} bytes at {offset} runs past end of payload ({available} bytes)")]
    OutOfBounds {
        /// Start of the attempted read.
        offset: usize,
        /// Length of the attempted read.
        len: usize,
        /// Payload size.
        available: usize,
    },

    /// An offset or length word does not fit in `usize`.
    #[error("word at {offset} is too large for an offset or length")]
    Overflow {
        /// Position of the word.
        offset: usize,
    },

    /// The success flag was neither 0 nor 1.
    #[error("word at {offset} is not a valid bool")]
    InvalidBool {
        /// Position of the word.
        offset: usize,
    },

    /// The returned string is not valid UTF-8.
    #[error("returned name is not valid UTF-8")]
    InvalidUtf8,
}

/// Encode the inner `reverseResolve(address)` calldata (36 bytes).
#[must_use]
pub fn encode_reverse_call(address: Address) -> Bytes {
    Bytes::from(calls::reverseResolveCall { addr: address }.abi_encode())
}

/// Encode one batched `aggregate3` call resolving every address in order.
///
/// # Errors
///
/// Returns [`Error::Abi`] when `addresses` is empty.
pub fn encode_batch(addresses: &[Address]) -> Result<Bytes> {
    if addresses.is_empty() {
        return Err(Error::abi("cannot encode an empty batch"));
    }

    let batch = addresses
        .iter()
        .map(|addr| calls::Call3 {
            target: NAME_SERVICE_ADDRESS,
            allowFailure: true,
            callData: encode_reverse_call(*addr),
        })
        .collect();

    Ok(Bytes::from(calls::aggregate3Call { calls: batch }.abi_encode()))
}

/// Decode an `aggregate3` return payload into one result per slot.
///
/// A payload too short to carry the array head, or whose declared length
/// cannot fit its offset table, decodes to an empty list.
#[must_use]
pub fn decode_batch(payload: &[u8]) -> Vec<SlotResult> {
    let reader = Reader::new(payload);

    // Word 0 is the offset to the array; the array always starts right after it.
    let Ok(count) = reader.read_usize(WORD) else {
        return Vec::new();
    };
    if count == 0 {
        return Vec::new();
    }

    let table = 2 * WORD;
    let fits = count
        .checked_mul(WORD)
        .and_then(|n| n.checked_add(table))
        .is_some_and(|end| end <= payload.len());
    if !fits {
        return Vec::new();
    }

    (0..count)
        .map(|index| decode_slot(&reader, table, index))
        .collect()
}

/// Like [`decode_batch`] but folds slot errors into "no name".
#[must_use]
pub fn decode_names(payload: &[u8]) -> Vec<Option<Name>> {
    decode_batch(payload)
        .into_iter()
        .map(|slot| slot.ok().flatten())
        .collect()
}

/// Recover the queried addresses from a batch built by [`encode_batch`].
///
/// Useful for stand-in transports that answer without a node.
///
/// # Errors
///
/// Returns [`Error::Abi`] if `calldata` is not an `aggregate3` call of
/// `reverseResolve` sub-calls.
pub fn decode_batch_request(calldata: &[u8]) -> Result<Vec<Address>> {
    let call = calls::aggregate3Call::abi_decode(calldata)
        .map_err(|e| Error::abi(format!("not an aggregate3 call: {e}")))?;
    call.calls
        .iter()
        .map(|sub| {
            calls::reverseResolveCall::abi_decode(&sub.callData)
                .map(|inner| inner.addr)
                .map_err(|e| Error::abi(format!("not a reverseResolve call: {e}")))
        })
        .collect()
}

/// Encode an `aggregate3` return payload with one slot per entry: `Some`
/// is a successful lookup returning that string, `None` a failed sub-call.
#[must_use]
pub fn encode_batch_return<S: AsRef<str>>(names: &[Option<S>]) -> Bytes {
    let results: Vec<calls::Call3Result> = names
        .iter()
        .map(|name| match name {
            Some(text) => calls::Call3Result {
                success: true,
                returnData: Bytes::from(calls::reverseResolveCall::abi_encode_returns(
                    &text.as_ref().to_owned(),
                )),
            },
            None => calls::Call3Result {
                success: false,
                returnData: Bytes::new(),
            },
        })
        .collect();
    Bytes::from(calls::aggregate3Call::abi_encode_returns(&results))
}

fn decode_slot(reader: &Reader<'_>, table: usize, index: usize) -> SlotResult {
    let tuple = table.checked_add(reader.read_usize(table + index * WORD)?);
    let tuple = tuple.ok_or(SlotError::Overflow { offset: table })?;

    if !reader.read_bool(tuple)? {
        return Ok(None);
    }

    let data_at = reader.offset_from(tuple, tuple.saturating_add(WORD))?;
    let len = reader.read_usize(data_at)?;
    if len == 0 {
        return Ok(None);
    }

    let inner = reader.slice(data_at.saturating_add(WORD), len)?;
    let text = decode_string(inner)?;
    Ok(Name::sanitize(text))
}

/// Decode a standalone ABI-encoded `string` (offset, length, bytes).
fn decode_string(data: &[u8]) -> std::result::Result<&str, SlotError> {
    let reader = Reader::new(data);
    let at = reader.offset_from(0, 0)?;
    let len = reader.read_usize(at)?;
    let bytes = reader.slice(at.saturating_add(WORD), len)?;
    std::str::from_utf8(bytes).map_err(|_| SlotError::InvalidUtf8)
}

/// Bounds-checked word reader over an ABI payload.
#[derive(Debug, Clone, Copy)]
struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    const fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn slice(&self, offset: usize, len: usize) -> std::result::Result<&'a [u8], SlotError> {
        let out_of_bounds = SlotError::OutOfBounds {
            offset,
            len,
            available: self.data.len(),
        };
        let end = offset.checked_add(len).ok_or_else(|| out_of_bounds.clone())?;
        self.data.get(offset..end).ok_or(out_of_bounds)
    }

    fn word(&self, offset: usize) -> std::result::Result<&'a [u8], SlotError> {
        self.slice(offset, WORD)
    }

    /// Read a word as `usize`; the high 24 bytes must be zero.
    fn read_usize(&self, offset: usize) -> std::result::Result<usize, SlotError> {
        let word = self.word(offset)?;
        let (high, low) = word.split_at(WORD - 8);
        if high.iter().any(|b| *b != 0) {
            return Err(SlotError::Overflow { offset });
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(low);
        usize::try_from(u64::from_be_bytes(buf)).map_err(|_| SlotError::Overflow { offset })
    }

    fn read_bool(&self, offset: usize) -> std::result::Result<bool, SlotError> {
        match self.read_usize(offset) {
            Ok(0) => Ok(false),
            Ok(1) => Ok(true),
            Ok(_) | Err(SlotError::Overflow { .. }) => Err(SlotError::InvalidBool { offset }),
            Err(e) => Err(e),
        }
    }

    /// Read the relative offset stored at `at` and resolve it against `base`.
    fn offset_from(&self, base: usize, at: usize) -> std::result::Result<usize, SlotError> {
        base.checked_add(self.read_usize(at)?)
            .ok_or(SlotError::Overflow { offset: at })
    }
}
