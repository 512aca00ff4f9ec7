//! Encoding helpers for Ethereum JSON-RPC values: hex quantities, addresses,
//! and the string results of ERC-20 metadata calls.

use crate::fetch::error::FetchError;
use anyhow::{Context, Result};

/// Parses a `0x`-prefixed hex quantity such as `"0x4d5b12"`.
pub fn parse_hex_quantity(value: &str) -> Result<u64> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| FetchError::malformed(format!("hex quantity without 0x prefix: {value}")))?;
    if digits.is_empty() {
        return Err(FetchError::malformed("empty hex quantity").into());
    }
    u64::from_str_radix(digits, 16)
        .map_err(|err| FetchError::malformed(format!("invalid hex quantity {value}: {err}")).into())
}

pub fn to_hex_quantity(value: u64) -> String {
    format!("{value:#x}")
}

/// `0x` followed by exactly 40 hex digits.
pub fn is_hex_address(value: &str) -> bool {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(digits) => digits.len() == 40 && digits.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

pub fn normalize_address(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

/// Decodes the return data of `name()` / `symbol()`.
///
/// Most tokens return an ABI-encoded `string`; some older ones return a
/// right-padded `bytes32`. The `string` layout is tried first.
pub fn decode_token_text(raw: &str) -> Result<String> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = hex::decode(digits).context("token call returned invalid hex")?;

    if let Some(text) = decode_abi_string(&bytes) {
        return Ok(text);
    }
    if bytes.len() >= 32 {
        if let Some(text) = decode_bytes32(&bytes[..32]) {
            return Ok(text);
        }
    }
    Err(FetchError::malformed(format!("undecodable token text: {raw}")).into())
}

fn decode_abi_string(bytes: &[u8]) -> Option<String> {
    let offset = read_word_as_usize(bytes, 0)?;
    let length = read_word_as_usize(bytes, offset)?;
    let start = offset.checked_add(32)?;
    let end = start.checked_add(length)?;
    let data = bytes.get(start..end)?;
    String::from_utf8(data.to_vec()).ok()
}

fn decode_bytes32(word: &[u8]) -> Option<String> {
    let end = word.iter().position(|byte| *byte == 0).unwrap_or(word.len());
    if end == 0 {
        return None;
    }
    String::from_utf8(word[..end].to_vec()).ok()
}

fn read_word_as_usize(bytes: &[u8], at: usize) -> Option<usize> {
    let word = bytes.get(at..at.checked_add(32)?)?;
    let (high, low) = word.split_at(24);
    if high.iter().any(|byte| *byte != 0) {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(low);
    usize::try_from(u64::from_be_bytes(buf)).ok()
}
