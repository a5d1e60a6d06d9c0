//! Hex and base64 conversions used on the MPC wire format

use crate::error::{SubmitterError, SubmitterResult};

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use ethers::types::{Bytes, U256};

/// Strip leading zero digits from a hex string.
///
/// A `0x` prefix is preserved when present. With `keep_one_zero` an all-zero
/// input collapses to a single `0` digit instead of nothing. Input is not
/// validated as hex.
pub fn remove_hex_leading_zero(hex: &str, keep_one_zero: bool) -> String {
    let (prefix, digits) = match hex.strip_prefix("0x") {
        Some(rest) => ("0x", rest),
        None => ("", hex),
    };

    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() && keep_one_zero {
        format!("{}0", prefix)
    } else {
        format!("{}{}", prefix, trimmed)
    }
}

/// Decode standard base64 and re-encode as `0x`-prefixed lowercase hex
pub fn base64_to_hex(encoded: &str) -> SubmitterResult<String> {
    let bytes = BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|e| SubmitterError::Codec(format!("invalid base64: {}", e)))?;
    Ok(format!("0x{}", hex::encode(bytes)))
}

/// Encode a value as a JSON-RPC quantity (`0x` hex, no leading zeros)
pub fn to_quantity(value: U256) -> String {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    remove_hex_leading_zero(&format!("0x{}", hex::encode(buf)), true)
}

/// Decode a hex payload with or without `0x` prefix
pub fn decode_hex_payload(payload: &str) -> SubmitterResult<Bytes> {
    let payload = payload.trim();
    let digits = payload.strip_prefix("0x").unwrap_or(payload);
    hex::decode(digits)
        .map(Bytes::from)
        .map_err(|e| SubmitterError::Codec(format!("invalid hex payload: {}", e)))
}
