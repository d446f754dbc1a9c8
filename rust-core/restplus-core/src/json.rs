//! # JSON Serialization Module
//!
//! Request bodies are decoded with simd-json; responses are encoded with
//! serde_json.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Parse JSON bytes in place using simd-json
///
/// simd-json rewrites the buffer while parsing, hence the mutable slice.
///
/// # Errors
///
/// Returns `Error::BadRequest` if the bytes are not valid JSON for `T`.
pub fn parse_json_bytes<T: DeserializeOwned>(bytes: &mut [u8]) -> Result<T> {
    simd_json::from_slice(bytes).map_err(|e| Error::BadRequest {
        reason: format!("The browser (or proxy) sent a request that this server could not understand: {e}"),
    })
}

/// Serialize a value to JSON bytes, newline terminated
///
/// # Errors
///
/// Returns `Error::Json` if `value` cannot be represented as JSON.
pub fn to_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}
