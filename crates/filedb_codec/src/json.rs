//! JSON encoding backed by `serde_json`.

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

const NAME: &str = "json";

/// Encodes a value as pretty-printed JSON.
///
/// Storage files are meant to be readable by operators, so the output is
/// indented rather than compact.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| CodecError::encoding_failed(NAME, e.to_string()))
}

/// Decodes a value from JSON bytes.
pub fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::decoding_failed(NAME, e.to_string()))
}
