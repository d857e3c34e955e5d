//! CBOR encoding backed by `ciborium`.

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

const NAME: &str = "cbor";

/// Encodes a value as CBOR.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::into_writer(value, &mut buffer)
        .map_err(|e| CodecError::encoding_failed(NAME, e.to_string()))?;
    Ok(buffer)
}

/// Decodes a value from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::decoding_failed(NAME, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_rejected() {
        let result: CodecResult<Vec<u32>> = from_cbor(&[]);
        assert!(matches!(
            result,
            Err(CodecError::DecodingFailed { format: "cbor", .. })
        ));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let bytes = to_cbor("not a number").unwrap();
        let result: CodecResult<u64> = from_cbor(&bytes);
        assert!(result.is_err());
    }
}
