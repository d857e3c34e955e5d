//! The storage format selector.

use crate::cbor::{from_cbor, to_cbor};
use crate::error::{CodecError, CodecResult};
use crate::json::{from_json, to_json};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Serialization format of a table or page file.
///
/// The format decides both the file extension (`Data.json`, `Data.cbor`)
/// and the bytes inside. It is recorded in each table's info file so a
/// change of format can be detected and migrated at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Human-readable JSON.
    #[default]
    Json,
    /// Compact binary CBOR.
    Cbor,
}

impl Format {
    /// Every supported format.
    pub const ALL: [Format; 2] = [Format::Json, Format::Cbor];

    /// Returns the stable name recorded in info files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Cbor => "cbor",
        }
    }

    /// Returns the file extension used for files in this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        self.name()
    }

    /// Looks a format up by its recorded name (case-insensitive).
    pub fn from_name(name: &str) -> CodecResult<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| CodecError::unknown_format(name))
    }

    /// Encodes a value in this format.
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> CodecResult<Vec<u8>> {
        match self {
            Format::Json => to_json(value),
            Format::Cbor => to_cbor(value),
        }
    }

    /// Decodes a value from bytes in this format.
    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> CodecResult<T> {
        match self {
            Format::Json => from_json(bytes),
            Format::Cbor => from_cbor(bytes),
        }
    }

    /// Produces an independent copy of `value` by encoding and decoding it.
    ///
    /// The copy shares no memory with the original, which is what the table
    /// cache relies on to keep callers from mutating cached records.
    pub fn round_trip<T: Serialize + DeserializeOwned>(self, value: &T) -> CodecResult<T> {
        let bytes = self.encode(value)?;
        self.decode(&bytes)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}
