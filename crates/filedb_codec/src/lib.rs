//! # FileDB Codec
//!
//! Serialization formats for FileDB storage files.
//!
//! Every table and page file is a single serde value written in one
//! [`Format`]. The codec layer knows nothing about tables, metadata or
//! backups; it only turns values into bytes and back.
//!
//! ## Usage
//!
//! ```
//! use filedb_codec::Format;
//!
//! let bytes = Format::Cbor.encode(&vec!["a", "b"]).unwrap();
//! let decoded: Vec<String> = Format::Cbor.decode(&bytes).unwrap();
//! assert_eq!(decoded, vec!["a", "b"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod format;
mod json;

pub use cbor::{from_cbor, to_cbor};
pub use error::{CodecError, CodecResult};
pub use format::Format;
pub use json::{from_json, to_json};
