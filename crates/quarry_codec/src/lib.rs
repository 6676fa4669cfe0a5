//! # Quarry Codec
//!
//! Scalar values, rows, and the encodings used at quarry's boundaries.
//!
//! This crate provides:
//! - [`Value`]: a scalar-or-null cell (no arrays or maps)
//! - [`Row`]: an ordered column-to-value mapping
//! - JSON helpers for the criteria/diff wire shape
//! - CBOR helpers for a compact encoding of the same envelopes
//!
//! ## Usage
//!
//! ```
//! use quarry_codec::{from_cbor, row, to_cbor, Row};
//!
//! let r = row! { "id" => 1, "name" => "Ada" };
//! let bytes = to_cbor(&r).unwrap();
//! let back: Row = from_cbor(&bytes).unwrap();
//! assert_eq!(back, r);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod error;
mod row;
mod value;

pub use codec::{from_cbor, from_json, to_cbor, to_json, to_json_pretty};
pub use error::{CodecError, CodecResult};
pub use row::{row_from_json, row_key, row_to_json, rows_from_json, Row};
pub use value::Value;

/// Trait for types with a JSON and CBOR wire encoding.
pub trait Encode: serde::Serialize {
    /// Encode to JSON text.
    fn encode_json(&self) -> CodecResult<String> {
        to_json(self)
    }

    /// Encode to CBOR bytes.
    fn encode_cbor(&self) -> CodecResult<Vec<u8>> {
        to_cbor(self)
    }
}

/// Trait for types decodable from their JSON and CBOR wire encoding.
pub trait Decode: serde::de::DeserializeOwned {
    /// Decode from JSON text.
    fn decode_json(text: &str) -> CodecResult<Self> {
        from_json(text)
    }

    /// Decode from CBOR bytes.
    fn decode_cbor(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}

impl Encode for Value {}
impl Decode for Value {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_text_value() {
        let value = Value::Text("hello".into());
        let bytes = value.encode_cbor().unwrap();
        assert_eq!(Value::decode_cbor(&bytes).unwrap(), value);
    }

    #[test]
    fn roundtrip_json_value() {
        let value = Value::Integer(-12);
        let text = value.encode_json().unwrap();
        assert_eq!(text, "-12");
        assert_eq!(Value::decode_json(&text).unwrap(), value);
    }
}
