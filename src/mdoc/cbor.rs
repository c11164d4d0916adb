//! CBOR helpers and the tag-24 wrapper used throughout the mdoc pipeline.

use std::io::Cursor;
use std::ops::Deref;

use anyhow::anyhow;
use ciborium::Value;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Serialize, ser};

/// Serialize a value to CBOR bytes.
///
/// # Errors
///
/// Returns an error if the value cannot be serialised.
pub fn to_vec<T: Serialize>(value: &T) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)?;
    Ok(buf)
}

/// Deserialize a value from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid CBOR for `T`.
pub fn from_slice<T: DeserializeOwned>(slice: &[u8]) -> anyhow::Result<T> {
    ciborium::from_reader(Cursor::new(slice)).map_err(|e| anyhow!("cbor decode: {e}"))
}

/// Wrapper for values encoded as `#6.24(bstr .cbor T)`: the inner value is
/// serialised to bytes and those bytes are tagged with 24.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag24<T>(pub T);

impl<T> Deref for Tag24<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: Serialize> Tag24<T> {
    /// CBOR bytes of the inner value (untagged). Digests are computed over
    /// the tagged form returned by [`to_vec`] on the wrapper itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the inner value cannot be serialised.
    pub fn inner_bytes(&self) -> anyhow::Result<Vec<u8>> {
        to_vec(&self.0)
    }
}

impl<T: Serialize> Serialize for Tag24<T> {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let bytes = to_vec(&self.0).map_err(ser::Error::custom)?;
        Value::Tag(24, Box::new(Value::Bytes(bytes))).serialize(serializer)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Tag24<T> {
    fn deserialize<D: de::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let Value::Tag(24, boxed) = value else {
            return Err(de::Error::custom("expected tag 24"));
        };
        let Value::Bytes(bytes) = boxed.as_ref() else {
            return Err(de::Error::custom("tag 24 must wrap a byte string"));
        };
        let inner = from_slice(bytes).map_err(de::Error::custom)?;
        Ok(Self(inner))
    }
}

/// Convert a JSON element value to its CBOR form. Full-date strings
/// (`YYYY-MM-DD`) are tagged 1004 per RFC 8943.
///
/// # Errors
///
/// Returns an error if the value cannot be represented in CBOR.
pub fn element_value(value: &serde_json::Value) -> anyhow::Result<Value> {
    if let Some(s) = value.as_str() {
        if is_full_date(s) {
            return Ok(Value::Tag(1004, Box::new(Value::Text(s.to_string()))));
        }
    }
    ciborium::cbor!(value).map_err(|e| anyhow!("cbor value: {e}"))
}

fn is_full_date(s: &str) -> bool {
    s.len() == 10 && chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}
