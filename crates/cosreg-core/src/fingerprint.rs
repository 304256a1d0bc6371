//! Change detection fingerprints
//!
//! A [`Fingerprint`] is a SHA-256 digest over the canonical JSON form of a
//! value. Canonical means mapping keys are emitted in sorted order at every
//! nesting level, so two logically equal values always share a fingerprint no
//! matter how their maps were built. Sequences keep their order.
//!
//! Fingerprints are only ever used to decide whether upstream data moved since
//! the last reconciliation pass. They carry no security meaning.
//!
//! ```
//! use cosreg_core::fingerprint::fingerprint;
//! use serde_json::json;
//!
//! let a = fingerprint(&json!({"a": 1, "b": 2})).unwrap();
//! let b = fingerprint(&json!({"b": 2, "a": 1})).unwrap();
//! assert_eq!(a, b);
//! ```

use crate::errors::{CharmError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// 32-byte content digest used for change detection
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    /// Lowercase hex rendering
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a fingerprint previously rendered with [`Fingerprint::to_hex`]
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| CharmError::invalid(format!("fingerprint is not hex: {e}")))?;
        let array: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            CharmError::invalid(format!("fingerprint must be 32 bytes, got {}", v.len()))
        })?;
        Ok(Self(array))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Fingerprint::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Fingerprint any serializable value.
///
/// Fails only when `value` cannot be represented as JSON (for example a map
/// with non-string keys), which is a programming error at the call site.
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Result<Fingerprint> {
    let value = serde_json::to_value(value)?;
    Ok(fingerprint_value(&value))
}

/// Fingerprint an already materialized JSON value.
pub fn fingerprint_value(value: &Value) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    let mut output = [0u8; 32];
    output.copy_from_slice(&hasher.finalize());
    Fingerprint(output)
}

/// Render `value` as compact JSON with object keys sorted at every level.
///
/// This does not rely on the map ordering of `serde_json::Map`, which changes
/// when any crate in the build enables `preserve_order`.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
