//! Deterministic CBOR encoding (RFC 8949 §4.2) of field subsets.
//!
//! Signatures never cover a serde-derived byte stream directly, since
//! field order there follows struct declaration order and differs
//! between implementations. Instead the object is lowered to a CBOR
//! value tree, reduced to the named fields, and re-encoded with every
//! map sorted by the bytewise order of its encoded keys (shorter keys
//! first, then lexicographic). The same object with the same set of
//! names always yields the same bytes, whatever order the names come in.
//!
//! Null map values are dropped at every level so that an absent
//! optional field and an explicit `null` sign identically.

use std::cmp::Ordering;

use ciborium::Value;
use plebwire_types::{PlebwireError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Map key that is never part of the signing input.
pub const SIGNATURE_KEY: &str = "signature";

// ---------------------------------------------------------------------------
// Plain CBOR wire helpers
// ---------------------------------------------------------------------------

/// Serializes any value to CBOR bytes.
///
/// # Errors
///
/// `ProtocolError` if serialization fails.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| PlebwireError::ProtocolError {
        reason: format!("CBOR serialization failed: {e}"),
    })?;
    Ok(buf)
}

/// Deserializes a value from CBOR bytes.
///
/// # Errors
///
/// `ProtocolError` on malformed input or a schema mismatch.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| PlebwireError::ProtocolError {
        reason: format!("CBOR deserialization failed: {e}"),
    })
}

/// Lowers a serializable object to a CBOR value tree.
///
/// Goes through bytes so that byte fields take their binary form.
fn to_value<T: Serialize + ?Sized>(obj: &T) -> Result<Value> {
    let bytes = to_cbor(obj)?;
    from_cbor(&bytes)
}

// ---------------------------------------------------------------------------
// Field selection
// ---------------------------------------------------------------------------

fn key_text(key: &Value) -> Option<&str> {
    match key {
        Value::Text(s) => Some(s.as_str()),
        _ => None,
    }
}

/// Lists the names of the non-null top-level fields of `obj`, excluding
/// `signature`, sorted alphabetically.
///
/// Used for records whose signature covers every present field.
///
/// # Errors
///
/// `ProtocolError` if `obj` does not serialize to a map.
pub fn present_field_names<T: Serialize + ?Sized>(obj: &T) -> Result<Vec<String>> {
    let entries = match to_value(obj)? {
        Value::Map(entries) => entries,
        _ => {
            return Err(PlebwireError::ProtocolError {
                reason: "signed object must serialize to a map".into(),
            })
        }
    };
    let mut names: Vec<String> = entries
        .iter()
        .filter(|(_, v)| !v.is_null())
        .filter_map(|(k, _)| key_text(k))
        .filter(|k| *k != SIGNATURE_KEY)
        .map(str::to_owned)
        .collect();
    names.sort();
    Ok(names)
}

/// Builds the canonical signing input for `obj` restricted to `names`.
///
/// Entries whose key is not in `names`, whose value is null, or whose
/// key is `signature` are skipped. Duplicate or unknown names are
/// harmless.
///
/// # Errors
///
/// `ProtocolError` if `obj` does not serialize to a map.
pub fn signing_input<T, S>(obj: &T, names: &[S]) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
    S: AsRef<str>,
{
    let entries = match to_value(obj)? {
        Value::Map(entries) => entries,
        _ => {
            return Err(PlebwireError::ProtocolError {
                reason: "signed object must serialize to a map".into(),
            })
        }
    };

    let selected: Vec<(Value, Value)> = entries
        .into_iter()
        .filter(|(k, v)| {
            !v.is_null()
                && key_text(k).map_or(false, |name| {
                    name != SIGNATURE_KEY && names.iter().any(|n| n.as_ref() == name)
                })
        })
        .collect();

    encode_canonical(Value::Map(selected))
}

// ---------------------------------------------------------------------------
// Canonical ordering
// ---------------------------------------------------------------------------

/// Encodes a value with deterministic map ordering applied recursively.
///
/// # Errors
///
/// `ProtocolError` if encoding fails.
pub fn encode_canonical(value: Value) -> Result<Vec<u8>> {
    to_cbor(&canonicalize(value)?)
}

fn canonicalize(value: Value) -> Result<Value> {
    match value {
        Value::Map(entries) => {
            let mut keyed = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                if v.is_null() {
                    continue;
                }
                let k = canonicalize(k)?;
                let encoded_key = to_cbor(&k)?;
                keyed.push((encoded_key, k, canonicalize(v)?));
            }
            keyed.sort_by(|a, b| compare_encoded(&a.0, &b.0));
            if keyed.windows(2).any(|w| w[0].0 == w[1].0) {
                return Err(PlebwireError::ProtocolError {
                    reason: "duplicate map key".into(),
                });
            }
            Ok(Value::Map(keyed.into_iter().map(|(_, k, v)| (k, v)).collect()))
        }
        Value::Array(items) => Ok(Value::Array(
            items.into_iter().map(canonicalize).collect::<Result<_>>()?,
        )),
        Value::Tag(tag, inner) => Ok(Value::Tag(tag, Box::new(canonicalize(*inner)?))),
        other => Ok(other),
    }
}

/// RFC 8949 §4.2.1: bytewise lexicographic order of the encoded keys.
fn compare_encoded(a: &[u8], b: &[u8]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Sample {
        subplebbit_address: String,
        timestamp: u64,
        content: Option<String>,
        title: Option<String>,
        nested: Nested,
        signature: Option<String>,
    }

    #[derive(Serialize)]
    struct Nested {
        zeta: u8,
        a: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        gone: Option<u8>,
    }

    fn sample() -> Sample {
        Sample {
            subplebbit_address: "sub".into(),
            timestamp: 1_700_000_000,
            content: Some("hello".into()),
            title: None,
            nested: Nested { zeta: 1, a: 2, gone: None },
            signature: Some("ignored".into()),
        }
    }

    #[test]
    fn order_of_names_is_irrelevant() -> std::result::Result<(), PlebwireError> {
        let s = sample();
        let a = signing_input(&s, &["timestamp", "content", "subplebbitAddress", "nested"])?;
        let b = signing_input(&s, &["nested", "subplebbitAddress", "content", "timestamp"])?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn null_and_signature_are_skipped() -> std::result::Result<(), PlebwireError> {
        let s = sample();
        let with = signing_input(&s, &["content", "title", "signature"])?;
        let without = signing_input(&s, &["content"])?;
        assert_eq!(with, without);
        Ok(())
    }

    #[test]
    fn keys_sorted_length_first() -> std::result::Result<(), PlebwireError> {
        let s = sample();
        let bytes = signing_input(&s, &["timestamp", "content", "nested"])?;
        let value: Value = from_cbor(&bytes)?;
        let keys: Vec<String> = match value {
            Value::Map(entries) => entries
                .iter()
                .filter_map(|(k, _)| key_text(k).map(str::to_owned))
                .collect(),
            _ => Vec::new(),
        };
        assert_eq!(keys, vec!["nested", "content", "timestamp"]);
        Ok(())
    }

    #[test]
    fn nested_maps_are_sorted() -> std::result::Result<(), PlebwireError> {
        let bytes = signing_input(&sample(), &["nested"])?;
        // {"nested": {"a": 2, "zeta": 1}}
        let expected = [
            0xA1, 0x66, b'n', b'e', b's', b't', b'e', b'd', 0xA2, 0x61, b'a', 0x02, 0x64, b'z',
            b'e', b't', b'a', 0x01,
        ];
        assert_eq!(bytes, expected);
        Ok(())
    }

    #[test]
    fn present_names_exclude_nulls_and_signature() -> std::result::Result<(), PlebwireError> {
        let names = present_field_names(&sample())?;
        assert_eq!(names, vec!["content", "nested", "subplebbitAddress", "timestamp"]);
        Ok(())
    }

    #[test]
    fn non_map_is_rejected() {
        assert!(signing_input(&42u8, &["x"]).is_err());
    }
}
