//! Serde adapter for byte fields.
//!
//! Byte fields (signatures, public keys, ciphertexts, request ids) are
//! written as raw byte strings in binary formats such as CBOR and as
//! standard base64 strings in human-readable formats such as JSON.
//! Deserialization accepts either representation, plus a sequence of
//! integers, so a value produced by one encoder can always be read back
//! through an intermediate value tree.
//!
//! Use with `#[serde(with = "plebwire_types::bytes")]` on a `Vec<u8>`.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserializer, Serializer};

/// Serializes `bytes` as base64 (human-readable) or a byte string.
pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    if serializer.is_human_readable() {
        serializer.serialize_str(&STANDARD.encode(bytes))
    } else {
        serializer.serialize_bytes(bytes)
    }
}

/// Deserializes a byte field from base64, a byte string or a sequence.
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    deserializer.deserialize_any(BytesVisitor)
}

struct BytesVisitor;

impl<'de> Visitor<'de> for BytesVisitor {
    type Value = Vec<u8>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a base64 string or a byte string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        STANDARD
            .decode(v)
            .map_err(|e| E::custom(format!("invalid base64: {e}")))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Ok(v.to_vec())
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        Ok(v)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(b) = seq.next_element::<u8>()? {
            out.push(b);
        }
        Ok(out)
    }
}

/// Same adapter for `Option<Vec<u8>>` fields.
pub mod option {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(serde::Deserialize)]
    #[serde(transparent)]
    struct Wrapped(#[serde(with = "crate::bytes")] Vec<u8>);

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => super::serialize(b, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|w| w.0))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "crate::bytes")]
        data: Vec<u8>,
    }

    #[test]
    fn json_uses_base64() -> Result<(), serde_json::Error> {
        let h = Holder { data: b"hello".to_vec() };
        let json = serde_json::to_string(&h)?;
        assert_eq!(json, r#"{"data":"aGVsbG8="}"#);
        assert_eq!(serde_json::from_str::<Holder>(&json)?, h);
        Ok(())
    }

    #[test]
    fn json_accepts_integer_array() -> Result<(), serde_json::Error> {
        let h: Holder = serde_json::from_str(r#"{"data":[1,2,3]}"#)?;
        assert_eq!(h.data, vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn rejects_bad_base64() {
        assert!(serde_json::from_str::<Holder>(r#"{"data":"***"}"#).is_err());
    }
}
