//! Core shared types for the plebwire publication protocol.
//!
//! This crate defines the identifiers, the error taxonomy and the
//! configuration shared by every other crate in the workspace. No
//! other crate defines shared types; everything lives here.

pub mod bytes;
pub mod config;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Hex-string identifier helper
// ---------------------------------------------------------------------------

/// Decodes a 64-character hex string into a 32-byte array.
fn decode_hex_32(s: &str) -> std::result::Result<[u8; 32], String> {
    let bytes = hex::decode(s).map_err(|_| "invalid hex encoding".to_string())?;
    if bytes.len() != 32 {
        return Err(format!("expected 32 bytes, got {}", bytes.len()));
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Identity address: SHA3-256 of an ed25519 public key.
///
/// Used both for authors and for subplebbits. A subplebbit's address is
/// also its pubsub topic and the name its index record is published
/// under. Serialized as a lowercase hex string in every encoding.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 32]);

impl Address {
    /// The fixed byte length of an address.
    pub const LEN: usize = 32;

    /// Creates a new `Address` from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the pubsub topic name for this address.
    pub fn topic(&self) -> String {
        self.to_string()
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = PlebwireError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        decode_hex_32(s)
            .map(Self)
            .map_err(|reason| PlebwireError::InvalidAddress { reason })
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// ContentId
// ---------------------------------------------------------------------------

/// Content identifier: SHA-256 of the stored bytes.
///
/// Deterministic; identical bytes always produce the identical id.
/// Display and serialized form is lowercase hex (64 chars).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ContentId([u8; 32]);

impl ContentId {
    /// Fixed byte length.
    pub const LEN: usize = 32;

    /// Creates a content id from raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for ContentId {
    type Err = PlebwireError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        decode_hex_32(s)
            .map(Self)
            .map_err(|reason| PlebwireError::ProtocolError {
                reason: format!("invalid content id: {reason}"),
            })
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// RequestId
// ---------------------------------------------------------------------------

/// Opaque identifier correlating the four messages of one challenge
/// exchange.
///
/// Generated once by the publisher and echoed unchanged by both sides.
/// Encoded as a byte string in CBOR frames and as base64 in JSON.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RequestId(#[serde(with = "crate::bytes")] Vec<u8>);

impl RequestId {
    /// Wraps raw request id bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Generates a fresh random 32-byte request id.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = vec![0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// UTC timestamp in whole seconds since the Unix epoch.
///
/// All protocol timestamps (`timestamp`, `updatedAt`, `createdAt`) use
/// this representation so that they encode as plain integers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a `Timestamp` representing the current UTC time.
    pub fn now() -> Self {
        let secs = chrono::Utc::now().timestamp();
        Self(u64::try_from(secs).unwrap_or(0))
    }

    /// Creates a `Timestamp` from seconds since the epoch.
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Returns seconds since the epoch.
    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Seconds elapsed between `self` and a later `now`, saturating at 0.
    pub fn age_at(&self, now: Timestamp) -> u64 {
        now.0.saturating_sub(self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Unified error type for the plebwire workspace.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlebwireError {
    /// A signature did not verify, or its signed-field subset is malformed.
    #[error("signature error: {reason}")]
    SignatureError {
        /// Human-readable description of the signature failure.
        reason: String,
    },

    /// Encryption or decryption failed (including tag mismatch).
    #[error("encryption error: {reason}")]
    EncryptionError {
        /// Human-readable description of the encryption failure.
        reason: String,
    },

    /// Unexpected message for the current state, bad framing, or an
    /// unknown/duplicate request id.
    #[error("protocol error: {reason}")]
    ProtocolError {
        /// Human-readable description of the protocol failure.
        reason: String,
    },

    /// The subplebbit rejected the publication or its challenge answers.
    #[error("challenge failed: {reason}")]
    ChallengeFailure {
        /// Reason reported in the verification message.
        reason: String,
    },

    /// A content store operation failed.
    #[error("storage error: {reason}")]
    StorageError {
        /// Human-readable description of the storage failure.
        reason: String,
    },

    /// A transport operation failed.
    #[error("network error: {reason}")]
    NetworkError {
        /// Human-readable description of the network failure.
        reason: String,
    },

    /// A configuration value is invalid or missing.
    #[error("config error: {reason}")]
    ConfigError {
        /// Human-readable description of the configuration problem.
        reason: String,
    },

    /// A publication is malformed or violates a schema rule.
    #[error("invalid publication: {reason}")]
    InvalidPublication {
        /// Human-readable description of the validation failure.
        reason: String,
    },

    /// An address string is malformed.
    #[error("invalid address: {reason}")]
    InvalidAddress {
        /// Human-readable description of why the address is invalid.
        reason: String,
    },

    /// A bounded wait elapsed without the expected message.
    #[error("timed out: {reason}")]
    Timeout {
        /// What was being waited for.
        reason: String,
    },

    /// The operation was cancelled by its owner.
    #[error("cancelled: {reason}")]
    Cancelled {
        /// What was cancelled.
        reason: String,
    },
}

/// Convenience result type using [`PlebwireError`].
pub type Result<T> = std::result::Result<T, PlebwireError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_roundtrip_hex() -> std::result::Result<(), PlebwireError> {
        let addr = Address::new([0xAB; 32]);
        let parsed: Address = addr.to_string().parse()?;
        assert_eq!(addr, parsed);
        Ok(())
    }

    #[test]
    fn address_invalid_hex_length() {
        let result: std::result::Result<Address, _> = "abcd".parse();
        assert!(matches!(result, Err(PlebwireError::InvalidAddress { .. })));
    }

    #[test]
    fn address_serializes_as_string() -> std::result::Result<(), serde_json::Error> {
        let addr = Address::new([0x01; 32]);
        let json = serde_json::to_string(&addr)?;
        assert_eq!(json, format!("\"{}\"", "01".repeat(32)));
        let back: Address = serde_json::from_str(&json)?;
        assert_eq!(back, addr);
        Ok(())
    }

    #[test]
    fn content_id_rejects_garbage() {
        assert!("zz".parse::<ContentId>().is_err());
        assert!("00".repeat(31).parse::<ContentId>().is_err());
    }

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(RequestId::generate(), RequestId::generate());
    }

    #[test]
    fn request_id_json_is_base64() -> std::result::Result<(), serde_json::Error> {
        let id = RequestId::from_bytes(vec![0xFF, 0x00, 0x10]);
        let json = serde_json::to_string(&id)?;
        assert_eq!(json, "\"/wAQ\"");
        let back: RequestId = serde_json::from_str(&json)?;
        assert_eq!(back, id);
        Ok(())
    }

    #[test]
    fn timestamp_age_saturates() {
        let earlier = Timestamp::from_secs(100);
        let later = Timestamp::from_secs(250);
        assert_eq!(earlier.age_at(later), 150);
        assert_eq!(later.age_at(earlier), 0);
    }

    #[test]
    fn timestamp_is_plain_integer_in_json() -> std::result::Result<(), serde_json::Error> {
        let ts = Timestamp::from_secs(1_700_000_000);
        assert_eq!(serde_json::to_string(&ts)?, "1700000000");
        Ok(())
    }
}
