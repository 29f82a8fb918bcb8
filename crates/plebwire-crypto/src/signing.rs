//! Ed25519 signing keys and signatures.
//!
//! Keys arrive from the wire as untrusted byte strings, so every
//! constructor that takes a slice validates its length and returns a
//! `SignatureError` instead of panicking. The private key is zeroized on
//! drop by `ed25519-dalek`.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use plebwire_types::{Address, PlebwireError, Result};
use rand::rngs::OsRng;

use crate::hash::sha3_256;

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

/// Ed25519 public key (32 bytes).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Fixed byte length of an Ed25519 public key.
    pub const LEN: usize = 32;

    /// Creates a [`PublicKey`] from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parses a public key received from the wire.
    ///
    /// # Errors
    ///
    /// `SignatureError` if `bytes` is not exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| PlebwireError::SignatureError {
            reason: format!("public key must be 32 bytes, got {}", bytes.len()),
        })?;
        Ok(Self(arr))
    }

    /// Returns the underlying 32-byte array.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derives the address of this key.
    pub fn address(&self) -> Address {
        pubkey_to_address(self)
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// Ed25519 signature (64 bytes).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Signature([u8; 64]);

impl Signature {
    /// Fixed byte length of an Ed25519 signature.
    pub const LEN: usize = 64;

    /// Creates a [`Signature`] from raw bytes.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Parses a signature received from the wire.
    ///
    /// # Errors
    ///
    /// `SignatureError` if `bytes` is not exactly 64 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 64] = bytes.try_into().map_err(|_| PlebwireError::SignatureError {
            reason: format!("signature must be 64 bytes, got {}", bytes.len()),
        })?;
        Ok(Self(arr))
    }

    /// Returns the underlying 64-byte array.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Keypair
// ---------------------------------------------------------------------------

/// Ed25519 signing keypair.
///
/// Used for authors, for subplebbits and for the per-exchange pubsub
/// signer.
pub struct Keypair {
    pub(crate) signing_key: SigningKey,
}

impl Keypair {
    /// Generates a new random keypair from OS entropy.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Reconstructs a keypair deterministically from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Returns the public half of this keypair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Returns the address derived from this keypair's public key.
    pub fn address(&self) -> Address {
        pubkey_to_address(&self.public_key())
    }

    /// Signs `message`. Ed25519 is deterministic (RFC 8032).
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }

    /// Returns the 32-byte seed.
    ///
    /// The returned bytes are secret; callers must discard them promptly.
    pub fn seed_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Returns the 64-byte `seed || public key` encoding accepted by
    /// `libp2p::identity::ed25519::Keypair::try_from_bytes`.
    pub fn to_keypair_bytes(&self) -> [u8; 64] {
        self.signing_key.to_keypair_bytes()
    }
}

// Keypair does not implement Clone or Debug so the secret never lands in logs.

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Verifies an Ed25519 signature with strict (non-malleable) checking.
///
/// # Errors
///
/// `SignatureError` if the key is not a valid curve point or the
/// signature does not verify.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> Result<()> {
    let vk = VerifyingKey::from_bytes(&public_key.0).map_err(|e| PlebwireError::SignatureError {
        reason: format!("invalid public key: {e}"),
    })?;
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    vk.verify_strict(message, &sig)
        .map_err(|e| PlebwireError::SignatureError {
            reason: format!("signature verification failed: {e}"),
        })
}

/// Derives an [`Address`] from a public key: `SHA3-256(public_key)`.
pub fn pubkey_to_address(public_key: &PublicKey) -> Address {
    Address::new(sha3_256(&public_key.0))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let kp = Keypair::generate();
        let sig = kp.sign(b"hello subplebbit");
        assert!(verify(&kp.public_key(), b"hello subplebbit", &sig).is_ok());
    }

    #[test]
    fn from_seed_is_deterministic() {
        let kp1 = Keypair::from_seed(&[0x42; 32]);
        let kp2 = Keypair::from_seed(&[0x42; 32]);
        assert_eq!(kp1.public_key(), kp2.public_key());
        assert_eq!(kp1.sign(b"x"), kp2.sign(b"x"));
    }

    #[test]
    fn wrong_message_or_key_fails() {
        let kp1 = Keypair::from_seed(&[1; 32]);
        let kp2 = Keypair::from_seed(&[2; 32]);
        let sig = kp1.sign(b"right");
        assert!(verify(&kp1.public_key(), b"wrong", &sig).is_err());
        assert!(verify(&kp2.public_key(), b"right", &sig).is_err());
    }

    #[test]
    fn from_slice_checks_length() {
        assert!(PublicKey::from_slice(&[0u8; 31]).is_err());
        assert!(Signature::from_slice(&[0u8; 65]).is_err());
        assert!(PublicKey::from_slice(&[7u8; 32]).is_ok());
    }

    #[test]
    fn address_matches_free_function() {
        let kp = Keypair::from_seed(&[0xAA; 32]);
        assert_eq!(kp.address(), pubkey_to_address(&kp.public_key()));
        assert_eq!(kp.public_key().address(), kp.address());
    }

    #[test]
    fn keypair_bytes_are_seed_then_pubkey() {
        let seed = [0x42u8; 32];
        let kp = Keypair::from_seed(&seed);
        let full = kp.to_keypair_bytes();
        assert_eq!(&full[..32], &seed);
        assert_eq!(&full[32..], kp.public_key().as_bytes());
        assert_eq!(kp.seed_bytes(), seed);
    }
}
