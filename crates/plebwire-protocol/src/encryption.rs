//! Payload encryption between a publisher and a subplebbit.
//!
//! Every pubsub payload (publication, challenges, answers, verification
//! extras) is encrypted with a symmetric key derived from a static
//! X25519 agreement between the two parties' Ed25519 keys. No
//! ephemeral key travels on the wire: the sender's identity is the
//! public key in the enclosing message signature, the recipient's is
//! either the subplebbit key (from its index record) or the request
//! signer's key.
//!
//! # Schemes
//!
//! | tag                           | key                                    | iv       |
//! |-------------------------------|----------------------------------------|----------|
//! | `ed25519-aes-gcm`             | first 16 bytes of the shared secret    | 12 bytes |
//! | `ed25519-xchacha20-poly1305`  | HKDF-SHA256(shared, salt, sender‖recipient) | 24 bytes |
//!
//! The XChaCha key binds the direction into HKDF `info`, so the
//! recipient must pass the sender's key as `sender` on decryption.

use plebwire_crypto::aead::{
    decrypt_aes128_gcm, decrypt_xchacha20, encrypt_aes128_gcm, encrypt_xchacha20, random_nonce,
    AES_GCM_NONCE_LEN, XCHACHA_NONCE_LEN,
};
use plebwire_crypto::ecdh::static_shared_secret;
use plebwire_crypto::hkdf::hkdf_sha256;
use plebwire_crypto::signing::{Keypair, PublicKey};
use plebwire_types::{PlebwireError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// AES-128-GCM scheme tag.
pub const ED25519_AES_GCM: &str = "ed25519-aes-gcm";

/// XChaCha20-Poly1305 scheme tag.
pub const ED25519_XCHACHA20_POLY1305: &str = "ed25519-xchacha20-poly1305";

/// HKDF salt of the XChaCha scheme.
const XCHACHA_SALT: &[u8] = b"plebwire-e2e";

// ---------------------------------------------------------------------------
// EncryptedEnvelope
// ---------------------------------------------------------------------------

/// Encrypted payload as carried in pubsub messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Ciphertext without the tag.
    #[serde(with = "plebwire_types::bytes")]
    pub ciphertext: Vec<u8>,
    /// Nonce.
    #[serde(with = "plebwire_types::bytes")]
    pub iv: Vec<u8>,
    /// Authentication tag.
    #[serde(with = "plebwire_types::bytes")]
    pub tag: Vec<u8>,
    /// Scheme tag.
    #[serde(rename = "type")]
    pub kind: String,
}

// ---------------------------------------------------------------------------
// Capability table
// ---------------------------------------------------------------------------

/// A payload encryption scheme addressed by its tag.
pub trait EncryptionScheme: Send + Sync {
    /// Wire tag.
    fn tag(&self) -> &'static str;

    /// Encrypts `plaintext` from `sender` to `recipient`.
    ///
    /// # Errors
    ///
    /// `EncryptionError` on key agreement or cipher failure.
    fn encrypt(&self, plaintext: &[u8], sender: &Keypair, recipient: &PublicKey) -> Result<EncryptedEnvelope>;

    /// Decrypts an envelope addressed to `recipient` from `sender`.
    ///
    /// # Errors
    ///
    /// `EncryptionError` on malformed fields or tag mismatch.
    fn decrypt(&self, envelope: &EncryptedEnvelope, recipient: &Keypair, sender: &PublicKey) -> Result<Vec<u8>>;
}

struct AesGcmScheme;

impl AesGcmScheme {
    fn key(ours: &Keypair, theirs: &PublicKey) -> Result<[u8; 16]> {
        let shared = static_shared_secret(ours, theirs)?;
        let mut key = [0u8; 16];
        key.copy_from_slice(&shared.as_bytes()[..16]);
        Ok(key)
    }
}

impl EncryptionScheme for AesGcmScheme {
    fn tag(&self) -> &'static str {
        ED25519_AES_GCM
    }

    fn encrypt(&self, plaintext: &[u8], sender: &Keypair, recipient: &PublicKey) -> Result<EncryptedEnvelope> {
        let key = Self::key(sender, recipient)?;
        let iv = random_nonce::<AES_GCM_NONCE_LEN>();
        let sealed = encrypt_aes128_gcm(&key, &iv, plaintext)?;
        Ok(EncryptedEnvelope {
            ciphertext: sealed.ciphertext,
            iv: iv.to_vec(),
            tag: sealed.tag.to_vec(),
            kind: ED25519_AES_GCM.into(),
        })
    }

    fn decrypt(&self, envelope: &EncryptedEnvelope, recipient: &Keypair, sender: &PublicKey) -> Result<Vec<u8>> {
        let key = Self::key(recipient, sender)?;
        decrypt_aes128_gcm(&key, &envelope.iv, &envelope.ciphertext, &envelope.tag)
    }
}

struct XChaChaScheme;

impl XChaChaScheme {
    fn key(ours: &Keypair, theirs: &PublicKey, sender: &PublicKey, recipient: &PublicKey) -> Result<[u8; 32]> {
        let shared = static_shared_secret(ours, theirs)?;
        let mut info = Vec::with_capacity(64);
        info.extend_from_slice(sender.as_bytes());
        info.extend_from_slice(recipient.as_bytes());
        hkdf_sha256(shared.as_bytes(), XCHACHA_SALT, &info, 32)?.to_key32()
    }
}

impl EncryptionScheme for XChaChaScheme {
    fn tag(&self) -> &'static str {
        ED25519_XCHACHA20_POLY1305
    }

    fn encrypt(&self, plaintext: &[u8], sender: &Keypair, recipient: &PublicKey) -> Result<EncryptedEnvelope> {
        let key = Self::key(sender, recipient, &sender.public_key(), recipient)?;
        let iv = random_nonce::<XCHACHA_NONCE_LEN>();
        let sealed = encrypt_xchacha20(&key, &iv, plaintext)?;
        Ok(EncryptedEnvelope {
            ciphertext: sealed.ciphertext,
            iv: iv.to_vec(),
            tag: sealed.tag.to_vec(),
            kind: ED25519_XCHACHA20_POLY1305.into(),
        })
    }

    fn decrypt(&self, envelope: &EncryptedEnvelope, recipient: &Keypair, sender: &PublicKey) -> Result<Vec<u8>> {
        let key = Self::key(recipient, sender, sender, &recipient.public_key())?;
        decrypt_xchacha20(&key, &envelope.iv, &envelope.ciphertext, &envelope.tag)
    }
}

static SCHEMES: [&dyn EncryptionScheme; 2] = [&AesGcmScheme, &XChaChaScheme];

/// Looks up an encryption scheme by tag.
pub fn scheme_for(tag: &str) -> Option<&'static dyn EncryptionScheme> {
    SCHEMES.iter().copied().find(|s| s.tag() == tag)
}

fn require_scheme(tag: &str) -> Result<&'static dyn EncryptionScheme> {
    scheme_for(tag).ok_or_else(|| PlebwireError::EncryptionError {
        reason: format!("unsupported encryption type {tag}"),
    })
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Encrypts `plaintext` with the scheme named `tag`.
///
/// # Errors
///
/// `EncryptionError` for an unknown tag or a crypto failure.
pub fn encrypt(plaintext: &[u8], sender: &Keypair, recipient: &PublicKey, tag: &str) -> Result<EncryptedEnvelope> {
    require_scheme(tag)?.encrypt(plaintext, sender, recipient)
}

/// Decrypts an envelope using the scheme named in its `type`.
///
/// # Errors
///
/// `EncryptionError` for an unknown tag, malformed fields, or a tag
/// mismatch.
pub fn decrypt(envelope: &EncryptedEnvelope, recipient: &Keypair, sender: &PublicKey) -> Result<Vec<u8>> {
    require_scheme(&envelope.kind)?.decrypt(envelope, recipient, sender)
}

/// Serializes `payload` as JSON and encrypts it.
///
/// # Errors
///
/// `ProtocolError` if serialization fails, otherwise as [`encrypt`].
pub fn encrypt_json<T: Serialize>(payload: &T, sender: &Keypair, recipient: &PublicKey, tag: &str) -> Result<EncryptedEnvelope> {
    let json = serde_json::to_vec(payload).map_err(|e| PlebwireError::ProtocolError {
        reason: format!("payload serialization failed: {e}"),
    })?;
    encrypt(&json, sender, recipient, tag)
}

/// Decrypts an envelope and parses the JSON payload.
///
/// # Errors
///
/// As [`decrypt`], plus `ProtocolError` if the plaintext is not the
/// expected JSON shape.
pub fn decrypt_json<T: DeserializeOwned>(envelope: &EncryptedEnvelope, recipient: &Keypair, sender: &PublicKey) -> Result<T> {
    let plaintext = decrypt(envelope, recipient, sender)?;
    serde_json::from_slice(&plaintext).map_err(|e| PlebwireError::ProtocolError {
        reason: format!("payload parse failed: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
