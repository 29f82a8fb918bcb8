//! Static X25519 key agreement derived from Ed25519 identities.
//!
//! Both sides of a challenge exchange only know each other's Ed25519
//! public keys (the subplebbit advertises its key in the index record,
//! the publisher carries its key in the request signature). The shared
//! secret is therefore computed from the birationally equivalent X25519
//! keys: the secret scalar comes from `SHA-512(seed)[..32]` and the
//! peer's public key is mapped from Edwards to Montgomery form.

use ed25519_dalek::VerifyingKey;
use plebwire_types::{PlebwireError, Result};
use sha2::{Digest, Sha512};
use zeroize::Zeroize;

use crate::signing::{Keypair, PublicKey};

// ---------------------------------------------------------------------------
// SharedSecret
// ---------------------------------------------------------------------------

/// 32-byte X25519 shared secret. Zeroized on drop.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    /// Returns the raw shared secret.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Converts an Ed25519 keypair into its X25519 static secret.
fn ed25519_secret_to_x25519(keypair: &Keypair) -> x25519_dalek::StaticSecret {
    let mut seed = keypair.signing_key.to_bytes();
    let digest = Sha512::digest(seed);
    seed.zeroize();

    let mut scalar = [0u8; 32];
    scalar.copy_from_slice(&digest[..32]);
    let secret = x25519_dalek::StaticSecret::from(scalar);
    scalar.zeroize();
    secret
}

/// Maps an Ed25519 public key to its X25519 (Montgomery) form.
///
/// # Errors
///
/// `EncryptionError` if the bytes are not a valid Edwards point.
pub fn ed25519_pubkey_to_x25519(public_key: &PublicKey) -> Result<[u8; 32]> {
    let vk = VerifyingKey::from_bytes(public_key.as_bytes()).map_err(|e| {
        PlebwireError::EncryptionError {
            reason: format!("invalid ed25519 public key: {e}"),
        }
    })?;
    Ok(vk.to_montgomery().to_bytes())
}

/// Returns the X25519 public key matching `keypair`'s converted secret.
pub fn x25519_public_of(keypair: &Keypair) -> [u8; 32] {
    let secret = ed25519_secret_to_x25519(keypair);
    x25519_dalek::PublicKey::from(&secret).to_bytes()
}

// ---------------------------------------------------------------------------
// Agreement
// ---------------------------------------------------------------------------

/// Computes the static shared secret between our Ed25519 keypair and a
/// peer's Ed25519 public key.
///
/// Symmetric: `shared(a, B) == shared(b, A)`.
///
/// # Errors
///
/// `EncryptionError` if the peer key is malformed or is a low-order
/// point yielding an all-zero secret.
pub fn static_shared_secret(ours: &Keypair, their_public: &PublicKey) -> Result<SharedSecret> {
    let their_x = x25519_dalek::PublicKey::from(ed25519_pubkey_to_x25519(their_public)?);
    let secret = ed25519_secret_to_x25519(ours);
    let shared = secret.diffie_hellman(&their_x);
    if !shared.was_contributory() {
        return Err(PlebwireError::EncryptionError {
            reason: "non-contributory key agreement".into(),
        });
    }
    Ok(SharedSecret(shared.to_bytes()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
