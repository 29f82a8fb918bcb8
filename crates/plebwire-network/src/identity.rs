//! Conversion between plebwire signing keys and libp2p identities.
//!
//! A node's libp2p `PeerId` is derived from the same ed25519 key that
//! signs its pubsub frames, so the mapping is deterministic.

use libp2p::identity;
use libp2p::PeerId;

use plebwire_crypto::signing::{Keypair, PublicKey};
use plebwire_types::{PlebwireError, Result};

/// Converts a plebwire ed25519 keypair into a libp2p identity.
///
/// # Errors
///
/// Returns `NetworkError` if libp2p rejects the keypair encoding.
pub fn keypair_to_libp2p(keypair: &Keypair) -> Result<identity::Keypair> {
    // seed || public; zeroed by `try_from_bytes` on success.
    let mut raw = keypair.to_keypair_bytes();
    let ed25519_kp = identity::ed25519::Keypair::try_from_bytes(&mut raw).map_err(|e| PlebwireError::NetworkError {
        reason: format!("failed to convert keypair to libp2p identity: {e}"),
    })?;
    Ok(identity::Keypair::from(ed25519_kp))
}

/// Derives the `PeerId` that a node signing with `public_key` will have.
///
/// # Errors
///
/// Returns `NetworkError` if the bytes are not a valid ed25519 point.
pub fn peer_id_from_public_key(public_key: &PublicKey) -> Result<PeerId> {
    let ed25519_pk = identity::ed25519::PublicKey::try_from_bytes(public_key.as_bytes()).map_err(|e| {
        PlebwireError::NetworkError {
            reason: format!("invalid ed25519 public key for libp2p: {e}"),
        }
    })?;
    Ok(PeerId::from(identity::PublicKey::from(ed25519_pk)))
}
