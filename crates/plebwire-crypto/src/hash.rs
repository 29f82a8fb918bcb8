//! Hash functions and content id computation.
//!
//! Addresses use SHA3-256 (see [`crate::signing::pubkey_to_address`]);
//! content ids use SHA-256 over the exact stored bytes.

use plebwire_types::ContentId;
use sha2::Sha256;
use sha3::{Digest, Sha3_256};

/// SHA3-256 of `data`.
pub fn sha3_256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha3_256::digest(data));
    out
}

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

/// Computes the content id of a stored block.
///
/// Identical bytes always produce the identical id, which is what makes
/// re-storing an unchanged record or page a no-op.
pub fn compute_content_id(bytes: &[u8]) -> ContentId {
    ContentId::from_bytes(sha256(bytes))
}
