//! HKDF-SHA256 (RFC 5869) for deriving symmetric keys from shared secrets.

use hkdf::Hkdf;
use plebwire_types::{PlebwireError, Result};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum output length accepted by [`hkdf_sha256`].
const MAX_OUTPUT_LEN: usize = 64;

/// Derived key material, zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct HkdfOutput {
    bytes: Vec<u8>,
}

impl HkdfOutput {
    /// Returns the derived bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the derived bytes as a 32-byte key.
    ///
    /// # Errors
    ///
    /// `EncryptionError` if the output is not 32 bytes long.
    pub fn to_key32(&self) -> Result<[u8; 32]> {
        self.bytes
            .as_slice()
            .try_into()
            .map_err(|_| PlebwireError::EncryptionError {
                reason: format!("expected 32 bytes of key material, got {}", self.bytes.len()),
            })
    }

    /// Length of the derived material.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the output is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Derives `output_len` bytes from `ikm` with HKDF-SHA256.
///
/// An empty `salt` means "no salt" (RFC 5869 §2.2).
///
/// # Errors
///
/// `EncryptionError` if `output_len` is 0 or greater than 64.
pub fn hkdf_sha256(ikm: &[u8], salt: &[u8], info: &[u8], output_len: usize) -> Result<HkdfOutput> {
    if output_len == 0 || output_len > MAX_OUTPUT_LEN {
        return Err(PlebwireError::EncryptionError {
            reason: format!("HKDF output length must be 1..={MAX_OUTPUT_LEN}, got {output_len}"),
        });
    }

    let salt = if salt.is_empty() { None } else { Some(salt) };
    let hk = Hkdf::<Sha256>::new(salt, ikm);

    let mut okm = vec![0u8; output_len];
    hk.expand(info, &mut okm)
        .map_err(|e| PlebwireError::EncryptionError {
            reason: format!("HKDF-SHA256 expansion failed: {e}"),
        })?;
    Ok(HkdfOutput { bytes: okm })
}
