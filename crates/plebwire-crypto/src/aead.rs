//! Authenticated encryption with detached tags.
//!
//! Two ciphers are offered. AES-128-GCM with a 96-bit nonce backs the
//! `ed25519-aes-gcm` payload scheme. XChaCha20-Poly1305 with a 192-bit
//! nonce backs `ed25519-xchacha20-poly1305`. Both return the ciphertext
//! and the 16-byte tag separately because the wire envelope carries
//! them as distinct fields.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::Aes128Gcm;
use chacha20poly1305::XChaCha20Poly1305;
use plebwire_types::{PlebwireError, Result};
use rand::rngs::OsRng;
use rand::RngCore;

/// Length of an AEAD authentication tag.
pub const TAG_LEN: usize = 16;

/// Nonce length for AES-GCM.
pub const AES_GCM_NONCE_LEN: usize = 12;

/// Nonce length for XChaCha20-Poly1305.
pub const XCHACHA_NONCE_LEN: usize = 24;

/// Ciphertext with its authentication tag held apart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetachedCiphertext {
    /// Encrypted bytes, same length as the plaintext.
    pub ciphertext: Vec<u8>,
    /// 16-byte authentication tag.
    pub tag: [u8; TAG_LEN],
}

/// Fills a fresh random nonce of `N` bytes from OS entropy.
pub fn random_nonce<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    OsRng.fill_bytes(&mut out);
    out
}

fn tag_from_slice(tag: &[u8]) -> Result<[u8; TAG_LEN]> {
    tag.try_into().map_err(|_| PlebwireError::EncryptionError {
        reason: format!("tag must be {TAG_LEN} bytes, got {}", tag.len()),
    })
}

// ---------------------------------------------------------------------------
// AES-128-GCM
// ---------------------------------------------------------------------------

/// Encrypts with AES-128-GCM.
///
/// # Errors
///
/// `EncryptionError` if the cipher rejects the input length.
pub fn encrypt_aes128_gcm(
    key: &[u8; 16],
    nonce: &[u8; AES_GCM_NONCE_LEN],
    plaintext: &[u8],
) -> Result<DetachedCiphertext> {
    let cipher = Aes128Gcm::new(GenericArray::from_slice(key));
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(nonce), &[], &mut buffer)
        .map_err(|e| PlebwireError::EncryptionError {
            reason: format!("AES-GCM encryption failed: {e}"),
        })?;
    let mut detached = [0u8; TAG_LEN];
    detached.copy_from_slice(&tag);
    Ok(DetachedCiphertext {
        ciphertext: buffer,
        tag: detached,
    })
}

/// Decrypts AES-128-GCM and checks the tag.
///
/// # Errors
///
/// `EncryptionError` on a malformed nonce or tag, or on tag mismatch
/// (wrong key, tampered ciphertext).
pub fn decrypt_aes128_gcm(key: &[u8; 16], nonce: &[u8], ciphertext: &[u8], tag: &[u8]) -> Result<Vec<u8>> {
    if nonce.len() != AES_GCM_NONCE_LEN {
        return Err(PlebwireError::EncryptionError {
            reason: format!("AES-GCM nonce must be {AES_GCM_NONCE_LEN} bytes, got {}", nonce.len()),
        });
    }
    let tag = tag_from_slice(tag)?;
    let cipher = Aes128Gcm::new(GenericArray::from_slice(key));
    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            &[],
            &mut buffer,
            GenericArray::from_slice(&tag),
        )
        .map_err(|e| PlebwireError::EncryptionError {
            reason: format!("AES-GCM decryption failed: {e}"),
        })?;
    Ok(buffer)
}

// ---------------------------------------------------------------------------
// XChaCha20-Poly1305
// ---------------------------------------------------------------------------

/// Encrypts with XChaCha20-Poly1305.
///
/// # Errors
///
/// `EncryptionError` if the cipher rejects the input length.
pub fn encrypt_xchacha20(
    key: &[u8; 32],
    nonce: &[u8; XCHACHA_NONCE_LEN],
    plaintext: &[u8],
) -> Result<DetachedCiphertext> {
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key));
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(nonce), &[], &mut buffer)
        .map_err(|e| PlebwireError::EncryptionError {
            reason: format!("XChaCha20-Poly1305 encryption failed: {e}"),
        })?;
    let mut detached = [0u8; TAG_LEN];
    detached.copy_from_slice(&tag);
    Ok(DetachedCiphertext {
        ciphertext: buffer,
        tag: detached,
    })
}

/// Decrypts XChaCha20-Poly1305 and checks the tag.
///
/// # Errors
///
/// `EncryptionError` on a malformed nonce or tag, or on tag mismatch.
pub fn decrypt_xchacha20(key: &[u8; 32], nonce: &[u8], ciphertext: &[u8], tag: &[u8]) -> Result<Vec<u8>> {
    if nonce.len() != XCHACHA_NONCE_LEN {
        return Err(PlebwireError::EncryptionError {
            reason: format!("XChaCha20 nonce must be {XCHACHA_NONCE_LEN} bytes, got {}", nonce.len()),
        });
    }
    let tag = tag_from_slice(tag)?;
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key));
    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            &[],
            &mut buffer,
            GenericArray::from_slice(&tag),
        )
        .map_err(|e| PlebwireError::EncryptionError {
            reason: format!("XChaCha20-Poly1305 decryption failed: {e}"),
        })?;
    Ok(buffer)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes_gcm_roundtrip() -> std::result::Result<(), PlebwireError> {
        let key = [0x42u8; 16];
        let nonce = random_nonce::<AES_GCM_NONCE_LEN>();
        let sealed = encrypt_aes128_gcm(&key, &nonce, b"hello")?;
        assert_eq!(sealed.ciphertext.len(), 5);
        let opened = decrypt_aes128_gcm(&key, &nonce, &sealed.ciphertext, &sealed.tag)?;
        assert_eq!(opened, b"hello");
        Ok(())
    }

    #[test]
    fn aes_gcm_tampered_tag_fails() -> std::result::Result<(), PlebwireError> {
        let key = [0x42u8; 16];
        let nonce = [0u8; AES_GCM_NONCE_LEN];
        let mut sealed = encrypt_aes128_gcm(&key, &nonce, b"secret")?;
        sealed.tag[0] ^= 0x01;
        let result = decrypt_aes128_gcm(&key, &nonce, &sealed.ciphertext, &sealed.tag);
        assert!(matches!(result, Err(PlebwireError::EncryptionError { .. })));
        Ok(())
    }

    #[test]
    fn aes_gcm_wrong_nonce_length_rejected() {
        let result = decrypt_aes128_gcm(&[0u8; 16], &[0u8; 11], b"", &[0u8; 16]);
        assert!(result.is_err());
    }

    /// NIST GCM test case 2: zero key, zero nonce, 16 zero bytes.
    #[test]
    fn aes_gcm_known_vector() -> std::result::Result<(), PlebwireError> {
        let sealed = encrypt_aes128_gcm(&[0u8; 16], &[0u8; 12], &[0u8; 16])?;
        assert_eq!(hex::encode(&sealed.ciphertext), "0388dace60b6a392f328c2b971b2fe78");
        assert_eq!(hex::encode(sealed.tag), "ab6e47d42cec13bdf53a67b21257bddf");
        Ok(())
    }

    #[test]
    fn xchacha_roundtrip_and_tamper() -> std::result::Result<(), PlebwireError> {
        let key = [0x07u8; 32];
        let nonce = random_nonce::<XCHACHA_NONCE_LEN>();
        let sealed = encrypt_xchacha20(&key, &nonce, b"payload")?;
        assert_eq!(decrypt_xchacha20(&key, &nonce, &sealed.ciphertext, &sealed.tag)?, b"payload");

        let mut tampered = sealed.ciphertext.clone();
        tampered[0] ^= 0xFF;
        assert!(decrypt_xchacha20(&key, &nonce, &tampered, &sealed.tag).is_err());
        Ok(())
    }

    #[test]
    fn xchacha_wrong_key_fails() -> std::result::Result<(), PlebwireError> {
        let nonce = [0u8; XCHACHA_NONCE_LEN];
        let sealed = encrypt_xchacha20(&[1u8; 32], &nonce, b"x")?;
        assert!(decrypt_xchacha20(&[2u8; 32], &nonce, &sealed.ciphertext, &sealed.tag).is_err());
        Ok(())
    }

    #[test]
    fn nonces_are_random() {
        assert_ne!(random_nonce::<24>(), random_nonce::<24>());
    }
}
