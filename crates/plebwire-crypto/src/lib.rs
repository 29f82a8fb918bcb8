//! Cryptographic primitives for the plebwire publication protocol.
//!
//! This crate is the only place in the workspace that touches raw
//! cryptography. Higher layers (canonical signing, payload encryption)
//! compose these functions and never call the underlying crates.
//!
//! # Modules
//!
//! - [`signing`]: Ed25519 keypairs, signing, verification, address derivation
//! - [`ecdh`]: static X25519 agreement derived from Ed25519 keys
//! - [`aead`]: AES-128-GCM and XChaCha20-Poly1305 with detached tags
//! - [`hkdf`]: HKDF-SHA256 key derivation
//! - [`hash`]: SHA-256 / SHA3-256 and content id computation

pub mod aead;
pub mod ecdh;
pub mod hash;
pub mod hkdf;
pub mod signing;
