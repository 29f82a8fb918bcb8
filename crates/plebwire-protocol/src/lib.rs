//! Wire protocol for plebwire subplebbits.
//!
//! Defines what travels between publishers and subplebbits and what a
//! subplebbit writes to its content store, plus the rules for signing,
//! encrypting and accepting each of those objects.
//!
//! # Modules
//!
//! - [`canonical`]: deterministic CBOR of field subsets, CBOR framing
//! - [`signature`]: `SignatureRecord`, algorithm table, object signing
//! - [`encryption`]: `EncryptedEnvelope`, scheme table, JSON payloads
//! - [`publication`]: comments, votes, comment edits
//! - [`message`]: the four challenge exchange messages
//! - [`record`]: comment, update, index and page records
//! - [`validation`]: acceptance rules
//! - [`request_cache`]: duplicate request suppression

pub mod canonical;
pub mod encryption;
pub mod message;
pub mod publication;
pub mod record;
pub mod request_cache;
pub mod signature;
pub mod validation;
