//! Field-subset signatures over canonical CBOR.
//!
//! A [`SignatureRecord`] travels with every signed object. It names the
//! algorithm (`type`), carries the signer's public key, the signature
//! bytes, and the list of fields the signature covers. Verification
//! recomputes the canonical input from that list, so the verifier never
//! needs to know in advance which fields were signed.
//!
//! Algorithms are looked up in a capability table keyed by the `type`
//! tag. Unknown tags verify as `false`.

use plebwire_crypto::signing::{pubkey_to_address, verify, Keypair, PublicKey, Signature};
use plebwire_types::{Address, PlebwireError, Result};
use serde::{Deserialize, Serialize};

use crate::canonical::{present_field_names, signing_input};

/// Tag of the Ed25519 scheme.
pub const ED25519: &str = "ed25519";

/// Tag of the RSA scheme, recognised but not implemented.
pub const RSA: &str = "rsa";

// ---------------------------------------------------------------------------
// SignatureRecord
// ---------------------------------------------------------------------------

/// Signature attached to a publication, pubsub message or record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRecord {
    /// Raw signature bytes.
    #[serde(with = "plebwire_types::bytes")]
    pub signature: Vec<u8>,
    /// Signer public key bytes.
    #[serde(with = "plebwire_types::bytes")]
    pub public_key: Vec<u8>,
    /// Algorithm tag, e.g. `"ed25519"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Names of the fields covered by the signature.
    pub signed_property_names: Vec<String>,
}

impl SignatureRecord {
    /// Derives the signer's address from the embedded public key.
    ///
    /// Returns `None` if the key is not a well-formed Ed25519 key.
    pub fn signer_address(&self) -> Option<Address> {
        if self.kind != ED25519 {
            return None;
        }
        PublicKey::from_slice(&self.public_key)
            .ok()
            .map(|pk| pubkey_to_address(&pk))
    }

    /// Parses the embedded public key as Ed25519.
    ///
    /// # Errors
    ///
    /// `SignatureError` if the scheme is not Ed25519 or the key length
    /// is wrong.
    pub fn ed25519_public_key(&self) -> Result<PublicKey> {
        if self.kind != ED25519 {
            return Err(PlebwireError::SignatureError {
                reason: format!("expected ed25519 signature, got {}", self.kind),
            });
        }
        PublicKey::from_slice(&self.public_key)
    }

    /// Whether the signature covers `name`.
    pub fn covers(&self, name: &str) -> bool {
        self.signed_property_names.iter().any(|n| n == name)
    }
}

// ---------------------------------------------------------------------------
// Capability table
// ---------------------------------------------------------------------------

/// A signature algorithm addressed by its tag.
pub trait SignatureScheme: Send + Sync {
    /// Wire tag of this algorithm.
    fn tag(&self) -> &'static str;

    /// Signs `message`, returning `(signature, public_key)` bytes.
    ///
    /// # Errors
    ///
    /// `SignatureError` if the scheme cannot sign with this key.
    fn sign(&self, message: &[u8], keypair: &Keypair) -> Result<(Vec<u8>, Vec<u8>)>;

    /// Verifies `signature` over `message`. Never errors.
    fn verify(&self, message: &[u8], public_key: &[u8], signature: &[u8]) -> bool;
}

struct Ed25519Scheme;

impl SignatureScheme for Ed25519Scheme {
    fn tag(&self) -> &'static str {
        ED25519
    }

    fn sign(&self, message: &[u8], keypair: &Keypair) -> Result<(Vec<u8>, Vec<u8>)> {
        let signature = keypair.sign(message);
        Ok((
            signature.as_bytes().to_vec(),
            keypair.public_key().as_bytes().to_vec(),
        ))
    }

    fn verify(&self, message: &[u8], public_key: &[u8], signature: &[u8]) -> bool {
        let (Ok(pk), Ok(sig)) = (PublicKey::from_slice(public_key), Signature::from_slice(signature))
        else {
            return false;
        };
        verify(&pk, message, &sig).is_ok()
    }
}

struct RsaScheme;

impl SignatureScheme for RsaScheme {
    fn tag(&self) -> &'static str {
        RSA
    }

    fn sign(&self, _message: &[u8], _keypair: &Keypair) -> Result<(Vec<u8>, Vec<u8>)> {
        Err(PlebwireError::SignatureError {
            reason: "rsa signatures are not supported".into(),
        })
    }

    fn verify(&self, _message: &[u8], _public_key: &[u8], _signature: &[u8]) -> bool {
        false
    }
}

static SCHEMES: [&dyn SignatureScheme; 2] = [&Ed25519Scheme, &RsaScheme];

/// Looks up a signature scheme by tag.
pub fn scheme_for(tag: &str) -> Option<&'static dyn SignatureScheme> {
    SCHEMES.iter().copied().find(|s| s.tag() == tag)
}

// ---------------------------------------------------------------------------
// Object signing
// ---------------------------------------------------------------------------

/// Signs the fields of `obj` named in `names` with Ed25519.
///
/// # Errors
///
/// `ProtocolError` if `obj` is not a map.
pub fn sign_object<T, S>(obj: &T, names: &[S], keypair: &Keypair) -> Result<SignatureRecord>
where
    T: Serialize + ?Sized,
    S: AsRef<str>,
{
    sign_object_with(obj, names, keypair, ED25519)
}

/// Signs with an explicit scheme tag.
///
/// # Errors
///
/// `SignatureError` for an unknown or unsupported tag, `ProtocolError`
/// if `obj` is not a map.
pub fn sign_object_with<T, S>(obj: &T, names: &[S], keypair: &Keypair, tag: &str) -> Result<SignatureRecord>
where
    T: Serialize + ?Sized,
    S: AsRef<str>,
{
    let scheme = scheme_for(tag).ok_or_else(|| PlebwireError::SignatureError {
        reason: format!("unknown signature type {tag}"),
    })?;
    let input = signing_input(obj, names)?;
    let (signature, public_key) = scheme.sign(&input, keypair)?;
    Ok(SignatureRecord {
        signature,
        public_key,
        kind: tag.to_owned(),
        signed_property_names: names.iter().map(|n| n.as_ref().to_owned()).collect(),
    })
}

/// Verifies `record` against `obj`.
///
/// Returns `false` for any failure: tampered fields, wrong key, unknown
/// algorithm, malformed key material.
pub fn verify_object<T: Serialize + ?Sized>(obj: &T, record: &SignatureRecord) -> bool {
    let Some(scheme) = scheme_for(&record.kind) else {
        return false;
    };
    let Ok(input) = signing_input(obj, &record.signed_property_names) else {
        return false;
    };
    scheme.verify(&input, &record.public_key, &record.signature)
}

// ---------------------------------------------------------------------------
// SignedObject
// ---------------------------------------------------------------------------

/// An object that carries its own `signature` field.
pub trait SignedObject: Serialize {
    /// The attached signature, if signed.
    fn signature(&self) -> Option<&SignatureRecord>;

    /// Attaches a signature.
    fn set_signature(&mut self, signature: SignatureRecord);
}

/// Signs `obj` over `allowed` names that are present, then attaches the
/// signature.
///
/// # Errors
///
/// Propagates signing failures.
pub fn sign_fields<T: SignedObject>(obj: &mut T, allowed: &[&str], keypair: &Keypair) -> Result<()> {
    let names: Vec<String> = present_field_names(obj)?
        .into_iter()
        .filter(|n| allowed.contains(&n.as_str()))
        .collect();
    let record = sign_object(obj, &names, keypair)?;
    obj.set_signature(record);
    Ok(())
}

/// Signs every present field of `obj` except `signature`.
///
/// # Errors
///
/// Propagates signing failures.
pub fn sign_all_fields<T: SignedObject>(obj: &mut T, keypair: &Keypair) -> Result<()> {
    let names = present_field_names(obj)?;
    let record = sign_object(obj, &names, keypair)?;
    obj.set_signature(record);
    Ok(())
}

/// Verifies the attached signature. Unsigned objects do not verify.
pub fn verify_signed<T: SignedObject>(obj: &T) -> bool {
    obj.signature().map_or(false, |sig| verify_object(obj, sig))
}

/// Checks that the attached signature covers every present field.
///
/// # Errors
///
/// `SignatureError` naming the first uncovered field, or if unsigned.
pub fn require_all_fields_signed<T: SignedObject>(obj: &T, exempt: &[&str]) -> Result<()> {
    let sig = obj.signature().ok_or_else(|| PlebwireError::SignatureError {
        reason: "missing signature".into(),
    })?;
    for name in present_field_names(obj)? {
        if !exempt.contains(&name.as_str()) && !sig.covers(&name) {
            return Err(PlebwireError::SignatureError {
                reason: format!("field {name} is not covered by the signature"),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Note {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        extra: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<SignatureRecord>,
    }

    impl SignedObject for Note {
        fn signature(&self) -> Option<&SignatureRecord> {
            self.signature.as_ref()
        }
        fn set_signature(&mut self, signature: SignatureRecord) {
            self.signature = Some(signature);
        }
    }

    fn note() -> Note {
        Note {
            text: "hi".into(),
            extra: Some("x".into()),
            signature: None,
        }
    }

    #[test]
    fn sign_then_verify() -> std::result::Result<(), PlebwireError> {
        let kp = Keypair::from_seed(&[0x42; 32]);
        let mut n = note();
        sign_all_fields(&mut n, &kp)?;
        assert!(verify_signed(&n));
        assert_eq!(
            n.signature.as_ref().map(|s| s.signer_address()),
            Some(Some(kp.address()))
        );
        Ok(())
    }

    #[test]
    fn tampering_breaks_verification() -> std::result::Result<(), PlebwireError> {
        let kp = Keypair::from_seed(&[0x42; 32]);
        let mut n = note();
        sign_all_fields(&mut n, &kp)?;
        n.text = "ho".into();
        assert!(!verify_signed(&n));
        Ok(())
    }

    #[test]
    fn unsigned_field_is_not_covered() -> std::result::Result<(), PlebwireError> {
        let kp = Keypair::from_seed(&[1; 32]);
        let mut n = note();
        sign_fields(&mut n, &["text"], &kp)?;
        assert!(verify_signed(&n));
        assert!(require_all_fields_signed(&n, &[]).is_err());
        assert!(require_all_fields_signed(&n, &["extra"]).is_ok());
        Ok(())
    }

    #[test]
    fn rsa_is_recognised_but_unsupported() -> std::result::Result<(), PlebwireError> {
        let kp = Keypair::from_seed(&[1; 32]);
        assert!(scheme_for(RSA).is_some());
        assert!(sign_object_with(&note(), &["text"], &kp, RSA).is_err());

        let mut record = sign_object(&note(), &["text"], &kp)?;
        record.kind = RSA.into();
        assert!(!verify_object(&note(), &record));
        Ok(())
    }

    #[test]
    fn unknown_tag_and_bad_key_do_not_verify() -> std::result::Result<(), PlebwireError> {
        let kp = Keypair::from_seed(&[1; 32]);
        let good = sign_object(&note(), &["text"], &kp)?;

        let mut unknown = good.clone();
        unknown.kind = "secp256k1".into();
        assert!(!verify_object(&note(), &unknown));

        let mut short_key = good;
        short_key.public_key.truncate(10);
        assert!(!verify_object(&note(), &short_key));
        Ok(())
    }

    #[test]
    fn record_json_uses_camel_case_and_base64() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let kp = Keypair::from_seed(&[1; 32]);
        let record = sign_object(&note(), &["text"], &kp)?;
        let json = serde_json::to_value(&record)?;
        assert_eq!(json["type"], "ed25519");
        assert!(json["publicKey"].is_string());
        assert_eq!(json["signedPropertyNames"][0], "text");
        let back: SignatureRecord = serde_json::from_value(json)?;
        assert_eq!(back, record);
        Ok(())
    }
}
