//! The four pubsub messages of a challenge exchange.
//!
//! Messages are a closed set of tagged structs, each with an explicit
//! `type` field. On the wire they are CBOR maps; [`PubsubMessage::decode`]
//! reads the `type` first and then decodes the full struct, rejecting
//! anything whose tag is unknown or whose shape does not match.
//!
//! Every message is signed over all of its present fields. The
//! encrypted payloads are JSON documents:
//!
//! | message                | payload                                   |
//! |------------------------|-------------------------------------------|
//! | `CHALLENGEREQUEST`     | `{"comment"|"vote"|"commentEdit": {...}}` |
//! | `CHALLENGE`            | `{"challenges": [{challenge, type}]}`     |
//! | `CHALLENGEANSWER`      | `{"challengeAnswers": [string]}`          |
//! | `CHALLENGEVERIFICATION`| `{"comment", "commentUpdate"}` (optional) |

use plebwire_crypto::hash::sha256;
use plebwire_crypto::signing::{Keypair, PublicKey};
use plebwire_types::config::ProtocolConfig;
use plebwire_types::{PlebwireError, RequestId, Result, Timestamp};
use serde::{Deserialize, Serialize};

use crate::canonical::{from_cbor, to_cbor};
use crate::encryption::EncryptedEnvelope;
use crate::record::{CommentRecord, CommentUpdateRecord};
use crate::signature::{require_all_fields_signed, sign_all_fields, verify_signed, SignatureRecord, SignedObject};

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// Tag carried in every pubsub message's `type` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    ChallengeRequest,
    Challenge,
    ChallengeAnswer,
    ChallengeVerification,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ChallengeRequest => "CHALLENGEREQUEST",
            Self::Challenge => "CHALLENGE",
            Self::ChallengeAnswer => "CHALLENGEANSWER",
            Self::ChallengeVerification => "CHALLENGEVERIFICATION",
        };
        f.write_str(s)
    }
}

/// Derives the request id from the pubsub signer's public key.
///
/// Used when the signer is a fresh per-exchange key, so the id is both
/// unique and bound to that key.
pub fn request_id_for_signer(public_key: &PublicKey) -> RequestId {
    RequestId::from_bytes(sha256(public_key.as_bytes()).to_vec())
}

// ---------------------------------------------------------------------------
// Encrypted payloads
// ---------------------------------------------------------------------------

/// One challenge prompt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengePrompt {
    pub challenge: String,
    /// MIME-like type, e.g. `text/plain`.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Decrypted body of a `CHALLENGE`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengesPayload {
    pub challenges: Vec<ChallengePrompt>,
}

/// Decrypted body of a `CHALLENGEANSWER`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswersPayload {
    pub challenge_answers: Vec<String>,
}

/// Decrypted body of a successful comment `CHALLENGEVERIFICATION`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationPayload {
    pub comment: CommentRecord,
    pub comment_update: CommentUpdateRecord,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

macro_rules! signed_object {
    ($ty:ty) => {
        impl SignedObject for $ty {
            fn signature(&self) -> Option<&SignatureRecord> {
                self.signature.as_ref()
            }

            fn set_signature(&mut self, signature: SignatureRecord) {
                self.signature = Some(signature);
            }
        }
    };
}

/// First message: the encrypted publication.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequestMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub timestamp: Timestamp,
    pub challenge_request_id: RequestId,
    pub accepted_challenge_types: Vec<String>,
    pub encrypted: EncryptedEnvelope,
    pub protocol_version: String,
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureRecord>,
}

signed_object!(ChallengeRequestMessage);

impl ChallengeRequestMessage {
    /// Builds and signs a request.
    ///
    /// # Errors
    ///
    /// Propagates signing failures.
    pub fn create(
        challenge_request_id: RequestId,
        accepted_challenge_types: Vec<String>,
        encrypted: EncryptedEnvelope,
        config: &ProtocolConfig,
        signer: &Keypair,
    ) -> Result<Self> {
        let mut msg = Self {
            kind: MessageType::ChallengeRequest,
            timestamp: Timestamp::now(),
            challenge_request_id,
            accepted_challenge_types,
            encrypted,
            protocol_version: config.protocol_version.clone(),
            user_agent: config.user_agent.clone(),
            signature: None,
        };
        sign_all_fields(&mut msg, signer)?;
        Ok(msg)
    }
}

/// Second message: encrypted challenge prompts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub timestamp: Timestamp,
    pub challenge_request_id: RequestId,
    pub encrypted: EncryptedEnvelope,
    pub protocol_version: String,
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureRecord>,
}

signed_object!(ChallengeMessage);

impl ChallengeMessage {
    /// Builds and signs a challenge.
    ///
    /// # Errors
    ///
    /// Propagates signing failures.
    pub fn create(
        challenge_request_id: RequestId,
        encrypted: EncryptedEnvelope,
        config: &ProtocolConfig,
        signer: &Keypair,
    ) -> Result<Self> {
        let mut msg = Self {
            kind: MessageType::Challenge,
            timestamp: Timestamp::now(),
            challenge_request_id,
            encrypted,
            protocol_version: config.protocol_version.clone(),
            user_agent: config.user_agent.clone(),
            signature: None,
        };
        sign_all_fields(&mut msg, signer)?;
        Ok(msg)
    }
}

/// Third message: encrypted answers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeAnswerMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub timestamp: Timestamp,
    pub challenge_request_id: RequestId,
    pub encrypted: EncryptedEnvelope,
    pub protocol_version: String,
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureRecord>,
}

signed_object!(ChallengeAnswerMessage);

impl ChallengeAnswerMessage {
    /// Builds and signs an answer.
    ///
    /// # Errors
    ///
    /// Propagates signing failures.
    pub fn create(
        challenge_request_id: RequestId,
        encrypted: EncryptedEnvelope,
        config: &ProtocolConfig,
        signer: &Keypair,
    ) -> Result<Self> {
        let mut msg = Self {
            kind: MessageType::ChallengeAnswer,
            timestamp: Timestamp::now(),
            challenge_request_id,
            encrypted,
            protocol_version: config.protocol_version.clone(),
            user_agent: config.user_agent.clone(),
            signature: None,
        };
        sign_all_fields(&mut msg, signer)?;
        Ok(msg)
    }
}

/// Final message: the outcome of the exchange.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeVerificationMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub timestamp: Timestamp,
    pub challenge_request_id: RequestId,
    pub challenge_success: bool,
    /// One slot per challenge; `Some(reason)` for each failed answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_errors: Option<Vec<Option<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Present only on success for a comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<EncryptedEnvelope>,
    pub protocol_version: String,
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureRecord>,
}

signed_object!(ChallengeVerificationMessage);

/// Outcome fields of a verification.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub challenge_success: bool,
    pub challenge_errors: Option<Vec<Option<String>>>,
    pub reason: Option<String>,
    pub encrypted: Option<EncryptedEnvelope>,
}

impl ChallengeVerificationMessage {
    /// Builds and signs a verification.
    ///
    /// # Errors
    ///
    /// Propagates signing failures.
    pub fn create(
        challenge_request_id: RequestId,
        outcome: VerificationOutcome,
        config: &ProtocolConfig,
        signer: &Keypair,
    ) -> Result<Self> {
        let mut msg = Self {
            kind: MessageType::ChallengeVerification,
            timestamp: Timestamp::now(),
            challenge_request_id,
            challenge_success: outcome.challenge_success,
            challenge_errors: outcome.challenge_errors,
            reason: outcome.reason,
            encrypted: outcome.encrypted,
            protocol_version: config.protocol_version.clone(),
            user_agent: config.user_agent.clone(),
            signature: None,
        };
        sign_all_fields(&mut msg, signer)?;
        Ok(msg)
    }
}

// ---------------------------------------------------------------------------
// PubsubMessage
// ---------------------------------------------------------------------------

/// Any of the four exchange messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PubsubMessage {
    ChallengeRequest(ChallengeRequestMessage),
    Challenge(ChallengeMessage),
    ChallengeAnswer(ChallengeAnswerMessage),
    ChallengeVerification(ChallengeVerificationMessage),
}

#[derive(Deserialize)]
struct TypeProbe {
    #[serde(rename = "type")]
    kind: MessageType,
}

impl PubsubMessage {
    /// The message tag.
    pub fn kind(&self) -> MessageType {
        match self {
            Self::ChallengeRequest(_) => MessageType::ChallengeRequest,
            Self::Challenge(_) => MessageType::Challenge,
            Self::ChallengeAnswer(_) => MessageType::ChallengeAnswer,
            Self::ChallengeVerification(_) => MessageType::ChallengeVerification,
        }
    }

    /// The exchange this message belongs to.
    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::ChallengeRequest(m) => &m.challenge_request_id,
            Self::Challenge(m) => &m.challenge_request_id,
            Self::ChallengeAnswer(m) => &m.challenge_request_id,
            Self::ChallengeVerification(m) => &m.challenge_request_id,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::ChallengeRequest(m) => m.timestamp,
            Self::Challenge(m) => m.timestamp,
            Self::ChallengeAnswer(m) => m.timestamp,
            Self::ChallengeVerification(m) => m.timestamp,
        }
    }

    pub fn signature(&self) -> Option<&SignatureRecord> {
        match self {
            Self::ChallengeRequest(m) => m.signature.as_ref(),
            Self::Challenge(m) => m.signature.as_ref(),
            Self::ChallengeAnswer(m) => m.signature.as_ref(),
            Self::ChallengeVerification(m) => m.signature.as_ref(),
        }
    }

    /// Verifies the signature and that it covers every present field.
    pub fn verify_signature(&self) -> bool {
        fn check<T: SignedObject>(m: &T) -> bool {
            verify_signed(m) && require_all_fields_signed(m, &[]).is_ok()
        }
        match self {
            Self::ChallengeRequest(m) => check(m),
            Self::Challenge(m) => check(m),
            Self::ChallengeAnswer(m) => check(m),
            Self::ChallengeVerification(m) => check(m),
        }
    }

    /// The signer's Ed25519 public key.
    ///
    /// # Errors
    ///
    /// `SignatureError` if unsigned or not Ed25519.
    pub fn signer_public_key(&self) -> Result<PublicKey> {
        self.signature()
            .ok_or_else(|| PlebwireError::SignatureError {
                reason: "missing signature".into(),
            })?
            .ed25519_public_key()
    }

    /// Encodes to a CBOR frame.
    ///
    /// # Errors
    ///
    /// `ProtocolError` if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Self::ChallengeRequest(m) => to_cbor(m),
            Self::Challenge(m) => to_cbor(m),
            Self::ChallengeAnswer(m) => to_cbor(m),
            Self::ChallengeVerification(m) => to_cbor(m),
        }
    }

    /// Decodes a CBOR frame.
    ///
    /// # Errors
    ///
    /// `ProtocolError` for an unknown `type` or a malformed body.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let probe: TypeProbe = from_cbor(bytes)?;
        Ok(match probe.kind {
            MessageType::ChallengeRequest => Self::ChallengeRequest(from_cbor(bytes)?),
            MessageType::Challenge => Self::Challenge(from_cbor(bytes)?),
            MessageType::ChallengeAnswer => Self::ChallengeAnswer(from_cbor(bytes)?),
            MessageType::ChallengeVerification => Self::ChallengeVerification(from_cbor(bytes)?),
        })
    }
}

impl From<ChallengeRequestMessage> for PubsubMessage {
    fn from(m: ChallengeRequestMessage) -> Self {
        Self::ChallengeRequest(m)
    }
}

impl From<ChallengeMessage> for PubsubMessage {
    fn from(m: ChallengeMessage) -> Self {
        Self::Challenge(m)
    }
}

impl From<ChallengeAnswerMessage> for PubsubMessage {
    fn from(m: ChallengeAnswerMessage) -> Self {
        Self::ChallengeAnswer(m)
    }
}

impl From<ChallengeVerificationMessage> for PubsubMessage {
    fn from(m: ChallengeVerificationMessage) -> Self {
        Self::ChallengeVerification(m)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::{encrypt_json, ED25519_AES_GCM};

    fn envelope(signer: &Keypair, to: &Keypair) -> std::result::Result<EncryptedEnvelope, PlebwireError> {
        encrypt_json(&AnswersPayload { challenge_answers: vec!["2".into()] }, signer, &to.public_key(), ED25519_AES_GCM)
    }

    #[test]
    fn request_frame_roundtrip_and_verify() -> std::result::Result<(), PlebwireError> {
        let signer = Keypair::from_seed(&[3; 32]);
        let sub = Keypair::from_seed(&[4; 32]);
        let config = ProtocolConfig::default();
        let msg = ChallengeRequestMessage::create(
            request_id_for_signer(&signer.public_key()),
            vec!["text/plain".into()],
            envelope(&signer, &sub)?,
            &config,
            &signer,
        )?;
        let frame = PubsubMessage::from(msg.clone()).encode()?;
        let decoded = PubsubMessage::decode(&frame)?;
        assert_eq!(decoded.kind(), MessageType::ChallengeRequest);
        assert_eq!(decoded, PubsubMessage::ChallengeRequest(msg));
        assert!(decoded.verify_signature());
        assert_eq!(decoded.signer_public_key()?, signer.public_key());
        Ok(())
    }

    #[test]
    fn single_byte_tamper_fails() -> std::result::Result<(), PlebwireError> {
        let signer = Keypair::from_seed(&[3; 32]);
        let sub = Keypair::from_seed(&[4; 32]);
        let msg = ChallengeAnswerMessage::create(
            RequestId::generate(),
            envelope(&signer, &sub)?,
            &ProtocolConfig::default(),
            &signer,
        )?;
        let mut tampered = msg.clone();
        tampered.encrypted.ciphertext[0] ^= 0x01;
        assert!(PubsubMessage::from(msg).verify_signature());
        assert!(!PubsubMessage::from(tampered).verify_signature());
        Ok(())
    }

    #[test]
    fn unsigned_extra_field_rejected() -> std::result::Result<(), PlebwireError> {
        let sub = Keypair::from_seed(&[4; 32]);
        let mut msg = ChallengeVerificationMessage::create(
            RequestId::generate(),
            VerificationOutcome {
                challenge_success: false,
                ..VerificationOutcome::default()
            },
            &ProtocolConfig::default(),
            &sub,
        )?;
        msg.reason = Some("injected".into());
        assert!(!PubsubMessage::from(msg).verify_signature());
        Ok(())
    }

    #[test]
    fn unknown_type_rejected() -> std::result::Result<(), PlebwireError> {
        #[derive(Serialize)]
        struct Bogus {
            #[serde(rename = "type")]
            kind: &'static str,
        }
        let frame = to_cbor(&Bogus { kind: "HELLO" })?;
        assert!(PubsubMessage::decode(&frame).is_err());
        assert!(PubsubMessage::decode(b"\xff\x00garbage").is_err());
        Ok(())
    }

    #[test]
    fn type_tags_render_uppercase() -> std::result::Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_string(&MessageType::ChallengeVerification)?, "\"CHALLENGEVERIFICATION\"");
        assert_eq!(MessageType::ChallengeRequest.to_string(), "CHALLENGEREQUEST");
        Ok(())
    }

    #[test]
    fn request_id_is_bound_to_signer() {
        let a = Keypair::from_seed(&[1; 32]);
        let b = Keypair::from_seed(&[2; 32]);
        assert_eq!(request_id_for_signer(&a.public_key()), request_id_for_signer(&a.public_key()));
        assert_ne!(request_id_for_signer(&a.public_key()), request_id_for_signer(&b.public_key()));
    }
}
