//! Integration tests for signing, encryption and message framing.
//!
//! All keypairs come from fixed seeds.

use plebwire_crypto::signing::Keypair;
use plebwire_protocol::canonical::signing_input;
use plebwire_protocol::encryption::{
    decrypt, decrypt_json, encrypt, encrypt_json, ED25519_AES_GCM, ED25519_XCHACHA20_POLY1305,
};
use plebwire_protocol::message::{
    request_id_for_signer, ChallengeRequestMessage, PubsubMessage,
};
use plebwire_protocol::publication::{Author, Comment, Publication};
use plebwire_protocol::signature::{sign_object, verify_object};
use plebwire_protocol::validation::validate_publication;
use plebwire_types::config::ProtocolConfig;
use plebwire_types::{PlebwireError, Timestamp};
use rand::seq::SliceRandom;

// ---------------------------------------------------------------------------
// Keypairs
// ---------------------------------------------------------------------------

fn subplebbit() -> Keypair {
    Keypair::from_seed(&[0x10; 32])
}

fn author() -> Keypair {
    Keypair::from_seed(&[0x42; 32])
}

fn pubsub_signer() -> Keypair {
    Keypair::from_seed(&[0x77; 32])
}

fn comment() -> Comment {
    Comment::new(subplebbit().address(), Author::new(author().address()), Timestamp::now(), "1.0.0")
        .with_title("title")
        .with_content("content")
}

const NAMES: [&str; 6] = ["subplebbitAddress", "timestamp", "protocolVersion", "content", "title", "author"];

// ---------------------------------------------------------------------------
// 1. Signing input is independent of name order
// ---------------------------------------------------------------------------

#[test]
fn shuffled_names_produce_identical_input() -> std::result::Result<(), PlebwireError> {
    let c = comment();
    let reference = signing_input(&c, &NAMES)?;
    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        let mut names = NAMES.to_vec();
        names.shuffle(&mut rng);
        assert_eq!(signing_input(&c, &names)?, reference);
    }
    Ok(())
}

#[test]
fn signature_made_with_one_order_verifies_with_another() -> std::result::Result<(), PlebwireError> {
    let c = comment();
    let mut record = sign_object(&c, &NAMES, &author())?;
    record.signed_property_names.reverse();
    assert!(verify_object(&c, &record));
    Ok(())
}

// ---------------------------------------------------------------------------
// 2. Any single-byte change to a signed field fails
// ---------------------------------------------------------------------------

#[test]
fn single_byte_changes_are_detected() -> std::result::Result<(), PlebwireError> {
    let c = comment();
    let record = sign_object(&c, &NAMES, &author())?;
    let original = c.content.clone().unwrap_or_default();
    for i in 0..original.len() {
        let mut bytes = original.clone().into_bytes();
        bytes[i] ^= 0x01;
        let mut tampered = c.clone();
        tampered.content = Some(String::from_utf8_lossy(&bytes).into_owned());
        assert!(!verify_object(&tampered, &record), "byte {i} change went unnoticed");
    }

    let mut bad_sig = record.clone();
    bad_sig.signature[0] ^= 0x01;
    assert!(!verify_object(&c, &bad_sig));
    Ok(())
}

#[test]
fn signature_survives_json_and_cbor_transport() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let kp = author();
    let signed = comment().sign(&kp)?;
    let json = serde_json::to_vec(&Publication::Comment(signed))?;
    let parsed = Publication::from_json(&json)?;
    assert!(parsed.verify_signature());

    let mut cbor = Vec::new();
    ciborium::into_writer(&parsed, &mut cbor)?;
    let back: Publication = ciborium::from_reader(cbor.as_slice())?;
    assert!(back.verify_signature());
    validate_publication(&back, &subplebbit().address(), &ProtocolConfig::default(), Timestamp::now())?;
    Ok(())
}

// ---------------------------------------------------------------------------
// 3. Encryption round trip
// ---------------------------------------------------------------------------

#[test]
fn encrypt_decrypt_roundtrip_all_schemes() -> std::result::Result<(), PlebwireError> {
    let plaintext = vec![0x5Au8; 4096];
    for scheme in [ED25519_AES_GCM, ED25519_XCHACHA20_POLY1305] {
        let env = encrypt(&plaintext, &pubsub_signer(), &subplebbit().public_key(), scheme)?;
        assert_eq!(decrypt(&env, &subplebbit(), &pubsub_signer().public_key())?, plaintext);
    }
    Ok(())
}

#[test]
fn wrong_sender_key_fails() -> std::result::Result<(), PlebwireError> {
    let env = encrypt(b"x", &pubsub_signer(), &subplebbit().public_key(), ED25519_AES_GCM)?;
    assert!(decrypt(&env, &subplebbit(), &author().public_key()).is_err());
    Ok(())
}

// ---------------------------------------------------------------------------
// 4. Full request frame
// ---------------------------------------------------------------------------

#[test]
fn request_frame_carries_decryptable_publication() -> std::result::Result<(), PlebwireError> {
    let config = ProtocolConfig::default();
    let signer = pubsub_signer();
    let publication = Publication::Comment(comment().sign(&author())?);
    let encrypted = encrypt_json(&publication, &signer, &subplebbit().public_key(), &config.encryption_type)?;
    let msg = ChallengeRequestMessage::create(
        request_id_for_signer(&signer.public_key()),
        vec!["text/plain".into()],
        encrypted,
        &config,
        &signer,
    )?;

    let frame = PubsubMessage::from(msg).encode()?;
    let PubsubMessage::ChallengeRequest(received) = PubsubMessage::decode(&frame)? else {
        return Err(PlebwireError::ProtocolError { reason: "wrong message type".into() });
    };
    let sender = PubsubMessage::ChallengeRequest(received.clone()).signer_public_key()?;
    let decrypted: Publication = decrypt_json(&received.encrypted, &subplebbit(), &sender)?;
    assert_eq!(decrypted, publication);
    assert_eq!(received.challenge_request_id, request_id_for_signer(&sender));
    Ok(())
}
