//! Acceptance checks for publications, pubsub messages and records.
//!
//! Signature verification alone only proves that *some* key signed
//! *some* subset of fields. These checks add the binding rules: the
//! signer must be the claimed author (or the subplebbit itself), every
//! present field must be covered, and the object must be addressed to
//! the right subplebbit and comment.

use plebwire_types::config::ProtocolConfig;
use plebwire_types::{Address, ContentId, PlebwireError, Result, Timestamp};

use crate::publication::{Comment, CommentEdit, Publication, Vote};
use crate::record::{CommentUpdateRecord, SubplebbitIndexRecord};
use crate::signature::{require_all_fields_signed, verify_signed, SignedObject};

fn invalid(reason: impl Into<String>) -> PlebwireError {
    PlebwireError::InvalidPublication { reason: reason.into() }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Checks that `ts` lies within `max_skew_secs` of `now` in either
/// direction. A skew of `0` disables the check.
///
/// # Errors
///
/// `ProtocolError` if the timestamp is too far in the past or future.
pub fn validate_timestamp(ts: Timestamp, now: Timestamp, max_skew_secs: u64) -> Result<()> {
    if max_skew_secs == 0 {
        return Ok(());
    }
    if ts.age_at(now) > max_skew_secs {
        return Err(PlebwireError::ProtocolError {
            reason: format!("timestamp {ts} too far in the past (now {now})"),
        });
    }
    if now.age_at(ts) > max_skew_secs {
        return Err(PlebwireError::ProtocolError {
            reason: format!("timestamp {ts} too far in the future (now {now})"),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Publications
// ---------------------------------------------------------------------------

fn check_author_signature<T: SignedObject>(obj: &T, author: &Address) -> Result<()> {
    let sig = obj.signature().ok_or_else(|| invalid("publication is not signed"))?;
    if !verify_signed(obj) {
        return Err(invalid("author signature is invalid"));
    }
    require_all_fields_signed(obj, &[]).map_err(|e| invalid(e.to_string()))?;
    match sig.signer_address() {
        Some(signer) if signer == *author => Ok(()),
        _ => Err(invalid("author address does not match signature public key")),
    }
}

fn validate_comment(comment: &Comment) -> Result<()> {
    let has_body = [&comment.content, &comment.title, &comment.link]
        .iter()
        .any(|f| f.as_deref().map_or(false, |s| !s.is_empty()));
    if !has_body {
        return Err(invalid("comment needs content, title or link"));
    }
    if comment.depth.is_some() {
        return Err(invalid("depth is computed by the subplebbit"));
    }
    match (comment.parent_cid, comment.post_cid) {
        (None, None) | (Some(_), Some(_)) => {}
        (Some(_), None) => return Err(invalid("reply is missing postCid")),
        (None, Some(_)) => return Err(invalid("postCid without parentCid")),
    }
    check_author_signature(comment, &comment.author.address)
}

fn validate_vote(vote: &Vote) -> Result<()> {
    if !(-1..=1).contains(&vote.vote) {
        return Err(invalid(format!("vote must be -1, 0 or 1, got {}", vote.vote)));
    }
    check_author_signature(vote, &vote.author.address)
}

fn validate_edit(edit: &CommentEdit) -> Result<()> {
    if !edit.has_author_fields() && !edit.has_moderator_fields() {
        return Err(invalid("comment edit changes nothing"));
    }
    check_author_signature(edit, &edit.author.address)
}

/// Runs every stateless acceptance check on a decrypted publication.
///
/// # Errors
///
/// `InvalidPublication` describing the first failed rule.
pub fn validate_publication(publication: &Publication, subplebbit: &Address, config: &ProtocolConfig, now: Timestamp) -> Result<()> {
    if publication.subplebbit_address() != subplebbit {
        return Err(invalid("publication is addressed to another subplebbit"));
    }
    validate_timestamp(publication.timestamp(), now, config.max_timestamp_skew_secs)
        .map_err(|e| invalid(e.to_string()))?;
    match publication {
        Publication::Comment(c) => validate_comment(c),
        Publication::Vote(v) => validate_vote(v),
        Publication::CommentEdit(e) => validate_edit(e),
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Validates a resolved index record against the address it was
/// resolved from.
///
/// # Errors
///
/// `SignatureError` if the signature is invalid, does not cover every
/// field, or was made by a key other than the one behind `expected`.
pub fn validate_index_record(record: &SubplebbitIndexRecord, expected: &Address) -> Result<()> {
    if !verify_signed(record) {
        return Err(PlebwireError::SignatureError {
            reason: "subplebbit index signature is invalid".into(),
        });
    }
    require_all_fields_signed(record, &[])?;
    let signer = record.signature.as_ref().and_then(|s| s.signer_address());
    if signer != Some(*expected) || record.address != *expected {
        return Err(PlebwireError::SignatureError {
            reason: format!("subplebbit index is not signed by {expected}"),
        });
    }
    Ok(())
}

/// Validates a comment update against the subplebbit and comment it
/// claims to describe.
///
/// # Errors
///
/// `SignatureError` for a bad or foreign signature, `ProtocolError` if
/// `cid` does not match.
pub fn validate_comment_update(update: &CommentUpdateRecord, subplebbit: &Address, expected_cid: &ContentId) -> Result<()> {
    if update.cid != *expected_cid {
        return Err(PlebwireError::ProtocolError {
            reason: format!("update is for {} not {expected_cid}", update.cid),
        });
    }
    if !verify_signed(update) {
        return Err(PlebwireError::SignatureError {
            reason: "comment update signature is invalid".into(),
        });
    }
    require_all_fields_signed(update, &[])?;
    let signer = update.signature.as_ref().and_then(|s| s.signer_address());
    if signer != Some(*subplebbit) {
        return Err(PlebwireError::SignatureError {
            reason: "comment update is not signed by the subplebbit".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publication::Author;
    use plebwire_crypto::signing::Keypair;

    const NOW: u64 = 1_700_000_000;

    fn author() -> Keypair {
        Keypair::from_seed(&[0x42; 32])
    }

    fn sub() -> Keypair {
        Keypair::from_seed(&[0x10; 32])
    }

    fn post(kp: &Keypair) -> Comment {
        Comment::new(sub().address(), Author::new(kp.address()), Timestamp::from_secs(NOW), "1.0.0")
            .with_title("title")
            .with_content("content")
    }

    fn check(p: &Publication) -> Result<()> {
        validate_publication(p, &sub().address(), &ProtocolConfig::default(), Timestamp::from_secs(NOW + 10))
    }

    #[test]
    fn valid_post_passes() -> std::result::Result<(), PlebwireError> {
        let kp = author();
        check(&Publication::Comment(post(&kp).sign(&kp)?))
    }

    #[test]
    fn impersonation_rejected() -> std::result::Result<(), PlebwireError> {
        let victim = Keypair::from_seed(&[0x99; 32]);
        let attacker = author();
        let mut c = post(&attacker);
        c.author = Author::new(victim.address());
        let c = c.sign(&attacker)?;
        assert!(matches!(check(&Publication::Comment(c)), Err(PlebwireError::InvalidPublication { .. })));
        Ok(())
    }

    #[test]
    fn unsigned_and_tampered_rejected() -> std::result::Result<(), PlebwireError> {
        let kp = author();
        assert!(check(&Publication::Comment(post(&kp))).is_err());
        let mut signed = post(&kp).sign(&kp)?;
        signed.content = Some("changed".into());
        assert!(check(&Publication::Comment(signed)).is_err());
        Ok(())
    }

    #[test]
    fn client_supplied_depth_rejected() -> std::result::Result<(), PlebwireError> {
        let kp = author();
        let mut c = post(&kp).sign(&kp)?;
        c.depth = Some(0);
        assert!(check(&Publication::Comment(c)).is_err());
        Ok(())
    }

    #[test]
    fn empty_comment_and_half_reply_rejected() -> std::result::Result<(), PlebwireError> {
        let kp = author();
        let empty = Comment::new(sub().address(), Author::new(kp.address()), Timestamp::from_secs(NOW), "1.0.0").sign(&kp)?;
        assert!(check(&Publication::Comment(empty)).is_err());

        let mut half = post(&kp);
        half.parent_cid = Some(ContentId::from_bytes([1; 32]));
        assert!(check(&Publication::Comment(half.sign(&kp)?)).is_err());
        Ok(())
    }

    #[test]
    fn vote_range_enforced() -> std::result::Result<(), PlebwireError> {
        let kp = author();
        let make = |v: i8| Vote::new(sub().address(), Author::new(kp.address()), Timestamp::from_secs(NOW), "1.0.0", ContentId::from_bytes([1; 32]), v);
        check(&Publication::Vote(make(-1).sign(&kp)?))?;
        assert!(check(&Publication::Vote(make(2).sign(&kp)?)).is_err());
        Ok(())
    }

    #[test]
    fn wrong_subplebbit_and_stale_timestamp_rejected() -> std::result::Result<(), PlebwireError> {
        let kp = author();
        let mut other = post(&kp);
        other.subplebbit_address = Address::new([0xEE; 32]);
        assert!(check(&Publication::Comment(other.sign(&kp)?)).is_err());

        let mut old = post(&kp);
        old.timestamp = Timestamp::from_secs(NOW - 10_000);
        assert!(check(&Publication::Comment(old.sign(&kp)?)).is_err());
        Ok(())
    }

    #[test]
    fn timestamp_window() {
        let now = Timestamp::from_secs(NOW);
        assert!(validate_timestamp(Timestamp::from_secs(NOW - 300), now, 300).is_ok());
        assert!(validate_timestamp(Timestamp::from_secs(NOW + 301), now, 300).is_err());
        assert!(validate_timestamp(Timestamp::from_secs(0), now, 0).is_ok());
    }

    #[test]
    fn update_must_come_from_subplebbit() -> std::result::Result<(), PlebwireError> {
        let cid = ContentId::from_bytes([5; 32]);
        let good = CommentUpdateRecord::initial(cid, Timestamp::from_secs(NOW), "1.0.0").sign(&sub())?;
        validate_comment_update(&good, &sub().address(), &cid)?;

        let forged = CommentUpdateRecord::initial(cid, Timestamp::from_secs(NOW), "1.0.0").sign(&author())?;
        assert!(validate_comment_update(&forged, &sub().address(), &cid).is_err());
        assert!(validate_comment_update(&good, &sub().address(), &ContentId::from_bytes([6; 32])).is_err());
        Ok(())
    }
}
