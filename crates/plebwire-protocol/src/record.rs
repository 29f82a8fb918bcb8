//! Records written to the content store by a subplebbit.
//!
//! - [`CommentRecord`]: immutable, stored once under its content id.
//! - [`CommentUpdateRecord`]: mutable per-comment aggregate, rewritten
//!   at `postUpdates/<bucket>/<cid>/update`.
//! - [`SubplebbitIndexRecord`]: mutable root, republished under the
//!   subplebbit address.
//! - [`Page`]: immutable batch of sorted entries, chained by `nextCid`.
//!
//! Update and index records are signed by the subplebbit over every
//! present field.

use std::collections::BTreeMap;

use plebwire_crypto::signing::Keypair;
use plebwire_types::{Address, ContentId, Result, Timestamp};
use serde::{Deserialize, Serialize};

use crate::publication::{Comment, CommentEdit, Flair};
use crate::signature::{sign_all_fields, SignatureRecord, SignedObject};

// ---------------------------------------------------------------------------
// CommentRecord
// ---------------------------------------------------------------------------

/// The signed comment plus its server-computed `depth`.
///
/// Never contains its own content id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentRecord(Comment);

impl CommentRecord {
    /// Wraps an accepted comment with its depth.
    pub fn new(mut comment: Comment, depth: u32) -> Self {
        comment.depth = Some(depth);
        Self(comment)
    }

    /// The underlying comment.
    pub fn comment(&self) -> &Comment {
        &self.0
    }

    /// Depth in the thread, `0` for a post.
    pub fn depth(&self) -> u32 {
        self.0.depth.unwrap_or(0)
    }

    /// The post this comment belongs to, given its own id.
    pub fn post_cid_or(&self, own_cid: ContentId) -> ContentId {
        self.0.post_cid.unwrap_or(own_cid)
    }

    /// Parses a stored record.
    ///
    /// # Errors
    ///
    /// `ProtocolError` on malformed JSON.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        from_json(bytes, "comment record")
    }
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

/// One entry of a page: the immutable comment and its latest update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEntry {
    pub comment: CommentRecord,
    pub comment_update: CommentUpdateRecord,
}

/// Ordered batch of entries, linked to the following page.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub comments: Vec<PageEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cid: Option<ContentId>,
}

impl Page {
    /// Parses a stored page.
    ///
    /// # Errors
    ///
    /// `ProtocolError` on malformed JSON.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        from_json(bytes, "page")
    }
}

/// Listings keyed by sort name: the default sort's first page inline,
/// and the first page cid of every sort.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pages {
    pub pages: BTreeMap<String, Page>,
    pub page_cids: BTreeMap<String, ContentId>,
}

// ---------------------------------------------------------------------------
// CommentUpdateRecord
// ---------------------------------------------------------------------------

/// Per-author statistics inside one subplebbit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSubplebbitStats {
    pub post_score: i64,
    pub reply_score: i64,
    pub first_comment_timestamp: Timestamp,
    pub last_comment_cid: ContentId,
    /// Set by a moderator `commentAuthor` edit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ban_expires_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flair: Option<Flair>,
}

/// Server-side author data attached to a comment update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorUpdate {
    pub subplebbit: AuthorSubplebbitStats,
}

/// Mutable aggregate state of one comment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentUpdateRecord {
    pub cid: ContentId,
    pub upvote_count: u64,
    pub downvote_count: u64,
    /// Number of descendants, at any depth.
    pub reply_count: u64,
    pub updated_at: Timestamp,
    /// Latest accepted author edit, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit: Option<CommentEdit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replies: Option<Pages>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorUpdate>,
    pub protocol_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureRecord>,
}

impl CommentUpdateRecord {
    /// A fresh update with every counter at zero.
    pub fn initial(cid: ContentId, updated_at: Timestamp, protocol_version: impl Into<String>) -> Self {
        Self {
            cid,
            upvote_count: 0,
            downvote_count: 0,
            reply_count: 0,
            updated_at,
            edit: None,
            replies: None,
            pinned: None,
            locked: None,
            removed: None,
            author: None,
            protocol_version: protocol_version.into(),
            signature: None,
        }
    }

    /// Net score.
    pub fn score(&self) -> i64 {
        self.upvote_count as i64 - self.downvote_count as i64
    }

    /// Signs every present field with the subplebbit key.
    ///
    /// # Errors
    ///
    /// Propagates signing failures.
    pub fn sign(mut self, keypair: &Keypair) -> Result<Self> {
        sign_all_fields(&mut self, keypair)?;
        Ok(self)
    }

    /// Parses a stored update.
    ///
    /// # Errors
    ///
    /// `ProtocolError` on malformed JSON.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        from_json(bytes, "comment update")
    }
}

impl SignedObject for CommentUpdateRecord {
    fn signature(&self) -> Option<&SignatureRecord> {
        self.signature.as_ref()
    }

    fn set_signature(&mut self, signature: SignatureRecord) {
        self.signature = Some(signature);
    }
}

// ---------------------------------------------------------------------------
// SubplebbitIndexRecord
// ---------------------------------------------------------------------------

/// Key material readers need to encrypt requests to the subplebbit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionInfo {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(with = "plebwire_types::bytes")]
    pub public_key: Vec<u8>,
}

/// Public description of one challenge the subplebbit may issue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeInfo {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Moderation role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    Owner,
    Admin,
    Moderator,
}

/// Role entry in the index record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub role: RoleKind,
}

/// Signed root of a subplebbit, published under its address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubplebbitIndexRecord {
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub encryption: EncryptionInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posts: Option<Pages>,
    /// Bucket size in seconds (as a decimal string) to directory cid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_updates: Option<BTreeMap<String, ContentId>>,
    pub challenges: Vec<ChallengeInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<BTreeMap<Address, Role>>,
    pub protocol_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureRecord>,
}

impl SubplebbitIndexRecord {
    /// Signs every present field with the subplebbit key.
    ///
    /// # Errors
    ///
    /// Propagates signing failures.
    pub fn sign(mut self, keypair: &Keypair) -> Result<Self> {
        sign_all_fields(&mut self, keypair)?;
        Ok(self)
    }

    /// Role held by `address`, if any.
    pub fn role_of(&self, address: &Address) -> Option<RoleKind> {
        self.roles.as_ref()?.get(address).map(|r| r.role)
    }

    /// Parses a stored index record.
    ///
    /// # Errors
    ///
    /// `ProtocolError` on malformed JSON.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        from_json(bytes, "subplebbit index")
    }
}

impl SignedObject for SubplebbitIndexRecord {
    fn signature(&self) -> Option<&SignatureRecord> {
        self.signature.as_ref()
    }

    fn set_signature(&mut self, signature: SignatureRecord) {
        self.signature = Some(signature);
    }
}

// ---------------------------------------------------------------------------
// JSON helpers
// ---------------------------------------------------------------------------

/// Serializes a record to the JSON bytes that get stored.
///
/// # Errors
///
/// `ProtocolError` if serialization fails.
pub fn to_json<T: Serialize>(record: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(record).map_err(|e| plebwire_types::PlebwireError::ProtocolError {
        reason: format!("record serialization failed: {e}"),
    })
}

fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| plebwire_types::PlebwireError::ProtocolError {
        reason: format!("malformed {what}: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publication::Author;
    use crate::signature::{require_all_fields_signed, verify_signed};
    use plebwire_types::PlebwireError;

    fn sub_kp() -> Keypair {
        Keypair::from_seed(&[0x10; 32])
    }

    #[test]
    fn update_signs_every_present_field() -> std::result::Result<(), PlebwireError> {
        let kp = sub_kp();
        let mut update = CommentUpdateRecord::initial(ContentId::from_bytes([1; 32]), Timestamp::from_secs(9), "1.0.0");
        update.pinned = Some(true);
        let update = update.sign(&kp)?;
        assert!(verify_signed(&update));
        require_all_fields_signed(&update, &[])?;

        let names = update
            .signature
            .as_ref()
            .map(|s| s.signed_property_names.clone())
            .unwrap_or_default();
        assert!(names.contains(&"pinned".to_string()));
        assert!(!names.contains(&"edit".to_string()));
        Ok(())
    }

    #[test]
    fn comment_record_is_transparent() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let kp = Keypair::from_seed(&[0x42; 32]);
        let comment = Comment::new(Address::new([2; 32]), Author::new(kp.address()), Timestamp::from_secs(3), "1.0.0")
            .with_content("hi")
            .sign(&kp)?;
        let record = CommentRecord::new(comment, 0);
        let json = serde_json::to_value(&record)?;
        assert_eq!(json["depth"], 0);
        assert_eq!(json["content"], "hi");
        assert!(json.get("cid").is_none());
        let back = CommentRecord::from_json(&to_json(&record)?)?;
        assert_eq!(back.depth(), 0);
        assert!(verify_signed(back.comment()));
        Ok(())
    }

    #[test]
    fn roles_lookup() -> std::result::Result<(), PlebwireError> {
        let kp = sub_kp();
        let moderator = Address::new([7; 32]);
        let mut roles = BTreeMap::new();
        roles.insert(moderator, Role { role: RoleKind::Moderator });
        let index = SubplebbitIndexRecord {
            address: kp.address(),
            title: Some("t".into()),
            description: None,
            created_at: Timestamp::from_secs(1),
            updated_at: Timestamp::from_secs(2),
            encryption: EncryptionInfo {
                kind: "ed25519-aes-gcm".into(),
                public_key: kp.public_key().as_bytes().to_vec(),
            },
            posts: None,
            post_updates: None,
            challenges: vec![],
            roles: Some(roles),
            protocol_version: "1.0.0".into(),
            signature: None,
        }
        .sign(&kp)?;
        assert_eq!(index.role_of(&moderator), Some(RoleKind::Moderator));
        assert_eq!(index.role_of(&Address::new([8; 32])), None);

        let reparsed = SubplebbitIndexRecord::from_json(&to_json(&index)?)?;
        assert!(verify_signed(&reparsed));
        Ok(())
    }
}
