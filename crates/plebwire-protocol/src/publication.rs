//! User-authored publications: comments, votes and comment edits.
//!
//! All three share a base (`subplebbitAddress`, `author`, `timestamp`,
//! `protocolVersion`) and carry their author's signature. Optional
//! fields are omitted from every encoding when absent. A publication is
//! built unsigned, signed once with [`Comment::sign`] (and friends), and
//! never modified afterwards.

use plebwire_crypto::signing::Keypair;
use plebwire_types::{Address, ContentId, PlebwireError, Result, Timestamp};
use serde::{Deserialize, Serialize};

use crate::signature::{sign_fields, verify_signed, SignatureRecord, SignedObject};

/// Fields a comment signature may cover.
pub const COMMENT_SIGNED_FIELDS: &[&str] = &[
    "subplebbitAddress",
    "author",
    "timestamp",
    "protocolVersion",
    "content",
    "title",
    "link",
    "parentCid",
    "postCid",
    "flair",
    "spoiler",
];

/// Fields a vote signature may cover.
pub const VOTE_SIGNED_FIELDS: &[&str] = &[
    "subplebbitAddress",
    "author",
    "timestamp",
    "protocolVersion",
    "commentCid",
    "vote",
];

/// Fields a comment edit signature may cover.
pub const COMMENT_EDIT_SIGNED_FIELDS: &[&str] = &[
    "subplebbitAddress",
    "author",
    "timestamp",
    "protocolVersion",
    "commentCid",
    "content",
    "deleted",
    "flair",
    "spoiler",
    "reason",
    "pinned",
    "locked",
    "removed",
    "commentAuthor",
];

// ---------------------------------------------------------------------------
// Shared pieces
// ---------------------------------------------------------------------------

/// Publication author.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    /// Author address; must match the signature public key.
    pub address: Address,
    /// Free-form display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Author {
    /// Author with only an address.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            display_name: None,
        }
    }
}

/// Short label shown next to a comment or author.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flair {
    /// Label text.
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
}

// ---------------------------------------------------------------------------
// Comment
// ---------------------------------------------------------------------------

/// A post (no `parentCid`) or a reply (with `parentCid` and `postCid`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub subplebbit_address: Address,
    pub author: Author,
    pub timestamp: Timestamp,
    pub protocol_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_cid: Option<ContentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_cid: Option<ContentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flair: Option<Flair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spoiler: Option<bool>,
    /// Server-computed depth. Absent on requests, set on stored records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureRecord>,
}

impl Comment {
    /// Starts an unsigned post.
    pub fn new(subplebbit_address: Address, author: Author, timestamp: Timestamp, protocol_version: impl Into<String>) -> Self {
        Self {
            subplebbit_address,
            author,
            timestamp,
            protocol_version: protocol_version.into(),
            content: None,
            title: None,
            link: None,
            parent_cid: None,
            post_cid: None,
            flair: None,
            spoiler: None,
            depth: None,
            signature: None,
        }
    }

    /// Sets the body text.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the link.
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Turns this comment into a reply to `parent_cid` in the thread of
    /// `post_cid`.
    pub fn reply_to(mut self, parent_cid: ContentId, post_cid: ContentId) -> Self {
        self.parent_cid = Some(parent_cid);
        self.post_cid = Some(post_cid);
        self
    }

    /// Whether this comment is a reply.
    pub fn is_reply(&self) -> bool {
        self.parent_cid.is_some()
    }

    /// Signs every present author field and returns the signed comment.
    ///
    /// # Errors
    ///
    /// Propagates signing failures.
    pub fn sign(mut self, keypair: &Keypair) -> Result<Self> {
        sign_fields(&mut self, COMMENT_SIGNED_FIELDS, keypair)?;
        Ok(self)
    }
}

impl SignedObject for Comment {
    fn signature(&self) -> Option<&SignatureRecord> {
        self.signature.as_ref()
    }

    fn set_signature(&mut self, signature: SignatureRecord) {
        self.signature = Some(signature);
    }
}

// ---------------------------------------------------------------------------
// Vote
// ---------------------------------------------------------------------------

/// An up (`1`), down (`-1`) or retracted (`0`) vote on a comment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub subplebbit_address: Address,
    pub author: Author,
    pub timestamp: Timestamp,
    pub protocol_version: String,
    pub comment_cid: ContentId,
    pub vote: i8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureRecord>,
}

impl Vote {
    /// Creates an unsigned vote.
    pub fn new(
        subplebbit_address: Address,
        author: Author,
        timestamp: Timestamp,
        protocol_version: impl Into<String>,
        comment_cid: ContentId,
        vote: i8,
    ) -> Self {
        Self {
            subplebbit_address,
            author,
            timestamp,
            protocol_version: protocol_version.into(),
            comment_cid,
            vote,
            signature: None,
        }
    }

    /// Signs the vote.
    ///
    /// # Errors
    ///
    /// Propagates signing failures.
    pub fn sign(mut self, keypair: &Keypair) -> Result<Self> {
        sign_fields(&mut self, VOTE_SIGNED_FIELDS, keypair)?;
        Ok(self)
    }
}

impl SignedObject for Vote {
    fn signature(&self) -> Option<&SignatureRecord> {
        self.signature.as_ref()
    }

    fn set_signature(&mut self, signature: SignatureRecord) {
        self.signature = Some(signature);
    }
}

// ---------------------------------------------------------------------------
// CommentEdit
// ---------------------------------------------------------------------------

/// Moderator action against a comment's author.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentAuthorEdit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ban_expires_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flair: Option<Flair>,
}

/// Edit of an existing comment, by its author or by a moderator.
///
/// `content`, `deleted`, `flair` and `spoiler` are author fields;
/// `pinned`, `locked`, `removed` and `commentAuthor` are moderator
/// fields; `reason` may accompany either.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentEdit {
    pub subplebbit_address: Address,
    pub author: Author,
    pub timestamp: Timestamp,
    pub protocol_version: String,
    pub comment_cid: ContentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flair: Option<Flair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spoiler: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_author: Option<CommentAuthorEdit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureRecord>,
}

impl CommentEdit {
    /// Creates an unsigned, empty edit of `comment_cid`.
    pub fn new(
        subplebbit_address: Address,
        author: Author,
        timestamp: Timestamp,
        protocol_version: impl Into<String>,
        comment_cid: ContentId,
    ) -> Self {
        Self {
            subplebbit_address,
            author,
            timestamp,
            protocol_version: protocol_version.into(),
            comment_cid,
            content: None,
            deleted: None,
            flair: None,
            spoiler: None,
            reason: None,
            pinned: None,
            locked: None,
            removed: None,
            comment_author: None,
            signature: None,
        }
    }

    /// Whether any author-only field is set.
    pub fn has_author_fields(&self) -> bool {
        self.content.is_some() || self.deleted.is_some() || self.flair.is_some() || self.spoiler.is_some()
    }

    /// Whether any moderator-only field is set.
    pub fn has_moderator_fields(&self) -> bool {
        self.pinned.is_some() || self.locked.is_some() || self.removed.is_some() || self.comment_author.is_some()
    }

    /// Signs the edit.
    ///
    /// # Errors
    ///
    /// Propagates signing failures.
    pub fn sign(mut self, keypair: &Keypair) -> Result<Self> {
        sign_fields(&mut self, COMMENT_EDIT_SIGNED_FIELDS, keypair)?;
        Ok(self)
    }
}

impl SignedObject for CommentEdit {
    fn signature(&self) -> Option<&SignatureRecord> {
        self.signature.as_ref()
    }

    fn set_signature(&mut self, signature: SignatureRecord) {
        self.signature = Some(signature);
    }
}

// ---------------------------------------------------------------------------
// Publication
// ---------------------------------------------------------------------------

/// The closed set of publications a challenge request can carry.
///
/// Encodes as `{"comment": {...}}`, `{"vote": {...}}` or
/// `{"commentEdit": {...}}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Publication {
    Comment(Comment),
    Vote(Vote),
    CommentEdit(CommentEdit),
}

impl Publication {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Comment(_) => "comment",
            Self::Vote(_) => "vote",
            Self::CommentEdit(_) => "commentEdit",
        }
    }

    pub fn author(&self) -> &Author {
        match self {
            Self::Comment(c) => &c.author,
            Self::Vote(v) => &v.author,
            Self::CommentEdit(e) => &e.author,
        }
    }

    pub fn subplebbit_address(&self) -> &Address {
        match self {
            Self::Comment(c) => &c.subplebbit_address,
            Self::Vote(v) => &v.subplebbit_address,
            Self::CommentEdit(e) => &e.subplebbit_address,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::Comment(c) => c.timestamp,
            Self::Vote(v) => v.timestamp,
            Self::CommentEdit(e) => e.timestamp,
        }
    }

    pub fn signature(&self) -> Option<&SignatureRecord> {
        match self {
            Self::Comment(c) => c.signature.as_ref(),
            Self::Vote(v) => v.signature.as_ref(),
            Self::CommentEdit(e) => e.signature.as_ref(),
        }
    }

    /// Verifies the author signature.
    pub fn verify_signature(&self) -> bool {
        match self {
            Self::Comment(c) => verify_signed(c),
            Self::Vote(v) => verify_signed(v),
            Self::CommentEdit(e) => verify_signed(e),
        }
    }

    /// Parses the JSON request payload.
    ///
    /// # Errors
    ///
    /// `InvalidPublication` if the JSON is not one of the three shapes.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| PlebwireError::InvalidPublication {
            reason: format!("unrecognised publication: {e}"),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn author_kp() -> Keypair {
        Keypair::from_seed(&[0x42; 32])
    }

    fn sub() -> Address {
        Address::new([0x01; 32])
    }

    #[test]
    fn comment_signature_covers_present_fields_only() -> std::result::Result<(), PlebwireError> {
        let kp = author_kp();
        let c = Comment::new(sub(), Author::new(kp.address()), Timestamp::from_secs(1_000), "1.0.0")
            .with_content("content")
            .with_title("title")
            .sign(&kp)?;
        let sig = c.signature.as_ref().ok_or(PlebwireError::SignatureError { reason: "unsigned".into() })?;
        let mut names = sig.signed_property_names.clone();
        names.sort();
        assert_eq!(
            names,
            vec!["author", "content", "protocolVersion", "subplebbitAddress", "timestamp", "title"]
        );
        assert!(verify_signed(&c));
        Ok(())
    }

    #[test]
    fn depth_is_not_signed() -> std::result::Result<(), PlebwireError> {
        let kp = author_kp();
        let mut c = Comment::new(sub(), Author::new(kp.address()), Timestamp::from_secs(1), "1.0.0")
            .with_content("x")
            .sign(&kp)?;
        c.depth = Some(3);
        assert!(verify_signed(&c));
        Ok(())
    }

    #[test]
    fn publication_json_shape() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let kp = author_kp();
        let vote = Vote::new(sub(), Author::new(kp.address()), Timestamp::from_secs(5), "1.0.0", ContentId::from_bytes([9; 32]), 1)
            .sign(&kp)?;
        let json = serde_json::to_value(Publication::Vote(vote.clone()))?;
        assert_eq!(json["vote"]["vote"], 1);
        assert_eq!(json["vote"]["commentCid"], "09".repeat(32));
        let back = Publication::from_json(&serde_json::to_vec(&json)?)?;
        assert_eq!(back, Publication::Vote(vote));
        assert!(back.verify_signature());
        Ok(())
    }

    #[test]
    fn edit_field_classes() {
        let mut e = CommentEdit::new(sub(), Author::new(sub()), Timestamp::from_secs(1), "1.0.0", ContentId::from_bytes([1; 32]));
        assert!(!e.has_author_fields() && !e.has_moderator_fields());
        e.reason = Some("spam".into());
        assert!(!e.has_author_fields() && !e.has_moderator_fields());
        e.removed = Some(true);
        assert!(e.has_moderator_fields());
        e.content = Some("edited".into());
        assert!(e.has_author_fields());
    }

    #[test]
    fn garbage_is_invalid_publication() {
        assert!(matches!(
            Publication::from_json(br#"{"poll": {}}"#),
            Err(PlebwireError::InvalidPublication { .. })
        ));
    }
}
