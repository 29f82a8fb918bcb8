//! Update aggregator.
//!
//! Owns the mutable view of a subplebbit: every accepted comment, the
//! votes and edits applied to it, per-author statistics and the role
//! table. Each accepted publication triggers one step:
//!
//! 1. apply the change to a copy of the state;
//! 2. recompute the update record of every affected comment, deepest
//!    first, so parents see their children's fresh counters;
//! 3. write the update files into their time buckets;
//! 4. rebuild the post listings, stat the bucket directories, sign and
//!    publish a new index record;
//! 5. snapshot the state and swap it in.
//!
//! The step runs under a `tokio::sync::Mutex`, so index republishes for
//! one subplebbit never interleave. A failure anywhere leaves the
//! previous state in place.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use plebwire_crypto::signing::Keypair;
use plebwire_protocol::publication::{CommentEdit, Flair, Vote};
use plebwire_protocol::record::{
    to_json, AuthorSubplebbitStats, AuthorUpdate, ChallengeInfo, CommentRecord, CommentUpdateRecord, EncryptionInfo,
    PageEntry, Role, RoleKind, SubplebbitIndexRecord,
};
use plebwire_storage::ContentStore;
use plebwire_types::config::ProtocolConfig;
use plebwire_types::{Address, ContentId, PlebwireError, Result, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::pages::write_pages;
use crate::sort::{SortType, POST_SORTS, REPLY_SORTS};

/// Path of a comment's update file inside the mutable tree.
pub fn update_path(bucket: u64, cid: &ContentId) -> String {
    format!("{}/{cid}/update", bucket_dir(bucket))
}

/// Directory holding every update file of one time bucket.
pub fn bucket_dir(bucket: u64) -> String {
    format!("postUpdates/{bucket}")
}

pub(crate) fn already_published(cid: &ContentId) -> PlebwireError {
    PlebwireError::InvalidPublication {
        reason: format!("comment {cid} is already published"),
    }
}

fn state_dir(address: &Address) -> String {
    format!("internal/{address}")
}

const STATE_FILE: &str = "state";

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// Static, owner-controlled part of the index record.
#[derive(Clone, Debug, Default)]
pub struct SubplebbitProfile {
    pub title: Option<String>,
    pub description: Option<String>,
    pub challenges: Vec<ChallengeInfo>,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
struct CastVote {
    value: i8,
    timestamp: Timestamp,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct CommentState {
    record: CommentRecord,
    post: ContentId,
    children: Vec<ContentId>,
    votes: BTreeMap<Address, CastVote>,
    author_edit: Option<CommentEdit>,
    pinned: Option<bool>,
    locked: Option<bool>,
    removed: Option<bool>,
    moderated_at: Option<Timestamp>,
    latest: Option<CommentUpdateRecord>,
}

impl CommentState {
    fn counts(&self) -> (u64, u64) {
        self.votes.values().fold((0, 0), |(up, down), v| match v.value {
            1 => (up + 1, down),
            -1 => (up, down + 1),
            _ => (up, down),
        })
    }

    fn score(&self) -> i64 {
        let (up, down) = self.counts();
        up as i64 - down as i64
    }

    fn author(&self) -> Address {
        self.record.comment().author.address
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct AuthorState {
    first_comment_timestamp: Timestamp,
    last_comment_cid: ContentId,
    ban_expires_at: Option<Timestamp>,
    flair: Option<Flair>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct AggregatorState {
    created_at: Timestamp,
    last_updated_at: Timestamp,
    comments: BTreeMap<ContentId, CommentState>,
    authors: BTreeMap<Address, AuthorState>,
    /// Bucket each comment's update file currently lives in.
    bucket_of: BTreeMap<ContentId, u64>,
    roles: BTreeMap<Address, RoleKind>,
}

impl AggregatorState {
    fn new(now: Timestamp, roles: BTreeMap<Address, RoleKind>) -> Self {
        Self {
            created_at: now,
            last_updated_at: Timestamp::from_secs(0),
            comments: BTreeMap::new(),
            authors: BTreeMap::new(),
            bucket_of: BTreeMap::new(),
            roles,
        }
    }

    fn comment(&self, cid: &ContentId) -> Result<&CommentState> {
        self.comments.get(cid).ok_or_else(|| unknown_comment(cid))
    }

    fn comment_mut(&mut self, cid: &ContentId) -> Result<&mut CommentState> {
        self.comments.get_mut(cid).ok_or_else(|| unknown_comment(cid))
    }

    /// Strictly increasing `updatedAt`, never behind the wall clock.
    fn next_updated_at(&mut self, now: Timestamp) -> Timestamp {
        let next = now.max(Timestamp::from_secs(self.last_updated_at.as_secs() + 1));
        self.last_updated_at = next;
        next
    }

    fn author_stats(&self, address: &Address) -> Option<AuthorSubplebbitStats> {
        let author = self.authors.get(address)?;
        let (mut post_score, mut reply_score) = (0, 0);
        for c in self.comments.values().filter(|c| c.author() == *address) {
            if c.record.depth() == 0 {
                post_score += c.score();
            } else {
                reply_score += c.score();
            }
        }
        Some(AuthorSubplebbitStats {
            post_score,
            reply_score,
            first_comment_timestamp: author.first_comment_timestamp,
            last_comment_cid: author.last_comment_cid,
            ban_expires_at: author.ban_expires_at,
            flair: author.flair.clone(),
        })
    }

    /// `targets`, every comment by an author in `authors`, and all of
    /// their ancestors, deepest first.
    fn affected(&self, targets: &BTreeSet<ContentId>, authors: &BTreeSet<Address>) -> Vec<ContentId> {
        let mut set: BTreeSet<ContentId> = targets.clone();
        set.extend(
            self.comments
                .iter()
                .filter(|(_, c)| authors.contains(&c.author()))
                .map(|(cid, _)| *cid),
        );
        let mut with_ancestors = set.clone();
        for cid in &set {
            let mut parent = self.comments.get(cid).and_then(|c| c.record.comment().parent_cid);
            while let Some(p) = parent {
                if !with_ancestors.insert(p) {
                    break;
                }
                parent = self.comments.get(&p).and_then(|c| c.record.comment().parent_cid);
            }
        }
        let mut ordered: Vec<_> = with_ancestors
            .into_iter()
            .filter_map(|cid| self.comments.get(&cid).map(|c| (c.record.depth(), cid)))
            .collect();
        ordered.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        ordered.into_iter().map(|(_, cid)| cid).collect()
    }

    fn entry(&self, cid: &ContentId) -> Option<PageEntry> {
        let c = self.comments.get(cid)?;
        Some(PageEntry {
            comment: c.record.clone(),
            comment_update: c.latest.clone()?,
        })
    }
}

fn unknown_comment(cid: &ContentId) -> PlebwireError {
    PlebwireError::InvalidPublication {
        reason: format!("comment {cid} is not in this subplebbit"),
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Recomputes and republishes a subplebbit's mutable records.
pub struct Aggregator {
    store: Arc<dyn ContentStore>,
    keypair: Keypair,
    address: Address,
    config: ProtocolConfig,
    profile: SubplebbitProfile,
    state: Mutex<AggregatorState>,
}

impl Aggregator {
    /// Creates an aggregator for the subplebbit owning `keypair`,
    /// restoring the last snapshot from `store` if one exists.
    ///
    /// # Errors
    ///
    /// Propagates store failures and malformed snapshots.
    pub async fn open(
        store: Arc<dyn ContentStore>,
        keypair: Keypair,
        config: ProtocolConfig,
        profile: SubplebbitProfile,
        roles: BTreeMap<Address, RoleKind>,
    ) -> Result<Self> {
        let address = keypair.address();
        let dir = store.stat(&state_dir(&address)).await?;
        let state = match store.cat(&dir, STATE_FILE).await? {
            Some(bytes) => {
                let mut state: AggregatorState =
                    serde_json::from_slice(&bytes).map_err(|e| PlebwireError::StorageError {
                        reason: format!("corrupt aggregator snapshot: {e}"),
                    })?;
                state.roles.extend(roles);
                tracing::info!(%address, comments = state.comments.len(), "aggregator state restored");
                state
            }
            None => AggregatorState::new(Timestamp::now(), roles),
        };
        Ok(Self {
            store,
            keypair,
            address,
            config,
            profile,
            state: Mutex::new(state),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Number of accepted comments.
    pub async fn comment_count(&self) -> usize {
        self.state.lock().await.comments.len()
    }

    /// Latest signed update of `cid`.
    pub async fn comment_update(&self, cid: &ContentId) -> Option<CommentUpdateRecord> {
        self.state.lock().await.comments.get(cid).and_then(|c| c.latest.clone())
    }

    /// Stored record of `cid`.
    pub async fn comment_record(&self, cid: &ContentId) -> Option<CommentRecord> {
        self.state.lock().await.comments.get(cid).map(|c| c.record.clone())
    }

    /// Adds an accepted comment and returns its first aggregated update.
    ///
    /// # Errors
    ///
    /// `InvalidPublication` if `cid` is already known or a reply's
    /// parent is unknown; store failures otherwise. On failure no update
    /// file for `cid` is left in the bucket tree.
    pub async fn on_new_comment(&self, cid: ContentId, record: CommentRecord) -> Result<CommentUpdateRecord> {
        let mut guard = self.state.lock().await;
        if guard.comments.contains_key(&cid) {
            return Err(already_published(&cid));
        }
        let mut state = guard.clone();

        let comment = record.comment();
        let author = comment.author.address;
        let post = record.post_cid_or(cid);
        if let Some(parent) = comment.parent_cid {
            state.comment_mut(&parent)?.children.push(cid);
        }
        state
            .authors
            .entry(author)
            .and_modify(|a| a.last_comment_cid = cid)
            .or_insert(AuthorState {
                first_comment_timestamp: comment.timestamp,
                last_comment_cid: cid,
                ban_expires_at: None,
                flair: None,
            });
        state.comments.insert(
            cid,
            CommentState {
                record,
                post,
                children: Vec::new(),
                votes: BTreeMap::new(),
                author_edit: None,
                pinned: None,
                locked: None,
                removed: None,
                moderated_at: None,
                latest: None,
            },
        );

        if let Err(e) = self.step(&mut state, BTreeSet::from([cid]), BTreeSet::from([author])).await {
            if let Some(bucket) = state.bucket_of.get(&cid) {
                if let Err(cleanup) = self.store.remove_file(&update_path(*bucket, &cid)).await {
                    tracing::warn!(%cid, %cleanup, "update file of rejected comment not removed");
                }
            }
            return Err(e);
        }
        let update = state.comment(&cid)?.latest.clone().ok_or_else(|| PlebwireError::ProtocolError {
            reason: format!("no update computed for {cid}"),
        })?;
        *guard = state;
        Ok(update)
    }

    /// Applies a vote: one per author per comment, newest wins, `0`
    /// retracts.
    ///
    /// # Errors
    ///
    /// `InvalidPublication` for an unknown comment; store failures.
    pub async fn on_vote(&self, vote: &Vote) -> Result<()> {
        let mut guard = self.state.lock().await;
        let mut state = guard.clone();

        let voter = vote.author.address;
        let target = state.comment_mut(&vote.comment_cid)?;
        if let Some(previous) = target.votes.get(&voter) {
            if previous.timestamp > vote.timestamp {
                tracing::debug!(cid = %vote.comment_cid, %voter, "stale vote ignored");
                return Ok(());
            }
        }
        if vote.vote == 0 {
            target.votes.remove(&voter);
        } else {
            target.votes.insert(
                voter,
                CastVote {
                    value: vote.vote,
                    timestamp: vote.timestamp,
                },
            );
        }
        let owner = target.author();

        self.step(&mut state, BTreeSet::from([vote.comment_cid]), BTreeSet::from([owner]))
            .await?;
        *guard = state;
        Ok(())
    }

    /// Applies a comment edit.
    ///
    /// Author fields need the comment's author; moderator fields need a
    /// role. Edits older than the stored one are ignored.
    ///
    /// # Errors
    ///
    /// `InvalidPublication` for an unknown comment or a missing
    /// permission; store failures.
    pub async fn on_edit(&self, edit: &CommentEdit) -> Result<()> {
        let mut guard = self.state.lock().await;
        let mut state = guard.clone();

        let editor = edit.author.address;
        let is_moderator = state.roles.contains_key(&editor);
        let target = state.comment_mut(&edit.comment_cid)?;
        let owner = target.author();

        if edit.has_author_fields() && editor != owner {
            return Err(PlebwireError::InvalidPublication {
                reason: "only the comment author may edit its content".into(),
            });
        }
        if edit.has_moderator_fields() && !is_moderator {
            return Err(PlebwireError::InvalidPublication {
                reason: format!("{editor} holds no role in this subplebbit"),
            });
        }

        let mut changed = false;
        if edit.has_author_fields() {
            let newer = target.author_edit.as_ref().map_or(true, |prev| prev.timestamp <= edit.timestamp);
            if newer {
                target.author_edit = Some(edit.clone());
                changed = true;
            }
        }
        let mut author_changes = None;
        if edit.has_moderator_fields() && target.moderated_at.map_or(true, |at| at <= edit.timestamp) {
            if edit.pinned.is_some() {
                target.pinned = edit.pinned;
            }
            if edit.locked.is_some() {
                target.locked = edit.locked;
            }
            if edit.removed.is_some() {
                target.removed = edit.removed;
            }
            target.moderated_at = Some(edit.timestamp);
            author_changes = edit.comment_author.clone();
            changed = true;
        }

        if !changed {
            tracing::debug!(cid = %edit.comment_cid, %editor, "stale edit ignored");
            return Ok(());
        }

        let mut authors = BTreeSet::new();
        if let Some(changes) = author_changes {
            if let Some(a) = state.authors.get_mut(&owner) {
                if changes.ban_expires_at.is_some() {
                    a.ban_expires_at = changes.ban_expires_at;
                }
                if changes.flair.is_some() {
                    a.flair = changes.flair;
                }
            }
            authors.insert(owner);
        }

        self.step(&mut state, BTreeSet::from([edit.comment_cid]), authors).await?;
        *guard = state;
        Ok(())
    }

    /// Grants or revokes a role and republishes the index.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn set_role(&self, address: Address, role: Option<RoleKind>) -> Result<()> {
        let mut guard = self.state.lock().await;
        let mut state = guard.clone();
        match role {
            Some(role) => state.roles.insert(address, role),
            None => state.roles.remove(&address),
        };
        self.step(&mut state, BTreeSet::new(), BTreeSet::new()).await?;
        *guard = state;
        Ok(())
    }

    /// Moves update files whose post aged into a larger bucket and
    /// publishes a fresh index.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn republish(&self) -> Result<SubplebbitIndexRecord> {
        let mut guard = self.state.lock().await;
        let mut state = guard.clone();
        let index = self.step(&mut state, BTreeSet::new(), BTreeSet::new()).await?;
        *guard = state;
        Ok(index)
    }

    // -----------------------------------------------------------------------
    // Step
    // -----------------------------------------------------------------------

    async fn step(
        &self,
        state: &mut AggregatorState,
        targets: BTreeSet<ContentId>,
        authors: BTreeSet<Address>,
    ) -> Result<SubplebbitIndexRecord> {
        let now = Timestamp::now();
        let updated_at = state.next_updated_at(now);

        let affected = state.affected(&targets, &authors);
        for cid in &affected {
            let update = self.build_update(state, cid, updated_at).await?;
            state.comment_mut(cid)?.latest = Some(update);
        }

        let buckets = self.place_files(state, &affected, now).await?;
        let index = self.build_index(state, &buckets, updated_at).await?;

        let index_cid = self.store.put(&to_json(&index)?).await?;
        self.store.publish(&self.address, &index_cid).await?;

        let snapshot = serde_json::to_vec(&*state).map_err(|e| PlebwireError::StorageError {
            reason: format!("aggregator snapshot failed: {e}"),
        })?;
        self.store
            .write_file(&format!("{}/{STATE_FILE}", state_dir(&self.address)), &snapshot)
            .await?;

        tracing::debug!(
            address = %self.address,
            %index_cid,
            updated = affected.len(),
            %updated_at,
            "index republished"
        );
        Ok(index)
    }

    async fn build_update(
        &self,
        state: &AggregatorState,
        cid: &ContentId,
        updated_at: Timestamp,
    ) -> Result<CommentUpdateRecord> {
        let c = state.comment(cid)?;
        let (upvotes, downvotes) = c.counts();

        let mut reply_count = 0;
        let mut children = Vec::with_capacity(c.children.len());
        for child in &c.children {
            let entry = state.entry(child).ok_or_else(|| PlebwireError::ProtocolError {
                reason: format!("reply {child} has no update yet"),
            })?;
            reply_count += 1 + entry.comment_update.reply_count;
            children.push(entry);
        }
        let replies = write_pages(
            self.store.as_ref(),
            &children,
            REPLY_SORTS,
            SortType::TopAll,
            self.config.page_size,
        )
        .await?;

        let mut update = CommentUpdateRecord::initial(*cid, updated_at, self.config.protocol_version.clone());
        update.upvote_count = upvotes;
        update.downvote_count = downvotes;
        update.reply_count = reply_count;
        update.edit = c.author_edit.clone();
        update.replies = replies;
        update.pinned = c.pinned;
        update.locked = c.locked;
        update.removed = c.removed;
        update.author = state
            .author_stats(&c.author())
            .map(|subplebbit| AuthorUpdate { subplebbit });
        update.sign(&self.keypair)
    }

    /// Writes fresh updates and moves aged ones. Returns every bucket
    /// in use.
    async fn place_files(
        &self,
        state: &mut AggregatorState,
        affected: &[ContentId],
        now: Timestamp,
    ) -> Result<BTreeSet<u64>> {
        let fresh: BTreeSet<ContentId> = affected.iter().copied().collect();
        let mut moves = Vec::new();
        for (cid, c) in &state.comments {
            let post_ts = state.comment(&c.post).map_or(c.record.comment().timestamp, |p| p.record.comment().timestamp);
            let bucket = self.config.bucket_for_age(post_ts.age_at(now));
            let current = state.bucket_of.get(cid).copied();
            if fresh.contains(cid) || current != Some(bucket) {
                moves.push((*cid, current, bucket));
            }
        }

        for (cid, old, bucket) in moves {
            let Some(update) = state.comment(&cid)?.latest.as_ref() else {
                continue;
            };
            self.store.write_file(&update_path(bucket, &cid), &to_json(update)?).await?;
            if let Some(old) = old.filter(|o| *o != bucket) {
                self.store.remove_file(&update_path(old, &cid)).await?;
                tracing::debug!(%cid, from = old, to = bucket, "update moved to a new bucket");
            }
            state.bucket_of.insert(cid, bucket);
        }

        Ok(state.bucket_of.values().copied().collect())
    }

    async fn build_index(
        &self,
        state: &AggregatorState,
        buckets: &BTreeSet<u64>,
        updated_at: Timestamp,
    ) -> Result<SubplebbitIndexRecord> {
        let posts: Vec<PageEntry> = state
            .comments
            .iter()
            .filter(|(_, c)| c.record.depth() == 0)
            .filter_map(|(cid, _)| state.entry(cid))
            .collect();
        let posts = write_pages(self.store.as_ref(), &posts, POST_SORTS, SortType::Hot, self.config.page_size).await?;

        let mut post_updates = BTreeMap::new();
        for bucket in buckets {
            let dir = self.store.stat(&bucket_dir(*bucket)).await?;
            post_updates.insert(bucket.to_string(), dir);
        }

        let roles = (!state.roles.is_empty()).then(|| {
            state
                .roles
                .iter()
                .map(|(address, role)| (*address, Role { role: *role }))
                .collect()
        });

        SubplebbitIndexRecord {
            address: self.address,
            title: self.profile.title.clone(),
            description: self.profile.description.clone(),
            created_at: state.created_at,
            updated_at,
            encryption: EncryptionInfo {
                kind: self.config.encryption_type.clone(),
                public_key: self.keypair.public_key().as_bytes().to_vec(),
            },
            posts,
            post_updates: (!post_updates.is_empty()).then_some(post_updates),
            challenges: self.profile.challenges.clone(),
            roles,
            protocol_version: self.config.protocol_version.clone(),
            signature: None,
        }
        .sign(&self.keypair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plebwire_protocol::publication::{Author, Comment};
    use plebwire_storage::SledStore;

    fn sub_keypair() -> Keypair {
        Keypair::from_seed(&[0x42; 32])
    }

    async fn aggregator(store: Arc<dyn ContentStore>) -> Result<Aggregator> {
        Aggregator::open(
            store,
            sub_keypair(),
            ProtocolConfig::default(),
            SubplebbitProfile::default(),
            BTreeMap::new(),
        )
        .await
    }

    fn post(author: &Keypair, content: &str) -> Result<CommentRecord> {
        let comment = Comment::new(sub_keypair().address(), Author::new(author.address()), Timestamp::now(), "1.0.0")
            .with_content(content)
            .sign(author)?;
        Ok(CommentRecord::new(comment, 0))
    }

    #[test]
    fn updated_at_is_strictly_increasing() {
        let mut state = AggregatorState::new(Timestamp::from_secs(10), BTreeMap::new());
        let a = state.next_updated_at(Timestamp::from_secs(100));
        let b = state.next_updated_at(Timestamp::from_secs(100));
        let c = state.next_updated_at(Timestamp::from_secs(50));
        assert_eq!(a.as_secs(), 100);
        assert_eq!(b.as_secs(), 101);
        assert_eq!(c.as_secs(), 102);
    }

    #[test]
    fn paths_follow_bucket_layout() {
        let cid = ContentId::from_bytes([0xab; 32]);
        assert_eq!(update_path(86_400, &cid), format!("postUpdates/86400/{cid}/update"));
    }

    #[tokio::test]
    async fn first_comment_publishes_index() -> std::result::Result<(), PlebwireError> {
        let store: Arc<dyn ContentStore> = Arc::new(SledStore::temporary()?);
        let agg = aggregator(Arc::clone(&store)).await?;
        let author = Keypair::from_seed(&[7; 32]);
        let record = post(&author, "hello")?;
        let cid = store.put(&to_json(&record)?).await?;

        let update = agg.on_new_comment(cid, record).await?;
        assert_eq!(update.cid, cid);
        let stats = update.author.ok_or(PlebwireError::ProtocolError { reason: "no stats".into() })?;
        assert_eq!(stats.subplebbit.last_comment_cid, cid);

        let index_cid = store
            .resolve(&agg.address())
            .await?
            .ok_or(PlebwireError::ProtocolError { reason: "not published".into() })?;
        let bytes = store.get(&index_cid).await?.ok_or(PlebwireError::ProtocolError { reason: "missing".into() })?;
        let index = SubplebbitIndexRecord::from_json(&bytes)?;
        assert_eq!(index.posts.map(|p| p.page_cids.len()), Some(POST_SORTS.len()));
        assert_eq!(index.post_updates.map(|p| p.len()), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn votes_replace_and_retract() -> std::result::Result<(), PlebwireError> {
        let store: Arc<dyn ContentStore> = Arc::new(SledStore::temporary()?);
        let agg = aggregator(Arc::clone(&store)).await?;
        let author = Keypair::from_seed(&[7; 32]);
        let record = post(&author, "vote on me")?;
        let cid = store.put(&to_json(&record)?).await?;
        agg.on_new_comment(cid, record).await?;

        let voter = Author::new(Keypair::from_seed(&[8; 32]).address());
        let sub = sub_keypair().address();
        agg.on_vote(&Vote::new(sub, voter.clone(), Timestamp::from_secs(10), "1.0.0", cid, 1)).await?;
        agg.on_vote(&Vote::new(sub, voter.clone(), Timestamp::from_secs(5), "1.0.0", cid, -1)).await?;
        let u = agg.comment_update(&cid).await.ok_or(PlebwireError::ProtocolError { reason: "none".into() })?;
        assert_eq!((u.upvote_count, u.downvote_count), (1, 0));

        agg.on_vote(&Vote::new(sub, voter.clone(), Timestamp::from_secs(20), "1.0.0", cid, -1)).await?;
        let u = agg.comment_update(&cid).await.ok_or(PlebwireError::ProtocolError { reason: "none".into() })?;
        assert_eq!((u.upvote_count, u.downvote_count), (0, 1));
        assert_eq!(u.author.map(|a| a.subplebbit.post_score), Some(-1));

        agg.on_vote(&Vote::new(sub, voter, Timestamp::from_secs(30), "1.0.0", cid, 0)).await?;
        let u = agg.comment_update(&cid).await.ok_or(PlebwireError::ProtocolError { reason: "none".into() })?;
        assert_eq!((u.upvote_count, u.downvote_count), (0, 0));
        Ok(())
    }

    #[tokio::test]
    async fn vote_on_unknown_comment_is_rejected() -> std::result::Result<(), PlebwireError> {
        let store: Arc<dyn ContentStore> = Arc::new(SledStore::temporary()?);
        let agg = aggregator(store).await?;
        let vote = Vote::new(
            sub_keypair().address(),
            Author::new(Address::new([1; 32])),
            Timestamp::now(),
            "1.0.0",
            ContentId::from_bytes([5; 32]),
            1,
        );
        assert!(matches!(agg.on_vote(&vote).await, Err(PlebwireError::InvalidPublication { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn state_survives_reopen() -> std::result::Result<(), PlebwireError> {
        let store: Arc<dyn ContentStore> = Arc::new(SledStore::temporary()?);
        let agg = aggregator(Arc::clone(&store)).await?;
        let author = Keypair::from_seed(&[7; 32]);
        let record = post(&author, "persist me")?;
        let cid = store.put(&to_json(&record)?).await?;
        agg.on_new_comment(cid, record).await?;
        drop(agg);

        let reopened = aggregator(store).await?;
        assert_eq!(reopened.comment_count().await, 1);
        assert!(reopened.comment_update(&cid).await.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn repeated_comment_keeps_its_votes() -> std::result::Result<(), PlebwireError> {
        let store: Arc<dyn ContentStore> = Arc::new(SledStore::temporary()?);
        let agg = aggregator(Arc::clone(&store)).await?;
        let author = Keypair::from_seed(&[7; 32]);
        let record = post(&author, "only once")?;
        let cid = store.put(&to_json(&record)?).await?;
        agg.on_new_comment(cid, record.clone()).await?;

        let voter = Author::new(Keypair::from_seed(&[8; 32]).address());
        agg.on_vote(&Vote::new(sub_keypair().address(), voter, Timestamp::now(), "1.0.0", cid, 1))
            .await?;

        assert!(matches!(
            agg.on_new_comment(cid, record).await,
            Err(PlebwireError::InvalidPublication { .. })
        ));
        let u = agg.comment_update(&cid).await.ok_or(PlebwireError::ProtocolError { reason: "none".into() })?;
        assert_eq!(u.upvote_count, 1);
        assert_eq!(agg.comment_count().await, 1);
        Ok(())
    }
}
