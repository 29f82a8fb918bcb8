//! Content publisher: turns an accepted comment into stored records.

use std::sync::Arc;

use plebwire_crypto::signing::Keypair;
use plebwire_protocol::message::VerificationPayload;
use plebwire_protocol::publication::Comment;
use plebwire_protocol::record::{to_json, CommentRecord, CommentUpdateRecord};
use plebwire_storage::ContentStore;
use plebwire_types::config::ProtocolConfig;
use plebwire_types::{ContentId, PlebwireError, Result, Timestamp};

use crate::aggregator::{already_published, update_path, Aggregator};

/// Result of publishing one comment.
#[derive(Clone, Debug)]
pub struct PublishedComment {
    pub cid: ContentId,
    pub record: CommentRecord,
    pub update: CommentUpdateRecord,
}

impl PublishedComment {
    /// Payload returned to the author in the verification message.
    pub fn into_payload(self) -> VerificationPayload {
        VerificationPayload {
            comment: self.record,
            comment_update: self.update,
        }
    }
}

pub struct ContentPublisher {
    store: Arc<dyn ContentStore>,
    aggregator: Arc<Aggregator>,
    keypair: Keypair,
    config: ProtocolConfig,
}

impl ContentPublisher {
    pub fn new(store: Arc<dyn ContentStore>, aggregator: Arc<Aggregator>, keypair: Keypair, config: ProtocolConfig) -> Self {
        Self {
            store,
            aggregator,
            keypair,
            config,
        }
    }

    /// Stores `comment`, writes its initial update and hands it to the
    /// aggregator.
    ///
    /// # Errors
    ///
    /// - `InvalidPublication` if the comment was already published, or
    ///   its parent is missing, belongs to another subplebbit or
    ///   disagrees on `postCid`.
    /// - `StorageError` if any write fails.
    pub async fn publish(&self, comment: Comment) -> Result<PublishedComment> {
        let (depth, post_timestamp) = match comment.parent_cid {
            None => (0, comment.timestamp),
            Some(parent_cid) => {
                let parent = self.load(&parent_cid).await?;
                if parent.comment().subplebbit_address != comment.subplebbit_address {
                    return Err(PlebwireError::InvalidPublication {
                        reason: format!("parent {parent_cid} belongs to another subplebbit"),
                    });
                }
                let post_cid = parent.post_cid_or(parent_cid);
                if comment.post_cid != Some(post_cid) {
                    return Err(PlebwireError::InvalidPublication {
                        reason: format!("postCid must be {post_cid}"),
                    });
                }
                let post_timestamp = if post_cid == parent_cid {
                    parent.comment().timestamp
                } else {
                    self.load(&post_cid).await?.comment().timestamp
                };
                (parent.depth() + 1, post_timestamp)
            }
        };

        let record = CommentRecord::new(comment, depth);
        let cid = self.store.put(&to_json(&record)?).await?;
        if self.aggregator.comment_record(&cid).await.is_some() {
            return Err(already_published(&cid));
        }

        let now = Timestamp::now();
        let initial = CommentUpdateRecord::initial(cid, now, self.config.protocol_version.clone()).sign(&self.keypair)?;
        let bucket = self.config.bucket_for_age(post_timestamp.age_at(now));
        let path = update_path(bucket, &cid);
        self.store.write_file(&path, &to_json(&initial)?).await?;

        let update = match self.aggregator.on_new_comment(cid, record.clone()).await {
            Ok(update) => update,
            Err(e) => {
                if let Err(cleanup) = self.store.remove_file(&path).await {
                    tracing::warn!(%cid, %cleanup, "initial update of rejected comment not removed");
                }
                return Err(e);
            }
        };
        tracing::info!(%cid, depth, "comment published");
        Ok(PublishedComment { cid, record, update })
    }

    async fn load(&self, cid: &ContentId) -> Result<CommentRecord> {
        let bytes = self.store.get(cid).await?.ok_or_else(|| PlebwireError::InvalidPublication {
            reason: format!("parent comment {cid} not found"),
        })?;
        CommentRecord::from_json(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use plebwire_protocol::publication::Author;
    use plebwire_storage::SledStore;

    use crate::aggregator::SubplebbitProfile;

    async fn setup() -> Result<(Arc<dyn ContentStore>, ContentPublisher)> {
        let store: Arc<dyn ContentStore> = Arc::new(SledStore::temporary()?);
        let sub = Keypair::from_seed(&[0x42; 32]);
        let aggregator = Aggregator::open(
            Arc::clone(&store),
            Keypair::from_seed(&sub.seed_bytes()),
            ProtocolConfig::default(),
            SubplebbitProfile::default(),
            BTreeMap::new(),
        )
        .await?;
        let publisher = ContentPublisher::new(Arc::clone(&store), Arc::new(aggregator), sub, ProtocolConfig::default());
        Ok((store, publisher))
    }

    fn comment(author: &Keypair) -> Comment {
        Comment::new(
            Keypair::from_seed(&[0x42; 32]).address(),
            Author::new(author.address()),
            Timestamp::now(),
            "1.0.0",
        )
    }

    #[tokio::test]
    async fn depth_follows_parent_chain() -> std::result::Result<(), PlebwireError> {
        let (store, publisher) = setup().await?;
        let author = Keypair::from_seed(&[1; 32]);

        let post = publisher.publish(comment(&author).with_title("post").sign(&author)?).await?;
        assert_eq!(post.record.depth(), 0);

        let reply = comment(&author).with_content("reply").reply_to(post.cid, post.cid).sign(&author)?;
        let reply = publisher.publish(reply).await?;
        assert_eq!(reply.record.depth(), 1);

        let nested = comment(&author).with_content("nested").reply_to(reply.cid, post.cid).sign(&author)?;
        let nested = publisher.publish(nested).await?;
        assert_eq!(nested.record.depth(), 2);

        let stored = store.get(&nested.cid).await?.ok_or(PlebwireError::StorageError { reason: "missing".into() })?;
        assert_eq!(CommentRecord::from_json(&stored)?, nested.record);
        Ok(())
    }

    #[tokio::test]
    async fn reply_with_wrong_post_cid_is_rejected() -> std::result::Result<(), PlebwireError> {
        let (_store, publisher) = setup().await?;
        let author = Keypair::from_seed(&[1; 32]);
        let post = publisher.publish(comment(&author).with_title("post").sign(&author)?).await?;

        let bogus = ContentId::from_bytes([9; 32]);
        let reply = comment(&author).with_content("r").reply_to(post.cid, bogus).sign(&author)?;
        assert!(matches!(publisher.publish(reply).await, Err(PlebwireError::InvalidPublication { .. })));

        let orphan = comment(&author).with_content("r").reply_to(bogus, bogus).sign(&author)?;
        assert!(matches!(publisher.publish(orphan).await, Err(PlebwireError::InvalidPublication { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn republishing_a_comment_changes_nothing() -> std::result::Result<(), PlebwireError> {
        let (_store, publisher) = setup().await?;
        let author = Keypair::from_seed(&[1; 32]);
        let post = publisher.publish(comment(&author).with_title("post").sign(&author)?).await?;
        let reply = comment(&author).with_content("once").reply_to(post.cid, post.cid).sign(&author)?;
        publisher.publish(reply.clone()).await?;

        assert!(matches!(publisher.publish(reply).await, Err(PlebwireError::InvalidPublication { .. })));
        let update = publisher
            .aggregator
            .comment_update(&post.cid)
            .await
            .ok_or(PlebwireError::StorageError { reason: "missing".into() })?;
        assert_eq!(update.reply_count, 1);
        assert_eq!(update.replies.map(|r| r.pages.get("topAll").map_or(0, |p| p.comments.len())), Some(1));
        assert_eq!(publisher.aggregator.comment_count().await, 2);
        Ok(())
    }
}
