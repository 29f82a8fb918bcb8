//! Client-side read path.
//!
//! Readers never talk to the subplebbit directly: they resolve its
//! address to the latest index record, verify it, and read update files
//! out of the bucket directories the index points at.
//!
//! [`CommentPoller::watch`] returns a [`CommentUpdates`] handle that
//! polls on a fixed interval and yields an update only when its
//! `updatedAt` changed. Records that fail verification are skipped with
//! a warning. Dropping the handle stops polling; calling `watch` again
//! restarts it.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use plebwire_crypto::signing::PublicKey;
use plebwire_protocol::record::{CommentRecord, CommentUpdateRecord, SubplebbitIndexRecord};
use plebwire_protocol::validation::{validate_comment_update, validate_index_record};
use plebwire_storage::ContentStore;
use plebwire_types::config::ProtocolConfig;
use plebwire_types::{Address, ContentId, PlebwireError, Result, Timestamp};
use tokio::time::{Interval, MissedTickBehavior};

/// Resolves and verifies the current index record of `address`.
///
/// # Errors
///
/// - `StorageError` if nothing is published or the block is missing.
/// - `SignatureError` if the record is not signed by `address`.
pub async fn resolve_subplebbit(store: &dyn ContentStore, address: &Address) -> Result<SubplebbitIndexRecord> {
    let cid = store.resolve(address).await?.ok_or_else(|| PlebwireError::StorageError {
        reason: format!("no index published for {address}"),
    })?;
    let bytes = store.get(&cid).await?.ok_or_else(|| PlebwireError::StorageError {
        reason: format!("index block {cid} not found"),
    })?;
    let index = SubplebbitIndexRecord::from_json(&bytes)?;
    validate_index_record(&index, address)?;
    Ok(index)
}

/// The key publishers encrypt requests to, checked against the address.
///
/// # Errors
///
/// `SignatureError` if the advertised key does not belong to the
/// subplebbit.
pub fn encryption_key(index: &SubplebbitIndexRecord) -> Result<PublicKey> {
    let key = PublicKey::from_slice(&index.encryption.public_key)?;
    if key.address() != index.address {
        return Err(PlebwireError::SignatureError {
            reason: format!("advertised key does not match {}", index.address),
        });
    }
    Ok(key)
}

/// Fetches an immutable comment record.
///
/// # Errors
///
/// `StorageError` if the block is missing, `ProtocolError` if it is
/// not a comment record.
pub async fn fetch_comment(store: &dyn ContentStore, cid: &ContentId) -> Result<CommentRecord> {
    let bytes = store.get(cid).await?.ok_or_else(|| PlebwireError::StorageError {
        reason: format!("comment {cid} not found"),
    })?;
    CommentRecord::from_json(&bytes)
}

// ---------------------------------------------------------------------------
// CommentPoller
// ---------------------------------------------------------------------------

pub struct CommentPoller {
    store: Arc<dyn ContentStore>,
    subplebbit: Address,
    interval: Duration,
}

impl CommentPoller {
    pub fn new(store: Arc<dyn ContentStore>, subplebbit: Address, config: &ProtocolConfig) -> Self {
        Self {
            store,
            subplebbit,
            interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        }
    }

    /// Starts watching `cid`. Nothing is fetched until the first `next`.
    pub fn watch(&self, cid: ContentId) -> CommentUpdates {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        CommentUpdates {
            store: Arc::clone(&self.store),
            subplebbit: self.subplebbit,
            cid,
            ticker,
            last_updated_at: None,
        }
    }
}

/// Lazy, unbounded sequence of verified updates for one comment.
pub struct CommentUpdates {
    store: Arc<dyn ContentStore>,
    subplebbit: Address,
    cid: ContentId,
    ticker: Interval,
    last_updated_at: Option<Timestamp>,
}

impl CommentUpdates {
    pub fn cid(&self) -> &ContentId {
        &self.cid
    }

    /// Waits until a new update is published. Fetch errors are logged
    /// and retried on the next tick.
    pub async fn next(&mut self) -> CommentUpdateRecord {
        loop {
            self.ticker.tick().await;
            match self.poll_once().await {
                Ok(Some(update)) => return update,
                Ok(None) => {}
                Err(e) => tracing::warn!(cid = %self.cid, %e, "comment update poll failed"),
            }
        }
    }

    /// One fetch: the newest valid update across all buckets, if it is
    /// newer than the last one yielded.
    ///
    /// # Errors
    ///
    /// Index resolution failures. Bad update records are skipped, not
    /// returned as errors.
    pub async fn poll_once(&mut self) -> Result<Option<CommentUpdateRecord>> {
        let index = resolve_subplebbit(self.store.as_ref(), &self.subplebbit).await?;
        let Some(buckets) = index.post_updates else {
            return Ok(None);
        };

        let path = format!("{}/update", self.cid);
        let mut newest: Option<CommentUpdateRecord> = None;
        for (bucket, dir) in &buckets {
            let Some(bytes) = self.store.cat(dir, &path).await? else {
                continue;
            };
            let update = match CommentUpdateRecord::from_json(&bytes)
                .and_then(|u| validate_comment_update(&u, &self.subplebbit, &self.cid).map(|()| u))
            {
                Ok(u) => u,
                Err(e) => {
                    tracing::warn!(cid = %self.cid, %bucket, %e, "invalid comment update dropped");
                    continue;
                }
            };
            if newest.as_ref().map_or(true, |n| update.updated_at > n.updated_at) {
                newest = Some(update);
            }
        }

        match newest {
            Some(update) if Some(update.updated_at) != self.last_updated_at => {
                self.last_updated_at = Some(update.updated_at);
                Ok(Some(update))
            }
            _ => Ok(None),
        }
    }

    /// Adapts the handle into a `futures::Stream`.
    pub fn into_stream(self) -> impl Stream<Item = CommentUpdateRecord> {
        futures::stream::unfold(self, |mut updates| async move {
            let update = updates.next().await;
            Some((update, updates))
        })
    }
}
