//! Paginated listings.
//!
//! Each sort produces a chain of immutable pages. Pages are written
//! last-to-first so every page can carry the content id of its
//! successor in `nextCid`. The default sort's first page is also
//! inlined in the returned [`Pages`].

use plebwire_protocol::record::{to_json, Page, PageEntry, Pages};
use plebwire_storage::ContentStore;
use plebwire_types::{ContentId, PlebwireError, Result};

use crate::sort::SortType;

/// Sorts `entries` once per listing and writes the page chains.
///
/// Returns `None` when there is nothing to list.
///
/// # Errors
///
/// Propagates store failures.
pub async fn write_pages(
    store: &dyn ContentStore,
    entries: &[PageEntry],
    sorts: &[SortType],
    default_sort: SortType,
    page_size: usize,
) -> Result<Option<Pages>> {
    if entries.is_empty() {
        return Ok(None);
    }
    let page_size = page_size.max(1);
    let mut pages = Pages::default();

    for sort in sorts {
        let mut sorted = entries.to_vec();
        sort.sort(&mut sorted);

        let mut next_cid = None;
        let mut first = None;
        for chunk in sorted.chunks(page_size).rev() {
            let page = Page {
                comments: chunk.to_vec(),
                next_cid,
            };
            next_cid = Some(store.put(&to_json(&page)?).await?);
            first = Some(page);
        }

        if let (Some(cid), Some(page)) = (next_cid, first) {
            pages.page_cids.insert(sort.name().to_string(), cid);
            if *sort == default_sort {
                pages.pages.insert(sort.name().to_string(), page);
            }
        }
    }

    tracing::trace!(entries = entries.len(), listings = pages.page_cids.len(), "pages written");
    Ok(Some(pages))
}

/// Follows a page chain from `first` and concatenates its entries.
///
/// # Errors
///
/// `StorageError` if a page in the chain is missing, `ProtocolError` if
/// one is malformed.
pub async fn read_all_pages(store: &dyn ContentStore, first: &ContentId) -> Result<Vec<PageEntry>> {
    let mut entries = Vec::new();
    let mut next = Some(*first);
    while let Some(cid) = next {
        let bytes = store.get(&cid).await?.ok_or_else(|| PlebwireError::StorageError {
            reason: format!("page {cid} not found"),
        })?;
        let page = Page::from_json(&bytes)?;
        entries.extend(page.comments);
        next = page.next_cid;
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use plebwire_protocol::publication::{Author, Comment};
    use plebwire_protocol::record::{CommentRecord, CommentUpdateRecord};
    use plebwire_storage::SledStore;
    use plebwire_types::{Address, Timestamp};

    use crate::sort::{POST_SORTS, REPLY_SORTS};

    fn entry(id: u8, ts: u64) -> PageEntry {
        let comment = Comment::new(Address::new([1; 32]), Author::new(Address::new([2; 32])), Timestamp::from_secs(ts), "1.0.0")
            .with_content(format!("comment {id}"));
        PageEntry {
            comment: CommentRecord::new(comment, 0),
            comment_update: CommentUpdateRecord::initial(ContentId::from_bytes([id; 32]), Timestamp::from_secs(ts), "1.0.0"),
        }
    }

    #[tokio::test]
    async fn empty_listing_writes_nothing() -> std::result::Result<(), PlebwireError> {
        let store = SledStore::temporary()?;
        assert!(write_pages(&store, &[], POST_SORTS, SortType::Hot, 10).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn chain_covers_every_entry_in_order() -> std::result::Result<(), PlebwireError> {
        let store = SledStore::temporary()?;
        let entries: Vec<_> = (1..=7).map(|i| entry(i, u64::from(i) * 10)).collect();
        let pages = write_pages(&store, &entries, REPLY_SORTS, SortType::TopAll, 3)
            .await?
            .ok_or(PlebwireError::ProtocolError { reason: "no pages".into() })?;

        assert_eq!(pages.page_cids.len(), REPLY_SORTS.len());
        assert_eq!(pages.pages.len(), 1);
        assert_eq!(pages.pages["topAll"].comments.len(), 3);
        assert!(pages.pages["topAll"].next_cid.is_some());

        let new_cid = pages.page_cids["new"];
        let all = read_all_pages(&store, &new_cid).await?;
        let stamps: Vec<_> = all.iter().map(|e| e.comment.comment().timestamp.as_secs()).collect();
        assert_eq!(stamps, vec![70, 60, 50, 40, 30, 20, 10]);
        Ok(())
    }

    #[tokio::test]
    async fn missing_page_is_an_error() -> std::result::Result<(), PlebwireError> {
        let store = SledStore::temporary()?;
        let result = read_all_pages(&store, &ContentId::from_bytes([9; 32])).await;
        assert!(matches!(result, Err(PlebwireError::StorageError { .. })));
        Ok(())
    }
}
