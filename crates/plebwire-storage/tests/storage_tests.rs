//! Integration tests for the sled content store.

use plebwire_storage::{ContentStore, DirectoryListing, SledStore};
use plebwire_types::{Address, PlebwireError};

type TestResult = std::result::Result<(), PlebwireError>;

fn tempdir() -> std::result::Result<tempfile::TempDir, PlebwireError> {
    tempfile::tempdir().map_err(|e| PlebwireError::StorageError { reason: e.to_string() })
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn blocks_and_names_survive_reopen() -> TestResult {
    let dir = tempdir()?;
    let addr = Address::new([9; 32]);

    let cid = {
        let store = SledStore::open(dir.path())?;
        let cid = store.put(b"index record").await?;
        store.publish(&addr, &cid).await?;
        store.write_file("postUpdates/86400/x/update", b"update").await?;
        store.flush()?;
        cid
    };

    let store = SledStore::open(dir.path())?;
    assert_eq!(store.resolve(&addr).await?, Some(cid));
    assert_eq!(store.get(&cid).await?, Some(b"index record".to_vec()));
    let snapshot = store.stat("postUpdates/86400").await?;
    assert_eq!(store.cat(&snapshot, "x/update").await?, Some(b"update".to_vec()));
    Ok(())
}

// ---------------------------------------------------------------------------
// File tree
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stat_only_lists_the_requested_directory() -> TestResult {
    let store = SledStore::temporary()?;
    store.write_file("postUpdates/86400/a/update", b"a").await?;
    store.write_file("postUpdates/604800/b/update", b"b").await?;
    store.write_file("postUpdates/8640000/c/update", b"c").await?;

    let snapshot = store.stat("postUpdates/86400").await?;
    let raw = store.get(&snapshot).await?.ok_or(PlebwireError::StorageError {
        reason: "snapshot missing".into(),
    })?;
    let listing = DirectoryListing::from_bytes(&raw)?;
    assert_eq!(listing.entries.len(), 1);
    assert!(listing.entries.contains_key("a/update"));
    Ok(())
}

#[tokio::test]
async fn removed_file_disappears_from_next_snapshot() -> TestResult {
    let store = SledStore::temporary()?;
    store.write_file("bucket/a/update", b"a").await?;
    store.write_file("bucket/b/update", b"b").await?;
    store.remove_file("bucket/a/update").await?;
    store.remove_file("bucket/never-written").await?;

    let snapshot = store.stat("bucket").await?;
    assert_eq!(store.cat(&snapshot, "a/update").await?, None);
    assert_eq!(store.cat(&snapshot, "b/update").await?, Some(b"b".to_vec()));
    Ok(())
}

#[tokio::test]
async fn empty_directory_and_bad_snapshot() -> TestResult {
    let store = SledStore::temporary()?;
    let empty = store.stat("nothing/here").await?;
    assert_eq!(store.cat(&empty, "x").await?, None);

    let not_a_dir = store.put(b"plain block").await?;
    assert!(matches!(
        store.cat(&not_a_dir, "x").await,
        Err(PlebwireError::StorageError { .. })
    ));
    assert!(store.write_file("../escape", b"x").await.is_err());
    Ok(())
}
