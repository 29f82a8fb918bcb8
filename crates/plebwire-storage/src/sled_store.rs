//! sled-backed [`ContentStore`].
//!
//! Opens (or creates) a sled database with three trees:
//!
//! - `blocks`: content id (32 bytes) → bytes
//! - `names`: address (32 bytes) → content id
//! - `files`: normalized path (UTF-8) → content id
//!
//! File contents are themselves blocks, so `stat` only has to copy
//! ids into a listing.

use std::path::Path;

use async_trait::async_trait;
use plebwire_crypto::hash::compute_content_id;
use plebwire_types::{Address, ContentId, PlebwireError, Result};

use crate::directory::{dir_prefix, normalize_path, DirectoryListing};
use crate::ContentStore;

const TREE_BLOCKS: &str = "blocks";
const TREE_NAMES: &str = "names";
const TREE_FILES: &str = "files";

fn storage_err(context: &str, e: sled::Error) -> PlebwireError {
    PlebwireError::StorageError {
        reason: format!("{context}: {e}"),
    }
}

fn cid_from_ivec(value: &[u8]) -> Result<ContentId> {
    let bytes: [u8; 32] = value.try_into().map_err(|_| PlebwireError::StorageError {
        reason: format!("stored content id has length {}, expected 32", value.len()),
    })?;
    Ok(ContentId::from_bytes(bytes))
}

// ---------------------------------------------------------------------------
// SledStore
// ---------------------------------------------------------------------------

/// Content store persisted in a sled database.
pub struct SledStore {
    db: sled::Db,
    blocks: sled::Tree,
    names: sled::Tree,
    files: sled::Tree,
}

impl SledStore {
    /// Opens or creates a store at `path`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the database or a tree cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path).map_err(|e| storage_err(&format!("failed to open database at {}", path.display()), e))?;
        Self::from_db(db)
    }

    /// Opens a store that is deleted when dropped.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if sled cannot create the temporary database.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| storage_err("failed to open temporary database", e))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let open = |name: &str| db.open_tree(name).map_err(|e| storage_err(&format!("failed to open tree '{name}'"), e));
        let blocks = open(TREE_BLOCKS)?;
        let names = open(TREE_NAMES)?;
        let files = open(TREE_FILES)?;
        Ok(Self { db, blocks, names, files })
    }

    /// Flushes all pending writes to disk.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the flush fails.
    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(|e| storage_err("flush failed", e))?;
        Ok(())
    }

    fn put_block(&self, bytes: &[u8]) -> Result<ContentId> {
        let cid = compute_content_id(bytes);
        self.blocks
            .insert(cid.as_bytes(), bytes)
            .map_err(|e| storage_err("block insert failed", e))?;
        Ok(cid)
    }

    fn get_block(&self, cid: &ContentId) -> Result<Option<Vec<u8>>> {
        let value = self
            .blocks
            .get(cid.as_bytes())
            .map_err(|e| storage_err("block read failed", e))?;
        Ok(value.map(|v| v.to_vec()))
    }
}

#[async_trait]
impl ContentStore for SledStore {
    async fn put(&self, bytes: &[u8]) -> Result<ContentId> {
        self.put_block(bytes)
    }

    async fn get(&self, cid: &ContentId) -> Result<Option<Vec<u8>>> {
        self.get_block(cid)
    }

    async fn publish(&self, address: &Address, cid: &ContentId) -> Result<()> {
        self.names
            .insert(address.as_bytes(), cid.as_bytes())
            .map_err(|e| storage_err("name publish failed", e))?;
        tracing::debug!(%address, %cid, "name published");
        Ok(())
    }

    async fn resolve(&self, address: &Address) -> Result<Option<ContentId>> {
        let value = self
            .names
            .get(address.as_bytes())
            .map_err(|e| storage_err("name resolve failed", e))?;
        value.map(|v| cid_from_ivec(&v)).transpose()
    }

    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<ContentId> {
        let key = normalize_path(path)?;
        let cid = self.put_block(bytes)?;
        self.files
            .insert(key.as_bytes(), cid.as_bytes())
            .map_err(|e| storage_err("file write failed", e))?;
        Ok(cid)
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        let key = normalize_path(path)?;
        self.files
            .remove(key.as_bytes())
            .map_err(|e| storage_err("file remove failed", e))?;
        Ok(())
    }

    async fn stat(&self, dir: &str) -> Result<ContentId> {
        let prefix = dir_prefix(dir)?;
        let mut listing = DirectoryListing::default();
        for item in self.files.scan_prefix(prefix.as_bytes()) {
            let (key, value) = item.map_err(|e| storage_err("directory scan failed", e))?;
            let full = std::str::from_utf8(&key).map_err(|_| PlebwireError::StorageError {
                reason: "file path is not valid UTF-8".into(),
            })?;
            let relative = full[prefix.len()..].to_string();
            listing.entries.insert(relative, cid_from_ivec(&value)?);
        }
        self.put_block(&listing.to_bytes()?)
    }

    async fn cat(&self, dir_cid: &ContentId, path: &str) -> Result<Option<Vec<u8>>> {
        let Some(raw) = self.get_block(dir_cid)? else {
            return Ok(None);
        };
        let listing = DirectoryListing::from_bytes(&raw)?;
        match listing.lookup(path)? {
            Some(cid) => self.get_block(&cid),
            None => Ok(None),
        }
    }
}
