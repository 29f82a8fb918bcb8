//! Content store for plebwire.
//!
//! Three kinds of state live behind the [`ContentStore`] trait:
//!
//! - **blocks**: immutable bytes addressed by their [`ContentId`]
//!   (SHA-256). Writing the same bytes twice yields the same id.
//! - **names**: mutable pointers from an [`Address`] to a content id,
//!   republished whenever a subplebbit's index changes.
//! - **files**: a mutable path tree (`postUpdates/86400/<cid>/update`)
//!   whose directories can be snapshotted with [`ContentStore::stat`]
//!   into an immutable listing and read back with [`ContentStore::cat`].
//!
//! [`SledStore`] is the sled-backed implementation.

pub mod directory;
pub mod sled_store;

use async_trait::async_trait;
use plebwire_types::{Address, ContentId, Result};

pub use directory::DirectoryListing;
pub use sled_store::SledStore;

/// Storage collaborator used by the subplebbit node and the poller.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Stores `bytes` immutably and returns their content id.
    async fn put(&self, bytes: &[u8]) -> Result<ContentId>;

    /// Fetches a block, `None` if it is unknown.
    async fn get(&self, cid: &ContentId) -> Result<Option<Vec<u8>>>;

    /// Points `address` at `cid`, replacing any previous pointer.
    async fn publish(&self, address: &Address, cid: &ContentId) -> Result<()>;

    /// Resolves the current pointer for `address`.
    async fn resolve(&self, address: &Address) -> Result<Option<ContentId>>;

    /// Writes `bytes` at `path` in the mutable file tree, returning the
    /// content id of the stored bytes.
    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<ContentId>;

    /// Removes `path` from the file tree. Missing paths are not an error.
    async fn remove_file(&self, path: &str) -> Result<()>;

    /// Snapshots every file under `dir` into an immutable
    /// [`DirectoryListing`] block and returns its id.
    async fn stat(&self, dir: &str) -> Result<ContentId>;

    /// Reads `path` relative to the directory snapshot `dir_cid`.
    async fn cat(&self, dir_cid: &ContentId, path: &str) -> Result<Option<Vec<u8>>>;
}
