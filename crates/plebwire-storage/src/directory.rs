//! Path normalization and directory snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use plebwire_types::{ContentId, PlebwireError, Result};

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Normalizes a slash-separated path: strips leading and trailing
/// slashes and rejects empty, `.` and `..` segments.
///
/// # Errors
///
/// `StorageError` if the path is empty or contains an invalid segment.
pub fn normalize_path(path: &str) -> Result<String> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(PlebwireError::StorageError {
            reason: "empty path".into(),
        });
    }
    for segment in trimmed.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(PlebwireError::StorageError {
                reason: format!("invalid path segment in {path:?}"),
            });
        }
    }
    Ok(trimmed.to_string())
}

/// Key prefix matching every file below `dir`.
pub(crate) fn dir_prefix(dir: &str) -> Result<String> {
    Ok(format!("{}/", normalize_path(dir)?))
}

// ---------------------------------------------------------------------------
// DirectoryListing
// ---------------------------------------------------------------------------

/// Immutable snapshot of a directory: relative path → file content id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryListing {
    pub entries: BTreeMap<String, ContentId>,
}

impl DirectoryListing {
    /// Looks up the content id of `path` relative to the directory.
    pub fn lookup(&self, path: &str) -> Result<Option<ContentId>> {
        let key = normalize_path(path)?;
        Ok(self.entries.get(&key).copied())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| PlebwireError::StorageError {
            reason: format!("directory listing encoding failed: {e}"),
        })
    }

    /// # Errors
    ///
    /// `StorageError` if `bytes` is not a directory listing.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| PlebwireError::StorageError {
            reason: format!("block is not a directory listing: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_slashes() -> std::result::Result<(), PlebwireError> {
        assert_eq!(normalize_path("/postUpdates/86400/")?, "postUpdates/86400");
        assert_eq!(dir_prefix("postUpdates")?, "postUpdates/");
        Ok(())
    }

    #[test]
    fn normalize_rejects_traversal() {
        assert!(normalize_path("").is_err());
        assert!(normalize_path("/").is_err());
        assert!(normalize_path("a//b").is_err());
        assert!(normalize_path("a/../b").is_err());
    }

    #[test]
    fn listing_lookup() -> std::result::Result<(), PlebwireError> {
        let mut listing = DirectoryListing::default();
        let cid = ContentId::from_bytes([7; 32]);
        listing.entries.insert("abc/update".into(), cid);
        let decoded = DirectoryListing::from_bytes(&listing.to_bytes()?)?;
        assert_eq!(decoded.lookup("/abc/update")?, Some(cid));
        assert_eq!(decoded.lookup("abc")?, None);
        assert!(DirectoryListing::from_bytes(b"not json").is_err());
        Ok(())
    }
}
