//! Content-addressed filesystem blob store.
//!
//! Payloads are written once under their SHA-256 hex digest; the digest is
//! the opaque reference stored on deliverable versions. Writing the same
//! bytes twice is a no-op, which makes client retries of an upload safe.

use std::path::PathBuf;

use proofdesk_core::blob::BlobStore;
use sha2::{Digest as _, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("invalid blob reference: {0:?}")]
  InvalidReference(String),
}

/// Blob storage rooted at a single directory.
#[derive(Clone)]
pub struct FsBlobStore {
  root: PathBuf,
}

impl FsBlobStore {
  /// Create the root directory if needed and return the store.
  pub async fn open(root: impl Into<PathBuf>) -> Result<Self, BlobError> {
    let root = root.into();
    tokio::fs::create_dir_all(&root).await?;
    Ok(Self { root })
  }
}

impl BlobStore for FsBlobStore {
  type Error = BlobError;

  async fn put(&self, bytes: Vec<u8>) -> Result<String, BlobError> {
    let reference = hex::encode(Sha256::digest(&bytes));
    tokio::fs::write(self.root.join(&reference), bytes).await?;
    Ok(reference)
  }

  async fn get(&self, reference: &str) -> Result<Option<Vec<u8>>, BlobError> {
    // References are hex digests; anything else never names a blob and
    // must not reach the filesystem as a path.
    if reference.is_empty()
      || !reference.chars().all(|c| c.is_ascii_hexdigit())
    {
      return Err(BlobError::InvalidReference(reference.to_string()));
    }

    match tokio::fs::read(self.root.join(reference)).await {
      Ok(bytes) => Ok(Some(bytes)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e.into()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn put_then_get_roundtrips() {
    let dir = std::env::temp_dir().join(format!("proofdesk-blobs-{}", std::process::id()));
    let store = FsBlobStore::open(&dir).await.unwrap();

    let reference = store.put(b"final-logo-v2".to_vec()).await.unwrap();
    let fetched = store.get(&reference).await.unwrap();
    assert_eq!(fetched.as_deref(), Some(b"final-logo-v2".as_slice()));

    tokio::fs::remove_dir_all(&dir).await.ok();
  }

  #[tokio::test]
  async fn unknown_reference_is_none() {
    let dir = std::env::temp_dir().join(format!("proofdesk-blobs-miss-{}", std::process::id()));
    let store = FsBlobStore::open(&dir).await.unwrap();

    let missing = store.get("deadbeef").await.unwrap();
    assert!(missing.is_none());

    tokio::fs::remove_dir_all(&dir).await.ok();
  }

  #[tokio::test]
  async fn path_like_reference_rejected() {
    let dir = std::env::temp_dir().join(format!("proofdesk-blobs-bad-{}", std::process::id()));
    let store = FsBlobStore::open(&dir).await.unwrap();

    let result = store.get("../etc/passwd").await;
    assert!(matches!(result, Err(BlobError::InvalidReference(_))));

    tokio::fs::remove_dir_all(&dir).await.ok();
  }
}
