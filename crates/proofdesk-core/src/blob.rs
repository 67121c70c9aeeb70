//! The `BlobStore` trait — opaque content persistence.
//!
//! Deliverable file payloads never live in the relational store; versions
//! carry only an opaque reference handed out by this seam. A version's
//! content, once written, is never mutated.

use std::future::Future;

/// Durable storage for uploaded file content, addressed by an opaque
/// reference string.
pub trait BlobStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist `bytes` and return the reference to store on the version.
  fn put(
    &self,
    bytes: Vec<u8>,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + '_;

  /// Fetch content by reference. Returns `None` for unknown references.
  fn get<'a>(
    &'a self,
    reference: &'a str,
  ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send + 'a;
}
