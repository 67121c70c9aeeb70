//! Error type for `proofdesk-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A workflow outcome from the shared taxonomy (not pending, duplicate
  /// open request, optimistic conflict, ...).
  #[error(transparent)]
  Domain(#[from] proofdesk_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  /// A stored column failed to decode into its domain type.
  #[error("decode error: {0}")]
  Decode(String),
}

/// Lossless mapping into the core taxonomy: domain outcomes pass through,
/// everything else is reported as an infrastructure error.
impl From<Error> for proofdesk_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Domain(d) => d,
      other => proofdesk_core::Error::Store(Box::new(other)),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
