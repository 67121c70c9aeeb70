//! Error types for `proofdesk-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::deliverable::Lineage;

/// Every user-facing failure mode of the workflow. All variants except
/// [`Error::Store`] are recoverable outcomes that map to 4xx responses.
#[derive(Debug, Error)]
pub enum Error {
  #[error("no such package feature: {0}")]
  LineageNotFound(Lineage),

  #[error("deliverable version not found: {0}")]
  VersionNotFound(Uuid),

  #[error("revision request not found: {0}")]
  RequestNotFound(Uuid),

  #[error("a deliverable already exists for {0}; respond with a new version instead")]
  VersionExists(Lineage),

  #[error("no deliverable has been submitted for {0}")]
  NoVersions(Lineage),

  #[error("package feature already exists: {0}")]
  FeatureExists(Lineage),

  #[error("invalid content: {0}")]
  InvalidContent(String),

  #[error("version {0} is not awaiting review")]
  NotPending(Uuid),

  #[error("revision request {0} is no longer editable")]
  NotEditable(Uuid),

  #[error("requester does not own revision request {0}")]
  Forbidden(Uuid),

  #[error("an open revision request already exists for version {0}")]
  DuplicateOpenRequest(Uuid),

  /// Lost a race on a latest-version mutation; the caller should re-read
  /// the lineage and decide again rather than retry blindly.
  #[error("latest version of {0} changed underneath this operation")]
  OptimisticConflict(Lineage),

  /// Genuine store unavailability; transient and safe to retry.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
