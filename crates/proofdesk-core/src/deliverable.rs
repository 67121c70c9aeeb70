//! Deliverable versions — the fundamental unit of the Proofdesk ledger.
//!
//! A deliverable version is an immutable submission against a lineage. The
//! ledger is append-only per lineage; the only in-place mutation ever issued
//! is the status transition on the current latest version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Lineage ─────────────────────────────────────────────────────────────────

/// The identity of one deliverable slot: a purchased feature on a purchase.
/// Not a stored row — the grouping key over which versions are ordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lineage {
  pub purchase_id:  Uuid,
  pub feature_name: String,
}

impl Lineage {
  pub fn new(purchase_id: Uuid, feature_name: impl Into<String>) -> Self {
    Self { purchase_id, feature_name: feature_name.into() }
  }
}

impl std::fmt::Display for Lineage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "purchase {} / feature {:?}", self.purchase_id, self.feature_name)
  }
}

// ─── Content ─────────────────────────────────────────────────────────────────

/// The payload of a deliverable version: a blob-store reference XOR an
/// external link. The field names are part of the wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
  FileRef { file_reference: String },
  ExternalLink { external_link: String },
}

impl Content {
  /// Validate raw input into well-formed content.
  ///
  /// Exactly one of the two fields must be present; links must parse as
  /// absolute URLs. Anything else is [`Error::InvalidContent`].
  pub fn from_parts(
    file_reference: Option<String>,
    external_link: Option<String>,
  ) -> Result<Self> {
    match (file_reference, external_link) {
      (Some(_), Some(_)) => Err(Error::InvalidContent(
        "both file_reference and external_link were supplied".into(),
      )),
      (None, None) => Err(Error::InvalidContent(
        "neither file_reference nor external_link was supplied".into(),
      )),
      (Some(reference), None) => {
        if reference.is_empty() {
          return Err(Error::InvalidContent("empty file_reference".into()));
        }
        Ok(Self::FileRef { file_reference: reference })
      }
      (None, Some(link)) => {
        // `Url::parse` rejects relative references, so a successful parse
        // means the link is absolute.
        url::Url::parse(&link).map_err(|e| {
          Error::InvalidContent(format!("external_link {link:?}: {e}"))
        })?;
        Ok(Self::ExternalLink { external_link: link })
      }
    }
  }

  pub fn file_reference(&self) -> Option<&str> {
    match self {
      Self::FileRef { file_reference } => Some(file_reference),
      Self::ExternalLink { .. } => None,
    }
  }

  pub fn external_link(&self) -> Option<&str> {
    match self {
      Self::FileRef { .. } => None,
      Self::ExternalLink { external_link } => Some(external_link),
    }
  }
}

/// Unvalidated content fields as they arrive from a caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentInput {
  pub file_reference: Option<String>,
  pub external_link:  Option<String>,
}

impl ContentInput {
  pub fn validate(self) -> Result<Content> {
    Content::from_parts(self.file_reference, self.external_link)
  }
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// Review state of a deliverable version. Meaningful only on the latest
/// version of a lineage; superseded versions keep whatever status they had.
///
/// The wire strings are contractual and must not be renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverableStatus {
  Pending,
  Approved,
  RevisionRequested,
}

impl DeliverableStatus {
  /// `pending → approved`; any other source state is rejected.
  pub fn approve(self, version_id: Uuid) -> Result<Self> {
    match self {
      Self::Pending => Ok(Self::Approved),
      _ => Err(Error::NotPending(version_id)),
    }
  }

  /// `pending → revision_requested`; any other source state is rejected.
  pub fn request_revision(self, version_id: Uuid) -> Result<Self> {
    match self {
      Self::Pending => Ok(Self::RevisionRequested),
      _ => Err(Error::NotPending(version_id)),
    }
  }

  pub fn is_pending(self) -> bool { matches!(self, Self::Pending) }
}

// ─── DeliverableVersion ──────────────────────────────────────────────────────

/// One concrete submission within a lineage. Immutable once written, except
/// for the `pending → approved` / `pending → revision_requested` transition
/// applied while it is the latest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverableVersion {
  pub version_id:     Uuid,
  pub purchase_id:    Uuid,
  pub feature_name:   String,
  /// 1-based, strictly increasing, gapless within the lineage.
  pub version_number: i64,
  #[serde(flatten)]
  pub content:        Content,
  pub status:         DeliverableStatus,
  pub uploaded_by:    Uuid,
  /// Server-assigned timestamp; never changes after creation.
  pub uploaded_at:    DateTime<Utc>,
  pub admin_notes:    Option<String>,
}

impl DeliverableVersion {
  pub fn lineage(&self) -> Lineage {
    Lineage::new(self.purchase_id, self.feature_name.clone())
  }
}

// ─── NewDeliverable ──────────────────────────────────────────────────────────

/// Input to [`crate::store::DeliverableStore::append_version`].
/// `version_number`, `status`, and `uploaded_at` are always set by the store.
#[derive(Debug, Clone)]
pub struct NewDeliverable {
  pub lineage:     Lineage,
  pub content:     Content,
  pub uploaded_by: Uuid,
  pub admin_notes: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn content_requires_exactly_one_field() {
    let both = Content::from_parts(
      Some("blob/abc".into()),
      Some("https://example.com/x".into()),
    );
    assert!(matches!(both, Err(Error::InvalidContent(_))));

    let neither = Content::from_parts(None, None);
    assert!(matches!(neither, Err(Error::InvalidContent(_))));
  }

  #[test]
  fn content_accepts_file_reference() {
    let c = Content::from_parts(Some("blob/abc".into()), None).unwrap();
    assert_eq!(c.file_reference(), Some("blob/abc"));
    assert_eq!(c.external_link(), None);
  }

  #[test]
  fn content_rejects_relative_link() {
    let c = Content::from_parts(None, Some("/just/a/path".into()));
    assert!(matches!(c, Err(Error::InvalidContent(_))));
  }

  #[test]
  fn content_accepts_absolute_link() {
    let c =
      Content::from_parts(None, Some("https://cdn.example.com/v1.pdf".into()))
        .unwrap();
    assert_eq!(c.external_link(), Some("https://cdn.example.com/v1.pdf"));
  }

  #[test]
  fn status_transitions() {
    let id = Uuid::new_v4();
    assert_eq!(
      DeliverableStatus::Pending.approve(id).unwrap(),
      DeliverableStatus::Approved
    );
    assert_eq!(
      DeliverableStatus::Pending.request_revision(id).unwrap(),
      DeliverableStatus::RevisionRequested
    );
    assert!(matches!(
      DeliverableStatus::Approved.approve(id),
      Err(Error::NotPending(_))
    ));
    assert!(matches!(
      DeliverableStatus::RevisionRequested.request_revision(id),
      Err(Error::NotPending(_))
    ));
  }

  #[test]
  fn status_wire_strings() {
    let s = serde_json::to_string(&DeliverableStatus::RevisionRequested);
    assert_eq!(s.unwrap(), "\"revision_requested\"");
  }
}
