//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Status enums are stored as
//! their wire strings. UUIDs are stored as hyphenated lowercase strings.

use chrono::{DateTime, Utc};
use proofdesk_core::{
  deliverable::{Content, DeliverableStatus, DeliverableVersion},
  feature::{FeatureStatus, PackageFeature},
  revision::{RevisionRequest, RevisionStatus},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(e.to_string()))
}

// ─── DeliverableStatus ───────────────────────────────────────────────────────

pub fn encode_deliverable_status(s: DeliverableStatus) -> &'static str {
  match s {
    DeliverableStatus::Pending => "pending",
    DeliverableStatus::Approved => "approved",
    DeliverableStatus::RevisionRequested => "revision_requested",
  }
}

pub fn decode_deliverable_status(s: &str) -> Result<DeliverableStatus> {
  match s {
    "pending" => Ok(DeliverableStatus::Pending),
    "approved" => Ok(DeliverableStatus::Approved),
    "revision_requested" => Ok(DeliverableStatus::RevisionRequested),
    other => Err(Error::Decode(format!("unknown deliverable status: {other:?}"))),
  }
}

// ─── RevisionStatus ──────────────────────────────────────────────────────────

pub fn decode_revision_status(s: &str) -> Result<RevisionStatus> {
  match s {
    "pending" => Ok(RevisionStatus::Pending),
    "in_progress" => Ok(RevisionStatus::InProgress),
    "completed" => Ok(RevisionStatus::Completed),
    other => Err(Error::Decode(format!("unknown revision status: {other:?}"))),
  }
}

// ─── FeatureStatus ───────────────────────────────────────────────────────────

pub fn encode_feature_status(s: FeatureStatus) -> &'static str {
  match s {
    FeatureStatus::Pending => "pending",
    FeatureStatus::InProgress => "in_progress",
    FeatureStatus::Delivered => "delivered",
  }
}

pub fn decode_feature_status(s: &str) -> Result<FeatureStatus> {
  match s {
    "pending" => Ok(FeatureStatus::Pending),
    "in_progress" => Ok(FeatureStatus::InProgress),
    "delivered" => Ok(FeatureStatus::Delivered),
    other => Err(Error::Decode(format!("unknown feature status: {other:?}"))),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `deliverable_versions` row.
pub struct RawVersion {
  pub version_id:     String,
  pub purchase_id:    String,
  pub feature_name:   String,
  pub version_number: i64,
  pub file_reference: Option<String>,
  pub external_link:  Option<String>,
  pub status:         String,
  pub uploaded_by:    String,
  pub uploaded_at:    String,
  pub admin_notes:    Option<String>,
}

impl RawVersion {
  pub fn into_version(self) -> Result<DeliverableVersion> {
    // The schema CHECK guarantees exactly one content column is set; a row
    // violating that is corruption, not caller error.
    let content = match (self.file_reference, self.external_link) {
      (Some(reference), None) => Content::FileRef { file_reference: reference },
      (None, Some(link)) => Content::ExternalLink { external_link: link },
      _ => {
        return Err(Error::Decode(format!(
          "version {} has malformed content columns",
          self.version_id
        )));
      }
    };

    Ok(DeliverableVersion {
      version_id: decode_uuid(&self.version_id)?,
      purchase_id: decode_uuid(&self.purchase_id)?,
      feature_name: self.feature_name,
      version_number: self.version_number,
      content,
      status: decode_deliverable_status(&self.status)?,
      uploaded_by: decode_uuid(&self.uploaded_by)?,
      uploaded_at: decode_dt(&self.uploaded_at)?,
      admin_notes: self.admin_notes,
    })
  }
}

/// Raw strings read directly from a `revision_requests` row.
pub struct RawRequest {
  pub request_id:     String,
  pub version_id:     String,
  pub requester_id:   String,
  pub reason:         String,
  pub admin_response: Option<String>,
  pub status:         String,
  pub requested_at:   String,
  pub updated_at:     String,
}

impl RawRequest {
  pub fn into_request(self) -> Result<RevisionRequest> {
    Ok(RevisionRequest {
      request_id:     decode_uuid(&self.request_id)?,
      version_id:     decode_uuid(&self.version_id)?,
      requester_id:   decode_uuid(&self.requester_id)?,
      reason:         self.reason,
      admin_response: self.admin_response,
      status:         decode_revision_status(&self.status)?,
      requested_at:   decode_dt(&self.requested_at)?,
      updated_at:     decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from a `package_features` row.
pub struct RawFeature {
  pub purchase_id:    String,
  pub feature_name:   String,
  pub feature_status: String,
  pub created_at:     String,
}

impl RawFeature {
  pub fn into_feature(self) -> Result<PackageFeature> {
    Ok(PackageFeature {
      purchase_id:    decode_uuid(&self.purchase_id)?,
      feature_name:   self.feature_name,
      feature_status: decode_feature_status(&self.feature_status)?,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}
