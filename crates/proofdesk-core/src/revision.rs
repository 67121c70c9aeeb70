//! Revision requests — a client's recorded ask for changes against a
//! specific deliverable version.
//!
//! Requests are created by client action, editable by their requester while
//! open, and completed either by an admin response (with or without a new
//! version) or as cleanup when a superseding version is approved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle state of a revision request. Wire strings are contractual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionStatus {
  Pending,
  InProgress,
  Completed,
}

impl RevisionStatus {
  /// Only an open request may have its reason edited.
  pub fn is_editable(self) -> bool { matches!(self, Self::Pending) }

  pub fn is_open(self) -> bool { matches!(self, Self::Pending) }
}

// ─── RevisionRequest ─────────────────────────────────────────────────────────

/// A client's ask for changes on one deliverable version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionRequest {
  pub request_id:     Uuid,
  /// The deliverable version this request was filed against.
  pub version_id:     Uuid,
  pub requester_id:   Uuid,
  pub reason:         String,
  pub admin_response: Option<String>,
  pub status:         RevisionStatus,
  pub requested_at:   DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
}
