//! Package features — the directory of valid lineages.
//!
//! The feature list for a purchase is a proper relation keyed by
//! `(purchase_id, feature_name)`, with its own delivery status. Deliverable
//! lineages reference this key; appending a version to an unknown pairing is
//! rejected. Feature status is decoupled from deliverable status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fulfilment state of a purchased feature, tracked independently of any
/// deliverable's review status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
  Pending,
  InProgress,
  Delivered,
}

/// One purchased feature on a purchase; the row a lineage must reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageFeature {
  pub purchase_id:    Uuid,
  pub feature_name:   String,
  pub feature_status: FeatureStatus,
  pub created_at:     DateTime<Utc>,
}
