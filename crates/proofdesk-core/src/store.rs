//! The `DeliverableStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g.
//! `proofdesk-store-sqlite`). Higher layers (`proofdesk-api`, the
//! [`crate::workflow::Workflow`] coordinator) depend on this abstraction,
//! not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  deliverable::{DeliverableStatus, DeliverableVersion, Lineage, NewDeliverable},
  feature::{FeatureStatus, PackageFeature},
  revision::RevisionRequest,
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// The set of lineages a listing query ranges over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
  /// Every lineage belonging to one purchase.
  Purchase(Uuid),
  /// Every lineage in the store.
  All,
}

/// A deliverable version bundled with the revision requests filed against
/// it; the unit returned by [`DeliverableStore::history`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HistoryEntry {
  pub version:  DeliverableVersion,
  pub requests: Vec<RevisionRequest>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Proofdesk storage backend.
///
/// Versions are append-only per lineage; the store owns version-number
/// allocation and must guarantee that concurrent appends to the same lineage
/// never collide. The multi-entity operations (`respond_with_version`,
/// `approve_version`, `open_revision`) are transactional: they commit fully
/// or not at all.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait DeliverableStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Feature directory ─────────────────────────────────────────────────

  /// Register a purchased feature, creating the lineage slot. Fails if the
  /// `(purchase_id, feature_name)` pairing already exists.
  fn add_feature(
    &self,
    purchase_id: Uuid,
    feature_name: String,
  ) -> impl Future<Output = Result<PackageFeature, Self::Error>> + Send + '_;

  /// Look up one feature row. Returns `None` if the pairing is unknown.
  fn get_feature(
    &self,
    lineage: Lineage,
  ) -> impl Future<Output = Result<Option<PackageFeature>, Self::Error>> + Send + '_;

  /// All features for a purchase, in creation order.
  fn list_features(
    &self,
    purchase_id: Uuid,
  ) -> impl Future<Output = Result<Vec<PackageFeature>, Self::Error>> + Send + '_;

  /// Move a feature through its own fulfilment lifecycle.
  fn set_feature_status(
    &self,
    lineage: Lineage,
    status: FeatureStatus,
  ) -> impl Future<Output = Result<PackageFeature, Self::Error>> + Send + '_;

  // ── Ledger — append-only writes ───────────────────────────────────────

  /// Append the next version for a lineage and return the persisted row.
  ///
  /// The version number is `max + 1` (1 for the first version), allocated
  /// under a serialising mechanism scoped to the lineage so concurrent
  /// callers can never produce the same number. New rows always start
  /// `pending`. Fails if the lineage is not in the feature directory.
  fn append_version(
    &self,
    input: NewDeliverable,
  ) -> impl Future<Output = Result<DeliverableVersion, Self::Error>> + Send + '_;

  /// The max-version row for a lineage, or `None` if nothing was submitted.
  fn latest(
    &self,
    lineage: Lineage,
  ) -> impl Future<Output = Result<Option<DeliverableVersion>, Self::Error>> + Send + '_;

  /// Retrieve one version by id. Returns `None` if not found.
  fn get_version(
    &self,
    version_id: Uuid,
  ) -> impl Future<Output = Result<Option<DeliverableVersion>, Self::Error>> + Send + '_;

  /// Full version history for a lineage, newest first, each version
  /// annotated with the revision requests filed against it.
  fn history(
    &self,
    lineage: Lineage,
  ) -> impl Future<Output = Result<Vec<HistoryEntry>, Self::Error>> + Send + '_;

  /// For every lineage in `scope`, the single latest row iff its status
  /// matches. Never returns a superseded row — the status filter applies
  /// only after the max-version resolution.
  fn list_latest_by_status(
    &self,
    status: DeliverableStatus,
    scope: Scope,
  ) -> impl Future<Output = Result<Vec<DeliverableVersion>, Self::Error>> + Send + '_;

  // ── Revision tracker ──────────────────────────────────────────────────

  /// Open a revision request against the lineage's current latest version.
  ///
  /// The latest version is resolved inside the same transaction that flips
  /// its status and inserts the request, so a stale caller can never target
  /// a superseded version. Fails if the latest is not `pending`, or if an
  /// open request already exists for it.
  fn open_revision(
    &self,
    lineage: Lineage,
    requester_id: Uuid,
    reason: String,
  ) -> impl Future<Output = Result<RevisionRequest, Self::Error>> + Send + '_;

  /// Replace the reason on an open request. Only the original requester may
  /// edit, and only while the request is `pending`.
  fn edit_revision(
    &self,
    request_id: Uuid,
    requester_id: Uuid,
    new_reason: String,
  ) -> impl Future<Output = Result<RevisionRequest, Self::Error>> + Send + '_;

  /// Retrieve one request by id. Returns `None` if not found.
  fn get_revision(
    &self,
    request_id: Uuid,
  ) -> impl Future<Output = Result<Option<RevisionRequest>, Self::Error>> + Send + '_;

  /// All open (`pending`) requests within `scope`, oldest first.
  fn list_open_revisions(
    &self,
    scope: Scope,
  ) -> impl Future<Output = Result<Vec<RevisionRequest>, Self::Error>> + Send + '_;

  // ── Workflow primitives — multi-entity transactions ───────────────────

  /// Append a new `pending` version and complete every open revision
  /// request filed against the previous latest, attaching `admin_notes` as
  /// the admin response. One transaction: a partial write would leave a
  /// client-visible request open against a version nobody will act on.
  ///
  /// There is normally at most one open request, but the completion step
  /// is deliberately plural and idempotent.
  fn respond_with_version(
    &self,
    input: NewDeliverable,
  ) -> impl Future<Output = Result<DeliverableVersion, Self::Error>> + Send + '_;

  /// Approve the lineage's latest version, provided it is still the version
  /// the caller saw (`expected_version_id`) and still `pending`. Completes
  /// any stray open requests for the lineage in the same transaction.
  ///
  /// A mismatch on `expected_version_id` means the caller lost a race
  /// against a concurrent upload and must re-read before deciding again.
  fn approve_version(
    &self,
    lineage: Lineage,
    expected_version_id: Uuid,
    approver_id: Uuid,
  ) -> impl Future<Output = Result<DeliverableVersion, Self::Error>> + Send + '_;
}
