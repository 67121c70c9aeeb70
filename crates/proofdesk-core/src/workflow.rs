//! The workflow coordinator — the one component allowed to combine ledger
//! and revision-tracker semantics in a single operation.
//!
//! The coordinator validates content, decides initial-vs-response dispatch,
//! and drives the optimistic approve cycle (read the latest, then ask the
//! store to approve that exact version). Cross-entity atomicity itself lives
//! in the store's workflow primitives; the coordinator never issues two
//! dependent writes.

use std::sync::Arc;

use uuid::Uuid;

use crate::{
  Error, Result,
  deliverable::{
    ContentInput, DeliverableStatus, DeliverableVersion, Lineage,
    NewDeliverable,
  },
  feature::{FeatureStatus, PackageFeature},
  revision::RevisionRequest,
  store::{DeliverableStore, HistoryEntry, Scope},
};

/// Public operations used by API handlers, bound to a storage backend.
///
/// Cloning is cheap — the store is reference-counted.
pub struct Workflow<S> {
  store: Arc<S>,
}

impl<S> Clone for Workflow<S> {
  fn clone(&self) -> Self { Self { store: Arc::clone(&self.store) } }
}

impl<S> Workflow<S>
where
  S: DeliverableStore,
  S::Error: Into<Error>,
{
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  // ── Writes ────────────────────────────────────────────────────────────────

  /// First submission for a lineage — version 1.
  ///
  /// Rejected with [`Error::VersionExists`] if the lineage already has a
  /// version; later versions must go through [`Self::respond_to_revision`]
  /// so open requests get resolved alongside the new upload.
  pub async fn submit_initial(
    &self,
    lineage: Lineage,
    content: ContentInput,
    uploaded_by: Uuid,
    admin_notes: Option<String>,
  ) -> Result<DeliverableVersion> {
    let content = content.validate()?;

    if let Some(existing) =
      self.store.latest(lineage.clone()).await.map_err(Into::into)?
    {
      return Err(Error::VersionExists(existing.lineage()));
    }

    self
      .store
      .append_version(NewDeliverable { lineage, content, uploaded_by, admin_notes })
      .await
      .map_err(Into::into)
  }

  /// Upload version `max + 1` and complete any open revision requests on
  /// the previous latest, in one atomic step.
  ///
  /// Legal regardless of the current latest's status: an admin may also
  /// proactively replace an approved asset. When no request is open the
  /// completion step is a no-op.
  pub async fn respond_to_revision(
    &self,
    lineage: Lineage,
    content: ContentInput,
    uploaded_by: Uuid,
    admin_notes: Option<String>,
  ) -> Result<DeliverableVersion> {
    let content = content.validate()?;

    self
      .store
      .respond_with_version(NewDeliverable {
        lineage,
        content,
        uploaded_by,
        admin_notes,
      })
      .await
      .map_err(Into::into)
  }

  /// Approve the lineage's latest version.
  ///
  /// The latest is read first and its id passed to the store's
  /// compare-and-set, so a concurrent `respond_to_revision` surfaces as
  /// [`Error::OptimisticConflict`] instead of approving a version the
  /// caller never saw.
  pub async fn approve(
    &self,
    lineage: Lineage,
    approver_id: Uuid,
  ) -> Result<DeliverableVersion> {
    let latest = self
      .store
      .latest(lineage.clone())
      .await
      .map_err(Into::into)?
      .ok_or_else(|| Error::NoVersions(lineage.clone()))?;

    self
      .store
      .approve_version(lineage, latest.version_id, approver_id)
      .await
      .map_err(Into::into)
  }

  /// Open a revision request against the lineage's current latest version.
  ///
  /// The store resolves "current latest" inside its own transaction, so
  /// there is exactly one latest-version read per operation and nothing for
  /// an in-flight upload to race against.
  pub async fn request_revision(
    &self,
    lineage: Lineage,
    requester_id: Uuid,
    reason: String,
  ) -> Result<RevisionRequest> {
    self
      .store
      .open_revision(lineage, requester_id, reason)
      .await
      .map_err(Into::into)
  }

  /// Replace the reason on an open request; requester-only.
  pub async fn edit_revision_reason(
    &self,
    request_id: Uuid,
    requester_id: Uuid,
    new_reason: String,
  ) -> Result<RevisionRequest> {
    self
      .store
      .edit_revision(request_id, requester_id, new_reason)
      .await
      .map_err(Into::into)
  }

  // ── Feature directory ─────────────────────────────────────────────────────

  pub async fn add_feature(
    &self,
    purchase_id: Uuid,
    feature_name: String,
  ) -> Result<PackageFeature> {
    self
      .store
      .add_feature(purchase_id, feature_name)
      .await
      .map_err(Into::into)
  }

  pub async fn list_features(
    &self,
    purchase_id: Uuid,
  ) -> Result<Vec<PackageFeature>> {
    self.store.list_features(purchase_id).await.map_err(Into::into)
  }

  pub async fn set_feature_status(
    &self,
    lineage: Lineage,
    status: FeatureStatus,
  ) -> Result<PackageFeature> {
    self
      .store
      .set_feature_status(lineage, status)
      .await
      .map_err(Into::into)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  pub async fn latest(
    &self,
    lineage: Lineage,
  ) -> Result<Option<DeliverableVersion>> {
    self.store.latest(lineage).await.map_err(Into::into)
  }

  pub async fn get_version(
    &self,
    version_id: Uuid,
  ) -> Result<Option<DeliverableVersion>> {
    self.store.get_version(version_id).await.map_err(Into::into)
  }

  pub async fn history(&self, lineage: Lineage) -> Result<Vec<HistoryEntry>> {
    self.store.history(lineage).await.map_err(Into::into)
  }

  pub async fn list_latest_by_status(
    &self,
    status: DeliverableStatus,
    scope: Scope,
  ) -> Result<Vec<DeliverableVersion>> {
    self
      .store
      .list_latest_by_status(status, scope)
      .await
      .map_err(Into::into)
  }

  pub async fn get_revision(
    &self,
    request_id: Uuid,
  ) -> Result<Option<RevisionRequest>> {
    self.store.get_revision(request_id).await.map_err(Into::into)
  }

  pub async fn list_open_revisions(
    &self,
    scope: Scope,
  ) -> Result<Vec<RevisionRequest>> {
    self.store.list_open_revisions(scope).await.map_err(Into::into)
  }
}
