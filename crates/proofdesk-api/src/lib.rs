//! JSON REST API for Proofdesk.
//!
//! Exposes an axum [`Router`] backed by any
//! [`proofdesk_core::store::DeliverableStore`] and
//! [`proofdesk_core::blob::BlobStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility; identity fields (`uploaded_by`,
//! `requester_id`) arrive in request bodies from an upstream gateway.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", proofdesk_api::api_router(store.clone(), blobs.clone()))
//! ```

pub mod blobs;
pub mod deliverables;
pub mod error;
pub mod features;
pub mod revisions;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use proofdesk_core::{blob::BlobStore, store::DeliverableStore, workflow::Workflow};

pub use error::ApiError;

/// Shared state threaded through all handlers.
pub struct ApiState<S, B> {
  pub workflow: Workflow<S>,
  pub blobs:    Arc<B>,
}

impl<S, B> Clone for ApiState<S, B> {
  fn clone(&self) -> Self {
    Self {
      workflow: self.workflow.clone(),
      blobs:    Arc::clone(&self.blobs),
    }
  }
}

/// Build a fully-materialised API router for `store` and `blobs`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, B>(store: Arc<S>, blobs: Arc<B>) -> Router<()>
where
  S: DeliverableStore + 'static,
  S::Error: Into<proofdesk_core::Error>,
  B: BlobStore + 'static,
{
  let state = ApiState { workflow: Workflow::new(store), blobs };

  Router::new()
    // Feature directory
    .route(
      "/purchases/{purchase_id}/features",
      get(features::list::<S, B>).post(features::create::<S, B>),
    )
    .route(
      "/purchases/{purchase_id}/features/{feature}",
      axum::routing::patch(features::set_status::<S, B>),
    )
    // Deliverable workflow, addressed by lineage
    .route(
      "/purchases/{purchase_id}/features/{feature}/deliverable",
      get(deliverables::latest::<S, B>).post(deliverables::submit::<S, B>),
    )
    .route(
      "/purchases/{purchase_id}/features/{feature}/deliverable/respond",
      post(deliverables::respond::<S, B>),
    )
    .route(
      "/purchases/{purchase_id}/features/{feature}/deliverable/approve",
      post(deliverables::approve::<S, B>),
    )
    .route(
      "/purchases/{purchase_id}/features/{feature}/deliverable/revision",
      post(revisions::open::<S, B>),
    )
    .route(
      "/purchases/{purchase_id}/features/{feature}/deliverable/history",
      get(deliverables::history::<S, B>),
    )
    // Cross-lineage listings
    .route("/deliverables", get(deliverables::list_latest::<S, B>))
    .route(
      "/versions/{version_id}",
      get(deliverables::get_version::<S, B>),
    )
    // Revision requests
    .route("/revisions", get(revisions::list_open::<S, B>))
    .route(
      "/revisions/{request_id}",
      get(revisions::get_one::<S, B>).patch(revisions::edit::<S, B>),
    )
    // Blob retrieval
    .route("/blobs/{reference}", get(blobs::fetch::<S, B>))
    .with_state(state)
}
