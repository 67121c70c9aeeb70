//! Handlers for revision-request endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `POST`  | `/purchases/:pid/features/:feature/deliverable/revision` | Open against the current latest; 201 |
//! | `GET`   | `/revisions/:id` | Single request |
//! | `PATCH` | `/revisions/:id` | Requester edits the reason while open |
//! | `GET`   | `/revisions[?purchase_id=...]` | Open requests, oldest first |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use proofdesk_core::{
  blob::BlobStore,
  deliverable::Lineage,
  revision::RevisionRequest,
  store::{DeliverableStore, Scope},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

// ─── Open ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OpenBody {
  pub requester_id: Uuid,
  pub reason:       String,
}

/// `POST /purchases/:pid/features/:feature/deliverable/revision`
///
/// The request always targets the lineage's current latest version; the
/// store resolves it inside the same transaction that records the request,
/// so a stale retry can never flag a superseded version.
pub async fn open<S, B>(
  State(state): State<ApiState<S, B>>,
  Path((purchase_id, feature)): Path<(Uuid, String)>,
  Json(body): Json<OpenBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DeliverableStore,
  S::Error: Into<proofdesk_core::Error>,
  B: BlobStore,
{
  let request = state
    .workflow
    .request_revision(
      Lineage::new(purchase_id, feature),
      body.requester_id,
      body.reason,
    )
    .await?;
  Ok((StatusCode::CREATED, Json(request)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /revisions/:id`
pub async fn get_one<S, B>(
  State(state): State<ApiState<S, B>>,
  Path(request_id): Path<Uuid>,
) -> Result<Json<RevisionRequest>, ApiError>
where
  S: DeliverableStore,
  S::Error: Into<proofdesk_core::Error>,
  B: BlobStore,
{
  let request = state
    .workflow
    .get_revision(request_id)
    .await?
    .ok_or(ApiError::Workflow(proofdesk_core::Error::RequestNotFound(
      request_id,
    )))?;
  Ok(Json(request))
}

// ─── Edit ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EditBody {
  pub requester_id: Uuid,
  pub reason:       String,
}

/// `PATCH /revisions/:id` — requester-only, and only while the request is
/// still open.
pub async fn edit<S, B>(
  State(state): State<ApiState<S, B>>,
  Path(request_id): Path<Uuid>,
  Json(body): Json<EditBody>,
) -> Result<Json<RevisionRequest>, ApiError>
where
  S: DeliverableStore,
  S::Error: Into<proofdesk_core::Error>,
  B: BlobStore,
{
  let request = state
    .workflow
    .edit_revision_reason(request_id, body.requester_id, body.reason)
    .await?;
  Ok(Json(request))
}

// ─── List open ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub purchase_id: Option<Uuid>,
}

/// `GET /revisions[?purchase_id=...]` — open requests only, oldest first.
pub async fn list_open<S, B>(
  State(state): State<ApiState<S, B>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<RevisionRequest>>, ApiError>
where
  S: DeliverableStore,
  S::Error: Into<proofdesk_core::Error>,
  B: BlobStore,
{
  let scope = match params.purchase_id {
    Some(id) => Scope::Purchase(id),
    None => Scope::All,
  };
  let requests = state.workflow.list_open_revisions(scope).await?;
  Ok(Json(requests))
}
