//! Handlers for the deliverable workflow endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/purchases/:pid/features/:feature/deliverable` | Latest version |
//! | `POST` | `/purchases/:pid/features/:feature/deliverable` | Initial submission; 201 |
//! | `POST` | `.../deliverable/respond` | New version, completes open requests |
//! | `POST` | `.../deliverable/approve` | Approve the latest version |
//! | `GET`  | `.../deliverable/history` | Full version history, newest first |
//! | `GET`  | `/deliverables?status=...[&purchase_id=...]` | Latest-per-lineage listing |
//! | `GET`  | `/versions/:id` | Single version by id |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use base64::Engine as _;
use proofdesk_core::{
  blob::BlobStore,
  deliverable::{ContentInput, DeliverableStatus, DeliverableVersion, Lineage},
  store::{DeliverableStore, HistoryEntry, Scope},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

// ─── Upload body ──────────────────────────────────────────────────────────────

/// JSON body accepted by the submit and respond endpoints.
///
/// Exactly one of `file_data` (base64 payload, stored through the blob
/// store) or `external_link` (absolute URL) must be present.
#[derive(Debug, Deserialize)]
pub struct UploadBody {
  pub uploaded_by:   Uuid,
  pub file_data:     Option<String>,
  pub external_link: Option<String>,
  pub admin_notes:   Option<String>,
}

/// Persist an inline payload (if any) and produce the content input for the
/// workflow. The both-present case is rejected before anything is written.
async fn resolve_content<B>(
  blobs: &B,
  body: &UploadBody,
) -> Result<ContentInput, ApiError>
where
  B: BlobStore,
{
  if body.file_data.is_some() && body.external_link.is_some() {
    return Err(ApiError::Workflow(
      proofdesk_core::Error::InvalidContent(
        "both file_data and external_link were supplied".into(),
      ),
    ));
  }

  let file_reference = match &body.file_data {
    Some(b64) => {
      let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|e| ApiError::BadRequest(format!("file_data: {e}")))?;
      Some(
        blobs
          .put(bytes)
          .await
          .map_err(|e| ApiError::Blob(Box::new(e)))?,
      )
    }
    None => None,
  };

  Ok(ContentInput {
    file_reference,
    external_link: body.external_link.clone(),
  })
}

// ─── Submit / respond ─────────────────────────────────────────────────────────

/// `POST /purchases/:pid/features/:feature/deliverable` — version 1 only.
pub async fn submit<S, B>(
  State(state): State<ApiState<S, B>>,
  Path((purchase_id, feature)): Path<(Uuid, String)>,
  Json(body): Json<UploadBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DeliverableStore,
  S::Error: Into<proofdesk_core::Error>,
  B: BlobStore,
{
  let content = resolve_content(state.blobs.as_ref(), &body).await?;
  let version = state
    .workflow
    .submit_initial(
      Lineage::new(purchase_id, feature),
      content,
      body.uploaded_by,
      body.admin_notes,
    )
    .await?;
  Ok((StatusCode::CREATED, Json(version)))
}

/// `POST .../deliverable/respond` — version `max + 1`; completes any open
/// revision request on the previous latest in the same commit.
pub async fn respond<S, B>(
  State(state): State<ApiState<S, B>>,
  Path((purchase_id, feature)): Path<(Uuid, String)>,
  Json(body): Json<UploadBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DeliverableStore,
  S::Error: Into<proofdesk_core::Error>,
  B: BlobStore,
{
  let content = resolve_content(state.blobs.as_ref(), &body).await?;
  let version = state
    .workflow
    .respond_to_revision(
      Lineage::new(purchase_id, feature),
      content,
      body.uploaded_by,
      body.admin_notes,
    )
    .await?;
  Ok((StatusCode::CREATED, Json(version)))
}

// ─── Approve ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ApproveBody {
  pub approver_id: Uuid,
}

/// `POST .../deliverable/approve` — a 409 with code `optimistic_conflict`
/// means the latest changed underneath the client; refresh and re-decide.
pub async fn approve<S, B>(
  State(state): State<ApiState<S, B>>,
  Path((purchase_id, feature)): Path<(Uuid, String)>,
  Json(body): Json<ApproveBody>,
) -> Result<Json<DeliverableVersion>, ApiError>
where
  S: DeliverableStore,
  S::Error: Into<proofdesk_core::Error>,
  B: BlobStore,
{
  let version = state
    .workflow
    .approve(Lineage::new(purchase_id, feature), body.approver_id)
    .await?;
  Ok(Json(version))
}

// ─── Reads ────────────────────────────────────────────────────────────────────

/// `GET .../deliverable` — the lineage's latest version.
pub async fn latest<S, B>(
  State(state): State<ApiState<S, B>>,
  Path((purchase_id, feature)): Path<(Uuid, String)>,
) -> Result<Json<DeliverableVersion>, ApiError>
where
  S: DeliverableStore,
  S::Error: Into<proofdesk_core::Error>,
  B: BlobStore,
{
  let lineage = Lineage::new(purchase_id, feature);
  let version = state
    .workflow
    .latest(lineage.clone())
    .await?
    .ok_or(ApiError::Workflow(proofdesk_core::Error::NoVersions(lineage)))?;
  Ok(Json(version))
}

/// `GET /versions/:id` — one version by id; superseded versions stay
/// addressable here after history links have been handed out.
pub async fn get_version<S, B>(
  State(state): State<ApiState<S, B>>,
  Path(version_id): Path<Uuid>,
) -> Result<Json<DeliverableVersion>, ApiError>
where
  S: DeliverableStore,
  S::Error: Into<proofdesk_core::Error>,
  B: BlobStore,
{
  let version = state
    .workflow
    .get_version(version_id)
    .await?
    .ok_or(ApiError::Workflow(proofdesk_core::Error::VersionNotFound(
      version_id,
    )))?;
  Ok(Json(version))
}

/// `GET .../deliverable/history` — newest first, annotated with requests.
pub async fn history<S, B>(
  State(state): State<ApiState<S, B>>,
  Path((purchase_id, feature)): Path<(Uuid, String)>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError>
where
  S: DeliverableStore,
  S::Error: Into<proofdesk_core::Error>,
  B: BlobStore,
{
  let entries = state
    .workflow
    .history(Lineage::new(purchase_id, feature))
    .await?;
  Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub status:      DeliverableStatus,
  pub purchase_id: Option<Uuid>,
}

/// `GET /deliverables?status=pending[&purchase_id=...]`
///
/// Always resolves through the latest-per-lineage view; superseded versions
/// never appear here regardless of their status.
pub async fn list_latest<S, B>(
  State(state): State<ApiState<S, B>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<DeliverableVersion>>, ApiError>
where
  S: DeliverableStore,
  S::Error: Into<proofdesk_core::Error>,
  B: BlobStore,
{
  let scope = match params.purchase_id {
    Some(id) => Scope::Purchase(id),
    None => Scope::All,
  };
  let versions = state
    .workflow
    .list_latest_by_status(params.status, scope)
    .await?;
  Ok(Json(versions))
}
