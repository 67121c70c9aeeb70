//! Handlers for the package-feature directory.
//!
//! Features are the valid lineage slots; deliverables can only be uploaded
//! against a registered `(purchase_id, feature_name)` pairing.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use proofdesk_core::{
  blob::BlobStore,
  deliverable::Lineage,
  feature::{FeatureStatus, PackageFeature},
  store::DeliverableStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub feature_name: String,
}

/// `POST /purchases/:pid/features` — returns 201 + the stored feature.
pub async fn create<S, B>(
  State(state): State<ApiState<S, B>>,
  Path(purchase_id): Path<Uuid>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DeliverableStore,
  S::Error: Into<proofdesk_core::Error>,
  B: BlobStore,
{
  let feature = state
    .workflow
    .add_feature(purchase_id, body.feature_name)
    .await?;
  Ok((StatusCode::CREATED, Json(feature)))
}

/// `GET /purchases/:pid/features`
pub async fn list<S, B>(
  State(state): State<ApiState<S, B>>,
  Path(purchase_id): Path<Uuid>,
) -> Result<Json<Vec<PackageFeature>>, ApiError>
where
  S: DeliverableStore,
  S::Error: Into<proofdesk_core::Error>,
  B: BlobStore,
{
  let features = state.workflow.list_features(purchase_id).await?;
  Ok(Json(features))
}

#[derive(Debug, Deserialize)]
pub struct SetStatusBody {
  pub feature_status: FeatureStatus,
}

/// `PATCH /purchases/:pid/features/:feature` — move the feature through its
/// own fulfilment lifecycle, independent of any deliverable's status.
pub async fn set_status<S, B>(
  State(state): State<ApiState<S, B>>,
  Path((purchase_id, feature)): Path<(Uuid, String)>,
  Json(body): Json<SetStatusBody>,
) -> Result<Json<PackageFeature>, ApiError>
where
  S: DeliverableStore,
  S::Error: Into<proofdesk_core::Error>,
  B: BlobStore,
{
  let feature = state
    .workflow
    .set_feature_status(Lineage::new(purchase_id, feature), body.feature_status)
    .await?;
  Ok(Json(feature))
}
