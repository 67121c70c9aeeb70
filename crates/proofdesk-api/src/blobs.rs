//! Handler for retrieving stored deliverable content by reference.

use axum::{
  extract::{Path, State},
  http::{StatusCode, header},
  response::{IntoResponse, Response},
};
use proofdesk_core::{blob::BlobStore, store::DeliverableStore};

use crate::{ApiState, error::ApiError};

/// `GET /blobs/:reference` — raw bytes of a stored file payload.
///
/// References are opaque; callers obtain them from a version's
/// `file_reference` field.
pub async fn fetch<S, B>(
  State(state): State<ApiState<S, B>>,
  Path(reference): Path<String>,
) -> Result<Response, ApiError>
where
  S: DeliverableStore,
  B: BlobStore,
{
  let bytes = state
    .blobs
    .get(&reference)
    .await
    .map_err(|e| ApiError::Blob(Box::new(e)))?
    .ok_or(ApiError::NotFound(format!("unknown blob {reference:?}")))?;

  Ok(
    (
      StatusCode::OK,
      [(header::CONTENT_TYPE, "application/octet-stream")],
      bytes,
    )
      .into_response(),
  )
}
