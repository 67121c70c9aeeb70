//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every workflow outcome maps to a 4xx with a stable machine-readable
//! `code`; only genuine store unavailability becomes a 500.
//! `optimistic_conflict` is surfaced distinctly so a client can refresh and
//! re-decide rather than blindly retrying the same stale action.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use proofdesk_core::Error as WorkflowError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Workflow(#[from] WorkflowError),

  /// Malformed input that never reached the workflow (bad base64, unknown
  /// status string, ...).
  #[error("bad request: {0}")]
  BadRequest(String),

  /// A resource outside the workflow taxonomy (e.g. a blob reference).
  #[error("not found: {0}")]
  NotFound(String),

  #[error("blob store error: {0}")]
  Blob(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  fn parts(&self) -> (StatusCode, &'static str, String) {
    match self {
      ApiError::Workflow(e) => {
        let (status, code) = match e {
          WorkflowError::LineageNotFound(_)
          | WorkflowError::VersionNotFound(_)
          | WorkflowError::RequestNotFound(_)
          | WorkflowError::NoVersions(_) => (StatusCode::NOT_FOUND, "not_found"),
          WorkflowError::InvalidContent(_) => {
            (StatusCode::BAD_REQUEST, "invalid_content")
          }
          WorkflowError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
          WorkflowError::VersionExists(_) => {
            (StatusCode::CONFLICT, "version_exists")
          }
          WorkflowError::FeatureExists(_) => {
            (StatusCode::CONFLICT, "feature_exists")
          }
          WorkflowError::NotPending(_) => (StatusCode::CONFLICT, "not_pending"),
          WorkflowError::NotEditable(_) => {
            (StatusCode::CONFLICT, "not_editable")
          }
          WorkflowError::DuplicateOpenRequest(_) => {
            (StatusCode::CONFLICT, "duplicate_open_request")
          }
          WorkflowError::OptimisticConflict(_) => {
            (StatusCode::CONFLICT, "optimistic_conflict")
          }
          WorkflowError::Store(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "store_unavailable")
          }
        };
        (status, code, e.to_string())
      }
      ApiError::BadRequest(m) => {
        (StatusCode::BAD_REQUEST, "bad_request", m.clone())
      }
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.clone()),
      ApiError::Blob(e) => (
        StatusCode::INTERNAL_SERVER_ERROR,
        "blob_unavailable",
        e.to_string(),
      ),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, code, message) = self.parts();
    (status, Json(json!({ "error": message, "code": code }))).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use proofdesk_core::deliverable::Lineage;
  use uuid::Uuid;

  fn lineage() -> Lineage { Lineage::new(Uuid::new_v4(), "logo") }

  #[test]
  fn not_found_class_maps_to_404() {
    for e in [
      WorkflowError::LineageNotFound(lineage()),
      WorkflowError::VersionNotFound(Uuid::new_v4()),
      WorkflowError::RequestNotFound(Uuid::new_v4()),
      WorkflowError::NoVersions(lineage()),
    ] {
      let (status, code, _) = ApiError::from(e).parts();
      assert_eq!(status, StatusCode::NOT_FOUND);
      assert_eq!(code, "not_found");
    }
  }

  #[test]
  fn conflict_class_keeps_distinct_codes() {
    let cases = [
      (
        ApiError::from(WorkflowError::NotPending(Uuid::new_v4())),
        "not_pending",
      ),
      (
        ApiError::from(WorkflowError::DuplicateOpenRequest(Uuid::new_v4())),
        "duplicate_open_request",
      ),
      (
        ApiError::from(WorkflowError::OptimisticConflict(lineage())),
        "optimistic_conflict",
      ),
      (
        ApiError::from(WorkflowError::NotEditable(Uuid::new_v4())),
        "not_editable",
      ),
    ];
    for (e, expected) in cases {
      let (status, code, _) = e.parts();
      assert_eq!(status, StatusCode::CONFLICT);
      assert_eq!(code, expected);
    }
  }

  #[test]
  fn invalid_content_maps_to_400() {
    let e = ApiError::from(WorkflowError::InvalidContent("both".into()));
    let (status, code, _) = e.parts();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code, "invalid_content");
  }

  #[test]
  fn forbidden_maps_to_403() {
    let e = ApiError::from(WorkflowError::Forbidden(Uuid::new_v4()));
    let (status, _, _) = e.parts();
    assert_eq!(status, StatusCode::FORBIDDEN);
  }

  #[test]
  fn store_errors_are_5xx() {
    let e = ApiError::from(WorkflowError::Store("db down".into()));
    let (status, code, _) = e.parts();
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(code, "store_unavailable");
  }
}
