//! Integration tests for `SqliteStore` against an in-memory database.
//!
//! The workflow-level flows go through [`Workflow`] — the surface API
//! handlers use — so the store and coordinator are exercised together.

use std::sync::Arc;

use proofdesk_core::{
  Error as CoreError,
  deliverable::{Content, ContentInput, DeliverableStatus, Lineage},
  revision::RevisionStatus,
  store::{DeliverableStore, Scope},
  workflow::Workflow,
};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn workflow() -> Workflow<SqliteStore> {
  Workflow::new(Arc::new(store().await))
}

/// Register a feature and return its lineage.
async fn lineage(wf: &Workflow<SqliteStore>) -> Lineage {
  let purchase_id = Uuid::new_v4();
  let feature = wf
    .add_feature(purchase_id, "logo-design".into())
    .await
    .unwrap();
  Lineage::new(feature.purchase_id, feature.feature_name)
}

fn file_input(reference: &str) -> ContentInput {
  ContentInput {
    file_reference: Some(reference.into()),
    external_link:  None,
  }
}

fn link_input(url: &str) -> ContentInput {
  ContentInput {
    file_reference: None,
    external_link:  Some(url.into()),
  }
}

// ─── Feature directory ───────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_feature() {
  let s = store().await;
  let purchase = Uuid::new_v4();

  let feature = s.add_feature(purchase, "brand-kit".into()).await.unwrap();
  assert_eq!(
    feature.feature_status,
    proofdesk_core::feature::FeatureStatus::Pending
  );

  let fetched = s
    .get_feature(Lineage::new(purchase, "brand-kit"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(fetched.purchase_id, purchase);
  assert_eq!(fetched.feature_name, "brand-kit");
}

#[tokio::test]
async fn duplicate_feature_rejected() {
  let s = store().await;
  let purchase = Uuid::new_v4();

  s.add_feature(purchase, "brand-kit".into()).await.unwrap();
  let dup = s.add_feature(purchase, "brand-kit".into()).await;
  assert!(matches!(
    dup,
    Err(crate::Error::Domain(CoreError::FeatureExists(_)))
  ));
}

#[tokio::test]
async fn feature_status_lifecycle_is_independent() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;

  // Deliverable workflow activity does not touch feature status.
  wf.submit_initial(lin.clone(), file_input("blob/a"), Uuid::new_v4(), None)
    .await
    .unwrap();

  let updated = wf
    .set_feature_status(
      lin.clone(),
      proofdesk_core::feature::FeatureStatus::Delivered,
    )
    .await
    .unwrap();
  assert_eq!(
    updated.feature_status,
    proofdesk_core::feature::FeatureStatus::Delivered
  );

  let latest = wf.latest(lin).await.unwrap().unwrap();
  assert_eq!(latest.status, DeliverableStatus::Pending);
}

#[tokio::test]
async fn list_features_per_purchase() {
  let s = store().await;
  let purchase = Uuid::new_v4();
  s.add_feature(purchase, "logo".into()).await.unwrap();
  s.add_feature(purchase, "website".into()).await.unwrap();
  s.add_feature(Uuid::new_v4(), "logo".into()).await.unwrap();

  let features = s.list_features(purchase).await.unwrap();
  assert_eq!(features.len(), 2);
}

// ─── Version allocation ──────────────────────────────────────────────────────

#[tokio::test]
async fn versions_are_monotonic_and_gapless() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;
  let admin = Uuid::new_v4();

  let v1 = wf
    .submit_initial(lin.clone(), file_input("blob/v1"), admin, None)
    .await
    .unwrap();
  assert_eq!(v1.version_number, 1);
  assert_eq!(v1.status, DeliverableStatus::Pending);

  for expected in 2..=5 {
    let v = wf
      .respond_to_revision(lin.clone(), file_input("blob/next"), admin, None)
      .await
      .unwrap();
    assert_eq!(v.version_number, expected);
  }

  let history = wf.history(lin).await.unwrap();
  let numbers: Vec<i64> =
    history.iter().map(|e| e.version.version_number).collect();
  assert_eq!(numbers, vec![5, 4, 3, 2, 1]);
}

#[tokio::test]
async fn concurrent_appends_never_collide() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;
  let admin = Uuid::new_v4();

  wf.submit_initial(lin.clone(), file_input("blob/v1"), admin, None)
    .await
    .unwrap();

  let mut handles = Vec::new();
  for i in 0..8 {
    let wf = wf.clone();
    let lin = lin.clone();
    handles.push(tokio::spawn(async move {
      wf.respond_to_revision(lin, file_input(&format!("blob/{i}")), admin, None)
        .await
        .unwrap()
        .version_number
    }));
  }

  let mut numbers = Vec::new();
  for h in handles {
    numbers.push(h.await.unwrap());
  }
  numbers.sort_unstable();
  assert_eq!(numbers, (2..=9).collect::<Vec<i64>>());
}

#[tokio::test]
async fn append_to_unknown_lineage_rejected() {
  let wf = workflow().await;
  let ghost = Lineage::new(Uuid::new_v4(), "never-registered");

  let result = wf
    .submit_initial(ghost, file_input("blob/x"), Uuid::new_v4(), None)
    .await;
  assert!(matches!(result, Err(CoreError::LineageNotFound(_))));
}

#[tokio::test]
async fn second_initial_submission_rejected() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;

  wf.submit_initial(lin.clone(), file_input("blob/v1"), Uuid::new_v4(), None)
    .await
    .unwrap();
  let again = wf
    .submit_initial(lin, file_input("blob/v1-again"), Uuid::new_v4(), None)
    .await;
  assert!(matches!(again, Err(CoreError::VersionExists(_))));
}

#[tokio::test]
async fn respond_without_prior_version_rejected() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;

  let result = wf
    .respond_to_revision(lin, file_input("blob/x"), Uuid::new_v4(), None)
    .await;
  assert!(matches!(result, Err(CoreError::NoVersions(_))));
}

// ─── Content validation ──────────────────────────────────────────────────────

#[tokio::test]
async fn content_both_fields_rejected() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;

  let both = ContentInput {
    file_reference: Some("blob/a".into()),
    external_link:  Some("https://example.com/a".into()),
  };
  let result = wf.submit_initial(lin, both, Uuid::new_v4(), None).await;
  assert!(matches!(result, Err(CoreError::InvalidContent(_))));
}

#[tokio::test]
async fn content_neither_field_rejected() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;

  let result = wf
    .submit_initial(lin, ContentInput::default(), Uuid::new_v4(), None)
    .await;
  assert!(matches!(result, Err(CoreError::InvalidContent(_))));
}

#[tokio::test]
async fn content_relative_link_rejected() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;

  let result = wf
    .submit_initial(lin, link_input("portfolio/final.pdf"), Uuid::new_v4(), None)
    .await;
  assert!(matches!(result, Err(CoreError::InvalidContent(_))));
}

#[tokio::test]
async fn content_roundtrips_through_latest() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;

  wf.submit_initial(
    lin.clone(),
    link_input("https://cdn.example.com/final.pdf"),
    Uuid::new_v4(),
    None,
  )
  .await
  .unwrap();

  let latest = wf.latest(lin).await.unwrap().unwrap();
  assert_eq!(
    latest.content,
    Content::ExternalLink {
      external_link: "https://cdn.example.com/final.pdf".into()
    }
  );
  assert_eq!(latest.content.file_reference(), None);
}

// ─── Revision requests ───────────────────────────────────────────────────────

#[tokio::test]
async fn open_revision_flags_latest_version() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;
  let client = Uuid::new_v4();

  let v1 = wf
    .submit_initial(lin.clone(), file_input("blob/v1"), Uuid::new_v4(), None)
    .await
    .unwrap();

  let request = wf
    .request_revision(lin.clone(), client, "fix logo color".into())
    .await
    .unwrap();
  assert_eq!(request.version_id, v1.version_id);
  assert_eq!(request.status, RevisionStatus::Pending);

  let latest = wf.latest(lin).await.unwrap().unwrap();
  assert_eq!(latest.status, DeliverableStatus::RevisionRequested);
}

#[tokio::test]
async fn second_open_request_is_duplicate() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;

  wf.submit_initial(lin.clone(), file_input("blob/v1"), Uuid::new_v4(), None)
    .await
    .unwrap();
  wf.request_revision(lin.clone(), Uuid::new_v4(), "smaller".into())
    .await
    .unwrap();

  // Same client retrying or a second tab: the ask is already recorded.
  let second = wf
    .request_revision(lin, Uuid::new_v4(), "still smaller".into())
    .await;
  assert!(matches!(second, Err(CoreError::DuplicateOpenRequest(_))));
}

#[tokio::test]
async fn concurrent_open_requests_leave_exactly_one() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;

  wf.submit_initial(lin.clone(), file_input("blob/v1"), Uuid::new_v4(), None)
    .await
    .unwrap();

  let mut handles = Vec::new();
  for _ in 0..2 {
    let wf = wf.clone();
    let lin = lin.clone();
    handles.push(tokio::spawn(async move {
      wf.request_revision(lin, Uuid::new_v4(), "double-click".into()).await
    }));
  }

  let mut ok = 0;
  let mut duplicate = 0;
  for h in handles {
    match h.await.unwrap() {
      Ok(_) => ok += 1,
      Err(CoreError::DuplicateOpenRequest(_)) => duplicate += 1,
      Err(e) => panic!("unexpected error: {e}"),
    }
  }
  assert_eq!((ok, duplicate), (1, 1));

  let open = wf.list_open_revisions(Scope::All).await.unwrap();
  assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn request_against_approved_version_rejected() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;

  wf.submit_initial(lin.clone(), file_input("blob/v1"), Uuid::new_v4(), None)
    .await
    .unwrap();
  wf.approve(lin.clone(), Uuid::new_v4()).await.unwrap();

  let result = wf
    .request_revision(lin, Uuid::new_v4(), "too late".into())
    .await;
  assert!(matches!(result, Err(CoreError::NotPending(_))));
}

// ─── Edit permission boundary ────────────────────────────────────────────────

#[tokio::test]
async fn requester_can_edit_open_request() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;
  let client = Uuid::new_v4();

  wf.submit_initial(lin.clone(), file_input("blob/v1"), Uuid::new_v4(), None)
    .await
    .unwrap();
  let request = wf
    .request_revision(lin, client, "fix logo color".into())
    .await
    .unwrap();

  let edited = wf
    .edit_revision_reason(request.request_id, client, "fix logo colour".into())
    .await
    .unwrap();
  assert_eq!(edited.reason, "fix logo colour");
  assert!(edited.updated_at >= request.updated_at);
}

#[tokio::test]
async fn non_owner_edit_forbidden() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;

  wf.submit_initial(lin.clone(), file_input("blob/v1"), Uuid::new_v4(), None)
    .await
    .unwrap();
  let request = wf
    .request_revision(lin, Uuid::new_v4(), "reason".into())
    .await
    .unwrap();

  let result = wf
    .edit_revision_reason(request.request_id, Uuid::new_v4(), "hijack".into())
    .await;
  assert!(matches!(result, Err(CoreError::Forbidden(_))));
}

#[tokio::test]
async fn non_owner_edit_of_completed_request_forbidden() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;
  let client = Uuid::new_v4();

  wf.submit_initial(lin.clone(), file_input("blob/v1"), Uuid::new_v4(), None)
    .await
    .unwrap();
  let request = wf
    .request_revision(lin.clone(), client, "reason".into())
    .await
    .unwrap();
  wf.respond_to_revision(lin, file_input("blob/v2"), Uuid::new_v4(), None)
    .await
    .unwrap();

  // Ownership is decided before state: a stranger gets Forbidden even on a
  // completed request, never NotEditable.
  let result = wf
    .edit_revision_reason(request.request_id, Uuid::new_v4(), "hijack".into())
    .await;
  assert!(matches!(result, Err(CoreError::Forbidden(_))));
}

#[tokio::test]
async fn completed_request_not_editable() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;
  let client = Uuid::new_v4();

  wf.submit_initial(lin.clone(), file_input("blob/v1"), Uuid::new_v4(), None)
    .await
    .unwrap();
  let request = wf
    .request_revision(lin.clone(), client, "reason".into())
    .await
    .unwrap();
  wf.respond_to_revision(lin, file_input("blob/v2"), Uuid::new_v4(), None)
    .await
    .unwrap();

  let result = wf
    .edit_revision_reason(request.request_id, client, "changed my mind".into())
    .await;
  assert!(matches!(result, Err(CoreError::NotEditable(_))));
}

#[tokio::test]
async fn edit_unknown_request_not_found() {
  let wf = workflow().await;
  let result = wf
    .edit_revision_reason(Uuid::new_v4(), Uuid::new_v4(), "x".into())
    .await;
  assert!(matches!(result, Err(CoreError::RequestNotFound(_))));
}

// ─── Respond / approve workflow ──────────────────────────────────────────────

#[tokio::test]
async fn response_completes_open_request() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;
  let admin = Uuid::new_v4();

  wf.submit_initial(lin.clone(), file_input("blob/v1"), admin, None)
    .await
    .unwrap();
  let request = wf
    .request_revision(lin.clone(), Uuid::new_v4(), "fix logo color".into())
    .await
    .unwrap();

  let v2 = wf
    .respond_to_revision(
      lin.clone(),
      file_input("blob/v2"),
      admin,
      Some("recoloured per brand guide".into()),
    )
    .await
    .unwrap();
  assert_eq!(v2.version_number, 2);
  assert_eq!(v2.status, DeliverableStatus::Pending);

  let resolved = wf.get_revision(request.request_id).await.unwrap().unwrap();
  assert_eq!(resolved.status, RevisionStatus::Completed);
  assert_eq!(
    resolved.admin_response.as_deref(),
    Some("recoloured per brand guide")
  );

  // The superseded version keeps the status it had when replaced.
  let history = wf.history(lin).await.unwrap();
  assert_eq!(
    history[1].version.status,
    DeliverableStatus::RevisionRequested
  );
}

#[tokio::test]
async fn approve_latest_version() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;

  wf.submit_initial(lin.clone(), file_input("blob/v1"), Uuid::new_v4(), None)
    .await
    .unwrap();
  let approved = wf.approve(lin.clone(), Uuid::new_v4()).await.unwrap();
  assert_eq!(approved.status, DeliverableStatus::Approved);

  // Approving again is a state error, not a silent no-op.
  let again = wf.approve(lin, Uuid::new_v4()).await;
  assert!(matches!(again, Err(CoreError::NotPending(_))));
}

#[tokio::test]
async fn approve_while_revision_requested_rejected() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;

  wf.submit_initial(lin.clone(), file_input("blob/v1"), Uuid::new_v4(), None)
    .await
    .unwrap();
  wf.request_revision(lin.clone(), Uuid::new_v4(), "wrong font".into())
    .await
    .unwrap();

  // revision_requested is not an approvable state; the admin must respond
  // with a new version first.
  let result = wf.approve(lin, Uuid::new_v4()).await;
  assert!(matches!(result, Err(CoreError::NotPending(_))));
}

#[tokio::test]
async fn approve_clears_stray_requests() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;
  let admin = Uuid::new_v4();
  let client = Uuid::new_v4();

  wf.submit_initial(lin.clone(), file_input("blob/v1"), admin, None)
    .await
    .unwrap();
  let request = wf
    .request_revision(lin.clone(), client, "wrong font".into())
    .await
    .unwrap();
  wf.respond_to_revision(lin.clone(), file_input("blob/v2"), admin, None)
    .await
    .unwrap();

  // Client approves the replacement without touching the old request.
  let v2 = wf.approve(lin.clone(), client).await.unwrap();
  assert_eq!(v2.version_number, 2);
  assert_eq!(v2.status, DeliverableStatus::Approved);

  // The original request stays completed — not reopened, not duplicated.
  let resolved = wf.get_revision(request.request_id).await.unwrap().unwrap();
  assert_eq!(resolved.status, RevisionStatus::Completed);

  let open = wf.list_open_revisions(Scope::All).await.unwrap();
  assert!(open.is_empty());
}

#[tokio::test]
async fn approve_after_concurrent_upload_conflicts() {
  let s = store().await;
  let wf = Workflow::new(Arc::new(s.clone()));
  let lin = lineage(&wf).await;
  let admin = Uuid::new_v4();

  let v1 = wf
    .submit_initial(lin.clone(), file_input("blob/v1"), admin, None)
    .await
    .unwrap();

  // An upload lands between the client reading "latest = v1" and approving.
  wf.respond_to_revision(lin.clone(), file_input("blob/v2"), admin, None)
    .await
    .unwrap();

  let result = s
    .approve_version(lin.clone(), v1.version_id, Uuid::new_v4())
    .await;
  assert!(matches!(
    result,
    Err(crate::Error::Domain(CoreError::OptimisticConflict(_)))
  ));

  // The loser refreshes and re-decides; v2 is still pending.
  let latest = wf.latest(lin).await.unwrap().unwrap();
  assert_eq!(latest.version_number, 2);
  assert_eq!(latest.status, DeliverableStatus::Pending);
}

#[tokio::test]
async fn new_version_atop_approved_latest_is_legal() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;
  let admin = Uuid::new_v4();

  wf.submit_initial(lin.clone(), file_input("blob/v1"), admin, None)
    .await
    .unwrap();
  wf.approve(lin.clone(), Uuid::new_v4()).await.unwrap();

  // Proactive improvement of an approved asset.
  let v2 = wf
    .respond_to_revision(lin.clone(), file_input("blob/v2"), admin, None)
    .await
    .unwrap();
  assert_eq!(v2.version_number, 2);
  assert_eq!(v2.status, DeliverableStatus::Pending);
}

// ─── Query views ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn latest_listing_never_leaks_superseded_rows() {
  let wf = workflow().await;
  let purchase = Uuid::new_v4();
  let admin = Uuid::new_v4();

  let lin_a = {
    let f = wf.add_feature(purchase, "logo".into()).await.unwrap();
    Lineage::new(f.purchase_id, f.feature_name)
  };
  let lin_b = {
    let f = wf.add_feature(purchase, "website".into()).await.unwrap();
    Lineage::new(f.purchase_id, f.feature_name)
  };

  // lin_a: v1 approved, then v2 pending on top of it.
  wf.submit_initial(lin_a.clone(), file_input("blob/a1"), admin, None)
    .await
    .unwrap();
  wf.approve(lin_a.clone(), Uuid::new_v4()).await.unwrap();
  wf.respond_to_revision(lin_a.clone(), file_input("blob/a2"), admin, None)
    .await
    .unwrap();

  // lin_b: single pending version.
  wf.submit_initial(lin_b.clone(), file_input("blob/b1"), admin, None)
    .await
    .unwrap();

  let pending = wf
    .list_latest_by_status(DeliverableStatus::Pending, Scope::Purchase(purchase))
    .await
    .unwrap();
  assert_eq!(pending.len(), 2);
  assert!(pending.iter().all(|v| v.status == DeliverableStatus::Pending));
  // One row per lineage, each the lineage's max version.
  let a_row = pending.iter().find(|v| v.feature_name == "logo").unwrap();
  assert_eq!(a_row.version_number, 2);

  // v1 of lin_a is approved but superseded; it must not appear.
  let approved = wf
    .list_latest_by_status(DeliverableStatus::Approved, Scope::Purchase(purchase))
    .await
    .unwrap();
  assert!(approved.is_empty());
}

#[tokio::test]
async fn get_version_by_id() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;

  let v1 = wf
    .submit_initial(lin.clone(), file_input("blob/v1"), Uuid::new_v4(), None)
    .await
    .unwrap();
  wf.respond_to_revision(lin, file_input("blob/v2"), Uuid::new_v4(), None)
    .await
    .unwrap();

  // Superseded versions stay addressable by id.
  let fetched = wf.get_version(v1.version_id).await.unwrap().unwrap();
  assert_eq!(fetched.version_id, v1.version_id);
  assert_eq!(fetched.version_number, 1);

  assert!(wf.get_version(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn history_is_newest_first_and_annotated() {
  let wf = workflow().await;
  let lin = lineage(&wf).await;
  let admin = Uuid::new_v4();
  let client = Uuid::new_v4();

  wf.submit_initial(lin.clone(), file_input("blob/v1"), admin, None)
    .await
    .unwrap();
  let request = wf
    .request_revision(lin.clone(), client, "fix logo color".into())
    .await
    .unwrap();
  wf.respond_to_revision(lin.clone(), file_input("blob/v2"), admin, None)
    .await
    .unwrap();

  let history = wf.history(lin).await.unwrap();
  assert_eq!(history.len(), 2);
  assert_eq!(history[0].version.version_number, 2);
  assert!(history[0].requests.is_empty());
  assert_eq!(history[1].version.version_number, 1);
  assert_eq!(history[1].requests.len(), 1);
  assert_eq!(history[1].requests[0].request_id, request.request_id);
}

#[tokio::test]
async fn open_revisions_scoped_by_purchase() {
  let wf = workflow().await;
  let lin_a = lineage(&wf).await;
  let lin_b = lineage(&wf).await;

  for lin in [&lin_a, &lin_b] {
    wf.submit_initial(lin.clone(), file_input("blob/v1"), Uuid::new_v4(), None)
      .await
      .unwrap();
    wf.request_revision(lin.clone(), Uuid::new_v4(), "tweak".into())
      .await
      .unwrap();
  }

  let scoped = wf
    .list_open_revisions(Scope::Purchase(lin_a.purchase_id))
    .await
    .unwrap();
  assert_eq!(scoped.len(), 1);

  let all = wf.list_open_revisions(Scope::All).await.unwrap();
  assert_eq!(all.len(), 2);
}
