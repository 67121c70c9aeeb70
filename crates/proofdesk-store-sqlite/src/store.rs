//! [`SqliteStore`] — the SQLite implementation of [`DeliverableStore`].
//!
//! Every operation that reads state it is about to mutate (version-number
//! allocation, the open-request check, the approve compare-and-set) runs
//! inside an IMMEDIATE transaction, so the read and the write are one
//! critical section. The UNIQUE constraints in the schema back the same
//! invariants against writers outside this process.

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use proofdesk_core::{
  deliverable::{DeliverableStatus, DeliverableVersion, Lineage, NewDeliverable},
  feature::{FeatureStatus, PackageFeature},
  revision::{RevisionRequest, RevisionStatus},
  store::{DeliverableStore, HistoryEntry, Scope},
};

use crate::{
  Error, Result,
  encode::{
    RawFeature, RawRequest, RawVersion, decode_deliverable_status, decode_uuid,
    encode_deliverable_status, encode_dt, encode_feature_status, encode_uuid,
  },
  schema::SCHEMA,
};

const VERSION_COLS: &str = "version_id, purchase_id, feature_name, \
   version_number, file_reference, external_link, status, uploaded_by, \
   uploaded_at, admin_notes";

const REQUEST_COLS: &str = "request_id, version_id, requester_id, reason, \
   admin_response, status, requested_at, updated_at";

/// Attempts at version-number allocation before giving up. Collisions can
/// only come from writers outside this process (the IMMEDIATE transaction
/// serialises everything in-process).
const APPEND_ATTEMPTS: u32 = 3;

// ─── Row mappers ─────────────────────────────────────────────────────────────

fn version_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawVersion> {
  Ok(RawVersion {
    version_id:     row.get(0)?,
    purchase_id:    row.get(1)?,
    feature_name:   row.get(2)?,
    version_number: row.get(3)?,
    file_reference: row.get(4)?,
    external_link:  row.get(5)?,
    status:         row.get(6)?,
    uploaded_by:    row.get(7)?,
    uploaded_at:    row.get(8)?,
    admin_notes:    row.get(9)?,
  })
}

fn request_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRequest> {
  Ok(RawRequest {
    request_id:     row.get(0)?,
    version_id:     row.get(1)?,
    requester_id:   row.get(2)?,
    reason:         row.get(3)?,
    admin_response: row.get(4)?,
    status:         row.get(5)?,
    requested_at:   row.get(6)?,
    updated_at:     row.get(7)?,
  })
}

fn feature_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawFeature> {
  Ok(RawFeature {
    purchase_id:    row.get(0)?,
    feature_name:   row.get(1)?,
    feature_status: row.get(2)?,
    created_at:     row.get(3)?,
  })
}

// ─── In-transaction helpers ──────────────────────────────────────────────────

/// `Some(1)` semantics: does the lineage exist in the feature directory?
fn lineage_exists(
  tx: &rusqlite::Transaction<'_>,
  purchase_id: &str,
  feature_name: &str,
) -> rusqlite::Result<bool> {
  Ok(
    tx.query_row(
      "SELECT 1 FROM package_features
       WHERE purchase_id = ?1 AND feature_name = ?2",
      rusqlite::params![purchase_id, feature_name],
      |_| Ok(true),
    )
    .optional()?
    .unwrap_or(false),
  )
}

/// The max-version row's `(version_id, version_number, status)` for a
/// lineage, read under the transaction's lock.
fn latest_in_tx(
  tx: &rusqlite::Transaction<'_>,
  purchase_id: &str,
  feature_name: &str,
) -> rusqlite::Result<Option<(String, i64, String)>> {
  tx.query_row(
    "SELECT version_id, version_number, status FROM deliverable_versions
     WHERE purchase_id = ?1 AND feature_name = ?2
     ORDER BY version_number DESC LIMIT 1",
    rusqlite::params![purchase_id, feature_name],
    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
  )
  .optional()
}

/// Complete every `pending` revision request filed against `version_id`,
/// attaching `admin_response` when present. Plural on purpose: the unique
/// index permits only one, but the sweep must be idempotent against any
/// stragglers.
fn complete_requests_for_version(
  tx: &rusqlite::Transaction<'_>,
  version_id: &str,
  admin_response: Option<&str>,
  now: &str,
) -> rusqlite::Result<usize> {
  tx.execute(
    "UPDATE revision_requests
     SET status = 'completed',
         admin_response = COALESCE(?2, admin_response),
         updated_at = ?3
     WHERE version_id = ?1 AND status = 'pending'",
    rusqlite::params![version_id, admin_response, now],
  )
}

fn is_unique_violation(e: &tokio_rusqlite::Error, needle: &str) -> bool {
  match e {
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(
      f,
      Some(msg),
    )) => f.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains(needle),
    _ => false,
  }
}

// ─── Closure outcomes ────────────────────────────────────────────────────────

enum AppendOutcome {
  NoLineage,
  Inserted(i64),
}

enum RespondOutcome {
  NoLineage,
  NoVersions,
  Inserted(i64),
}

enum ApproveOutcome {
  NoLineage,
  NoVersions,
  Stale,
  Malformed(String),
  NotPending(Uuid),
  Approved(RawVersion),
}

enum OpenOutcome {
  NoLineage,
  NoVersions,
  Malformed(String),
  Duplicate(Uuid),
  NotPending(Uuid),
  Opened(Uuid),
}

enum EditOutcome {
  NotFound,
  Forbidden,
  NotEditable,
  Edited(RawRequest),
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Proofdesk deliverable store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// One allocation attempt: next = max + 1 under an IMMEDIATE transaction.
  async fn try_append(
    &self,
    input: &NewDeliverable,
    version_id: Uuid,
    uploaded_at: chrono::DateTime<Utc>,
  ) -> Result<AppendOutcome, tokio_rusqlite::Error> {
    let purchase_id    = encode_uuid(input.lineage.purchase_id);
    let feature_name   = input.lineage.feature_name.clone();
    let version_id_str = encode_uuid(version_id);
    let file_reference = input.content.file_reference().map(str::to_owned);
    let external_link  = input.content.external_link().map(str::to_owned);
    let uploaded_by    = encode_uuid(input.uploaded_by);
    let uploaded_at    = encode_dt(uploaded_at);
    let admin_notes    = input.admin_notes.clone();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !lineage_exists(&tx, &purchase_id, &feature_name)? {
          return Ok(AppendOutcome::NoLineage);
        }

        let next: i64 = tx.query_row(
          "SELECT COALESCE(MAX(version_number), 0) + 1
           FROM deliverable_versions
           WHERE purchase_id = ?1 AND feature_name = ?2",
          rusqlite::params![purchase_id, feature_name],
          |row| row.get(0),
        )?;

        tx.execute(
          "INSERT INTO deliverable_versions (
             version_id, purchase_id, feature_name, version_number,
             file_reference, external_link, status,
             uploaded_by, uploaded_at, admin_notes
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?8, ?9)",
          rusqlite::params![
            version_id_str,
            purchase_id,
            feature_name,
            next,
            file_reference,
            external_link,
            uploaded_by,
            uploaded_at,
            admin_notes,
          ],
        )?;

        tx.commit()?;
        Ok(AppendOutcome::Inserted(next))
      })
      .await
  }

  fn built_version(
    input: NewDeliverable,
    version_id: Uuid,
    version_number: i64,
    uploaded_at: chrono::DateTime<Utc>,
  ) -> DeliverableVersion {
    DeliverableVersion {
      version_id,
      purchase_id: input.lineage.purchase_id,
      feature_name: input.lineage.feature_name,
      version_number,
      content: input.content,
      status: DeliverableStatus::Pending,
      uploaded_by: input.uploaded_by,
      uploaded_at,
      admin_notes: input.admin_notes,
    }
  }
}

// ─── DeliverableStore impl ───────────────────────────────────────────────────

impl DeliverableStore for SqliteStore {
  type Error = Error;

  // ── Feature directory ─────────────────────────────────────────────────────

  async fn add_feature(
    &self,
    purchase_id: Uuid,
    feature_name: String,
  ) -> Result<PackageFeature> {
    let feature = PackageFeature {
      purchase_id,
      feature_name,
      feature_status: FeatureStatus::Pending,
      created_at: Utc::now(),
    };

    let purchase_str = encode_uuid(purchase_id);
    let name         = feature.feature_name.clone();
    let status_str   = encode_feature_status(feature.feature_status).to_owned();
    let at_str       = encode_dt(feature.created_at);

    let inserted = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO package_features
             (purchase_id, feature_name, feature_status, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![purchase_str, name, status_str, at_str],
        )?;
        Ok(())
      })
      .await;

    match inserted {
      Ok(()) => Ok(feature),
      Err(e) if is_unique_violation(&e, "package_features") => {
        Err(Error::Domain(proofdesk_core::Error::FeatureExists(
          Lineage::new(feature.purchase_id, feature.feature_name),
        )))
      }
      Err(e) => Err(e.into()),
    }
  }

  async fn get_feature(&self, lineage: Lineage) -> Result<Option<PackageFeature>> {
    let purchase_str = encode_uuid(lineage.purchase_id);
    let name         = lineage.feature_name;

    let raw: Option<RawFeature> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT purchase_id, feature_name, feature_status, created_at
               FROM package_features
               WHERE purchase_id = ?1 AND feature_name = ?2",
              rusqlite::params![purchase_str, name],
              feature_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawFeature::into_feature).transpose()
  }

  async fn list_features(&self, purchase_id: Uuid) -> Result<Vec<PackageFeature>> {
    let purchase_str = encode_uuid(purchase_id);

    let raws: Vec<RawFeature> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT purchase_id, feature_name, feature_status, created_at
           FROM package_features
           WHERE purchase_id = ?1
           ORDER BY created_at, feature_name",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![purchase_str], feature_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFeature::into_feature).collect()
  }

  async fn set_feature_status(
    &self,
    lineage: Lineage,
    status: FeatureStatus,
  ) -> Result<PackageFeature> {
    let purchase_str = encode_uuid(lineage.purchase_id);
    let name         = lineage.feature_name.clone();
    let status_str   = encode_feature_status(status).to_owned();

    let raw: Option<RawFeature> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
          "UPDATE package_features SET feature_status = ?3
           WHERE purchase_id = ?1 AND feature_name = ?2",
          rusqlite::params![purchase_str, name, status_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        let raw = tx.query_row(
          "SELECT purchase_id, feature_name, feature_status, created_at
           FROM package_features
           WHERE purchase_id = ?1 AND feature_name = ?2",
          rusqlite::params![purchase_str, name],
          feature_row,
        )?;
        tx.commit()?;
        Ok(Some(raw))
      })
      .await?;

    match raw {
      Some(raw) => raw.into_feature(),
      None => Err(Error::Domain(proofdesk_core::Error::LineageNotFound(lineage))),
    }
  }

  // ── Ledger — append-only writes ───────────────────────────────────────────

  async fn append_version(&self, input: NewDeliverable) -> Result<DeliverableVersion> {
    let mut attempt = 0;
    loop {
      attempt += 1;
      let version_id  = Uuid::new_v4();
      let uploaded_at = Utc::now();

      match self.try_append(&input, version_id, uploaded_at).await {
        Ok(AppendOutcome::Inserted(n)) => {
          return Ok(Self::built_version(input, version_id, n, uploaded_at));
        }
        Ok(AppendOutcome::NoLineage) => {
          return Err(Error::Domain(proofdesk_core::Error::LineageNotFound(
            input.lineage,
          )));
        }
        Err(e)
          if attempt < APPEND_ATTEMPTS
            && is_unique_violation(&e, "deliverable_versions") => {}
        Err(e) => return Err(e.into()),
      }
    }
  }

  async fn latest(&self, lineage: Lineage) -> Result<Option<DeliverableVersion>> {
    let purchase_str = encode_uuid(lineage.purchase_id);
    let name         = lineage.feature_name;

    let raw: Option<RawVersion> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {VERSION_COLS} FROM deliverable_versions
                 WHERE purchase_id = ?1 AND feature_name = ?2
                 ORDER BY version_number DESC LIMIT 1"
              ),
              rusqlite::params![purchase_str, name],
              version_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawVersion::into_version).transpose()
  }

  async fn get_version(&self, version_id: Uuid) -> Result<Option<DeliverableVersion>> {
    let id_str = encode_uuid(version_id);

    let raw: Option<RawVersion> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {VERSION_COLS} FROM deliverable_versions
                 WHERE version_id = ?1"
              ),
              rusqlite::params![id_str],
              version_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawVersion::into_version).transpose()
  }

  async fn history(&self, lineage: Lineage) -> Result<Vec<HistoryEntry>> {
    let purchase_str = encode_uuid(lineage.purchase_id);
    let name         = lineage.feature_name;

    let (raw_versions, raw_requests): (Vec<RawVersion>, Vec<RawRequest>) = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {VERSION_COLS} FROM deliverable_versions
           WHERE purchase_id = ?1 AND feature_name = ?2
           ORDER BY version_number DESC"
        ))?;
        let versions = stmt
          .query_map(rusqlite::params![purchase_str, name], version_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
          "SELECT r.request_id, r.version_id, r.requester_id, r.reason,
                  r.admin_response, r.status, r.requested_at, r.updated_at
           FROM revision_requests r
           JOIN deliverable_versions d ON d.version_id = r.version_id
           WHERE d.purchase_id = ?1 AND d.feature_name = ?2
           ORDER BY r.requested_at",
        )?;
        let requests = stmt
          .query_map(rusqlite::params![purchase_str, name], request_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((versions, requests))
      })
      .await?;

    let requests: Vec<RevisionRequest> = raw_requests
      .into_iter()
      .map(RawRequest::into_request)
      .collect::<Result<_>>()?;

    let mut entries = Vec::with_capacity(raw_versions.len());
    for raw in raw_versions {
      let version = raw.into_version()?;
      let filed: Vec<RevisionRequest> = requests
        .iter()
        .filter(|r| r.version_id == version.version_id)
        .cloned()
        .collect();
      entries.push(HistoryEntry { version, requests: filed });
    }

    Ok(entries)
  }

  async fn list_latest_by_status(
    &self,
    status: DeliverableStatus,
    scope: Scope,
  ) -> Result<Vec<DeliverableVersion>> {
    let status_str = encode_deliverable_status(status).to_owned();
    let purchase_str = match scope {
      Scope::Purchase(id) => Some(encode_uuid(id)),
      Scope::All => None,
    };

    let raws: Vec<RawVersion> = self
      .conn
      .call(move |conn| {
        // The status filter applies only to the max-version row; a naive
        // filter without the correlated subquery would leak superseded rows.
        let base = format!(
          "SELECT {VERSION_COLS} FROM deliverable_versions AS d
           WHERE d.version_number = (
             SELECT MAX(v.version_number) FROM deliverable_versions v
             WHERE v.purchase_id = d.purchase_id
               AND v.feature_name = d.feature_name)
             AND d.status = ?1"
        );

        let rows = if let Some(p) = purchase_str {
          let sql = format!(
            "{base} AND d.purchase_id = ?2
             ORDER BY d.feature_name"
          );
          let mut stmt = conn.prepare(&sql)?;
          stmt
            .query_map(rusqlite::params![status_str, p], version_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let sql = format!("{base} ORDER BY d.purchase_id, d.feature_name");
          let mut stmt = conn.prepare(&sql)?;
          stmt
            .query_map(rusqlite::params![status_str], version_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawVersion::into_version).collect()
  }

  // ── Revision tracker ──────────────────────────────────────────────────────

  async fn open_revision(
    &self,
    lineage: Lineage,
    requester_id: Uuid,
    reason: String,
  ) -> Result<RevisionRequest> {
    let request_id   = Uuid::new_v4();
    let requested_at = Utc::now();

    let purchase_str  = encode_uuid(lineage.purchase_id);
    let name          = lineage.feature_name.clone();
    let request_str   = encode_uuid(request_id);
    let requester_str = encode_uuid(requester_id);
    let reason_cl     = reason.clone();
    let at_str        = encode_dt(requested_at);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !lineage_exists(&tx, &purchase_str, &name)? {
          return Ok(OpenOutcome::NoLineage);
        }

        let Some((latest_id, _, latest_status)) =
          latest_in_tx(&tx, &purchase_str, &name)?
        else {
          return Ok(OpenOutcome::NoVersions);
        };
        let decoded = decode_uuid(&latest_id).and_then(|id| {
          decode_deliverable_status(&latest_status).map(|s| (id, s))
        });
        let Ok((latest_uuid, status)) = decoded else {
          return Ok(OpenOutcome::Malformed(latest_id));
        };

        // Duplicate takes precedence over NotPending: a second ask against a
        // version the first ask already flagged is a duplicate, not a state
        // error.
        let open_exists: bool = tx
          .query_row(
            "SELECT 1 FROM revision_requests
             WHERE version_id = ?1 AND status = 'pending'",
            rusqlite::params![latest_id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if open_exists {
          return Ok(OpenOutcome::Duplicate(latest_uuid));
        }

        // The enum transition is the sole authority on which states may move
        // to revision_requested.
        let flagged = match status.request_revision(latest_uuid) {
          Ok(s) => s,
          Err(_) => return Ok(OpenOutcome::NotPending(latest_uuid)),
        };

        tx.execute(
          "UPDATE deliverable_versions SET status = ?2
           WHERE version_id = ?1",
          rusqlite::params![latest_id, encode_deliverable_status(flagged)],
        )?;

        tx.execute(
          "INSERT INTO revision_requests (
             request_id, version_id, requester_id, reason,
             admin_response, status, requested_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, NULL, 'pending', ?5, ?5)",
          rusqlite::params![request_str, latest_id, requester_str, reason_cl, at_str],
        )?;

        tx.commit()?;
        Ok(OpenOutcome::Opened(latest_uuid))
      })
      .await?;

    match outcome {
      OpenOutcome::NoLineage => {
        Err(Error::Domain(proofdesk_core::Error::LineageNotFound(lineage)))
      }
      OpenOutcome::NoVersions => {
        Err(Error::Domain(proofdesk_core::Error::NoVersions(lineage)))
      }
      OpenOutcome::Malformed(id) => Err(Error::Decode(format!(
        "version {id} has a malformed status column"
      ))),
      OpenOutcome::Duplicate(id) => Err(Error::Domain(
        proofdesk_core::Error::DuplicateOpenRequest(id),
      )),
      OpenOutcome::NotPending(id) => {
        Err(Error::Domain(proofdesk_core::Error::NotPending(id)))
      }
      OpenOutcome::Opened(version_id) => Ok(RevisionRequest {
        request_id,
        version_id,
        requester_id,
        reason,
        admin_response: None,
        status: RevisionStatus::Pending,
        requested_at,
        updated_at: requested_at,
      }),
    }
  }

  async fn edit_revision(
    &self,
    request_id: Uuid,
    requester_id: Uuid,
    new_reason: String,
  ) -> Result<RevisionRequest> {
    let request_str   = encode_uuid(request_id);
    let requester_str = encode_uuid(requester_id);
    let now_str       = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(raw) = tx
          .query_row(
            &format!(
              "SELECT {REQUEST_COLS} FROM revision_requests
               WHERE request_id = ?1"
            ),
            rusqlite::params![request_str],
            request_row,
          )
          .optional()?
        else {
          return Ok(EditOutcome::NotFound);
        };

        // Ownership is checked before editability so a non-owner learns
        // nothing about the request's state.
        if raw.requester_id != requester_str {
          return Ok(EditOutcome::Forbidden);
        }
        if raw.status != "pending" {
          return Ok(EditOutcome::NotEditable);
        }

        tx.execute(
          "UPDATE revision_requests SET reason = ?2, updated_at = ?3
           WHERE request_id = ?1",
          rusqlite::params![request_str, new_reason, now_str],
        )?;

        let updated = tx.query_row(
          &format!(
            "SELECT {REQUEST_COLS} FROM revision_requests
             WHERE request_id = ?1"
          ),
          rusqlite::params![request_str],
          request_row,
        )?;

        tx.commit()?;
        Ok(EditOutcome::Edited(updated))
      })
      .await?;

    match outcome {
      EditOutcome::NotFound => {
        Err(Error::Domain(proofdesk_core::Error::RequestNotFound(request_id)))
      }
      EditOutcome::Forbidden => {
        Err(Error::Domain(proofdesk_core::Error::Forbidden(request_id)))
      }
      EditOutcome::NotEditable => {
        Err(Error::Domain(proofdesk_core::Error::NotEditable(request_id)))
      }
      EditOutcome::Edited(raw) => raw.into_request(),
    }
  }

  async fn get_revision(&self, request_id: Uuid) -> Result<Option<RevisionRequest>> {
    let id_str = encode_uuid(request_id);

    let raw: Option<RawRequest> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {REQUEST_COLS} FROM revision_requests
                 WHERE request_id = ?1"
              ),
              rusqlite::params![id_str],
              request_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRequest::into_request).transpose()
  }

  async fn list_open_revisions(&self, scope: Scope) -> Result<Vec<RevisionRequest>> {
    let purchase_str = match scope {
      Scope::Purchase(id) => Some(encode_uuid(id)),
      Scope::All => None,
    };

    let raws: Vec<RawRequest> = self
      .conn
      .call(move |conn| {
        let rows = if let Some(p) = purchase_str {
          let mut stmt = conn.prepare(
            "SELECT r.request_id, r.version_id, r.requester_id, r.reason,
                    r.admin_response, r.status, r.requested_at, r.updated_at
             FROM revision_requests r
             JOIN deliverable_versions d ON d.version_id = r.version_id
             WHERE r.status = 'pending' AND d.purchase_id = ?1
             ORDER BY r.requested_at",
          )?;
          stmt
            .query_map(rusqlite::params![p], request_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(&format!(
            "SELECT {REQUEST_COLS} FROM revision_requests
             WHERE status = 'pending'
             ORDER BY requested_at",
          ))?;
          stmt
            .query_map([], request_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRequest::into_request).collect()
  }

  // ── Workflow primitives — multi-entity transactions ───────────────────────

  async fn respond_with_version(&self, input: NewDeliverable) -> Result<DeliverableVersion> {
    let mut attempt = 0;
    loop {
      attempt += 1;
      let version_id  = Uuid::new_v4();
      let uploaded_at = Utc::now();

      let purchase_str   = encode_uuid(input.lineage.purchase_id);
      let name           = input.lineage.feature_name.clone();
      let version_id_str = encode_uuid(version_id);
      let file_reference = input.content.file_reference().map(str::to_owned);
      let external_link  = input.content.external_link().map(str::to_owned);
      let uploaded_by    = encode_uuid(input.uploaded_by);
      let at_str         = encode_dt(uploaded_at);
      let admin_notes    = input.admin_notes.clone();

      let result = self
        .conn
        .call(move |conn| {
          let tx =
            conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

          if !lineage_exists(&tx, &purchase_str, &name)? {
            return Ok(RespondOutcome::NoLineage);
          }

          let Some((prev_id, prev_number, _)) =
            latest_in_tx(&tx, &purchase_str, &name)?
          else {
            return Ok(RespondOutcome::NoVersions);
          };

          let next = prev_number + 1;

          tx.execute(
            "INSERT INTO deliverable_versions (
               version_id, purchase_id, feature_name, version_number,
               file_reference, external_link, status,
               uploaded_by, uploaded_at, admin_notes
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?8, ?9)",
            rusqlite::params![
              version_id_str,
              purchase_str,
              name,
              next,
              file_reference,
              external_link,
              uploaded_by,
              at_str,
              admin_notes,
            ],
          )?;

          // Same commit as the insert: a new version must never land while
          // the request it answers stays open.
          complete_requests_for_version(
            &tx,
            &prev_id,
            admin_notes.as_deref(),
            &at_str,
          )?;

          tx.commit()?;
          Ok(RespondOutcome::Inserted(next))
        })
        .await;

      match result {
        Ok(RespondOutcome::Inserted(n)) => {
          return Ok(Self::built_version(input, version_id, n, uploaded_at));
        }
        Ok(RespondOutcome::NoLineage) => {
          return Err(Error::Domain(proofdesk_core::Error::LineageNotFound(
            input.lineage,
          )));
        }
        Ok(RespondOutcome::NoVersions) => {
          return Err(Error::Domain(proofdesk_core::Error::NoVersions(
            input.lineage,
          )));
        }
        Err(e)
          if attempt < APPEND_ATTEMPTS
            && is_unique_violation(&e, "deliverable_versions") => {}
        Err(e) => return Err(e.into()),
      }
    }
  }

  async fn approve_version(
    &self,
    lineage: Lineage,
    expected_version_id: Uuid,
    _approver_id: Uuid,
  ) -> Result<DeliverableVersion> {
    let purchase_str = encode_uuid(lineage.purchase_id);
    let name         = lineage.feature_name.clone();
    let expected_str = encode_uuid(expected_version_id);
    let now_str      = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !lineage_exists(&tx, &purchase_str, &name)? {
          return Ok(ApproveOutcome::NoLineage);
        }

        let Some((latest_id, _, latest_status)) =
          latest_in_tx(&tx, &purchase_str, &name)?
        else {
          return Ok(ApproveOutcome::NoVersions);
        };

        // Compare-and-set: approving a version that has just been superseded
        // is meaningless, so a stale expectation loses the race explicitly.
        if latest_id != expected_str {
          return Ok(ApproveOutcome::Stale);
        }
        let decoded = decode_uuid(&latest_id).and_then(|id| {
          decode_deliverable_status(&latest_status).map(|s| (id, s))
        });
        let Ok((latest_uuid, status)) = decoded else {
          return Ok(ApproveOutcome::Malformed(latest_id));
        };
        let approved = match status.approve(latest_uuid) {
          Ok(s) => s,
          Err(_) => return Ok(ApproveOutcome::NotPending(latest_uuid)),
        };

        tx.execute(
          "UPDATE deliverable_versions SET status = ?2
           WHERE version_id = ?1",
          rusqlite::params![latest_id, encode_deliverable_status(approved)],
        )?;

        // Sweep the whole lineage, not just the latest: approving a
        // replacement also settles a request left open against the version
        // it replaced.
        tx.execute(
          "UPDATE revision_requests
           SET status = 'completed', updated_at = ?3
           WHERE status = 'pending'
             AND version_id IN (
               SELECT version_id FROM deliverable_versions
               WHERE purchase_id = ?1 AND feature_name = ?2)",
          rusqlite::params![purchase_str, name, now_str],
        )?;

        let raw = tx.query_row(
          &format!(
            "SELECT {VERSION_COLS} FROM deliverable_versions
             WHERE version_id = ?1"
          ),
          rusqlite::params![latest_id],
          version_row,
        )?;

        tx.commit()?;
        Ok(ApproveOutcome::Approved(raw))
      })
      .await?;

    match outcome {
      ApproveOutcome::NoLineage => {
        Err(Error::Domain(proofdesk_core::Error::LineageNotFound(lineage)))
      }
      ApproveOutcome::NoVersions => {
        Err(Error::Domain(proofdesk_core::Error::NoVersions(lineage)))
      }
      ApproveOutcome::Stale => {
        Err(Error::Domain(proofdesk_core::Error::OptimisticConflict(lineage)))
      }
      ApproveOutcome::Malformed(id) => Err(Error::Decode(format!(
        "version {id} has a malformed status column"
      ))),
      ApproveOutcome::NotPending(id) => {
        Err(Error::Domain(proofdesk_core::Error::NotPending(id)))
      }
      ApproveOutcome::Approved(raw) => raw.into_version(),
    }
  }
}
