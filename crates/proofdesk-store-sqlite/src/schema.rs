//! SQL schema for the Proofdesk SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- The lineage directory: one row per purchased feature. Deliverable
-- versions may only be appended against an existing pairing.
CREATE TABLE IF NOT EXISTS package_features (
    purchase_id    TEXT NOT NULL,
    feature_name   TEXT NOT NULL,
    feature_status TEXT NOT NULL DEFAULT 'pending',  -- 'pending' | 'in_progress' | 'delivered'
    created_at     TEXT NOT NULL,                    -- ISO 8601 UTC
    PRIMARY KEY (purchase_id, feature_name)
);

-- Versions are append-only per lineage.
-- The only UPDATE ever issued is the status transition on the latest row.
CREATE TABLE IF NOT EXISTS deliverable_versions (
    version_id     TEXT PRIMARY KEY,
    purchase_id    TEXT NOT NULL,
    feature_name   TEXT NOT NULL,
    version_number INTEGER NOT NULL,   -- 1-based, gapless within a lineage
    file_reference TEXT,               -- opaque blob-store key
    external_link  TEXT,               -- absolute URL
    status         TEXT NOT NULL DEFAULT 'pending',  -- 'pending' | 'approved' | 'revision_requested'
    uploaded_by    TEXT NOT NULL,
    uploaded_at    TEXT NOT NULL,      -- ISO 8601 UTC; server-assigned
    admin_notes    TEXT,
    UNIQUE (purchase_id, feature_name, version_number),
    FOREIGN KEY (purchase_id, feature_name)
        REFERENCES package_features (purchase_id, feature_name),
    CHECK ((file_reference IS NULL) != (external_link IS NULL))
);

CREATE TABLE IF NOT EXISTS revision_requests (
    request_id     TEXT PRIMARY KEY,
    version_id     TEXT NOT NULL REFERENCES deliverable_versions(version_id),
    requester_id   TEXT NOT NULL,
    reason         TEXT NOT NULL,
    admin_response TEXT,
    status         TEXT NOT NULL DEFAULT 'pending',  -- 'pending' | 'in_progress' | 'completed'
    requested_at   TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

-- At most one open request per deliverable version.
CREATE UNIQUE INDEX IF NOT EXISTS revision_requests_open_idx
    ON revision_requests(version_id) WHERE status = 'pending';

CREATE INDEX IF NOT EXISTS deliverable_lineage_idx
    ON deliverable_versions(purchase_id, feature_name);
CREATE INDEX IF NOT EXISTS deliverable_status_idx
    ON deliverable_versions(status);
CREATE INDEX IF NOT EXISTS revision_status_idx
    ON revision_requests(status);

PRAGMA user_version = 1;
";
