//! SQL schema for the member store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;

-- One row per member document. `doc_id` is the storage key; for canonical
-- documents it equals `member_id`, legacy documents keep their old key until
-- the final save relocates them.
CREATE TABLE IF NOT EXISTS members (
    doc_id       TEXT PRIMARY KEY,
    member_id    TEXT,            -- NULL on some legacy rows
    phone        TEXT NOT NULL,
    profile_json TEXT NOT NULL,   -- JSON-encoded MemberProfile
    member_class TEXT NOT NULL DEFAULT 'CORE',
    payment_ref  TEXT,
    created_at   TEXT,            -- RFC 3339 UTC; kept across merges
    updated_at   TEXT
);

-- Append-only. No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS member_id_migrations (
    audit_id      TEXT PRIMARY KEY,
    doc_id        TEXT NOT NULL,
    old_member_id TEXT,
    new_member_id TEXT NOT NULL,
    phone         TEXT NOT NULL,
    migrated_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS members_phone_idx     ON members(phone);
CREATE INDEX IF NOT EXISTS members_member_id_idx ON members(member_id);
CREATE INDEX IF NOT EXISTS migrations_phone_idx  ON member_id_migrations(phone);

PRAGMA user_version = 1;
";
