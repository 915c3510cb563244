//! [`SqliteStore`]: the SQLite implementation of [`MemberStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use tracing::debug;

use onboard_core::{
  audit::MigrationAuditEntry,
  member::{DocumentId, MemberId, MemberRecord, StoredMember},
  store::{MemberStore, MemberTxn},
};

use crate::{
  Error, Result,
  encode::{EncodedMember, RawAudit, RawMember, encode_dt, encode_member, encode_uuid},
  error::from_rusqlite,
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A member store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    debug!(path = %path.as_ref().display(), "opening member store");
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
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
}

// ─── SQL ─────────────────────────────────────────────────────────────────────
//
// Shared by the store methods and the transaction handle, so both see the
// same queries whether or not a transaction is open.

fn select_member(conn: &rusqlite::Connection, doc_id: &str) -> rusqlite::Result<Option<RawMember>> {
  conn
    .query_row(
      &format!("SELECT {} FROM members WHERE doc_id = ?1", RawMember::COLUMNS),
      rusqlite::params![doc_id],
      RawMember::from_row,
    )
    .optional()
}

fn select_holders(conn: &rusqlite::Connection, member_id: &str) -> rusqlite::Result<Vec<RawMember>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {} FROM members WHERE member_id = ?1 OR doc_id = ?1",
    RawMember::COLUMNS
  ))?;
  stmt
    .query_map(rusqlite::params![member_id], RawMember::from_row)?
    .collect()
}

fn upsert_member(conn: &rusqlite::Connection, m: &EncodedMember) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO members (
       doc_id, member_id, phone, profile_json, member_class,
       payment_ref, created_at, updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
     ON CONFLICT(doc_id) DO UPDATE SET
       member_id    = excluded.member_id,
       phone        = excluded.phone,
       profile_json = excluded.profile_json,
       member_class = excluded.member_class,
       payment_ref  = COALESCE(excluded.payment_ref, members.payment_ref),
       created_at   = COALESCE(members.created_at, excluded.created_at),
       updated_at   = excluded.updated_at",
    rusqlite::params![
      m.doc_id,
      m.member_id,
      m.phone,
      m.profile_json,
      m.member_class,
      m.payment_ref,
      m.created_at,
      m.updated_at,
    ],
  )?;
  Ok(())
}

fn delete_member(conn: &rusqlite::Connection, doc_id: &str) -> rusqlite::Result<bool> {
  let n = conn.execute("DELETE FROM members WHERE doc_id = ?1", rusqlite::params![doc_id])?;
  Ok(n > 0)
}

fn insert_audit(conn: &rusqlite::Connection, entry: &MigrationAuditEntry) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO member_id_migrations (
       audit_id, doc_id, old_member_id, new_member_id, phone, migrated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    rusqlite::params![
      encode_uuid(entry.audit_id),
      entry.doc_id.as_str(),
      entry.old_member_id.as_ref().map(MemberId::as_str),
      entry.new_member_id.as_str(),
      entry.phone,
      encode_dt(entry.migrated_at),
    ],
  )?;
  Ok(())
}

// ─── Transaction handle ──────────────────────────────────────────────────────

/// [`MemberTxn`] over an open `BEGIN IMMEDIATE` transaction.
struct SqliteTxn<'a> {
  conn: &'a rusqlite::Connection,
}

impl MemberTxn for SqliteTxn<'_> {
  fn get(&mut self, doc_id: &DocumentId) -> onboard_core::Result<Option<MemberRecord>> {
    let raw = select_member(self.conn, doc_id.as_str()).map_err(from_rusqlite)?;
    Ok(raw.map(RawMember::into_stored).transpose()?.map(|m| m.record))
  }

  fn member_id_holders(&mut self, member_id: &MemberId) -> onboard_core::Result<Vec<StoredMember>> {
    let raws = select_holders(self.conn, member_id.as_str()).map_err(from_rusqlite)?;
    Ok(raws.into_iter().map(RawMember::into_stored).collect::<Result<_>>()?)
  }

  fn set_member_id(
    &mut self,
    doc_id: &DocumentId,
    member_id: &MemberId,
  ) -> onboard_core::Result<()> {
    let n = self
      .conn
      .execute(
        "UPDATE members SET member_id = ?2, updated_at = ?3 WHERE doc_id = ?1",
        rusqlite::params![doc_id.as_str(), member_id.as_str(), encode_dt(Utc::now())],
      )
      .map_err(from_rusqlite)?;
    if n == 0 {
      return Err(onboard_core::Error::NotFound(doc_id.clone()));
    }
    Ok(())
  }

  fn upsert(&mut self, doc_id: &DocumentId, record: &MemberRecord) -> onboard_core::Result<()> {
    let encoded = encode_member(doc_id, record, Utc::now())?;
    upsert_member(self.conn, &encoded).map_err(from_rusqlite)
  }

  fn delete(&mut self, doc_id: &DocumentId) -> onboard_core::Result<()> {
    delete_member(self.conn, doc_id.as_str()).map_err(from_rusqlite)?;
    Ok(())
  }

  fn append_audit(&mut self, entry: &MigrationAuditEntry) -> onboard_core::Result<()> {
    insert_audit(self.conn, entry).map_err(from_rusqlite)
  }
}

// ─── MemberStore impl ────────────────────────────────────────────────────────

impl MemberStore for SqliteStore {
  type Error = Error;

  async fn find_by_phone(&self, phone: &str) -> Result<Option<StoredMember>> {
    let phone = phone.trim().to_owned();

    // Prefer the document already stored under its own id, then the most
    // recently written one.
    let raw: Option<RawMember> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {} FROM members
               WHERE phone = ?1
               ORDER BY (member_id IS NOT NULL AND member_id = doc_id) DESC,
                        updated_at IS NULL,
                        updated_at DESC
               LIMIT 1",
              RawMember::COLUMNS
            ),
            rusqlite::params![phone],
            RawMember::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawMember::into_stored).transpose()
  }

  async fn get(&self, doc_id: &DocumentId) -> Result<Option<MemberRecord>> {
    let doc_id = doc_id.as_str().to_owned();
    let raw = self
      .conn
      .call(move |conn| Ok(select_member(conn, &doc_id)?))
      .await?;
    Ok(raw.map(RawMember::into_stored).transpose()?.map(|m| m.record))
  }

  async fn upsert(&self, doc_id: &DocumentId, record: &MemberRecord) -> Result<()> {
    let encoded = encode_member(doc_id, record, Utc::now())?;
    self
      .conn
      .call(move |conn| Ok(upsert_member(conn, &encoded)?))
      .await?;
    Ok(())
  }

  async fn delete(&self, doc_id: &DocumentId) -> Result<bool> {
    let doc_id = doc_id.as_str().to_owned();
    Ok(
      self
        .conn
        .call(move |conn| Ok(delete_member(conn, &doc_id)?))
        .await?,
    )
  }

  async fn member_id_exists(&self, member_id: &MemberId) -> Result<bool> {
    let member_id = member_id.as_str().to_owned();
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                "SELECT 1 FROM members WHERE member_id = ?1 OR doc_id = ?1 LIMIT 1",
                rusqlite::params![member_id],
                |_| Ok(true),
              )
              .optional()?
              .unwrap_or(false),
          )
        })
        .await?,
    )
  }

  async fn list_migrations(&self, phone: Option<&str>) -> Result<Vec<MigrationAuditEntry>> {
    let phone = phone.map(|p| p.trim().to_owned());

    let raws: Vec<RawAudit> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT audit_id, doc_id, old_member_id, new_member_id, phone, migrated_at
           FROM member_id_migrations
           WHERE ?1 IS NULL OR phone = ?1
           ORDER BY migrated_at, rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![phone], |row| {
            Ok(RawAudit {
              audit_id:      row.get(0)?,
              doc_id:        row.get(1)?,
              old_member_id: row.get(2)?,
              new_member_id: row.get(3)?,
              phone:         row.get(4)?,
              migrated_at:   row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAudit::into_entry).collect()
  }

  async fn transaction<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut dyn MemberTxn) -> onboard_core::Result<T> + Send + 'static,
  {
    let outcome: onboard_core::Result<T> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&mut SqliteTxn { conn: &tx });
        if out.is_ok() {
          tx.commit()?;
        } else {
          debug!("member transaction rolled back");
        }
        Ok(out)
      })
      .await?;

    Ok(outcome?)
  }
}
