//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, the profile is compact JSON, UUIDs are
//! hyphenated lowercase strings.

use chrono::{DateTime, Utc};
use onboard_core::{
  audit::MigrationAuditEntry,
  member::{DocumentId, MemberClass, MemberId, MemberProfile, MemberRecord, StoredMember},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

/// Unrecognised class strings decode as ordinary membership.
pub fn decode_member_class(s: &str) -> MemberClass { MemberClass::from_legacy(Some(s.trim()), None) }

// ─── Members ─────────────────────────────────────────────────────────────────

/// Column values for one `members` row, ready to bind.
pub struct EncodedMember {
  pub doc_id:       String,
  pub member_id:    Option<String>,
  pub phone:        String,
  pub profile_json: String,
  pub member_class: &'static str,
  pub payment_ref:  Option<String>,
  pub created_at:   String,
  pub updated_at:   String,
}

/// Encode `record` for a write at `now`. A record without `created_at` is
/// stamped with `now`; the merge keeps whichever value the row already has.
pub fn encode_member(
  doc_id: &DocumentId,
  record: &MemberRecord,
  now: DateTime<Utc>,
) -> Result<EncodedMember> {
  Ok(EncodedMember {
    doc_id:       doc_id.as_str().to_owned(),
    member_id:    record.member_id.as_ref().map(|id| id.as_str().to_owned()),
    phone:        record.phone.trim().to_owned(),
    profile_json: serde_json::to_string(&record.profile)?,
    member_class: record.class.as_str(),
    payment_ref:  record.payment_reference.clone(),
    created_at:   encode_dt(record.created_at.unwrap_or(now)),
    updated_at:   encode_dt(now),
  })
}

/// Raw strings read directly from a `members` row.
pub struct RawMember {
  pub doc_id:       String,
  pub member_id:    Option<String>,
  pub phone:        String,
  pub profile_json: String,
  pub member_class: String,
  pub payment_ref:  Option<String>,
  pub created_at:   Option<String>,
  pub updated_at:   Option<String>,
}

impl RawMember {
  pub const COLUMNS: &'static str = "doc_id, member_id, phone, profile_json, member_class, \
                                     payment_ref, created_at, updated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      doc_id:       row.get(0)?,
      member_id:    row.get(1)?,
      phone:        row.get(2)?,
      profile_json: row.get(3)?,
      member_class: row.get(4)?,
      payment_ref:  row.get(5)?,
      created_at:   row.get(6)?,
      updated_at:   row.get(7)?,
    })
  }

  pub fn into_stored(self) -> Result<StoredMember> {
    let profile: MemberProfile = serde_json::from_str(&self.profile_json)?;
    let record = MemberRecord {
      phone: self.phone,
      member_id: self.member_id.filter(|id| !id.is_empty()).map(MemberId::new),
      profile,
      class: decode_member_class(&self.member_class),
      payment_reference: self.payment_ref,
      created_at: self.created_at.as_deref().map(decode_dt).transpose()?,
      updated_at: self.updated_at.as_deref().map(decode_dt).transpose()?,
    };
    Ok(StoredMember { doc_id: DocumentId::new(self.doc_id), record })
  }
}

// ─── Audit ───────────────────────────────────────────────────────────────────

/// Raw strings read directly from a `member_id_migrations` row.
pub struct RawAudit {
  pub audit_id:      String,
  pub doc_id:        String,
  pub old_member_id: Option<String>,
  pub new_member_id: String,
  pub phone:         String,
  pub migrated_at:   String,
}

impl RawAudit {
  pub fn into_entry(self) -> Result<MigrationAuditEntry> {
    Ok(MigrationAuditEntry {
      audit_id:      decode_uuid(&self.audit_id)?,
      doc_id:        DocumentId::new(self.doc_id),
      old_member_id: self.old_member_id.map(MemberId::new),
      new_member_id: MemberId::new(self.new_member_id),
      phone:         self.phone,
      migrated_at:   decode_dt(&self.migrated_at)?,
    })
  }
}
