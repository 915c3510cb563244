//! Append-only audit trail of member-id migrations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::member::{DocumentId, MemberId};

/// Records that a document's identifier changed from `old_member_id` to
/// `new_member_id`. Written in the same transaction as the change itself and
/// never updated or deleted afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationAuditEntry {
  pub audit_id:      Uuid,
  pub doc_id:        DocumentId,
  pub old_member_id: Option<MemberId>,
  pub new_member_id: MemberId,
  pub phone:         String,
  pub migrated_at:   DateTime<Utc>,
}

impl MigrationAuditEntry {
  pub fn new(
    doc_id: DocumentId,
    old_member_id: Option<MemberId>,
    new_member_id: MemberId,
    phone: impl Into<String>,
  ) -> Self {
    Self {
      audit_id: Uuid::new_v4(),
      doc_id,
      old_member_id,
      new_member_id,
      phone: phone.into(),
      migrated_at: Utc::now(),
    }
  }
}
