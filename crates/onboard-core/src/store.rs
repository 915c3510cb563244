//! The `MemberStore` trait and its transaction handle.
//!
//! The trait is implemented by storage backends (e.g. `onboard-store-sqlite`).
//! The reconciler and the server depend on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use crate::{
  audit::MigrationAuditEntry,
  member::{DocumentId, MemberId, MemberRecord, StoredMember},
};

// ─── Transaction handle ──────────────────────────────────────────────────────

/// Reads and writes available inside [`MemberStore::transaction`].
///
/// Every write made through the handle commits together with the reads that
/// preceded it, or not at all. Methods are synchronous: the closure runs on
/// the backend's own thread while the transaction is held.
pub trait MemberTxn {
  fn get(&mut self, doc_id: &DocumentId) -> crate::Result<Option<MemberRecord>>;

  /// Every document that holds `member_id` in its identifier field or is
  /// stored under a key equal to it.
  fn member_id_holders(&mut self, member_id: &MemberId) -> crate::Result<Vec<StoredMember>>;

  /// Overwrite the identifier field of an existing document.
  fn set_member_id(
    &mut self,
    doc_id: &DocumentId,
    member_id: &MemberId,
  ) -> crate::Result<()>;

  /// Create-or-merge `record` under `doc_id`.
  fn upsert(&mut self, doc_id: &DocumentId, record: &MemberRecord) -> crate::Result<()>;

  fn delete(&mut self, doc_id: &DocumentId) -> crate::Result<()>;

  fn append_audit(&mut self, entry: &MigrationAuditEntry) -> crate::Result<()>;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the member document store.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait MemberStore: Send + Sync {
  type Error: std::error::Error + Into<crate::Error> + Send + Sync + 'static;

  /// Point lookup by phone number. Returns `None` for an unknown phone.
  fn find_by_phone<'a>(
    &'a self,
    phone: &'a str,
  ) -> impl Future<Output = Result<Option<StoredMember>, Self::Error>> + Send + 'a;

  /// Point read by storage key.
  fn get<'a>(
    &'a self,
    doc_id: &'a DocumentId,
  ) -> impl Future<Output = Result<Option<MemberRecord>, Self::Error>> + Send + 'a;

  /// Create-or-merge `record` under `doc_id`.
  ///
  /// Merging keeps the existing `created_at` and keeps the existing payment
  /// reference when `record` has none.
  fn upsert<'a>(
    &'a self,
    doc_id: &'a DocumentId,
    record: &'a MemberRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Delete a document. Returns `false` if it did not exist.
  fn delete<'a>(
    &'a self,
    doc_id: &'a DocumentId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Whether any document holds `member_id` in its identifier field.
  fn member_id_exists<'a>(
    &'a self,
    member_id: &'a MemberId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Audit entries, oldest first, optionally restricted to one phone.
  fn list_migrations<'a>(
    &'a self,
    phone: Option<&'a str>,
  ) -> impl Future<Output = Result<Vec<MigrationAuditEntry>, Self::Error>> + Send + 'a;

  /// Run `f` atomically. An `Err` from `f` rolls back every write made
  /// through the handle and is returned unchanged (converted into
  /// `Self::Error`).
  fn transaction<T, F>(
    &self,
    f: F,
  ) -> impl Future<Output = Result<T, Self::Error>> + Send + '_
  where
    T: Send + 'static,
    F: FnOnce(&mut dyn MemberTxn) -> crate::Result<T> + Send + 'static;
}
