//! The session carrier: per-visit state threaded between independently
//! invoked steps of the registration flow.
//!
//! A [`FlowSession`] is an explicit context object. It is created by
//! [`FlowSession::begin`], carries the pending-migration decision until the
//! final save consumes it, and is dropped on commit or when it expires.
//! [`SessionStore`] keeps live sessions in process, keyed by session id.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::member::{DocumentId, MemberId, MemberRecord, PhoneNumber};

/// Whether the visitor is registering for the first time or renewing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationKind {
  New,
  Renewal,
}

/// A decided but not yet committed identifier change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMigration {
  /// Storage key of the legacy document; absent for a fresh record.
  pub old: Option<DocumentId>,
  pub new: MemberId,
}

impl PendingMigration {
  pub fn fresh(new: MemberId) -> Self { Self { old: None, new } }

  /// The old key, if the final save must move the document away from it.
  pub fn relocates_from(&self) -> Option<&DocumentId> {
    self.old.as_ref().filter(|old| old.as_str() != self.new.as_str())
  }
}

// ─── FlowSession ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSession {
  pub session_id:           Uuid,
  pub phone:                PhoneNumber,
  pub registration:         RegistrationKind,
  pub pending:              Option<PendingMigration>,
  /// In-progress form snapshot.
  pub draft:                Option<MemberRecord>,
  /// Renewals jump straight to the membership step.
  pub open_membership_step: bool,
  /// Raw response handed back by hosted checkout, kept for correlation.
  pub payment_blob:         Option<serde_json::Value>,
  pub created_at:           DateTime<Utc>,
  pub touched_at:           DateTime<Utc>,
}

impl FlowSession {
  pub fn begin(phone: PhoneNumber, registration: RegistrationKind) -> Self {
    let now = Utc::now();
    Self {
      session_id: Uuid::new_v4(),
      phone,
      registration,
      pending: None,
      draft: None,
      open_membership_step: registration == RegistrationKind::Renewal,
      payment_blob: None,
      created_at: now,
      touched_at: now,
    }
  }

  /// Replace the pending migration; `None` clears stale markers.
  pub fn set_pending(&mut self, pending: Option<PendingMigration>) {
    self.pending = pending;
  }

  /// Consume the pending migration. A second call returns `None`.
  pub fn take_pending(&mut self) -> Option<PendingMigration> { self.pending.take() }

  /// Drop everything the final save consumed so a retry does not repeat it.
  pub fn clear_on_commit(&mut self) {
    self.pending = None;
    self.payment_blob = None;
    self.open_membership_step = false;
  }

  pub fn touch(&mut self, now: DateTime<Utc>) { self.touched_at = now; }

  pub fn is_expired(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
    now - self.touched_at > ttl
  }
}

// ─── SessionStore ────────────────────────────────────────────────────────────

/// In-process map of live sessions with idle expiry.
#[derive(Debug)]
pub struct SessionStore {
  sessions: RwLock<HashMap<Uuid, FlowSession>>,
  ttl:      TimeDelta,
}

impl SessionStore {
  pub fn new(ttl: TimeDelta) -> Self {
    Self { sessions: RwLock::new(HashMap::new()), ttl }
  }

  /// Store `session`, replacing any session with the same id.
  pub async fn insert(&self, session: FlowSession) -> Uuid {
    let id = session.session_id;
    self.sessions.write().await.insert(id, session);
    id
  }

  /// A snapshot of the live session, or `None` if unknown or expired.
  pub async fn get(&self, id: Uuid) -> Option<FlowSession> {
    let sessions = self.sessions.read().await;
    sessions
      .get(&id)
      .filter(|s| !s.is_expired(Utc::now(), self.ttl))
      .cloned()
  }

  /// Mutate a live session in place and mark it as touched.
  pub async fn update<T>(
    &self,
    id: Uuid,
    f: impl FnOnce(&mut FlowSession) -> T,
  ) -> Option<T> {
    let now = Utc::now();
    let mut sessions = self.sessions.write().await;
    let session = sessions.get_mut(&id).filter(|s| !s.is_expired(now, self.ttl))?;
    let out = f(session);
    session.touch(now);
    Some(out)
  }

  /// Take a session out of the store (commit or abandon).
  pub async fn remove(&self, id: Uuid) -> Option<FlowSession> {
    let session = self.sessions.write().await.remove(&id)?;
    (!session.is_expired(Utc::now(), self.ttl)).then_some(session)
  }

  /// Drop every expired session; returns how many were dropped.
  pub async fn purge_expired(&self) -> usize {
    let now = Utc::now();
    let mut sessions = self.sessions.write().await;
    let before = sessions.len();
    sessions.retain(|_, s| !s.is_expired(now, self.ttl));
    before - sessions.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn phone() -> PhoneNumber { PhoneNumber::parse("9876543210").unwrap() }

  #[test]
  fn renewal_opens_membership_step() {
    assert!(FlowSession::begin(phone(), RegistrationKind::Renewal).open_membership_step);
    assert!(!FlowSession::begin(phone(), RegistrationKind::New).open_membership_step);
  }

  #[test]
  fn pending_is_consumed_once() {
    let mut s = FlowSession::begin(phone(), RegistrationKind::Renewal);
    s.set_pending(Some(PendingMigration {
      old: Some(DocumentId::new("member_42")),
      new: MemberId::new("SFA-01259810"),
    }));
    assert!(s.take_pending().is_some());
    assert!(s.take_pending().is_none());
  }

  #[test]
  fn relocation_needs_a_distinct_old_key() {
    let same = PendingMigration {
      old: Some(DocumentId::new("SFA-01259810")),
      new: MemberId::new("SFA-01259810"),
    };
    assert!(same.relocates_from().is_none());
    assert!(PendingMigration::fresh(MemberId::new("SFA-01259810")).relocates_from().is_none());
  }

  #[tokio::test]
  async fn store_update_and_remove() {
    let store = SessionStore::new(TimeDelta::minutes(30));
    let id = store.insert(FlowSession::begin(phone(), RegistrationKind::New)).await;

    let touched = store
      .update(id, |s| s.payment_blob = Some(serde_json::json!({ "k": 1 })))
      .await;
    assert!(touched.is_some());
    assert!(store.get(id).await.unwrap().payment_blob.is_some());

    assert!(store.remove(id).await.is_some());
    assert!(store.get(id).await.is_none());
    assert!(store.update(id, |_| ()).await.is_none());
  }

  #[tokio::test]
  async fn expired_sessions_are_hidden_and_purged() {
    let store = SessionStore::new(TimeDelta::minutes(30));
    let mut stale = FlowSession::begin(phone(), RegistrationKind::New);
    stale.touch(Utc::now() - TimeDelta::hours(2));
    let stale_id = store.insert(stale).await;
    let live_id = store.insert(FlowSession::begin(phone(), RegistrationKind::New)).await;

    assert!(store.get(stale_id).await.is_none());
    assert_eq!(store.purge_expired().await, 1);
    assert!(store.get(live_id).await.is_some());
  }
}
