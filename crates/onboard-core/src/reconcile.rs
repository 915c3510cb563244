//! Member-identity reconciliation.
//!
//! Given a phone number, [`Reconciler`] finds the existing member document,
//! decides the canonical identifier for it, migrates the identifier inside a
//! store transaction, and relocates the document under that identifier on the
//! final save.
//!
//! Read-only candidate computation ([`Reconciler::resolve_member_for_phone`])
//! never reserves anything. Every read-then-write that relies on an identifier
//! being free runs inside [`MemberStore::transaction`].

use std::{future::Future, sync::Arc, time::Duration};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  audit::MigrationAuditEntry,
  member::{DocumentId, MemberId, MemberRecord, PhoneNumber, StoredMember},
  member_id::{Clock, MAX_COLLISION_ATTEMPTS, SystemClock, canonical_id, with_suffix},
  payment::PaymentReference,
  session::{FlowSession, PendingMigration, RegistrationKind},
  store::{MemberStore, MemberTxn},
};

/// Applied to every store call unless overridden.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

// ─── Results ─────────────────────────────────────────────────────────────────

/// An existing member together with the identifier decision for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedMember {
  pub member:  StoredMember,
  /// `None` when the document is already stored under its canonical id.
  pub pending: Option<PendingMigration>,
}

impl ResolvedMember {
  /// The identifier the member should see from here on.
  pub fn display_id(&self) -> MemberId {
    match (&self.pending, &self.member.record.member_id) {
      (Some(p), _) => p.new.clone(),
      (None, Some(id)) => id.clone(),
      (None, None) => MemberId::new(self.member.doc_id.as_str()),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectedMember {
  pub doc_id:     DocumentId,
  pub member_id:  MemberId,
  pub short_name: Option<String>,
}

/// Outcome of the phone-entry check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
  pub registration: RegistrationKind,
  pub member:       Option<DetectedMember>,
}

/// Which branch of the final save ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum CommitPath {
  /// Written under the stable id; nothing to relocate.
  Direct,
  /// Written under the new id and the old document deleted atomically.
  Renamed { from: DocumentId },
  /// The rename transaction failed; the new document was written and the old
  /// one left in place.
  FallbackWrite { left_behind: DocumentId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitOutcome {
  pub member_id: MemberId,
  #[serde(flatten)]
  pub path:      CommitPath,
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

pub struct Reconciler<S, C = SystemClock> {
  store:   Arc<S>,
  clock:   C,
  timeout: Duration,
}

impl<S: MemberStore> Reconciler<S> {
  pub fn new(store: Arc<S>) -> Self { Self::with_clock(store, SystemClock) }
}

impl<S: MemberStore, C: Clock> Reconciler<S, C> {
  pub fn with_clock(store: Arc<S>, clock: C) -> Self {
    Self { store, clock, timeout: DEFAULT_STORE_TIMEOUT }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  /// Bound a store call by the configured timeout.
  async fn call<T, E: Into<Error>>(
    &self,
    fut: impl Future<Output = std::result::Result<T, E>>,
  ) -> Result<T> {
    match tokio::time::timeout(self.timeout, fut).await {
      Ok(res) => res.map_err(Into::into),
      Err(_) => Err(Error::Timeout(self.timeout)),
    }
  }

  /// The base canonical id for `phone` in the current month.
  pub fn generate_canonical_id(&self, phone: &str) -> MemberId {
    canonical_id(phone, self.clock.today())
  }

  // ── Assignment ────────────────────────────────────────────────────────────

  /// Give the document at `doc_id` a canonical identifier, atomically.
  ///
  /// A document that already has one is returned unchanged and no audit
  /// entry is written.
  pub async fn ensure_canonical_id(&self, doc_id: &DocumentId, phone: &str) -> Result<MemberId> {
    let base = self.generate_canonical_id(phone);
    let doc_id = doc_id.clone();
    let phone = phone.to_owned();

    let (old, new, migrated) = self
      .call(self.store.transaction(move |tx| {
        let record = tx.get(&doc_id)?.ok_or_else(|| Error::NotFound(doc_id.clone()))?;
        if let Some(current) = record.member_id.as_ref().filter(|id| id.is_canonical()) {
          return Ok((record.member_id.clone(), current.clone(), false));
        }

        let candidate = claim_free_id(tx, &base, |holder| holder.doc_id == doc_id)?;
        tx.set_member_id(&doc_id, &candidate)?;
        tx.append_audit(&MigrationAuditEntry::new(
          doc_id.clone(),
          record.member_id.clone(),
          candidate.clone(),
          phone,
        ))?;
        Ok((record.member_id, candidate, true))
      }))
      .await?;

    if migrated {
      info!(old = ?old.as_ref().map(MemberId::as_str), new = %new, "member id migrated");
    }
    Ok(new)
  }

  // ── Lookup ────────────────────────────────────────────────────────────────

  /// Find the member for `phone` and decide its canonical identifier without
  /// touching the store. `None` means a new member.
  pub async fn resolve_member_for_phone(&self, phone: &str) -> Result<Option<ResolvedMember>> {
    let Some(member) = self.call(self.store.find_by_phone(phone)).await? else {
      debug!("no member for phone");
      return Ok(None);
    };

    let pending = match &member.record.member_id {
      Some(id) if id.is_canonical() => (member.doc_id.as_str() != id.as_str()).then(|| {
        PendingMigration { old: Some(member.doc_id.clone()), new: id.clone() }
      }),
      _ => Some(PendingMigration {
        old: Some(member.doc_id.clone()),
        new: self.generate_canonical_id(phone),
      }),
    };

    debug!(doc_id = %member.doc_id, pending = pending.is_some(), "member resolved");
    Ok(Some(ResolvedMember { member, pending }))
  }

  /// The phone-entry check: classify the visitor and, for legacy records,
  /// try to assign the canonical id right away.
  pub async fn detect_member(&self, phone: &PhoneNumber) -> Result<Detection> {
    let Some(resolved) = self.resolve_member_for_phone(phone.as_str()).await? else {
      return Ok(Detection { registration: RegistrationKind::New, member: None });
    };

    let mut member_id = resolved.display_id();
    if !resolved.member.record.has_canonical_id() {
      match self.ensure_canonical_id(&resolved.member.doc_id, phone.as_str()).await {
        Ok(id) => member_id = id,
        Err(e) => warn!(error = %e, candidate = %member_id, "id assignment failed; showing candidate"),
      }
    }

    Ok(Detection {
      registration: RegistrationKind::Renewal,
      member:       Some(DetectedMember {
        doc_id: resolved.member.doc_id.clone(),
        member_id,
        short_name: resolved.member.record.short_name().map(str::to_owned),
      }),
    })
  }

  /// Start the form flow: resolve the member, record the pending migration
  /// in a fresh session, and prefill the draft.
  pub async fn begin_flow(
    &self,
    phone: &PhoneNumber,
    registration: RegistrationKind,
  ) -> Result<FlowSession> {
    let mut session = FlowSession::begin(phone.clone(), registration);

    match self.resolve_member_for_phone(phone.as_str()).await? {
      Some(resolved) => {
        let mut draft = resolved.member.record.clone();
        draft.phone = phone.as_str().to_owned();
        draft.member_id = Some(resolved.display_id());
        session.set_pending(resolved.pending);
        session.draft = Some(draft);
      }
      None => {
        let id = self.suggest_free_id(phone.as_str()).await?;
        session.draft = Some(MemberRecord::new_draft(phone, id.clone(), self.clock.today()));
        session.set_pending(Some(PendingMigration::fresh(id)));
        session.open_membership_step = false;
      }
    }
    Ok(session)
  }

  /// First candidate not currently held by any document. Advisory only; the
  /// final save re-checks ownership.
  async fn suggest_free_id(&self, phone: &str) -> Result<MemberId> {
    let base = self.generate_canonical_id(phone);
    for n in 0..MAX_COLLISION_ATTEMPTS {
      let candidate = with_suffix(&base, n);
      if !self.call(self.store.member_id_exists(&candidate)).await? {
        return Ok(candidate);
      }
    }
    Err(Error::CollisionExhausted { base, attempts: MAX_COLLISION_ATTEMPTS })
  }

  // ── Persistence ───────────────────────────────────────────────────────────

  /// Persist `record` under its stable identifier, relocating the legacy
  /// document named by `pending` if there is one.
  pub async fn commit_member(
    &self,
    mut record: MemberRecord,
    pending: Option<&PendingMigration>,
    payment: &PaymentReference,
  ) -> Result<CommitOutcome> {
    let stable = pending
      .map(|p| p.new.clone())
      .or_else(|| record.member_id.clone())
      .ok_or(Error::MissingMemberId)?;

    record.profile = record.profile.normalized();
    record.member_id = Some(stable.clone());
    record.payment_reference = payment.usable().map(str::to_owned);

    let Some(old) = pending.and_then(PendingMigration::relocates_from) else {
      let member_id = self.save_member(&record).await?;
      info!(member_id = %member_id, "member saved");
      return Ok(CommitOutcome { member_id, path: CommitPath::Direct });
    };

    match self.rename_member(old, &record).await {
      Ok(member_id) => {
        info!(from = %old, to = %member_id, "member document renamed");
        Ok(CommitOutcome { member_id, path: CommitPath::Renamed { from: old.clone() } })
      }
      Err(e) => {
        warn!(error = %e, from = %old, to = %stable, "rename failed; writing new location only");
        self.write_member(&stable, &record).await?;
        Ok(CommitOutcome {
          member_id: stable,
          path:      CommitPath::FallbackWrite { left_behind: old.clone() },
        })
      }
    }
  }

  /// Atomically write `record` under its identifier and delete `old`.
  ///
  /// If the identifier is held by a different member inside the transaction,
  /// the next free suffix is claimed instead; the id actually used is
  /// returned.
  pub async fn rename_member(&self, old: &DocumentId, record: &MemberRecord) -> Result<MemberId> {
    let base = record.member_id.clone().ok_or(Error::MissingMemberId)?;
    let old = old.clone();
    let mut record = record.clone();

    self
      .call(self.store.transaction(move |tx| {
        let phone = record.phone.clone();
        let id = claim_free_id(tx, &base, |holder| {
          holder.doc_id == old || holder.record.phone == phone
        })?;
        record.member_id = Some(id.clone());
        tx.upsert(&DocumentId::from(&id), &record)?;
        tx.delete(&old)?;
        Ok(id)
      }))
      .await
  }

  /// Atomically create-or-merge `record` under its identifier.
  ///
  /// The identifier is only a suggestion: if a document belonging to another
  /// phone holds it by the time the transaction runs, the next free suffix is
  /// claimed instead. The id actually used is returned.
  pub async fn save_member(&self, record: &MemberRecord) -> Result<MemberId> {
    let base = record.member_id.clone().ok_or(Error::MissingMemberId)?;
    let mut record = record.clone();

    self
      .call(self.store.transaction(move |tx| {
        let phone = record.phone.clone();
        let id = claim_free_id(tx, &base, |holder| holder.record.phone == phone)?;
        record.member_id = Some(id.clone());
        tx.upsert(&DocumentId::from(&id), &record)?;
        Ok(id)
      }))
      .await
  }

  /// Best-effort create-or-merge of `record` under `member_id`, refusing to
  /// merge over a document that belongs to a different phone. The check and
  /// the write are separate calls; this is the fallback once the rename
  /// transaction has already failed.
  pub async fn write_member(&self, member_id: &MemberId, record: &MemberRecord) -> Result<()> {
    let doc_id = DocumentId::from(member_id);
    if let Some(existing) = self.call(self.store.get(&doc_id)).await?
      && existing.phone != record.phone
    {
      return Err(Error::IdentifierConflict(member_id.clone()));
    }
    self.call(self.store.upsert(&doc_id, record)).await
  }

  /// Commit the session's draft: consume its pending migration, save, and
  /// clear the migration markers. On failure the pending migration is put
  /// back so the save can be retried.
  pub async fn finalize(
    &self,
    session: &mut FlowSession,
    mut record: MemberRecord,
    payment: &PaymentReference,
  ) -> Result<CommitOutcome> {
    record.phone = session.phone.as_str().to_owned();
    let pending = session.take_pending();

    match self.commit_member(record, pending.as_ref(), payment).await {
      Ok(outcome) => {
        session.clear_on_commit();
        Ok(outcome)
      }
      Err(e) => {
        session.set_pending(pending);
        Err(e)
      }
    }
  }
}

/// Find the first of `base`, `base-1`, … whose holders all satisfy `ours`.
fn claim_free_id(
  tx: &mut dyn MemberTxn,
  base: &MemberId,
  ours: impl Fn(&StoredMember) -> bool,
) -> Result<MemberId> {
  for n in 0..MAX_COLLISION_ATTEMPTS {
    let candidate = with_suffix(base, n);
    if tx.member_id_holders(&candidate)?.iter().all(&ours) {
      return Ok(candidate);
    }
  }
  Err(Error::CollisionExhausted { base: base.clone(), attempts: MAX_COLLISION_ATTEMPTS })
}
