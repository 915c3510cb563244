//! Error types for `onboard-core`.

use std::time::Duration;

use thiserror::Error;

use crate::{
  member::{DocumentId, MemberId},
  validate::FieldError,
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("member document not found: {0}")]
  NotFound(DocumentId),

  #[error("no free member id after {attempts} attempts starting at {base}")]
  CollisionExhausted { base: MemberId, attempts: u32 },

  #[error("transaction failed: {0}")]
  TransactionFailed(String),

  #[error("member store unavailable: {0}")]
  StoreUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("member store call timed out after {0:?}")]
  Timeout(Duration),

  #[error("member id {0} is held by another member")]
  IdentifierConflict(MemberId),

  #[error("record has no member id to save under")]
  MissingMemberId,

  #[error("invalid phone number: {0:?}")]
  InvalidPhone(String),

  #[error("validation failed on {} field(s)", .0.len())]
  Validation(Vec<FieldError>),

  #[error("payment gateway error: {0}")]
  Payment(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Whether the caller may reasonably retry the same operation.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      Self::TransactionFailed(_) | Self::StoreUnavailable(_) | Self::Timeout(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
