//! Error type for `onboard-store-sqlite`.

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] onboard_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  /// A stored column could not be decoded into its domain type.
  #[error("decode error: {0}")]
  Decode(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for onboard_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(e) => e,
      Error::Database(tokio_rusqlite::Error::Rusqlite(e)) => from_rusqlite(e),
      Error::Json(e) => onboard_core::Error::Serialization(e),
      other => onboard_core::Error::StoreUnavailable(Box::new(other)),
    }
  }
}

/// Lock contention aborts the transaction; anything else means the store is
/// not usable right now.
pub(crate) fn from_rusqlite(e: rusqlite::Error) -> onboard_core::Error {
  match e.sqlite_error_code() {
    Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
      onboard_core::Error::TransactionFailed(e.to_string())
    }
    _ => onboard_core::Error::StoreUnavailable(Box::new(e)),
  }
}
