//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use onboard_core::Error as CoreError;
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

/// An error returned by a handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unauthorized")]
  Unauthorized,

  #[error("session {0} not found or expired")]
  SessionNotFound(Uuid),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Core(#[from] CoreError),
}

impl ApiError {
  fn status(&self) -> StatusCode {
    match self {
      ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
      ApiError::SessionNotFound(_) => StatusCode::NOT_FOUND,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Core(e) => match e {
        CoreError::InvalidPhone(_) => StatusCode::BAD_REQUEST,
        CoreError::Validation(_) | CoreError::MissingMemberId => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::IdentifierConflict(_) => StatusCode::CONFLICT,
        CoreError::Payment(_) => StatusCode::BAD_GATEWAY,
        CoreError::TransactionFailed(_)
        | CoreError::StoreUnavailable(_)
        | CoreError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::CollisionExhausted { .. } | CoreError::Serialization(_) => {
          StatusCode::INTERNAL_SERVER_ERROR
        }
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!(error = %self, "request failed");
    }

    let retryable = matches!(&self, ApiError::Core(e) if e.is_retryable());
    let mut body = json!({ "error": self.to_string(), "retryable": retryable });
    if let ApiError::Core(CoreError::Validation(fields)) = &self {
      body["fields"] = json!(fields);
    }

    let mut res = (status, Json(body)).into_response();
    if matches!(self, ApiError::Unauthorized) {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"onboard\""),
      );
    }
    res
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use onboard_core::validate::FieldError;

  use super::*;

  #[test]
  fn status_mapping() {
    let cases = [
      (ApiError::from(CoreError::InvalidPhone("12".into())), StatusCode::BAD_REQUEST),
      (ApiError::from(CoreError::Timeout(Duration::from_secs(1))), StatusCode::SERVICE_UNAVAILABLE),
      (ApiError::from(CoreError::Payment("down".into())), StatusCode::BAD_GATEWAY),
      (ApiError::SessionNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
    ];
    for (err, status) in cases {
      assert_eq!(err.into_response().status(), status);
    }
  }

  #[tokio::test]
  async fn validation_lists_fields() {
    let err = ApiError::from(CoreError::Validation(vec![FieldError {
      field:   "pan",
      message: "PAN number is required",
    }]));
    let res = err.into_response();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["fields"][0]["field"], "pan");
    assert_eq!(body["retryable"], false);
  }
}
