//! HTTP Basic-auth guard for the admin routes.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, request::Parts};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use onboard_core::{payment::PaymentGateway, store::MemberStore};

use crate::{AppState, error::ApiError};

/// The single admin account allowed to read the migration audit.
#[derive(Clone)]
pub struct AuthConfig {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

/// Present in a handler's arguments means the request carried valid admin
/// credentials.
pub struct Admin;

pub fn verify_auth(headers: &HeaderMap, config: &AuthConfig) -> Result<(), ApiError> {
  let (username, password) = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Basic "))
    .and_then(|encoded| B64.decode(encoded).ok())
    .and_then(|decoded| String::from_utf8(decoded).ok())
    .and_then(|creds| {
      creds
        .split_once(':')
        .map(|(u, p)| (u.to_owned(), p.to_owned()))
    })
    .ok_or(ApiError::Unauthorized)?;

  if username != config.username {
    return Err(ApiError::Unauthorized);
  }

  let parsed_hash =
    PasswordHash::new(&config.password_hash).map_err(|_| ApiError::Unauthorized)?;
  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| ApiError::Unauthorized)
}

impl<S, G> FromRequestParts<AppState<S, G>> for Admin
where
  S: MemberStore + 'static,
  G: PaymentGateway + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S, G>,
  ) -> Result<Self, Self::Rejection> {
    verify_auth(&parts.headers, &state.auth)?;
    Ok(Admin)
  }
}

#[cfg(test)]
mod tests {
  use argon2::{PasswordHasher, password_hash::SaltString};
  use axum::http::{HeaderValue, header};
  use rand_core::OsRng;

  use super::*;

  fn config(password: &str) -> AuthConfig {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .unwrap()
      .to_string();
    AuthConfig { username: "admin".into(), password_hash: hash }
  }

  fn headers(value: &str) -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    h
  }

  fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{pass}")))
  }

  #[test]
  fn correct_credentials() {
    let cfg = config("secret");
    assert!(verify_auth(&headers(&basic("admin", "secret")), &cfg).is_ok());
  }

  #[test]
  fn rejects_bad_credentials() {
    let cfg = config("secret");
    for value in [
      basic("admin", "wrong"),
      basic("someone", "secret"),
      "Basic !!!not-base64!!!".to_owned(),
      "Bearer token".to_owned(),
    ] {
      assert!(
        matches!(verify_auth(&headers(&value), &cfg), Err(ApiError::Unauthorized)),
        "{value}"
      );
    }
    assert!(matches!(verify_auth(&HeaderMap::new(), &cfg), Err(ApiError::Unauthorized)));
  }
}
