//! `GET /admin/migrations[?phone=<phone>]`: the member-id migration audit.

use axum::{
  Json,
  extract::{Query, State},
};
use onboard_core::{
  audit::MigrationAuditEntry,
  member::PhoneNumber,
  payment::PaymentGateway,
  store::MemberStore,
};
use serde::Deserialize;

use crate::{AppState, auth::Admin, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct MigrationParams {
  pub phone: Option<String>,
}

pub async fn migrations<S, G>(
  _admin: Admin,
  State(state): State<AppState<S, G>>,
  Query(params): Query<MigrationParams>,
) -> Result<Json<Vec<MigrationAuditEntry>>, ApiError>
where
  S: MemberStore + 'static,
  G: PaymentGateway + 'static,
{
  let phone = params.phone.as_deref().map(PhoneNumber::parse).transpose()?;
  let entries = state
    .reconciler
    .store()
    .list_migrations(phone.as_ref().map(PhoneNumber::as_str))
    .await
    .map_err(|e| ApiError::Core(e.into()))?;
  Ok(Json(entries))
}
