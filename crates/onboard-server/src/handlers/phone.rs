//! `POST /api/phone-check`: classify a visitor by phone number.

use axum::{Json, extract::State};
use onboard_core::{
  member::PhoneNumber,
  payment::PaymentGateway,
  reconcile::Detection,
  store::MemberStore,
};
use serde::Deserialize;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct PhoneCheckBody {
  pub phone: String,
}

/// Body: `{"phone":"98765 43210"}`. Legacy records get their canonical id
/// assigned as a side effect.
pub async fn check<S, G>(
  State(state): State<AppState<S, G>>,
  Json(body): Json<PhoneCheckBody>,
) -> Result<Json<Detection>, ApiError>
where
  S: MemberStore + 'static,
  G: PaymentGateway + 'static,
{
  let phone = PhoneNumber::parse(&body.phone)?;
  Ok(Json(state.reconciler.detect_member(&phone).await?))
}
