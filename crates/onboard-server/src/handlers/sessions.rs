//! Handlers for `/api/sessions` endpoints. A session is one registration visit.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/sessions` | Body: `{"phone":"…","registration":"new\|renewal"}`; 201 + snapshot |
//! | `GET`    | `/sessions/{id}` | 404 if unknown or expired |
//! | `DELETE` | `/sessions/{id}` | Abandon the visit |
//! | `PUT`    | `/sessions/{id}/steps/{step}` | Body: [`StepBody`]; 422 lists failing fields |
//! | `POST`   | `/sessions/{id}/order` | Returns hosted-checkout options |
//! | `POST`   | `/sessions/{id}/payment` | Body: raw checkout response |
//! | `POST`   | `/sessions/{id}/commit` | Body: `{"payment_reference":"…"}` (optional field) |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use onboard_core::{
  member::{MemberClass, MemberProfile, PhoneNumber},
  payment::{CheckoutOptions, OrderRequest, PaymentGateway, PaymentReference, amount_rupees},
  reconcile::CommitOutcome,
  session::{FlowSession, RegistrationKind},
  store::MemberStore,
  validate::{PhotoUpload, Step, validate_all, validate_photo, validate_step},
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// A session snapshot plus the amount its draft would be charged.
#[derive(Debug, Serialize)]
pub struct SessionView {
  #[serde(flatten)]
  pub session:       FlowSession,
  pub amount_rupees: Option<u32>,
}

impl SessionView {
  fn of(session: FlowSession) -> Self {
    let amount = session
      .draft
      .as_ref()
      .map(|d| amount_rupees(d.class, session.registration));
    Self { session, amount_rupees: amount }
  }
}

fn no_draft() -> ApiError { ApiError::BadRequest("session has no draft".into()) }

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub phone:        String,
  pub registration: RegistrationKind,
}

pub async fn create<S, G>(
  State(state): State<AppState<S, G>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MemberStore + 'static,
  G: PaymentGateway + 'static,
{
  let phone = PhoneNumber::parse(&body.phone)?;
  let session = state.reconciler.begin_flow(&phone, body.registration).await?;
  state.sessions.insert(session.clone()).await;
  Ok((StatusCode::CREATED, Json(SessionView::of(session))))
}

// ─── Get / abandon ────────────────────────────────────────────────────────────

pub async fn get_one<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError>
where
  S: MemberStore + 'static,
  G: PaymentGateway + 'static,
{
  let session = state
    .sessions
    .update(id, |s| s.clone())
    .await
    .ok_or(ApiError::SessionNotFound(id))?;
  Ok(Json(SessionView::of(session)))
}

pub async fn abandon<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: MemberStore + 'static,
  G: PaymentGateway + 'static,
{
  state
    .sessions
    .remove(id)
    .await
    .ok_or(ApiError::SessionNotFound(id))?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Steps ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StepBody {
  pub profile: MemberProfile,
  #[serde(default)]
  pub class:   Option<MemberClass>,
  /// Metadata of a photo uploaded alongside this step.
  #[serde(default)]
  pub photo:   Option<PhotoUpload>,
}

/// Validate `step` against the submitted form and, if it passes, keep it as
/// the session's draft. A failing step leaves the stored draft untouched.
pub async fn save_step<S, G>(
  State(state): State<AppState<S, G>>,
  Path((id, step)): Path<(Uuid, Step)>,
  Json(body): Json<StepBody>,
) -> Result<Json<SessionView>, ApiError>
where
  S: MemberStore + 'static,
  G: PaymentGateway + 'static,
{
  if let Some(photo) = &body.photo {
    validate_photo(photo)?;
  }

  let view = state
    .sessions
    .update(id, move |s| {
      let mut draft = s.draft.clone().ok_or_else(no_draft)?;
      draft.profile = body.profile;
      if let Some(class) = body.class {
        draft.class = class;
      }
      validate_step(step, &draft)?;
      s.draft = Some(draft);
      Ok::<_, ApiError>(SessionView::of(s.clone()))
    })
    .await
    .ok_or(ApiError::SessionNotFound(id))??;
  Ok(Json(view))
}

// ─── Payment ──────────────────────────────────────────────────────────────────

/// Create a gateway order for the validated draft and return everything the
/// client needs to open hosted checkout.
pub async fn create_order<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
) -> Result<Json<CheckoutOptions>, ApiError>
where
  S: MemberStore + 'static,
  G: PaymentGateway + 'static,
{
  let session = state
    .sessions
    .update(id, |s| s.clone())
    .await
    .ok_or(ApiError::SessionNotFound(id))?;
  let draft = session.draft.as_ref().ok_or_else(no_draft)?;
  validate_all(draft)?;

  let amount = amount_rupees(draft.class, session.registration);
  let order = state
    .payments
    .create_order(OrderRequest { amount })
    .await?
    .validated()?;
  info!(session = %id, order_id = %order.order_id, amount, "payment order created");

  Ok(Json(CheckoutOptions::for_order(order, &state.config.merchant_name, draft)))
}

/// Keep the raw checkout response for correlation at commit time.
pub async fn record_payment<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  Json(blob): Json<serde_json::Value>,
) -> Result<StatusCode, ApiError>
where
  S: MemberStore + 'static,
  G: PaymentGateway + 'static,
{
  state
    .sessions
    .update(id, move |s| s.payment_blob = Some(blob))
    .await
    .ok_or(ApiError::SessionNotFound(id))?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Commit ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommitBody {
  pub payment_reference: Option<String>,
}

/// Persist the draft and end the session. The session is held out of the
/// store while the save runs, so a concurrent commit of the same session
/// sees 404; on failure it is put back for a retry.
pub async fn commit<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  Json(body): Json<CommitBody>,
) -> Result<Json<CommitOutcome>, ApiError>
where
  S: MemberStore + 'static,
  G: PaymentGateway + 'static,
{
  let mut session = state
    .sessions
    .remove(id)
    .await
    .ok_or(ApiError::SessionNotFound(id))?;

  match finalize(&state, &mut session, body).await {
    Ok(outcome) => {
      info!(session = %id, member_id = %outcome.member_id, "registration committed");
      Ok(Json(outcome))
    }
    Err(e) => {
      state.sessions.insert(session).await;
      Err(e)
    }
  }
}

async fn finalize<S, G>(
  state: &AppState<S, G>,
  session: &mut FlowSession,
  body: CommitBody,
) -> Result<CommitOutcome, ApiError>
where
  S: MemberStore + 'static,
  G: PaymentGateway + 'static,
{
  let draft = session.draft.clone().ok_or_else(no_draft)?;
  validate_all(&draft)?;
  let reference =
    PaymentReference::resolve(body.payment_reference.as_deref(), session.payment_blob.as_ref());
  Ok(state.reconciler.finalize(session, draft, &reference).await?)
}
