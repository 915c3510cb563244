//! Router tests: the whole flow over an in-memory store and a stub gateway.

use std::{path::PathBuf, sync::Arc};

use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use axum::{
  body::Body,
  http::{Request, StatusCode, header},
  response::Response,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::Utc;
use onboard_core::{
  member::{DocumentId, MemberId, MemberRecord, PhoneNumber},
  payment::{Order, OrderRequest, PaymentGateway},
  store::MemberStore,
};
use onboard_store_sqlite::SqliteStore;
use rand_core::OsRng;
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;

use super::*;

const PHONE: &str = "9876543210";

/// Answers every order request with a fixed order, or fails when asked to.
struct StubGateway {
  fail: bool,
}

impl PaymentGateway for StubGateway {
  async fn create_order(&self, request: OrderRequest) -> onboard_core::Result<Order> {
    if self.fail {
      return Err(onboard_core::Error::Payment("gateway down".into()));
    }
    Ok(Order {
      order_id: "order_test".into(),
      amount:   i64::from(request.amount) * 100,
      key:      "rzp_test_key".into(),
    })
  }
}

type TestState = AppState<SqliteStore, StubGateway>;

fn config(admin_password_hash: String) -> ServerConfig {
  ServerConfig {
    host:                 "127.0.0.1".to_string(),
    port:                 8080,
    store_path:           PathBuf::from(":memory:"),
    session_ttl_secs:     3600,
    store_timeout_secs:   5,
    payment_order_url:    "http://localhost/create-order".to_string(),
    merchant_name:        "Samvedana Foundation".to_string(),
    payment_timeout_secs: 5,
    admin_username:       "admin".to_string(),
    admin_password_hash,
  }
}

async fn make_state_with(gateway: StubGateway) -> TestState {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let salt = SaltString::generate(&mut OsRng);
  let hash = Argon2::default()
    .hash_password(b"secret", &salt)
    .unwrap()
    .to_string();

  AppState::new(Arc::new(store), gateway, config(hash))
}

async fn make_state() -> TestState { make_state_with(StubGateway { fail: false }).await }

#[test]
fn huge_session_ttl_saturates_instead_of_wrapping() {
  let mut cfg = config(String::new());
  cfg.session_ttl_secs = u64::MAX;
  assert_eq!(cfg.session_ttl(), chrono::TimeDelta::MAX);

  cfg.session_ttl_secs = 90;
  assert_eq!(cfg.session_ttl(), chrono::TimeDelta::seconds(90));
}

fn auth_header(user: &str, pass: &str) -> String {
  format!("Basic {}", B64.encode(format!("{user}:{pass}")))
}

async fn send(
  state: &TestState,
  method: &str,
  uri: &str,
  auth: Option<String>,
  body: Option<Value>,
) -> Response {
  let mut builder = Request::builder().method(method).uri(uri);
  if let Some(a) = auth {
    builder = builder.header(header::AUTHORIZATION, a);
  }
  let req = match body {
    Some(b) => builder
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(b.to_string()))
      .unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };
  router(state.clone()).oneshot(req).await.unwrap()
}

async fn json_body(resp: Response) -> Value {
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() }
}

fn complete_profile() -> Value {
  json!({
    "name":        "Ravi Kulkarni",
    "email":       "ravi@example.in",
    "dob":         "1988-03-02",
    "gender":      "Male",
    "blood_group": "b positive",
    "pan":         "abcde1234f",
    "district":    "Pune",
    "subdistrict": "Haveli",
    "village":     "Wagholi",
  })
}

async fn seed_legacy(state: &TestState) -> DocumentId {
  let phone = PhoneNumber::parse(PHONE).unwrap();
  let mut record =
    MemberRecord::new_draft(&phone, MemberId::new("member_42"), Utc::now().date_naive());
  record.profile = serde_json::from_value(complete_profile()).unwrap();
  let doc_id = DocumentId::new("member_42");
  state.reconciler.store().upsert(&doc_id, &record).await.unwrap();
  doc_id
}

async fn begin(state: &TestState, registration: &str) -> Value {
  let resp = send(
    state,
    "POST",
    "/api/sessions",
    None,
    Some(json!({ "phone": PHONE, "registration": registration })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  json_body(resp).await
}

// ── Phone check ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn phone_check_rejects_malformed_phone() {
  let state = make_state().await;
  let resp = send(&state, "POST", "/api/phone-check", None, Some(json!({ "phone": "12345" }))).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  assert_eq!(json_body(resp).await["retryable"], false);
}

#[tokio::test]
async fn phone_check_for_new_visitor() {
  let state = make_state().await;
  let resp = send(&state, "POST", "/api/phone-check", None, Some(json!({ "phone": PHONE }))).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body = json_body(resp).await;
  assert_eq!(body["registration"], "new");
  assert!(body["member"].is_null());
}

#[tokio::test]
async fn phone_check_assigns_canonical_id_to_legacy_member() {
  let state = make_state().await;
  seed_legacy(&state).await;

  let resp =
    send(&state, "POST", "/api/phone-check", None, Some(json!({ "phone": "98765-43210" })))
      .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body = json_body(resp).await;
  assert_eq!(body["registration"], "renewal");
  assert_eq!(body["member"]["short_name"], "Ravi");
  assert!(body["member"]["member_id"].as_str().unwrap().starts_with("SFA-"));
}

// ── Full flow ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn renewal_flow_relocates_legacy_document() {
  let state = make_state().await;
  let old = seed_legacy(&state).await;

  let session = begin(&state, "renewal").await;
  assert_eq!(session["amount_rupees"], 200);
  assert_eq!(session["open_membership_step"], true);
  assert_eq!(session["pending"]["old"], "member_42");
  let id = session["session_id"].as_str().unwrap().to_owned();

  for step in ["personal", "location", "membership"] {
    let resp = send(
      &state,
      "PUT",
      &format!("/api/sessions/{id}/steps/{step}"),
      None,
      Some(json!({ "profile": complete_profile() })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK, "step {step}");
  }

  let resp = send(&state, "POST", &format!("/api/sessions/{id}/order"), None, None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let checkout = json_body(resp).await;
  assert_eq!(checkout["amount"], 20_000);
  assert_eq!(checkout["currency"], "INR");
  assert_eq!(checkout["notes"]["phonenumber"], "919876543210");

  let resp = send(
    &state,
    "POST",
    &format!("/api/sessions/{id}/payment"),
    None,
    Some(json!({ "razorpay_payment_id": "pay_9" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::NO_CONTENT);

  let resp =
    send(&state, "POST", &format!("/api/sessions/{id}/commit"), None, Some(json!({}))).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let outcome = json_body(resp).await;
  assert_eq!(outcome["path"], "renamed");
  assert_eq!(outcome["from"], "member_42");

  let member_id = outcome["member_id"].as_str().unwrap();
  let store = state.reconciler.store();
  assert!(store.get(&old).await.unwrap().is_none());
  let saved = store.get(&DocumentId::new(member_id)).await.unwrap().unwrap();
  assert_eq!(saved.payment_reference.as_deref(), Some("pay_9"));
  assert_eq!(saved.profile.blood_group, "B+");

  let resp = send(&state, "GET", &format!("/api/sessions/{id}"), None, None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failing_step_reports_fields_and_keeps_draft() {
  let state = make_state().await;
  let session = begin(&state, "new").await;
  let id = session["session_id"].as_str().unwrap().to_owned();

  let resp = send(
    &state,
    "PUT",
    &format!("/api/sessions/{id}/steps/personal"),
    None,
    Some(json!({ "profile": { "name": "" } })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
  let body = json_body(resp).await;
  let fields: Vec<&str> =
    body["fields"].as_array().unwrap().iter().filter_map(|f| f["field"].as_str()).collect();
  assert!(fields.contains(&"name"));
  assert!(fields.contains(&"pan"));

  let resp = send(&state, "GET", &format!("/api/sessions/{id}"), None, None).await;
  assert_eq!(json_body(resp).await["draft"]["profile"]["state"], "Maharashtra");
}

#[tokio::test]
async fn oversized_photo_is_rejected() {
  let state = make_state().await;
  let session = begin(&state, "new").await;
  let id = session["session_id"].as_str().unwrap().to_owned();

  let resp = send(
    &state,
    "PUT",
    &format!("/api/sessions/{id}/steps/personal"),
    None,
    Some(json!({
      "profile": complete_profile(),
      "photo":   { "content_type": "image/png", "size_bytes": 6 * 1024 * 1024 },
    })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn contributing_member_pays_the_higher_amount() {
  let state = make_state().await;
  let session = begin(&state, "new").await;
  assert_eq!(session["amount_rupees"], 250);
  let id = session["session_id"].as_str().unwrap().to_owned();

  let resp = send(
    &state,
    "PUT",
    &format!("/api/sessions/{id}/steps/membership"),
    None,
    Some(json!({ "profile": complete_profile(), "class": "EXECUTIVE" })),
  )
  .await;
  assert_eq!(json_body(resp).await["amount_rupees"], 1000);
}

#[tokio::test]
async fn gateway_failure_is_bad_gateway() {
  let state = make_state_with(StubGateway { fail: true }).await;
  let session = begin(&state, "new").await;
  let id = session["session_id"].as_str().unwrap().to_owned();
  send(
    &state,
    "PUT",
    &format!("/api/sessions/{id}/steps/personal"),
    None,
    Some(json!({ "profile": complete_profile() })),
  )
  .await;

  let resp = send(&state, "POST", &format!("/api/sessions/{id}/order"), None, None).await;
  assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn commit_takes_next_id_when_suggestion_was_taken() {
  let state = make_state().await;
  let session = begin(&state, "new").await;
  let id = session["session_id"].as_str().unwrap().to_owned();
  let member_id = session["draft"]["member_id"].as_str().unwrap().to_owned();

  send(
    &state,
    "PUT",
    &format!("/api/sessions/{id}/steps/personal"),
    None,
    Some(json!({ "profile": complete_profile() })),
  )
  .await;

  // Someone else took the suggested id in the meantime.
  let other = PhoneNumber::parse("9812345610").unwrap();
  let taken = MemberRecord::new_draft(&other, MemberId::new(&member_id), Utc::now().date_naive());
  state
    .reconciler
    .store()
    .upsert(&DocumentId::new(&member_id), &taken)
    .await
    .unwrap();

  let resp =
    send(&state, "POST", &format!("/api/sessions/{id}/commit"), None, Some(json!({}))).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body = json_body(resp).await;
  assert_eq!(body["member_id"], format!("{member_id}-1"));
  assert_eq!(body["path"], "direct");

  let kept = state.reconciler.store().get(&DocumentId::new(&member_id)).await.unwrap().unwrap();
  assert_eq!(kept.phone, "9812345610");
}

#[tokio::test]
async fn failed_commit_keeps_session_for_retry() {
  let state = make_state().await;
  let session = begin(&state, "new").await;
  let id = session["session_id"].as_str().unwrap().to_owned();
  let member_id = session["draft"]["member_id"].as_str().unwrap().to_owned();

  // No steps saved yet, so the draft is incomplete.
  let resp =
    send(&state, "POST", &format!("/api/sessions/{id}/commit"), None, Some(json!({}))).await;
  assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

  let resp = send(&state, "GET", &format!("/api/sessions/{id}"), None, None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await["pending"]["new"], member_id.as_str());
}

#[tokio::test]
async fn unknown_and_abandoned_sessions_are_not_found() {
  let state = make_state().await;
  let resp = send(&state, "GET", &format!("/api/sessions/{}", Uuid::new_v4()), None, None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);

  let session = begin(&state, "new").await;
  let id = session["session_id"].as_str().unwrap().to_owned();
  let resp = send(&state, "DELETE", &format!("/api/sessions/{id}"), None, None).await;
  assert_eq!(resp.status(), StatusCode::NO_CONTENT);
  let resp = send(&state, "DELETE", &format!("/api/sessions/{id}"), None, None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ── Admin ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn migrations_require_admin_credentials() {
  let state = make_state().await;
  let resp = send(&state, "GET", "/admin/migrations", None, None).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));

  let resp =
    send(&state, "GET", "/admin/migrations", Some(auth_header("admin", "nope")), None).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn migrations_list_audit_entries() {
  let state = make_state().await;
  seed_legacy(&state).await;
  send(&state, "POST", "/api/phone-check", None, Some(json!({ "phone": PHONE }))).await;

  let auth = || Some(auth_header("admin", "secret"));
  let resp = send(&state, "GET", "/admin/migrations", auth(), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let entries = json_body(resp).await;
  assert_eq!(entries.as_array().unwrap().len(), 1);
  assert_eq!(entries[0]["old_member_id"], "member_42");
  assert_eq!(entries[0]["doc_id"], "member_42");

  let resp = send(&state, "GET", &format!("/admin/migrations?phone={PHONE}"), auth(), None).await;
  assert_eq!(json_body(resp).await.as_array().unwrap().len(), 1);

  let resp = send(&state, "GET", "/admin/migrations?phone=9811111110", auth(), None).await;
  assert!(json_body(resp).await.as_array().unwrap().is_empty());
}
