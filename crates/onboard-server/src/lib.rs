//! HTTP layer for the membership onboarding flow.
//!
//! Exposes an axum [`Router`] that drives the registration steps against any
//! [`MemberStore`] and [`PaymentGateway`], plus an authenticated admin view
//! of the member-id migration audit.

pub mod auth;
pub mod error;
pub mod gateway;
pub mod handlers;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
  Router,
  routing::{get, post, put},
};
use chrono::TimeDelta;
use onboard_core::{
  payment::PaymentGateway, reconcile::Reconciler, session::SessionStore, store::MemberStore,
};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::debug;

use auth::AuthConfig;
use handlers::{admin, phone, sessions};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `ONBOARD_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                 String,
  pub port:                 u16,
  pub store_path:           PathBuf,
  /// Idle time after which an unfinished registration is dropped.
  #[serde(default = "defaults::session_ttl_secs")]
  pub session_ttl_secs:     u64,
  #[serde(default = "defaults::store_timeout_secs")]
  pub store_timeout_secs:   u64,
  /// Endpoint that creates a checkout order for `{"amount": <rupees>}`.
  pub payment_order_url:    String,
  #[serde(default = "defaults::merchant_name")]
  pub merchant_name:        String,
  #[serde(default = "defaults::payment_timeout_secs")]
  pub payment_timeout_secs: u64,
  pub admin_username:       String,
  pub admin_password_hash:  String,
}

mod defaults {
  pub fn session_ttl_secs() -> u64 { 60 * 60 }
  pub fn store_timeout_secs() -> u64 { 10 }
  pub fn merchant_name() -> String { "Samvedana Foundation".to_owned() }
  pub fn payment_timeout_secs() -> u64 { 15 }
}

impl ServerConfig {
  pub fn session_ttl(&self) -> TimeDelta {
    i64::try_from(self.session_ttl_secs)
      .ok()
      .and_then(TimeDelta::try_seconds)
      .unwrap_or(TimeDelta::MAX)
  }

  pub fn store_timeout(&self) -> Duration { Duration::from_secs(self.store_timeout_secs) }

  pub fn payment_timeout(&self) -> Duration { Duration::from_secs(self.payment_timeout_secs) }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S, G> {
  pub reconciler: Arc<Reconciler<S>>,
  pub sessions:   Arc<SessionStore>,
  pub payments:   Arc<G>,
  pub config:     Arc<ServerConfig>,
  pub auth:       Arc<AuthConfig>,
}

impl<S: MemberStore, G: PaymentGateway> AppState<S, G> {
  pub fn new(store: Arc<S>, payments: G, config: ServerConfig) -> Self {
    let reconciler = Reconciler::new(store).with_timeout(config.store_timeout());
    Self {
      reconciler: Arc::new(reconciler),
      sessions:   Arc::new(SessionStore::new(config.session_ttl())),
      payments:   Arc::new(payments),
      auth:       Arc::new(AuthConfig {
        username:      config.admin_username.clone(),
        password_hash: config.admin_password_hash.clone(),
      }),
      config:     Arc::new(config),
    }
  }
}

impl<S, G> Clone for AppState<S, G> {
  fn clone(&self) -> Self {
    Self {
      reconciler: Arc::clone(&self.reconciler),
      sessions:   Arc::clone(&self.sessions),
      payments:   Arc::clone(&self.payments),
      config:     Arc::clone(&self.config),
      auth:       Arc::clone(&self.auth),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the onboarding API.
pub fn router<S, G>(state: AppState<S, G>) -> Router
where
  S: MemberStore + 'static,
  G: PaymentGateway + 'static,
{
  Router::new()
    .route("/api/phone-check",                  post(phone::check::<S, G>))
    .route("/api/sessions",                     post(sessions::create::<S, G>))
    .route("/api/sessions/{id}",                get(sessions::get_one::<S, G>).delete(sessions::abandon::<S, G>))
    .route("/api/sessions/{id}/steps/{step}",   put(sessions::save_step::<S, G>))
    .route("/api/sessions/{id}/order",          post(sessions::create_order::<S, G>))
    .route("/api/sessions/{id}/payment",        post(sessions::record_payment::<S, G>))
    .route("/api/sessions/{id}/commit",         post(sessions::commit::<S, G>))
    .route("/admin/migrations",                 get(admin::migrations::<S, G>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

/// Periodically drop expired sessions.
pub fn spawn_session_reaper(sessions: Arc<SessionStore>, every: Duration) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut tick = tokio::time::interval(every);
    loop {
      tick.tick().await;
      let purged = sessions.purge_expired().await;
      if purged > 0 {
        debug!(purged, "expired sessions dropped");
      }
    }
  })
}

#[cfg(test)]
mod tests;
