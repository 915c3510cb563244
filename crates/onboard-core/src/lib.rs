//! Domain model and identity reconciliation for membership onboarding.
//!
//! No HTTP or SQL lives here. Storage and payment are reached through the
//! [`store::MemberStore`] and [`payment::PaymentGateway`] traits, whose
//! methods return `Send` futures so implementations can be driven from axum.

pub mod audit;
pub mod error;
pub mod member;
pub mod member_id;
pub mod payment;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod validate;

pub use error::{Error, Result};
