//! The payment collaborator boundary.
//!
//! The core computes the amount, asks a [`PaymentGateway`] for an order, and
//! later captures the opaque payment reference for attachment to the record.
//! It never interprets the provider's protocol beyond that.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  member::{MemberClass, MemberRecord},
  session::RegistrationKind,
};

/// Sentinel recorded when the success page was reached without a reference.
pub const PLACEHOLDER_REFERENCE: &str = "N/A_Direct_Redirect";

pub const CURRENCY: &str = "INR";

/// Amount payable in whole rupees.
pub fn amount_rupees(class: MemberClass, registration: RegistrationKind) -> u32 {
  match (class, registration) {
    (MemberClass::Contributing, _) => 1000,
    (MemberClass::Ordinary, RegistrationKind::Renewal) => 200,
    (MemberClass::Ordinary, RegistrationKind::New) => 250,
  }
}

// ─── Orders ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
  pub amount: u32,
}

/// An order created by the gateway. `amount` is in paise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub order_id: String,
  pub amount:   i64,
  /// Public checkout key the client opens the hosted page with.
  pub key:      String,
}

impl Order {
  /// Reject orders a client could not open checkout with.
  pub fn validated(self) -> Result<Self> {
    if self.order_id.trim().is_empty() {
      return Err(Error::Payment("gateway returned an empty order id".into()));
    }
    if self.amount <= 0 {
      return Err(Error::Payment(format!(
        "gateway returned a non-positive amount: {}",
        self.amount
      )));
    }
    Ok(self)
  }
}

/// Creates orders with the hosted checkout provider.
pub trait PaymentGateway: Send + Sync {
  fn create_order(
    &self,
    request: OrderRequest,
  ) -> impl Future<Output = Result<Order>> + Send + '_;
}

// ─── Checkout ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutPrefill {
  pub name:    String,
  pub email:   String,
  pub contact: String,
}

/// Free-form notes echoed back by the provider on its dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutNotes {
  pub name:        String,
  pub phonenumber: String,
  pub memberid:    String,
  pub bloodgroup:  String,
  pub village:     String,
  pub subdistrict: String,
  pub district:    String,
  pub photourl:    String,
}

/// Everything a client needs to open hosted checkout for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutOptions {
  pub key:         String,
  pub order_id:    String,
  pub amount:      i64,
  pub currency:    String,
  pub name:        String,
  pub description: String,
  pub prefill:     CheckoutPrefill,
  pub notes:       CheckoutNotes,
}

impl CheckoutOptions {
  pub fn for_order(order: Order, merchant_name: &str, record: &MemberRecord) -> Self {
    let profile = &record.profile;
    Self {
      key:         order.key,
      order_id:    order.order_id,
      amount:      order.amount,
      currency:    CURRENCY.to_owned(),
      name:        merchant_name.to_owned(),
      description: "Membership Payment".to_owned(),
      prefill:     CheckoutPrefill {
        name:    profile.name.clone(),
        email:   profile.email.clone(),
        contact: record.phone.clone(),
      },
      notes:       CheckoutNotes {
        name:        profile.name.clone(),
        phonenumber: format!("91{}", record.phone.trim()),
        memberid:    record
          .member_id
          .as_ref()
          .map(|id| id.as_str().to_owned())
          .unwrap_or_default(),
        bloodgroup:  profile.blood_group.clone(),
        village:     profile.village.clone(),
        subdistrict: profile.subdistrict.clone(),
        district:    profile.district.clone(),
        photourl:    profile.photo_url.clone().unwrap_or_default(),
      },
    }
  }
}

// ─── Reference ───────────────────────────────────────────────────────────────

/// Opaque reference to a completed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentReference(String);

impl PaymentReference {
  pub fn new(reference: impl Into<String>) -> Self { Self(reference.into()) }

  pub fn placeholder() -> Self { Self(PLACEHOLDER_REFERENCE.to_owned()) }

  /// Prefer an explicitly supplied reference, then the `razorpay_payment_id`
  /// of the stored checkout response, else the placeholder.
  pub fn resolve(explicit: Option<&str>, blob: Option<&serde_json::Value>) -> Self {
    explicit
      .filter(|r| !r.trim().is_empty())
      .map(str::to_owned)
      .or_else(|| {
        blob
          .and_then(|b| b.get("razorpay_payment_id"))
          .and_then(serde_json::Value::as_str)
          .filter(|r| !r.trim().is_empty())
          .map(str::to_owned)
      })
      .map_or_else(Self::placeholder, Self)
  }

  /// The reference, if it is real enough to attach to a record.
  pub fn usable(&self) -> Option<&str> {
    let r = self.0.trim();
    (!r.is_empty() && r != PLACEHOLDER_REFERENCE).then_some(r)
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn amounts() {
    assert_eq!(amount_rupees(MemberClass::Ordinary, RegistrationKind::New), 250);
    assert_eq!(amount_rupees(MemberClass::Ordinary, RegistrationKind::Renewal), 200);
    assert_eq!(amount_rupees(MemberClass::Contributing, RegistrationKind::Renewal), 1000);
  }

  #[test]
  fn reference_resolution_order() {
    let blob = json!({ "razorpay_payment_id": "pay_blob" });
    assert_eq!(PaymentReference::resolve(Some("pay_url"), Some(&blob)).as_str(), "pay_url");
    assert_eq!(PaymentReference::resolve(None, Some(&blob)).as_str(), "pay_blob");
    assert_eq!(PaymentReference::resolve(Some(""), None).as_str(), PLACEHOLDER_REFERENCE);
    assert_eq!(
      PaymentReference::resolve(None, Some(&json!({ "other": 1 }))).as_str(),
      PLACEHOLDER_REFERENCE
    );
  }

  #[test]
  fn placeholder_is_not_usable() {
    assert_eq!(PaymentReference::placeholder().usable(), None);
    assert_eq!(PaymentReference::new("  ").usable(), None);
    assert_eq!(PaymentReference::new("pay_123").usable(), Some("pay_123"));
  }

  #[test]
  fn order_validation() {
    let ok = Order { order_id: "order_1".into(), amount: 25_000, key: "rzp".into() };
    assert!(ok.clone().validated().is_ok());
    assert!(Order { amount: 0, ..ok.clone() }.validated().is_err());
    assert!(Order { order_id: " ".into(), ..ok }.validated().is_err());
  }

  #[test]
  fn order_decodes_camel_case() {
    let order: Order =
      serde_json::from_value(json!({ "orderId": "order_9", "amount": 20000, "key": "k" }))
        .unwrap();
    assert_eq!(order.order_id, "order_9");
  }
}
