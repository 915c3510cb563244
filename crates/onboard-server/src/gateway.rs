//! [`HttpGateway`] creates checkout orders through the payment provider's
//! order endpoint.

use std::time::Duration;

use onboard_core::{
  Error, Result,
  payment::{Order, OrderRequest, PaymentGateway},
};
use reqwest::Client;
use tracing::debug;

/// Posts `{"amount": <rupees>}` to a fixed URL and expects an [`Order`] back.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpGateway {
  client: Client,
  url:    String,
}

impl HttpGateway {
  pub fn new(url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client, url: url.into() })
  }
}

impl PaymentGateway for HttpGateway {
  async fn create_order(&self, request: OrderRequest) -> Result<Order> {
    debug!(amount = request.amount, "creating payment order");
    let resp = self
      .client
      .post(&self.url)
      .json(&request)
      .send()
      .await
      .map_err(|e| Error::Payment(format!("order request failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
      return Err(Error::Payment(format!("order endpoint returned {status}")));
    }

    resp
      .json::<Order>()
      .await
      .map_err(|e| Error::Payment(format!("malformed order: {e}")))
  }
}
