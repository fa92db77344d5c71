//! Square payment provider.
//!
//! Creates a Square Checkout for each payment and reads completion off the
//! underlying order's state: `COMPLETED` maps to paid, `CANCELED` to
//! canceled, anything else is still pending. Sandbox and production hosts
//! are selected by configuration.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use paymcp::constants::PaymentStatus;
use paymcp::error::ProviderError;
use paymcp::provider::{
    BoxFuture, CreatePayment, CreatedPayment, Provider, ProviderBlueprint,
};

use crate::idempotency_key;

const SANDBOX_URL: &str = "https://connect.squareupsandbox.com";
const PRODUCTION_URL: &str = "https://connect.squareup.com";
const SQUARE_VERSION: &str = "2024-01-18";

fn default_redirect_url() -> String {
    "https://example.com/success".to_owned()
}

const fn default_sandbox() -> bool {
    true
}

/// Configuration for [`SquareProvider`], as it appears in the coordinator's
/// provider map.
#[derive(Debug, Clone, Deserialize)]
pub struct SquareConfig {
    /// OAuth access token.
    pub access_token: String,
    /// Location the checkouts are created under.
    pub location_id: String,
    /// Where Square sends the user after payment.
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,
    /// Use the sandbox host. Defaults to `true`.
    #[serde(default = "default_sandbox")]
    pub sandbox: bool,
    /// Host override for tests; takes precedence over `sandbox`.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Client for the Square Checkout API.
pub struct SquareProvider {
    access_token: String,
    location_id: String,
    redirect_url: String,
    base_url: Url,
    client: reqwest::Client,
}

impl std::fmt::Debug for SquareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SquareProvider")
            .field("location_id", &self.location_id)
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl SquareProvider {
    /// Creates a provider from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidRequest`] when the base URL does not
    /// parse.
    pub fn try_new(config: SquareConfig) -> Result<Self, ProviderError> {
        let base = config.base_url.unwrap_or_else(|| {
            if config.sandbox {
                SANDBOX_URL.to_owned()
            } else {
                PRODUCTION_URL.to_owned()
            }
        });
        let base_url = Url::parse(&base)
            .map_err(|e| ProviderError::InvalidRequest(format!("invalid base url {base:?}: {e}")))?;
        Ok(Self {
            access_token: config.access_token,
            location_id: config.location_id,
            redirect_url: config.redirect_url,
            base_url,
            client: reqwest::Client::new(),
        })
    }

    /// Square expresses money in minor units.
    fn amount_cents(amount: Decimal) -> Result<i64, ProviderError> {
        (amount * Decimal::from(100))
            .trunc()
            .to_i64()
            .ok_or_else(|| ProviderError::InvalidRequest(format!("amount out of range: {amount}")))
    }

    async fn get_json(&self, url: Url, context: &'static str) -> Result<Value, ProviderError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .header("Square-Version", SQUARE_VERSION)
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                context,
                source: e.into(),
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return if status.is_client_error() {
                Err(ProviderError::Api(format!("{context}: {status}: {body}")))
            } else {
                Err(ProviderError::Transport {
                    context,
                    source: format!("{status}: {body}").into(),
                })
            };
        }
        response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("{context}: {e}")))
    }

    fn join(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::InvalidRequest(format!("invalid endpoint {path:?}: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct CheckoutEnvelope {
    checkout: Checkout,
}

#[derive(Debug, Deserialize)]
struct Checkout {
    id: Option<String>,
    checkout_page_url: Option<String>,
}

impl Provider for SquareProvider {
    fn name(&self) -> &str {
        "square"
    }

    fn create_payment(
        &self,
        request: CreatePayment,
    ) -> BoxFuture<'_, Result<CreatedPayment, ProviderError>> {
        Box::pin(async move {
            let idempotency = idempotency_key();
            let payload = json!({
                "idempotency_key": idempotency,
                "checkout": {
                    "order": {
                        "order": {
                            "location_id": self.location_id,
                            "line_items": [{
                                "name": request.description(),
                                "quantity": "1",
                                "base_price_money": {
                                    "amount": Self::amount_cents(request.amount())?,
                                    "currency": request.currency(),
                                },
                            }],
                        },
                        "idempotency_key": idempotency,
                    },
                    "redirect_url": self.redirect_url,
                },
            });
            tracing::debug!(amount = %request.amount(), currency = request.currency(), "creating square checkout");

            let url = self.join(&format!("/v2/locations/{}/checkouts", self.location_id))?;
            let response = self
                .client
                .post(url)
                .bearer_auth(&self.access_token)
                .header("Square-Version", SQUARE_VERSION)
                .json(&payload)
                .send()
                .await
                .map_err(|e| ProviderError::Transport {
                    context: "create checkout",
                    source: e.into(),
                })?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return if status.is_client_error() {
                    Err(ProviderError::Api(format!("create checkout: {status}: {body}")))
                } else {
                    Err(ProviderError::Transport {
                        context: "create checkout",
                        source: format!("{status}: {body}").into(),
                    })
                };
            }

            let envelope: CheckoutEnvelope = response.json().await.map_err(|e| {
                ProviderError::MalformedResponse(format!("checkout body: {e}"))
            })?;
            let (Some(id), Some(page_url)) =
                (envelope.checkout.id, envelope.checkout.checkout_page_url)
            else {
                return Err(ProviderError::MalformedResponse(
                    "checkout response missing id or checkout_page_url".into(),
                ));
            };
            CreatedPayment::new(id, &page_url)
        })
    }

    fn get_payment_status<'a>(
        &'a self,
        payment_id: &'a str,
    ) -> BoxFuture<'a, Result<PaymentStatus, ProviderError>> {
        Box::pin(async move {
            // The checkout only points at the order; the order's state is
            // what reflects payment completion.
            let url = self.join(&format!(
                "/v2/locations/{}/checkouts/{payment_id}",
                self.location_id
            ))?;
            let checkout = self.get_json(url, "checkout status").await?;
            let order_id = checkout
                .pointer("/checkout/order/id")
                .and_then(Value::as_str);
            let Some(order_id) = order_id else {
                return Ok(PaymentStatus::Pending);
            };

            let mut url = self.join(&format!("/v2/orders/{order_id}"))?;
            url.query_pairs_mut()
                .append_pair("location_id", &self.location_id);
            let order = self.get_json(url, "order status").await?;
            let state = order
                .pointer("/order/state")
                .and_then(Value::as_str)
                .unwrap_or_default();

            Ok(match state {
                "COMPLETED" => PaymentStatus::Paid,
                "CANCELED" => PaymentStatus::Canceled,
                other => {
                    tracing::debug!(state = other, "square order not complete");
                    PaymentStatus::Pending
                }
            })
        })
    }
}

/// Blueprint registering [`SquareProvider`] under the name `square`.
#[derive(Debug, Clone, Copy)]
pub struct SquareBlueprint;

impl ProviderBlueprint for SquareBlueprint {
    fn name(&self) -> &'static str {
        "square"
    }

    fn build(&self, config: &serde_json::Value) -> Result<Arc<dyn Provider>, ProviderError> {
        let config: SquareConfig = serde_json::from_value(config.clone())
            .map_err(|e| ProviderError::InvalidRequest(format!("square config: {e}")))?;
        Ok(Arc::new(SquareProvider::try_new(config)?))
    }
}
