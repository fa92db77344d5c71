//! Walleot payment provider.
//!
//! A thin client over Walleot's payment-session REST API: one `POST` to
//! create a session, one `GET` to read its status. Authentication is a
//! Bearer API key.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use url::Url;

use paymcp::constants::PaymentStatus;
use paymcp::error::ProviderError;
use paymcp::provider::{
    BoxFuture, CreatePayment, CreatedPayment, Provider, ProviderBlueprint,
};

use crate::idempotency_key;

const DEFAULT_BASE_URL: &str = "https://api.walleot.com/v1";

/// Configuration for [`WalleotProvider`], as it appears in the coordinator's
/// provider map.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalleotConfig {
    /// Secret API key.
    pub api_key: String,
    /// API base URL override, for sandboxes and tests.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Client for the Walleot payment-session API.
pub struct WalleotProvider {
    api_key: String,
    base_url: Url,
    client: reqwest::Client,
}

impl std::fmt::Debug for WalleotProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalleotProvider")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    session_id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

impl WalleotProvider {
    /// Creates a provider from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidRequest`] when the base URL does not
    /// parse.
    pub fn try_new(config: WalleotConfig) -> Result<Self, ProviderError> {
        let base = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let base_url = Url::parse(base)
            .map_err(|e| ProviderError::InvalidRequest(format!("invalid base url {base:?}: {e}")))?;
        Ok(Self {
            api_key: config.api_key,
            base_url,
            client: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ProviderError::InvalidRequest("base url cannot be a base".into()))?
            .pop_if_empty()
            .extend(path.split('/'));
        Ok(url)
    }

    async fn check_response(
        response: reqwest::Response,
        context: &'static str,
    ) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            Err(ProviderError::Api(format!("{context}: {status}: {body}")))
        } else {
            Err(ProviderError::Transport {
                context,
                source: format!("{status}: {body}").into(),
            })
        }
    }
}

impl Provider for WalleotProvider {
    fn name(&self) -> &str {
        "walleot"
    }

    fn create_payment(
        &self,
        request: CreatePayment,
    ) -> BoxFuture<'_, Result<CreatedPayment, ProviderError>> {
        Box::pin(async move {
            let url = self.endpoint("payment-sessions")?;
            let body = json!({
                "amount": request.amount(),
                "currency": request.currency(),
                "description": request.description(),
            });
            tracing::debug!(amount = %request.amount(), currency = request.currency(), "creating walleot session");

            let response = self
                .client
                .post(url)
                .bearer_auth(&self.api_key)
                .header("Idempotency-Key", idempotency_key())
                .json(&body)
                .send()
                .await
                .map_err(|e| ProviderError::Transport {
                    context: "create payment session",
                    source: e.into(),
                })?;
            let response = Self::check_response(response, "create payment session").await?;

            let session: SessionResponse = response.json().await.map_err(|e| {
                ProviderError::MalformedResponse(format!("payment session body: {e}"))
            })?;
            CreatedPayment::new(session.session_id, &session.url)
        })
    }

    fn get_payment_status<'a>(
        &'a self,
        payment_id: &'a str,
    ) -> BoxFuture<'a, Result<PaymentStatus, ProviderError>> {
        Box::pin(async move {
            let url = self.endpoint(&format!("payment-sessions/{payment_id}"))?;
            let response = self
                .client
                .get(url)
                .bearer_auth(&self.api_key)
                .send()
                .await
                .map_err(|e| ProviderError::Transport {
                    context: "payment session status",
                    source: e.into(),
                })?;
            let response = Self::check_response(response, "payment session status").await?;

            let status: StatusResponse = response.json().await.map_err(|e| {
                ProviderError::MalformedResponse(format!("payment status body: {e}"))
            })?;
            Ok(PaymentStatus::from_provider(&status.status))
        })
    }
}

/// Blueprint registering [`WalleotProvider`] under the name `walleot`.
#[derive(Debug, Clone, Copy)]
pub struct WalleotBlueprint;

impl ProviderBlueprint for WalleotBlueprint {
    fn name(&self) -> &'static str {
        "walleot"
    }

    fn build(&self, config: &serde_json::Value) -> Result<Arc<dyn Provider>, ProviderError> {
        let config: WalleotConfig = serde_json::from_value(config.clone())
            .map_err(|e| ProviderError::InvalidRequest(format!("walleot config: {e}")))?;
        Ok(Arc::new(WalleotProvider::try_new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider(server: &MockServer) -> WalleotProvider {
        WalleotProvider::try_new(WalleotConfig {
            api_key: "sk_test".into(),
            base_url: Some(server.uri()),
        })
        .unwrap()
    }

    fn create_request() -> CreatePayment {
        CreatePayment::new(Decimal::new(250, 2), "USD", "gen() execution fee").unwrap()
    }

    #[tokio::test]
    async fn test_create_payment_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment-sessions"))
            .and(header("Authorization", "Bearer sk_test"))
            .and(header_exists("Idempotency-Key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sessionId": "ws_123",
                "url": "https://pay.walleot.com/s/ws_123",
            })))
            .mount(&server)
            .await;

        let created = provider(&server)
            .await
            .create_payment(create_request())
            .await
            .unwrap();
        assert_eq!(created.payment_id, "ws_123");
        assert_eq!(created.payment_url.as_str(), "https://pay.walleot.com/s/ws_123");
    }

    #[tokio::test]
    async fn test_create_payment_rejects_non_https_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment-sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sessionId": "ws_123",
                "url": "http://pay.walleot.com/s/ws_123",
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .await
            .create_payment(create_request())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_create_payment_maps_4xx_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment-sessions"))
            .respond_with(
                ResponseTemplate::new(422).set_body_string("currency not supported"),
            )
            .mount(&server)
            .await;

        let err = provider(&server)
            .await
            .create_payment(create_request())
            .await
            .unwrap_err();
        match err {
            ProviderError::Api(message) => assert!(message.contains("currency not supported")),
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_payment_maps_5xx_to_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment-sessions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = provider(&server)
            .await
            .create_payment(create_request())
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payment-sessions/ws_123"))
            .and(header("Authorization", "Bearer sk_test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": "paid"})),
            )
            .mount(&server)
            .await;

        let status = provider(&server)
            .await
            .get_payment_status("ws_123")
            .await
            .unwrap();
        assert_eq!(status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_unknown_status_is_pending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payment-sessions/ws_123"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": "requires_review"})),
            )
            .mount(&server)
            .await;

        let status = provider(&server)
            .await
            .get_payment_status("ws_123")
            .await
            .unwrap();
        assert_eq!(status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_blueprint_builds_from_config() {
        let blueprint = WalleotBlueprint;
        let provider = blueprint
            .build(&serde_json::json!({"apiKey": "sk_test"}))
            .unwrap();
        assert_eq!(provider.name(), "walleot");

        let err = blueprint.build(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }
}
