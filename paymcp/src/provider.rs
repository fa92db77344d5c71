//! Payment provider abstraction.
//!
//! A provider is an external payment service able to create payments and
//! report their status. The core requires only two capabilities,
//! [`Provider::create_payment`] and [`Provider::get_payment_status`], and
//! asks that status checks be idempotent and side-effect free. Capture and
//! refund are optional.
//!
//! Concrete providers are instantiated once, at coordinator startup, from a
//! configuration map through the [`ProviderBlueprints`] registry. Providers
//! are free to maintain token caches, HTTP session pools, and retry policies
//! internally.

use std::collections::HashMap;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rust_decimal::Decimal;
use url::Url;

use crate::constants::PaymentStatus;
use crate::error::{ConfigError, ProviderError};

/// Boxed future type alias for dyn-compatible async trait methods.
///
/// Eliminates the verbose `Pin<Box<dyn Future<Output = T> + Send + 'a>>`
/// pattern throughout the codebase. All [`Provider`],
/// [`StateStore`](crate::store::StateStore), and capability trait methods
/// use this alias.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Currencies whose minor unit is the whole unit (no fractional digits).
const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "JPY", "KMF", "KRW", "MGA", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

/// Maximum payment description length in bytes, after trimming.
const MAX_DESCRIPTION_BYTES: usize = 127;

/// A validated payment creation request.
///
/// Construction enforces the provider contract: a positive amount with at
/// most two fractional digits (none for zero-decimal currencies), a
/// three-letter uppercase ISO-4217 currency code, and a trimmed UTF-8
/// description of at most 127 bytes without control characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePayment {
    amount: Decimal,
    currency: String,
    description: String,
}

impl CreatePayment {
    /// Validates and builds a payment creation request.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidRequest`] if any field violates the
    /// provider contract.
    pub fn new(
        amount: Decimal,
        currency: &str,
        description: &str,
    ) -> Result<Self, ProviderError> {
        if amount <= Decimal::ZERO {
            return Err(ProviderError::InvalidRequest(format!(
                "amount must be positive, got {amount}"
            )));
        }
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ProviderError::InvalidRequest(format!(
                "currency must be a 3-letter uppercase ISO-4217 code, got {currency:?}"
            )));
        }
        let max_scale = if ZERO_DECIMAL_CURRENCIES.contains(&currency) {
            0
        } else {
            2
        };
        if amount.normalize().scale() > max_scale {
            return Err(ProviderError::InvalidRequest(format!(
                "amount {amount} has more than {max_scale} fractional digits for {currency}"
            )));
        }
        let description = description.trim();
        if description.len() > MAX_DESCRIPTION_BYTES {
            return Err(ProviderError::InvalidRequest(format!(
                "description exceeds {MAX_DESCRIPTION_BYTES} bytes"
            )));
        }
        if description.chars().any(char::is_control) {
            return Err(ProviderError::InvalidRequest(
                "description must not contain control characters".into(),
            ));
        }
        Ok(Self {
            amount,
            currency: currency.to_owned(),
            description: description.to_owned(),
        })
    }

    /// The amount to charge.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.amount
    }

    /// The ISO-4217 currency code.
    #[must_use]
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// The trimmed payment description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// A freshly created payment: the provider's opaque id and the URL where the
/// end user completes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPayment {
    /// Provider-issued payment identifier.
    pub payment_id: String,
    /// Checkout URL. Always `https`.
    pub payment_url: Url,
}

impl CreatedPayment {
    /// Validates a provider's creation response.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::MalformedResponse`] if the payment id is
    /// empty or the URL is not `https`.
    pub fn new(payment_id: impl Into<String>, payment_url: &str) -> Result<Self, ProviderError> {
        let payment_id = payment_id.into();
        if payment_id.is_empty() {
            return Err(ProviderError::MalformedResponse(
                "provider returned an empty payment id".into(),
            ));
        }
        let url = Url::parse(payment_url).map_err(|e| {
            ProviderError::MalformedResponse(format!("invalid payment URL {payment_url:?}: {e}"))
        })?;
        if url.scheme() != "https" {
            return Err(ProviderError::MalformedResponse(format!(
                "payment URL must be https, got {payment_url:?}"
            )));
        }
        Ok(Self {
            payment_id,
            payment_url: url,
        })
    }
}

/// Trait defining the asynchronous interface to a payment provider.
///
/// The trait is dyn-compatible, allowing heterogeneous provider instances to
/// be stored in the coordinator and passed as trait objects.
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// The provider's registry name (e.g. `"walleot"`).
    fn name(&self) -> &str;

    /// Creates a payment and returns its id and checkout URL.
    fn create_payment(
        &self,
        request: CreatePayment,
    ) -> BoxFuture<'_, Result<CreatedPayment, ProviderError>>;

    /// Reports the current status of a payment.
    ///
    /// Must be idempotent and side-effect free; the flows call it
    /// repeatedly while waiting.
    fn get_payment_status<'a>(
        &'a self,
        payment_id: &'a str,
    ) -> BoxFuture<'a, Result<PaymentStatus, ProviderError>>;

    /// Captures a previously authorized payment. Optional.
    fn capture<'a>(&'a self, payment_id: &'a str) -> BoxFuture<'a, Result<(), ProviderError>> {
        let _ = payment_id;
        Box::pin(async { Err(ProviderError::Unsupported("capture")) })
    }

    /// Refunds a settled payment. Optional.
    fn refund<'a>(&'a self, payment_id: &'a str) -> BoxFuture<'a, Result<(), ProviderError>> {
        let _ = payment_id;
        Box::pin(async { Err(ProviderError::Unsupported("refund")) })
    }
}

impl<T: Provider> Provider for Arc<T> {
    fn name(&self) -> &str {
        self.as_ref().name()
    }

    fn create_payment(
        &self,
        request: CreatePayment,
    ) -> BoxFuture<'_, Result<CreatedPayment, ProviderError>> {
        self.as_ref().create_payment(request)
    }

    fn get_payment_status<'a>(
        &'a self,
        payment_id: &'a str,
    ) -> BoxFuture<'a, Result<PaymentStatus, ProviderError>> {
        self.as_ref().get_payment_status(payment_id)
    }

    fn capture<'a>(&'a self, payment_id: &'a str) -> BoxFuture<'a, Result<(), ProviderError>> {
        self.as_ref().capture(payment_id)
    }

    fn refund<'a>(&'a self, payment_id: &'a str) -> BoxFuture<'a, Result<(), ProviderError>> {
        self.as_ref().refund(payment_id)
    }
}

/// A factory that builds a [`Provider`] from its configuration value.
///
/// Blueprints are registered at startup; the coordinator resolves its
/// provider configuration map against them, failing on unknown names.
pub trait ProviderBlueprint: Send + Sync {
    /// The configuration key this blueprint answers to (e.g. `"square"`).
    fn name(&self) -> &'static str;

    /// Builds a provider instance from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidRequest`] when the configuration is
    /// malformed (missing keys, bad types).
    fn build(&self, config: &serde_json::Value) -> Result<Arc<dyn Provider>, ProviderError>;
}

/// Registry of provider blueprints (factories).
///
/// Register blueprints at startup, then resolve a configuration map with
/// [`build_providers`].
#[derive(Default)]
pub struct ProviderBlueprints(HashMap<String, Box<dyn ProviderBlueprint>>);

impl Debug for ProviderBlueprints {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let names: Vec<&String> = self.0.keys().collect();
        f.debug_tuple("ProviderBlueprints").field(&names).finish()
    }
}

impl ProviderBlueprints {
    /// Creates an empty blueprint registry.
    #[must_use]
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Registers a blueprint and returns self for chaining.
    #[must_use]
    pub fn and_register<B: ProviderBlueprint + 'static>(mut self, blueprint: B) -> Self {
        self.register(blueprint);
        self
    }

    /// Registers a provider blueprint. Case-insensitive on the name.
    pub fn register<B: ProviderBlueprint + 'static>(&mut self, blueprint: B) {
        self.0
            .insert(blueprint.name().to_ascii_lowercase(), Box::new(blueprint));
    }

    /// Gets a blueprint by name, case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn ProviderBlueprint> {
        self.0.get(&name.to_ascii_lowercase()).map(|b| &**b)
    }
}

/// An ordered provider configuration map: name → provider-specific config.
///
/// Order matters: the first configured provider is the one the registrar
/// selects for every priced tool.
#[derive(Debug, Clone, Default)]
pub struct ProvidersConfig(Vec<(String, serde_json::Value)>);

impl ProvidersConfig {
    /// Creates an empty configuration map.
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Adds a provider configuration entry, preserving order.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, config: serde_json::Value) -> Self {
        self.0.push((name.into(), config));
        self
    }

    /// Iterates entries in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.0.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// Returns `true` if no providers are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Resolves a provider configuration map against a blueprint registry.
///
/// Entries are instantiated in configuration order. An unknown provider name
/// fails the whole resolution; nothing is registered in that case.
///
/// # Errors
///
/// Returns [`ConfigError::UnknownProvider`] for unrecognized names and
/// [`ConfigError::Provider`] when a blueprint rejects its configuration.
pub fn build_providers(
    config: &ProvidersConfig,
    blueprints: &ProviderBlueprints,
) -> Result<Vec<(String, Arc<dyn Provider>)>, ConfigError> {
    let mut providers = Vec::new();
    for (name, provider_config) in config.iter() {
        let blueprint = blueprints
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProvider(name.to_owned()))?;
        let provider = blueprint.build(provider_config)?;
        tracing::debug!(provider = name, "payment provider configured");
        providers.push((name.to_owned(), provider));
    }
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_payment_valid() {
        let request = CreatePayment::new(Decimal::new(19, 2), "USD", "  add() execution fee  ")
            .unwrap();
        assert_eq!(request.amount(), Decimal::new(19, 2));
        assert_eq!(request.currency(), "USD");
        assert_eq!(request.description(), "add() execution fee");
    }

    #[test]
    fn test_create_payment_rejects_nonpositive_amount() {
        assert!(CreatePayment::new(Decimal::ZERO, "USD", "fee").is_err());
        assert!(CreatePayment::new(Decimal::new(-100, 2), "USD", "fee").is_err());
    }

    #[test]
    fn test_create_payment_rejects_bad_currency() {
        assert!(CreatePayment::new(Decimal::ONE, "usd", "fee").is_err());
        assert!(CreatePayment::new(Decimal::ONE, "US", "fee").is_err());
        assert!(CreatePayment::new(Decimal::ONE, "DOLLARS", "fee").is_err());
    }

    #[test]
    fn test_create_payment_scale_limits() {
        assert!(CreatePayment::new(Decimal::new(1999, 3), "USD", "fee").is_err());
        // Trailing zeros normalize away.
        assert!(CreatePayment::new(Decimal::new(19_900, 4), "USD", "fee").is_ok());
        // Zero-decimal currency rejects any fraction.
        assert!(CreatePayment::new(Decimal::new(15, 1), "JPY", "fee").is_err());
        assert!(CreatePayment::new(Decimal::new(100, 0), "JPY", "fee").is_ok());
    }

    #[test]
    fn test_create_payment_description_limits() {
        let long = "x".repeat(128);
        assert!(CreatePayment::new(Decimal::ONE, "USD", &long).is_err());
        assert!(CreatePayment::new(Decimal::ONE, "USD", "line\nbreak").is_err());
    }

    #[test]
    fn test_created_payment_requires_https() {
        assert!(CreatedPayment::new("pid", "https://pay.example/p/1").is_ok());
        assert!(CreatedPayment::new("pid", "http://pay.example/p/1").is_err());
        assert!(CreatedPayment::new("pid", "not a url").is_err());
        assert!(CreatedPayment::new("", "https://pay.example/p/1").is_err());
    }

    struct NopBlueprint(&'static str);

    impl ProviderBlueprint for NopBlueprint {
        fn name(&self) -> &'static str {
            self.0
        }

        fn build(&self, _config: &serde_json::Value) -> Result<Arc<dyn Provider>, ProviderError> {
            Err(ProviderError::InvalidRequest("unbuildable".into()))
        }
    }

    #[test]
    fn test_build_providers_unknown_name_fails() {
        let blueprints = ProviderBlueprints::new().and_register(NopBlueprint("walleot"));
        let config = ProvidersConfig::new().with("fakepay", serde_json::json!({}));
        let err = build_providers(&config, &blueprints).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProvider(name) if name == "fakepay"));
    }

    #[test]
    fn test_build_providers_propagates_blueprint_errors() {
        let blueprints = ProviderBlueprints::new().and_register(NopBlueprint("walleot"));
        let config = ProvidersConfig::new().with("walleot", serde_json::json!({}));
        let err = build_providers(&config, &blueprints).unwrap_err();
        assert!(matches!(err, ConfigError::Provider(_)));
    }
}
