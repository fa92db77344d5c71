#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Payment provider integrations for the `paymcp` middleware.
//!
//! Each provider implements [`paymcp::provider::Provider`] over its REST
//! API with `reqwest`, mapping the provider's own status vocabulary into
//! the core's via [`PaymentStatus::from_provider`]. Creation requests carry
//! per-request idempotency keys so a duplicate initiation on the provider
//! side deduplicates instead of double-charging.
//!
//! # Usage
//!
//! Register the bundled blueprints with the coordinator builder and select
//! providers through the configuration map:
//!
//! ```rust,ignore
//! use paymcp::core::PayMcp;
//! use paymcp::provider::ProvidersConfig;
//!
//! let paymcp = PayMcp::builder()
//!     .blueprints(paymcp_providers::blueprints())
//!     .providers_config(
//!         ProvidersConfig::new()
//!             .with("walleot", serde_json::json!({"apiKey": "sk_test"})),
//!     )
//!     .build()?;
//! ```
//!
//! [`PaymentStatus::from_provider`]: paymcp::constants::PaymentStatus::from_provider

pub mod square;
pub mod walleot;

use paymcp::provider::ProviderBlueprints;

use crate::square::SquareBlueprint;
use crate::walleot::WalleotBlueprint;

/// All bundled provider blueprints, ready for the coordinator builder.
#[must_use]
pub fn blueprints() -> ProviderBlueprints {
    ProviderBlueprints::new()
        .and_register(WalleotBlueprint)
        .and_register(SquareBlueprint)
}

/// Generates a per-request idempotency key: millisecond timestamp plus an
/// 8-character random suffix.
pub(crate) fn idempotency_key() -> String {
    use rand::Rng;

    let millis = std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let suffix: String = rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(8)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{millis}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blueprints_cover_bundled_providers() {
        let blueprints = blueprints();
        assert!(blueprints.get("walleot").is_some());
        assert!(blueprints.get("square").is_some());
        assert!(blueprints.get("SQUARE").is_some());
        assert!(blueprints.get("fakepay").is_none());
    }

    #[test]
    fn test_idempotency_keys_are_unique() {
        let a = idempotency_key();
        let b = idempotency_key();
        assert_ne!(a, b);
        assert!(a.contains('-'));
    }
}
