//! Price metadata attached to tool handlers.
//!
//! A [`PriceInfo`] is the single source of truth for what a tool costs. It is
//! attached to a [`ToolDef`](crate::tool::ToolDef) at registration time and
//! read exactly once, by the registrar; it never changes the handler's
//! signature or behavior.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Immutable price metadata for a paid tool: an amount and an ISO-4217
/// currency code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceInfo {
    /// The amount charged per invocation.
    pub price: Decimal,
    /// Three-letter ISO-4217 currency code, uppercase (e.g. `"USD"`).
    pub currency: String,
}

impl PriceInfo {
    /// Creates price metadata. Validation happens at registration time,
    /// where a bad price fails the registration instead of the call.
    #[must_use]
    pub fn new(price: Decimal, currency: impl Into<String>) -> Self {
        Self {
            price,
            currency: currency.into(),
        }
    }
}

impl std::fmt::Display for PriceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.price, self.currency)
    }
}
