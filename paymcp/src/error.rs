//! Error types for the payment middleware layers.
//!
//! Each boundary has its own error enum: [`ProviderError`] for the payment
//! provider interface, [`StoreError`] for state persistence,
//! [`RegistrationError`] for tool wrapping, [`ConfigError`] for coordinator
//! construction, and [`PayMcpError`] for failures a flow deliberately lets
//! escape to the host runtime.
//!
//! Flows never let provider errors escape uncaught; they are translated to
//! error envelopes. Errors from the wrapped tool handler itself propagate
//! unchanged, because they are the tool's own contract with its caller.

/// A boxed error from a wrapped tool handler or host runtime.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while talking to a payment provider.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// The request was malformed before it left the process (bad amount,
    /// currency, or description).
    #[error("invalid payment request: {0}")]
    InvalidRequest(String),

    /// Network failure, timeout, or 5xx: the provider could not be reached
    /// or did not answer sanely. Retriable.
    #[error("provider transport failure: {context}: {source}")]
    Transport {
        /// Human-readable context.
        context: &'static str,
        /// The underlying transport error.
        #[source]
        source: BoxError,
    },

    /// The provider rejected the request with an error body (4xx).
    #[error("provider rejected request: {0}")]
    Api(String),

    /// The provider answered with a payload the core cannot use (missing
    /// fields, non-https payment URL).
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    /// The provider does not implement this optional capability.
    #[error("provider does not support {0}")]
    Unsupported(&'static str),
}

impl ProviderError {
    /// Returns `true` if this is a transport-level failure, as opposed to a
    /// rejection the provider expressed deliberately.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::MalformedResponse(_))
    }
}

/// Errors that can occur inside a state store backend.
///
/// Read failures never surface through [`StateStore::get`]-style lookups;
/// those report absence and the flow recovers by creating a new payment.
/// Write failures are reported so callers can decide whether persistence
/// loss matters.
///
/// [`StateStore::get`]: crate::store::StateStore::get
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("state store backend error: {0}")]
    Backend(#[source] BoxError),

    /// Payment state failed to round-trip through the store's serialization.
    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while registering a tool with the host runtime.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RegistrationError {
    /// The price metadata attached to the handler is unusable.
    #[error("invalid price metadata: {0}")]
    InvalidPrice(String),

    /// A priced tool was registered but no payment provider is configured.
    #[error("no payment provider configured")]
    NoProvider,

    /// The host runtime refused the registration.
    #[error("runtime registration failed: {0}")]
    Runtime(#[source] BoxError),
}

/// Errors raised while constructing the coordinator.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A provider name in the configuration map has no registered blueprint.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// A provider blueprint rejected its configuration.
    #[error("provider configuration error: {0}")]
    Provider(#[from] ProviderError),
}

/// Failures a flow deliberately propagates to the host runtime instead of
/// converting to an error envelope.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PayMcpError {
    /// The elicitation flow was invoked on a context without elicitation
    /// support. There is no silent downgrade to another flow.
    #[error(
        "elicitation flow requires a context with elicitation support; \
         the connected client does not provide it"
    )]
    ElicitationUnsupported,

    /// Elicitation failed for a reason that is not a user action.
    #[error("elicitation failed during confirmation loop: {0}")]
    Elicit(#[from] crate::context::ElicitError),
}
