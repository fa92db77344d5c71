//! The root coordinator.
//!
//! [`PayMcp`] holds everything that is decided once per deployment: the
//! ordered provider set, the flow type applied to every priced tool, the
//! shared state store, and the flow timing knobs. Tools, priced or not,
//! are routed through [`PayMcp::register_tool`], which dispatches to the
//! registrar.

use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{DEFAULT_STATE_TTL, FlowType};
use crate::error::{ConfigError, RegistrationError};
use crate::flow::FlowTuning;
use crate::provider::{Provider, ProviderBlueprints, ProvidersConfig, build_providers};
use crate::register::register_paid_tool;
use crate::store::{InMemoryStore, StateStore};
use crate::tool::{ToolDef, ToolRegistration, ToolRuntime};

/// Monetization middleware coordinator.
///
/// Construct one with [`PayMcp::builder`], then route every tool
/// registration through it. Priced tools are gated behind the configured
/// payment flow; unpriced tools pass through untouched and never cause a
/// provider call.
pub struct PayMcp {
    providers: Vec<(String, Arc<dyn Provider>)>,
    flow_type: FlowType,
    store: Arc<dyn StateStore>,
    tuning: FlowTuning,
}

impl Debug for PayMcp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let providers: Vec<&String> = self.providers.iter().map(|(name, _)| name).collect();
        f.debug_struct("PayMcp")
            .field("providers", &providers)
            .field("flow_type", &self.flow_type)
            .field("tuning", &self.tuning)
            .finish_non_exhaustive()
    }
}

impl PayMcp {
    /// Starts building a coordinator.
    #[must_use]
    pub fn builder() -> PayMcpBuilder {
        PayMcpBuilder::default()
    }

    /// The flow applied to every priced tool.
    #[must_use]
    pub const fn flow_type(&self) -> FlowType {
        self.flow_type
    }

    /// The shared state store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Registers a tool, wrapping it when it carries price metadata.
    ///
    /// The first configured provider is selected for every priced tool.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::NoProvider`] when a priced tool is registered
    /// without any provider configured; otherwise whatever the registrar or
    /// runtime reports.
    pub fn register_tool<R: ToolRuntime + ?Sized>(
        &self,
        runtime: &mut R,
        def: ToolDef,
    ) -> Result<(), RegistrationError> {
        let Some(price) = def.price else {
            return runtime.register_tool(ToolRegistration {
                name: def.name,
                description: def.description,
                handler: def.handler,
            });
        };

        let (_, provider) = self
            .providers
            .first()
            .ok_or(RegistrationError::NoProvider)?;

        register_paid_tool(
            runtime,
            &def.name,
            &def.description,
            def.handler,
            price,
            self.flow_type,
            provider.clone(),
            self.store.clone(),
            self.tuning,
        )
    }
}

/// Builder for [`PayMcp`].
///
/// Accepts either pre-built provider instances, a configuration map resolved
/// against a blueprint registry, or both. Provider order is retained: the
/// first one registered is the one priced tools use.
pub struct PayMcpBuilder {
    providers: Vec<(String, Arc<dyn Provider>)>,
    providers_config: ProvidersConfig,
    blueprints: ProviderBlueprints,
    flow_type: FlowType,
    store: Option<Arc<dyn StateStore>>,
    ttl: Duration,
    tuning: FlowTuning,
}

impl Default for PayMcpBuilder {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            providers_config: ProvidersConfig::new(),
            blueprints: ProviderBlueprints::new(),
            flow_type: FlowType::TwoStep,
            store: None,
            ttl: DEFAULT_STATE_TTL,
            tuning: FlowTuning::default(),
        }
    }
}

impl Debug for PayMcpBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayMcpBuilder")
            .field("flow_type", &self.flow_type)
            .field("tuning", &self.tuning)
            .finish_non_exhaustive()
    }
}

impl PayMcpBuilder {
    /// Adds a pre-built provider instance.
    #[must_use]
    pub fn provider(mut self, name: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        self.providers.push((name.into(), provider));
        self
    }

    /// Sets the provider configuration map, resolved at build time against
    /// the registered blueprints.
    #[must_use]
    pub fn providers_config(mut self, config: ProvidersConfig) -> Self {
        self.providers_config = config;
        self
    }

    /// Sets the blueprint registry used to resolve the configuration map.
    #[must_use]
    pub fn blueprints(mut self, blueprints: ProviderBlueprints) -> Self {
        self.blueprints = blueprints;
        self
    }

    /// Selects the payment flow for all priced tools. Defaults to two-step.
    #[must_use]
    pub const fn flow_type(mut self, flow_type: FlowType) -> Self {
        self.flow_type = flow_type;
        self
    }

    /// Plugs in a state store. Defaults to a fresh in-process store.
    #[must_use]
    pub fn state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// TTL for the default in-process store. Ignored when a store instance
    /// is plugged in.
    #[must_use]
    pub const fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Poll interval of the progress flow.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.tuning.poll_interval = interval;
        self
    }

    /// Waiting budget of the progress flow.
    #[must_use]
    pub const fn max_wait(mut self, max_wait: Duration) -> Self {
        self.tuning.max_wait = max_wait;
        self
    }

    /// Prompt budget of the elicitation flow.
    #[must_use]
    pub const fn elicit_attempts(mut self, attempts: u32) -> Self {
        self.tuning.elicit_attempts = attempts;
        self
    }

    /// Resolves the configuration and builds the coordinator.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownProvider`] when the configuration map names a
    /// provider with no registered blueprint; [`ConfigError::Provider`] when
    /// a blueprint rejects its configuration. Nothing is partially
    /// constructed on error.
    pub fn build(self) -> Result<PayMcp, ConfigError> {
        let mut providers = self.providers;
        providers.extend(build_providers(&self.providers_config, &self.blueprints)?);

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::with_ttl(self.ttl)));

        tracing::info!(
            flow = %self.flow_type,
            providers = providers.len(),
            "paymcp coordinator initialized"
        );
        Ok(PayMcp {
            providers,
            flow_type: self.flow_type,
            store,
            tuning: self.tuning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PaymentStatus;
    use crate::context::ToolContext;
    use crate::error::ConfigError;
    use crate::price::PriceInfo;
    use crate::testing::{MockProvider, MockRuntime, RecordingHandler};
    use crate::tool::ToolArgs;
    use rust_decimal::Decimal;
    use serde_json::{Value, json};

    fn args(pairs: &[(&str, Value)]) -> ToolArgs {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    fn coordinator(provider: &Arc<MockProvider>, flow_type: FlowType) -> PayMcp {
        PayMcp::builder()
            .provider("mock", provider.clone())
            .flow_type(flow_type)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_two_step_happy_path_end_to_end() {
        let provider = Arc::new(MockProvider::new("mock"));
        let paymcp = coordinator(&provider, FlowType::TwoStep);
        let mut runtime = MockRuntime::new();
        let add = Arc::new(RecordingHandler::new(json!({"sum": 12})));

        paymcp
            .register_tool(
                &mut runtime,
                ToolDef::new("add", "Adds two numbers.", add.clone())
                    .priced(PriceInfo::new(Decimal::new(19, 2), "USD")),
            )
            .unwrap();

        let ctx = ToolContext::new().with_session_id("s1");
        let pending = runtime
            .call("add", args(&[("a", json!(5)), ("b", json!(7))]), &ctx)
            .await
            .unwrap();
        assert_eq!(pending["status"], "pending");
        assert_eq!(pending["payment_id"], "PID1");
        assert_eq!(pending["payment_url"], "https://pay/PID1");
        assert_eq!(pending["next_step"], "confirm_add_payment");

        provider.set_status("PID1", PaymentStatus::Paid);
        let success = runtime
            .call(
                "confirm_add_payment",
                args(&[("payment_id", json!("PID1"))]),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(success["status"], "success");
        assert_eq!(success["payment_id"], "PID1");

        let calls = add.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], args(&[("a", json!(5)), ("b", json!(7))]));
    }

    #[tokio::test]
    async fn test_description_enrichment_last_line() {
        let provider = Arc::new(MockProvider::new("mock"));
        let paymcp = coordinator(&provider, FlowType::TwoStep);
        let mut runtime = MockRuntime::new();

        paymcp
            .register_tool(
                &mut runtime,
                ToolDef::new(
                    "add",
                    "Adds two numbers.",
                    Arc::new(RecordingHandler::new(json!(0))),
                )
                .priced(PriceInfo::new(Decimal::new(19, 2), "USD")),
            )
            .unwrap();

        let description = runtime.description_of("add");
        assert!(description.starts_with("Adds two numbers."));
        assert_eq!(
            description.lines().last().unwrap(),
            "This is a paid function: 0.19 USD. Payment will be requested during execution."
        );
    }

    #[tokio::test]
    async fn test_free_tool_passes_through_untouched() {
        let provider = Arc::new(MockProvider::new("mock"));
        let paymcp = coordinator(&provider, FlowType::TwoStep);
        let mut runtime = MockRuntime::new();
        let ping = Arc::new(RecordingHandler::new(json!("pong")));

        paymcp
            .register_tool(
                &mut runtime,
                ToolDef::new("ping", "Liveness check.", ping.clone()),
            )
            .unwrap();

        assert_eq!(runtime.description_of("ping"), "Liveness check.");
        assert!(!runtime.tools.contains_key("confirm_ping_payment"));

        let result = runtime
            .call("ping", ToolArgs::new(), &ToolContext::new())
            .await
            .unwrap();
        assert_eq!(result, json!("pong"));
        assert_eq!(ping.calls().len(), 1);
        // The coordinator never contacted the provider.
        assert_eq!(provider.created_count(), 0);
        assert_eq!(provider.status_check_count(), 0);
    }

    #[test]
    fn test_unknown_provider_fails_construction() {
        let err = PayMcp::builder()
            .providers_config(
                ProvidersConfig::new().with("fakepay", json!({"apiKey": "sk_test"})),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProvider(name) if name == "fakepay"));
    }

    #[test]
    fn test_priced_tool_without_provider_fails_registration() {
        let paymcp = PayMcp::builder().build().unwrap();
        let mut runtime = MockRuntime::new();

        let err = paymcp
            .register_tool(
                &mut runtime,
                ToolDef::new("add", "Adds.", Arc::new(RecordingHandler::new(json!(0))))
                    .priced(PriceInfo::new(Decimal::new(19, 2), "USD")),
            )
            .unwrap_err();
        assert!(matches!(err, RegistrationError::NoProvider));
        assert!(runtime.tools.is_empty());
    }

    #[test]
    fn test_malformed_price_fails_registration() {
        let provider = Arc::new(MockProvider::new("mock"));
        let paymcp = coordinator(&provider, FlowType::TwoStep);
        let mut runtime = MockRuntime::new();

        let err = paymcp
            .register_tool(
                &mut runtime,
                ToolDef::new("add", "Adds.", Arc::new(RecordingHandler::new(json!(0))))
                    .priced(PriceInfo::new(Decimal::new(-5, 0), "USD")),
            )
            .unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidPrice(_)));
        assert!(runtime.tools.is_empty());

        let err = paymcp
            .register_tool(
                &mut runtime,
                ToolDef::new("add", "Adds.", Arc::new(RecordingHandler::new(json!(0))))
                    .priced(PriceInfo::new(Decimal::new(19, 2), "dollars")),
            )
            .unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidPrice(_)));
    }

    #[tokio::test]
    async fn test_first_provider_wins() {
        let first = Arc::new(MockProvider::new("first"));
        let second = Arc::new(MockProvider::new("second"));
        let paymcp = PayMcp::builder()
            .provider("first", first.clone())
            .provider("second", second.clone())
            .build()
            .unwrap();
        let mut runtime = MockRuntime::new();

        paymcp
            .register_tool(
                &mut runtime,
                ToolDef::new("add", "Adds.", Arc::new(RecordingHandler::new(json!(0))))
                    .priced(PriceInfo::new(Decimal::new(19, 2), "USD")),
            )
            .unwrap();

        let ctx = ToolContext::new().with_session_id("s1");
        runtime.call("add", ToolArgs::new(), &ctx).await.unwrap();
        assert_eq!(first.created_count(), 1);
        assert_eq!(second.created_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_flow_registration_end_to_end() {
        let provider = Arc::new(MockProvider::new("mock"));
        let paymcp = PayMcp::builder()
            .provider("mock", provider.clone())
            .flow_type(FlowType::Progress)
            .poll_interval(Duration::from_secs(3))
            .max_wait(Duration::from_secs(30))
            .build()
            .unwrap();
        let mut runtime = MockRuntime::new();
        let generate = Arc::new(RecordingHandler::new(json!("image")));

        paymcp
            .register_tool(
                &mut runtime,
                ToolDef::new("gen", "Generates.", generate.clone())
                    .priced(PriceInfo::new(Decimal::new(250, 2), "USD")),
            )
            .unwrap();
        assert!(!runtime.tools.contains_key("confirm_gen_payment"));

        provider.paid_after("PID1", 2);
        let ctx = ToolContext::new().with_session_id("s1");
        let envelope = runtime
            .call("gen", args(&[("prompt", json!("x"))]), &ctx)
            .await
            .unwrap();

        assert_eq!(envelope["status"], "success");
        assert_eq!(generate.calls().len(), 1);
    }
}
