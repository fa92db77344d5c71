//! Framework-agnostic tool types.
//!
//! The middleware talks to the host runtime through two seams: the
//! [`ToolHandler`] trait, which is how any tool, original or wrapper, is
//! invoked, and the [`ToolRuntime`] trait, which is how registrations reach
//! the host. Arguments and results are [`serde_json`] values, so any SDK can
//! bind without the core knowing its types.

use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use serde_json::Value;

use crate::context::ToolContext;
use crate::error::{BoxError, RegistrationError};
use crate::price::PriceInfo;
use crate::provider::BoxFuture;

/// Named tool-call arguments.
pub type ToolArgs = serde_json::Map<String, Value>;

/// A tool handler's own error type, propagated to the host unchanged.
pub type ToolError = BoxError;

/// A named, typed handler invocable by remote callers.
///
/// Implemented both by user tools and by the flow wrappers that gate them.
pub trait ToolHandler: Send + Sync {
    /// Invokes the tool with its named arguments and per-call context.
    fn call<'a>(
        &'a self,
        args: ToolArgs,
        ctx: &'a ToolContext,
    ) -> BoxFuture<'a, Result<Value, ToolError>>;
}

/// Adapts a closure into a [`ToolHandler`].
///
/// ```rust,ignore
/// let handler = FnHandler::new(|args, _ctx| {
///     Box::pin(async move { Ok(serde_json::json!({"echo": args})) })
/// });
/// ```
pub struct FnHandler<F>(F);

impl<F> FnHandler<F>
where
    F: for<'a> Fn(ToolArgs, &'a ToolContext) -> BoxFuture<'a, Result<Value, ToolError>>
        + Send
        + Sync,
{
    /// Wraps the closure.
    #[must_use]
    pub const fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> ToolHandler for FnHandler<F>
where
    F: for<'a> Fn(ToolArgs, &'a ToolContext) -> BoxFuture<'a, Result<Value, ToolError>>
        + Send
        + Sync,
{
    fn call<'a>(
        &'a self,
        args: ToolArgs,
        ctx: &'a ToolContext,
    ) -> BoxFuture<'a, Result<Value, ToolError>> {
        (self.0)(args, ctx)
    }
}

impl<F> Debug for FnHandler<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FnHandler").finish()
    }
}

/// A tool definition on its way to registration: name, description, handler,
/// and the optional price annotation.
///
/// The price metadata is attached with [`ToolDef::priced`] and never changes
/// the handler's signature; the registrar reads it exactly once.
#[derive(Clone)]
pub struct ToolDef {
    /// The tool's registered name.
    pub name: String,
    /// The tool's registered description.
    pub description: String,
    /// The handler to invoke.
    pub handler: Arc<dyn ToolHandler>,
    /// Price annotation; `None` registers the tool unchanged.
    pub price: Option<PriceInfo>,
}

impl Debug for ToolDef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDef")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("price", &self.price)
            .finish_non_exhaustive()
    }
}

impl ToolDef {
    /// Creates an unpriced tool definition.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            handler,
            price: None,
        }
    }

    /// Attaches price metadata, turning this into a paid tool.
    #[must_use]
    pub fn priced(mut self, price: PriceInfo) -> Self {
        self.price = Some(price);
        self
    }
}

/// A finalized registration handed to the host runtime.
pub struct ToolRegistration {
    /// Name to register under.
    pub name: String,
    /// Description, possibly enriched with price text.
    pub description: String,
    /// The handler the runtime should route calls to.
    pub handler: Arc<dyn ToolHandler>,
}

impl Debug for ToolRegistration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistration")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// The registration surface the host runtime exposes to the middleware.
///
/// The middleware owns nothing of the runtime's API; it hands finished
/// registrations over and the runtime wires them into its own dispatch.
pub trait ToolRuntime {
    /// Registers a tool with the runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Runtime`] when the runtime refuses the
    /// registration (duplicate name, invalid schema, ...).
    fn register_tool(&mut self, registration: ToolRegistration) -> Result<(), RegistrationError>;
}
