//! Explicit tool registrar.
//!
//! There is no monkey-patching of the host runtime: the host calls
//! [`PayMcp::register_tool`](crate::core::PayMcp::register_tool) (or
//! [`register_paid_tool`] directly) at registration time, and ownership of
//! the runtime's API stays with the runtime.
//!
//! For a priced tool the registrar validates the price against the provider
//! contract, appends the paid-function notice to the description, builds the
//! flow-specific wrapper, and registers it under the original name. Under
//! the two-step flow a companion `confirm_<tool>_payment` tool is registered
//! through the same runtime surface. A tool without price metadata is
//! registered unchanged.

use std::sync::Arc;

use crate::constants::FlowType;
use crate::error::{ProviderError, RegistrationError};
use crate::flow::two_step::{ConfirmTool, TwoStepFlow, confirm_tool_name};
use crate::flow::elicitation::ElicitationFlow;
use crate::flow::progress::ProgressFlow;
use crate::flow::{FlowTuning, PaidTool};
use crate::messages::description_with_price;
use crate::price::PriceInfo;
use crate::provider::{CreatePayment, Provider};
use crate::store::StateStore;
use crate::tool::{ToolHandler, ToolRegistration, ToolRuntime};

/// Wraps a handler in the selected payment flow and registers it.
///
/// The wrapper keeps the original name; the description gains a final line
/// naming the price. Price metadata that would fail provider validation
/// fails the registration here; the tool is not registered.
///
/// # Errors
///
/// [`RegistrationError::InvalidPrice`] for unusable price metadata,
/// [`RegistrationError::Runtime`] when the host refuses a registration.
#[allow(clippy::too_many_arguments)]
pub fn register_paid_tool<R: ToolRuntime + ?Sized>(
    runtime: &mut R,
    name: &str,
    description: &str,
    handler: Arc<dyn ToolHandler>,
    price: PriceInfo,
    flow_type: FlowType,
    provider: Arc<dyn Provider>,
    store: Arc<dyn StateStore>,
    tuning: FlowTuning,
) -> Result<(), RegistrationError> {
    // Surface bad price metadata now, not on the first paying caller.
    let probe = format!("{name}() execution fee via {flow_type} flow");
    CreatePayment::new(price.price, &price.currency, &probe).map_err(|err| match err {
        ProviderError::InvalidRequest(message) => RegistrationError::InvalidPrice(message),
        other => RegistrationError::InvalidPrice(other.to_string()),
    })?;

    let description = description_with_price(description, &price);
    let tool = Arc::new(PaidTool {
        name: name.to_owned(),
        handler,
        price,
        provider,
        store,
        tuning,
    });

    let wrapper: Arc<dyn ToolHandler> = match flow_type {
        FlowType::TwoStep => {
            let confirm_name = confirm_tool_name(name);
            runtime.register_tool(ToolRegistration {
                name: confirm_name.clone(),
                description: format!("Confirm payment and execute {name}()"),
                handler: Arc::new(ConfirmTool { tool: tool.clone() }),
            })?;
            Arc::new(TwoStepFlow {
                tool,
                confirm_tool_name: confirm_name,
            })
        }
        FlowType::Progress => Arc::new(ProgressFlow { tool }),
        FlowType::Elicitation => Arc::new(ElicitationFlow { tool }),
    };

    tracing::info!(tool = name, flow = %flow_type, "registered paid tool");
    runtime.register_tool(ToolRegistration {
        name: name.to_owned(),
        description,
        handler: wrapper,
    })
}
