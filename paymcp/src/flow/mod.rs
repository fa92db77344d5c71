//! The flow engine: three payment-completion protocols over one preamble.
//!
//! Every flow starts the same way ([`PaidTool::prepare`]): resolve the
//! session, consult the store for an existing payment, and either execute
//! immediately (payment already settled), reuse a pending payment, or create
//! a fresh one. The flows differ only in how they walk the user through
//! completion:
//!
//! - two-step: return a pending envelope and a companion confirm tool.
//! - progress: hold the call open, poll, and stream progress updates.
//! - elicitation: prompt the user interactively between status checks.
//!
//! Common guarantees: the original tool runs exactly once per paid payment,
//! with the arguments stored at initiation winning over later ones; no flow
//! runs the tool unless the provider reported `paid`; timeouts retain state
//! for recovery while cancels and terminal provider failures delete it.

pub(crate) mod elicitation;
pub(crate) mod progress;
pub(crate) mod two_step;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::constants::{
    DEFAULT_ELICIT_ATTEMPTS, DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL, FlowType, PaymentStatus,
};
use crate::context::ToolContext;
use crate::error::ProviderError;
use crate::messages::{open_link_message, opened_webview_message};
use crate::price::PriceInfo;
use crate::provider::{CreatePayment, Provider};
use crate::response::{error_response, success_response};
use crate::state::{
    ExistingPayment, check_existing_payment, cleanup_payment_state, save_payment_state,
};
use crate::store::StateStore;
use crate::tool::{ToolArgs, ToolError, ToolHandler};

/// Tunable timing knobs shared by all flows under one coordinator.
#[derive(Debug, Clone, Copy)]
pub struct FlowTuning {
    /// Sleep between provider polls in the progress flow.
    pub poll_interval: Duration,
    /// Total waiting budget of the progress flow.
    pub max_wait: Duration,
    /// Prompt budget of the elicitation flow.
    pub elicit_attempts: u32,
}

impl Default for FlowTuning {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
            elicit_attempts: DEFAULT_ELICIT_ATTEMPTS,
        }
    }
}

/// Everything a flow needs to gate one tool: the wrapped handler, its price,
/// and the provider/store pair to run the payment against.
pub(crate) struct PaidTool {
    pub(crate) name: String,
    pub(crate) handler: Arc<dyn ToolHandler>,
    pub(crate) price: PriceInfo,
    pub(crate) provider: Arc<dyn Provider>,
    pub(crate) store: Arc<dyn StateStore>,
    pub(crate) tuning: FlowTuning,
}

/// Outcome of the shared flow preamble.
pub(crate) enum Prepared {
    /// A prior payment settled; run the tool now with these arguments.
    Execute {
        payment_id: String,
        args: ToolArgs,
    },
    /// A payment (new or reused) is awaiting completion.
    Gated {
        payment_id: String,
        payment_url: String,
        prompt: String,
        reused: bool,
    },
}

impl PaidTool {
    /// Description sent to the provider when creating a payment.
    fn payment_description(&self, flow: FlowType) -> String {
        format!("{}() execution fee via {flow} flow", self.name)
    }

    /// The shared preamble: idempotency check, payment creation or reuse,
    /// and prompt synthesis.
    pub(crate) async fn prepare(
        &self,
        args: &ToolArgs,
        ctx: &ToolContext,
        flow: FlowType,
    ) -> Result<Prepared, ProviderError> {
        let session = ctx.session_key();

        match check_existing_payment(
            session.as_ref(),
            &self.store,
            self.provider.as_ref(),
            &self.name,
        )
        .await
        {
            ExistingPayment::Settled {
                payment_id,
                stored_args,
            } => {
                // Stored arguments win over the current call's on recovery.
                let args = match stored_args {
                    Some(stored) => merge_args(args, stored),
                    None => args.clone(),
                };
                return Ok(Prepared::Execute { payment_id, args });
            }
            ExistingPayment::Pending {
                payment_id,
                payment_url,
            } => {
                tracing::info!(%payment_id, "reusing pending payment");
                let prompt = self.payment_prompt(ctx, &payment_url);
                return Ok(Prepared::Gated {
                    payment_id,
                    payment_url,
                    prompt,
                    reused: true,
                });
            }
            ExistingPayment::None => {}
        }

        let request = CreatePayment::new(
            self.price.price,
            &self.price.currency,
            &self.payment_description(flow),
        )?;
        let created = self.provider.create_payment(request).await?;
        let payment_url = created.payment_url.to_string();
        tracing::info!(
            payment_id = %created.payment_id,
            url = %payment_url,
            "created payment"
        );

        save_payment_state(
            session.as_ref(),
            &self.store,
            &created.payment_id,
            &payment_url,
            &self.name,
            args,
            PaymentStatus::Requested,
        )
        .await;

        let prompt = self.payment_prompt(ctx, &payment_url);
        Ok(Prepared::Gated {
            payment_id: created.payment_id,
            payment_url,
            prompt,
            reused: false,
        })
    }

    /// The wording changes depending on whether a payment window popped
    /// open on the client; the content does not.
    fn payment_prompt(&self, ctx: &ToolContext, payment_url: &str) -> String {
        if ctx.open_webview(payment_url) {
            opened_webview_message(payment_url, &self.price)
        } else {
            open_link_message(payment_url, &self.price)
        }
    }

    /// Runs the wrapped handler and cleans up session state afterwards.
    ///
    /// Handler errors propagate to the host unchanged, but only after the
    /// state cleanup; the payment is consumed either way.
    pub(crate) async fn execute_and_cleanup(
        &self,
        args: ToolArgs,
        ctx: &ToolContext,
        payment_id: &str,
    ) -> Result<Value, ToolError> {
        let result = self.handler.call(args, ctx).await;
        cleanup_payment_state(ctx.session_key().as_ref(), &self.store).await;
        result.map(|value| success_response(value, Some(payment_id)))
    }
}

/// Merges stored arguments over current ones; stored wins on collision.
pub(crate) fn merge_args(current: &ToolArgs, stored: ToolArgs) -> ToolArgs {
    let mut merged = current.clone();
    for (key, value) in stored {
        merged.insert(key, value);
    }
    merged
}

/// Translates a provider failure inside a flow into an error envelope,
/// per the error taxonomy: transport problems read as "provider
/// unavailable", deliberate rejections carry the provider's text.
pub(crate) fn provider_error_response(err: &ProviderError, payment_id: Option<&str>) -> Value {
    if err.is_transport() {
        error_response(
            "Payment provider is unavailable, please retry later",
            "provider_unavailable",
            payment_id,
            None,
        )
    } else {
        error_response(&err.to_string(), "provider_error", payment_id, None)
    }
}
