//! Two-step flow: a non-blocking initiate call plus a companion confirm tool.
//!
//! The initiate wrapper never waits for payment. It answers with a pending
//! envelope carrying the payment URL and the name of a separately registered
//! `confirm_<tool>_payment` tool; the client completes the payment out of
//! band and then calls the confirm tool, which verifies status with the
//! provider, replays the stored arguments, and executes the original
//! handler.
//!
//! There is no timeout in this flow; unconfirmed payments simply age out of
//! the store by TTL.

use std::sync::Arc;

use serde_json::Value;

use crate::constants::{FlowType, PaymentStatus};
use crate::context::ToolContext;
use crate::provider::BoxFuture;
use crate::response::{error_response, pending_response, success_response};
use crate::store::PaymentState;
use crate::tool::{ToolArgs, ToolError, ToolHandler};

use super::{PaidTool, Prepared, provider_error_response};

/// Returns the companion confirmation tool's name for a wrapped tool.
#[must_use]
pub fn confirm_tool_name(tool_name: &str) -> String {
    format!("confirm_{tool_name}_payment")
}

/// The initiate wrapper registered under the original tool name.
pub(crate) struct TwoStepFlow {
    pub(crate) tool: Arc<PaidTool>,
    pub(crate) confirm_tool_name: String,
}

impl TwoStepFlow {
    async fn run(&self, args: ToolArgs, ctx: &ToolContext) -> Result<Value, ToolError> {
        let prepared = match self.tool.prepare(&args, ctx, FlowType::TwoStep).await {
            Ok(prepared) => prepared,
            Err(err) => {
                tracing::error!(tool = %self.tool.name, error = %err, "payment initiation failed");
                return Ok(provider_error_response(&err, None));
            }
        };

        match prepared {
            Prepared::Execute { payment_id, args } => {
                tracing::info!(tool = %self.tool.name, "payment already completed, executing tool");
                self.tool.execute_and_cleanup(args, ctx, &payment_id).await
            }
            Prepared::Gated {
                payment_id,
                payment_url,
                prompt,
                reused,
            } => {
                let message = if reused {
                    format!("Payment still pending: {prompt}")
                } else {
                    prompt
                };
                tracing::info!(
                    tool = %self.tool.name,
                    %payment_id,
                    next = %self.confirm_tool_name,
                    "payment initiated"
                );
                Ok(pending_response(
                    &message,
                    &payment_id,
                    &payment_url,
                    Some(&self.confirm_tool_name),
                    Some(&self.tool.price.price),
                    Some(&self.tool.price.currency),
                ))
            }
        }
    }
}

impl ToolHandler for TwoStepFlow {
    fn call<'a>(
        &'a self,
        args: ToolArgs,
        ctx: &'a ToolContext,
    ) -> BoxFuture<'a, Result<Value, ToolError>> {
        Box::pin(self.run(args, ctx))
    }
}

/// The companion confirmation tool: validates payment and executes the
/// original handler with the arguments stored at initiation.
pub(crate) struct ConfirmTool {
    pub(crate) tool: Arc<PaidTool>,
}

impl ConfirmTool {
    /// Finds the stored state for a payment id, preferring the payment-id
    /// index and falling back to payment-id-keyed storage. Returns the
    /// state and the key to delete after execution.
    async fn lookup(&self, payment_id: &str) -> Option<(PaymentState, String)> {
        if let Some(state) = self.tool.store.get_by_payment_id(payment_id).await {
            let key = state
                .session_id
                .clone()
                .unwrap_or_else(|| payment_id.to_owned());
            return Some((state, key));
        }
        self.tool
            .store
            .get(payment_id)
            .await
            .map(|state| (state, payment_id.to_owned()))
    }

    async fn run(&self, args: ToolArgs, ctx: &ToolContext) -> Result<Value, ToolError> {
        let Some(payment_id) = args.get("payment_id").and_then(Value::as_str) else {
            return Ok(error_response(
                "Missing payment_id argument",
                "invalid_payment_id",
                None,
                None,
            ));
        };
        tracing::info!(%payment_id, "confirming payment");

        let Some((state, state_key)) = self.lookup(payment_id).await else {
            return Ok(error_response(
                "Unknown or expired payment_id",
                "invalid_payment_id",
                Some(payment_id),
                None,
            ));
        };

        let status = match self.tool.provider.get_payment_status(payment_id).await {
            Ok(status) => status,
            Err(err) => {
                tracing::error!(%payment_id, error = %err, "payment status check failed");
                return Ok(error_response(
                    &format!("Failed to check payment status: {err}"),
                    "status_check_failed",
                    Some(payment_id),
                    None,
                ));
            }
        };

        if status != PaymentStatus::Paid {
            // State is kept: a retry after the user finishes paying succeeds.
            return Ok(error_response(
                &format!("Payment status is {status}, expected 'paid'"),
                "payment_not_complete",
                Some(payment_id),
                None,
            ));
        }

        tracing::info!(%payment_id, tool = %self.tool.name, "payment confirmed, executing tool");
        let result = self.tool.handler.call(state.tool_args, ctx).await;
        if let Err(err) = self.tool.store.delete(&state_key).await {
            tracing::warn!(key = %state_key, error = %err, "failed to delete payment state");
        }
        let value = result?;
        Ok(success_response(value, Some(payment_id)))
    }
}

impl ToolHandler for ConfirmTool {
    fn call<'a>(
        &'a self,
        args: ToolArgs,
        ctx: &'a ToolContext,
    ) -> BoxFuture<'a, Result<Value, ToolError>> {
        Box::pin(self.run(args, ctx))
    }
}
