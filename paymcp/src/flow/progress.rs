//! Progress flow: hold the call open and poll until the payment settles.
//!
//! After the preamble the wrapper emits a progress notification carrying the
//! payment URL, then sleeps and polls the provider in a loop, honoring the
//! client's abort signal between polls. Exhausting the waiting budget
//! returns a timeout error but keeps the stored state, so a later
//! invocation on the same session picks the payment back up.
//!
//! Without a progress reporter on the context the flow degrades to silent
//! polling; the protocol is unchanged.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::constants::{FlowType, PaymentStatus};
use crate::context::ToolContext;
use crate::provider::BoxFuture;
use crate::response::{canceled_response, error_response};
use crate::state::{cleanup_payment_state, update_payment_status};
use crate::tool::{ToolArgs, ToolError, ToolHandler};

use super::{PaidTool, Prepared, provider_error_response};

/// The blocking wrapper registered under the original tool name.
pub(crate) struct ProgressFlow {
    pub(crate) tool: Arc<PaidTool>,
}

/// Elapsed share of the waiting budget as a percentage, capped at 99 so the
/// bar never completes before the payment does.
fn progress_percent(waited: Duration, max_wait: Duration) -> u8 {
    let scaled = waited
        .as_millis()
        .saturating_mul(99)
        .checked_div(max_wait.as_millis().max(1))
        .unwrap_or(99);
    u8::try_from(scaled).unwrap_or(99).min(99)
}

async fn notify(ctx: &ToolContext, message: &str, progress: u8) {
    if let Some(reporter) = ctx.progress() {
        reporter.report(message, progress).await;
    } else {
        tracing::debug!(progress, message, "progress update without reporter");
    }
}

impl ProgressFlow {
    async fn run(&self, args: ToolArgs, ctx: &ToolContext) -> Result<Value, ToolError> {
        let session = ctx.session_key();

        let prepared = match self.tool.prepare(&args, ctx, FlowType::Progress).await {
            Ok(prepared) => prepared,
            Err(err) => {
                tracing::error!(tool = %self.tool.name, error = %err, "payment initiation failed");
                cleanup_payment_state(session.as_ref(), &self.tool.store).await;
                return Ok(provider_error_response(&err, None));
            }
        };

        let (payment_id, payment_url, prompt) = match prepared {
            Prepared::Execute { payment_id, args } => {
                notify(
                    ctx,
                    "Previous payment detected — executing with original request …",
                    100,
                )
                .await;
                return self.tool.execute_and_cleanup(args, ctx, &payment_id).await;
            }
            Prepared::Gated {
                payment_id,
                payment_url,
                prompt,
                ..
            } => (payment_id, payment_url, prompt),
        };

        notify(ctx, &prompt, 0).await;

        let tuning = self.tool.tuning;
        let mut waited = Duration::ZERO;
        let mut paid = false;
        while waited < tuning.max_wait {
            tokio::time::sleep(tuning.poll_interval).await;
            waited += tuning.poll_interval;

            if ctx.is_aborted() {
                tracing::warn!(%payment_id, "client aborted while waiting for payment");
                cleanup_payment_state(session.as_ref(), &self.tool.store).await;
                return Ok(canceled_response(
                    "Payment aborted by client",
                    Some(&payment_id),
                    Some(&payment_url),
                ));
            }

            let status = match self.tool.provider.get_payment_status(&payment_id).await {
                Ok(status) => status,
                Err(err) => {
                    tracing::error!(%payment_id, error = %err, "payment status poll failed");
                    cleanup_payment_state(session.as_ref(), &self.tool.store).await;
                    return Ok(provider_error_response(&err, Some(&payment_id)));
                }
            };
            tracing::debug!(%payment_id, %status, waited_secs = waited.as_secs(), "poll");

            if status == PaymentStatus::Paid {
                notify(ctx, "Payment received — generating result …", 100).await;
                update_payment_status(session.as_ref(), &self.tool.store, PaymentStatus::Paid)
                    .await;
                paid = true;
                break;
            }
            if status.is_terminal_failure() {
                cleanup_payment_state(session.as_ref(), &self.tool.store).await;
                notify(ctx, &format!("Payment {status} — aborting"), 0).await;
                return Ok(canceled_response(
                    &format!("Payment status is {status}"),
                    Some(&payment_id),
                    Some(&payment_url),
                ));
            }

            notify(
                ctx,
                &format!("Waiting for payment … ({}s elapsed)", waited.as_secs()),
                progress_percent(waited, tuning.max_wait),
            )
            .await;
        }

        if !paid {
            // The payment may still complete; retained state lets the next
            // invocation on this session recover it.
            update_payment_status(session.as_ref(), &self.tool.store, PaymentStatus::Timeout)
                .await;
            tracing::warn!(%payment_id, "payment wait budget exhausted");
            return Ok(error_response(
                "Payment timeout reached; aborting",
                "timeout",
                Some(&payment_id),
                Some(&payment_url),
            ));
        }

        tracing::info!(%payment_id, tool = %self.tool.name, "payment confirmed, executing tool");
        self.tool.execute_and_cleanup(args, ctx, &payment_id).await
    }
}

impl ToolHandler for ProgressFlow {
    fn call<'a>(
        &'a self,
        args: ToolArgs,
        ctx: &'a ToolContext,
    ) -> BoxFuture<'a, Result<Value, ToolError>> {
        Box::pin(self.run(args, ctx))
    }
}
