//! Elicitation flow: interactive payment confirmation inside one call.
//!
//! The wrapper prompts the user through the context's elicitation
//! capability, checking the provider after each round. A user cancel ends
//! the flow with a canceled envelope; exhausting the prompt budget returns
//! a pending envelope whose `next_step` points back at the tool itself, so
//! the client can simply retry. Transport-level elicitation failures are
//! fatal: state is marked `timeout` and preserved, and the error reaches
//! the host.
//!
//! This flow requires elicitation support on the context. There is no
//! silent downgrade: a context without it gets a loud error before any
//! provider call is made.

use std::sync::Arc;

use serde_json::Value;

use crate::constants::{FlowType, PaymentStatus};
use crate::context::{ElicitAction, Elicitation, SessionKey, ToolContext};
use crate::error::PayMcpError;
use crate::provider::BoxFuture;
use crate::response::{canceled_response, pending_response};
use crate::state::{cleanup_payment_state, update_payment_status};
use crate::tool::{ToolArgs, ToolError, ToolHandler};

use super::{PaidTool, Prepared, provider_error_response};

/// The interactive wrapper registered under the original tool name.
pub(crate) struct ElicitationFlow {
    pub(crate) tool: Arc<PaidTool>,
}

/// What one elicitation round decided.
enum Round {
    /// Keep prompting; the user confirmed but payment is not visible yet.
    Continue,
    /// Finish with this envelope.
    Done(Value),
    /// Run the tool; payment confirmed.
    Paid,
}

impl ElicitationFlow {
    async fn round(
        &self,
        elicit: &Arc<dyn Elicitation>,
        session: Option<&SessionKey>,
        payment_id: &str,
        payment_url: &str,
        prompt: &str,
    ) -> Result<Round, ToolError> {
        let action = match elicit.elicit(prompt).await {
            Ok(action) => action,
            Err(err) => match err.action_hint() {
                Some(action) => {
                    tracing::debug!(?action, "recovered user action from elicitation error");
                    action
                }
                None => {
                    // A genuine failure, not a user gesture. Keep the state:
                    // the payment may still complete out of band.
                    tracing::warn!(error = %err, "elicitation failed");
                    update_payment_status(session, &self.tool.store, PaymentStatus::Timeout).await;
                    return Err(Box::new(PayMcpError::Elicit(err)));
                }
            },
        };

        if matches!(action, ElicitAction::Cancel | ElicitAction::Decline) {
            tracing::info!(%payment_id, "payment canceled by user");
            cleanup_payment_state(session, &self.tool.store).await;
            return Ok(Round::Done(canceled_response(
                "Payment canceled by user",
                Some(payment_id),
                Some(payment_url),
            )));
        }

        // The user says they paid; the provider decides.
        let status = match self.tool.provider.get_payment_status(payment_id).await {
            Ok(status) => status,
            Err(err) => {
                tracing::error!(%payment_id, error = %err, "payment status check failed");
                cleanup_payment_state(session, &self.tool.store).await;
                return Ok(Round::Done(provider_error_response(&err, Some(payment_id))));
            }
        };
        tracing::debug!(%payment_id, %status, "elicitation round status");

        match status {
            PaymentStatus::Paid => Ok(Round::Paid),
            PaymentStatus::Canceled => {
                cleanup_payment_state(session, &self.tool.store).await;
                Ok(Round::Done(canceled_response(
                    "Payment canceled",
                    Some(payment_id),
                    Some(payment_url),
                )))
            }
            // Still in flight; the user may be finishing the payment in
            // another window.
            _ => Ok(Round::Continue),
        }
    }

    async fn run(&self, args: ToolArgs, ctx: &ToolContext) -> Result<Value, ToolError> {
        let Some(elicit) = ctx.elicitation().cloned() else {
            return Err(Box::new(PayMcpError::ElicitationUnsupported));
        };
        let session = ctx.session_key();

        let prepared = match self.tool.prepare(&args, ctx, FlowType::Elicitation).await {
            Ok(prepared) => prepared,
            Err(err) => {
                tracing::error!(tool = %self.tool.name, error = %err, "payment initiation failed");
                cleanup_payment_state(session.as_ref(), &self.tool.store).await;
                return Ok(provider_error_response(&err, None));
            }
        };

        let (payment_id, payment_url, prompt) = match prepared {
            Prepared::Execute { payment_id, args } => {
                tracing::info!(tool = %self.tool.name, "payment already completed, executing tool");
                return self.tool.execute_and_cleanup(args, ctx, &payment_id).await;
            }
            Prepared::Gated {
                payment_id,
                payment_url,
                prompt,
                ..
            } => (payment_id, payment_url, prompt),
        };

        for attempt in 0..self.tool.tuning.elicit_attempts {
            tracing::debug!(%payment_id, attempt, "elicitation attempt");
            match self
                .round(&elicit, session.as_ref(), &payment_id, &payment_url, &prompt)
                .await?
            {
                Round::Continue => {}
                Round::Done(envelope) => return Ok(envelope),
                Round::Paid => {
                    update_payment_status(session.as_ref(), &self.tool.store, PaymentStatus::Paid)
                        .await;
                    tracing::info!(
                        %payment_id,
                        tool = %self.tool.name,
                        "payment confirmed, executing tool"
                    );
                    return self.tool.execute_and_cleanup(args, ctx, &payment_id).await;
                }
            }
        }

        // Prompt budget exhausted without a terminal status. Keep the state
        // and hand the client a retry handle: calling this same tool again
        // resumes the payment.
        tracing::info!(%payment_id, "payment not received after elicitation attempts");
        update_payment_status(session.as_ref(), &self.tool.store, PaymentStatus::Pending).await;
        Ok(pending_response(
            "We haven't received the payment yet. Click the button below to check again.",
            &payment_id,
            &payment_url,
            Some(&self.tool.name),
            Some(&self.tool.price.price),
            Some(&self.tool.price.currency),
        ))
    }
}

impl ToolHandler for ElicitationFlow {
    fn call<'a>(
        &'a self,
        args: ToolArgs,
        ctx: &'a ToolContext,
    ) -> BoxFuture<'a, Result<Value, ToolError>> {
        Box::pin(self.run(args, ctx))
    }
}
