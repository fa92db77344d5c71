//! Idempotency and recovery primitives over the state store.
//!
//! Every flow runs [`check_existing_payment`] before touching the provider:
//! it is what prevents duplicate payments for a session and what lets a
//! flow that timed out finish its work on the next invocation. The
//! companion helpers persist, advance, and discard state.
//!
//! All helpers no-op without a session key. Store write failures are logged
//! and swallowed; persistence is recovery infrastructure, and an in-flight
//! payment must not fail because a best-effort write did.

use std::sync::Arc;

use crate::constants::PaymentStatus;
use crate::context::SessionKey;
use crate::provider::Provider;
use crate::store::{PaymentState, StateStore};
use crate::tool::ToolArgs;

/// Outcome of probing the store for a prior payment on this session.
#[derive(Debug, Clone, PartialEq)]
pub enum ExistingPayment {
    /// No usable prior payment; create a fresh one.
    None,
    /// A payment is still in progress; reuse its id and URL instead of
    /// creating a duplicate.
    Pending {
        /// The prior payment's id.
        payment_id: String,
        /// The prior payment's checkout URL.
        payment_url: String,
    },
    /// The prior payment completed (possibly after a timeout); execute the
    /// tool immediately. State has already been deleted.
    Settled {
        /// The settled payment's id.
        payment_id: String,
        /// The originally stored arguments, present only when the stored
        /// state belongs to the same tool. They win over the current call's
        /// arguments on replay.
        stored_args: Option<ToolArgs>,
    },
}

/// Checks for existing payment state and decides how to proceed.
///
/// The provider is the source of truth: whatever status the store recorded,
/// the decision is made on a live status query.
///
/// - `paid` → delete state, return [`ExistingPayment::Settled`] with the
///   stored arguments iff the state belongs to `tool_name`.
/// - `pending`/`processing` → return [`ExistingPayment::Pending`]; the
///   caller reuses the payment.
/// - terminal non-paid → delete state, return [`ExistingPayment::None`].
/// - provider unreachable → delete state (fail-safe against stuck
///   sessions), return [`ExistingPayment::None`].
pub async fn check_existing_payment(
    session: Option<&SessionKey>,
    store: &Arc<dyn StateStore>,
    provider: &dyn Provider,
    tool_name: &str,
) -> ExistingPayment {
    let Some(session) = session else {
        return ExistingPayment::None;
    };
    let Some(state) = store.get(&session.key).await else {
        return ExistingPayment::None;
    };

    tracing::info!(
        session = %session.key,
        payment_id = %state.payment_id,
        "found existing payment state"
    );

    let status = match provider.get_payment_status(&state.payment_id).await {
        Ok(status) => status,
        Err(err) => {
            // Fail-safe: drop the state rather than wedge the session. The
            // worst case is a duplicate payment, which the provider's own
            // idempotency layer deduplicates.
            tracing::error!(error = %err, "payment status check failed, discarding state");
            delete_logged(store, &session.key).await;
            return ExistingPayment::None;
        }
    };
    tracing::info!(payment_id = %state.payment_id, %status, "existing payment status");

    if status == PaymentStatus::Paid {
        delete_logged(store, &session.key).await;
        let stored_args = (state.tool_name == tool_name).then_some(state.tool_args);
        return ExistingPayment::Settled {
            payment_id: state.payment_id,
            stored_args,
        };
    }
    if status.is_pending_like() {
        return ExistingPayment::Pending {
            payment_id: state.payment_id,
            payment_url: state.payment_url,
        };
    }
    // canceled / expired / failed
    tracing::info!(%status, "previous payment ended, a new one will be created");
    delete_logged(store, &session.key).await;
    ExistingPayment::None
}

/// Persists payment state for recovery, keyed by the session.
///
/// Overwrites any prior state for the session: at most one in-flight
/// payment per session. The arguments are cloned in, so later mutations of
/// the live call's arguments never leak into the store.
pub async fn save_payment_state(
    session: Option<&SessionKey>,
    store: &Arc<dyn StateStore>,
    payment_id: &str,
    payment_url: &str,
    tool_name: &str,
    tool_args: &ToolArgs,
    status: PaymentStatus,
) {
    let Some(session) = session else { return };

    let state = PaymentState::new(
        Some(session.key.clone()),
        payment_id,
        payment_url,
        tool_name,
        tool_args.clone(),
        status,
    );
    if let Err(err) = store.put(&session.key, state).await {
        tracing::warn!(session = %session.key, error = %err, "failed to persist payment state");
    }
}

/// Advances the status of the stored state, preserving everything else.
/// No-op when the entry is absent.
pub async fn update_payment_status(
    session: Option<&SessionKey>,
    store: &Arc<dyn StateStore>,
    status: PaymentStatus,
) {
    let Some(session) = session else { return };
    let Some(mut state) = store.get(&session.key).await else {
        tracing::warn!(session = %session.key, "no payment state to update");
        return;
    };
    state.status = status;
    if let Err(err) = store.put(&session.key, state).await {
        tracing::warn!(session = %session.key, error = %err, "failed to update payment status");
    }
}

/// Unconditionally discards the session's payment state.
///
/// Called after successful execution, on explicit cancel, and on terminal
/// non-paid provider states, never on timeout, where the state is the
/// recovery path.
pub async fn cleanup_payment_state(session: Option<&SessionKey>, store: &Arc<dyn StateStore>) {
    if let Some(session) = session {
        delete_logged(store, &session.key).await;
    }
}

async fn delete_logged(store: &Arc<dyn StateStore>, key: &str) {
    if let Err(err) = store.delete(key).await {
        tracing::warn!(key, error = %err, "failed to delete payment state");
    }
}
