//! Session-keyed payment state persistence.
//!
//! The state store is the core's only persistence boundary: a keyed,
//! TTL-bounded map of [`PaymentState`] with a payment-id secondary index.
//! It is what makes idempotent payment reuse, timeout recovery, and
//! at-most-one-payment-per-session possible.
//!
//! Two implementations ship with the workspace: [`InMemoryStore`] here, and
//! a Redis-backed store in the `paymcp-redis` crate.
//!
//! # Invariants
//!
//! - At most one state per session key; overwrites atomically re-index.
//! - The payment-id index and the primary map never disagree.
//! - Expired entries behave as absent and are removed on next access.

mod memory;

pub use memory::InMemoryStore;

use serde::{Deserialize, Serialize};

use crate::constants::PaymentStatus;
use crate::error::StoreError;
use crate::provider::BoxFuture;
use crate::timestamp::UnixTimestamp;
use crate::tool::ToolArgs;

/// The persisted record of an in-flight payment.
///
/// Stored when a flow creates a payment, transitioned as the flow advances,
/// and deleted after tool execution or on terminal non-paid provider states.
/// Timeouts deliberately retain it so a later invocation can recover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentState {
    /// Host-provided session key. Primary key when present.
    pub session_id: Option<String>,
    /// Provider-issued payment identifier; secondary-index key.
    pub payment_id: String,
    /// Where the end user completes the payment.
    pub payment_url: String,
    /// Which tool this state belongs to.
    pub tool_name: String,
    /// Original arguments at initiation, replayed verbatim on confirm.
    #[serde(default)]
    pub tool_args: ToolArgs,
    /// Flow-local status tracking. The provider is authoritative.
    pub status: PaymentStatus,
    /// Wall clock at insertion.
    pub created_at: UnixTimestamp,
    /// TTL anchor, refreshed by the store on every write.
    #[serde(rename = "_timestamp")]
    pub timestamp: UnixTimestamp,
}

impl PaymentState {
    /// Builds a fresh state record. Both timestamps are set to now; the
    /// store refreshes `timestamp` again on every write.
    #[must_use]
    pub fn new(
        session_id: Option<String>,
        payment_id: impl Into<String>,
        payment_url: impl Into<String>,
        tool_name: impl Into<String>,
        tool_args: ToolArgs,
        status: PaymentStatus,
    ) -> Self {
        let now = UnixTimestamp::now();
        Self {
            session_id,
            payment_id: payment_id.into(),
            payment_url: payment_url.into(),
            tool_name: tool_name.into(),
            tool_args,
            status,
            created_at: now,
            timestamp: now,
        }
    }
}

/// Keyed, TTL-bounded storage for [`PaymentState`] with a payment-id index.
///
/// The trait is dyn-compatible so backends can be swapped at coordinator
/// construction. Lookups report read failures as absence (a flow recovers
/// from a lost read by creating a new payment) while writes surface their
/// errors so callers can decide whether persistence loss matters.
pub trait StateStore: Send + Sync {
    /// Writes `state` under `key` with the store's TTL and indexes
    /// `state.payment_id → key`.
    ///
    /// Overwrites are total. If the overwritten state carried a different
    /// payment id, its index entry is removed in the same write.
    fn put<'a>(&'a self, key: &'a str, state: PaymentState)
    -> BoxFuture<'a, Result<(), StoreError>>;

    /// Returns the state under `key` if present and not expired. Expired
    /// entries are lazily deleted and reported as absent.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<PaymentState>>;

    /// O(1) lookup through the payment-id index. Absent if the index is
    /// stale or the target expired.
    fn get_by_payment_id<'a>(&'a self, payment_id: &'a str)
    -> BoxFuture<'a, Option<PaymentState>>;

    /// Removes the state and its payment-id index entry. No-op if absent.
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StoreError>>;
}
