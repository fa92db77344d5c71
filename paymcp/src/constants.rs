//! Status vocabulary and timing defaults shared across flows and providers.
//!
//! All payment state transitions and flow decisions are expressed in terms of
//! the closed enums defined here. Providers map their own wire vocabulary
//! into [`PaymentStatus`] via [`PaymentStatus::from_provider`]; everything
//! downstream (state helpers, flows, response builders) matches on the enum.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How often a progress flow polls the provider for payment status.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// How long a progress flow waits for payment completion before giving up.
///
/// Generous enough for slow payment methods; after this bound the payment may
/// still complete on the provider side, and retained state allows recovery.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(15 * 60);

/// How many elicitation rounds an elicitation flow runs before returning
/// a retryable pending response.
pub const DEFAULT_ELICIT_ATTEMPTS: u32 = 5;

/// How long payment state survives in a store before it ages out.
///
/// Longer than [`DEFAULT_MAX_WAIT`] so a timed-out flow can still be
/// recovered on the next invocation.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(30 * 60);

/// Minimum interval between opportunistic expiry sweeps of the in-process
/// store. Sweeping is piggybacked on normal operations; there is no
/// background task.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Status of a payment, as tracked in stored state and reported by providers.
///
/// Providers report the subset `{paid, pending, processing, canceled,
/// expired, failed}`; the remaining variants are flow-local bookkeeping.
/// The provider is authoritative for payment truth; stored status is only
/// tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Initial state, set immediately after the provider issues a payment id.
    Requested,
    /// Payment URL shown to the user; completion not yet observed.
    Pending,
    /// Provider-side processing in progress. Treated as pending everywhere.
    Processing,
    /// Payment verified complete.
    Paid,
    /// Canceled by the user or the provider.
    Canceled,
    /// The provider gave up waiting for completion.
    Expired,
    /// The payment failed on the provider side.
    Failed,
    /// A flow exhausted its waiting budget. State is retained for recovery.
    Timeout,
}

impl PaymentStatus {
    /// Maps a raw provider status string into the closed vocabulary.
    ///
    /// Unknown strings are conservatively reported as [`Self::Pending`] and
    /// logged, so a provider introducing a new state never triggers tool
    /// execution or state deletion.
    #[must_use]
    pub fn from_provider(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "paid" => Self::Paid,
            "pending" => Self::Pending,
            "processing" => Self::Processing,
            "canceled" | "cancelled" => Self::Canceled,
            "expired" => Self::Expired,
            "failed" => Self::Failed,
            other => {
                tracing::warn!(status = other, "unrecognized provider status, treating as pending");
                Self::Pending
            }
        }
    }

    /// Returns `true` for statuses that mean "keep waiting".
    ///
    /// `processing` and `pending` are equivalent for every decision the
    /// flows make.
    #[must_use]
    pub const fn is_pending_like(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing | Self::Requested)
    }

    /// Returns `true` for provider-terminal states that are not `paid`.
    #[must_use]
    pub const fn is_terminal_failure(&self) -> bool {
        matches!(self, Self::Canceled | Self::Expired | Self::Failed)
    }

    /// Canonical lowercase string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Paid => "paid",
            Self::Canceled => "canceled",
            Self::Expired => "expired",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a response envelope returned to the host runtime.
///
/// Clients distinguish terminal (`success`, `canceled`, `error`) from
/// non-terminal (`pending`) responses by this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// The underlying tool ran after payment; its result is attached.
    Success,
    /// Payment is required or still in progress; the caller should follow up.
    Pending,
    /// The payment was canceled; the tool did not run.
    Canceled,
    /// Something went wrong; see `reason`.
    Error,
}

impl ResponseStatus {
    /// Canonical lowercase string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Pending => "pending",
            Self::Canceled => "canceled",
            Self::Error => "error",
        }
    }
}

impl Display for ResponseStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The payment-completion protocol applied to every priced tool under a
/// coordinator.
///
/// Chosen once at coordinator construction. Each variant is a separate
/// implementation optimized for a specific client capability instead of one
/// unified flow with branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    /// Separate initiate and confirm calls; the initiate call never blocks.
    TwoStep,
    /// A single call held open, reporting progress while polling.
    Progress,
    /// A single call driven by interactive elicitation prompts.
    Elicitation,
}

impl FlowType {
    /// Short label used in payment descriptions and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TwoStep => "two_step",
            Self::Progress => "progress",
            Self::Elicitation => "elicitation",
        }
    }
}

impl Display for FlowType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "two_step" => Ok(Self::TwoStep),
            "progress" => Ok(Self::Progress),
            "elicitation" => Ok(Self::Elicitation),
            other => Err(format!("unknown flow type: {other}")),
        }
    }
}
