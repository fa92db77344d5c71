//! Canonical response envelopes returned to the host runtime.
//!
//! Every wrapped tool resolves to one of four envelope shapes (success,
//! pending, canceled, error), built here so the flows never hand-assemble
//! JSON. The envelope always carries `message` and `status`; everything
//! else is attached only when it means something.
//!
//! Two-step pending envelopes additionally carry a `structured_content`
//! block (duplicated under `data` for client compatibility) so programmatic
//! callers don't have to parse the human-readable message.

use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::constants::ResponseStatus;

fn base(message: &str, status: ResponseStatus) -> Map<String, Value> {
    let mut envelope = Map::new();
    envelope.insert("message".into(), Value::String(message.to_owned()));
    envelope.insert("status".into(), Value::String(status.as_str().to_owned()));
    envelope
}

#[allow(clippy::too_many_arguments)]
fn build(
    message: &str,
    status: ResponseStatus,
    payment_id: Option<&str>,
    payment_url: Option<&str>,
    next_step: Option<&str>,
    reason: Option<&str>,
    raw: Option<Value>,
    amount: Option<&Decimal>,
    currency: Option<&str>,
) -> Value {
    let mut envelope = base(message, status);
    if let Some(payment_id) = payment_id {
        envelope.insert("payment_id".into(), Value::String(payment_id.to_owned()));
    }
    if let Some(payment_url) = payment_url {
        envelope.insert("payment_url".into(), Value::String(payment_url.to_owned()));
    }
    if let Some(next_step) = next_step {
        envelope.insert("next_step".into(), Value::String(next_step.to_owned()));
    }
    if let Some(reason) = reason {
        envelope.insert("reason".into(), Value::String(reason.to_owned()));
    }
    if let Some(raw) = raw {
        envelope.insert("raw".into(), raw);
    }

    // Two-step responses carry machine-readable payment details alongside
    // the prose. Kept under both keys for client compatibility.
    if let (Some(next_step), Some(payment_url)) = (next_step, payment_url) {
        let mut structured = Map::new();
        structured.insert("payment_url".into(), Value::String(payment_url.to_owned()));
        structured.insert(
            "payment_id".into(),
            payment_id.map_or(Value::Null, |id| Value::String(id.to_owned())),
        );
        structured.insert("next_step".into(), Value::String(next_step.to_owned()));
        let structured_status = if status == ResponseStatus::Pending {
            "payment_required".to_owned()
        } else {
            format!("payment_{status}")
        };
        structured.insert("status".into(), Value::String(structured_status));
        if let Some(amount) = amount {
            structured.insert(
                "amount".into(),
                serde_json::to_value(amount).unwrap_or(Value::Null),
            );
        }
        if let Some(currency) = currency {
            structured.insert("currency".into(), Value::String(currency.to_owned()));
        }
        let structured = Value::Object(structured);
        envelope.insert("structured_content".into(), structured.clone());
        envelope.insert("data".into(), structured);
    }

    Value::Object(envelope)
}

/// Builds an error envelope with a machine-readable `reason`.
pub fn error_response(
    message: &str,
    reason: &str,
    payment_id: Option<&str>,
    payment_url: Option<&str>,
) -> Value {
    build(
        message,
        ResponseStatus::Error,
        payment_id,
        payment_url,
        None,
        Some(reason),
        None,
        None,
        None,
    )
}

/// Builds a pending envelope: payment initiated, completion outstanding.
pub fn pending_response(
    message: &str,
    payment_id: &str,
    payment_url: &str,
    next_step: Option<&str>,
    amount: Option<&Decimal>,
    currency: Option<&str>,
) -> Value {
    build(
        message,
        ResponseStatus::Pending,
        Some(payment_id),
        Some(payment_url),
        next_step,
        None,
        None,
        amount,
        currency,
    )
}

/// Builds a canceled envelope. The tool did not run.
pub fn canceled_response(
    message: &str,
    payment_id: Option<&str>,
    payment_url: Option<&str>,
) -> Value {
    build(
        message,
        ResponseStatus::Canceled,
        payment_id,
        payment_url,
        None,
        None,
        None,
        None,
        None,
    )
}

/// Wraps a tool result in a success envelope.
///
/// Idempotent over structured results: when the tool already returned an
/// object, it is annotated with `payment_id` and a default
/// `status: "success"` without overwriting anything the tool set. Raw
/// results go under `raw` in a fresh envelope.
pub fn success_response(tool_result: Value, payment_id: Option<&str>) -> Value {
    if let Value::Object(mut object) = tool_result {
        if let Some(payment_id) = payment_id {
            object
                .entry("payment_id")
                .or_insert_with(|| Value::String(payment_id.to_owned()));
        }
        object
            .entry("status")
            .or_insert_with(|| Value::String(ResponseStatus::Success.as_str().to_owned()));
        return Value::Object(object);
    }

    build(
        "Tool completed after payment",
        ResponseStatus::Success,
        payment_id,
        None,
        None,
        None,
        Some(tool_result),
        None,
        None,
    )
}
