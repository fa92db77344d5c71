//! Shared doubles for the in-crate test suites.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use serde_json::Value;

use crate::constants::PaymentStatus;
use crate::context::{ElicitAction, ElicitError, Elicitation, ProgressReporter, ToolContext};
use crate::error::{ProviderError, RegistrationError};
use crate::flow::{FlowTuning, PaidTool};
use crate::price::PriceInfo;
use crate::provider::{BoxFuture, CreatePayment, CreatedPayment, Provider};
use crate::store::{InMemoryStore, StateStore};
use crate::tool::{ToolArgs, ToolError, ToolHandler, ToolRegistration, ToolRuntime};

/// Builds a [`PaidTool`] over a fresh in-memory store with default tuning.
pub(crate) fn paid_tool(
    name: &str,
    provider: Arc<MockProvider>,
    handler: Arc<RecordingHandler>,
) -> Arc<PaidTool> {
    paid_tool_with(
        name,
        provider,
        handler,
        Arc::new(InMemoryStore::new()),
        FlowTuning::default(),
    )
}

/// [`paid_tool`] with an explicit store and tuning.
pub(crate) fn paid_tool_with(
    name: &str,
    provider: Arc<MockProvider>,
    handler: Arc<RecordingHandler>,
    store: Arc<dyn StateStore>,
    tuning: FlowTuning,
) -> Arc<PaidTool> {
    Arc::new(PaidTool {
        name: name.to_owned(),
        handler,
        price: PriceInfo::new(Decimal::new(19, 2), "USD"),
        provider,
        store,
        tuning,
    })
}

/// Scriptable in-memory payment provider.
#[derive(Debug)]
pub(crate) struct MockProvider {
    name: String,
    statuses: Mutex<HashMap<String, PaymentStatus>>,
    /// pid → (remaining pending polls, status to flip to).
    scripted: Mutex<HashMap<String, (usize, PaymentStatus)>>,
    fail_status: AtomicBool,
    fail_create: AtomicBool,
    created: AtomicUsize,
    status_checks: AtomicUsize,
}

impl MockProvider {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            statuses: Mutex::new(HashMap::new()),
            scripted: Mutex::new(HashMap::new()),
            fail_status: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            created: AtomicUsize::new(0),
            status_checks: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_status(&self, payment_id: &str, status: PaymentStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(payment_id.to_owned(), status);
    }

    /// After `polls` pending status checks for `payment_id`, report paid.
    pub(crate) fn paid_after(&self, payment_id: &str, polls: usize) {
        self.status_after(payment_id, polls, PaymentStatus::Paid);
    }

    /// After `polls` pending status checks for `payment_id`, report `status`.
    pub(crate) fn status_after(&self, payment_id: &str, polls: usize, status: PaymentStatus) {
        self.scripted
            .lock()
            .unwrap()
            .insert(payment_id.to_owned(), (polls, status));
    }

    pub(crate) fn fail_status_checks(&self) {
        self.fail_status.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_creates(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub(crate) fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub(crate) fn status_check_count(&self) -> usize {
        self.status_checks.load(Ordering::SeqCst)
    }
}

impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_payment(
        &self,
        _request: CreatePayment,
    ) -> BoxFuture<'_, Result<CreatedPayment, ProviderError>> {
        let result = if self.fail_create.load(Ordering::SeqCst) {
            Err(ProviderError::Transport {
                context: "create payment",
                source: "connection refused".into(),
            })
        } else {
            let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            let payment_id = format!("PID{n}");
            self.set_status(&payment_id, PaymentStatus::Pending);
            CreatedPayment::new(payment_id.clone(), &format!("https://pay/{payment_id}"))
        };
        Box::pin(std::future::ready(result))
    }

    fn get_payment_status<'a>(
        &'a self,
        payment_id: &'a str,
    ) -> BoxFuture<'a, Result<PaymentStatus, ProviderError>> {
        self.status_checks.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail_status.load(Ordering::SeqCst) {
            Err(ProviderError::Transport {
                context: "payment status",
                source: "connection refused".into(),
            })
        } else {
            let mut scripted = self.scripted.lock().unwrap();
            if let Some((remaining, status)) = scripted.get_mut(payment_id) {
                if *remaining == 0 {
                    let status = *status;
                    scripted.remove(payment_id);
                    self.set_status(payment_id, status);
                } else {
                    *remaining -= 1;
                }
            }
            drop(scripted);
            Ok(self
                .statuses
                .lock()
                .unwrap()
                .get(payment_id)
                .copied()
                .unwrap_or(PaymentStatus::Pending))
        };
        Box::pin(std::future::ready(result))
    }
}

/// Tool handler that records every invocation's arguments.
pub(crate) struct RecordingHandler {
    calls: Mutex<Vec<ToolArgs>>,
    result: Value,
    fail: AtomicBool,
}

impl RecordingHandler {
    pub(crate) fn new(result: Value) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            result,
            fail: AtomicBool::new(false),
        }
    }

    pub(crate) fn failing() -> Self {
        let handler = Self::new(Value::Null);
        handler.fail.store(true, Ordering::SeqCst);
        handler
    }

    pub(crate) fn calls(&self) -> Vec<ToolArgs> {
        self.calls.lock().unwrap().clone()
    }
}

impl ToolHandler for RecordingHandler {
    fn call<'a>(
        &'a self,
        args: ToolArgs,
        _ctx: &'a ToolContext,
    ) -> BoxFuture<'a, Result<Value, ToolError>> {
        self.calls.lock().unwrap().push(args);
        let result = if self.fail.load(Ordering::SeqCst) {
            Err("tool exploded".into())
        } else {
            Ok(self.result.clone())
        };
        Box::pin(std::future::ready(result))
    }
}

/// Minimal host runtime: a name → registration map plus a dispatcher.
#[derive(Default)]
pub(crate) struct MockRuntime {
    pub(crate) tools: HashMap<String, ToolRegistration>,
}

impl MockRuntime {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn description_of(&self, name: &str) -> &str {
        &self.tools.get(name).unwrap().description
    }

    pub(crate) async fn call(
        &self,
        name: &str,
        args: ToolArgs,
        ctx: &ToolContext,
    ) -> Result<Value, ToolError> {
        let registration = self
            .tools
            .get(name)
            .unwrap_or_else(|| panic!("tool not registered: {name}"));
        registration.handler.call(args, ctx).await
    }
}

impl ToolRuntime for MockRuntime {
    fn register_tool(&mut self, registration: ToolRegistration) -> Result<(), RegistrationError> {
        if self.tools.contains_key(&registration.name) {
            return Err(RegistrationError::Runtime(
                format!("duplicate tool name: {}", registration.name).into(),
            ));
        }
        self.tools.insert(registration.name.clone(), registration);
        Ok(())
    }
}

/// Elicitation capability that replays a scripted sequence of outcomes.
pub(crate) struct ScriptedElicit {
    script: Mutex<Vec<Result<ElicitAction, ElicitError>>>,
    prompts: AtomicUsize,
}

impl ScriptedElicit {
    /// The script is consumed front to back; when it runs dry, the last
    /// behavior repeats as `Accept`.
    pub(crate) fn new(script: Vec<Result<ElicitAction, ElicitError>>) -> Self {
        Self {
            script: Mutex::new(script),
            prompts: AtomicUsize::new(0),
        }
    }

    pub(crate) fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

impl Elicitation for ScriptedElicit {
    fn elicit<'a>(
        &'a self,
        _message: &'a str,
    ) -> BoxFuture<'a, Result<ElicitAction, ElicitError>> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        let next = if script.is_empty() {
            Ok(ElicitAction::Accept)
        } else {
            script.remove(0)
        };
        drop(script);
        Box::pin(std::future::ready(next))
    }
}

/// Progress reporter that records every notification.
#[derive(Default)]
pub(crate) struct RecordingProgress {
    updates: Mutex<Vec<(String, u8)>>,
}

impl RecordingProgress {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn updates(&self) -> Vec<(String, u8)> {
        self.updates.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report<'a>(&'a self, message: &'a str, progress: u8) -> BoxFuture<'a, ()> {
        self.updates
            .lock()
            .unwrap()
            .push((message.to_owned(), progress));
        Box::pin(std::future::ready(()))
    }
}
