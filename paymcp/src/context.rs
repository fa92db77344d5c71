//! Per-invocation context and the capabilities it carries.
//!
//! The host runtime builds a [`ToolContext`] for each tool call. The
//! middleware reads it, and never mutates it, to discover the session key and
//! the client's optional capabilities: interactive elicitation, progress
//! notifications, webview pop-out, and an abort signal.
//!
//! Hosts differ in where they put the session identifier, so
//! [`ToolContext::session_key`] probes several locations in a fixed order
//! and falls back to the request id when nothing else is available.

use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::provider::BoxFuture;

/// The user's answer to an elicitation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElicitAction {
    /// The user confirmed (e.g. "I have paid").
    Accept,
    /// The user declined the prompt.
    Decline,
    /// The user canceled the operation.
    Cancel,
}

/// Errors from the elicitation capability that are not user actions.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ElicitError {
    /// The prompt could not be delivered or answered.
    #[error("elicitation transport failure: {0}")]
    Transport(String),

    /// The host reported an action outside the tagged vocabulary. Some
    /// clients encode user gestures this way instead of returning them.
    #[error("unexpected elicitation action: {0}")]
    UnexpectedAction(String),
}

impl ElicitError {
    /// Legacy shim: recovers a user action from an error message for hosts
    /// that throw instead of returning tagged actions.
    ///
    /// A message naming `cancel` or `decline` maps to [`ElicitAction::Cancel`];
    /// one naming `accept` maps to [`ElicitAction::Accept`]. Anything else is
    /// a genuine failure and yields `None`.
    #[must_use]
    pub fn action_hint(&self) -> Option<ElicitAction> {
        let message = self.to_string().to_ascii_lowercase();
        if message.contains("cancel") || message.contains("decline") {
            Some(ElicitAction::Cancel)
        } else if message.contains("accept") {
            Some(ElicitAction::Accept)
        } else {
            None
        }
    }
}

/// Interactive prompt capability: presents a message to the end user and
/// resolves to their action.
pub trait Elicitation: Send + Sync {
    /// Presents `message` and waits for the user's answer.
    fn elicit<'a>(&'a self, message: &'a str)
    -> BoxFuture<'a, Result<ElicitAction, ElicitError>>;
}

/// Progress notification capability: pushes partial-status updates to the
/// caller while a call is held open.
pub trait ProgressReporter: Send + Sync {
    /// Reports progress as a percentage in `0..=100` with a status message.
    fn report<'a>(&'a self, message: &'a str, progress: u8) -> BoxFuture<'a, ()>;
}

/// Webview pop-out capability. Purely cosmetic: when a payment window opens
/// automatically, the user prompt changes wording, nothing else.
pub trait WebviewLauncher: Send + Sync {
    /// Attempts to open `url` in a client-side payment window. Returns
    /// `true` if a window was opened.
    fn open(&self, url: &str) -> bool;
}

/// Nested session object, for hosts that expose the session as a struct
/// rather than a flat id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    /// The session's `id` field.
    pub id: Option<String>,
    /// The session's `session_id` field.
    pub session_id: Option<String>,
}

/// A resolved session key.
///
/// `persistent` is `false` when the key was derived from the request id;
/// such keys change on every retry, so recovery across retries is
/// effectively disabled for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKey {
    /// The store key for this session.
    pub key: String,
    /// Whether the key is stable across client retries.
    pub persistent: bool,
}

/// Read-only per-invocation context handed to wrapped tools.
///
/// Built by the host runtime (or a binding shim) for every call. All fields
/// are optional; the flows degrade gracefully when a capability is missing,
/// except elicitation, which the elicitation flow requires outright.
#[derive(Clone, Default)]
pub struct ToolContext {
    session_id: Option<String>,
    session: Option<SessionInfo>,
    meta: Option<serde_json::Map<String, serde_json::Value>>,
    request_id: Option<String>,
    elicitation: Option<Arc<dyn Elicitation>>,
    progress: Option<Arc<dyn ProgressReporter>>,
    webview: Option<Arc<dyn WebviewLauncher>>,
    cancellation: Option<CancellationToken>,
}

impl Debug for ToolContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("session_id", &self.session_id)
            .field("session", &self.session)
            .field("request_id", &self.request_id)
            .field("elicitation", &self.elicitation.as_ref().map(|_| "<dyn Elicitation>"))
            .field("progress", &self.progress.as_ref().map(|_| "<dyn ProgressReporter>"))
            .field("webview", &self.webview.as_ref().map(|_| "<dyn WebviewLauncher>"))
            .finish_non_exhaustive()
    }
}

impl ToolContext {
    /// Creates an empty context with no session and no capabilities.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flat session id.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Sets the nested session object.
    #[must_use]
    pub fn with_session(mut self, session: SessionInfo) -> Self {
        self.session = Some(session);
        self
    }

    /// Sets the request metadata map.
    #[must_use]
    pub fn with_meta(mut self, meta: serde_json::Map<String, serde_json::Value>) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Sets the request id, used as a last-resort session key.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Attaches the elicitation capability.
    #[must_use]
    pub fn with_elicitation(mut self, elicitation: Arc<dyn Elicitation>) -> Self {
        self.elicitation = Some(elicitation);
        self
    }

    /// Attaches the progress notification capability.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Attaches the webview pop-out capability.
    #[must_use]
    pub fn with_webview(mut self, webview: Arc<dyn WebviewLauncher>) -> Self {
        self.webview = Some(webview);
        self
    }

    /// Attaches the client abort signal.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Resolves the session key, probing in order: the flat `session_id`,
    /// the nested session's `id` then `session_id`, `meta["session_id"]`,
    /// and finally `req_<request_id>` (non-persistent).
    #[must_use]
    pub fn session_key(&self) -> Option<SessionKey> {
        if let Some(id) = &self.session_id {
            return Some(SessionKey {
                key: id.clone(),
                persistent: true,
            });
        }
        if let Some(session) = &self.session {
            if let Some(id) = &session.id {
                return Some(SessionKey {
                    key: id.clone(),
                    persistent: true,
                });
            }
            if let Some(id) = &session.session_id {
                return Some(SessionKey {
                    key: id.clone(),
                    persistent: true,
                });
            }
        }
        if let Some(id) = self
            .meta
            .as_ref()
            .and_then(|meta| meta.get("session_id"))
            .and_then(|value| value.as_str())
        {
            return Some(SessionKey {
                key: id.to_owned(),
                persistent: true,
            });
        }
        if let Some(request_id) = &self.request_id {
            tracing::debug!(request_id, "using request id as session key");
            return Some(SessionKey {
                key: format!("req_{request_id}"),
                persistent: false,
            });
        }
        tracing::debug!("no session key found in context");
        None
    }

    /// The elicitation capability, if the client provides one.
    #[must_use]
    pub fn elicitation(&self) -> Option<&Arc<dyn Elicitation>> {
        self.elicitation.as_ref()
    }

    /// The progress capability, if the client provides one.
    #[must_use]
    pub fn progress(&self) -> Option<&Arc<dyn ProgressReporter>> {
        self.progress.as_ref()
    }

    /// Returns `true` if the client has canceled the request.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Tries to pop a payment window; returns `true` if one opened.
    #[must_use]
    pub fn open_webview(&self, url: &str) -> bool {
        self.webview.as_ref().is_some_and(|w| w.open(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_prefers_flat_id() {
        let ctx = ToolContext::new()
            .with_session_id("flat")
            .with_session(SessionInfo {
                id: Some("nested".into()),
                session_id: None,
            })
            .with_request_id("r1");
        let key = ctx.session_key().unwrap();
        assert_eq!(key.key, "flat");
        assert!(key.persistent);
    }

    #[test]
    fn test_session_key_nested_probing_order() {
        let ctx = ToolContext::new().with_session(SessionInfo {
            id: Some("by-id".into()),
            session_id: Some("by-session-id".into()),
        });
        assert_eq!(ctx.session_key().unwrap().key, "by-id");

        let ctx = ToolContext::new().with_session(SessionInfo {
            id: None,
            session_id: Some("by-session-id".into()),
        });
        assert_eq!(ctx.session_key().unwrap().key, "by-session-id");
    }

    #[test]
    fn test_session_key_from_meta() {
        let mut meta = serde_json::Map::new();
        meta.insert("session_id".into(), serde_json::json!("meta-session"));
        let ctx = ToolContext::new().with_meta(meta);
        assert_eq!(ctx.session_key().unwrap().key, "meta-session");
    }

    #[test]
    fn test_session_key_request_id_fallback_is_non_persistent() {
        let ctx = ToolContext::new().with_request_id("abc123");
        let key = ctx.session_key().unwrap();
        assert_eq!(key.key, "req_abc123");
        assert!(!key.persistent);
    }

    #[test]
    fn test_session_key_absent() {
        assert!(ToolContext::new().session_key().is_none());
    }

    #[test]
    fn test_abort_signal() {
        let token = CancellationToken::new();
        let ctx = ToolContext::new().with_cancellation(token.clone());
        assert!(!ctx.is_aborted());
        token.cancel();
        assert!(ctx.is_aborted());
        assert!(!ToolContext::new().is_aborted());
    }

    #[test]
    fn test_action_hint_parsing() {
        let hint = |msg: &str| ElicitError::UnexpectedAction(msg.into()).action_hint();
        assert_eq!(hint("user chose to Cancel"), Some(ElicitAction::Cancel));
        assert_eq!(hint("declined by user"), Some(ElicitAction::Cancel));
        assert_eq!(hint("action was accept"), Some(ElicitAction::Accept));
        assert_eq!(hint("socket closed"), None);
        assert_eq!(
            ElicitError::Transport("connection reset".into()).action_hint(),
            None
        );
    }
}
