//! Message transport abstraction.
//!
//! This module defines the `MessageTransport` trait the dispatcher sends through,
//! keeping delivery (SMTP, a provider API, an in-memory mock) swappable and the batching
//! logic testable without a network.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{DispatchError, Result};
use crate::request::Recipient;

pub mod mock;
pub mod smtp;

pub use mock::{MockCall, MockTransport};
pub use smtp::{SmtpConfig, SmtpTransport};

/// Shared handle to a transport, injected into the dispatcher.
pub type TransportPtr = Arc<dyn MessageTransport>;

/// The message delivered to every recipient of one dispatch.
///
/// Both bodies carry identical content; the HTML variant only differs in how line
/// breaks are encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl OutgoingMessage {
    /// Build a message from a plain-text body.
    pub fn from_body(subject: impl Into<String>, body: impl Into<String>) -> Self {
        let text = body.into();
        let html = text.replace('\n', "<br>");
        Self {
            subject: subject.into(),
            text,
            html,
        }
    }
}

/// Trait for delivering one message to one recipient.
///
/// Implementations are shared across concurrent sends and must not keep per-dispatch
/// state.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Check that the transport is usable (reachable, credentials accepted).
    ///
    /// Called once per dispatch before any batch runs. An error here aborts the whole
    /// dispatch instead of failing every recipient individually.
    async fn verify(&self) -> Result<()> {
        Ok(())
    }

    /// Attempt delivery of `message` to `to`.
    ///
    /// # Errors
    /// Returns an error if this recipient could not be delivered to. The error is
    /// recorded against the recipient and never aborts the dispatch.
    async fn send(&self, message: &OutgoingMessage, to: &Recipient) -> Result<()>;
}

/// Stand-in for a transport that could not be constructed.
///
/// Keeps the service running so each dispatch reports the construction failure to the
/// caller instead of the process exiting at startup.
#[derive(Debug, Clone)]
pub struct UnavailableTransport {
    reason: String,
}

impl UnavailableTransport {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[async_trait]
impl MessageTransport for UnavailableTransport {
    async fn verify(&self) -> Result<()> {
        Err(DispatchError::TransportUnavailable(self.reason.clone()))
    }

    async fn send(&self, _message: &OutgoingMessage, _to: &Recipient) -> Result<()> {
        Err(DispatchError::TransportUnavailable(self.reason.clone()))
    }
}
