//! In-memory transport for tests and demos.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;

use super::{MessageTransport, OutgoingMessage};
use crate::error::{DispatchError, Result};
use crate::request::Recipient;

/// Mock transport for testing.
///
/// Every send succeeds unless the address was configured to fail. Sends can also be
/// delayed or held until a trigger fires, which lets tests control completion order.
///
/// # Example
/// ```ignore
/// let mock = MockTransport::new();
/// mock.fail_address("bounce@example.com", "mailbox unavailable");
/// let dispatcher = Dispatcher::new(Arc::new(mock.clone()), DispatcherConfig::default());
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    calls: Arc<Mutex<Vec<MockCall>>>,
    failures: Arc<Mutex<HashMap<String, String>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    triggers: Arc<Mutex<HashMap<String, oneshot::Receiver<()>>>>,
    verify_failure: Arc<Mutex<Option<String>>>,
    verify_calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

/// Record of a send made through the mock transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub address: String,
    pub name: Option<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl MockTransport {
    /// Create a new mock transport where every send succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to `address` fail with `reason`.
    pub fn fail_address(&self, address: &str, reason: &str) {
        self.failures
            .lock()
            .insert(address.to_string(), reason.to_string());
    }

    /// Make `verify` fail, as a transport with rejected credentials would.
    pub fn fail_verify(&self, reason: &str) {
        *self.verify_failure.lock() = Some(reason.to_string());
    }

    /// Delay sends to `address` by `delay` before completing.
    pub fn delay_address(&self, address: &str, delay: Duration) {
        self.delays.lock().insert(address.to_string(), delay);
    }

    /// Hold the next send to `address` until the returned sender fires or is dropped.
    pub fn hold_address(&self, address: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.triggers.lock().insert(address.to_string(), rx);
        tx
    }

    /// Get all sends that have been made, in the order they started.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Get the number of sends made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Get the number of times `verify` was called.
    pub fn verify_count(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    /// Get the number of sends currently executing.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Get the highest number of sends that were executing at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageTransport for MockTransport {
    async fn verify(&self) -> Result<()> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        match self.verify_failure.lock().clone() {
            Some(reason) => Err(DispatchError::TransportUnavailable(reason)),
            None => Ok(()),
        }
    }

    async fn send(&self, message: &OutgoingMessage, to: &Recipient) -> Result<()> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        // Guard to ensure we decrement even if cancelled/panicked
        let _guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
        };

        self.calls.lock().push(MockCall {
            address: to.address.clone(),
            name: to.name.clone(),
            subject: message.subject.clone(),
            text: message.text.clone(),
            html: message.html.clone(),
        });

        let trigger = self.triggers.lock().remove(&to.address);
        if let Some(rx) = trigger {
            // Proceed whether the trigger fired or was dropped
            let _ = rx.await;
        }

        let delay = self.delays.lock().get(&to.address).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().get(&to.address).cloned();
        match failure {
            Some(reason) => Err(DispatchError::Send {
                address: to.address.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// Guard that decrements the in-flight counter when dropped.
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
