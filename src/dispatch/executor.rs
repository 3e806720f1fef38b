//! Concurrent execution of one batch.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::task::JoinSet;

use super::planner::Batch;
use super::report::SendOutcome;
use crate::error::DispatchError;
use crate::request::Recipient;
use crate::transport::{OutgoingMessage, TransportPtr};

/// Sends every recipient of a batch concurrently and waits for all of them.
///
/// One failed send never cancels or skips its siblings: the join only resolves once
/// every task in the batch has finished, and each failure is captured as that
/// recipient's outcome.
pub struct BatchExecutor {
    transport: TransportPtr,
    send_timeout: Option<Duration>,
    deadline: Option<Instant>,
    in_flight: Arc<AtomicUsize>,
    #[cfg(feature = "metrics")]
    metrics: Option<crate::metrics::DispatchMetrics>,
}

impl BatchExecutor {
    pub fn new(transport: TransportPtr, in_flight: Arc<AtomicUsize>) -> Self {
        Self {
            transport,
            send_timeout: None,
            deadline: None,
            in_flight,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Bound each send by `timeout`; a send that runs over becomes a failed outcome.
    pub fn with_send_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Cut every send short at `deadline`, whatever its own timeout.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Track running sends on the in-flight gauge.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: Option<crate::metrics::DispatchMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Execute one batch, returning one outcome per recipient in batch order.
    pub async fn execute(
        &self,
        batch: &Batch<'_>,
        message: &Arc<OutgoingMessage>,
    ) -> Vec<SendOutcome> {
        let mut join_set: JoinSet<(usize, SendOutcome)> = JoinSet::new();

        for (slot, recipient) in batch.recipients.iter().enumerate() {
            let transport = self.transport.clone();
            let message = message.clone();
            let recipient = recipient.clone();
            let limits = SendLimits {
                send_timeout: self.send_timeout,
                deadline: self.deadline,
            };
            let in_flight = self.in_flight.clone();
            #[cfg(feature = "metrics")]
            let metrics = self.metrics.clone();

            in_flight.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "metrics")]
            if let Some(metrics) = &metrics {
                metrics.send_started();
            }

            join_set.spawn(async move {
                // Ensure we decrement the counters when this task completes
                let _guard = scopeguard::guard((), move |_| {
                    in_flight.fetch_sub(1, Ordering::Relaxed);
                    #[cfg(feature = "metrics")]
                    if let Some(metrics) = &metrics {
                        metrics.send_finished();
                    }
                });

                let outcome = send_one(transport, &message, recipient, limits).await;
                (slot, outcome)
            });
        }

        let mut slots: Vec<Option<SendOutcome>> = vec![None; batch.len()];

        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((slot, outcome)) => slots[slot] = Some(outcome),
                Err(join_error) => {
                    // The slot stays empty and is filled in below
                    tracing::error!(
                        batch_index = batch.index,
                        error = %join_error,
                        "Send task panicked"
                    );
                }
            }
        }

        slots
            .into_iter()
            .zip(batch.recipients)
            .enumerate()
            .map(|(slot, (outcome, recipient))| {
                outcome.unwrap_or_else(|| {
                    tracing::error!(
                        position = batch.offset + slot,
                        address = %recipient.address,
                        "No outcome for recipient, recording it as failed"
                    );
                    SendOutcome::failed(recipient.clone(), "send task panicked")
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct SendLimits {
    send_timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl SendLimits {
    /// The time this send may take, and whether the dispatch deadline is what bounds it.
    fn effective(&self) -> Option<(Duration, bool)> {
        let left = self
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()));
        match (self.send_timeout, left) {
            (Some(send), Some(left)) if left < send => Some((left, true)),
            (Some(send), _) => Some((send, false)),
            (None, Some(left)) => Some((left, true)),
            (None, None) => None,
        }
    }
}

async fn send_one(
    transport: TransportPtr,
    message: &OutgoingMessage,
    recipient: Recipient,
    limits: SendLimits,
) -> SendOutcome {
    let result = match limits.effective() {
        Some((limit, deadline_bound)) => {
            tokio::time::timeout(limit, transport.send(message, &recipient))
                .await
                .unwrap_or_else(|_| {
                    if deadline_bound {
                        Err(DispatchError::DeadlineExceeded)
                    } else {
                        Err(DispatchError::Timeout(limit.as_millis() as u64))
                    }
                })
        }
        None => transport.send(message, &recipient).await,
    };

    match result {
        Ok(()) => {
            tracing::trace!(address = %recipient.address, "Message sent");
            SendOutcome::sent(recipient)
        }
        Err(e) => {
            let reason = e.failure_reason();
            tracing::warn!(
                address = %recipient.address,
                reason = %reason,
                "Failed to send message"
            );
            SendOutcome::failed(recipient, reason)
        }
    }
}
