//! Batched multi-recipient dispatch.
//!
//! A dispatch validates the request, checks the transport once, splits the recipients
//! into fixed-size batches and runs the batches strictly one after another. Within a
//! batch every send runs concurrently and the batch only completes once all of them
//! have, so at most `batch_size` sends are ever in flight.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};
use crate::request::{DispatchId, DispatchRequest, validate};
use crate::transport::{OutgoingMessage, TransportPtr};

pub mod executor;
pub mod planner;
pub mod report;

pub use executor::BatchExecutor;
pub use planner::{Batch, plan};
pub use report::{AggregateReport, DispatchOutcome, SendOutcome, SendStatus, report};

/// Reason recorded for recipients whose batch never started.
pub const DEADLINE_EXCEEDED: &str = "dispatch deadline exceeded";

/// Configuration for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Maximum number of recipients sent to concurrently (one batch)
    pub batch_size: usize,

    /// Timeout for each individual send in milliseconds.
    /// None leaves sends bounded only by the transport's own timeouts.
    pub send_timeout_ms: Option<u64>,

    /// Overall time budget for a dispatch in milliseconds.
    /// Batches that have not started when it runs out are recorded as failed.
    pub dispatch_deadline_ms: Option<u64>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            send_timeout_ms: None,
            dispatch_deadline_ms: None,
        }
    }
}

impl DispatcherConfig {
    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(DispatchError::Config(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.send_timeout_ms == Some(0) {
            return Err(DispatchError::Config(
                "send_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Statistics tracked across all dispatches handled by one dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    /// Dispatches that reached the batching stage
    pub dispatches: u64,
    /// Recipients successfully sent to
    pub sends_succeeded: u64,
    /// Recipients that failed
    pub sends_failed: u64,
    /// Sends currently executing
    pub sends_in_flight: usize,
}

/// Dispatches one message to many recipients through a shared transport.
pub struct Dispatcher {
    transport: TransportPtr,
    config: DispatcherConfig,
    sends_in_flight: Arc<AtomicUsize>,
    dispatches: Arc<AtomicU64>,
    sends_succeeded: Arc<AtomicU64>,
    sends_failed: Arc<AtomicU64>,
    #[cfg(feature = "metrics")]
    metrics: Option<crate::metrics::DispatchMetrics>,
}

impl Dispatcher {
    /// Create a new dispatcher.
    pub fn new(transport: TransportPtr, config: DispatcherConfig) -> Self {
        Self {
            transport,
            config,
            sends_in_flight: Arc::new(AtomicUsize::new(0)),
            dispatches: Arc::new(AtomicU64::new(0)),
            sends_succeeded: Arc::new(AtomicU64::new(0)),
            sends_failed: Arc::new(AtomicU64::new(0)),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Record Prometheus metrics for every dispatch.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: crate::metrics::DispatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            dispatches: self.dispatches.load(Ordering::Relaxed),
            sends_succeeded: self.sends_succeeded.load(Ordering::Relaxed),
            sends_failed: self.sends_failed.load(Ordering::Relaxed),
            sends_in_flight: self.sends_in_flight.load(Ordering::Relaxed),
        }
    }

    /// Run a dispatch and return the full per-recipient report.
    ///
    /// # Errors
    /// Returns [`DispatchError::Validation`] for a malformed request and
    /// [`DispatchError::TransportUnavailable`] when the transport fails its check. In
    /// both cases nothing has been sent. Per-recipient failures are never returned as
    /// errors; they are in the report.
    #[tracing::instrument(skip(self, request), fields(dispatch_id = %DispatchId::new()))]
    pub async fn dispatch(&self, request: DispatchRequest) -> Result<AggregateReport> {
        let request = validate(request)?;

        self.transport.verify().await.map_err(|e| {
            tracing::error!(error = %e, "Transport is not usable, aborting dispatch");
            match e {
                DispatchError::TransportUnavailable(_) => e,
                other => DispatchError::TransportUnavailable(other.to_string()),
            }
        })?;

        let started = Instant::now();
        let deadline = self
            .config
            .dispatch_deadline_ms
            .map(|ms| started + Duration::from_millis(ms));
        let send_timeout = self.config.send_timeout_ms.map(Duration::from_millis);

        let batches = plan(request.recipients(), self.config.batch_size);
        let message = Arc::new(OutgoingMessage::from_body(
            request.subject(),
            request.body(),
        ));

        self.dispatches.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            recipients = request.recipients().len(),
            batches = batches.len(),
            batch_size = self.config.batch_size,
            "Starting dispatch"
        );

        let mut aggregate = AggregateReport::default();

        for batch in &batches {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                tracing::warn!(
                    batch_index = batch.index,
                    skipped = batch.len(),
                    "Dispatch deadline exceeded, batch not sent"
                );
                let skipped = batch
                    .recipients
                    .iter()
                    .map(|r| SendOutcome::failed(r.clone(), DEADLINE_EXCEEDED))
                    .collect();
                aggregate = aggregate.accumulate(skipped);
                continue;
            }

            let executor =
                BatchExecutor::new(self.transport.clone(), self.sends_in_flight.clone())
                    .with_send_timeout(send_timeout)
                    .with_deadline(deadline);
            #[cfg(feature = "metrics")]
            let executor = executor.with_metrics(self.metrics.clone());

            let batch_started = Instant::now();
            let outcomes = executor.execute(batch, &message).await;

            let failed = outcomes.iter().filter(|o| !o.is_sent()).count();
            tracing::debug!(
                batch_index = batch.index,
                size = batch.len(),
                failed,
                elapsed_ms = batch_started.elapsed().as_millis() as u64,
                "Batch completed"
            );

            #[cfg(feature = "metrics")]
            if let Some(metrics) = &self.metrics {
                metrics.observe_batch(&outcomes, batch_started.elapsed());
            }

            aggregate = aggregate.accumulate(outcomes);
        }

        self.sends_succeeded
            .fetch_add(aggregate.success_count as u64, Ordering::Relaxed);
        self.sends_failed
            .fetch_add(aggregate.failure_count as u64, Ordering::Relaxed);

        if aggregate.failure_count > 0 {
            for failure in aggregate.failures() {
                tracing::warn!(
                    address = %failure.recipient.address,
                    reason = failure.failure_reason.as_deref().unwrap_or("unknown"),
                    "Recipient not delivered"
                );
            }
        }

        tracing::info!(
            total = aggregate.total_count,
            sent = aggregate.success_count,
            failed = aggregate.failure_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Dispatch finished"
        );

        Ok(aggregate)
    }

    /// Run a dispatch and classify how it ended.
    pub async fn handle(&self, request: DispatchRequest) -> DispatchOutcome {
        let outcome = match self.dispatch(request).await {
            Ok(aggregate) => report(&aggregate),
            Err(DispatchError::Validation(message)) => {
                DispatchOutcome::ValidationFailure { message }
            }
            Err(DispatchError::TransportUnavailable(message)) => {
                DispatchOutcome::TransportConstructionFailure { message }
            }
            Err(e) => {
                tracing::error!(error = %e, "Dispatch failed unexpectedly");
                DispatchOutcome::UnexpectedFailure {
                    message: e.to_string(),
                }
            }
        };

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_dispatch(&outcome);
        }

        outcome
    }
}
