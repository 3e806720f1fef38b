//! Prometheus metrics for dispatch monitoring.
//!
//! Metrics are organized into three categories:
//! - **Gauges**: Point-in-time state (sends in flight)
//! - **Counters**: Cumulative totals (sends by status, dispatches by outcome)
//! - **Histograms**: Distributions (batch duration)

#[cfg(feature = "metrics")]
use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
#[cfg(feature = "metrics")]
use std::time::Duration;

#[cfg(feature = "metrics")]
use crate::dispatch::{DispatchOutcome, SendOutcome};
#[cfg(feature = "metrics")]
use crate::error::Result;

/// Prometheus metrics registry for the dispatcher.
#[cfg(feature = "metrics")]
#[derive(Clone)]
pub struct DispatchMetrics {
    registry: Registry,

    sends_in_flight: Gauge,

    sends_total: CounterVec,
    dispatches_total: CounterVec,

    batch_duration_seconds: Histogram,
}

#[cfg(feature = "metrics")]
impl DispatchMetrics {
    /// Create a new DispatchMetrics instance with the given registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metrics fail to register (e.g., duplicate registration).
    pub fn new(registry: Registry) -> Result<Self> {
        let sends_in_flight = Gauge::with_opts(Opts::new(
            "rollcall_sends_in_flight",
            "Number of sends currently executing across all dispatches",
        ))
        .map_err(|e| anyhow::anyhow!("Failed to create sends_in_flight gauge: {}", e))?;

        let sends_total = CounterVec::new(
            Opts::new("rollcall_sends_total", "Total number of sends by status"),
            &["status"],
        )
        .map_err(|e| anyhow::anyhow!("Failed to create sends_total counter: {}", e))?;

        let dispatches_total = CounterVec::new(
            Opts::new(
                "rollcall_dispatches_total",
                "Total number of dispatches by outcome",
            ),
            &["outcome"],
        )
        .map_err(|e| anyhow::anyhow!("Failed to create dispatches_total counter: {}", e))?;

        let batch_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "rollcall_batch_duration_seconds",
                "Time for one batch to settle in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        )
        .map_err(|e| anyhow::anyhow!("Failed to create batch_duration_seconds histogram: {}", e))?;

        registry
            .register(Box::new(sends_in_flight.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to register sends_in_flight: {}", e))?;
        registry
            .register(Box::new(sends_total.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to register sends_total: {}", e))?;
        registry
            .register(Box::new(dispatches_total.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to register dispatches_total: {}", e))?;
        registry
            .register(Box::new(batch_duration_seconds.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to register batch_duration_seconds: {}", e))?;

        Ok(Self {
            registry,
            sends_in_flight,
            sends_total,
            dispatches_total,
            batch_duration_seconds,
        })
    }

    /// Get the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// A send has started. The gauge is shared by every dispatch running at once.
    pub fn send_started(&self) {
        self.sends_in_flight.inc();
    }

    /// A send has settled, successfully or not.
    pub fn send_finished(&self) {
        self.sends_in_flight.dec();
    }

    /// Record a settled batch: one counter increment per outcome plus its duration.
    pub fn observe_batch(&self, outcomes: &[SendOutcome], duration: Duration) {
        for outcome in outcomes {
            self.sends_total
                .with_label_values(&[outcome.status.as_str()])
                .inc();
        }
        self.batch_duration_seconds.observe(duration.as_secs_f64());
    }

    /// Record how a dispatch ended.
    pub fn record_dispatch(&self, outcome: &DispatchOutcome) {
        self.dispatches_total
            .with_label_values(&[outcome.label()])
            .inc();
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
        String::from_utf8(buffer)
            .map_err(|e| anyhow::anyhow!("Metrics are not valid UTF-8: {}", e).into())
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;
    use crate::request::Recipient;

    #[test]
    fn test_metrics_creation() {
        let registry = Registry::new();
        let _metrics = DispatchMetrics::new(registry.clone()).unwrap();

        // Vec metrics only appear once a label set is used
        let metric_names: Vec<String> = registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(metric_names.contains(&"rollcall_sends_in_flight".to_string()));
        assert!(metric_names.contains(&"rollcall_batch_duration_seconds".to_string()));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        DispatchMetrics::new(registry.clone()).unwrap();
        assert!(DispatchMetrics::new(registry).is_err());
    }

    #[test]
    fn test_observe_batch_counts_by_status() {
        let registry = Registry::new();
        let metrics = DispatchMetrics::new(registry.clone()).unwrap();

        let outcomes = vec![
            SendOutcome::sent(Recipient::new("a@example.com")),
            SendOutcome::sent(Recipient::new("b@example.com")),
            SendOutcome::failed(Recipient::new("c@example.com"), "rejected"),
        ];
        metrics.observe_batch(&outcomes, Duration::from_millis(120));
        metrics.record_dispatch(&DispatchOutcome::PartialSuccess {
            sent: 2,
            total: 3,
            failed: 1,
        });

        let families = registry.gather();
        let sends_total = families
            .iter()
            .find(|f| f.get_name() == "rollcall_sends_total")
            .expect("sends_total metric not found");

        let sent = sends_total
            .get_metric()
            .iter()
            .find(|m| {
                m.get_label()
                    .iter()
                    .any(|l| l.get_name() == "status" && l.get_value() == "sent")
            })
            .expect("sent status not found");
        assert_eq!(sent.get_counter().get_value(), 2.0);

        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("rollcall_dispatches_total{outcome=\"partial_success\"} 1"));
    }
}
