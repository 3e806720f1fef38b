//! Per-recipient outcomes, the aggregate report and its classification.

use serde::Serialize;

use crate::request::{MISSING_FIELDS, Recipient};

/// Delivery status of a single recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Sent,
    Failed,
}

impl SendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendStatus::Sent => "sent",
            SendStatus::Failed => "failed",
        }
    }
}

/// Outcome of the single send attempt made for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    pub recipient: Recipient,
    pub status: SendStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SendOutcome {
    pub fn sent(recipient: Recipient) -> Self {
        Self {
            recipient,
            status: SendStatus::Sent,
            failure_reason: None,
        }
    }

    pub fn failed(recipient: Recipient, reason: impl Into<String>) -> Self {
        Self {
            recipient,
            status: SendStatus::Failed,
            failure_reason: Some(reason.into()),
        }
    }

    pub fn is_sent(&self) -> bool {
        self.status == SendStatus::Sent
    }
}

/// Outcomes of every recipient in a dispatch, in request order, with counts.
///
/// Counts are always derived from `outcomes`, so
/// `total_count == success_count + failure_count` holds by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateReport {
    pub total_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub outcomes: Vec<SendOutcome>,
}

impl AggregateReport {
    /// Build a report from an ordered list of outcomes.
    pub fn from_outcomes(outcomes: Vec<SendOutcome>) -> Self {
        let success_count = outcomes.iter().filter(|o| o.is_sent()).count();
        Self {
            total_count: outcomes.len(),
            success_count,
            failure_count: outcomes.len() - success_count,
            outcomes,
        }
    }

    /// Append one batch's outcomes and recount.
    pub fn accumulate(self, batch_outcomes: Vec<SendOutcome>) -> Self {
        let mut outcomes = self.outcomes;
        outcomes.extend(batch_outcomes);
        Self::from_outcomes(outcomes)
    }

    /// Failed outcomes, in request order.
    pub fn failures(&self) -> impl Iterator<Item = &SendOutcome> {
        self.outcomes.iter().filter(|o| !o.is_sent())
    }
}

/// Terminal classification of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Every recipient was sent to
    FullSuccess { sent: usize },
    /// Some recipients failed
    PartialSuccess {
        sent: usize,
        total: usize,
        failed: usize,
    },
    /// Every recipient failed; reported to callers the same way as a partial success
    TotalFailure { total: usize, failed: usize },
    /// The request was malformed and nothing was sent
    ValidationFailure { message: String },
    /// The transport could not be constructed or authenticated; nothing was sent
    TransportConstructionFailure { message: String },
    /// Anything else that aborted the dispatch
    UnexpectedFailure { message: String },
}

impl DispatchOutcome {
    /// Low-cardinality label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::FullSuccess { .. } => "full_success",
            DispatchOutcome::PartialSuccess { .. } => "partial_success",
            DispatchOutcome::TotalFailure { .. } => "total_failure",
            DispatchOutcome::ValidationFailure { .. } => "validation_failure",
            DispatchOutcome::TransportConstructionFailure { .. } => "transport_failure",
            DispatchOutcome::UnexpectedFailure { .. } => "unexpected_failure",
        }
    }
}

/// Classify a completed dispatch.
///
/// An empty report cannot come out of a validated dispatch; it is classified as a
/// validation failure rather than a success with nothing sent.
pub fn report(aggregate: &AggregateReport) -> DispatchOutcome {
    let AggregateReport {
        total_count,
        success_count,
        failure_count,
        ..
    } = *aggregate;

    if total_count == 0 {
        DispatchOutcome::ValidationFailure {
            message: MISSING_FIELDS.to_string(),
        }
    } else if failure_count == 0 {
        DispatchOutcome::FullSuccess {
            sent: success_count,
        }
    } else if failure_count == total_count {
        DispatchOutcome::TotalFailure {
            total: total_count,
            failed: failure_count,
        }
    } else {
        DispatchOutcome::PartialSuccess {
            sent: success_count,
            total: total_count,
            failed: failure_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcomes(statuses: &[bool]) -> Vec<SendOutcome> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, ok)| {
                let recipient = Recipient::new(format!("p{}@example.com", i));
                if *ok {
                    SendOutcome::sent(recipient)
                } else {
                    SendOutcome::failed(recipient, "rejected")
                }
            })
            .collect()
    }

    #[test]
    fn test_accumulate_preserves_order_and_counts() {
        let all = outcomes(&[true, false, true, true, false]);
        let report = AggregateReport::default()
            .accumulate(all[..3].to_vec())
            .accumulate(all[3..].to_vec());

        assert_eq!(report.outcomes, all);
        assert_eq!(report.total_count, 5);
        assert_eq!(report.success_count, 3);
        assert_eq!(report.failure_count, 2);
        assert_eq!(
            report
                .failures()
                .map(|o| o.recipient.address.as_str())
                .collect::<Vec<_>>(),
            vec!["p1@example.com", "p4@example.com"]
        );
    }

    #[test]
    fn test_counting_invariant_for_mixed_outcomes() {
        for mask in 0u32..64 {
            let statuses: Vec<bool> = (0..6).map(|bit| mask & (1 << bit) != 0).collect();
            let report = AggregateReport::from_outcomes(outcomes(&statuses));
            assert_eq!(
                report.total_count,
                report.success_count + report.failure_count
            );
            assert_eq!(report.total_count, 6);
        }
    }

    #[test]
    fn test_report_classification() {
        let full = AggregateReport::from_outcomes(outcomes(&[true, true, true]));
        assert_eq!(report(&full), DispatchOutcome::FullSuccess { sent: 3 });

        let partial = AggregateReport::from_outcomes(outcomes(&[true, false, true]));
        assert_eq!(
            report(&partial),
            DispatchOutcome::PartialSuccess {
                sent: 2,
                total: 3,
                failed: 1
            }
        );

        let none = AggregateReport::from_outcomes(outcomes(&[false, false]));
        assert_eq!(
            report(&none),
            DispatchOutcome::TotalFailure {
                total: 2,
                failed: 2
            }
        );
    }

    #[test]
    fn test_empty_report_is_not_success() {
        let outcome = report(&AggregateReport::default());
        assert_eq!(outcome.label(), "validation_failure");
    }
}
