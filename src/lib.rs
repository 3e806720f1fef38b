//! Batched multi-recipient notification dispatch.
//!
//! This crate delivers one message to many recipients through a rate-limited transport.
//! Recipients are split into fixed-size batches; sends within a batch run concurrently
//! and batches run one after another, so the transport never sees more than
//! `batch_size` concurrent sends. A failed recipient never stops the others: every
//! recipient gets exactly one outcome and the caller gets exact counts.
//!
//! The HTTP service in [`server`] exposes this as `POST /api/send-bulk-email`, backed by
//! the SMTP transport in [`transport::smtp`].

pub mod config;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod request;
pub mod server;
pub mod transport;

// Re-export commonly used types
pub use dispatch::{
    AggregateReport, DispatchOutcome, Dispatcher, DispatcherConfig, DispatcherStats,
    SendOutcome, SendStatus,
};
pub use error::{DispatchError, Result};
#[cfg(feature = "metrics")]
pub use metrics::DispatchMetrics;
pub use request::{DispatchRequest, Recipient, ValidatedRequest};
pub use server::{AppState, build_app};
pub use transport::{
    MessageTransport, MockTransport, OutgoingMessage, SmtpConfig, SmtpTransport, TransportPtr,
    UnavailableTransport,
};
