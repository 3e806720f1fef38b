//! Dispatch requests: wire shape, validated form and validation.

pub mod types;
pub mod validation;

pub use types::{DispatchId, DispatchRequest, Recipient, ValidatedRequest};
pub use validation::{MISSING_FIELDS, validate};
