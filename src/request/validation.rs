//! Request validation.

use crate::error::{DispatchError, Result};

use super::types::{DispatchRequest, ValidatedRequest};

/// Message returned to callers for any malformed request.
pub const MISSING_FIELDS: &str = "Missing required fields";

/// Validate a raw dispatch request.
///
/// Rejects the request when the recipient list is absent or empty, or when the subject
/// or body is absent or empty. Individual recipients are not inspected.
pub fn validate(request: DispatchRequest) -> Result<ValidatedRequest> {
    let DispatchRequest {
        recipients,
        subject,
        body,
    } = request;

    match (recipients, subject, body) {
        (Some(recipients), Some(subject), Some(body))
            if !recipients.is_empty() && !subject.is_empty() && !body.is_empty() =>
        {
            Ok(ValidatedRequest {
                recipients,
                subject,
                body,
            })
        }
        _ => Err(DispatchError::Validation(MISSING_FIELDS.to_string())),
    }
}
