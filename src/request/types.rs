//! Core types describing a dispatch request.
//!
//! A [`DispatchRequest`] is the raw, loosely-shaped body accepted from callers. It only
//! becomes a [`ValidatedRequest`] by passing through [`super::validate`], which is the
//! sole constructor, so the rest of the engine never sees a request without recipients,
//! subject or body.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// A single message recipient.
///
/// The address is carried as given. Nothing here checks mailbox syntax: a bad address
/// only shows up later as a failed send for that recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Display name, used only when rendering the destination mailbox
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Delivery address (the `email` field on the wire)
    #[serde(rename = "email", default, deserialize_with = "lenient_address")]
    pub address: String,
}

/// Accept any JSON value as an address. Anything but a string becomes empty, so a bad
/// entry fails as its own send instead of rejecting the whole request.
fn lenient_address<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(address) => address,
        _ => String::new(),
    })
}

impl Recipient {
    /// Create a recipient with an address and no display name.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
        }
    }

    /// Attach a display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A dispatch request as received from a caller.
///
/// Every field is optional so that a missing field and an empty one are treated the
/// same way by validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    #[serde(default)]
    pub recipients: Option<Vec<Recipient>>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl DispatchRequest {
    /// Convenience constructor for a fully-populated request.
    pub fn new(
        recipients: Vec<Recipient>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipients: Some(recipients),
            subject: Some(subject.into()),
            body: Some(body.into()),
        }
    }
}

/// A request that passed validation.
///
/// Immutable for the lifetime of the dispatch; fields are only readable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub(super) recipients: Vec<Recipient>,
    pub(super) subject: String,
    pub(super) body: String,
}

impl ValidatedRequest {
    pub fn recipients(&self) -> &[Recipient] {
        &self.recipients
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

/// Unique identifier for one dispatch invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DispatchId(pub Uuid);

impl DispatchId {
    pub fn new() -> Self {
        DispatchId(Uuid::new_v4())
    }
}

impl Default for DispatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DispatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Display only first 8 characters for readability in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl From<Uuid> for DispatchId {
    fn from(uuid: Uuid) -> Self {
        DispatchId(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_reads_email_field() {
        let recipient: Recipient =
            serde_json::from_str(r#"{"name":"Sam Rivera","email":"sam@example.com"}"#).unwrap();
        assert_eq!(recipient.name.as_deref(), Some("Sam Rivera"));
        assert_eq!(recipient.address, "sam@example.com");
    }

    #[test]
    fn test_recipient_missing_email_defaults_to_empty() {
        let recipient: Recipient = serde_json::from_str(r#"{"name":"No Address"}"#).unwrap();
        assert_eq!(recipient.address, "");
    }

    #[test]
    fn test_recipient_non_string_email_becomes_empty() {
        let recipients: Vec<Recipient> = serde_json::from_str(
            r#"[{"email":"ok@example.com"},{"email":null},{"email":42},{"email":["x"]}]"#,
        )
        .unwrap();
        let addresses: Vec<&str> = recipients.iter().map(|r| r.address.as_str()).collect();
        assert_eq!(addresses, vec!["ok@example.com", "", "", ""]);
    }

    #[test]
    fn test_dispatch_request_missing_fields_are_none() {
        let request: DispatchRequest = serde_json::from_str(r#"{"subject":"Tryouts"}"#).unwrap();
        assert!(request.recipients.is_none());
        assert_eq!(request.subject.as_deref(), Some("Tryouts"));
        assert!(request.body.is_none());
    }

    #[test]
    fn test_dispatch_id_display_is_short() {
        let id = DispatchId::new();
        assert_eq!(id.to_string().len(), 8);
    }
}
