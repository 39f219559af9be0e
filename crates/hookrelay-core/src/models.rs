//! Core domain models and strongly-typed identifiers.
//!
//! Defines notifications, webhook URLs and execution units together with the
//! newtype wrappers that keep identifiers from being mixed up. An execution
//! unit is the unit of delivery work: one notification bound for one webhook.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Partition key scoping every stored collection.
///
/// Several independent managers may share one store as long as each uses its
/// own namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    /// Namespace used when none is configured.
    pub const DEFAULT: &'static str = "GLOBAL";

    /// Creates a namespace from any string.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the namespace as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strongly-typed notification identifier.
///
/// Wraps a UUID assigned at submission time. Serialized as the hyphenated
/// string form so it doubles as a store key segment.
///
/// # Example
///
/// ```
/// use hookrelay_core::models::NotificationId;
/// let id = NotificationId::new();
/// println!("Submitted notification: {}", id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub Uuid);

impl NotificationId {
    /// Creates a new random notification ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for NotificationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Registered webhook destination.
///
/// Construct through [`WebhookUrl::parse`], which rejects anything that is
/// not an absolute URL. The caller's original string is kept verbatim so the
/// same string always addresses the same webhook.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebhookUrl(String);

impl WebhookUrl {
    /// Validates and wraps a webhook URL.
    ///
    /// Only syntax is checked; no network request is made.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` if the string is not an absolute URL.
    pub fn parse(raw: &str) -> Result<Self> {
        url::Url::parse(raw)
            .map(|_| Self(raw.to_string()))
            .map_err(|e| CoreError::InvalidInput(format!("invalid url: {raw} ({e})")))
    }

    /// Returns the URL as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WebhookUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored notification.
///
/// Immutable once submitted. Its JSON form is the exact body POSTed to every
/// webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Identifier assigned at submission.
    pub id: NotificationId,

    /// Optional batch-of-ids marker carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    /// Event name.
    pub event: String,

    /// Arbitrary caller payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,

    /// When the notification was submitted.
    pub created_at: DateTime<Utc>,
}

/// Caller input for submitting a notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    /// Optional batch-of-ids marker.
    #[serde(default)]
    pub ids: Option<Vec<String>>,

    /// Event name.
    pub event: String,

    /// Arbitrary payload.
    #[serde(default)]
    pub extra: Option<serde_json::Value>,
}

impl NewNotification {
    /// Creates a notification input for the given event.
    pub fn new(event: impl Into<String>) -> Self {
        Self { ids: None, event: event.into(), extra: None }
    }

    /// Attaches an arbitrary payload.
    #[must_use]
    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = Some(extra);
        self
    }

    /// Attaches a batch-of-ids marker.
    #[must_use]
    pub fn with_ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Stamps identity and creation time onto the input.
    pub fn into_notification(self, id: NotificationId, created_at: DateTime<Utc>) -> Notification {
        Notification { id, ids: self.ids, event: self.event, extra: self.extra, created_at }
    }
}

/// Failure record carried by an execution unit after its first failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    /// Message describing the most recent failure.
    pub last_error: String,

    /// When the most recent failure happened.
    pub last_error_date: DateTime<Utc>,

    /// Number of failed attempts so far. Never decreases.
    pub attempts: u32,
}

/// Identity of an execution unit: one notification bound for one webhook.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitKey {
    /// Notification being delivered.
    pub notification_id: NotificationId,
    /// Destination webhook.
    pub webhook: WebhookUrl,
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.notification_id, self.webhook)
    }
}

/// Pending or in-progress delivery of one notification to one webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionUnit {
    /// Notification being delivered.
    pub notification_id: NotificationId,

    /// Destination webhook.
    pub webhook: WebhookUrl,

    /// Absent until the first failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DeliveryFailure>,
}

impl ExecutionUnit {
    /// Creates a fresh unit with no failure history.
    pub fn new(notification_id: NotificationId, webhook: WebhookUrl) -> Self {
        Self { notification_id, webhook, error: None }
    }

    /// Returns the unit's identity.
    pub fn key(&self) -> UnitKey {
        UnitKey { notification_id: self.notification_id, webhook: self.webhook.clone() }
    }

    /// Number of failed attempts, zero when none were recorded.
    pub fn attempts(&self) -> u32 {
        self.error.as_ref().map_or(0, |e| e.attempts)
    }

    /// Whether at least one attempt has failed.
    pub fn has_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Records a failed attempt and returns the new attempt count.
    pub fn record_failure(&mut self, message: impl Into<String>, at: DateTime<Utc>) -> u32 {
        let failure = self.error.get_or_insert_with(|| DeliveryFailure {
            last_error: String::new(),
            last_error_date: at,
            attempts: 0,
        });
        failure.last_error = message.into();
        failure.last_error_date = at;
        failure.attempts = failure.attempts.saturating_add(1);
        failure.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webhook() -> WebhookUrl {
        WebhookUrl::parse("https://example.com/hook").unwrap()
    }

    #[test]
    fn webhook_url_rejects_non_urls() {
        assert!(WebhookUrl::parse("not a url").is_err());
        assert!(WebhookUrl::parse("/relative/path").is_err());
        assert!(WebhookUrl::parse("").is_err());
    }

    #[test]
    fn webhook_url_keeps_original_string() {
        let url = WebhookUrl::parse("https://Example.com").unwrap();
        assert_eq!(url.as_str(), "https://Example.com");
    }

    #[test]
    fn record_failure_initialises_then_increments() {
        let mut unit = ExecutionUnit::new(NotificationId::new(), webhook());
        assert_eq!(unit.attempts(), 0);
        assert!(!unit.has_failed());

        let first = Utc::now();
        assert_eq!(unit.record_failure("500", first), 1);
        assert_eq!(unit.error.as_ref().unwrap().last_error_date, first);

        let second = first + chrono::Duration::seconds(10);
        assert_eq!(unit.record_failure("timeout", second), 2);

        let failure = unit.error.unwrap();
        assert_eq!(failure.last_error, "timeout");
        assert_eq!(failure.last_error_date, second);
        assert_eq!(failure.attempts, 2);
    }

    #[test]
    fn fresh_unit_serializes_without_error_field() {
        let unit = ExecutionUnit::new(NotificationId::new(), webhook());
        let json = serde_json::to_value(&unit).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["webhook"], "https://example.com/hook");
    }

    #[test]
    fn notification_body_matches_record() {
        let id = NotificationId::new();
        let created_at = Utc::now();
        let notification = NewNotification::new("order.created")
            .with_extra(serde_json::json!({"order": 42}))
            .into_notification(id, created_at);

        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["id"], id.to_string());
        assert_eq!(json["event"], "order.created");
        assert_eq!(json["extra"]["order"], 42);
        assert!(json.get("ids").is_none());
    }

    #[test]
    fn unit_key_identifies_pair() {
        let id = NotificationId::new();
        let a = ExecutionUnit::new(id, webhook());
        let mut b = ExecutionUnit::new(id, webhook());
        b.record_failure("boom", Utc::now());
        assert_eq!(a.key(), b.key());
    }
}
