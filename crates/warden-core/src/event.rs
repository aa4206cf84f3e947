//! Event envelope, event types, and audit-ledger records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Event types. The routing key of a published event is its type; the
// consumer queue binds `rbac.*.*.request`, so only request events are
// consumed here. Terminal events are published for external subscribers.
pub const USER_ROLE_ASSIGN_REQUEST: &str = "rbac.user_role.assign.request";
pub const USER_ROLE_ASSIGN_SUCCESS: &str = "rbac.user_role.assign.success";
pub const USER_ROLE_ASSIGN_FAILED: &str = "rbac.user_role.assign.failed";
pub const USER_ROLE_REMOVE_REQUEST: &str = "rbac.user_role.remove.request";
pub const USER_ROLE_REMOVE_SUCCESS: &str = "rbac.user_role.remove.success";
pub const USER_ROLE_REMOVE_FAILED: &str = "rbac.user_role.remove.failed";
pub const USER_GROUP_ASSIGN_REQUEST: &str = "rbac.user_group.assign.request";
pub const USER_GROUP_ASSIGN_SUCCESS: &str = "rbac.user_group.assign.success";
pub const USER_GROUP_ASSIGN_FAILED: &str = "rbac.user_group.assign.failed";
pub const USER_GROUP_REMOVE_REQUEST: &str = "rbac.user_group.remove.request";
pub const USER_GROUP_REMOVE_SUCCESS: &str = "rbac.user_group.remove.success";
pub const USER_GROUP_REMOVE_FAILED: &str = "rbac.user_group.remove.failed";

/// The wire envelope. `id` may be left empty by the caller; the publisher
/// assigns one before the event reaches the broker or the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// An event with a blank id. The publisher assigns a fresh id per
    /// publish attempt, so retried events do not collide in the ledger.
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: String::new(),
            event_type: event_type.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// An event with an explicit id, for callers that track their own.
    pub fn with_id(
        id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn ensure_id(&mut self) {
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRolePayload {
    pub user_ids: Vec<String>,
    pub role_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserGroupPayload {
    pub user_ids: Vec<String>,
    pub group_id: String,
}

/// Payload of `…failed` terminal events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub error: String,
}

/// Lifecycle of a `published_events` row. Transitions are monotone:
/// pending is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    Pending,
    Published,
    Failed,
}

impl PublishStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PublishStatus::Pending => "pending",
            PublishStatus::Published => "published",
            PublishStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for PublishStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PublishStatus::Pending),
            "published" => Ok(PublishStatus::Published),
            "failed" => Ok(PublishStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Lifecycle of a `consumed_events` row. Processing is the only
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeStatus {
    Processing,
    Completed,
    Failed,
}

impl ConsumeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConsumeStatus::Processing => "processing",
            ConsumeStatus::Completed => "completed",
            ConsumeStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ConsumeStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(ConsumeStatus::Processing),
            "completed" => Ok(ConsumeStatus::Completed),
            "failed" => Ok(ConsumeStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event status: {0}")]
pub struct UnknownStatus(pub String);

/// One row of the published-events ledger: an attempt to hand an event to
/// the broker, created `pending` before the send.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub id: String,
    pub event_type: String,
    pub payload: Vec<u8>,
    pub status: PublishStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PublishedEvent {
    pub fn pending(id: &str, event_type: &str, payload: Vec<u8>) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            event_type: event_type.to_string(),
            payload,
            status: PublishStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One row of the consumed-events ledger: an attempt to handle a delivered
/// event, created `processing` on receipt. A broker redelivery of the same
/// event id produces a second row.
#[derive(Debug, Clone)]
pub struct ConsumedEvent {
    pub id: String,
    pub event_type: String,
    pub payload: Vec<u8>,
    pub status: ConsumeStatus,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConsumedEvent {
    pub fn processing(id: &str, event_type: &str, payload: Vec<u8>) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            event_type: event_type.to_string(),
            payload,
            status: ConsumeStatus::Processing,
            error_message: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_type_field_and_rfc3339_timestamp() {
        let event = Event::with_id(
            "e1",
            USER_ROLE_ASSIGN_REQUEST,
            serde_json::json!({"user_ids": ["u1"], "role_id": "r1"}),
        );
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], USER_ROLE_ASSIGN_REQUEST);
        assert_eq!(json["id"], "e1");
        // chrono's serde emits RFC 3339 with a trailing offset
        let ts = json["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok(), "timestamp: {ts}");
    }

    #[test]
    fn envelope_round_trips() {
        let event = Event::with_id("e2", USER_GROUP_REMOVE_REQUEST, serde_json::json!({"k": 1}));
        let bytes = serde_json::to_vec(&event).unwrap();
        let back: Event = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn ensure_id_fills_only_blank_ids() {
        let mut event = Event::new(USER_ROLE_ASSIGN_REQUEST, serde_json::Value::Null);
        assert!(event.id.is_empty());
        event.ensure_id();
        assert!(!event.id.is_empty());

        let kept = event.id.clone();
        event.ensure_id();
        assert_eq!(event.id, kept);
    }

    #[test]
    fn error_payload_omits_absent_subject_ids() {
        let payload = ErrorPayload {
            user_ids: vec!["u1".into()],
            role_id: Some("r1".into()),
            group_id: None,
            error: "boom".into(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("group_id").is_none());
        assert_eq!(json["role_id"], "r1");
    }

    #[test]
    fn statuses_round_trip_through_strings() {
        for status in [
            PublishStatus::Pending,
            PublishStatus::Published,
            PublishStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<PublishStatus>().unwrap(), status);
        }
        for status in [
            ConsumeStatus::Processing,
            ConsumeStatus::Completed,
            ConsumeStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ConsumeStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<PublishStatus>().is_err());
    }

    #[test]
    fn request_event_types_match_the_consumer_binding_shape() {
        for event_type in [
            USER_ROLE_ASSIGN_REQUEST,
            USER_ROLE_REMOVE_REQUEST,
            USER_GROUP_ASSIGN_REQUEST,
            USER_GROUP_REMOVE_REQUEST,
        ] {
            let parts: Vec<&str> = event_type.split('.').collect();
            assert_eq!(parts.len(), 4);
            assert_eq!(parts[0], "rbac");
            assert_eq!(parts[3], "request");
        }
    }
}
