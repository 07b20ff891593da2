//! Heartbeat wire model.
//!
//! Edge producers (Hey ORAC instances) batch all their wake-word models into
//! one [`HeartbeatRequest`]; the aggregator fans active topics out to Core as
//! [`CoreHeartbeatRequest`] batches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source tag this service stamps on everything it forwards to Core.
pub const FORWARD_SOURCE: &str = "orac_stt";

/// Source tag edge producers use on inbound heartbeats.
pub const UPSTREAM_SOURCE: &str = "hey_orac";

/// Activity state of one wake-word model on a producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Active,
    Inactive,
}

impl ModelStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// One wake-word model's heartbeat data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelHeartbeat {
    /// Topic name derived from the wake word (e.g. `jarvis`).
    pub topic: String,
    /// Wake word phrase (e.g. "Hey Jarvis").
    pub wake_word: String,
    pub status: ModelStatus,
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trigger_count: u64,
}

/// Batched heartbeat from a single edge producer instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    /// Producer source tag (e.g. `hey_orac`).
    pub source: String,
    /// Producer-chosen unique instance identifier.
    pub instance_id: String,
    /// Producer-assigned timestamp.
    pub timestamp: DateTime<Utc>,
    /// All models on this instance, active and inactive.
    pub models: Vec<ModelHeartbeat>,
}

/// One active topic as forwarded to Core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicHeartbeat {
    pub name: String,
    pub status: ModelStatus,
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trigger_count: u64,
    pub wake_word: String,
}

/// Batched heartbeat delivery to one Core endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreHeartbeatRequest {
    pub source: String,
    /// The original producer-side source tag.
    pub upstream_source: String,
    /// This service's instance identifier.
    pub instance_id: String,
    /// Forwarding timestamp.
    pub timestamp: DateTime<Utc>,
    /// Active topics routed to this Core only.
    pub topics: Vec<TopicHeartbeat>,
}

/// Acknowledgement returned to the edge producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub topics_processed: usize,
}

impl HeartbeatResponse {
    pub fn ok(message: impl Into<String>, topics_processed: usize) -> Self {
        Self {
            status: "ok".to_string(),
            message: Some(message.into()),
            topics_processed,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
            topics_processed: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ModelStatus::Active).unwrap(),
            "\"active\""
        );
        let parsed: ModelStatus = serde_json::from_str("\"inactive\"").unwrap();
        assert_eq!(parsed, ModelStatus::Inactive);
    }

    #[test]
    fn request_parses_producer_payload() {
        let payload = serde_json::json!({
            "source": "hey_orac",
            "instance_id": "pi-kitchen-01",
            "timestamp": "2025-01-01T00:00:00Z",
            "models": [
                {
                    "topic": "jarvis",
                    "wake_word": "Hey Jarvis",
                    "status": "active",
                    "last_triggered": null,
                    "trigger_count": 7
                }
            ]
        });
        let request: HeartbeatRequest = serde_json::from_value(payload).unwrap();
        assert_eq!(request.models.len(), 1);
        assert!(request.models[0].status.is_active());
        assert_eq!(request.models[0].trigger_count, 7);
    }

    #[test]
    fn optional_fields_default() {
        let payload = serde_json::json!({
            "topic": "friday",
            "wake_word": "Friday",
            "status": "inactive"
        });
        let model: ModelHeartbeat = serde_json::from_value(payload).unwrap();
        assert_eq!(model.trigger_count, 0);
        assert!(model.last_triggered.is_none());
    }
}
