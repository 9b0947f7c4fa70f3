use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One record from the console's append-only event log.
///
/// `id` is assigned by the server, unique within a stream and never reused;
/// the server orders events newest-first by `id`/`created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub agent_id: String,
    /// Tag identifying the event type (e.g. "task_started", "memory_write").
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-form payload; shape depends on `kind`.
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// One turn of a roundtable session transcript.
///
/// `turn_number` is assigned by the server in strictly increasing order and
/// is unique within its session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub session_id: String,
    pub turn_number: u64,
    pub speaker: String,
    pub dialogue: String,
    pub at: DateTime<Utc>,
}

/// Server-side filter for the event log. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub agent_id: Option<String>,
    pub kind: Option<String>,
}

impl EventFilter {
    pub fn agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            kind: None,
        }
    }

    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            agent_id: None,
            kind: Some(kind.into()),
        }
    }
}

/// Body of `GET /events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPage {
    pub events: Vec<Event>,
}

/// Body of `GET /turns`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnPage {
    pub turns: Vec<Turn>,
}

/// Payload of the `session_complete` push message. The message's presence
/// alone signals termination; the status text is informational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionComplete {
    #[serde(default)]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_deserializes_with_optional_fields_absent() {
        let raw = serde_json::json!({
            "id": "42",
            "agent_id": "scout-1",
            "kind": "task_started",
            "title": "Crawl started",
            "created_at": "2026-03-01T12:00:00Z"
        });

        let event: Event = serde_json::from_value(raw).unwrap();
        assert_eq!(event.id, "42");
        assert!(event.summary.is_none());
        assert!(event.tags.is_empty());
        assert!(event.metadata.is_null());
    }

    #[test]
    fn turn_round_trips() {
        let turn = Turn {
            session_id: "rt-7".into(),
            turn_number: 3,
            speaker: "editor".into(),
            dialogue: "I disagree with the headline.".into(),
            at: Utc::now(),
        };

        let value = serde_json::to_value(&turn).unwrap();
        assert_eq!(value["turn_number"], 3);
        let back: Turn = serde_json::from_value(value).unwrap();
        assert_eq!(back.turn_number, turn.turn_number);
        assert_eq!(back.speaker, "editor");
    }

    #[test]
    fn session_complete_accepts_bare_object() {
        let parsed: SessionComplete = serde_json::from_str("{}").unwrap();
        assert!(parsed.status.is_none());
    }
}
