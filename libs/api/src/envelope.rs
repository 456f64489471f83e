use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::ClientError;

/// CloudEvents specification version carried by every envelope.
pub const SPEC_VERSION: &str = "1.0";

/// Event type of every envelope produced from a log record.
pub const EVENT_TYPE: &str = "dev.knative.kafka.event";

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_BINARY: &str = "application/octet-stream";

/// Deterministic event id for a record position: `partition:<p>/offset:<o>`.
///
/// Offsets are unique within a partition, so ids never collide within a topic.
pub fn event_id(partition: i32, offset: i64) -> String {
    format!("partition:{partition}/offset:{offset}")
}

// ════════════════════════════════════════════════════════════════
//  Event data
// ════════════════════════════════════════════════════════════════

/// Decoded payload of an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    /// Payload parsed as a JSON object.
    Json(serde_json::Value),
    /// Payload that is not a JSON object, kept byte for byte.
    Binary(Vec<u8>),
}

impl EventData {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            EventData::Json(value) => Some(value),
            EventData::Binary(_) => None,
        }
    }

    /// Wire body: JSON serialisation for structured data, raw bytes otherwise.
    pub fn to_body(&self) -> Result<Vec<u8>, ClientError> {
        match self {
            EventData::Json(value) => Ok(serde_json::to_vec(value)?),
            EventData::Binary(bytes) => Ok(bytes.clone()),
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Envelope
// ════════════════════════════════════════════════════════════════

/// Structured event delivered to the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub id: String,
    pub event_type: String,
    pub source: String,
    pub time: Option<DateTime<Utc>>,
    /// Content type of `data` when it is structured.
    pub content_type: String,
    /// CloudEvents extension attributes (at least `key`).
    pub extensions: BTreeMap<String, String>,
    pub data: EventData,
}

impl Envelope {
    /// `time` as RFC 3339 with millisecond precision.
    pub fn time_rfc3339(&self) -> Option<String> {
        self.time.map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// Content type matching what `data.to_body()` produces.
    pub fn body_content_type(&self) -> &str {
        match self.data {
            EventData::Json(_) => &self.content_type,
            EventData::Binary(_) => CONTENT_TYPE_BINARY,
        }
    }
}
