use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use bridge_api::envelope::{CONTENT_TYPE_JSON, EVENT_TYPE};
use bridge_api::{Envelope, EventData, LogRecord, event_id};

// ═══════════════════════════════════════════════════════════════
//  Envelope Translator — LogRecord → Envelope
// ═══════════════════════════════════════════════════════════════

/// Перевести запись лога в envelope. Детерминированно, без состояния:
/// одинаковая запись всегда даёт одинаковый envelope.
pub fn translate(record: &LogRecord) -> Envelope {
    let mut extensions = BTreeMap::new();
    extensions.insert("key".to_string(), record.key_lossy().into_owned());

    Envelope {
        id: event_id(record.partition, record.offset),
        event_type: EVENT_TYPE.to_string(),
        source: record.topic.clone(),
        time: record.ts_ms.and_then(DateTime::<Utc>::from_timestamp_millis),
        content_type: CONTENT_TYPE_JSON.to_string(),
        extensions,
        data: decode_payload(record.partition, record.offset, &record.value),
    }
}

/// JSON object → `EventData::Json`; всё остальное (пустой payload,
/// битый JSON, JSON не-объект) → исходные байты без изменений.
/// Ошибка парсинга только логируется.
fn decode_payload(partition: i32, offset: i64, value: &[u8]) -> EventData {
    match serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(value) {
        Ok(object) => EventData::Json(serde_json::Value::Object(object)),
        Err(e) => {
            tracing::info!(partition, offset, error = %e, "payload is not a JSON object, passing raw bytes");
            EventData::Binary(value.to_vec())
        }
    }
}
