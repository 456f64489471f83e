use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

use bridge_api::Envelope;
use bridge_api::envelope::SPEC_VERSION;

use crate::error::SinkError;

/// Percent-encode a header value for CloudEvents binary mode: printable
/// ASCII passes through, space, `"`, `%` and every other byte become `%XX`.
pub fn encode_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        match b {
            0x21..=0x7E if b != b'"' && b != b'%' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

fn value(name: &str, raw: &str) -> Result<HeaderValue, SinkError> {
    HeaderValue::from_str(&encode_value(raw)).map_err(|e| SinkError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// Event attributes as `ce-*` headers plus `content-type` of the body.
pub fn binary_headers(envelope: &Envelope) -> Result<HeaderMap, SinkError> {
    let mut map = HeaderMap::new();
    map.insert("ce-specversion", HeaderValue::from_static(SPEC_VERSION));
    map.insert("ce-id", value("ce-id", &envelope.id)?);
    map.insert("ce-type", value("ce-type", &envelope.event_type)?);
    map.insert("ce-source", value("ce-source", &envelope.source)?);
    if let Some(time) = envelope.time_rfc3339() {
        map.insert("ce-time", value("ce-time", &time)?);
    }

    for (name, raw) in &envelope.extensions {
        let header = format!("ce-{}", name.to_ascii_lowercase());
        let header_name = HeaderName::from_bytes(header.as_bytes()).map_err(|e| SinkError::InvalidHeader {
            name: header.clone(),
            reason: e.to_string(),
        })?;
        map.insert(header_name, value(&header, raw)?);
    }

    map.insert(CONTENT_TYPE, value("content-type", envelope.body_content_type())?);
    Ok(map)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use bridge_api::EventData;
    use bridge_api::envelope::{CONTENT_TYPE_JSON, EVENT_TYPE};

    use super::*;

    fn envelope(data: EventData, key: &str) -> Envelope {
        Envelope {
            id: "partition:0/offset:42".into(),
            event_type: EVENT_TYPE.into(),
            source: "orders".into(),
            time: None,
            content_type: CONTENT_TYPE_JSON.into(),
            extensions: BTreeMap::from([("key".to_string(), key.to_string())]),
            data,
        }
    }

    #[test]
    fn encodes_only_what_headers_cannot_carry() {
        assert_eq!(encode_value("partition:0/offset:42"), "partition:0/offset:42");
        assert_eq!(encode_value("a b"), "a%20b");
        assert_eq!(encode_value("100%\""), "100%25%22");
        assert_eq!(encode_value("ключ"), "%D0%BA%D0%BB%D1%8E%D1%87");
        assert_eq!(encode_value(""), "");
    }

    #[test]
    fn json_event_headers() {
        let headers = binary_headers(&envelope(EventData::Json(serde_json::json!({"a": 1})), "user 7")).unwrap();

        assert_eq!(headers["ce-specversion"], "1.0");
        assert_eq!(headers["ce-id"], "partition:0/offset:42");
        assert_eq!(headers["ce-type"], "dev.knative.kafka.event");
        assert_eq!(headers["ce-source"], "orders");
        assert_eq!(headers["ce-key"], "user%207");
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert!(headers.get("ce-time").is_none());
    }

    #[test]
    fn binary_event_uses_octet_stream_and_time() {
        let mut env = envelope(EventData::Binary(b"not-json".to_vec()), "");
        env.time = chrono::DateTime::from_timestamp_millis(1_700_000_000_123);

        let headers = binary_headers(&env).unwrap();
        assert_eq!(headers[CONTENT_TYPE], "application/octet-stream");
        assert_eq!(headers["ce-time"], "2023-11-14T22:13:20.123Z");
        assert_eq!(headers["ce-key"], "");
    }
}
