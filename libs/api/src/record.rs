use std::borrow::Cow;

/// One entry read from a log partition. Immutable once read.
///
/// `offset` grows monotonically within a partition and is unique there;
/// `(partition, offset)` identifies the record within its topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Topic the record was read from.
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Optional record key, opaque bytes.
    pub key: Option<Vec<u8>>,
    /// Opaque payload bytes. Empty when the record has no payload.
    pub value: Vec<u8>,
    /// Timestamp in milliseconds (Unix epoch), if the broker supplied one.
    pub ts_ms: Option<i64>,
}

impl LogRecord {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, value: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            value: value.into(),
            ts_ms: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_ts_ms(mut self, ts_ms: i64) -> Self {
        self.ts_ms = Some(ts_ms);
        self
    }

    /// Payload rendered as text for logging. Invalid UTF-8 is replaced.
    pub fn value_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }

    /// Key rendered as text; empty when the record has no key.
    pub fn key_lossy(&self) -> Cow<'_, str> {
        match &self.key {
            Some(key) => String::from_utf8_lossy(key),
            None => Cow::Borrowed(""),
        }
    }
}
