use rdkafka::Message;

use bridge_api::LogRecord;

/// Copy a consumed message out of the client's buffer.
///
/// A missing payload becomes an empty value; a broker timestamp of
/// "not available" becomes `None`.
pub fn to_record<M: Message>(message: &M) -> LogRecord {
    LogRecord {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(<[u8]>::to_vec),
        value: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        ts_ms: message.timestamp().to_millis(),
    }
}
