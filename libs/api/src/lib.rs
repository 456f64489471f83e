pub mod consumer;
pub mod envelope;
pub mod error;
pub mod record;
pub mod sink;

pub use consumer::{LogConsumer, OffsetCommitter, PartitionAssignment, RecordStream};
pub use envelope::{Envelope, EventData, event_id};
pub use error::{ClientError, ErrorKind};
pub use record::LogRecord;
pub use sink::{DeliveryReceipt, SinkClient};
