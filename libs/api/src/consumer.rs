use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::ClientError;
use crate::record::LogRecord;

/// Ordered stream of records of one assigned partition.
pub trait RecordStream: Send {
    /// Next record, in strictly increasing offset order.
    /// None = partition revoked or consumer closed.
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<LogRecord>> + Send + '_>>;
}

/// Commit cursor of one partition.
pub trait OffsetCommitter: Send + Sync {
    /// Mark `record.offset` as processed. Asynchronous and best effort:
    /// the cursor is flushed by the client, not necessarily before exit.
    fn commit(&self, record: &LogRecord) -> Result<(), ClientError>;
}

/// A partition handed to this group member by a rebalance.
pub struct PartitionAssignment {
    pub topic: String,
    pub partition: i32,
    pub records: Box<dyn RecordStream>,
    pub committer: Arc<dyn OffsetCommitter>,
}

impl fmt::Debug for PartitionAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionAssignment")
            .field("topic", &self.topic)
            .field("partition", &self.partition)
            .finish_non_exhaustive()
    }
}

/// Group-coordinated consumer of a partitioned log.
///
/// Implementations: Kafka (`kafka-consumer`), in-memory (`pipeline::memory`).
pub trait LogConsumer: Send {
    /// Wait for the next newly assigned partition.
    /// None = member left the group or the connection was torn down.
    fn next_partition(&mut self) -> Pin<Box<dyn Future<Output = Option<PartitionAssignment>> + Send + '_>>;

    /// Leave the group, flushing the commit cursors that can still be flushed.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>>;
}
