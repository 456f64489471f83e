use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::topic_partition_list::TopicPartitionList;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use bridge_api::{
    ClientError, LogConsumer, LogRecord, OffsetCommitter, PartitionAssignment, RecordStream,
};

use crate::config::KafkaConfig;
use crate::context::{BridgeContext, RebalanceEvent};
use crate::error::KafkaError;
use crate::record::to_record;

type GroupConsumer = StreamConsumer<BridgeContext>;

// ═══════════════════════════════════════════════════════════════
//  KafkaLogConsumer
// ═══════════════════════════════════════════════════════════════

/// Group member of one topic. A single poll loop reads the subscription
/// and fans records out to per-partition streams; each partition assigned
/// by a rebalance is announced once through [`LogConsumer::next_partition`].
pub struct KafkaLogConsumer {
    consumer: Arc<GroupConsumer>,
    assignments: mpsc::UnboundedReceiver<PartitionAssignment>,
    token: CancellationToken,
    poll_loop: Option<JoinHandle<()>>,
}

impl KafkaLogConsumer {
    /// Create the client, probe the topic's metadata, subscribe and start
    /// the poll loop. Any failure here is fatal for the process.
    pub async fn connect(config: &KafkaConfig) -> Result<Self, KafkaError> {
        config.validate()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let context = BridgeContext::new(config.topic.clone(), events_tx);
        let consumer: GroupConsumer = config.client_config().create_with_context(context)?;
        let consumer = Arc::new(consumer);

        let partitions = probe(&consumer, &config.topic, config.tuning.metadata_timeout()).await?;
        tracing::info!(topic = %config.topic, partitions, "topic metadata fetched");

        consumer.subscribe(&[config.topic.as_str()])?;
        tracing::info!(
            topic = %config.topic,
            group = %config.consumer_group,
            protocol = config.security_protocol(),
            "subscribed"
        );

        let (discovery_tx, discovery_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let router = Router {
            topic: config.topic.clone(),
            buffer: config.partition_buffer,
            consumer: consumer.clone(),
            discovery: discovery_tx,
            feeds: HashMap::new(),
        };
        let poll_loop = tokio::spawn(poll_loop(consumer.clone(), events_rx, router, token.clone()));

        Ok(Self {
            consumer,
            assignments: discovery_rx,
            token,
            poll_loop: Some(poll_loop),
        })
    }
}

/// Fetch the topic's metadata; an unreachable cluster or a missing topic
/// is an error. Returns the partition count.
async fn probe(consumer: &Arc<GroupConsumer>, topic: &str, timeout: Duration) -> Result<usize, KafkaError> {
    let client = consumer.clone();
    let name = topic.to_string();
    let metadata = tokio::task::spawn_blocking(move || client.fetch_metadata(Some(&name), timeout))
        .await
        .map_err(|e| KafkaError::Task(format!("metadata probe: {e}")))??;

    let found = metadata
        .topics()
        .iter()
        .find(|t| t.name() == topic)
        .ok_or_else(|| KafkaError::UnknownTopic(topic.to_string()))?;

    if let Some(err) = found.error() {
        return Err(KafkaError::Metadata {
            topic: topic.to_string(),
            reason: format!("{err:?}"),
        });
    }
    if found.partitions().is_empty() {
        return Err(KafkaError::UnknownTopic(topic.to_string()));
    }
    Ok(found.partitions().len())
}

impl LogConsumer for KafkaLogConsumer {
    fn next_partition(&mut self) -> Pin<Box<dyn Future<Output = Option<PartitionAssignment>> + Send + '_>> {
        Box::pin(async { self.assignments.recv().await })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>> {
        Box::pin(async move {
            self.token.cancel();
            if let Some(handle) = self.poll_loop.take() {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "poll loop failed");
                }
            }

            // Final flush of the stored offsets; the periodic auto-commit
            // may not have run since the last store.
            let consumer = self.consumer.clone();
            let result = tokio::task::spawn_blocking(move || consumer.commit_consumer_state(CommitMode::Sync))
                .await
                .map_err(|e| ClientError::logic(format!("final commit task: {e}")))?;

            match result {
                Ok(()) => tracing::info!("final offset commit done"),
                Err(e) if e.rdkafka_error_code() == Some(RDKafkaErrorCode::NoOffset) => {
                    tracing::debug!("no stored offsets to commit");
                }
                Err(e) => return Err(ClientError::from(KafkaError::from(e)).with_context("final commit")),
            }

            self.consumer.unsubscribe();
            tracing::info!("left consumer group");
            Ok(())
        })
    }
}

impl Drop for KafkaLogConsumer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

// ═══════════════════════════════════════════════════════════════
//  Poll loop — subscription → per-partition feeds
// ═══════════════════════════════════════════════════════════════

/// How often held-back records of paused partitions are offered again.
const BACKLOG_RETRY: Duration = Duration::from_millis(20);

async fn poll_loop(
    consumer: Arc<GroupConsumer>,
    mut events: mpsc::UnboundedReceiver<RebalanceEvent>,
    mut router: Router,
    token: CancellationToken,
) {
    let mut retry = tokio::time::interval(BACKLOG_RETRY);
    retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let record = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            Some(event) = events.recv() => {
                router.apply(event);
                continue;
            }
            _ = retry.tick(), if router.has_backlog() => {
                router.flush();
                continue;
            }
            message = consumer.recv() => match message {
                Ok(message) => to_record(&message),
                Err(e) if e.rdkafka_error_code() == Some(RDKafkaErrorCode::Fatal) => {
                    tracing::error!(error = %e, "fatal consumer error, closing partition discovery");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "consume error");
                    continue;
                }
            }
        };

        // Rebalance callbacks run inside recv(): apply them before routing
        // a record of a partition that was only just assigned.
        while let Ok(event) = events.try_recv() {
            router.apply(event);
        }
        router.route(record);
    }

    router.close();
    tracing::info!("poll loop stopped");
}

/// One open partition: the feeding side of its record stream.
///
/// When the worker's buffer is full, records are held back in `backlog`
/// (in offset order) and the partition's fetching is paused until the
/// backlog drains. The poll loop itself never waits on a worker.
struct Feed {
    tx: mpsc::Sender<LogRecord>,
    revoked: CancellationToken,
    backlog: VecDeque<LogRecord>,
}

#[derive(Debug, PartialEq, Eq)]
enum Push {
    Sent,
    /// First held-back record: the partition must be paused.
    Paused,
    Held,
    Closed,
}

#[derive(Debug, PartialEq, Eq)]
enum Flush {
    /// Backlog is empty: the partition can be resumed.
    Drained,
    Pending,
    Closed,
}

impl Feed {
    fn new(tx: mpsc::Sender<LogRecord>, revoked: CancellationToken) -> Self {
        Self { tx, revoked, backlog: VecDeque::new() }
    }

    fn is_paused(&self) -> bool {
        !self.backlog.is_empty()
    }

    fn push(&mut self, record: LogRecord) -> Push {
        if self.is_paused() {
            self.backlog.push_back(record);
            return Push::Held;
        }
        match self.tx.try_send(record) {
            Ok(()) => Push::Sent,
            Err(TrySendError::Full(record)) => {
                self.backlog.push_back(record);
                Push::Paused
            }
            Err(TrySendError::Closed(_)) => Push::Closed,
        }
    }

    fn flush(&mut self) -> Flush {
        while let Some(record) = self.backlog.pop_front() {
            match self.tx.try_send(record) {
                Ok(()) => {}
                Err(TrySendError::Full(record)) => {
                    self.backlog.push_front(record);
                    return Flush::Pending;
                }
                Err(TrySendError::Closed(_)) => return Flush::Closed,
            }
        }
        Flush::Drained
    }
}

struct Router {
    topic: String,
    buffer: usize,
    consumer: Arc<GroupConsumer>,
    discovery: mpsc::UnboundedSender<PartitionAssignment>,
    feeds: HashMap<i32, Feed>,
}

impl Router {
    fn apply(&mut self, event: RebalanceEvent) {
        match event {
            RebalanceEvent::Assign(partitions) => {
                for partition in partitions {
                    self.open(partition);
                }
            }
            RebalanceEvent::Revoke(partitions) => {
                for partition in partitions {
                    self.revoke(partition);
                }
            }
        }
    }

    fn open(&mut self, partition: i32) {
        if self.feeds.contains_key(&partition) {
            return;
        }

        let (tx, rx) = mpsc::channel(self.buffer);
        let revoked = CancellationToken::new();
        let assignment = PartitionAssignment {
            topic: self.topic.clone(),
            partition,
            records: Box::new(KafkaRecordStream { rx, revoked: revoked.clone() }),
            committer: Arc::new(KafkaCommitter {
                consumer: self.consumer.clone(),
                revoked: revoked.clone(),
            }),
        };

        if self.discovery.send(assignment).is_err() {
            tracing::debug!(partition, "partition discovery closed, assignment dropped");
            return;
        }
        self.feeds.insert(partition, Feed::new(tx, revoked));
    }

    fn revoke(&mut self, partition: i32) {
        if let Some(feed) = self.feeds.remove(&partition) {
            feed.revoked.cancel();
            if feed.is_paused() {
                // A pause outlives the assignment; the next owner starts unpaused.
                self.set_paused(partition, false);
            }
        }
    }

    fn has_backlog(&self) -> bool {
        self.feeds.values().any(Feed::is_paused)
    }

    fn route(&mut self, record: LogRecord) {
        let partition = record.partition;
        if !self.feeds.contains_key(&partition) {
            tracing::info!(partition, "record for unannounced partition, opening it");
            self.open(partition);
        }
        let Some(feed) = self.feeds.get_mut(&partition) else {
            return;
        };

        match feed.push(record) {
            Push::Sent | Push::Held => {}
            Push::Paused => {
                tracing::debug!(partition, "worker buffer full, pausing partition");
                self.set_paused(partition, true);
            }
            Push::Closed => {
                tracing::debug!(partition, "worker gone, closing feed");
                self.feeds.remove(&partition);
            }
        }
    }

    /// Offer held-back records again; resume partitions whose backlog drained.
    fn flush(&mut self) {
        let mut resumed = Vec::new();
        let mut closed = Vec::new();
        for (&partition, feed) in self.feeds.iter_mut().filter(|(_, feed)| feed.is_paused()) {
            match feed.flush() {
                Flush::Drained => resumed.push(partition),
                Flush::Pending => {}
                Flush::Closed => closed.push(partition),
            }
        }
        for partition in resumed {
            tracing::debug!(partition, "backlog drained, resuming partition");
            self.set_paused(partition, false);
        }
        for partition in closed {
            tracing::debug!(partition, "worker gone, closing feed");
            self.feeds.remove(&partition);
            self.set_paused(partition, false);
        }
    }

    fn set_paused(&self, partition: i32, paused: bool) {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition(&self.topic, partition);
        let result = if paused { self.consumer.pause(&tpl) } else { self.consumer.resume(&tpl) };
        if let Err(e) = result {
            tracing::warn!(partition, paused, error = %e, "partition pause/resume failed");
        }
    }

    fn close(&mut self) {
        // Dropping the senders ends each stream after its buffered records.
        self.feeds.clear();
    }
}

// ═══════════════════════════════════════════════════════════════
//  Per-partition stream and committer
// ═══════════════════════════════════════════════════════════════

struct KafkaRecordStream {
    rx: mpsc::Receiver<LogRecord>,
    revoked: CancellationToken,
}

impl RecordStream for KafkaRecordStream {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<LogRecord>> + Send + '_>> {
        Box::pin(async {
            tokio::select! {
                biased;
                // Buffered records of a revoked partition belong to its next owner.
                _ = self.revoked.cancelled() => None,
                record = self.rx.recv() => record,
            }
        })
    }
}

struct KafkaCommitter {
    consumer: Arc<GroupConsumer>,
    revoked: CancellationToken,
}

impl OffsetCommitter for KafkaCommitter {
    /// Stores `offset + 1` (the next offset to read); the client's
    /// auto-commit flushes it to the group coordinator.
    fn commit(&self, record: &LogRecord) -> Result<(), ClientError> {
        if self.revoked.is_cancelled() {
            return Err(ClientError::logic(format!(
                "partition {} revoked, offset {} not stored",
                record.partition, record.offset
            )));
        }
        self.consumer
            .store_offset(&record.topic, record.partition, record.offset + 1)
            .map_err(|e| ClientError::io(format!("store offset {}: {e}", record.offset)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(offset: i64) -> LogRecord {
        LogRecord::new("orders", 0, offset, "{}")
    }

    #[test]
    fn full_buffer_holds_records_in_order_and_drains() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut feed = Feed::new(tx, CancellationToken::new());

        assert_eq!(feed.push(record(0)), Push::Sent);
        assert_eq!(feed.push(record(1)), Push::Paused);
        assert_eq!(feed.push(record(2)), Push::Held);
        assert!(feed.is_paused());
        assert_eq!(feed.flush(), Flush::Pending);

        assert_eq!(rx.try_recv().unwrap().offset, 0);
        assert_eq!(feed.flush(), Flush::Pending);
        assert_eq!(rx.try_recv().unwrap().offset, 1);
        assert_eq!(feed.flush(), Flush::Drained);
        assert!(!feed.is_paused());
        assert_eq!(rx.try_recv().unwrap().offset, 2);

        assert_eq!(feed.push(record(3)), Push::Sent);
        assert_eq!(rx.try_recv().unwrap().offset, 3);
    }

    #[test]
    fn dropped_worker_closes_feed() {
        let (tx, rx) = mpsc::channel(1);
        let mut feed = Feed::new(tx, CancellationToken::new());
        assert_eq!(feed.push(record(0)), Push::Sent);
        assert_eq!(feed.push(record(1)), Push::Paused);

        drop(rx);
        assert_eq!(feed.flush(), Flush::Closed);
        assert_eq!(feed.push(record(2)), Push::Closed);
    }

    #[tokio::test]
    async fn revoked_stream_ends_before_buffered_records() {
        let (tx, rx) = mpsc::channel(4);
        let revoked = CancellationToken::new();
        let mut stream = KafkaRecordStream { rx, revoked: revoked.clone() };

        tx.send(record(0)).await.unwrap();
        assert_eq!(stream.recv().await.map(|r| r.offset), Some(0));

        tx.send(record(1)).await.unwrap();
        revoked.cancel();
        assert!(stream.recv().await.is_none());
    }
}
