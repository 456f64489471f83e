use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use bridge_api::{
    ClientError, LogConsumer, LogRecord, OffsetCommitter, PartitionAssignment, RecordStream,
};

// ═══════════════════════════════════════════════════════════════
//  MemoryLog — in-memory LogConsumer
// ═══════════════════════════════════════════════════════════════

/// In-memory log of one topic. Partitions are assigned, fed and revoked
/// by hand through [`MemoryLogHandle`]; every commit is recorded.
pub struct MemoryLog {
    assignments: mpsc::UnboundedReceiver<PartitionAssignment>,
    handle: MemoryLogHandle,
}

/// Control side of a [`MemoryLog`]. Cheap to clone.
#[derive(Clone)]
pub struct MemoryLogHandle {
    shared: Arc<Shared>,
}

struct Shared {
    topic: String,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    discovery: Option<mpsc::UnboundedSender<PartitionAssignment>>,
    feeds: HashMap<i32, mpsc::UnboundedSender<LogRecord>>,
    next_offset: HashMap<i32, i64>,
    commits: Vec<(i32, i64)>,
    cursors: HashMap<i32, i64>,
}

impl MemoryLog {
    pub fn new(topic: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = State { discovery: Some(tx), ..State::default() };
        let shared = Arc::new(Shared { topic: topic.into(), state: Mutex::new(state) });
        Self {
            assignments: rx,
            handle: MemoryLogHandle { shared },
        }
    }

    pub fn handle(&self) -> MemoryLogHandle {
        self.handle.clone()
    }
}

impl LogConsumer for MemoryLog {
    fn next_partition(&mut self) -> Pin<Box<dyn Future<Output = Option<PartitionAssignment>> + Send + '_>> {
        Box::pin(async { self.assignments.recv().await })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>> {
        Box::pin(async {
            self.handle.close();
            Ok(())
        })
    }
}

impl MemoryLogHandle {
    fn state(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn topic(&self) -> &str {
        &self.shared.topic
    }

    /// Назначить партицию этому consumer'у (как после rebalance).
    /// Повторное назначение без revoke: no-op. Возвращает false, если лог закрыт.
    pub fn assign(&self, partition: i32) -> bool {
        let mut state = self.state();
        if state.feeds.contains_key(&partition) {
            return true;
        }
        let Some(discovery) = state.discovery.clone() else {
            return false;
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let assignment = PartitionAssignment {
            topic: self.shared.topic.clone(),
            partition,
            records: Box::new(MemoryRecordStream { rx }),
            committer: Arc::new(MemoryCommitter { handle: self.clone() }),
        };
        if discovery.send(assignment).is_err() {
            return false;
        }
        state.feeds.insert(partition, tx);
        state.next_offset.entry(partition).or_insert(0);
        true
    }

    /// Дописать запись в партицию; offset выдаётся последовательно.
    /// Партиция назначается автоматически. Возвращает присвоенный offset.
    pub fn append(&self, partition: i32, key: Option<&[u8]>, value: &[u8]) -> Option<i64> {
        if !self.assign(partition) {
            return None;
        }
        let mut state = self.state();
        let offset = {
            let next = state.next_offset.entry(partition).or_insert(0);
            let offset = *next;
            *next += 1;
            offset
        };

        let mut record = LogRecord::new(self.shared.topic.clone(), partition, offset, value.to_vec());
        record.key = key.map(<[u8]>::to_vec);
        record.ts_ms = Some(1_700_000_000_000 + offset);

        let feed = state.feeds.get(&partition)?;
        feed.send(record).ok()?;
        Some(offset)
    }

    /// Отозвать партицию: её record stream закрывается после уже
    /// отправленных записей.
    pub fn revoke(&self, partition: i32) {
        self.state().feeds.remove(&partition);
    }

    /// Закрыть discovery-канал и все record stream'ы.
    pub fn close(&self) {
        let mut state = self.state();
        state.discovery = None;
        state.feeds.clear();
    }

    /// Все commit'ы в порядке поступления: (partition, offset).
    pub fn commits(&self) -> Vec<(i32, i64)> {
        self.state().commits.clone()
    }

    /// Commit cursor партиции (последний закоммиченный offset).
    pub fn committed(&self, partition: i32) -> Option<i64> {
        self.state().cursors.get(&partition).copied()
    }
}

struct MemoryRecordStream {
    rx: mpsc::UnboundedReceiver<LogRecord>,
}

impl RecordStream for MemoryRecordStream {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<LogRecord>> + Send + '_>> {
        Box::pin(async { self.rx.recv().await })
    }
}

struct MemoryCommitter {
    handle: MemoryLogHandle,
}

impl OffsetCommitter for MemoryCommitter {
    fn commit(&self, record: &LogRecord) -> Result<(), ClientError> {
        let mut state = self.handle.state();
        if let Some(&current) = state.cursors.get(&record.partition) {
            if record.offset < current {
                return Err(ClientError::logic(format!(
                    "partition {}: commit of offset {} behind cursor {current}",
                    record.partition, record.offset
                )));
            }
        }
        state.commits.push((record.partition, record.offset));
        state.cursors.insert(record.partition, record.offset);
        Ok(())
    }
}
