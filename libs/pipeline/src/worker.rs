use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use bridge_api::{Envelope, LogRecord, OffsetCommitter, PartitionAssignment, SinkClient};

use crate::config::{Backoff, CommitPolicy};
use crate::translator::translate;

/// Итог работы worker'а одной партиции.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerReport {
    pub partition: i32,
    /// Записи, принятые sink'ом.
    pub delivered: u64,
    /// Записи, доставка которых упала (и не была повторена).
    pub failed: u64,
    /// Последний offset, переданный в commit.
    pub last_committed: Option<i64>,
}

enum Attempt {
    Delivered,
    Failed,
    /// Повторы прерваны отменой: offset не коммитим.
    Abandoned,
}

// ═══════════════════════════════════════════════════════════════
//  Partition Worker — record stream → translate → deliver → commit
// ═══════════════════════════════════════════════════════════════

/// Обрабатывает одну партицию строго по порядку offset'ов:
/// следующая запись читается только после того, как попытка доставки
/// предыдущей завершилась и её commit выполнен.
pub struct PartitionWorker {
    assignment: PartitionAssignment,
    delivery: Delivery,
}

/// Shared-часть worker'а: sink + политика. Всё внутри Sync, поэтому
/// ссылку можно держать через await внутри spawned task.
struct Delivery {
    sink: Arc<dyn SinkClient>,
    policy: CommitPolicy,
    backoff: Backoff,
    token: CancellationToken,
}

impl PartitionWorker {
    pub fn new(
        assignment: PartitionAssignment,
        sink: Arc<dyn SinkClient>,
        policy: CommitPolicy,
        backoff: Backoff,
        token: CancellationToken,
    ) -> Self {
        Self {
            assignment,
            delivery: Delivery { sink, policy, backoff, token },
        }
    }

    /// Крутит цикл до закрытия record stream (revoke) или отмены.
    /// Отмена наблюдается только между записями: доставка в полёте
    /// доводится до конца.
    pub async fn run(self) -> WorkerReport {
        let PartitionWorker { assignment, delivery } = self;
        let PartitionAssignment { partition, mut records, committer, .. } = assignment;
        let mut report = WorkerReport { partition, ..WorkerReport::default() };

        tracing::info!(policy = %delivery.policy, "partition worker started");

        loop {
            let record = tokio::select! {
                biased;
                _ = delivery.token.cancelled() => {
                    tracing::info!("cancellation requested, stopping");
                    break;
                }
                record = records.recv() => match record {
                    Some(record) => record,
                    None => {
                        tracing::info!("record stream closed");
                        break;
                    }
                }
            };

            tracing::debug!(offset = record.offset, value = %record.value_lossy(), "received");

            let envelope = translate(&record);
            match delivery.attempt(&envelope).await {
                Attempt::Delivered => report.delivered += 1,
                Attempt::Failed => report.failed += 1,
                Attempt::Abandoned => {
                    tracing::info!(offset = record.offset, "delivery abandoned on shutdown, offset not committed");
                    break;
                }
            }

            commit(committer.as_ref(), &record, &mut report);
        }

        tracing::info!(
            delivered = report.delivered,
            failed = report.failed,
            last_committed = ?report.last_committed,
            "partition worker finished"
        );
        report
    }
}

impl Delivery {
    async fn attempt(&self, envelope: &Envelope) -> Attempt {
        let mut retry = 0u32;
        loop {
            match self.sink.deliver(envelope).await {
                Ok(receipt) => {
                    tracing::debug!(id = %envelope.id, status = receipt.status, "delivered");
                    return Attempt::Delivered;
                }
                Err(e) => {
                    tracing::error!(id = %envelope.id, error = %e, retry, "sending event to sink failed");
                    if self.policy == CommitPolicy::Always {
                        return Attempt::Failed;
                    }
                }
            }

            let delay = self.backoff.delay(retry);
            retry = retry.saturating_add(1);
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return Attempt::Abandoned,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn commit(committer: &dyn OffsetCommitter, record: &LogRecord, report: &mut WorkerReport) {
    match committer.commit(record) {
        Ok(()) => report.last_committed = Some(record.offset),
        Err(e) => {
            tracing::warn!(offset = record.offset, error = %e, "offset commit failed");
        }
    }
}
