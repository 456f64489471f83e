use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use bridge_api::{LogConsumer, PartitionAssignment, SinkClient};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::sink::LazySink;
use crate::worker::{PartitionWorker, WorkerReport};

/// Почему supervisor вышел из discovery loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Получен сигнал отмены.
    Cancelled,
    /// Discovery-канал закрыт: consumer покинул группу или соединение разорвано.
    ConsumerClosed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Cancelled => f.write_str("cancelled"),
            StopReason::ConsumerClosed => f.write_str("consumer closed"),
        }
    }
}

/// Per-partition cancellation + join handle.
struct WorkerSlot {
    token: CancellationToken,
    handle: JoinHandle<WorkerReport>,
}

// ═══════════════════════════════════════════════════════════════
//  Adapter Supervisor — discovery loop + partition worker set
// ═══════════════════════════════════════════════════════════════

/// Владеет настройками pipeline и общим sink client'ом, запускает по
/// одному worker'у на каждую назначенную партицию.
#[derive(Debug)]
pub struct Supervisor {
    config: PipelineConfig,
    sink: LazySink,
}

impl Supervisor {
    pub fn new(config: PipelineConfig, sink: LazySink) -> Result<Self, PipelineError> {
        config.validate().map_err(PipelineError::Config)?;
        Ok(Self { config, sink })
    }

    /// Discovery loop: каждая новая партиция → свой worker.
    ///
    /// Завершается по `token` или при закрытии discovery-канала; в обоих
    /// случаях worker'ы получают отмену и дожидаются (не дольше
    /// `shutdown_grace_ms`), после чего возвращается причина остановки.
    /// Sink client создаётся при первой назначенной партиции; ошибка его
    /// создания останавливает supervisor.
    pub async fn run(
        &self,
        consumer: &mut dyn LogConsumer,
        token: CancellationToken,
    ) -> Result<StopReason, PipelineError> {
        let mut workers: HashMap<i32, WorkerSlot> = HashMap::new();

        let outcome = loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::info!("shutting down...");
                    break Ok(StopReason::Cancelled);
                }
                assignment = consumer.next_partition() => match assignment {
                    Some(assignment) => {
                        let sink = match self.sink.get().await {
                            Ok(sink) => sink,
                            Err(e) => {
                                tracing::error!(partition = assignment.partition, error = %e, "sink client init failed");
                                break Err(PipelineError::SinkInit(e));
                            }
                        };
                        self.spawn_worker(&mut workers, assignment, &sink, &token).await;
                    }
                    None => {
                        tracing::warn!("partition discovery closed by consumer");
                        break Ok(StopReason::ConsumerClosed);
                    }
                }
            }
        };

        self.drain(workers).await;
        outcome
    }

    async fn spawn_worker(
        &self,
        workers: &mut HashMap<i32, WorkerSlot>,
        assignment: PartitionAssignment,
        sink: &Arc<dyn SinkClient>,
        token: &CancellationToken,
    ) {
        workers.retain(|_, slot| !slot.handle.is_finished());

        let partition = assignment.partition;
        let topic = assignment.topic.clone();

        // Не больше одного worker'а на партицию: предыдущий (после revoke)
        // должен закончить доставку в полёте до старта нового.
        if let Some(previous) = workers.remove(&partition) {
            tracing::info!(partition, "waiting for previous worker of reassigned partition");
            previous.token.cancel();
            if let Err(e) = previous.handle.await {
                tracing::error!(partition, error = %e, "previous worker failed");
            }
        }

        let worker_token = token.child_token();
        let worker = PartitionWorker::new(
            assignment,
            sink.clone(),
            self.config.commit_policy,
            self.config.backoff(),
            worker_token.clone(),
        );
        let span = tracing::info_span!("partition", %topic, partition);
        let handle = tokio::spawn(worker.run().instrument(span));

        tracing::info!(%topic, partition, "partition assigned, worker spawned");
        workers.insert(partition, WorkerSlot { token: worker_token, handle });
    }

    async fn drain(&self, workers: HashMap<i32, WorkerSlot>) {
        for slot in workers.values() {
            slot.token.cancel();
        }

        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace();
        for (partition, mut slot) in workers {
            match tokio::time::timeout_at(deadline, &mut slot.handle).await {
                Ok(Ok(report)) => {
                    tracing::debug!(partition, delivered = report.delivered, failed = report.failed, "worker joined");
                }
                Ok(Err(e)) => tracing::error!(partition, error = %e, "worker failed"),
                Err(_) => {
                    tracing::warn!(partition, "worker did not stop in time, aborting");
                    slot.handle.abort();
                }
            }
        }
        tracing::info!("all partition workers stopped");
    }
}
