use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use bridge_api::{ClientError, DeliveryReceipt, Envelope, EventData, SinkClient};
use pipeline::memory::{MemoryLog, MemoryLogHandle};
use pipeline::{CommitPolicy, LazySink, PipelineConfig, PipelineError, StopReason, Supervisor};

// ═══════════════════════════════════════════════════════════════
//  Recording sink
// ═══════════════════════════════════════════════════════════════

/// One delivery attempt as seen by the sink.
#[derive(Debug, Clone, PartialEq)]
struct Seen {
    partition: i32,
    offset: i64,
    /// Commit cursor of the partition at the moment of the attempt.
    cursor: Option<i64>,
    data: EventData,
}

struct RecordingSink {
    log: MemoryLogHandle,
    /// offset → remaining failures (usize::MAX = fail forever).
    failures: Mutex<HashMap<i64, usize>>,
    gate: Option<Arc<Semaphore>>,
    /// Simulated sink latency of every attempt.
    latency: Duration,
    entered: AtomicUsize,
    seen: Mutex<Vec<Seen>>,
}

impl RecordingSink {
    fn new(log: MemoryLogHandle) -> Self {
        Self {
            log,
            failures: Mutex::new(HashMap::new()),
            gate: None,
            latency: Duration::ZERO,
            entered: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn failing(self, offset: i64, times: usize) -> Self {
        self.failures.lock().unwrap().insert(offset, times);
        self
    }

    fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn slow(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    fn offsets(&self, partition: i32) -> Vec<i64> {
        self.seen().into_iter().filter(|s| s.partition == partition).map(|s| s.offset).collect()
    }
}

fn position(id: &str) -> (i32, i64) {
    let (p, o) = id.split_once('/').expect("id has two parts");
    let p = p.strip_prefix("partition:").unwrap().parse().unwrap();
    let o = o.strip_prefix("offset:").unwrap().parse().unwrap();
    (p, o)
}

impl SinkClient for RecordingSink {
    fn deliver<'a>(
        &'a self,
        envelope: &'a Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryReceipt, ClientError>> + Send + 'a>> {
        Box::pin(async move {
            self.entered.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.acquire().await.map_err(|_| ClientError::logic("gate closed"))?.forget();
            }
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            let (partition, offset) = position(&envelope.id);
            self.seen.lock().unwrap().push(Seen {
                partition,
                offset,
                cursor: self.log.committed(partition),
                data: envelope.data.clone(),
            });

            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(&offset) {
                Some(left) if *left > 0 => {
                    if *left != usize::MAX {
                        *left -= 1;
                    }
                    Err(ClientError::rejected(500, "boom"))
                }
                _ => Ok(DeliveryReceipt { status: 202 }),
            }
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Helpers
// ═══════════════════════════════════════════════════════════════

fn config(policy: CommitPolicy) -> PipelineConfig {
    PipelineConfig {
        commit_policy: policy,
        retry_initial_backoff_ms: 1,
        retry_max_backoff_ms: 4,
        shutdown_grace_ms: 2_000,
        ..PipelineConfig::default()
    }
}

fn spawn_supervisor(
    mut log: MemoryLog,
    sink: Arc<RecordingSink>,
    cfg: PipelineConfig,
    token: CancellationToken,
) -> JoinHandle<Result<StopReason, PipelineError>> {
    let lazy = LazySink::new(move || Ok(sink.clone() as Arc<dyn SinkClient>));
    let supervisor = Supervisor::new(cfg, lazy).unwrap();
    tokio::spawn(async move { supervisor.run(&mut log, token).await })
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn delivers_each_partition_in_order_and_commits_before_next() {
    let log = MemoryLog::new("orders");
    let handle = log.handle();
    let sink = Arc::new(RecordingSink::new(handle.clone()));

    for i in 0..4 {
        handle.append(0, Some(b"k0"), format!("{{\"n\":{i}}}").as_bytes());
    }
    for i in 0..3 {
        handle.append(1, None, format!("{{\"n\":{i}}}").as_bytes());
    }

    let token = CancellationToken::new();
    let task = spawn_supervisor(log, sink.clone(), config(CommitPolicy::Always), token.clone());

    wait_until("all commits", || handle.commits().len() == 7).await;
    token.cancel();
    assert_eq!(task.await.unwrap().unwrap(), StopReason::Cancelled);

    assert_eq!(sink.offsets(0), vec![0, 1, 2, 3]);
    assert_eq!(sink.offsets(1), vec![0, 1, 2]);
    for seen in sink.seen() {
        let expected_cursor = if seen.offset == 0 { None } else { Some(seen.offset - 1) };
        assert_eq!(seen.cursor, expected_cursor, "attempt {seen:?}");
        assert_eq!(seen.data, EventData::Json(serde_json::json!({"n": seen.offset})));
    }
    assert_eq!(handle.committed(0), Some(3));
    assert_eq!(handle.committed(1), Some(2));
}

#[tokio::test]
async fn failed_delivery_is_committed_and_does_not_block_next_record() {
    let log = MemoryLog::new("orders");
    let handle = log.handle();
    let sink = Arc::new(RecordingSink::new(handle.clone()).failing(1, usize::MAX));

    handle.append(2, None, b"{\"a\":1}");
    handle.append(2, None, b"not-json");
    handle.append(2, None, b"{\"a\":3}");

    let token = CancellationToken::new();
    let task = spawn_supervisor(log, sink.clone(), config(CommitPolicy::Always), token.clone());

    wait_until("three commits", || handle.commits().len() == 3).await;
    token.cancel();
    task.await.unwrap().unwrap();

    assert_eq!(sink.offsets(2), vec![0, 1, 2]);
    assert_eq!(handle.commits(), vec![(2, 0), (2, 1), (2, 2)]);
    assert_eq!(sink.seen()[1].data, EventData::Binary(b"not-json".to_vec()));
}

#[tokio::test]
async fn on_success_retries_until_accepted_before_commit() {
    let log = MemoryLog::new("orders");
    let handle = log.handle();
    let sink = Arc::new(RecordingSink::new(handle.clone()).failing(0, 2));

    handle.append(0, None, b"{}");
    handle.append(0, None, b"{}");

    let token = CancellationToken::new();
    let task = spawn_supervisor(log, sink.clone(), config(CommitPolicy::OnSuccess), token.clone());

    wait_until("two commits", || handle.commits().len() == 2).await;
    token.cancel();
    task.await.unwrap().unwrap();

    // three attempts for offset 0, none of them after a commit
    assert_eq!(sink.offsets(0), vec![0, 0, 0, 1]);
    assert!(sink.seen()[..3].iter().all(|s| s.cursor.is_none()));
    assert_eq!(handle.commits(), vec![(0, 0), (0, 1)]);
}

#[tokio::test]
async fn on_success_shutdown_leaves_failing_offset_uncommitted() {
    let log = MemoryLog::new("orders");
    let handle = log.handle();
    let sink = Arc::new(RecordingSink::new(handle.clone()).failing(0, usize::MAX));

    handle.append(0, None, b"{}");

    let token = CancellationToken::new();
    let task = spawn_supervisor(log, sink.clone(), config(CommitPolicy::OnSuccess), token.clone());

    wait_until("a few retries", || sink.entered.load(Ordering::SeqCst) >= 3).await;
    token.cancel();
    assert_eq!(task.await.unwrap().unwrap(), StopReason::Cancelled);

    assert!(handle.commits().is_empty());
    assert_eq!(handle.committed(0), None);
}

#[tokio::test]
async fn cancellation_lets_in_flight_delivery_finish_and_stops_there() {
    let log = MemoryLog::new("orders");
    let handle = log.handle();
    let gate = Arc::new(Semaphore::new(0));
    let sink = Arc::new(RecordingSink::new(handle.clone()).gated(gate.clone()));

    for _ in 0..3 {
        handle.append(0, None, b"{\"x\":true}");
    }

    let token = CancellationToken::new();
    let task = spawn_supervisor(log, sink.clone(), config(CommitPolicy::Always), token.clone());

    wait_until("first delivery in flight", || sink.entered.load(Ordering::SeqCst) == 1).await;
    token.cancel();
    gate.add_permits(10);

    assert_eq!(task.await.unwrap().unwrap(), StopReason::Cancelled);
    assert_eq!(sink.offsets(0), vec![0]);
    assert_eq!(handle.commits(), vec![(0, 0)]);
}

#[tokio::test]
async fn consumer_close_is_reported_as_stop_reason() {
    let log = MemoryLog::new("orders");
    let handle = log.handle();
    let sink = Arc::new(RecordingSink::new(handle.clone()));

    handle.append(0, None, b"{}");

    let task = spawn_supervisor(log, sink.clone(), config(CommitPolicy::Always), CancellationToken::new());

    wait_until("first commit", || handle.commits().len() == 1).await;
    handle.close();
    assert_eq!(task.await.unwrap().unwrap(), StopReason::ConsumerClosed);
}

#[tokio::test]
async fn reassigned_partition_resumes_with_new_worker() {
    let log = MemoryLog::new("orders");
    let handle = log.handle();
    let sink = Arc::new(RecordingSink::new(handle.clone()));

    handle.append(5, None, b"{}");
    handle.append(5, None, b"{}");

    let token = CancellationToken::new();
    let task = spawn_supervisor(log, sink.clone(), config(CommitPolicy::Always), token.clone());

    wait_until("first batch", || handle.commits().len() == 2).await;
    handle.revoke(5);
    handle.append(5, None, b"{}");

    wait_until("after reassignment", || handle.commits().len() == 3).await;
    token.cancel();
    task.await.unwrap().unwrap();

    assert_eq!(sink.offsets(5), vec![0, 1, 2]);
    assert_eq!(handle.committed(5), Some(2));
}

#[tokio::test]
async fn reassigned_partition_waits_for_in_flight_delivery_of_previous_worker() {
    let log = MemoryLog::new("orders");
    let handle = log.handle();
    let gate = Arc::new(Semaphore::new(0));
    let sink = Arc::new(RecordingSink::new(handle.clone()).gated(gate.clone()));

    handle.append(5, None, b"{}");

    let token = CancellationToken::new();
    let task = spawn_supervisor(log, sink.clone(), config(CommitPolicy::Always), token.clone());

    wait_until("offset 0 in flight", || sink.entered.load(Ordering::SeqCst) == 1).await;
    handle.revoke(5);
    handle.append(5, None, b"{}");

    // The new owner must not start while offset 0 is still being delivered.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sink.entered.load(Ordering::SeqCst), 1);
    assert!(handle.commits().is_empty());

    gate.add_permits(10);
    wait_until("offset 1 committed", || handle.commits().len() == 2).await;
    token.cancel();
    task.await.unwrap().unwrap();

    let seen = sink.seen();
    assert_eq!(sink.offsets(5), vec![0, 1]);
    assert_eq!(seen[1].cursor, Some(0), "offset 1 attempted before offset 0 was committed");
    assert_eq!(handle.commits(), vec![(5, 0), (5, 1)]);
}

#[tokio::test(start_paused = true)]
async fn default_grace_lets_slow_in_flight_delivery_finish() {
    let log = MemoryLog::new("orders");
    let handle = log.handle();
    // Just under the sink's default request timeout.
    let sink = Arc::new(RecordingSink::new(handle.clone()).slow(Duration::from_secs(9)));

    handle.append(0, None, b"{}");
    handle.append(0, None, b"{}");

    let token = CancellationToken::new();
    let task = spawn_supervisor(log, sink.clone(), PipelineConfig::default(), token.clone());

    wait_until("first delivery in flight", || sink.entered.load(Ordering::SeqCst) == 1).await;
    token.cancel();

    assert_eq!(task.await.unwrap().unwrap(), StopReason::Cancelled);
    assert_eq!(sink.offsets(0), vec![0]);
    assert_eq!(handle.commits(), vec![(0, 0)]);
}

#[tokio::test]
async fn sink_is_created_on_first_assignment() {
    let mut log = MemoryLog::new("orders");
    let handle = log.handle();
    let calls = Arc::new(AtomicUsize::new(0));
    let sink = Arc::new(RecordingSink::new(handle.clone()));

    let counter = calls.clone();
    let lazy = LazySink::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(sink.clone() as Arc<dyn SinkClient>)
    });
    let supervisor = Supervisor::new(config(CommitPolicy::Always), lazy).unwrap();
    let task = tokio::spawn(async move { supervisor.run(&mut log, CancellationToken::new()).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    handle.append(0, None, b"{}");
    handle.append(1, None, b"{}");
    wait_until("both partitions committed", || handle.commits().len() == 2).await;
    handle.close();

    assert_eq!(task.await.unwrap().unwrap(), StopReason::ConsumerClosed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sink_init_failure_is_fatal() {
    let mut log = MemoryLog::new("orders");
    log.handle().append(0, None, b"{}");
    let lazy = LazySink::new(|| Err(ClientError::config("invalid sink uri")));
    let supervisor = Supervisor::new(PipelineConfig::default(), lazy).unwrap();

    let err = supervisor.run(&mut log, CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, PipelineError::SinkInit(_)), "{err}");
}

#[tokio::test]
async fn invalid_pipeline_config_is_rejected() {
    let lazy = LazySink::new(|| Err(ClientError::config("unused")));
    let cfg = PipelineConfig { partition_buffer: 0, ..PipelineConfig::default() };
    assert!(matches!(Supervisor::new(cfg, lazy), Err(PipelineError::Config(_))));
}
