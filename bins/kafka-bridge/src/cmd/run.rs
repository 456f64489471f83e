use std::sync::Arc;

use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use bridge_api::{LogConsumer, SinkClient};
use http_sink::HttpSink;
use kafka_consumer::KafkaLogConsumer;
use pipeline::{LazySink, StopReason, Supervisor};

use crate::config::Effective;
use crate::error::AdapterError;

pub async fn run(eff: Effective) -> Result<(), AdapterError> {
    tracing::info!(
        brokers = ?eff.kafka.brokers,
        topic = %eff.kafka.topic,
        group = %eff.kafka.consumer_group,
        sink = %eff.sink.uri,
        net = ?eff.kafka.net,
        pipeline = ?eff.pipeline,
        "kafka-bridge starting"
    );

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();
    let signals = shutdown_on_signal(token.clone())?;

    // --- Log consumer: probe + subscribe (fatal on failure) ---
    let mut consumer = KafkaLogConsumer::connect(&eff.kafka).await?;

    // --- Sink client: created on first use, shared by all workers ---
    let sink_cfg = eff.sink.clone();
    let sink = LazySink::new(move || {
        let sink = HttpSink::new(&sink_cfg)?;
        tracing::info!(uri = %sink.uri(), timeout_ms = sink_cfg.timeout_ms, "http sink ready");
        Ok(Arc::new(sink) as Arc<dyn SinkClient>)
    });

    let supervisor = Supervisor::new(eff.pipeline.clone(), sink)?;
    tracing::info!("kafka-bridge started, waiting for partition assignments");

    let result = supervisor.run(&mut consumer, token.clone()).await;

    // Workers are stopped at this point: flush the last stored offsets.
    if let Err(e) = consumer.close().await {
        tracing::warn!(error = %e, "consumer close failed");
    }
    token.cancel();
    if let Err(e) = signals.await {
        tracing::error!(error = %e, "signal handler task failed");
    }

    match result? {
        StopReason::Cancelled => tracing::info!("kafka-bridge stopped"),
        StopReason::ConsumerClosed => tracing::warn!("kafka-bridge stopped: consumer closed"),
    }
    Ok(())
}

/// SIGINT/SIGTERM → cancel `token`. Handler registration failure is fatal.
fn shutdown_on_signal(token: CancellationToken) -> Result<JoinHandle<()>, AdapterError> {
    let mut sigterm = signal(SignalKind::terminate())?;
    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("SIGINT received"),
            _ = sigterm.recv() => tracing::info!("SIGTERM received"),
            _ = token.cancelled() => return,
        }
        tracing::info!("shutting down...");
        token.cancel();
    }))
}
