//! Kafka implementation of [`bridge_api::LogConsumer`] over `rdkafka`.
//!
//! One group consumer subscribed to one topic. Rebalances announce
//! partitions, a poll loop fans records out to bounded per-partition
//! streams, commits store the next offset for the client's auto-commit.

mod config;
mod consumer;
mod context;
mod error;
mod record;

pub use config::{KafkaConfig, KafkaTuning, NetConfig, RESERVED_PROPERTIES, SaslConfig, TlsConfig};
pub use consumer::KafkaLogConsumer;
pub use error::KafkaError;
pub use record::to_record;
