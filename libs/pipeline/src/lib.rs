pub mod config;
pub mod error;
pub mod memory;
mod sink;
mod supervisor;
mod translator;
mod worker;

pub use config::{Backoff, CommitPolicy, PipelineConfig};
pub use error::PipelineError;
pub use sink::LazySink;
pub use supervisor::{StopReason, Supervisor};
pub use translator::translate;
pub use worker::{PartitionWorker, WorkerReport};
