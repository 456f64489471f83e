//! CloudEvents HTTP sink over `reqwest` (binary content mode).

mod client;
mod config;
mod error;
pub mod headers;

pub use client::HttpSink;
pub use config::HttpSinkConfig;
pub use error::SinkError;
