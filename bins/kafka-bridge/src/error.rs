#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("kafka: {0}")]
    Kafka(#[from] kafka_consumer::KafkaError),

    #[error("sink: {0}")]
    Sink(#[from] http_sink::SinkError),

    #[error("{0}")]
    Pipeline(#[from] pipeline::PipelineError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}

impl AdapterError {
    pub fn config(context: &'static str, detail: impl Into<String>) -> Self {
        AdapterError::Config { context, detail: detail.into() }
    }
}
