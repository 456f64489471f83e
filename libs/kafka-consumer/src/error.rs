use bridge_api::ClientError;

#[derive(Debug, thiserror::Error)]
pub enum KafkaError {
    #[error("invalid kafka config: {0}")]
    Config(String),

    #[error("kafka client: {0}")]
    Client(#[from] rdkafka::error::KafkaError),

    #[error("topic '{0}' not found in cluster metadata")]
    UnknownTopic(String),

    #[error("metadata for topic '{topic}': {reason}")]
    Metadata { topic: String, reason: String },

    #[error("background task: {0}")]
    Task(String),
}

impl From<KafkaError> for ClientError {
    fn from(e: KafkaError) -> Self {
        match e {
            KafkaError::Config(msg) => ClientError::config(msg),
            KafkaError::Task(msg) => ClientError::logic(msg),
            other => ClientError::io(other.to_string()),
        }
    }
}
