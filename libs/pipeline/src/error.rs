use bridge_api::ClientError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("config: {0}")]
    Config(String),

    #[error("sink init: {0}")]
    SinkInit(ClientError),
}
