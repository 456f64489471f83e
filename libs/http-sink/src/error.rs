use bridge_api::ClientError;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("invalid sink uri '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("HTTP client: {0}")]
    Build(reqwest::Error),

    #[error("encode event: {0}")]
    Encode(String),

    #[error("request to sink: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("sink answered {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl From<SinkError> for ClientError {
    fn from(e: SinkError) -> Self {
        match e {
            SinkError::InvalidUri { .. } | SinkError::InvalidHeader { .. } | SinkError::Build(_) => {
                ClientError::config(e.to_string())
            }
            SinkError::Encode(_) => ClientError::format(e.to_string()),
            SinkError::Transport(_) => ClientError::io(e.to_string()),
            SinkError::Rejected { status, .. } => ClientError::rejected(status, e.to_string()),
        }
    }
}
