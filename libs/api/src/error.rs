use std::fmt;

/// Category of a client error. Lets the pipeline decide between
/// fail-fast (startup) and log-and-continue (steady state).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration. Permanent, fail at startup.
    Config,
    /// I/O or network error. Transient.
    Io,
    /// Payload could not be encoded or decoded.
    Format,
    /// The sink answered with a non-success status.
    Rejected,
    /// Logical error (invalid state, generic).
    Logic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Io => f.write_str("io"),
            ErrorKind::Format => f.write_str("format"),
            ErrorKind::Rejected => f.write_str("rejected"),
            ErrorKind::Logic => f.write_str("logic"),
        }
    }
}

/// Unified error for the collaborator traits (`LogConsumer`, `SinkClient`,
/// `OffsetCommitter`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientError {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
}

impl ClientError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Config, message: msg.into(), status: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Io, message: msg.into(), status: None }
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Format, message: msg.into(), status: None }
    }

    /// Non-success answer from the sink; `status` is the HTTP status code.
    pub fn rejected(status: u16, msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Rejected, message: msg.into(), status: Some(status) }
    }

    pub fn logic(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Logic, message: msg.into(), status: None }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Add context to the error, preserving kind and status.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
            status: self.status,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({status}): {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ClientError {}

// ---------------------------------------------------------------------------
// From impls: standard error types → ClientError with correct ErrorKind
// ---------------------------------------------------------------------------

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::format(e.to_string())
    }
}
