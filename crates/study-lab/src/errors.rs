use std::time::Duration;

use crate::model::{BatchId, BatchStatus, RunId, RunLastError, RunStatus};
use crate::notes::NoteIssue;

/// Errors returned by a backend before they are wrapped into `LabError`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Service returned an application-level failure (HTTP status, auth, etc.).
    #[error("provider error ({operation}): {message}")]
    Provider {
        operation: String,
        message: String,
        status_code: Option<u16>,
    },
    /// Transport or file I/O failed.
    #[error("transport error ({operation}): {message}")]
    Transport { operation: String, message: String },
    /// Response body could not be decoded into the expected shape.
    #[error("protocol error ({operation}): {message}")]
    Protocol { operation: String, message: String },
}

impl ProviderError {
    /// Creates a provider-level error.
    pub fn provider(
        operation: impl Into<String>,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::Provider {
            operation: operation.into(),
            message: message.into(),
            status_code,
        }
    }

    /// Creates a transport-level error.
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol-level error.
    pub fn protocol(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Returns the remote operation that failed (for example `create_run`).
    pub fn operation(&self) -> &str {
        match self {
            Self::Provider { operation, .. }
            | Self::Transport { operation, .. }
            | Self::Protocol { operation, .. } => operation,
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Provider { message, .. }
            | Self::Transport { message, .. }
            | Self::Protocol { message, .. } => message,
        }
    }
}

/// Stage of the structured-generation pipeline that rejected a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStage {
    /// Response text was not JSON.
    Parse,
    /// JSON did not have the expected top-level shape.
    Shape,
}

impl std::fmt::Display for OutputStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Parse => "parse",
            Self::Shape => "shape",
        })
    }
}

/// Top-level error type for the lab API.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LabError {
    /// Invalid client or workflow configuration (missing credential, bad policy).
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input (for example an empty question).
    #[error("validation error: {0}")]
    Validation(String),
    /// A local precondition failed before any remote call was made.
    #[error("precondition failed: {0}")]
    Precondition(String),
    /// State file does not exist.
    #[error("state file {path} not found; run the bootstrap first")]
    MissingState { path: String },
    /// State file exists but cannot be used.
    #[error("state file {path} is invalid: {message}")]
    InvalidState { path: String, message: String },
    /// Local file I/O failed.
    #[error("io error: {0}")]
    Io(String),
    /// A remote call failed.
    #[error(transparent)]
    Provider(ProviderError),
    /// The remote run reached a failure status.
    #[error("run {run_id} ended with status {status}{}", describe_last_error(.last_error))]
    RunFailed {
        run_id: RunId,
        status: RunStatus,
        last_error: Option<RunLastError>,
    },
    /// Document indexing ended in a status other than `completed`.
    #[error("file batch {batch_id} ended with status {status}")]
    IndexingFailed {
        batch_id: BatchId,
        status: BatchStatus,
    },
    /// A bounded wait ran out of time.
    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },
    /// The caller cancelled a wait.
    #[error("cancelled")]
    Cancelled,
    /// Structured output could not be parsed or had the wrong shape.
    #[error("malformed model output ({stage}): {message}")]
    MalformedOutput {
        stage: OutputStage,
        message: String,
        raw: String,
    },
    /// One or more generated notes failed schema validation.
    #[error("{} note(s) failed validation", .0.len())]
    InvalidNotes(Vec<NoteIssue>),
    /// The service broke its own contract (for example no assistant reply).
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl LabError {
    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub(crate) fn io(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        Self::Io(format!("{context}: {err}"))
    }
}

impl From<ProviderError> for LabError {
    fn from(value: ProviderError) -> Self {
        LabError::Provider(value)
    }
}

fn describe_last_error(last_error: &Option<RunLastError>) -> String {
    match last_error {
        Some(err) => format!(" ({err})"),
        None => String::new(),
    }
}
