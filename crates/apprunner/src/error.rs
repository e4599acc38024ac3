//! Runtime error taxonomy and its mapping onto gRPC status codes.

use apprunner_protocol::{PageRef, ProtocolError};
use thiserror::Error;
use tonic::{Code, Status};

/// Errors produced by the runner and surfaced through the contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("application not found: {0}")]
    ApplicationNotFound(String),

    #[error("application not enabled: {0}")]
    ApplicationNotEnabled(String),

    #[error("an instance of application {0} already exists")]
    ApplicationAlreadyRunning(String),

    #[error("application not running: {0}")]
    ApplicationNotRunning(String),

    #[error("application log not found: {0}")]
    ApplicationLogNotFound(String),

    #[error("page not available: {0}")]
    PageNotFound(PageRef),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Raised by application code; the message is passed through to the caller.
    #[error("{0}")]
    MethodFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RuntimeError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn method_failed(msg: impl Into<String>) -> Self {
        Self::MethodFailed(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn code(&self) -> Code {
        match self {
            Self::ApplicationNotFound(_)
            | Self::ApplicationNotRunning(_)
            | Self::ApplicationLogNotFound(_)
            | Self::PageNotFound(_) => Code::NotFound,
            Self::InvalidArgument(_) | Self::UnknownMethod(_) => Code::InvalidArgument,
            Self::ApplicationNotEnabled(_) => Code::FailedPrecondition,
            Self::ApplicationAlreadyRunning(_) => Code::AlreadyExists,
            Self::MethodFailed(_) => Code::Unknown,
            Self::Internal(_) => Code::Internal,
        }
    }
}

impl From<ProtocolError> for RuntimeError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::EmptyField(_) | ProtocolError::MissingUpdateType => {
                Self::InvalidArgument(err.to_string())
            }
            ProtocolError::InvalidTimestamp { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<RuntimeError> for Status {
    fn from(err: RuntimeError) -> Self {
        let code = err.code();
        match code {
            Code::Internal | Code::Unknown => {
                tracing::warn!(code = ?code, error = %err, "request failed");
            }
            _ => {
                tracing::debug!(code = ?code, error = %err, "request rejected");
            }
        }
        Status::new(code, err.to_string())
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
