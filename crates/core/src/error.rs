use thiserror::Error;

/// Stable numeric codes for the orchestrator's error taxonomy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("[1001] room not found: {0}")]
    RoomNotFound(String),

    #[error("[1002] user not found: {0}")]
    UserNotFound(String),

    #[error("[1003] media not found: {0}")]
    MediaNotFound(String),

    #[error("[2001] invalid media type: {0}")]
    MediaInvalidType(String),

    #[error("[2002] invalid media operation: {0}")]
    MediaInvalidOperation(String),

    #[error("[2003] no available codec: {0}")]
    MediaNoAvailableCodec(String),

    #[error("[3001] media server request timed out: {0}")]
    MediaServerRequestTimeout(String),

    #[error("[3002] media server generic error: {0}")]
    MediaServerGenericError(String),

    #[error("[3003] connection error: {0}")]
    ConnectionError(String),
}

impl OrchestratorError {
    /// The stable numeric code, independent of the display text.
    pub fn code(&self) -> u32 {
        match self {
            OrchestratorError::RoomNotFound(_) => 1001,
            OrchestratorError::UserNotFound(_) => 1002,
            OrchestratorError::MediaNotFound(_) => 1003,
            OrchestratorError::MediaInvalidType(_) => 2001,
            OrchestratorError::MediaInvalidOperation(_) => 2002,
            OrchestratorError::MediaNoAvailableCodec(_) => 2003,
            OrchestratorError::MediaServerRequestTimeout(_) => 3001,
            OrchestratorError::MediaServerGenericError(_) => 3002,
            OrchestratorError::ConnectionError(_) => 3003,
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
