use thiserror::Error;

/// Core error type for the form orchestration engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Step not declared in the form definition
    #[error("Step not found: {0}")]
    StepNotFound(String),

    /// Field not declared in the form definition
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// Malformed dot-delimited field path
    #[error("Invalid field path: {0}")]
    InvalidFieldPath(String),

    /// Form definition failed structural validation
    #[error("Invalid form definition: {0}")]
    InvalidDefinition(String),

    /// Operation not allowed in the current session state
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Requested step index is outside the visible steps
    #[error("Step index {index} out of range (visible steps: {visible})")]
    StepOutOfRange {
        /// Requested index
        index: usize,
        /// Number of currently visible steps
        visible: usize,
    },

    /// A submission is already in flight
    #[error("Submission already in progress")]
    SubmissionInProgress,

    /// Session has been torn down
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// Snapshot store error
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// Timer error
    #[error("Timer error: {0}")]
    TimerError(String),

    /// Condition evaluation error
    #[error("Condition evaluation error: {0}")]
    ConditionEvaluationError(String),

    /// Expression compilation or evaluation error
    #[error("Expression evaluation error: {0}")]
    ExpressionError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Caller-supplied callback failed
    #[error("Callback error: {0}")]
    CallbackError(String),

    /// Input/output error
    #[error("Input/output error: {0}")]
    IOError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::IOError(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}
