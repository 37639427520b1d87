//! Error types for the keyed timer engine
//!
//! Errors are split by domain (state, timers, watermarks) and nested into the
//! top-level [`EngineError`]. Contract violations raised by user callbacks or
//! detected by the scheduler are fatal: they abort the run instead of being
//! retried.

use thiserror::Error;

/// Main engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    /// State store errors
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Timer registry and firing errors
    #[error("timer error: {0}")]
    Timer(#[from] TimerError),

    /// Watermark tracking errors
    #[error("watermark error: {0}")]
    Watermark(#[from] WatermarkError),

    /// A user callback or the engine broke a guarantee the run depends on
    #[error("contract violation for key '{key}': {reason}")]
    ContractViolation { key: String, reason: String },

    /// Configuration errors
    #[error("configuration error: {source}")]
    Configuration {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Execution errors (channels closed, tasks failed, timeouts)
    #[error("execution error: {source}")]
    Execution {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    /// Build a contract violation for `key`
    pub fn contract_violation(key: impl ToString, reason: impl Into<String>) -> Self {
        EngineError::ContractViolation {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Build an execution error from a message
    pub fn execution(message: impl Into<String>) -> Self {
        let message: String = message.into();
        EngineError::Execution {
            source: message.into(),
        }
    }

    /// Build a configuration error from a message
    pub fn configuration(message: impl Into<String>) -> Self {
        let message: String = message.into();
        EngineError::Configuration {
            source: message.into(),
        }
    }

    /// Whether this error must abort the run
    ///
    /// Contract violations, duplicate firings and timers with an identity the
    /// function never declared are programming errors, not transient
    /// conditions.
    pub fn is_fatal(&self) -> bool {
        match self {
            EngineError::ContractViolation { .. } => true,
            EngineError::Timer(err) => err.is_fatal(),
            EngineError::State(StateError::UndeclaredCell { .. }) => true,
            _ => false,
        }
    }
}

/// State store errors
#[derive(Error, Debug)]
pub enum StateError {
    /// State serialization failed
    #[error("state serialization failed for cell '{cell}': {reason}")]
    SerializationFailed { cell: String, reason: String },

    /// State deserialization failed
    #[error("state deserialization failed for cell '{cell}': {reason}")]
    DeserializationFailed { cell: String, reason: String },

    /// The user function touched a cell it never declared
    #[error("state cell '{cell}' is not declared by the function")]
    UndeclaredCell { cell: String },

    /// State backend storage error
    #[error("storage error in {backend_type}: {details}")]
    StorageError {
        backend_type: String,
        details: String,
    },
}

/// Timer registry and firing errors
#[derive(Error, Debug)]
pub enum TimerError {
    /// A timer was set or cleared in a family the function never declared
    #[error("timer family '{family}' is not declared by the function")]
    UndeclaredFamily { family: String },

    /// A timer with an identity the function does not handle was delivered
    #[error("unexpected timer family '{family}' tag '{tag}' for key '{key}'")]
    UnknownTimer {
        key: String,
        family: String,
        tag: String,
    },

    /// A slot fired twice for the same arm cycle
    #[error("duplicate firing for key '{key}' timer {family}/{tag}: generation {generation} already delivered (last {last_delivered})")]
    DuplicateFiring {
        key: String,
        family: String,
        tag: String,
        generation: u64,
        last_delivered: u64,
    },
}

impl TimerError {
    /// Every timer error reflects a broken firing contract
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TimerError::UndeclaredFamily { .. }
                | TimerError::UnknownTimer { .. }
                | TimerError::DuplicateFiring { .. }
        )
    }
}

/// Watermark tracking errors
#[derive(Error, Debug)]
pub enum WatermarkError {
    /// Watermark went backwards
    #[error("watermark regression: new watermark {new_watermark} is before current {current_watermark}")]
    WatermarkRegression {
        current_watermark: i64,
        new_watermark: i64,
    },

    /// Invalid watermark configuration
    #[error("invalid watermark configuration: {reason}")]
    InvalidConfig { reason: String },
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result type alias for state operations
pub type StateResult<T> = std::result::Result<T, StateError>;

/// Result type alias for timer operations
pub type TimerResult<T> = std::result::Result<T, TimerError>;

/// Result type alias for watermark operations
pub type WatermarkResult<T> = std::result::Result<T, WatermarkError>;

impl From<bincode::Error> for EngineError {
    fn from(err: bincode::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Execution { source: err.into() }
    }
}
