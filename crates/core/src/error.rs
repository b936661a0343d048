//! Engine error model.

use thiserror::Error;

/// Result type used across the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine-level error.
///
/// Only configuration/validation problems and training conflicts are meant to
/// reach callers. Numeric and storage failures are produced internally and
/// absorbed by the orchestrator with a documented fallback.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A model name that is not registered was requested.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// Another training run holds the engine's training lock.
    #[error("training already in progress")]
    TrainingInProgress,

    /// An ensemble weight update was rejected; previous weights are retained.
    #[error("invalid ensemble weights: {0}")]
    InvalidWeights(String),

    /// A request parameter failed validation (e.g. zero horizon).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Not enough history to build a single training sample.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Inference was requested from a model without fitted parameters.
    #[error("model not trained: {0}")]
    ModelNotTrained(String),

    /// Training or inference produced non-finite values.
    #[error("numeric failure: {0}")]
    NumericFailure(String),
}

impl EngineError {
    pub fn model_not_found(name: impl Into<String>) -> Self {
        Self::ModelNotFound(name.into())
    }

    pub fn invalid_weights(msg: impl Into<String>) -> Self {
        Self::InvalidWeights(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn insufficient_data(msg: impl Into<String>) -> Self {
        Self::InsufficientData(msg.into())
    }

    pub fn numeric(msg: impl Into<String>) -> Self {
        Self::NumericFailure(msg.into())
    }

    /// Whether this error is meant to be surfaced to the API layer.
    ///
    /// Everything else is handled inside the engine by the per-model fallback.
    /// Cache failures never become an `EngineError`; they stay `CacheError`s
    /// inside the result cache.
    pub fn is_caller_visible(&self) -> bool {
        matches!(
            self,
            Self::ModelNotFound(_)
                | Self::TrainingInProgress
                | Self::InvalidWeights(_)
                | Self::Validation(_)
        )
    }
}
