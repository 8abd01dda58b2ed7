//! Error types for captcha-training crate.

use captcha_dataset::DatasetError;
use captcha_models::ModelError;
use captcha_types::TypesError;
use thiserror::Error;

/// Errors that can occur during training.
#[derive(Debug, Error)]
pub enum TrainingError {
    /// Invalid training configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Dataset error (decode, label length, empty dataset).
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// Model error (architecture, artifact, weights).
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Vocabulary or label encoding error.
    #[error(transparent)]
    Types(#[from] TypesError),

    /// Batch construction error.
    #[error("batch error: {0}")]
    Batch(String),

    /// Loss computation error.
    #[error("loss error: {0}")]
    Loss(String),

    /// Numerical instability detected.
    #[error("numerical instability: {0}")]
    NumericalInstability(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl TrainingError {
    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Creates a batch error.
    #[must_use]
    pub fn batch(reason: impl Into<String>) -> Self {
        Self::Batch(reason.into())
    }

    /// Creates a loss error.
    #[must_use]
    pub fn loss(reason: impl Into<String>) -> Self {
        Self::Loss(reason.into())
    }

    /// Creates a numerical instability error.
    #[must_use]
    pub fn numerical_instability(reason: impl Into<String>) -> Self {
        Self::NumericalInstability(reason.into())
    }

    /// Creates an IO error.
    #[must_use]
    pub fn io(reason: impl Into<String>) -> Self {
        Self::Io(reason.into())
    }
}

impl From<std::io::Error> for TrainingError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TrainingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for training operations.
pub type Result<T> = std::result::Result<T, TrainingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_invalid_config() {
        let err = TrainingError::invalid_config("batch size must be > 0");
        assert!(err.to_string().contains("invalid configuration"));
        assert!(err.to_string().contains("batch size"));
    }

    #[test]
    fn error_loss() {
        let err = TrainingError::loss("label needs 9 steps, only 4 available");
        assert!(err.to_string().contains("loss error"));
    }

    #[test]
    fn error_numerical_instability() {
        let err = TrainingError::numerical_instability("loss is NaN");
        assert!(err.to_string().contains("numerical instability"));
    }

    #[test]
    fn error_from_dataset() {
        let err: TrainingError = DatasetError::label_too_long("abcde", 4).into();
        assert!(matches!(
            err,
            TrainingError::Dataset(DatasetError::LabelTooLong { .. })
        ));
    }

    #[test]
    fn error_from_types_keeps_variant() {
        let err: TrainingError = TypesError::unknown_character('z', "abz").into();
        assert!(matches!(
            err,
            TrainingError::Types(TypesError::UnknownCharacter { .. })
        ));
    }

    #[test]
    fn error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: TrainingError = io_err.into();
        assert!(matches!(err, TrainingError::Io(_)));
    }
}
