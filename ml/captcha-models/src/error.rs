//! Error types for captcha-models crate.

use captcha_types::TypesError;
use thiserror::Error;

/// Errors that can occur in captcha-models operations.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Failed to load weights.
    #[error("failed to load checkpoint from {path}: {reason}")]
    LoadCheckpoint {
        /// Path to the weights file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to save weights.
    #[error("failed to save checkpoint to {path}: {reason}")]
    SaveCheckpoint {
        /// Path to the weights file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Invalid encoder configuration.
    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),

    /// Weights file not found.
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// Unsupported weights format.
    #[error("unsupported checkpoint format: {0}")]
    UnsupportedFormat(String),

    /// Input tensor has the wrong shape.
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Expected shape.
        expected: String,
        /// Actual shape.
        actual: String,
    },

    /// Artifact parts disagree with each other.
    ///
    /// Raised when the output dimension of the network does not equal the
    /// vocabulary size plus one. Fatal at load time.
    #[error("incompatible artifact at {path}: {reason}")]
    ArtifactIncompatible {
        /// Artifact directory.
        path: String,
        /// What disagrees.
        reason: String,
    },

    /// No weights could be loaded by any strategy.
    #[error("no usable weights in {path} (tried: {})", attempts.join("; "))]
    ArtifactMissing {
        /// Artifact directory.
        path: String,
        /// One line per strategy attempted.
        attempts: Vec<String>,
    },

    /// Vocabulary or parameter error.
    #[error(transparent)]
    Types(#[from] TypesError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ModelError {
    /// Creates a load checkpoint error.
    #[must_use]
    pub fn load_checkpoint(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LoadCheckpoint {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a save checkpoint error.
    #[must_use]
    pub fn save_checkpoint(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SaveCheckpoint {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid config error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Creates a checkpoint not found error.
    #[must_use]
    pub fn checkpoint_not_found(path: impl Into<String>) -> Self {
        Self::CheckpointNotFound(path.into())
    }

    /// Creates an unsupported format error.
    #[must_use]
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Creates a shape mismatch error.
    #[must_use]
    pub fn shape_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates an artifact incompatibility error.
    #[must_use]
    pub fn artifact_incompatible(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ArtifactIncompatible {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an artifact missing error.
    #[must_use]
    pub fn artifact_missing(path: impl Into<String>, attempts: Vec<String>) -> Self {
        Self::ArtifactMissing {
            path: path.into(),
            attempts,
        }
    }

    /// Creates an IO error.
    #[must_use]
    pub fn io(reason: impl Into<String>) -> Self {
        Self::Io(reason.into())
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization(reason.into())
    }
}

impl From<std::io::Error> for ModelError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for captcha-models operations.
pub type Result<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_load_checkpoint() {
        let err = ModelError::load_checkpoint("model.bin", "file corrupted");
        assert!(err.to_string().contains("model.bin"));
        assert!(err.to_string().contains("file corrupted"));
    }

    #[test]
    fn error_artifact_incompatible() {
        let err = ModelError::artifact_incompatible("out/", "37 classes, vocabulary has 35");
        assert!(err.to_string().contains("incompatible artifact at out/"));
    }

    #[test]
    fn error_artifact_missing_lists_attempts() {
        let err = ModelError::artifact_missing(
            "out/",
            vec!["final: missing".into(), "checkpoint: missing".into()],
        );
        let msg = err.to_string();
        assert!(msg.contains("final: missing; checkpoint: missing"));
    }

    #[test]
    fn error_shape_mismatch() {
        let err = ModelError::shape_mismatch("[180, 50, 1]", "[90, 50, 1]");
        assert!(err.to_string().contains("[90, 50, 1]"));
    }

    #[test]
    fn error_from_types() {
        let err: ModelError = TypesError::EmptyVocabulary.into();
        assert!(matches!(err, ModelError::Types(_)));
    }

    #[test]
    fn error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err: ModelError = io_err.into();
        assert!(matches!(err, ModelError::Io(_)));
    }
}
