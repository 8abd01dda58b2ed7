//! Error types for captcha-solver crate.

use captcha_dataset::DatasetError;
use captcha_models::ModelError;
use thiserror::Error;

/// Errors that can occur while solving a CAPTCHA.
#[derive(Debug, Error)]
pub enum SolverError {
    /// No model is loaded; the solver cannot answer.
    #[error("model not available: {0}")]
    NotAvailable(String),

    /// Input bytes could not be decoded as an image.
    #[error("failed to decode image: {0}")]
    ImageDecode(String),

    /// Decoded image has zero area.
    #[error("invalid image dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },

    /// Input is not valid base64 or otherwise malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Model error.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Dataset error not covered by a more specific variant.
    #[error("dataset error: {0}")]
    Dataset(DatasetError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),
}

impl SolverError {
    /// Creates a not-available error.
    #[must_use]
    pub fn not_available(reason: impl Into<String>) -> Self {
        Self::NotAvailable(reason.into())
    }

    /// Creates an invalid input error.
    #[must_use]
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput(reason.into())
    }

    /// Returns `true` if a fresh challenge image may succeed where this one
    /// failed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ImageDecode(_) | Self::InvalidDimensions { .. } | Self::InvalidInput(_)
        )
    }
}

impl From<DatasetError> for SolverError {
    fn from(err: DatasetError) -> Self {
        match err {
            DatasetError::ImageDecode { .. } => Self::ImageDecode(err.to_string()),
            DatasetError::InvalidDimensions { width, height } => {
                Self::InvalidDimensions { width, height }
            }
            DatasetError::Io(reason) => Self::Io(reason),
            other => Self::Dataset(other),
        }
    }
}

impl From<std::io::Error> for SolverError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type alias for solver operations.
pub type Result<T> = std::result::Result<T, SolverError>;
