//! Error types for captcha-dataset crate.

use captcha_types::TypesError;
use thiserror::Error;

/// Errors that can occur in captcha-dataset operations.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Input bytes could not be decoded as an image.
    #[error("failed to decode image{}: {reason}", source_suffix(.source_name))]
    ImageDecode {
        /// Where the bytes came from, if known.
        source_name: Option<String>,
        /// Decoder message.
        reason: String,
    },

    /// Decoded image has zero area.
    #[error("invalid image dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },

    /// Label is longer than the model can emit.
    #[error("label {label:?} has {length} characters, max is {max_length}")]
    LabelTooLong {
        /// The rejected label.
        label: String,
        /// Its character count.
        length: usize,
        /// Configured maximum.
        max_length: usize,
    },

    /// Label is not usable as a dataset label.
    #[error("invalid label {0:?}")]
    InvalidLabel(String),

    /// Empty dataset.
    #[error("dataset is empty")]
    EmptyDataset,

    /// Error from the shared types (vocabulary, params).
    #[error(transparent)]
    Types(#[from] TypesError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

fn source_suffix(source_name: &Option<String>) -> String {
    source_name
        .as_ref()
        .map_or_else(String::new, |name| format!(" from {name}"))
}

impl DatasetError {
    /// Creates an image decode error.
    #[must_use]
    pub fn image_decode(reason: impl Into<String>) -> Self {
        Self::ImageDecode {
            source_name: None,
            reason: reason.into(),
        }
    }

    /// Creates an image decode error naming its source.
    #[must_use]
    pub fn image_decode_from(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ImageDecode {
            source_name: Some(source_name.into()),
            reason: reason.into(),
        }
    }

    /// Creates an invalid dimensions error.
    #[must_use]
    pub const fn invalid_dimensions(width: u32, height: u32) -> Self {
        Self::InvalidDimensions { width, height }
    }

    /// Creates a label-too-long error.
    #[must_use]
    pub fn label_too_long(label: impl Into<String>, max_length: usize) -> Self {
        let label = label.into();
        Self::LabelTooLong {
            length: label.chars().count(),
            label,
            max_length,
        }
    }

    /// Creates an invalid label error.
    #[must_use]
    pub fn invalid_label(label: impl Into<String>) -> Self {
        Self::InvalidLabel(label.into())
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

    /// Returns `true` for failures caused by the input image itself.
    ///
    /// Callers recover from these by requesting a fresh image.
    #[must_use]
    pub const fn is_bad_image(&self) -> bool {
        matches!(
            self,
            Self::ImageDecode { .. } | Self::InvalidDimensions { .. }
        )
    }
}

impl From<std::io::Error> for DatasetError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for DatasetError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for captcha-dataset operations.
pub type Result<T> = std::result::Result<T, DatasetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_image_decode() {
        let err = DatasetError::image_decode("bad magic");
        assert_eq!(err.to_string(), "failed to decode image: bad magic");
        let err = DatasetError::image_decode_from("x.png", "truncated");
        assert_eq!(err.to_string(), "failed to decode image from x.png: truncated");
        assert!(err.is_bad_image());
    }

    #[test]
    fn error_invalid_dimensions() {
        let err = DatasetError::invalid_dimensions(0, 50);
        assert!(err.to_string().contains("0x50"));
        assert!(err.is_bad_image());
    }

    #[test]
    fn error_label_too_long() {
        let err = DatasetError::label_too_long("abcde", 4);
        match &err {
            DatasetError::LabelTooLong { length, .. } => assert_eq!(*length, 5),
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.to_string().contains("abcde"));
        assert!(!err.is_bad_image());
    }

    #[test]
    fn error_from_types() {
        let err: DatasetError = TypesError::EmptyVocabulary.into();
        assert!(matches!(err, DatasetError::Types(TypesError::EmptyVocabulary)));
    }

    #[test]
    fn error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err: DatasetError = io_err.into();
        assert!(matches!(err, DatasetError::Io(_)));
    }
}
