//! Error types for captcha-types crate.

use thiserror::Error;

/// Errors that can occur when building or using shared recognition types.
#[derive(Debug, Error)]
pub enum TypesError {
    /// A label contains a character the vocabulary does not know.
    #[error("unknown character {character:?} in label {label:?}")]
    UnknownCharacter {
        /// The offending character.
        character: char,
        /// The full label being encoded.
        label: String,
    },

    /// No characters were available to build a vocabulary.
    #[error("cannot build a vocabulary from an empty label set")]
    EmptyVocabulary,

    /// A persisted vocabulary is malformed (unsorted or duplicated).
    #[error("invalid vocabulary: {0}")]
    InvalidVocabulary(String),

    /// Canonicalization parameters are unusable.
    #[error("invalid canonicalization parameters: {0}")]
    InvalidParams(String),

    /// Raw tensor data does not match the declared shape.
    #[error("shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch {
        /// Expected number of values.
        expected: usize,
        /// Actual number of values.
        actual: usize,
    },
}

impl TypesError {
    /// Creates an unknown character error.
    #[must_use]
    pub fn unknown_character(character: char, label: impl Into<String>) -> Self {
        Self::UnknownCharacter {
            character,
            label: label.into(),
        }
    }

    /// Creates an invalid vocabulary error.
    #[must_use]
    pub fn invalid_vocabulary(reason: impl Into<String>) -> Self {
        Self::InvalidVocabulary(reason.into())
    }

    /// Creates an invalid parameters error.
    #[must_use]
    pub fn invalid_params(reason: impl Into<String>) -> Self {
        Self::InvalidParams(reason.into())
    }

    /// Creates a shape mismatch error.
    #[must_use]
    pub const fn shape_mismatch(expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch { expected, actual }
    }
}

/// Result type for captcha-types operations.
pub type Result<T> = std::result::Result<T, TypesError>;
