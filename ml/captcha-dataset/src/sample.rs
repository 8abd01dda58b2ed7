//! Labeled sample type.

use std::path::{Path, PathBuf};

use captcha_types::{CanonicalImage, Vocabulary};

use crate::error::{DatasetError, Result};

/// A canonical image paired with its ground-truth label.
///
/// Only exists during training and evaluation.
///
/// # Example
///
/// ```
/// use captcha_dataset::LabeledSample;
/// use captcha_types::CanonicalImage;
///
/// let sample = LabeledSample::new("ab12", CanonicalImage::filled(180, 50, 0.0));
/// assert_eq!(sample.label_len(), 4);
/// assert!(sample.check_length(4).is_ok());
/// assert!(sample.check_length(3).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSample {
    /// Ground-truth text.
    pub label: String,

    /// Canonicalized image.
    pub image: CanonicalImage,

    /// File the sample was loaded from, if any.
    pub source: Option<PathBuf>,
}

impl LabeledSample {
    /// Creates a sample with no source path.
    #[must_use]
    pub fn new(label: impl Into<String>, image: CanonicalImage) -> Self {
        Self {
            label: label.into(),
            image,
            source: None,
        }
    }

    /// Attaches the originating file path.
    #[must_use]
    pub fn with_source(mut self, source: impl AsRef<Path>) -> Self {
        self.source = Some(source.as_ref().to_path_buf());
        self
    }

    /// Label length in characters.
    #[must_use]
    pub fn label_len(&self) -> usize {
        self.label.chars().count()
    }

    /// Rejects empty labels and labels longer than `max_length`.
    ///
    /// # Errors
    ///
    /// - [`DatasetError::InvalidLabel`] for an empty label
    /// - [`DatasetError::LabelTooLong`]
    pub fn check_length(&self, max_length: usize) -> Result<()> {
        if self.label.is_empty() {
            return Err(DatasetError::invalid_label(""));
        }
        if self.label_len() > max_length {
            return Err(DatasetError::label_too_long(&self.label, max_length));
        }
        Ok(())
    }

    /// Encodes the label against `vocab`.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Types`] wrapping `UnknownCharacter` if the
    /// label uses a character outside the vocabulary.
    pub fn encode_label(&self, vocab: &Vocabulary) -> Result<Vec<usize>> {
        Ok(vocab.encode(&self.label)?)
    }
}

/// Rejects the first sample whose label is empty or exceeds `max_length`.
///
/// # Errors
///
/// Returns [`DatasetError::InvalidLabel`] or [`DatasetError::LabelTooLong`]
/// naming the offending label.
pub fn check_label_lengths(samples: &[LabeledSample], max_length: usize) -> Result<()> {
    samples
        .iter()
        .try_for_each(|sample| sample.check_length(max_length))
}

#[cfg(test)]
mod tests {
    use super::*;
    use captcha_types::TypesError;

    fn sample(label: &str) -> LabeledSample {
        LabeledSample::new(label, CanonicalImage::filled(180, 50, 0.0))
    }

    #[test]
    fn check_length_rejects_long_labels() {
        let err = sample("abcde").check_length(4).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::LabelTooLong {
                length: 5,
                max_length: 4,
                ..
            }
        ));
        assert!(sample("abc").check_length(4).is_ok());
    }

    #[test]
    fn check_label_lengths_finds_offender() {
        let samples = vec![sample("ab12"), sample("toolong"), sample("cd34")];
        let err = check_label_lengths(&samples, 4).unwrap_err();
        match err {
            DatasetError::LabelTooLong { label, .. } => assert_eq!(label, "toolong"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(check_label_lengths(&samples[..1], 4).is_ok());
    }

    #[test]
    fn empty_label_is_invalid() {
        let err = sample("").check_length(4).unwrap_err();
        assert!(matches!(err, DatasetError::InvalidLabel(_)));
        let samples = vec![sample("ab12"), sample("")];
        assert!(check_label_lengths(&samples, 4).is_err());
    }

    #[test]
    fn encode_label_unknown_character() {
        let vocab = Vocabulary::build(["ab12"]).unwrap();
        assert_eq!(sample("ba21").encode_label(&vocab).unwrap(), vec![3, 2, 1, 0]);
        let err = sample("ab1z").encode_label(&vocab).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::Types(TypesError::UnknownCharacter { character: 'z', .. })
        ));
    }

    #[test]
    fn with_source_records_path() {
        let s = sample("ab12").with_source("/data/ab12_1.png");
        assert_eq!(s.source.as_deref(), Some(Path::new("/data/ab12_1.png")));
    }
}
