//! Decoded prediction values.

use serde::{Deserialize, Serialize};

/// Text decoded for one input image.
///
/// May be empty or shorter than the expected label length; callers treat a
/// wrong-length prediction as low confidence.
///
/// # Example
///
/// ```
/// use captcha_types::Prediction;
///
/// let pred = Prediction::new("k7p");
/// assert_eq!(pred.len(), 3);
/// assert!(!pred.has_length(4));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Prediction {
    /// Decoded text.
    pub text: String,
}

impl Prediction {
    /// Creates a prediction.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Number of decoded characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    /// Returns `true` if nothing was decoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Returns `true` if exactly `expected` characters were decoded.
    #[must_use]
    pub fn has_length(&self, expected: usize) -> bool {
        self.len() == expected
    }

    /// Consumes the prediction and returns the text.
    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }
}

impl std::fmt::Display for Prediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

impl AsRef<str> for Prediction {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prediction_length() {
        let pred = Prediction::new("ab12");
        assert_eq!(pred.len(), 4);
        assert!(pred.has_length(4));
        assert!(!pred.is_empty());
    }

    #[test]
    fn prediction_empty() {
        let pred = Prediction::default();
        assert!(pred.is_empty());
        assert!(!pred.has_length(4));
        assert_eq!(pred.to_string(), "");
    }

    #[test]
    fn prediction_counts_chars_not_bytes() {
        let pred = Prediction::new("ção");
        assert_eq!(pred.len(), 3);
    }
}
