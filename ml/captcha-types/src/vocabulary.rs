//! Character vocabulary and label codec.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TypesError};

/// Bidirectional mapping between characters and dense class indices.
///
/// Characters are kept sorted by code point, so the index of a character is
/// its position in [`chars`](Self::chars) and two runs over the same label
/// set always produce the same indices. Real characters occupy `0..len()`;
/// the blank class used by the sequence loss and the decoder is `len()`.
///
/// # Example
///
/// ```
/// use captcha_types::Vocabulary;
///
/// let vocab = Vocabulary::build(["ab12", "cd34"]).unwrap();
/// assert_eq!(vocab.as_string(), "1234abcd");
/// assert_eq!(vocab.blank_index(), 8);
/// assert_eq!(vocab.encode("ab12").unwrap(), vec![4, 5, 0, 1]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<char>", into = "Vec<char>")]
pub struct Vocabulary {
    chars: Vec<char>,
}

impl Vocabulary {
    /// Builds a vocabulary from every distinct character across `labels`.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::EmptyVocabulary`] if the labels contain no
    /// characters at all.
    pub fn build<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: BTreeSet<char> = labels
            .into_iter()
            .flat_map(|label| label.as_ref().chars().collect::<Vec<_>>())
            .collect();

        if set.is_empty() {
            return Err(TypesError::EmptyVocabulary);
        }

        Ok(Self {
            chars: set.into_iter().collect(),
        })
    }

    /// Number of real characters (`V`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// Always `false` for a successfully built vocabulary.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Index of the blank class (`V`).
    #[must_use]
    pub fn blank_index(&self) -> usize {
        self.chars.len()
    }

    /// Number of output classes the encoder must produce (`V + 1`).
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.chars.len() + 1
    }

    /// The characters in index order.
    #[must_use]
    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    /// The characters concatenated in index order.
    #[must_use]
    pub fn as_string(&self) -> String {
        self.chars.iter().collect()
    }

    /// Returns the class index of `c`.
    #[must_use]
    pub fn index_of(&self, c: char) -> Option<usize> {
        self.chars.binary_search(&c).ok()
    }

    /// Returns the character at class index `index`, if it is a real class.
    #[must_use]
    pub fn char_at(&self, index: usize) -> Option<char> {
        self.chars.get(index).copied()
    }

    /// Returns `true` if every character of `label` is known.
    #[must_use]
    pub fn covers(&self, label: &str) -> bool {
        label.chars().all(|c| self.index_of(c).is_some())
    }

    /// Encodes a label into class indices.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::UnknownCharacter`] for the first character not
    /// present in the vocabulary.
    pub fn encode(&self, label: &str) -> Result<Vec<usize>> {
        label
            .chars()
            .map(|c| {
                self.index_of(c)
                    .ok_or_else(|| TypesError::unknown_character(c, label))
            })
            .collect()
    }

    /// Decodes class indices into a string.
    ///
    /// The blank index and any index past the last real class are dropped.
    #[must_use]
    pub fn decode(&self, indices: &[usize]) -> String {
        indices.iter().filter_map(|&i| self.char_at(i)).collect()
    }
}

impl TryFrom<Vec<char>> for Vocabulary {
    type Error = TypesError;

    fn try_from(chars: Vec<char>) -> Result<Self> {
        if chars.is_empty() {
            return Err(TypesError::EmptyVocabulary);
        }
        if let Some(pair) = chars.windows(2).find(|w| w[0] >= w[1]) {
            return Err(TypesError::invalid_vocabulary(format!(
                "characters must be strictly increasing, found {:?} before {:?}",
                pair[0], pair[1]
            )));
        }
        Ok(Self { chars })
    }
}

impl From<Vocabulary> for Vec<char> {
    fn from(vocab: Vocabulary) -> Self {
        vocab.chars
    }
}

impl std::fmt::Display for Vocabulary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} chars)", self.as_string(), self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_sorts_and_dedups() {
        let vocab = Vocabulary::build(["ab12", "cd34"]).unwrap();
        assert_eq!(vocab.chars(), &['1', '2', '3', '4', 'a', 'b', 'c', 'd']);
        assert_eq!(vocab.len(), 8);
        assert_eq!(vocab.num_classes(), 9);
        assert_eq!(vocab.blank_index(), 8);
    }

    #[test]
    fn build_is_order_independent() {
        let a = Vocabulary::build(["zz9", "a1"]).unwrap();
        let b = Vocabulary::build(["a1", "zz9"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn build_empty_fails() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            Vocabulary::build(empty),
            Err(TypesError::EmptyVocabulary)
        ));
        assert!(matches!(
            Vocabulary::build(["", ""]),
            Err(TypesError::EmptyVocabulary)
        ));
    }

    #[test]
    fn encode_scenario() {
        let vocab = Vocabulary::build(["ab12", "cd34"]).unwrap();
        let encoded = vocab.encode("ab12").unwrap();
        let expected: Vec<usize> = ['a', 'b', '1', '2']
            .iter()
            .map(|&c| vocab.index_of(c).unwrap())
            .collect();
        assert_eq!(encoded, expected);
        assert_eq!(encoded, vec![4, 5, 0, 1]);
    }

    #[test]
    fn encode_unknown_character() {
        let vocab = Vocabulary::build(["abcd"]).unwrap();
        match vocab.encode("abxd") {
            Err(TypesError::UnknownCharacter { character, label }) => {
                assert_eq!(character, 'x');
                assert_eq!(label, "abxd");
            }
            other => panic!("expected UnknownCharacter, got {other:?}"),
        }
    }

    #[test]
    fn decode_inverts_encode() {
        let vocab = Vocabulary::build(["k7p2", "mm04", "zq9a"]).unwrap();
        for label in ["k7p2", "mm04", "zq9a", "a0", "", "kkkk"] {
            let encoded = vocab.encode(label).unwrap();
            assert_eq!(vocab.decode(&encoded), label);
        }
    }

    #[test]
    fn decode_drops_blank_and_garbage() {
        let vocab = Vocabulary::build(["abc"]).unwrap();
        let blank = vocab.blank_index();
        assert_eq!(vocab.decode(&[0, blank, 1, 99, 2, blank]), "abc");
    }

    #[test]
    fn covers_label() {
        let vocab = Vocabulary::build(["abc"]).unwrap();
        assert!(vocab.covers("cab"));
        assert!(!vocab.covers("cat"));
    }

    #[test]
    fn serialization_roundtrip() {
        let vocab = Vocabulary::build(["x1y2"]).unwrap();
        let json = serde_json::to_string(&vocab).unwrap();
        assert_eq!(json, r#"["1","2","x","y"]"#);
        let parsed: Vocabulary = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, vocab);
    }

    #[test]
    fn deserialize_rejects_unsorted() {
        let parsed: std::result::Result<Vocabulary, _> = serde_json::from_str(r#"["b","a"]"#);
        assert!(parsed.is_err());
        let dup: std::result::Result<Vocabulary, _> = serde_json::from_str(r#"["a","a"]"#);
        assert!(dup.is_err());
        let empty: std::result::Result<Vocabulary, _> = serde_json::from_str("[]");
        assert!(empty.is_err());
    }

    #[test]
    fn display() {
        let vocab = Vocabulary::build(["ba"]).unwrap();
        assert_eq!(vocab.to_string(), "ab (2 chars)");
    }
}
