//! Greedy CTC decoding.

use burn::prelude::Backend;
use burn::tensor::Tensor;
use captcha_types::{Prediction, Vocabulary};

/// Best-path decoder: arg-max per step, collapse repeats, drop blanks.
///
/// Fully deterministic. Output may be shorter than the expected label length
/// or empty; callers treat that as low confidence.
///
/// # Example
///
/// ```
/// use captcha_models::GreedyDecoder;
/// use captcha_types::Vocabulary;
///
/// let vocab = Vocabulary::build(["ab"]).unwrap();
/// let decoder = GreedyDecoder::new(vocab);
/// let blank = 2;
///
/// // a a _ a b b _ -> "aab"
/// let text = decoder.decode_path(&[0, 0, blank, 0, 1, 1, blank]);
/// assert_eq!(text.text, "aab");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GreedyDecoder {
    vocab: Vocabulary,
    max_length: Option<usize>,
}

impl GreedyDecoder {
    /// Creates a decoder over `vocab`; the blank is `vocab.len()`.
    #[must_use]
    pub const fn new(vocab: Vocabulary) -> Self {
        Self {
            vocab,
            max_length: None,
        }
    }

    /// Truncates decoded text to at most `max_length` characters.
    #[must_use]
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// The decoding vocabulary.
    #[must_use]
    pub const fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Blank class index.
    #[must_use]
    pub fn blank(&self) -> usize {
        self.vocab.blank_index()
    }

    /// Collapses consecutive duplicates, then removes blanks.
    #[must_use]
    pub fn collapse(&self, best_path: &[usize]) -> Vec<usize> {
        let blank = self.blank();
        let mut out = Vec::new();
        let mut prev = None;
        for &class in best_path {
            if prev != Some(class) && class != blank {
                out.push(class);
            }
            prev = Some(class);
        }
        out
    }

    /// Decodes one best path to text.
    #[must_use]
    pub fn decode_path(&self, best_path: &[usize]) -> Prediction {
        let mut text = self.vocab.decode(&self.collapse(best_path));
        if let Some(max) = self.max_length {
            if let Some((cut, _)) = text.char_indices().nth(max) {
                text.truncate(cut);
            }
        }
        Prediction::new(text)
    }

    /// Arg-max class per step for every item of a `[batch, T, C]` tensor.
    #[must_use]
    pub fn best_paths<B: Backend>(scores: Tensor<B, 3>) -> Vec<Vec<usize>> {
        let [batch, steps, _] = scores.dims();
        let flat: Vec<usize> = scores
            .argmax(2)
            .into_data()
            .iter::<i64>()
            .map(|idx| usize::try_from(idx).unwrap_or(usize::MAX))
            .collect();

        flat.chunks(steps.max(1))
            .take(batch)
            .map(<[usize]>::to_vec)
            .collect()
    }

    /// Decodes a `[batch, T, C]` tensor of probabilities or scores.
    ///
    /// Arg-max is invariant under softmax, so raw scores, probabilities and
    /// log-probabilities all decode identically.
    #[must_use]
    pub fn decode_batch<B: Backend>(&self, scores: Tensor<B, 3>) -> Vec<Prediction> {
        Self::best_paths(scores)
            .iter()
            .map(|path| self.decode_path(path))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn decoder() -> GreedyDecoder {
        GreedyDecoder::new(Vocabulary::build(["ab12", "cd34"]).unwrap())
    }

    #[test]
    fn collapse_repeats_then_blanks() {
        let d = decoder();
        let blank = d.blank();
        assert_eq!(blank, 8);
        assert_eq!(d.collapse(&[4, 4, 4, blank, 4, 5]), vec![4, 4, 5]);
        assert_eq!(d.collapse(&[blank, blank]), Vec::<usize>::new());
        assert_eq!(d.collapse(&[]), Vec::<usize>::new());
    }

    #[test]
    fn decode_path_text() {
        let d = decoder();
        let b = d.blank();
        // a b 1 2 with repeats and blanks between
        let path = [b, 4, 4, b, 5, 0, 0, b, b, 1, 1];
        assert_eq!(d.decode_path(&path).text, "ab12");
    }

    #[test]
    fn decode_path_ignores_garbage_indices() {
        let d = decoder();
        assert_eq!(d.decode_path(&[4, 99, 5]).text, "ab");
    }

    #[test]
    fn max_length_truncates() {
        let d = decoder().with_max_length(2);
        assert_eq!(d.decode_path(&[4, 5, 0, 1]).text, "ab");
        assert_eq!(d.decode_path(&[4]).text, "a");
    }

    #[test]
    fn decode_batch_from_tensor() {
        let d = GreedyDecoder::new(Vocabulary::build(["ab"]).unwrap());
        let device = Default::default();
        // batch 2, T 3, C 3 (a, b, blank)
        let scores = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(
                vec![
                    0.9_f32, 0.05, 0.05, // a
                    0.1, 0.1, 0.8, // blank
                    0.1, 0.7, 0.2, // b
                    0.2, 0.1, 0.7, // blank
                    0.2, 0.1, 0.7, // blank
                    0.2, 0.1, 0.7, // blank
                ],
                [2, 3, 3],
            ),
            &device,
        );

        let preds = d.decode_batch(scores);
        assert_eq!(preds.len(), 2);
        assert_eq!(preds[0].text, "ab");
        assert!(preds[1].is_empty());
    }

    #[test]
    fn decode_is_deterministic() {
        let d = decoder();
        let path = [4, 8, 4, 5, 5, 0];
        assert_eq!(d.decode_path(&path), d.decode_path(&path));
    }
}
