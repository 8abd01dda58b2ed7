//! Sequence-level evaluation.

use std::path::PathBuf;

use burn::prelude::Backend;
use captcha_dataset::LabeledSample;
use captcha_models::{CaptchaEncoder, GreedyDecoder};
use captcha_types::{CanonicalImage, Prediction};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainingError};

/// Mismatches kept in a report.
pub const MAX_MISMATCHES: usize = 20;

/// A wrong prediction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Ground truth.
    pub expected: String,
    /// Decoded text.
    pub predicted: String,
    /// Originating file, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

/// Exact-match accuracy over a sample set.
///
/// # Example
///
/// ```
/// use captcha_training::EvaluationReport;
/// use captcha_types::Prediction;
///
/// let mut report = EvaluationReport::default();
/// report.record("ab12", &Prediction::new("ab12"), None);
/// report.record("cd34", &Prediction::new("cd3"), None);
///
/// assert_eq!(report.correct, 1);
/// assert_eq!(report.length_mismatches, 1);
/// assert!((report.accuracy - 0.5).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Samples evaluated.
    pub total: usize,

    /// Predictions equal to the label.
    pub correct: usize,

    /// Predictions whose length differs from the label's.
    pub length_mismatches: usize,

    /// `correct / total`, 0 when empty.
    pub accuracy: f32,

    /// First [`MAX_MISMATCHES`] wrong predictions.
    pub mismatches: Vec<Mismatch>,
}

impl EvaluationReport {
    /// Scores one prediction.
    #[allow(clippy::cast_precision_loss)]
    pub fn record(&mut self, expected: &str, predicted: &Prediction, source: Option<PathBuf>) {
        self.total += 1;
        if predicted.text == expected {
            self.correct += 1;
        } else {
            if !predicted.has_length(expected.chars().count()) {
                self.length_mismatches += 1;
            }
            if self.mismatches.len() < MAX_MISMATCHES {
                self.mismatches.push(Mismatch {
                    expected: expected.to_string(),
                    predicted: predicted.text.clone(),
                    source,
                });
            }
        }
        self.accuracy = self.correct as f32 / self.total as f32;
    }

    /// Wrong predictions.
    #[must_use]
    pub const fn errors(&self) -> usize {
        self.total - self.correct
    }

    /// One-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{}/{} correct ({:.1}%), {} length mismatches",
            self.correct,
            self.total,
            self.accuracy * 100.0,
            self.length_mismatches
        )
    }
}

/// Runs `predict` on every sample's canonical image and scores the result.
///
/// # Errors
///
/// Propagates the first error from `predict`.
pub fn evaluate<F, E>(mut predict: F, samples: &[LabeledSample]) -> std::result::Result<EvaluationReport, E>
where
    F: FnMut(&CanonicalImage) -> std::result::Result<Prediction, E>,
{
    let mut report = EvaluationReport::default();
    for sample in samples {
        let prediction = predict(&sample.image)?;
        report.record(&sample.label, &prediction, sample.source.clone());
    }
    Ok(report)
}

/// Evaluates an encoder in batches of `batch_size`.
///
/// # Errors
///
/// Returns [`TrainingError::InvalidConfig`] for a zero batch size and
/// [`TrainingError::Model`] for images of the wrong size.
pub fn evaluate_encoder<B: Backend>(
    encoder: &CaptchaEncoder<B>,
    decoder: &GreedyDecoder,
    samples: &[LabeledSample],
    batch_size: usize,
    device: &B::Device,
) -> Result<EvaluationReport> {
    if batch_size == 0 {
        return Err(TrainingError::invalid_config("batch size must be > 0"));
    }

    let mut report = EvaluationReport::default();
    for chunk in samples.chunks(batch_size) {
        let images: Vec<&CanonicalImage> = chunk.iter().map(|s| &s.image).collect();
        let input = encoder.image_batch(&images, device)?;
        let predictions = decoder.decode_batch(encoder.forward(input));
        for (sample, prediction) in chunk.iter().zip(&predictions) {
            report.record(&sample.label, prediction, sample.source.clone());
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use captcha_models::EncoderConfig;
    use captcha_types::Vocabulary;

    fn sample(label: &str) -> LabeledSample {
        LabeledSample::new(label, CanonicalImage::filled(48, 16, 0.0))
    }

    #[test]
    fn counts_and_accuracy() {
        let samples = vec![sample("ab12"), sample("cd34"), sample("ef56"), sample("gh78")];
        let report = evaluate(
            |_: &CanonicalImage| Ok::<_, TrainingError>(Prediction::new("ab12")),
            &samples,
        )
        .unwrap();

        assert_eq!(report.total, 4);
        assert_eq!(report.correct, 1);
        assert_eq!(report.errors(), 3);
        assert_eq!(report.length_mismatches, 0);
        assert!((report.accuracy - 0.25).abs() < 1e-6);
        assert_eq!(report.mismatches.len(), 3);
        assert_eq!(report.mismatches[0].expected, "cd34");
    }

    #[test]
    fn length_mismatches_counted() {
        let mut report = EvaluationReport::default();
        report.record("ab12", &Prediction::new(""), None);
        report.record("ab12", &Prediction::new("ab123"), None);
        report.record("ab12", &Prediction::new("ab13"), None);
        assert_eq!(report.length_mismatches, 2);
        assert_eq!(report.correct, 0);
        assert!(report.summary().contains("0/3 correct"));
    }

    #[test]
    fn mismatches_are_bounded() {
        let mut report = EvaluationReport::default();
        for _ in 0..(MAX_MISMATCHES + 5) {
            report.record("ab12", &Prediction::new("xx"), None);
        }
        assert_eq!(report.mismatches.len(), MAX_MISMATCHES);
        assert_eq!(report.total, MAX_MISMATCHES + 5);
    }

    #[test]
    fn empty_input() {
        let report = evaluate(|_: &CanonicalImage| Ok::<_, TrainingError>(Prediction::new("")), &[])
            .unwrap();
        assert_eq!(report.total, 0);
        assert!(report.accuracy.abs() < f32::EPSILON);
    }

    #[test]
    fn predict_error_propagates() {
        let samples = vec![sample("ab12")];
        let result = evaluate(
            |_: &CanonicalImage| Err::<Prediction, _>(TrainingError::batch("boom")),
            &samples,
        );
        assert!(result.is_err());
    }

    #[test]
    fn encoder_evaluation_runs_in_batches() {
        let vocab = Vocabulary::build(["ab12", "cd34"]).unwrap();
        let device = Default::default();
        let encoder = EncoderConfig::new(48, 16, vocab.num_classes())
            .with_conv_channels([2, 2, 2])
            .with_dense_units(4)
            .with_lstm_hidden([4, 4])
            .init::<NdArray<f32>>(4, &device)
            .unwrap();
        let decoder = GreedyDecoder::new(vocab).with_max_length(4);
        let samples = vec![sample("ab12"), sample("cd34"), sample("ab34")];

        let report = evaluate_encoder(&encoder, &decoder, &samples, 2, &device).unwrap();
        assert_eq!(report.total, 3);
        assert!(evaluate_encoder(&encoder, &decoder, &samples, 0, &device).is_err());
    }
}
