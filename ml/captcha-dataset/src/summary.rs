//! Dataset summary and statistics.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::sample::LabeledSample;

/// Summary statistics for a labeled dataset.
///
/// `mean_foreground_ratio` is the average share of ink pixels per image. A
/// value far above one half usually means the source draws light text on a
/// dark background and the canonical polarity is inverted for it.
///
/// # Example
///
/// ```
/// use captcha_dataset::{DatasetSummary, LabeledSample};
/// use captcha_types::CanonicalImage;
///
/// let samples = vec![
///     LabeledSample::new("ab12", CanonicalImage::filled(8, 2, 0.0)),
///     LabeledSample::new("ab12", CanonicalImage::filled(8, 2, 1.0)),
///     LabeledSample::new("cd3", CanonicalImage::filled(8, 2, 0.0)),
/// ];
///
/// let summary = DatasetSummary::from_samples(&samples, 1.0);
/// assert_eq!(summary.total_samples, 3);
/// assert_eq!(summary.distinct_labels, 2);
/// assert_eq!(summary.length_histogram[&4], 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DatasetSummary {
    /// Total number of samples.
    pub total_samples: usize,

    /// Number of distinct label strings.
    pub distinct_labels: usize,

    /// Label length -> number of samples.
    pub length_histogram: BTreeMap<usize, usize>,

    /// Character -> occurrences across all labels.
    pub char_frequency: BTreeMap<char, usize>,

    /// Mean fraction of foreground pixels per image.
    pub mean_foreground_ratio: f32,
}

impl DatasetSummary {
    /// Summarizes `samples`; `foreground` is the canonical ink value.
    #[must_use]
    pub fn from_samples(samples: &[LabeledSample], foreground: f32) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut labels = BTreeSet::new();
        let mut length_histogram = BTreeMap::new();
        let mut char_frequency = BTreeMap::new();
        let mut ratio_sum = 0.0_f64;

        for sample in samples {
            labels.insert(sample.label.as_str());
            *length_histogram.entry(sample.label_len()).or_insert(0) += 1;
            for c in sample.label.chars() {
                *char_frequency.entry(c).or_insert(0) += 1;
            }
            ratio_sum += f64::from(sample.image.foreground_ratio(foreground));
        }

        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let mean_foreground_ratio = (ratio_sum / samples.len() as f64) as f32;

        Self {
            total_samples: samples.len(),
            distinct_labels: labels.len(),
            length_histogram,
            char_frequency,
            mean_foreground_ratio,
        }
    }

    /// Returns true if the dataset is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total_samples == 0
    }

    /// Characters in code-point order, as a vocabulary would list them.
    #[must_use]
    pub fn alphabet(&self) -> String {
        self.char_frequency.keys().collect()
    }

    /// Returns `true` if ink covers more than half the canvas on average.
    #[must_use]
    pub fn looks_inverted(&self) -> bool {
        self.mean_foreground_ratio > 0.5
    }

    /// Returns a human-readable summary string.
    #[must_use]
    #[allow(clippy::let_underscore_must_use)]
    pub fn to_report(&self) -> String {
        use std::fmt::Write;

        let mut report = String::new();
        let _ = writeln!(report, "Dataset Summary");
        let _ = writeln!(report, "===============");
        let _ = writeln!(report, "Total samples: {}", self.total_samples);
        let _ = writeln!(report, "Distinct labels: {}", self.distinct_labels);
        let _ = writeln!(report, "Alphabet: {}", self.alphabet());
        let _ = writeln!(
            report,
            "Mean ink coverage: {:.1}%",
            self.mean_foreground_ratio * 100.0
        );

        if !self.length_histogram.is_empty() {
            let _ = writeln!(report, "\nLabel lengths:");
            for (len, count) in &self.length_histogram {
                let _ = writeln!(report, "  {len}: {count}");
            }
        }

        if self.looks_inverted() {
            let _ = writeln!(
                report,
                "\nwarning: ink covers most of the canvas; check polarity"
            );
        }

        report
    }
}
