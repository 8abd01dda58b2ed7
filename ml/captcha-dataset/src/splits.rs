//! Train/validation splitting.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::sample::LabeledSample;

/// Ratio for splitting datasets into train/validation sets.
///
/// The ratio specifies the proportion of data to use for training.
/// The remainder goes to validation.
///
/// # Example
///
/// ```
/// use captcha_dataset::SplitRatio;
///
/// let ratio = SplitRatio::EIGHTY_FIVE_FIFTEEN;
/// assert!((ratio.val_ratio() - 0.15).abs() < 1e-6);
/// assert_eq!(ratio.split_point(20), 17);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatio {
    train: f32,
}

impl SplitRatio {
    /// Creates a split ratio, returning `None` unless `train` is in `(0, 1)`.
    #[must_use]
    pub fn try_new(train: f32) -> Option<Self> {
        if train > 0.0 && train < 1.0 {
            Some(Self { train })
        } else {
            None
        }
    }

    /// Creates a split from the validation fraction.
    #[must_use]
    pub fn from_val_fraction(val: f32) -> Option<Self> {
        Self::try_new(1.0 - val)
    }

    /// Returns the training ratio.
    #[must_use]
    pub const fn train_ratio(&self) -> f32 {
        self.train
    }

    /// Returns the validation ratio.
    #[must_use]
    pub fn val_ratio(&self) -> f32 {
        1.0 - self.train
    }

    /// Computes the split point for a given number of items.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn split_point(&self, total: usize) -> usize {
        (total as f32 * self.train).round() as usize
    }

    /// 85/15 split used for CAPTCHA training.
    pub const EIGHTY_FIVE_FIFTEEN: Self = Self { train: 0.85 };

    /// Common 80/20 split.
    pub const EIGHTY_TWENTY: Self = Self { train: 0.8 };

    /// Common 90/10 split.
    pub const NINETY_TEN: Self = Self { train: 0.9 };
}

impl Default for SplitRatio {
    fn default() -> Self {
        Self::EIGHTY_FIVE_FIFTEEN
    }
}

/// Splits samples so every sample of a given label lands on the same side.
///
/// Distinct labels are shuffled with `seed` (or entropy) and divided by
/// `ratio`. With at least two distinct labels both sides are non-empty.
///
/// # Example
///
/// ```
/// use captcha_dataset::{LabeledSample, SplitRatio, split_by_label};
/// use captcha_types::CanonicalImage;
///
/// let samples: Vec<_> = ["ab12", "ab12", "cd34", "ef56"]
///     .iter()
///     .map(|l| LabeledSample::new(*l, CanonicalImage::filled(4, 2, 0.0)))
///     .collect();
///
/// let (train, val) = split_by_label(&samples, SplitRatio::default(), Some(42));
/// assert_eq!(train.len() + val.len(), 4);
/// assert!(!val.is_empty());
/// ```
#[must_use]
pub fn split_by_label(
    samples: &[LabeledSample],
    ratio: SplitRatio,
    seed: Option<u64>,
) -> (Vec<LabeledSample>, Vec<LabeledSample>) {
    let mut groups: BTreeMap<&str, Vec<&LabeledSample>> = BTreeMap::new();
    for sample in samples {
        groups.entry(sample.label.as_str()).or_default().push(sample);
    }

    let mut labels: Vec<&str> = groups.keys().copied().collect();
    if labels.len() < 2 {
        return (samples.to_vec(), Vec::new());
    }

    let mut rng = seed.map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64);
    labels.shuffle(&mut rng);

    let split = ratio.split_point(labels.len()).max(1).min(labels.len() - 1);

    let collect = |keys: &[&str]| -> Vec<LabeledSample> {
        keys.iter()
            .flat_map(|key| groups.get(key).into_iter().flatten())
            .map(|&sample| sample.clone())
            .collect()
    };

    (collect(&labels[..split]), collect(&labels[split..]))
}

/// Shuffles indices `0..len` deterministically for one epoch.
#[must_use]
pub fn epoch_order(len: usize, seed: Option<u64>, epoch: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..len).collect();
    let mut rng = seed.map_or_else(ChaCha8Rng::from_entropy, |s| {
        ChaCha8Rng::seed_from_u64(s.wrapping_add(epoch as u64))
    });
    indices.shuffle(&mut rng);
    indices
}
