//! Batch construction for CTC training.

use burn::prelude::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use captcha_dataset::LabeledSample;
use captcha_models::image_tensor;
use captcha_types::{CanonicalImage, Vocabulary};

use crate::error::{Result, TrainingError};

/// Images, padded targets and true target lengths for one step.
#[derive(Debug, Clone)]
pub struct CtcBatch<B: Backend> {
    /// `[batch, 1, W, H]` canonical images.
    pub images: Tensor<B, 4>,

    /// `[batch, Lmax]` class indices padded with the blank.
    pub targets: Tensor<B, 2, Int>,

    /// Unpadded length of each target.
    pub target_lengths: Vec<usize>,

    /// Ground-truth labels, for accuracy.
    pub labels: Vec<String>,
}

impl<B: Backend> CtcBatch<B> {
    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns `true` if the batch holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Turns labeled samples into [`CtcBatch`]es.
///
/// Labels longer than `max_length` are rejected before any tensor is built.
/// Shorter labels are padded to the longest label in the batch with the
/// blank index `V`, which never collides with a real class.
///
/// # Example
///
/// ```
/// use burn_ndarray::NdArray;
/// use captcha_dataset::LabeledSample;
/// use captcha_training::CaptchaBatcher;
/// use captcha_types::{CanonicalImage, Vocabulary};
///
/// let vocab = Vocabulary::build(["ab", "abc"]).unwrap();
/// let batcher = CaptchaBatcher::new(vocab, 4, (8, 2));
///
/// let a = LabeledSample::new("ab", CanonicalImage::filled(8, 2, 0.0));
/// let b = LabeledSample::new("cab", CanonicalImage::filled(8, 2, 0.0));
/// let batch = batcher.batch::<NdArray<f32>>(&[&a, &b], &Default::default()).unwrap();
///
/// assert_eq!(batch.targets.dims(), [2, 3]);
/// assert_eq!(batch.target_lengths, vec![2, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct CaptchaBatcher {
    vocab: Vocabulary,
    max_length: usize,
    input_size: (usize, usize),
}

impl CaptchaBatcher {
    /// Creates a batcher for images of `(width, height)`.
    #[must_use]
    pub const fn new(vocab: Vocabulary, max_length: usize, input_size: (usize, usize)) -> Self {
        Self {
            vocab,
            max_length,
            input_size,
        }
    }

    /// The vocabulary labels are encoded against.
    #[must_use]
    pub const fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Blank / padding index.
    #[must_use]
    pub fn blank(&self) -> usize {
        self.vocab.blank_index()
    }

    /// Encodes every label, rejecting empty and over-long labels.
    ///
    /// # Errors
    ///
    /// - [`TrainingError::Dataset`] wrapping `InvalidLabel` or `LabelTooLong`
    /// - [`TrainingError::Dataset`] wrapping `UnknownCharacter`
    pub fn encode_labels(&self, samples: &[&LabeledSample]) -> Result<Vec<Vec<usize>>> {
        samples
            .iter()
            .map(|sample| {
                sample.check_length(self.max_length)?;
                Ok(sample.encode_label(&self.vocab)?)
            })
            .collect()
    }

    /// Builds one batch on `device`.
    ///
    /// # Errors
    ///
    /// See [`encode_labels`](Self::encode_labels); also
    /// [`TrainingError::Batch`] for an empty slice and
    /// [`TrainingError::Model`] for an image of the wrong size.
    #[allow(clippy::cast_possible_wrap)]
    pub fn batch<B: Backend>(
        &self,
        samples: &[&LabeledSample],
        device: &B::Device,
    ) -> Result<CtcBatch<B>> {
        if samples.is_empty() {
            return Err(TrainingError::batch("empty batch"));
        }

        let encoded = self.encode_labels(samples)?;
        let width = encoded.iter().map(Vec::len).max().unwrap_or(0);
        let blank = self.blank() as i64;

        let mut flat = Vec::with_capacity(samples.len() * width);
        for label in &encoded {
            flat.extend(label.iter().map(|&c| c as i64));
            flat.extend(std::iter::repeat(blank).take(width - label.len()));
        }

        let images: Vec<&CanonicalImage> = samples.iter().map(|s| &s.image).collect();

        Ok(CtcBatch {
            images: image_tensor(&images, self.input_size, device)?,
            targets: Tensor::from_data(TensorData::new(flat, [samples.len(), width]), device),
            target_lengths: encoded.iter().map(Vec::len).collect(),
            labels: samples.iter().map(|s| s.label.clone()).collect(),
        })
    }
}
