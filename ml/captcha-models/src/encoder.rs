//! CRNN sequence encoder.
//!
//! Architecture, for a `(W, H, 1)` canonical input:
//!
//! ```text
//! conv 3x3 (c1) -> ReLU -> max 2x2
//! conv 3x3 (c2) -> ReLU -> max 2x2
//! conv 3x3 (c3) -> ReLU -> dropout
//! reshape [B, c3, W/4, H/4] -> [B, T = W/4, c3 * H/4]
//! dense -> ReLU -> dropout
//! BiLSTM (h1) -> BiLSTM (h2)
//! dense -> V + 1 classes per time step
//! ```
//!
//! The width axis survives as the time axis, so `T = W / 4`.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{
    BiLstm, BiLstmConfig, Dropout, DropoutConfig, Initializer, Linear, LinearConfig,
    PaddingConfig2d,
};
use burn::prelude::Backend;
use burn::tensor::activation::{log_softmax, relu, softmax};
use burn::tensor::{Tensor, TensorData};
use captcha_types::{CanonicalImage, CanonicalParams, Vocabulary};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Number of 2x2 pooling stages.
const POOL_STAGES: u32 = 2;

/// Overall downsampling factor along both spatial axes.
pub const STRIDE: usize = 1 << POOL_STAGES;

/// Architecture hyperparameters.
///
/// Persisted in the artifact metadata; training and inference both build the
/// network from this one value.
///
/// # Example
///
/// ```
/// use captcha_models::EncoderConfig;
///
/// let config = EncoderConfig::new(180, 50, 37);
/// assert_eq!(config.time_steps(), 45);
/// assert_eq!(config.feature_dim(), 128 * 12);
/// assert!(config.validate(4).is_ok());
/// assert!(config.validate(45).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Canonical input width (time axis).
    pub input_width: usize,

    /// Canonical input height.
    pub input_height: usize,

    /// Output channels of the three convolution blocks.
    pub conv_channels: [usize; 3],

    /// Dropout after the last convolution block.
    pub conv_dropout: f64,

    /// Width of the dense projection before the recurrent stack.
    pub dense_units: usize,

    /// Dropout after the dense projection.
    pub dense_dropout: f64,

    /// Hidden size of each bidirectional LSTM (per direction).
    pub lstm_hidden: [usize; 2],

    /// Dropout on the input of each LSTM.
    pub lstm_dropout: f64,

    /// Output classes: vocabulary size plus the blank.
    pub num_classes: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self::new(180, 50, 2)
    }
}

impl EncoderConfig {
    /// Creates the default architecture for a given input size and class count.
    #[must_use]
    pub const fn new(input_width: usize, input_height: usize, num_classes: usize) -> Self {
        Self {
            input_width,
            input_height,
            conv_channels: [32, 64, 128],
            conv_dropout: 0.3,
            dense_units: 64,
            dense_dropout: 0.2,
            lstm_hidden: [128, 64],
            lstm_dropout: 0.25,
            num_classes,
        }
    }

    /// Builds the config matching canonicalization params and a vocabulary.
    #[must_use]
    pub fn for_vocabulary(params: &CanonicalParams, vocab: &Vocabulary) -> Self {
        Self::new(
            params.width as usize,
            params.height as usize,
            vocab.num_classes(),
        )
    }

    /// Sets the convolution channels.
    #[must_use]
    pub const fn with_conv_channels(mut self, channels: [usize; 3]) -> Self {
        self.conv_channels = channels;
        self
    }

    /// Sets the dense projection width.
    #[must_use]
    pub const fn with_dense_units(mut self, units: usize) -> Self {
        self.dense_units = units;
        self
    }

    /// Sets the LSTM hidden sizes.
    #[must_use]
    pub const fn with_lstm_hidden(mut self, hidden: [usize; 2]) -> Self {
        self.lstm_hidden = hidden;
        self
    }

    /// Sets all dropout probabilities at once.
    #[must_use]
    pub const fn with_dropout(mut self, conv: f64, dense: f64, lstm: f64) -> Self {
        self.conv_dropout = conv;
        self.dense_dropout = dense;
        self.lstm_dropout = lstm;
        self
    }

    /// Number of output time steps, `W / 4`.
    #[must_use]
    pub const fn time_steps(&self) -> usize {
        self.input_width / STRIDE
    }

    /// Height after pooling.
    #[must_use]
    pub const fn pooled_height(&self) -> usize {
        self.input_height / STRIDE
    }

    /// Per-step feature size fed to the dense projection.
    #[must_use]
    pub const fn feature_dim(&self) -> usize {
        self.conv_channels[2] * self.pooled_height()
    }

    /// Checks the config and that `max_length` labels are alignable.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] if a size is zero, a dropout is
    /// outside `[0, 1)`, there are fewer than two classes, or the number of
    /// time steps does not exceed `max_length`.
    pub fn validate(&self, max_length: usize) -> Result<()> {
        let sizes = [
            self.conv_channels[0],
            self.conv_channels[1],
            self.conv_channels[2],
            self.dense_units,
            self.lstm_hidden[0],
            self.lstm_hidden[1],
        ];
        if sizes.contains(&0) {
            return Err(ModelError::invalid_config("layer sizes must be > 0"));
        }
        if self.pooled_height() == 0 || self.time_steps() == 0 {
            return Err(ModelError::invalid_config(format!(
                "input {}x{} is too small for stride {STRIDE}",
                self.input_width, self.input_height
            )));
        }
        for p in [self.conv_dropout, self.dense_dropout, self.lstm_dropout] {
            if !(0.0..1.0).contains(&p) {
                return Err(ModelError::invalid_config(format!(
                    "dropout {p} outside [0, 1)"
                )));
            }
        }
        if self.num_classes < 2 {
            return Err(ModelError::invalid_config(
                "need at least one character class plus blank",
            ));
        }
        if self.time_steps() <= max_length {
            return Err(ModelError::invalid_config(format!(
                "{} time steps cannot align labels of length {max_length}; \
                 time steps must exceed max_length",
                self.time_steps()
            )));
        }
        Ok(())
    }

    /// Validates and builds a freshly initialized encoder.
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    pub fn init<B: Backend>(&self, max_length: usize, device: &B::Device) -> Result<CaptchaEncoder<B>> {
        self.validate(max_length)?;
        Ok(CaptchaEncoder::new(self, device))
    }
}

/// Convolutional-recurrent encoder emitting per-step class scores.
#[derive(Debug, Module)]
pub struct CaptchaEncoder<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    conv_dropout: Dropout,
    dense: Linear<B>,
    dense_dropout: Dropout,
    lstm_dropout: Dropout,
    lstm1: BiLstm<B>,
    lstm2: BiLstm<B>,
    classifier: Linear<B>,
    input_width: usize,
    input_height: usize,
}

impl<B: Backend> CaptchaEncoder<B> {
    fn new(config: &EncoderConfig, device: &B::Device) -> Self {
        let [c1, c2, c3] = config.conv_channels;
        let [h1, h2] = config.lstm_hidden;
        let conv = |input: usize, output: usize| {
            Conv2dConfig::new([input, output], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .with_initializer(Initializer::KaimingNormal {
                    gain: std::f64::consts::SQRT_2,
                    fan_out_only: false,
                })
                .init(device)
        };

        Self {
            conv1: conv(1, c1),
            conv2: conv(c1, c2),
            conv3: conv(c2, c3),
            conv_dropout: DropoutConfig::new(config.conv_dropout).init(),
            dense: LinearConfig::new(config.feature_dim(), config.dense_units).init(device),
            dense_dropout: DropoutConfig::new(config.dense_dropout).init(),
            lstm_dropout: DropoutConfig::new(config.lstm_dropout).init(),
            lstm1: BiLstmConfig::new(config.dense_units, h1, true).init(device),
            lstm2: BiLstmConfig::new(2 * h1, h2, true).init(device),
            classifier: LinearConfig::new(2 * h2, config.num_classes).init(device),
            input_width: config.input_width,
            input_height: config.input_height,
        }
    }

    /// Number of output time steps.
    #[must_use]
    pub const fn time_steps(&self) -> usize {
        self.input_width / STRIDE
    }

    /// Output classes, read from the classifier weights.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.classifier.weight.val().dims()[1]
    }

    /// Expected canonical `(width, height)`.
    #[must_use]
    pub const fn input_size(&self) -> (usize, usize) {
        (self.input_width, self.input_height)
    }

    /// Stacks canonical images into a `[batch, 1, W, H]` tensor.
    ///
    /// # Errors
    ///
    /// See [`image_tensor`].
    pub fn image_batch(&self, images: &[&CanonicalImage], device: &B::Device) -> Result<Tensor<B, 4>> {
        image_tensor(images, self.input_size(), device)
    }

    /// Raw per-step scores, `[batch, T, V + 1]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        let x = max_pool_2x2(relu(self.conv1.forward(images)));
        let x = max_pool_2x2(relu(self.conv2.forward(x)));
        let x = relu(self.conv3.forward(x));
        let x = self.conv_dropout.forward(x);

        // [B, C, T, H'] -> [B, T, C * H']
        let [batch, channels, steps, height] = x.dims();
        let x = x.swap_dims(1, 2).reshape([batch, steps, channels * height]);

        let x = self.dense_dropout.forward(relu(self.dense.forward(x)));
        let (x, _) = self.lstm1.forward(self.lstm_dropout.forward(x), None);
        let (x, _) = self.lstm2.forward(self.lstm_dropout.forward(x), None);
        self.classifier.forward(x)
    }

    /// Per-step class probabilities.
    pub fn forward_probs(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        softmax(self.forward(images), 2)
    }

    /// Per-step class log-probabilities, the input of the CTC loss.
    pub fn forward_log_probs(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        log_softmax(self.forward(images), 2)
    }
}

/// 2x2 max pooling with stride 2 over the last two axes.
///
/// An odd trailing row or column is dropped, so each axis shrinks to
/// `floor(n / 2)`. Built from `reshape` and `max_dim`: the ndarray pooling
/// kernel scatters gradients to the wrong cells on non-square maps.
fn max_pool_2x2<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    let [batch, channels, width, height] = x.dims();
    let (w, h) = (width / 2, height / 2);
    let x = if width % 2 == 0 && height % 2 == 0 {
        x
    } else {
        x.slice([0..batch, 0..channels, 0..2 * w, 0..2 * h])
    };
    x.reshape([batch, channels, w, 2, h, 2])
        .max_dim(5)
        .max_dim(3)
        .reshape([batch, channels, w, h])
}

/// Stacks canonical images of size `(w, h)` into a `[batch, 1, W, H]` tensor.
///
/// # Errors
///
/// Returns [`ModelError::ShapeMismatch`] for an empty batch or an image of
/// the wrong size.
pub fn image_tensor<B: Backend>(
    images: &[&CanonicalImage],
    (w, h): (usize, usize),
    device: &B::Device,
) -> Result<Tensor<B, 4>> {
    if images.is_empty() {
        return Err(ModelError::shape_mismatch("at least one image", "empty batch"));
    }

    let mut data = Vec::with_capacity(images.len() * w * h);
    for image in images {
        if image.width() as usize != w || image.height() as usize != h {
            return Err(ModelError::shape_mismatch(
                format!("[{w}, {h}, 1]"),
                format!("{:?}", image.shape()),
            ));
        }
        data.extend_from_slice(image.data());
    }

    let len = data.len();
    Ok(Tensor::<B, 1>::from_data(TensorData::new(data, [len]), device)
        .reshape([images.len(), 1, w, h]))
}
