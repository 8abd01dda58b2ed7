//! Canonicalization parameters and the canonical image tensor.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TypesError};

/// Which side of the threshold counts as ink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Luminance below the threshold is ink (dark text on a light background).
    #[default]
    DarkInk,

    /// Luminance at or above the threshold is ink (light text on a dark background).
    LightInk,
}

impl Polarity {
    /// Returns `true` if a pixel with `luma` is ink under this polarity.
    #[must_use]
    pub const fn is_ink(&self, luma: u8, threshold: u8) -> bool {
        match self {
            Self::DarkInk => luma < threshold,
            Self::LightInk => luma >= threshold,
        }
    }
}

/// Numeric range of canonical tensor values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValueRange {
    /// Background `0.0`, foreground `1.0`.
    #[default]
    Unit,

    /// Background `0.0`, foreground `255.0`.
    Byte,
}

impl ValueRange {
    /// Value written for ink pixels.
    #[must_use]
    pub const fn foreground(&self) -> f32 {
        match self {
            Self::Unit => 1.0,
            Self::Byte => 255.0,
        }
    }

    /// Value written for background and padding pixels.
    #[must_use]
    pub const fn background(&self) -> f32 {
        0.0
    }
}

/// Axis order of the emitted tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Shape `(W, H, 1)`: width is the leading (time) axis.
    #[default]
    WidthMajor,
}

/// Parameters of the canonicalization pipeline.
///
/// Persisted with every model artifact; inference always canonicalizes with
/// the parameters of the artifact it serves.
///
/// # Example
///
/// ```
/// use captcha_types::CanonicalParams;
///
/// let params = CanonicalParams::default();
/// assert_eq!((params.width, params.height), (180, 50));
/// assert_eq!(params.threshold, 180);
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalParams {
    /// Target width `W` (time axis).
    pub width: u32,

    /// Target height `H`.
    pub height: u32,

    /// Binarization threshold on the 0-255 luminance scale.
    pub threshold: u8,

    /// Opaque RGB color transparent pixels are composited onto.
    pub transparency_background: [u8; 3],

    /// Which side of the threshold is ink.
    #[serde(default)]
    pub polarity: Polarity,

    /// Numeric range of emitted values.
    #[serde(default)]
    pub range: ValueRange,

    /// Axis order of emitted tensors.
    #[serde(default)]
    pub orientation: Orientation,
}

impl Default for CanonicalParams {
    fn default() -> Self {
        Self {
            width: 180,
            height: 50,
            threshold: 180,
            transparency_background: [255, 255, 255],
            polarity: Polarity::DarkInk,
            range: ValueRange::Unit,
            orientation: Orientation::WidthMajor,
        }
    }
}

impl CanonicalParams {
    /// Creates parameters for a custom target size with default policy.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Sets the binarization threshold.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the ink polarity.
    #[must_use]
    pub const fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    /// Sets the value range.
    #[must_use]
    pub const fn with_range(mut self, range: ValueRange) -> Self {
        self.range = range;
        self
    }

    /// Number of values in one canonical image (`W * H`).
    #[must_use]
    pub const fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Returns `true` if the target box has zero area.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tensor shape `(W, H, 1)`.
    #[must_use]
    pub const fn shape(&self) -> [usize; 3] {
        [self.width as usize, self.height as usize, 1]
    }

    /// Foreground value under the configured range.
    #[must_use]
    pub const fn foreground_value(&self) -> f32 {
        self.range.foreground()
    }

    /// Background value under the configured range.
    #[must_use]
    pub const fn background_value(&self) -> f32 {
        self.range.background()
    }

    /// Checks the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::InvalidParams`] if either dimension is zero,
    /// the width does not exceed the height (the time axis must be the wider
    /// one), or the threshold is zero (nothing could ever be dark ink).
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(TypesError::invalid_params(format!(
                "target size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.width <= self.height {
            return Err(TypesError::invalid_params(format!(
                "width ({}) must exceed height ({}) so width is the time axis",
                self.width, self.height
            )));
        }
        if self.threshold == 0 && self.polarity == Polarity::DarkInk {
            return Err(TypesError::invalid_params(
                "threshold 0 marks no pixel as dark ink",
            ));
        }
        Ok(())
    }
}

/// Fixed-size single-channel tensor produced by canonicalization.
///
/// Values are stored width-major: element `(x, y)` lives at `x * H + y`,
/// matching shape `(W, H, 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalImage {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl CanonicalImage {
    /// Creates an image filled with `value`.
    #[must_use]
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Wraps width-major data.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::ShapeMismatch`] if `data.len() != width * height`.
    pub fn from_raw(width: u32, height: u32, data: Vec<f32>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(TypesError::shape_mismatch(expected, data.len()));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Width (time axis length before downsampling).
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Tensor shape `(W, H, 1)`.
    #[must_use]
    pub const fn shape(&self) -> [usize; 3] {
        [self.width as usize, self.height as usize, 1]
    }

    /// Value at column `x`, row `y`.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(x as usize * self.height as usize + y as usize)
            .copied()
    }

    /// Sets the value at column `x`, row `y`. Out-of-range writes are ignored.
    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        if x < self.width && y < self.height {
            let idx = x as usize * self.height as usize + y as usize;
            self.data[idx] = value;
        }
    }

    /// Width-major values.
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Consumes the image and returns its width-major values.
    #[must_use]
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Returns `true` if every value equals `value`.
    #[must_use]
    pub fn is_uniform(&self, value: f32) -> bool {
        self.data.iter().all(|&v| (v - value).abs() < f32::EPSILON)
    }

    /// Fraction of values equal to `foreground`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn foreground_ratio(&self, foreground: f32) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let ink = self
            .data
            .iter()
            .filter(|&&v| (v - foreground).abs() < f32::EPSILON)
            .count();
        ink as f32 / self.data.len() as f32
    }
}
