//! Image canonicalization.
//!
//! Turns an arbitrary raster image into the exact `(W, H, 1)` tensor the
//! encoder consumes. Training data preparation and inference both go through
//! [`Canonicalizer`], parameterized only by [`CanonicalParams`], so there is a
//! single implementation of the transform.
//!
//! Steps, in order:
//!
//! 1. Composite transparent pixels onto the opaque background color.
//! 2. Reduce to luminance (ITU-R 601-2, integer arithmetic).
//! 3. Binarize against the threshold: ink becomes foreground.
//! 4. Nearest-neighbor resize preserving aspect ratio, centered on a
//!    background-filled canvas of exactly `W x H`.
//! 5. Emit width-major values in the configured range.

use std::path::Path;

use captcha_types::{CanonicalImage, CanonicalParams};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use tracing::debug;

use crate::error::{DatasetError, Result};

const INK: u8 = 255;
const PAPER: u8 = 0;

/// Deterministic image-to-tensor transform.
///
/// # Example
///
/// ```
/// use captcha_dataset::Canonicalizer;
/// use captcha_types::CanonicalParams;
/// use image::{DynamicImage, RgbImage};
///
/// let canon = Canonicalizer::new(CanonicalParams::default()).unwrap();
/// let blank = DynamicImage::ImageRgb8(RgbImage::from_pixel(90, 30, image::Rgb([255, 255, 255])));
/// let tensor = canon.canonicalize(&blank).unwrap();
///
/// assert_eq!(tensor.shape(), [180, 50, 1]);
/// assert!(tensor.is_uniform(0.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canonicalizer {
    params: CanonicalParams,
}

impl Canonicalizer {
    /// Creates a canonicalizer.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Types`] if the parameters fail validation.
    pub fn new(params: CanonicalParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// The parameters this canonicalizer applies.
    #[must_use]
    pub const fn params(&self) -> &CanonicalParams {
        &self.params
    }

    /// Decodes and canonicalizes encoded image bytes (PNG, JPEG).
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::ImageDecode`] for unreadable bytes and
    /// [`DatasetError::InvalidDimensions`] for zero-area images.
    pub fn canonicalize_bytes(&self, bytes: &[u8]) -> Result<CanonicalImage> {
        let image = decode_image(bytes, None)?;
        self.canonicalize(&image)
    }

    /// Reads, decodes and canonicalizes an image file.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Io`] if the file cannot be read, otherwise the
    /// same errors as [`canonicalize_bytes`](Self::canonicalize_bytes).
    pub fn canonicalize_path(&self, path: &Path) -> Result<CanonicalImage> {
        let bytes = std::fs::read(path)
            .map_err(|e| DatasetError::io(format!("{}: {e}", path.display())))?;
        let image = decode_image(&bytes, Some(&path.display().to_string()))?;
        self.canonicalize(&image)
    }

    /// Canonicalizes a decoded image.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidDimensions`] for zero-area images.
    pub fn canonicalize(&self, image: &DynamicImage) -> Result<CanonicalImage> {
        let (src_w, src_h) = (image.width(), image.height());
        if src_w == 0 || src_h == 0 {
            return Err(DatasetError::invalid_dimensions(src_w, src_h));
        }

        let binary = self.binarize(image);
        let canvas = self.fit_to_canvas(&binary);

        debug!(
            src_w,
            src_h,
            target_w = self.params.width,
            target_h = self.params.height,
            "canonicalized image"
        );

        self.emit(&canvas)
    }

    /// Steps 1-3: composite, luminance, threshold. Ink pixels become [`INK`].
    fn binarize(&self, image: &DynamicImage) -> GrayImage {
        let has_alpha = image.color().has_alpha();
        let rgba = image.to_rgba8();
        let [bg_r, bg_g, bg_b] = self.params.transparency_background;
        let threshold = self.params.threshold;
        let polarity = self.params.polarity;

        GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
            let [r, g, b, a] = rgba.get_pixel(x, y).0;
            let (r, g, b) = if has_alpha {
                (
                    composite(r, bg_r, a),
                    composite(g, bg_g, a),
                    composite(b, bg_b, a),
                )
            } else {
                (r, g, b)
            };
            if polarity.is_ink(luminance(r, g, b), threshold) {
                Luma([INK])
            } else {
                Luma([PAPER])
            }
        })
    }

    /// Step 4: aspect-preserving nearest resize, centered on a blank canvas.
    fn fit_to_canvas(&self, binary: &GrayImage) -> GrayImage {
        let (target_w, target_h) = (self.params.width, self.params.height);
        let (new_w, new_h) = fitted_size(binary.width(), binary.height(), target_w, target_h);

        let resized = if (new_w, new_h) == binary.dimensions() {
            binary.clone()
        } else {
            imageops::resize(binary, new_w, new_h, FilterType::Nearest)
        };

        let mut canvas = GrayImage::from_pixel(target_w, target_h, Luma([PAPER]));
        let offset_x = (target_w - new_w) / 2;
        let offset_y = (target_h - new_h) / 2;
        imageops::replace(
            &mut canvas,
            &resized,
            i64::from(offset_x),
            i64::from(offset_y),
        );
        canvas
    }

    /// Step 5: width-major values in the configured range.
    fn emit(&self, canvas: &GrayImage) -> Result<CanonicalImage> {
        let (w, h) = canvas.dimensions();
        let fg = self.params.foreground_value();
        let bg = self.params.background_value();

        let mut data = Vec::with_capacity(w as usize * h as usize);
        for x in 0..w {
            for y in 0..h {
                let v = if canvas.get_pixel(x, y).0[0] == INK { fg } else { bg };
                data.push(v);
            }
        }

        Ok(CanonicalImage::from_raw(w, h, data)?)
    }
}

/// Decodes encoded image bytes, tagging errors with `source_name`.
///
/// # Errors
///
/// Returns [`DatasetError::ImageDecode`] if the format is unknown or the
/// data is corrupt.
pub fn decode_image(bytes: &[u8], source_name: Option<&str>) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| match source_name {
        Some(name) => DatasetError::image_decode_from(name, e.to_string()),
        None => DatasetError::image_decode(e.to_string()),
    })
}

/// Alpha-composites one channel onto an opaque background.
fn composite(channel: u8, background: u8, alpha: u8) -> u8 {
    let (c, bg, a) = (u32::from(channel), u32::from(background), u32::from(alpha));
    let mixed = (c * a + bg * (255 - a) + 127) / 255;
    #[allow(clippy::cast_possible_truncation)]
    let out = mixed.min(255) as u8;
    out
}

/// ITU-R 601-2 luma transform, `L = R*299/1000 + G*587/1000 + B*114/1000`,
/// in 16-bit fixed point with rounding.
fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let l = (u32::from(r) * 19_595 + u32::from(g) * 38_470 + u32::from(b) * 7_471 + 0x8000) >> 16;
    #[allow(clippy::cast_possible_truncation)]
    let out = l.min(255) as u8;
    out
}

/// Largest size with the source aspect ratio that fits the target box.
///
/// Both dimensions are floored and clamped to `1..=target`.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn fitted_size(src_w: u32, src_h: u32, target_w: u32, target_h: u32) -> (u32, u32) {
    let ratio = (f64::from(target_w) / f64::from(src_w)).min(f64::from(target_h) / f64::from(src_h));
    let new_w = (f64::from(src_w) * ratio).floor() as u32;
    let new_h = (f64::from(src_h) * ratio).floor() as u32;
    (new_w.clamp(1, target_w), new_h.clamp(1, target_h))
}
