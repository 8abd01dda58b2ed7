//! Dataset tooling for CAPTCHA sequence recognition.
//!
//! # Canonicalization
//!
//! - [`Canonicalizer`] - The single image-to-tensor transform shared by
//!   training and inference
//!
//! # Dataset Operations
//!
//! - [`LabeledSample`] - Canonical image with its ground-truth label
//! - [`load_labeled_dir`] / [`load_sources`] - Load label-named image files
//! - [`split_by_label`] - Train/validation split that keeps labels together
//! - [`DatasetSummary`] - Statistics about a dataset
//! - [`GoldStore`] - Persist accepted predictions as new samples
//!
//! # Example
//!
//! ```
//! use captcha_dataset::{Canonicalizer, LabeledSample, SplitRatio, split_by_label};
//! use captcha_types::CanonicalParams;
//! use image::{DynamicImage, Rgb, RgbImage};
//!
//! let canon = Canonicalizer::new(CanonicalParams::default()).unwrap();
//! let raw = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 60, Rgb([255, 255, 255])));
//!
//! let samples: Vec<_> = ["ab12", "cd34", "ef56", "gh78"]
//!     .iter()
//!     .map(|label| LabeledSample::new(*label, canon.canonicalize(&raw).unwrap()))
//!     .collect();
//!
//! let (train, val) = split_by_label(&samples, SplitRatio::default(), Some(42));
//! assert_eq!(train.len(), 3);
//! assert_eq!(val.len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod canonicalize;
mod error;
mod gold;
mod loader;
mod sample;
mod splits;
mod summary;

pub use canonicalize::{Canonicalizer, decode_image, fitted_size};
pub use error::{DatasetError, Result};
pub use gold::GoldStore;
pub use loader::{
    IMAGE_EXTENSIONS, LoadReport, SkipReason, SkippedFile, label_from_path, list_images,
    load_labeled_dir, load_sources,
};
pub use sample::{LabeledSample, check_label_lengths};
pub use splits::{SplitRatio, epoch_order, split_by_label};
pub use summary::DatasetSummary;

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        Canonicalizer, DatasetError, DatasetSummary, GoldStore, LabeledSample, LoadReport,
        SplitRatio, load_labeled_dir, load_sources, split_by_label,
    };
}
