//! Shared types for CAPTCHA sequence recognition.
//!
//! # Types
//!
//! - [`Vocabulary`] - Sorted character set with label encode/decode
//! - [`CanonicalParams`] - Parameters of the image canonicalization pipeline
//! - [`CanonicalImage`] - Fixed-shape `(W, H, 1)` tensor fed to the encoder
//! - [`Prediction`] - Decoded text for one image
//! - [`SchemaVersion`] - Artifact metadata version
//!
//! These types carry no framework dependencies so the dataset tooling, the
//! model crate and the solver service share one definition of each.
//!
//! # Example
//!
//! ```
//! use captcha_types::{CanonicalParams, Vocabulary};
//!
//! let vocab = Vocabulary::build(["ab12", "cd34"]).unwrap();
//! let params = CanonicalParams::default();
//!
//! assert_eq!(vocab.num_classes(), 9);
//! assert_eq!(params.shape(), [180, 50, 1]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod canonical;
mod error;
mod prediction;
mod version;
mod vocabulary;

pub use canonical::{CanonicalImage, CanonicalParams, Orientation, Polarity, ValueRange};
pub use error::{Result, TypesError};
pub use prediction::Prediction;
pub use version::SchemaVersion;
pub use vocabulary::Vocabulary;

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        CanonicalImage, CanonicalParams, Orientation, Polarity, Prediction, SchemaVersion,
        TypesError, ValueRange, Vocabulary,
    };
}
