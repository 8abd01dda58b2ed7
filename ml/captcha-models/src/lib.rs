//! Burn sequence encoder, greedy decoding and artifact persistence for
//! CAPTCHA recognition.
//!
//! # Model
//!
//! - [`EncoderConfig`] - Architecture hyperparameters, persisted as data
//! - [`CaptchaEncoder`] - CNN + BiLSTM encoder emitting `T x (V + 1)` scores
//! - [`GreedyDecoder`] - Best-path CTC decoding to text
//!
//! # Persistence
//!
//! - [`ModelArtifact`] - Directory holding metadata and weight files
//! - [`ArtifactMetadata`] - Vocabulary, canonical params and architecture
//! - [`LoadStrategy`] - Ordered weight sources tried on load
//!
//! # Backend Support
//!
//! Models are generic over Burn backends. Inference uses
//! [`InferenceBackend`] (`burn-ndarray`); training wraps it in
//! `burn-autodiff`.
//!
//! # Example
//!
//! ```
//! use burn_ndarray::NdArray;
//! use captcha_models::{EncoderConfig, GreedyDecoder};
//! use captcha_types::{CanonicalImage, CanonicalParams, Vocabulary};
//!
//! let vocab = Vocabulary::build(["ab12", "cd34"]).unwrap();
//! let config = EncoderConfig::for_vocabulary(&CanonicalParams::default(), &vocab);
//!
//! let device = Default::default();
//! let encoder = config.init::<NdArray<f32>>(4, &device).unwrap();
//!
//! let blank = CanonicalImage::filled(180, 50, 0.0);
//! let input = encoder.image_batch(&[&blank], &device).unwrap();
//! let preds = GreedyDecoder::new(vocab).decode_batch(encoder.forward_probs(input));
//! assert_eq!(preds.len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod artifact;
mod backend;
mod checkpoint;
mod decoder;
mod encoder;
mod error;

pub use artifact::{
    ArtifactMetadata, LoadAttempt, LoadOutcome, LoadStrategy, LoadedModel, METADATA_FILE,
    ModelArtifact,
};
pub use backend::{BackendType, InferenceBackend};
pub use checkpoint::{CheckpointFormat, load_weights, save_weights};
pub use decoder::GreedyDecoder;
pub use encoder::{CaptchaEncoder, EncoderConfig, STRIDE, image_tensor};
pub use error::{ModelError, Result};

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        ArtifactMetadata, BackendType, CaptchaEncoder, CheckpointFormat, EncoderConfig,
        GreedyDecoder, LoadStrategy, ModelArtifact, ModelError,
    };
}
