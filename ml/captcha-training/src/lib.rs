//! Training lifecycle for CAPTCHA sequence recognition.
//!
//! # Training Components
//!
//! - [`PipelineConfig`] - Canonicalization, architecture and optimization in
//!   one serializable value
//! - [`Trainer`] - Adam + CTC optimization loop publishing a model artifact
//! - [`TrainingMetrics`] - Metrics collected during training
//!
//! # Loss
//!
//! - [`ctc_loss`] - Alignment-free sequence loss over blank-augmented paths
//! - [`CaptchaBatcher`] - Pads targets with the blank and records lengths
//!
//! # Evaluation
//!
//! - [`evaluate`] / [`evaluate_encoder`] - Exact-match sequence accuracy
//!
//! # Example
//!
//! ```no_run
//! use captcha_dataset::{Canonicalizer, load_sources};
//! use captcha_training::{PipelineConfig, train};
//!
//! let config = PipelineConfig::default();
//! let canon = Canonicalizer::new(config.canonical).unwrap();
//! let samples = load_sources(&["data/raw", "data/gold"], &canon, config.max_length)
//!     .unwrap()
//!     .into_samples()
//!     .unwrap();
//!
//! let outcome = train(config, &samples, "models/captcha").unwrap();
//! println!("{}", outcome.metrics.summary());
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod batcher;
mod config;
mod ctc;
mod error;
mod evaluate;
mod metrics;
mod trainer;

pub use batcher::{CaptchaBatcher, CtcBatch};
pub use config::{
    LearningRateSchedule, OptimizerConfig, PipelineConfig, PlateauConfig, TrainingConfig,
};
pub use ctc::{LOG_ZERO, ctc_loss, ctc_nll};
pub use error::{Result, TrainingError};
pub use evaluate::{EvaluationReport, MAX_MISMATCHES, Mismatch, evaluate, evaluate_encoder};
pub use metrics::{EpochMetrics, TrainingMetrics};
pub use trainer::{
    ReduceOnPlateau, Trainer, TrainingBackend, TrainingOutcome, TrainingState, train,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        CaptchaBatcher, EpochMetrics, EvaluationReport, LearningRateSchedule, OptimizerConfig,
        PipelineConfig, Trainer, TrainingConfig, TrainingError, TrainingMetrics, TrainingOutcome,
        ctc_loss, evaluate, train,
    };
}
