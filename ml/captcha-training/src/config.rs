//! Training and pipeline configuration.

use std::path::Path;

use captcha_models::{CheckpointFormat, EncoderConfig};
use captcha_types::{CanonicalParams, Vocabulary};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainingError};

/// Configuration for a training run.
///
/// # Example
///
/// ```
/// use captcha_training::TrainingConfig;
///
/// let config = TrainingConfig::default();
/// assert_eq!(config.epochs, 100);
/// assert_eq!(config.batch_size, 32);
/// assert_eq!(config.seed, Some(42));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Maximum number of training epochs.
    pub epochs: usize,

    /// Batch size.
    pub batch_size: usize,

    /// Optimizer configuration.
    pub optimizer: OptimizerConfig,

    /// Per-epoch learning rate schedule.
    pub lr_schedule: LearningRateSchedule,

    /// Reduce the learning rate when validation loss stalls (`None` = off).
    pub plateau: Option<PlateauConfig>,

    /// Whether to shuffle training data each epoch.
    pub shuffle: bool,

    /// Early stopping patience in epochs (0 = disabled).
    pub early_stopping_patience: usize,

    /// Reload the best-validation weights when training stops.
    pub restore_best_weights: bool,

    /// Gradient norm clipping threshold (0.0 = disabled).
    pub gradient_clip: f32,

    /// Fraction of distinct labels held out for validation.
    pub val_fraction: f32,

    /// Random seed for the split and shuffling.
    pub seed: Option<u64>,

    /// Weight file format for checkpoint and final weights.
    pub checkpoint_format: CheckpointFormat,

    /// Continue from a matching checkpoint in the output artifact.
    pub resume: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::new(100)
    }
}

impl TrainingConfig {
    /// Creates a new training config with the given epochs.
    #[must_use]
    pub const fn new(epochs: usize) -> Self {
        Self {
            epochs,
            batch_size: 32,
            optimizer: OptimizerConfig::adam(1e-3),
            lr_schedule: LearningRateSchedule::Constant,
            plateau: Some(PlateauConfig::new()),
            shuffle: true,
            early_stopping_patience: 10,
            restore_best_weights: true,
            gradient_clip: 1.0,
            val_fraction: 0.15,
            seed: Some(42),
            checkpoint_format: CheckpointFormat::Binary,
            resume: false,
        }
    }

    /// Sets the batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the optimizer.
    #[must_use]
    pub const fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Sets the learning rate schedule.
    #[must_use]
    pub const fn with_lr_schedule(mut self, schedule: LearningRateSchedule) -> Self {
        self.lr_schedule = schedule;
        self
    }

    /// Sets or disables plateau reduction.
    #[must_use]
    pub const fn with_plateau(mut self, plateau: Option<PlateauConfig>) -> Self {
        self.plateau = plateau;
        self
    }

    /// Sets early stopping patience.
    #[must_use]
    pub const fn with_early_stopping(mut self, patience: usize) -> Self {
        self.early_stopping_patience = patience;
        self
    }

    /// Sets the validation fraction.
    #[must_use]
    pub const fn with_val_fraction(mut self, fraction: f32) -> Self {
        self.val_fraction = fraction;
        self
    }

    /// Sets the random seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the weight file format.
    #[must_use]
    pub const fn with_checkpoint_format(mut self, format: CheckpointFormat) -> Self {
        self.checkpoint_format = format;
        self
    }

    /// Enables resuming from a matching checkpoint.
    #[must_use]
    pub const fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// Disables shuffling.
    #[must_use]
    pub const fn without_shuffle(mut self) -> Self {
        self.shuffle = false;
        self
    }

    /// Validates the configuration.
    ///
    /// Returns `true` if all values are valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.epochs > 0
            && self.batch_size > 0
            && self.gradient_clip >= 0.0
            && (0.0..1.0).contains(&self.val_fraction)
            && self.optimizer.is_valid()
            && self.plateau.as_ref().map_or(true, PlateauConfig::is_valid)
    }
}

/// Adam optimizer configuration.
///
/// # Example
///
/// ```
/// use captcha_training::OptimizerConfig;
///
/// let adam = OptimizerConfig::adam(1e-3);
/// assert_eq!(adam.learning_rate, 1e-3);
/// assert_eq!(adam.epsilon, 1e-7);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Base learning rate.
    pub learning_rate: f64,

    /// Weight decay (L2 penalty, 0.0 = off).
    pub weight_decay: f32,

    /// First moment decay.
    pub beta1: f32,

    /// Second moment decay.
    pub beta2: f32,

    /// Denominator epsilon.
    pub epsilon: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::adam(1e-3)
    }
}

impl OptimizerConfig {
    /// Creates an Adam optimizer config.
    #[must_use]
    pub const fn adam(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            weight_decay: 0.0,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }

    /// Sets weight decay.
    #[must_use]
    pub const fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    /// Validates the configuration.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.learning_rate > 0.0
            && self.weight_decay >= 0.0
            && (0.0..1.0).contains(&self.beta1)
            && (0.0..1.0).contains(&self.beta2)
            && self.epsilon > 0.0
    }
}

/// Learning rate schedule applied per epoch.
///
/// # Example
///
/// ```
/// use captcha_training::LearningRateSchedule;
///
/// let schedule = LearningRateSchedule::step(0.1, 30);
/// assert!((schedule.compute_lr(1.0, 30, 100) - 0.1).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum LearningRateSchedule {
    /// Constant learning rate.
    #[default]
    Constant,

    /// Step decay: multiply by factor every `step_size` epochs.
    Step {
        /// Decay factor.
        factor: f64,
        /// Epochs between decays.
        step_size: usize,
    },

    /// Exponential decay: lr * gamma^epoch.
    Exponential {
        /// Decay rate per epoch.
        gamma: f64,
    },

    /// Cosine annealing to minimum.
    Cosine {
        /// Minimum learning rate.
        min_lr: f64,
    },
}

impl LearningRateSchedule {
    /// Creates a step decay schedule.
    #[must_use]
    pub const fn step(factor: f64, step_size: usize) -> Self {
        Self::Step { factor, step_size }
    }

    /// Creates an exponential decay schedule.
    #[must_use]
    pub const fn exponential(gamma: f64) -> Self {
        Self::Exponential { gamma }
    }

    /// Creates a cosine annealing schedule.
    #[must_use]
    pub const fn cosine(min_lr: f64) -> Self {
        Self::Cosine { min_lr }
    }

    /// Computes the learning rate for a given epoch (0-indexed).
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap
    )]
    pub fn compute_lr(&self, base_lr: f64, epoch: usize, total_epochs: usize) -> f64 {
        match self {
            Self::Constant => base_lr,

            Self::Step { factor, step_size } => {
                let decays = epoch / (*step_size).max(1);
                base_lr * factor.powi(decays as i32)
            }

            Self::Exponential { gamma } => base_lr * gamma.powi(epoch as i32),

            Self::Cosine { min_lr } => {
                let progress = epoch as f64 / total_epochs.max(1) as f64;
                let cosine = (std::f64::consts::PI * progress).cos();
                min_lr + (base_lr - min_lr) * (1.0 + cosine) / 2.0
            }
        }
    }
}

/// Reduce-on-plateau settings.
///
/// After `patience` epochs without the monitored loss improving by more than
/// `min_delta`, the learning rate is multiplied by `factor`, never going
/// below `min_lr`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlateauConfig {
    /// Epochs without improvement before reducing.
    pub patience: usize,

    /// Multiplier applied on each reduction.
    pub factor: f64,

    /// Learning rate floor.
    pub min_lr: f64,

    /// Minimum decrease that counts as an improvement.
    pub min_delta: f32,
}

impl Default for PlateauConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PlateauConfig {
    /// Patience 5, factor 0.5, floor 1e-6.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            patience: 5,
            factor: 0.5,
            min_lr: 1e-6,
            min_delta: 1e-4,
        }
    }

    /// Validates the configuration.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.patience > 0
            && self.factor > 0.0
            && self.factor < 1.0
            && self.min_lr >= 0.0
            && self.min_delta >= 0.0
    }
}

/// Everything a training run needs besides the data: canonicalization,
/// architecture, optimization and the longest admissible label.
///
/// The architecture's input size and class count are filled in from
/// `canonical` and the run's vocabulary by [`encoder_for`](Self::encoder_for),
/// so they are never maintained twice.
///
/// # Example
///
/// ```
/// use captcha_training::PipelineConfig;
///
/// let config = PipelineConfig::default();
/// assert_eq!(config.max_length, 4);
/// assert!(config.validate().is_ok());
///
/// let json = serde_json::to_string(&config).unwrap();
/// let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();
/// assert_eq!(parsed, config);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Longest admissible label.
    pub max_length: usize,

    /// Canonicalization parameters.
    pub canonical: CanonicalParams,

    /// Architecture hyperparameters.
    pub architecture: EncoderConfig,

    /// Optimization settings.
    pub training: TrainingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let canonical = CanonicalParams::default();
        Self {
            max_length: 4,
            architecture: EncoderConfig::new(
                canonical.width as usize,
                canonical.height as usize,
                2,
            ),
            canonical,
            training: TrainingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Sets the maximum label length.
    #[must_use]
    pub const fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Sets the canonicalization parameters.
    #[must_use]
    pub fn with_canonical(mut self, canonical: CanonicalParams) -> Self {
        self.canonical = canonical;
        self
    }

    /// Sets the architecture.
    #[must_use]
    pub const fn with_architecture(mut self, architecture: EncoderConfig) -> Self {
        self.architecture = architecture;
        self
    }

    /// Sets the training settings.
    #[must_use]
    pub fn with_training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }

    /// Architecture sized for `canonical` with `num_classes` outputs.
    #[must_use]
    pub fn encoder_with_classes(&self, num_classes: usize) -> EncoderConfig {
        EncoderConfig {
            input_width: self.canonical.width as usize,
            input_height: self.canonical.height as usize,
            num_classes,
            ..self.architecture
        }
    }

    /// Architecture for a run over `vocab`.
    #[must_use]
    pub fn encoder_for(&self, vocab: &Vocabulary) -> EncoderConfig {
        self.encoder_with_classes(vocab.num_classes())
    }

    /// Checks every part, including that the encoder can align
    /// `max_length` labels.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::InvalidConfig`], [`TrainingError::Types`] or
    /// [`TrainingError::Model`].
    pub fn validate(&self) -> Result<()> {
        if self.max_length == 0 {
            return Err(TrainingError::invalid_config("max_length must be > 0"));
        }
        if !self.training.is_valid() {
            return Err(TrainingError::invalid_config(format!(
                "invalid training settings: {:?}",
                self.training
            )));
        }
        self.canonical.validate()?;
        self.encoder_with_classes(2).validate(self.max_length)?;
        Ok(())
    }

    /// Reads a JSON config; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::Io`] or [`TrainingError::Serialization`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Writes the config as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::Io`] or [`TrainingError::Serialization`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn training_config_default() {
        let config = TrainingConfig::default();
        assert_eq!(config.epochs, 100);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.early_stopping_patience, 10);
        assert!(config.shuffle);
        assert!(config.restore_best_weights);
        assert_eq!(config.plateau, Some(PlateauConfig::new()));
        assert!(config.is_valid());
    }

    #[test]
    fn training_config_builder() {
        let config = TrainingConfig::new(50)
            .with_batch_size(16)
            .with_seed(7)
            .with_val_fraction(0.2)
            .with_plateau(None)
            .without_shuffle();

        assert_eq!(config.epochs, 50);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.seed, Some(7));
        assert!(config.plateau.is_none());
        assert!(!config.shuffle);
        assert!(config.is_valid());
    }

    #[test]
    fn training_config_invalid() {
        assert!(!TrainingConfig::new(0).is_valid());
        assert!(!TrainingConfig::default().with_batch_size(0).is_valid());
        assert!(!TrainingConfig::default().with_val_fraction(1.0).is_valid());
        assert!(!TrainingConfig::default()
            .with_optimizer(OptimizerConfig::adam(0.0))
            .is_valid());
    }

    #[test]
    fn optimizer_config_adam() {
        let config = OptimizerConfig::adam(1e-3).with_weight_decay(1e-4);
        assert_relative_eq!(config.beta1, 0.9);
        assert_relative_eq!(config.beta2, 0.999);
        assert!(config.is_valid());
    }

    #[test]
    fn lr_schedules() {
        assert_relative_eq!(LearningRateSchedule::Constant.compute_lr(0.1, 50, 100), 0.1);

        let step = LearningRateSchedule::step(0.5, 10);
        assert_relative_eq!(step.compute_lr(1.0, 9, 100), 1.0);
        assert_relative_eq!(step.compute_lr(1.0, 20, 100), 0.25);

        let exp = LearningRateSchedule::exponential(0.9);
        assert_relative_eq!(exp.compute_lr(1.0, 2, 100), 0.81, epsilon = 1e-12);

        let cosine = LearningRateSchedule::cosine(0.0);
        assert_relative_eq!(cosine.compute_lr(1.0, 0, 100), 1.0);
        assert_relative_eq!(cosine.compute_lr(1.0, 50, 100), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn lr_schedule_serialization() {
        let json = serde_json::to_string(&LearningRateSchedule::step(0.5, 3)).unwrap();
        assert!(json.contains("\"kind\":\"step\""));
        let parsed: LearningRateSchedule = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, LearningRateSchedule::step(0.5, 3));
    }

    #[test]
    fn plateau_config_validity() {
        assert!(PlateauConfig::new().is_valid());
        let mut bad = PlateauConfig::new();
        bad.factor = 1.0;
        assert!(!bad.is_valid());
    }

    #[test]
    fn pipeline_default_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.architecture.time_steps(), 45);
    }

    #[test]
    fn pipeline_rejects_short_time_axis() {
        // 16 / 4 = 4 steps cannot align 4 characters.
        let config = PipelineConfig::default().with_canonical(CanonicalParams::new(16, 8));
        assert!(matches!(
            config.validate().unwrap_err(),
            TrainingError::Model(_)
        ));
        assert!(config.with_max_length(3).validate().is_ok());
    }

    #[test]
    fn pipeline_encoder_follows_canonical_and_vocab() {
        let vocab = Vocabulary::build(["ab12", "cd34"]).unwrap();
        let config = PipelineConfig::default().with_canonical(CanonicalParams::new(96, 32));
        let encoder = config.encoder_for(&vocab);
        assert_eq!((encoder.input_width, encoder.input_height), (96, 32));
        assert_eq!(encoder.num_classes, 9);
        assert_eq!(encoder.conv_channels, config.architecture.conv_channels);
    }

    #[test]
    fn pipeline_partial_json_uses_defaults() {
        let parsed: PipelineConfig =
            serde_json::from_str(r#"{"max_length": 5, "training": {"epochs": 3}}"#).unwrap();
        assert_eq!(parsed.max_length, 5);
        assert_eq!(parsed.training.epochs, 3);
        assert_eq!(parsed.training.batch_size, 32);
        assert_eq!(parsed.canonical, CanonicalParams::default());
    }

    #[test]
    fn pipeline_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let config = PipelineConfig::default().with_training(TrainingConfig::new(7));
        config.save(&path).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap(), config);
        assert!(PipelineConfig::load(dir.path().join("missing.json")).is_err());
    }
}
