//! Training loop implementation.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::Backend;
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;
use captcha_dataset::{
    DatasetError, LabeledSample, SplitRatio, check_label_lengths, epoch_order, split_by_label,
};
use captcha_models::{
    ArtifactMetadata, CaptchaEncoder, GreedyDecoder, LoadStrategy, ModelArtifact, load_weights,
};
use captcha_types::Vocabulary;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::batcher::CaptchaBatcher;
use crate::config::{PipelineConfig, PlateauConfig};
use crate::ctc::{ctc_loss, ctc_nll};
use crate::error::{Result, TrainingError};
use crate::evaluate::EvaluationReport;
use crate::metrics::{EpochMetrics, TrainingMetrics};

/// Default training backend: autodiff over the CPU backend.
pub type TrainingBackend = burn_autodiff::Autodiff<burn_ndarray::NdArray<f32>>;

/// Epoch counter, early-stopping bookkeeping and metrics of a run.
///
/// # Example
///
/// ```
/// use captcha_training::TrainingState;
///
/// let mut state = TrainingState::new(10);
/// assert!(state.record_loss(3.0));
/// assert!(!state.record_loss(3.5));
/// assert_eq!(state.stale_epochs, 1);
/// assert!(state.should_early_stop(1));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    /// Next epoch to run.
    pub epoch: usize,

    /// Epoch budget.
    pub total_epochs: usize,

    /// Lowest monitored loss so far.
    pub best_loss: Option<f32>,

    /// Epochs since `best_loss` last improved.
    pub stale_epochs: usize,

    /// Set once the budget is spent or early stopping fired.
    pub finished: bool,

    /// Completed epochs.
    pub metrics: TrainingMetrics,
}

impl TrainingState {
    /// State before the first of `total_epochs`.
    #[must_use]
    pub fn new(total_epochs: usize) -> Self {
        Self {
            total_epochs,
            finished: total_epochs == 0,
            ..Self::default()
        }
    }

    /// Returns true if no further epoch should run.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Moves to the next epoch.
    pub const fn next_epoch(&mut self) {
        self.epoch += 1;
        if self.epoch >= self.total_epochs {
            self.finished = true;
        }
    }

    /// Records an epoch's monitored loss; returns true on a new best.
    pub fn record_loss(&mut self, loss: f32) -> bool {
        let improved = self.best_loss.map_or(true, |best| loss < best);
        if improved {
            self.best_loss = Some(loss);
            self.stale_epochs = 0;
        } else {
            self.stale_epochs += 1;
        }
        improved
    }

    /// True once `patience` epochs passed without improvement. Zero disables.
    #[must_use]
    pub const fn should_early_stop(&self, patience: usize) -> bool {
        patience > 0 && self.stale_epochs >= patience
    }

    /// Ends the run early.
    pub fn early_stop(&mut self, reason: impl Into<String>) {
        self.finished = true;
        self.metrics.set_early_stopped(reason);
    }
}

/// Reduce-on-plateau learning rate scaling.
///
/// # Example
///
/// ```
/// use captcha_training::{PlateauConfig, ReduceOnPlateau};
///
/// let mut plateau = ReduceOnPlateau::new(PlateauConfig { patience: 2, ..PlateauConfig::new() });
/// plateau.step(1.0);
/// assert!(!plateau.step(1.0));
/// assert!(plateau.step(1.0));
/// assert!((plateau.apply(1e-3) - 5e-4).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReduceOnPlateau {
    config: PlateauConfig,
    best: Option<f32>,
    wait: usize,
    scale: f64,
}

impl ReduceOnPlateau {
    /// Creates a scheduler at full learning rate.
    #[must_use]
    pub const fn new(config: PlateauConfig) -> Self {
        Self {
            config,
            best: None,
            wait: 0,
            scale: 1.0,
        }
    }

    /// Cumulative multiplier applied so far.
    #[must_use]
    pub const fn scale(&self) -> f64 {
        self.scale
    }

    /// Scales `lr`, never below the configured floor once reduced.
    #[must_use]
    pub fn apply(&self, lr: f64) -> f64 {
        if self.scale < 1.0 {
            (lr * self.scale).max(self.config.min_lr)
        } else {
            lr
        }
    }

    /// Feeds one epoch's monitored loss; returns true if the rate was cut.
    pub fn step(&mut self, loss: f32) -> bool {
        match self.best {
            Some(best) if loss >= best - self.config.min_delta => {
                self.wait += 1;
                if self.wait >= self.config.patience {
                    self.wait = 0;
                    self.scale *= self.config.factor;
                    return true;
                }
                false
            }
            _ => {
                self.best = Some(loss);
                self.wait = 0;
                false
            }
        }
    }
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// Per-epoch and aggregate metrics.
    pub metrics: TrainingMetrics,

    /// Artifact directory holding metadata, checkpoint and final weights.
    pub artifact_dir: PathBuf,

    /// Metadata written to the artifact.
    pub metadata: ArtifactMetadata,
}

/// Trainer for CTC sequence recognition.
///
/// # Example
///
/// ```
/// use captcha_training::{PipelineConfig, Trainer, TrainingConfig};
///
/// let trainer = Trainer::new(PipelineConfig::default().with_training(TrainingConfig::new(10)));
///
/// assert_eq!(trainer.config().training.epochs, 10);
/// assert_eq!(trainer.num_batches(100), 4);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    config: PipelineConfig,
}

impl Trainer {
    /// Creates a new trainer with the given config.
    #[must_use]
    pub const fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Returns the pipeline configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Creates initial training state.
    #[must_use]
    pub fn initial_state(&self) -> TrainingState {
        TrainingState::new(self.config.training.epochs)
    }

    /// Scheduled learning rate for `epoch`, before plateau scaling.
    #[must_use]
    pub fn compute_lr(&self, epoch: usize) -> f64 {
        let training = &self.config.training;
        training
            .lr_schedule
            .compute_lr(training.optimizer.learning_rate, epoch, training.epochs)
    }

    /// Computes the number of batches for a dataset size.
    #[must_use]
    pub const fn num_batches(&self, dataset_size: usize) -> usize {
        if self.config.training.batch_size == 0 {
            0
        } else {
            dataset_size.div_ceil(self.config.training.batch_size)
        }
    }

    /// Adam settings from the optimizer config.
    #[must_use]
    pub fn optimizer_config(&self) -> AdamConfig {
        let training = &self.config.training;
        let opt = &training.optimizer;
        let mut adam = AdamConfig::new()
            .with_beta_1(opt.beta1)
            .with_beta_2(opt.beta2)
            .with_epsilon(opt.epsilon);
        if opt.weight_decay > 0.0 {
            adam = adam.with_weight_decay(Some(WeightDecayConfig::new(opt.weight_decay)));
        }
        if training.gradient_clip > 0.0 {
            adam = adam.with_grad_clipping(Some(GradientClippingConfig::Norm(training.gradient_clip)));
        }
        adam
    }

    /// Trains on `samples` and publishes the model to `out_dir`.
    ///
    /// The vocabulary is built from every sample's label before the split.
    /// Metadata is written before the first epoch, the checkpoint weights
    /// whenever the monitored loss improves, and the final weights (the best
    /// epoch's when `restore_best_weights` is set) when training ends.
    ///
    /// # Errors
    ///
    /// - [`TrainingError::InvalidConfig`] / [`TrainingError::Model`] for a
    ///   configuration that cannot align `max_length` labels
    /// - [`TrainingError::Dataset`] for an empty dataset or an empty or
    ///   over-long label
    /// - [`TrainingError::NumericalInstability`] if the loss becomes
    ///   non-finite
    /// - [`TrainingError::Model`] if artifact files cannot be written
    pub fn fit<B: AutodiffBackend>(
        &self,
        samples: &[LabeledSample],
        out_dir: impl AsRef<Path>,
        device: &B::Device,
    ) -> Result<TrainingOutcome> {
        let config = &self.config;
        let training = &config.training;
        config.validate()?;
        if samples.is_empty() {
            return Err(DatasetError::EmptyDataset.into());
        }
        check_label_lengths(samples, config.max_length)?;

        let vocab = Vocabulary::build(samples.iter().map(|s| s.label.as_str()))?;
        info!(vocabulary = %vocab, size = vocab.len(), "built vocabulary");

        let metadata = ArtifactMetadata::new(
            vocab.clone(),
            config.canonical,
            config.encoder_for(&vocab),
            config.max_length,
        )?
        .with_weights_format(training.checkpoint_format);

        let artifact = ModelArtifact::create(out_dir)?;
        if let Some(seed) = training.seed {
            B::seed(seed);
        }
        let mut model = self.initial_model::<B>(&artifact, &metadata, device)?;
        artifact.write_metadata(&metadata)?;

        let ratio = SplitRatio::from_val_fraction(training.val_fraction).ok_or_else(|| {
            TrainingError::invalid_config(format!("val_fraction {}", training.val_fraction))
        })?;
        let (train, val) = split_by_label(samples, ratio, training.seed);
        if val.is_empty() {
            warn!("no validation split; monitoring training loss");
        }
        info!(
            train = train.len(),
            val = val.len(),
            time_steps = metadata.encoder.time_steps(),
            "starting training"
        );

        let batcher = CaptchaBatcher::new(
            vocab.clone(),
            config.max_length,
            (metadata.encoder.input_width, metadata.encoder.input_height),
        );
        let decoder = GreedyDecoder::new(vocab).with_max_length(config.max_length);
        let mut optim = self.optimizer_config().init::<B, CaptchaEncoder<B>>();
        let mut plateau = training.plateau.map(ReduceOnPlateau::new);
        let mut state = self.initial_state();
        let mut best: Option<(usize, CaptchaEncoder<B::InnerBackend>)> = None;

        while !state.is_finished() {
            let epoch = state.epoch;
            let scheduled = self.compute_lr(epoch);
            let lr = plateau.as_ref().map_or(scheduled, |p| p.apply(scheduled));

            let started = Instant::now();
            let (trained, train_loss) =
                self.train_epoch(model, &mut optim, &batcher, &train, epoch, lr, device)?;
            model = trained;
            let mut metrics = EpochMetrics::new(epoch, train_loss)
                .with_learning_rate(lr)
                .with_train_samples(train.len());

            if !val.is_empty() {
                let (val_loss, report) = validate(
                    &model.valid(),
                    &batcher,
                    &decoder,
                    &val,
                    training.batch_size,
                    device,
                )?;
                metrics = metrics.with_validation(val_loss, report.accuracy, val.len());
            }
            metrics = metrics.with_elapsed(started.elapsed().as_secs_f32());

            let monitored = metrics.monitored_loss();
            info!(
                epoch,
                train_loss,
                val_loss = ?metrics.val_loss,
                val_accuracy = ?metrics.val_accuracy,
                lr,
                "epoch complete"
            );
            state.metrics.add_epoch(metrics);

            if state.record_loss(monitored) {
                let valid = model.valid();
                let path =
                    artifact.save_weights(&valid, LoadStrategy::Checkpoint, metadata.weights_format)?;
                debug!(epoch, loss = monitored, path = %path.display(), "saved best checkpoint");
                best = Some((epoch, valid));
            }
            if let Some(plateau) = plateau.as_mut() {
                if plateau.step(monitored) {
                    info!(epoch, scale = plateau.scale(), "loss plateaued, reducing learning rate");
                }
            }

            state.next_epoch();
            if !state.is_finished() && state.should_early_stop(training.early_stopping_patience) {
                let reason = format!(
                    "no improvement for {} epochs",
                    training.early_stopping_patience
                );
                info!(epoch, %reason, "early stopping");
                state.early_stop(reason);
            }
        }

        let last_epoch = state.epoch.saturating_sub(1);
        let (published_epoch, published) = match best {
            Some((epoch, weights)) if training.restore_best_weights => (epoch, weights),
            _ => (last_epoch, model.valid()),
        };
        state.metrics.restored_epoch = Some(published_epoch);
        let path =
            artifact.save_weights(&published, LoadStrategy::FinalWeights, metadata.weights_format)?;
        info!(
            path = %path.display(),
            epoch = published_epoch,
            epochs = state.metrics.epochs_completed(),
            "published final weights"
        );

        Ok(TrainingOutcome {
            metrics: state.metrics,
            artifact_dir: artifact.dir().to_path_buf(),
            metadata,
        })
    }

    /// Fresh weights, or matching weights already in the artifact when
    /// resuming.
    fn initial_model<B: AutodiffBackend>(
        &self,
        artifact: &ModelArtifact,
        metadata: &ArtifactMetadata,
        device: &B::Device,
    ) -> Result<CaptchaEncoder<B>> {
        let fresh = || metadata.encoder.init::<B>(metadata.max_length, device);
        if !self.config.training.resume {
            return Ok(fresh()?);
        }

        let previous = match artifact.read_metadata() {
            Ok(previous) => previous,
            Err(e) => {
                warn!(error = %e, "nothing to resume; starting fresh");
                return Ok(fresh()?);
            }
        };
        if !previous.same_model_as(metadata) {
            warn!(
                dir = %artifact.dir().display(),
                "existing artifact describes a different model; starting fresh"
            );
            return Ok(fresh()?);
        }

        for strategy in [LoadStrategy::Checkpoint, LoadStrategy::FinalWeights] {
            let path = artifact.weights_path(strategy, metadata.weights_format);
            if !path.is_file() {
                continue;
            }
            match load_weights::<B, _>(fresh()?, &path, device) {
                Ok(model) => {
                    info!(strategy = %strategy, path = %path.display(), "resuming from existing weights");
                    return Ok(model);
                }
                Err(e) => warn!(strategy = %strategy, error = %e, "cannot resume from weights"),
            }
        }

        warn!("no loadable weights to resume from; starting fresh");
        Ok(fresh()?)
    }

    #[allow(clippy::too_many_arguments, clippy::cast_precision_loss)]
    fn train_epoch<B, O>(
        &self,
        mut model: CaptchaEncoder<B>,
        optim: &mut O,
        batcher: &CaptchaBatcher,
        samples: &[LabeledSample],
        epoch: usize,
        lr: f64,
        device: &B::Device,
    ) -> Result<(CaptchaEncoder<B>, f32)>
    where
        B: AutodiffBackend,
        O: Optimizer<CaptchaEncoder<B>, B>,
    {
        let training = &self.config.training;
        let order = if training.shuffle {
            epoch_order(samples.len(), training.seed, epoch)
        } else {
            (0..samples.len()).collect()
        };

        let mut total = 0.0;
        let mut batches = 0usize;
        for chunk in order.chunks(training.batch_size) {
            let refs: Vec<&LabeledSample> = chunk.iter().map(|&i| &samples[i]).collect();
            let batch = batcher.batch::<B>(&refs, device)?;

            let log_probs = model.forward_log_probs(batch.images);
            let loss = ctc_loss(log_probs, batch.targets, &batch.target_lengths, batcher.blank())?;
            let value: f32 = loss.clone().into_scalar().elem();
            if !value.is_finite() {
                return Err(TrainingError::numerical_instability(format!(
                    "loss {value} at epoch {epoch}, batch {batches}"
                )));
            }

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(lr, model, grads);
            total += value;
            batches += 1;
        }

        Ok((model, total / batches.max(1) as f32))
    }
}

/// Mean validation loss and exact-match report, without dropout.
#[allow(clippy::cast_precision_loss)]
fn validate<B: Backend>(
    model: &CaptchaEncoder<B>,
    batcher: &CaptchaBatcher,
    decoder: &GreedyDecoder,
    samples: &[LabeledSample],
    batch_size: usize,
    device: &B::Device,
) -> Result<(f32, EvaluationReport)> {
    let mut report = EvaluationReport::default();
    let mut total = 0.0;

    for chunk in samples.chunks(batch_size.max(1)) {
        let refs: Vec<&LabeledSample> = chunk.iter().collect();
        let batch = batcher.batch::<B>(&refs, device)?;
        let log_probs = model.forward_log_probs(batch.images);

        let loss: f32 = ctc_nll(
            log_probs.clone(),
            batch.targets,
            &batch.target_lengths,
            batcher.blank(),
        )?
        .sum()
        .into_scalar()
        .elem();
        total += loss;

        for (sample, prediction) in chunk.iter().zip(decoder.decode_batch(log_probs)) {
            report.record(&sample.label, &prediction, sample.source.clone());
        }
    }

    Ok((total / samples.len().max(1) as f32, report))
}

/// Trains with [`TrainingBackend`] on the default CPU device.
///
/// # Errors
///
/// See [`Trainer::fit`].
pub fn train(
    config: PipelineConfig,
    samples: &[LabeledSample],
    out_dir: impl AsRef<Path>,
) -> Result<TrainingOutcome> {
    Trainer::new(config).fit::<TrainingBackend>(samples, out_dir, &Default::default())
}
