//! End-to-end training on a handful of synthetic images.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use burn_ndarray::NdArray;
use captcha_dataset::LabeledSample;
use captcha_models::{EncoderConfig, LoadStrategy, ModelArtifact};
use captcha_training::{
    PipelineConfig, Trainer, TrainingBackend, TrainingConfig, evaluate_encoder, train,
};
use captcha_types::{CanonicalImage, CanonicalParams};

const WIDTH: u32 = 32;
const HEIGHT: u32 = 8;

/// Each character paints a distinctive stroke in its own half of the canvas.
fn render(label: &str) -> CanonicalImage {
    let mut image = CanonicalImage::filled(WIDTH, HEIGHT, 0.0);
    let cell = WIDTH / 2;
    for (i, c) in label.chars().enumerate() {
        let x0 = i as u32 * cell + 2;
        for dx in 0..cell - 4 {
            for y in 0..HEIGHT {
                let ink = match c {
                    'a' => y < HEIGHT / 2,
                    'b' => y >= HEIGHT / 2,
                    _ => dx % 2 == 0,
                };
                if ink {
                    image.set(x0 + dx, y, 1.0);
                }
            }
        }
    }
    image
}

fn samples() -> Vec<LabeledSample> {
    ["ab", "ba", "ac", "ca", "bc", "cb", "aa", "bb", "cc"]
        .iter()
        .flat_map(|label| (0..2).map(move |_| LabeledSample::new(*label, render(label))))
        .collect()
}

fn pipeline(epochs: usize) -> PipelineConfig {
    PipelineConfig::default()
        .with_max_length(2)
        .with_canonical(CanonicalParams::new(WIDTH, HEIGHT))
        .with_architecture(
            EncoderConfig::new(WIDTH as usize, HEIGHT as usize, 2)
                .with_conv_channels([4, 4, 4])
                .with_dense_units(8)
                .with_lstm_hidden([8, 8]),
        )
        .with_training(TrainingConfig::new(epochs).with_batch_size(4).with_val_fraction(0.25))
}

#[test]
fn trains_and_publishes_loadable_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let data = samples();

    let outcome = train(pipeline(3), &data, dir.path()).unwrap();
    let metrics = &outcome.metrics;
    assert!((1..=3).contains(&metrics.epochs_completed()));
    assert!(metrics.train_losses().iter().all(|l| l.is_finite()));
    assert!(metrics.epoch_metrics[0].val_loss.is_some());
    assert!(metrics.epoch_metrics[0].val_accuracy.is_some());
    assert!(metrics.restored_epoch.is_some());

    let artifact = ModelArtifact::new(&outcome.artifact_dir);
    assert!(artifact.has_metadata());
    for strategy in LoadStrategy::DEFAULT_ORDER {
        assert!(artifact
            .weights_path(strategy, outcome.metadata.weights_format)
            .is_file());
    }

    let device = Default::default();
    let loaded = artifact.load::<NdArray<f32>>(&device).unwrap();
    assert_eq!(loaded.strategy, LoadStrategy::FinalWeights);
    assert_eq!(loaded.metadata.vocabulary.as_string(), "abc");
    assert_eq!(loaded.metadata.canonical, CanonicalParams::new(WIDTH, HEIGHT));

    let report = evaluate_encoder(&loaded.encoder, &loaded.decoder(), &data, 4, &device).unwrap();
    assert_eq!(report.total, data.len());
    assert!(report.mismatches.iter().all(|m| m.predicted.chars().count() <= 2));
}

#[test]
fn resume_reuses_matching_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let data = samples();

    let first = train(pipeline(1), &data, dir.path()).unwrap();

    let mut config = pipeline(1);
    config.training = config.training.with_resume(true);
    let second = Trainer::new(config)
        .fit::<TrainingBackend>(&data, dir.path(), &Default::default())
        .unwrap();

    assert!(first.metadata.same_model_as(&second.metadata));
    assert_eq!(second.metrics.epochs_completed(), 1);
}

#[test]
fn early_stopping_ends_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = pipeline(50);
    // Updates below f32 resolution leave the validation loss flat.
    config.training = config
        .training
        .with_optimizer(captcha_training::OptimizerConfig::adam(1e-12))
        .with_early_stopping(2)
        .with_plateau(None);

    let outcome = train(config, &samples(), dir.path()).unwrap();
    assert!(outcome.metrics.early_stopped());
    assert!(outcome.metrics.epochs_completed() < 50);
}

#[test]
fn training_reduces_ctc_loss() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = pipeline(40);
    config.architecture = config.architecture.with_dropout(0.0, 0.0, 0.0);
    config.training = config
        .training
        .with_batch_size(2)
        .with_optimizer(captcha_training::OptimizerConfig::adam(1e-2))
        .with_early_stopping(0)
        .with_plateau(None);

    let outcome = train(config, &samples(), dir.path()).unwrap();
    let losses = outcome.metrics.train_losses();
    assert_eq!(losses.len(), 40);

    let first = losses[0];
    let last = losses[losses.len() - 1];
    assert!(
        last < 0.5 * first,
        "train loss went from {first} to {last}"
    );
}
