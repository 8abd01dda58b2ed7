//! A freshly initialized model must run end to end without errors.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use burn_ndarray::NdArray;
use captcha_dataset::Canonicalizer;
use captcha_models::{
    ArtifactMetadata, EncoderConfig, LoadStrategy, ModelArtifact, ModelError,
};
use captcha_types::{CanonicalParams, Vocabulary};
use image::{DynamicImage, Rgb, RgbImage};

type Backend = NdArray<f32>;

fn blank_canonical(width: u32, height: u32) -> captcha_types::CanonicalImage {
    let canon = Canonicalizer::new(CanonicalParams::default()).unwrap();
    let raw = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([255, 255, 255])));
    canon.canonicalize(&raw).unwrap()
}

#[test]
fn blank_image_through_untrained_encoder() {
    let vocab = Vocabulary::build(["ab12", "cd34"]).unwrap();
    let config = EncoderConfig::for_vocabulary(&CanonicalParams::default(), &vocab);
    let device = Default::default();
    let encoder = config.init::<Backend>(4, &device).unwrap();

    let image = blank_canonical(123, 77);
    assert!(image.is_uniform(0.0));

    let input = encoder.image_batch(&[&image], &device).unwrap();
    let probs = encoder.forward_probs(input);
    assert_eq!(probs.dims(), [1, 45, 9]);

    let decoder = captcha_models::GreedyDecoder::new(vocab).with_max_length(4);
    let first = decoder.decode_batch(probs.clone());
    let second = decoder.decode_batch(probs);
    assert_eq!(first, second);
    assert!(first[0].len() <= 4);
}

#[test]
fn saved_artifact_predicts_identically() {
    let dir = tempfile::tempdir().unwrap();
    let device = Default::default();
    let params = CanonicalParams::default();
    let vocab = Vocabulary::build(["ab12", "cd34"]).unwrap();
    let config = EncoderConfig::for_vocabulary(&params, &vocab)
        .with_conv_channels([4, 8, 8])
        .with_dense_units(8)
        .with_lstm_hidden([8, 8]);

    let meta = ArtifactMetadata::new(vocab, params, config, 4).unwrap();
    let artifact = ModelArtifact::create(dir.path()).unwrap();
    artifact.write_metadata(&meta).unwrap();

    let encoder = config.init::<Backend>(4, &device).unwrap();
    artifact
        .save_weights(&encoder, LoadStrategy::FinalWeights, meta.weights_format)
        .unwrap();

    let loaded = artifact.load::<Backend>(&device).unwrap();
    assert_eq!(loaded.metadata.canonical, params);

    let image = blank_canonical(180, 50);
    let original = encoder
        .forward_probs(encoder.image_batch(&[&image], &device).unwrap())
        .into_data()
        .to_vec::<f32>()
        .unwrap();
    let restored = loaded
        .encoder
        .forward_probs(loaded.encoder.image_batch(&[&image], &device).unwrap())
        .into_data()
        .to_vec::<f32>()
        .unwrap();

    assert_eq!(original.len(), restored.len());
    for (a, b) in original.iter().zip(&restored) {
        approx::assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
    }
}

#[test]
fn too_short_time_axis_is_rejected_before_training() {
    let vocab = Vocabulary::build(["ab12"]).unwrap();
    let params = CanonicalParams::new(16, 8);
    let config = EncoderConfig::for_vocabulary(&params, &vocab);
    let err = ArtifactMetadata::new(vocab, params, config, 4).unwrap_err();
    assert!(matches!(err, ModelError::InvalidConfig(_)));
}
