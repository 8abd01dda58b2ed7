//! Versioned model artifact: metadata plus weight files in one directory.
//!
//! Layout:
//!
//! ```text
//! <dir>/meta.json        ArtifactMetadata
//! <dir>/model.bin        final weights
//! <dir>/checkpoint.bin   best-validation weights
//! ```
//!
//! Every file is first written under a staging name inside `<dir>` and then
//! renamed into place, so a reader never sees a partially written file.
//!
//! Loading rebuilds the encoder from the metadata before touching any weight
//! file, then tries each [`LoadStrategy`] in order. A strategy either loads
//! completely or is skipped with a reason.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use burn::prelude::Backend;
use captcha_types::{CanonicalParams, SchemaVersion, Vocabulary};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::checkpoint::{CheckpointFormat, load_weights, save_weights};
use crate::decoder::GreedyDecoder;
use crate::encoder::{CaptchaEncoder, EncoderConfig};
use crate::error::{ModelError, Result};

/// Metadata file name inside an artifact directory.
pub const METADATA_FILE: &str = "meta.json";

/// Everything needed to rebuild the inference pipeline except the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Layout version of this file.
    pub schema_version: SchemaVersion,

    /// Character set; the blank is `vocabulary.len()`.
    pub vocabulary: Vocabulary,

    /// Canonicalization used for training; inference must use the same.
    pub canonical: CanonicalParams,

    /// Architecture hyperparameters.
    pub encoder: EncoderConfig,

    /// Longest admissible label.
    pub max_length: usize,

    /// Format of the weight files.
    #[serde(default)]
    pub weights_format: CheckpointFormat,

    /// Creation time, seconds since the Unix epoch.
    #[serde(default)]
    pub created_at: u64,
}

impl ArtifactMetadata {
    /// Creates metadata for a new training run and checks its consistency.
    ///
    /// # Errors
    ///
    /// Same as [`check`](Self::check).
    pub fn new(
        vocabulary: Vocabulary,
        canonical: CanonicalParams,
        encoder: EncoderConfig,
        max_length: usize,
    ) -> Result<Self> {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        let meta = Self {
            schema_version: SchemaVersion::CURRENT,
            vocabulary,
            canonical,
            encoder,
            max_length,
            weights_format: CheckpointFormat::default(),
            created_at,
        };
        meta.check("<new>")?;
        Ok(meta)
    }

    /// Sets the weight file format.
    #[must_use]
    pub fn with_weights_format(mut self, format: CheckpointFormat) -> Self {
        self.weights_format = format;
        self
    }

    /// Verifies that the parts of the metadata agree with each other.
    ///
    /// `location` only labels the error.
    ///
    /// # Errors
    ///
    /// - [`ModelError::ArtifactIncompatible`] for an unsupported schema
    ///   version, a class count that is not `vocabulary.len() + 1`, or
    ///   canonical dimensions that differ from the encoder input
    /// - [`ModelError::InvalidConfig`] if the encoder cannot align
    ///   `max_length` labels
    /// - [`ModelError::Types`] for invalid canonical params
    pub fn check(&self, location: &str) -> Result<()> {
        if !self.schema_version.is_compatible(&SchemaVersion::CURRENT) {
            return Err(ModelError::artifact_incompatible(
                location,
                format!(
                    "schema version {} is not readable by {}",
                    self.schema_version,
                    SchemaVersion::CURRENT
                ),
            ));
        }
        if self.encoder.num_classes != self.vocabulary.num_classes() {
            return Err(ModelError::artifact_incompatible(
                location,
                format!(
                    "encoder has {} output classes, vocabulary of {} needs {}",
                    self.encoder.num_classes,
                    self.vocabulary.len(),
                    self.vocabulary.num_classes()
                ),
            ));
        }
        self.canonical.validate()?;
        let canonical_size = (self.canonical.width as usize, self.canonical.height as usize);
        if canonical_size != (self.encoder.input_width, self.encoder.input_height) {
            return Err(ModelError::artifact_incompatible(
                location,
                format!(
                    "canonical size {}x{} differs from encoder input {}x{}",
                    canonical_size.0,
                    canonical_size.1,
                    self.encoder.input_width,
                    self.encoder.input_height
                ),
            ));
        }
        self.encoder.validate(self.max_length)
    }

    /// Returns `true` if both describe the same model (ignores timestamps).
    #[must_use]
    pub fn same_model_as(&self, other: &Self) -> bool {
        self.vocabulary == other.vocabulary
            && self.canonical == other.canonical
            && self.encoder == other.encoder
            && self.max_length == other.max_length
            && self.weights_format == other.weights_format
    }
}

/// A named source of weights inside an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStrategy {
    /// Weights written when training finished.
    FinalWeights,
    /// Best-validation weights written during training.
    Checkpoint,
}

impl LoadStrategy {
    /// Order tried by [`ModelArtifact::load`].
    pub const DEFAULT_ORDER: [Self; 2] = [Self::FinalWeights, Self::Checkpoint];

    /// File stem of the weights this strategy reads.
    #[must_use]
    pub const fn file_stem(&self) -> &'static str {
        match self {
            Self::FinalWeights => "model",
            Self::Checkpoint => "checkpoint",
        }
    }

    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::FinalWeights => "final",
            Self::Checkpoint => "checkpoint",
        }
    }
}

impl std::fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What happened when a strategy was tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// All weights loaded.
    Loaded,
    /// Nothing was loaded, for the given reason.
    Skipped(String),
}

/// One strategy and its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadAttempt {
    /// Strategy tried.
    pub strategy: LoadStrategy,
    /// Result.
    pub outcome: LoadOutcome,
}

impl std::fmt::Display for LoadAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.outcome {
            LoadOutcome::Loaded => write!(f, "{}: loaded", self.strategy),
            LoadOutcome::Skipped(reason) => write!(f, "{}: skipped ({reason})", self.strategy),
        }
    }
}

/// An encoder ready for inference, with the metadata it was built from.
#[derive(Debug)]
pub struct LoadedModel<B: Backend> {
    /// Artifact metadata.
    pub metadata: ArtifactMetadata,
    /// Encoder with loaded weights.
    pub encoder: CaptchaEncoder<B>,
    /// Strategy that supplied the weights.
    pub strategy: LoadStrategy,
    /// Every strategy tried, in order.
    pub attempts: Vec<LoadAttempt>,
}

impl<B: Backend> LoadedModel<B> {
    /// Decoder over the artifact's vocabulary.
    #[must_use]
    pub fn decoder(&self) -> GreedyDecoder {
        GreedyDecoder::new(self.metadata.vocabulary.clone())
            .with_max_length(self.metadata.max_length)
    }
}

/// Handle on an artifact directory.
///
/// # Example
///
/// ```no_run
/// use burn_ndarray::NdArray;
/// use captcha_models::ModelArtifact;
///
/// let artifact = ModelArtifact::new("models/captcha");
/// let loaded = artifact.load::<NdArray<f32>>(&Default::default()).unwrap();
/// println!("weights from {}", loaded.strategy);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifact {
    dir: PathBuf,
}

impl ModelArtifact {
    /// Refers to an artifact directory without touching the filesystem.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Refers to an artifact directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Io`] if the directory cannot be created.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        Ok(Self::new(dir))
    }

    /// Artifact directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the metadata file.
    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    /// Path of the weights a strategy reads.
    #[must_use]
    pub fn weights_path(&self, strategy: LoadStrategy, format: CheckpointFormat) -> PathBuf {
        self.dir
            .join(strategy.file_stem())
            .with_extension(format.extension())
    }

    /// Returns `true` if the metadata file exists.
    #[must_use]
    pub fn has_metadata(&self) -> bool {
        self.metadata_path().is_file()
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }

    /// Writes the metadata file atomically.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Io`] or [`ModelError::Serialization`].
    pub fn write_metadata(&self, metadata: &ArtifactMetadata) -> Result<()> {
        let json = serde_json::to_vec_pretty(metadata)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".meta-")
            .tempfile_in(&self.dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.metadata_path())
            .map_err(|e| ModelError::io(e.to_string()))?;
        debug!(path = %self.metadata_path().display(), "wrote artifact metadata");
        Ok(())
    }

    /// Reads the metadata file.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ArtifactMissing`] if the file does not exist,
    /// [`ModelError::Io`] or [`ModelError::Serialization`] otherwise.
    pub fn read_metadata(&self) -> Result<ArtifactMetadata> {
        let path = self.metadata_path();
        if !path.is_file() {
            return Err(ModelError::artifact_missing(
                self.location(),
                vec![format!("{METADATA_FILE}: not found")],
            ));
        }
        let bytes = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Writes encoder weights for `strategy` atomically.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::SaveCheckpoint`] or [`ModelError::Io`].
    pub fn save_weights<B: Backend>(
        &self,
        encoder: &CaptchaEncoder<B>,
        strategy: LoadStrategy,
        format: CheckpointFormat,
    ) -> Result<PathBuf> {
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.dir)?;
        let staged = save_weights::<B, _>(encoder, &staging.path().join(strategy.file_stem()), format)?;

        let target = self.weights_path(strategy, format);
        std::fs::rename(&staged, &target)?;
        debug!(strategy = %strategy, path = %target.display(), "published weights");
        Ok(target)
    }

    /// Loads with [`LoadStrategy::DEFAULT_ORDER`].
    ///
    /// # Errors
    ///
    /// See [`load_with`](Self::load_with).
    pub fn load<B: Backend>(&self, device: &B::Device) -> Result<LoadedModel<B>> {
        self.load_with(&LoadStrategy::DEFAULT_ORDER, device)
    }

    /// Rebuilds the encoder and loads weights from the first strategy that
    /// succeeds.
    ///
    /// # Errors
    ///
    /// - [`ModelError::ArtifactIncompatible`] if the metadata is inconsistent
    ///   or loaded weights have the wrong output dimension
    /// - [`ModelError::ArtifactMissing`] if the metadata is absent or no
    ///   strategy loads
    /// - [`ModelError::Io`] / [`ModelError::Serialization`] for an unreadable
    ///   metadata file
    pub fn load_with<B: Backend>(
        &self,
        strategies: &[LoadStrategy],
        device: &B::Device,
    ) -> Result<LoadedModel<B>> {
        let metadata = self.read_metadata()?;
        metadata.check(&self.location())?;
        let expected_classes = metadata.vocabulary.num_classes();

        let mut attempts = Vec::with_capacity(strategies.len());
        for &strategy in strategies {
            let path = self.weights_path(strategy, metadata.weights_format);
            if !path.is_file() {
                debug!(strategy = %strategy, path = %path.display(), "weights not present");
                attempts.push(LoadAttempt {
                    strategy,
                    outcome: LoadOutcome::Skipped(format!("{} not found", path.display())),
                });
                continue;
            }

            let fresh = metadata.encoder.init::<B>(metadata.max_length, device)?;
            let encoder = match load_weights::<B, _>(fresh, &path, device) {
                Ok(encoder) => encoder,
                Err(e) => {
                    warn!(strategy = %strategy, error = %e, "weights failed to load");
                    attempts.push(LoadAttempt {
                        strategy,
                        outcome: LoadOutcome::Skipped(e.to_string()),
                    });
                    continue;
                }
            };

            let actual_classes = encoder.num_classes();
            if actual_classes != expected_classes {
                return Err(ModelError::artifact_incompatible(
                    self.location(),
                    format!(
                        "{} weights emit {actual_classes} classes, vocabulary of {} needs {expected_classes}",
                        strategy,
                        metadata.vocabulary.len()
                    ),
                ));
            }

            attempts.push(LoadAttempt {
                strategy,
                outcome: LoadOutcome::Loaded,
            });
            info!(
                dir = %self.dir.display(),
                strategy = %strategy,
                vocabulary = %metadata.vocabulary,
                "loaded model artifact"
            );
            return Ok(LoadedModel {
                metadata,
                encoder,
                strategy,
                attempts,
            });
        }

        Err(ModelError::artifact_missing(
            self.location(),
            attempts.iter().map(ToString::to_string).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn tiny(config: EncoderConfig) -> EncoderConfig {
        config
            .with_conv_channels([2, 2, 2])
            .with_dense_units(4)
            .with_lstm_hidden([4, 4])
    }

    fn metadata(labels: &[&str]) -> ArtifactMetadata {
        let vocab = Vocabulary::build(labels.iter().copied()).unwrap();
        let params = CanonicalParams::new(48, 16);
        let encoder = tiny(EncoderConfig::for_vocabulary(&params, &vocab));
        ArtifactMetadata::new(vocab, params, encoder, 4).unwrap()
    }

    #[test]
    fn metadata_rejects_class_mismatch() {
        let vocab = Vocabulary::build(["ab12"]).unwrap();
        let params = CanonicalParams::new(48, 16);
        let encoder = tiny(EncoderConfig::new(48, 16, vocab.num_classes() + 1));
        let err = ArtifactMetadata::new(vocab, params, encoder, 4).unwrap_err();
        assert!(matches!(err, ModelError::ArtifactIncompatible { .. }));
    }

    #[test]
    fn metadata_rejects_size_mismatch() {
        let vocab = Vocabulary::build(["ab12"]).unwrap();
        let encoder = tiny(EncoderConfig::new(48, 16, vocab.num_classes()));
        let err =
            ArtifactMetadata::new(vocab, CanonicalParams::new(60, 16), encoder, 4).unwrap_err();
        assert!(matches!(err, ModelError::ArtifactIncompatible { .. }));
    }

    #[test]
    fn metadata_roundtrip_and_same_model() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ModelArtifact::create(dir.path()).unwrap();
        let meta = metadata(&["ab12", "cd34"]);
        artifact.write_metadata(&meta).unwrap();

        let read = artifact.read_metadata().unwrap();
        assert_eq!(read, meta);

        let mut later = meta.clone();
        later.created_at += 100;
        assert!(meta.same_model_as(&later));
        assert!(!meta.same_model_as(&metadata(&["ab12"])));
    }

    #[test]
    fn load_prefers_final_then_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let artifact = ModelArtifact::create(dir.path()).unwrap();
        let meta = metadata(&["ab12", "cd34"]);
        artifact.write_metadata(&meta).unwrap();

        let encoder = meta.encoder.init::<TestBackend>(4, &device).unwrap();
        artifact
            .save_weights(&encoder, LoadStrategy::Checkpoint, meta.weights_format)
            .unwrap();

        let loaded = artifact.load::<TestBackend>(&device).unwrap();
        assert_eq!(loaded.strategy, LoadStrategy::Checkpoint);
        assert_eq!(loaded.attempts.len(), 2);
        assert!(matches!(loaded.attempts[0].outcome, LoadOutcome::Skipped(_)));

        artifact
            .save_weights(&encoder, LoadStrategy::FinalWeights, meta.weights_format)
            .unwrap();
        let loaded = artifact.load::<TestBackend>(&device).unwrap();
        assert_eq!(loaded.strategy, LoadStrategy::FinalWeights);
        assert_eq!(loaded.attempts.len(), 1);

        // No staging leftovers.
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().all(|n| !n.starts_with('.')), "{names:?}");
    }

    #[test]
    fn load_without_weights_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ModelArtifact::create(dir.path()).unwrap();
        artifact.write_metadata(&metadata(&["ab12"])).unwrap();

        let err = artifact.load::<TestBackend>(&Default::default()).unwrap_err();
        match err {
            ModelError::ArtifactMissing { attempts, .. } => {
                assert_eq!(attempts.len(), 2);
                assert!(attempts[0].starts_with("final: skipped"));
                assert!(attempts[1].starts_with("checkpoint: skipped"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn load_without_metadata_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelArtifact::new(dir.path())
            .load::<TestBackend>(&Default::default())
            .unwrap_err();
        assert!(matches!(err, ModelError::ArtifactMissing { .. }));
    }

    #[test]
    fn load_rejects_tampered_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ModelArtifact::create(dir.path()).unwrap();
        let mut meta = metadata(&["ab12", "cd34"]);
        artifact.write_metadata(&meta).unwrap();

        // Vocabulary shrinks but the stored architecture still says 9 classes.
        meta.vocabulary = Vocabulary::build(["ab12"]).unwrap();
        std::fs::write(
            artifact.metadata_path(),
            serde_json::to_vec(&meta).unwrap(),
        )
        .unwrap();

        let err = artifact.load::<TestBackend>(&Default::default()).unwrap_err();
        assert!(matches!(err, ModelError::ArtifactIncompatible { .. }));
    }

    #[test]
    fn load_rejects_weights_with_wrong_output_dim() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let artifact = ModelArtifact::create(dir.path()).unwrap();

        // Weights trained for a 9-class vocabulary...
        let wide = metadata(&["ab12", "cd34"]);
        let encoder = wide.encoder.init::<TestBackend>(4, &device).unwrap();
        artifact
            .save_weights(&encoder, LoadStrategy::FinalWeights, wide.weights_format)
            .unwrap();

        // ...published next to metadata describing 5 classes.
        artifact.write_metadata(&metadata(&["ab12"])).unwrap();

        let err = artifact.load::<TestBackend>(&device).unwrap_err();
        assert!(
            matches!(
                err,
                ModelError::ArtifactIncompatible { .. }
            ),
            "{err:?}"
        );
    }
}
