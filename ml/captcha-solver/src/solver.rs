//! Caller-owned inference service.
//!
//! A [`CaptchaSolver`] is constructed once per artifact and shared by
//! reference. Whether it can answer is an explicit [`SolverStatus`] value;
//! calls made while it is not loaded return [`SolverError::NotAvailable`].
//! The encoder sits behind a mutex, so concurrent calls are serialized.

use std::path::Path;
use std::sync::Mutex;

use burn::prelude::Backend;
use captcha_dataset::Canonicalizer;
use captcha_models::{
    ArtifactMetadata, CaptchaEncoder, GreedyDecoder, InferenceBackend, LoadStrategy, LoadedModel,
    ModelArtifact,
};
use captcha_types::{CanonicalImage, Prediction};
use tracing::{debug, info, warn};

use crate::error::{Result, SolverError};
use crate::input::CaptchaInput;

/// Readiness of a solver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverStatus {
    /// No load has been attempted.
    Unloaded,
    /// Weights are loaded from the given strategy.
    Loaded(LoadStrategy),
    /// The last load failed.
    Failed(String),
}

impl SolverStatus {
    /// Returns `true` if predictions can be served.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }
}

impl std::fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unloaded => write!(f, "unloaded"),
            Self::Loaded(strategy) => write!(f, "loaded ({strategy})"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug)]
struct Engine<B: Backend> {
    encoder: CaptchaEncoder<B>,
    decoder: GreedyDecoder,
}

/// Inference over one model artifact.
///
/// Images are canonicalized with the params persisted in the artifact, never
/// with caller-supplied ones.
///
/// # Example
///
/// ```no_run
/// use captcha_solver::{CaptchaInput, CaptchaSolver};
///
/// let solver: CaptchaSolver = CaptchaSolver::open("models/captcha", Default::default());
/// if solver.status().is_loaded() {
///     let text = solver.solve(&CaptchaInput::Base64("data:image/png;base64,...".into()));
///     println!("{text:?}");
/// }
/// ```
#[derive(Debug)]
pub struct CaptchaSolver<B: Backend = InferenceBackend> {
    artifact: ModelArtifact,
    device: B::Device,
    status: SolverStatus,
    metadata: Option<ArtifactMetadata>,
    canonicalizer: Option<Canonicalizer>,
    engine: Option<Mutex<Engine<B>>>,
}

impl<B: Backend> CaptchaSolver<B> {
    /// Creates an unloaded solver for an artifact directory.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>, device: B::Device) -> Self {
        Self {
            artifact: ModelArtifact::new(dir),
            device,
            status: SolverStatus::Unloaded,
            metadata: None,
            canonicalizer: None,
            engine: None,
        }
    }

    /// Creates a solver and attempts to load it.
    ///
    /// A failed load is recorded in [`status`](Self::status), not returned.
    #[must_use]
    pub fn open(dir: impl AsRef<Path>, device: B::Device) -> Self {
        let mut solver = Self::new(dir, device);
        if let Err(e) = solver.load() {
            warn!(dir = %solver.artifact.dir().display(), error = %e, "captcha model not loaded");
        }
        solver
    }

    /// Wraps an already loaded model.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Dataset`] if the persisted canonical params are
    /// invalid.
    pub fn from_loaded(
        dir: impl AsRef<Path>,
        loaded: LoadedModel<B>,
        device: B::Device,
    ) -> Result<Self> {
        let mut solver = Self::new(dir, device);
        solver.install(loaded)?;
        Ok(solver)
    }

    /// Loads (or reloads) the artifact.
    ///
    /// On failure the previous engine is dropped and the status becomes
    /// [`SolverStatus::Failed`].
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Model`] carrying `ArtifactMissing`,
    /// `ArtifactIncompatible` or an IO/serialization failure.
    pub fn load(&mut self) -> Result<&SolverStatus> {
        let loaded = match self.artifact.load::<B>(&self.device) {
            Ok(loaded) => loaded,
            Err(e) => {
                self.fail(e.to_string());
                return Err(e.into());
            }
        };
        if let Err(e) = self.install(loaded) {
            self.fail(e.to_string());
            return Err(e);
        }
        Ok(&self.status)
    }

    fn install(&mut self, loaded: LoadedModel<B>) -> Result<()> {
        let canonicalizer = Canonicalizer::new(loaded.metadata.canonical)?;
        let decoder = loaded.decoder();
        info!(
            dir = %self.artifact.dir().display(),
            strategy = %loaded.strategy,
            vocabulary = %loaded.metadata.vocabulary,
            "captcha solver ready"
        );
        self.status = SolverStatus::Loaded(loaded.strategy);
        self.canonicalizer = Some(canonicalizer);
        self.metadata = Some(loaded.metadata);
        self.engine = Some(Mutex::new(Engine {
            encoder: loaded.encoder,
            decoder,
        }));
        Ok(())
    }

    fn fail(&mut self, reason: String) {
        self.status = SolverStatus::Failed(reason);
        self.metadata = None;
        self.canonicalizer = None;
        self.engine = None;
    }

    /// Current readiness.
    #[must_use]
    pub const fn status(&self) -> &SolverStatus {
        &self.status
    }

    /// Artifact directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.artifact.dir()
    }

    /// Metadata of the loaded artifact.
    #[must_use]
    pub const fn metadata(&self) -> Option<&ArtifactMetadata> {
        self.metadata.as_ref()
    }

    /// Label length the model was trained for.
    #[must_use]
    pub fn expected_length(&self) -> Option<usize> {
        self.metadata.as_ref().map(|m| m.max_length)
    }

    fn unavailable(&self) -> SolverError {
        match &self.status {
            SolverStatus::Failed(reason) => SolverError::not_available(reason.clone()),
            _ => SolverError::not_available(format!(
                "no model loaded from {}",
                self.artifact.dir().display()
            )),
        }
    }

    /// Canonicalizes an image exactly as the loaded model expects.
    ///
    /// # Errors
    ///
    /// [`SolverError::NotAvailable`] when unloaded, otherwise
    /// [`SolverError::ImageDecode`], [`SolverError::InvalidDimensions`],
    /// [`SolverError::InvalidInput`] or [`SolverError::Io`].
    pub fn canonicalize(&self, input: &CaptchaInput) -> Result<CanonicalImage> {
        let canonicalizer = self.canonicalizer.as_ref().ok_or_else(|| self.unavailable())?;
        match input {
            CaptchaInput::Path(path) => Ok(canonicalizer.canonicalize_path(path)?),
            other => Ok(canonicalizer.canonicalize_bytes(&other.bytes()?)?),
        }
    }

    /// Decodes the text in one challenge image.
    ///
    /// The result may be empty or shorter than [`expected_length`](Self::expected_length);
    /// callers decide whether to accept it.
    ///
    /// # Errors
    ///
    /// See [`canonicalize`](Self::canonicalize) and
    /// [`predict`](Self::predict).
    pub fn solve(&self, input: &CaptchaInput) -> Result<Prediction> {
        if !self.status.is_loaded() {
            return Err(self.unavailable());
        }
        let image = self.canonicalize(input)?;
        let prediction = self.predict(&image)?;
        debug!(input = %input.describe(), text = %prediction.text, "solved captcha");
        Ok(prediction)
    }

    /// Solves encoded image bytes.
    ///
    /// # Errors
    ///
    /// See [`solve`](Self::solve).
    pub fn solve_bytes(&self, bytes: &[u8]) -> Result<Prediction> {
        self.solve(&CaptchaInput::Bytes(bytes.to_vec()))
    }

    /// Solves base64 text, with or without a data URL prefix.
    ///
    /// # Errors
    ///
    /// See [`solve`](Self::solve).
    pub fn solve_base64(&self, text: &str) -> Result<Prediction> {
        self.solve(&CaptchaInput::Base64(text.to_string()))
    }

    /// Solves an image file.
    ///
    /// # Errors
    ///
    /// See [`solve`](Self::solve).
    pub fn solve_path(&self, path: impl AsRef<Path>) -> Result<Prediction> {
        self.solve(&CaptchaInput::Path(path.as_ref().to_path_buf()))
    }

    /// Runs the encoder and greedy decoder on a canonical image.
    ///
    /// # Errors
    ///
    /// [`SolverError::NotAvailable`] when unloaded or if a previous call
    /// panicked while holding the engine, [`SolverError::Model`] for an image
    /// of the wrong size.
    pub fn predict(&self, image: &CanonicalImage) -> Result<Prediction> {
        let engine = self.engine.as_ref().ok_or_else(|| self.unavailable())?;
        let engine = engine
            .lock()
            .map_err(|_| SolverError::not_available("inference engine lock poisoned"))?;

        let input = engine.encoder.image_batch(&[image], &self.device)?;
        let scores = engine.encoder.forward(input);
        engine
            .decoder
            .decode_batch(scores)
            .into_iter()
            .next()
            .ok_or_else(|| SolverError::not_available("encoder produced no output"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use captcha_models::ModelError;

    type TestBackend = NdArray<f32>;

    #[test]
    fn unloaded_solver_is_not_available() {
        let solver = CaptchaSolver::<TestBackend>::new("/nonexistent", Default::default());
        assert_eq!(solver.status(), &SolverStatus::Unloaded);
        assert!(solver.metadata().is_none());

        let err = solver.solve_base64("QUJD").unwrap_err();
        assert!(matches!(err, SolverError::NotAvailable(_)));
        let err = solver.predict(&CanonicalImage::filled(180, 50, 0.0)).unwrap_err();
        assert!(matches!(err, SolverError::NotAvailable(_)));
    }

    #[test]
    fn missing_artifact_fails_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let mut solver = CaptchaSolver::<TestBackend>::new(dir.path(), Default::default());

        let err = solver.load().unwrap_err();
        assert!(matches!(
            err,
            SolverError::Model(ModelError::ArtifactMissing { .. })
        ));
        assert!(matches!(solver.status(), SolverStatus::Failed(_)));

        let err = solver.solve_bytes(b"not an image").unwrap_err();
        assert!(matches!(err, SolverError::NotAvailable(_)));
    }

    #[test]
    fn open_records_failure() {
        let solver = CaptchaSolver::<TestBackend>::open("/nonexistent/model", Default::default());
        assert!(matches!(solver.status(), SolverStatus::Failed(_)));
        assert!(!solver.status().is_loaded());
        assert!(solver.status().to_string().starts_with("failed"));
    }
}
