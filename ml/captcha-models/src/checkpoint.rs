//! Weight file persistence through Burn recorders.

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::Backend;
use burn::record::{BinFileRecorder, FullPrecisionSettings, PrettyJsonFileRecorder};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Supported weight file formats.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use captcha_models::CheckpointFormat;
///
/// assert_eq!(CheckpointFormat::from_path(Path::new("model.bin")), Some(CheckpointFormat::Binary));
/// assert_eq!(CheckpointFormat::Json.extension(), "json");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointFormat {
    /// Burn `BinFileRecorder`, full precision. Compact.
    #[default]
    Binary,

    /// Burn `PrettyJsonFileRecorder`, full precision. For inspection.
    Json,
}

impl CheckpointFormat {
    /// Determines the format from a file extension (case-insensitive).
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "bin" | "burn" => Some(Self::Binary),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Determines the format from a path's extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// File extension the recorder writes.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Binary => "bin",
            Self::Json => "json",
        }
    }
}

impl std::fmt::Display for CheckpointFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binary => f.write_str("binary"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Writes `model` weights to `stem` plus the format's extension.
///
/// Returns the path written.
///
/// # Errors
///
/// Returns [`ModelError::SaveCheckpoint`] if the recorder fails.
pub fn save_weights<B, M>(model: &M, stem: &Path, format: CheckpointFormat) -> Result<PathBuf>
where
    B: Backend,
    M: Module<B>,
{
    let path = stem.with_extension(format.extension());
    let fail = |e: burn::record::RecorderError| {
        ModelError::save_checkpoint(path.display().to_string(), e.to_string())
    };

    match format {
        CheckpointFormat::Binary => model
            .clone()
            .save_file(&path, &BinFileRecorder::<FullPrecisionSettings>::new())
            .map_err(fail)?,
        CheckpointFormat::Json => model
            .clone()
            .save_file(&path, &PrettyJsonFileRecorder::<FullPrecisionSettings>::new())
            .map_err(fail)?,
    }

    Ok(path)
}

/// Loads weights from `path` into `model`.
///
/// The format is taken from the file extension.
///
/// # Errors
///
/// - [`ModelError::CheckpointNotFound`] if the file does not exist
/// - [`ModelError::UnsupportedFormat`] for an unknown extension
/// - [`ModelError::LoadCheckpoint`] if the recorder fails
pub fn load_weights<B, M>(model: M, path: &Path, device: &B::Device) -> Result<M>
where
    B: Backend,
    M: Module<B>,
{
    let shown = path.display().to_string();
    if !path.is_file() {
        return Err(ModelError::checkpoint_not_found(shown));
    }
    let format = CheckpointFormat::from_path(path)
        .ok_or_else(|| ModelError::unsupported_format(shown.clone()))?;

    let loaded = match format {
        CheckpointFormat::Binary => model.load_file(
            path.to_path_buf(),
            &BinFileRecorder::<FullPrecisionSettings>::new(),
            device,
        ),
        CheckpointFormat::Json => model.load_file(
            path.to_path_buf(),
            &PrettyJsonFileRecorder::<FullPrecisionSettings>::new(),
            device,
        ),
    };

    loaded.map_err(|e| ModelError::load_checkpoint(shown, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EncoderConfig;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn format_from_extension() {
        assert_eq!(
            CheckpointFormat::from_extension("BIN"),
            Some(CheckpointFormat::Binary)
        );
        assert_eq!(
            CheckpointFormat::from_extension("json"),
            Some(CheckpointFormat::Json)
        );
        assert_eq!(CheckpointFormat::from_extension("xml"), None);
        assert_eq!(CheckpointFormat::from_path(Path::new("model")), None);
    }

    #[test]
    fn format_serialization() {
        let json = serde_json::to_string(&CheckpointFormat::Json).unwrap();
        assert_eq!(json, "\"json\"");
        assert_eq!(CheckpointFormat::default().to_string(), "binary");
    }

    #[test]
    fn load_missing_file() {
        let device = Default::default();
        let model = EncoderConfig::new(48, 16, 5)
            .with_conv_channels([2, 2, 2])
            .with_dense_units(4)
            .with_lstm_hidden([4, 4])
            .init::<TestBackend>(4, &device)
            .unwrap();
        let err = load_weights::<TestBackend, _>(model, Path::new("/nope/model.bin"), &device).unwrap_err();
        assert!(matches!(err, ModelError::CheckpointNotFound(_)));
    }

    #[test]
    fn save_then_load_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = EncoderConfig::new(48, 16, 5)
            .with_conv_channels([2, 2, 2])
            .with_dense_units(4)
            .with_lstm_hidden([4, 4]);

        for format in [CheckpointFormat::Binary, CheckpointFormat::Json] {
            let model = config.init::<TestBackend>(4, &device).unwrap();
            let path = save_weights::<TestBackend, _>(&model, &dir.path().join("weights"), format).unwrap();
            assert_eq!(CheckpointFormat::from_path(&path), Some(format));

            let fresh = config.init::<TestBackend>(4, &device).unwrap();
            let loaded = load_weights::<TestBackend, _>(fresh, &path, &device).unwrap();
            assert_eq!(loaded.num_classes(), 5);
        }
    }
}
