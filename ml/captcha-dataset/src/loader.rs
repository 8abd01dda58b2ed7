//! Labeled image directory loading.
//!
//! A source directory holds image files named after their label, either
//! `<label>.<ext>` (manual labels) or `<label>_<suffix>.<ext>` (accepted
//! samples captured by [`GoldStore`](crate::GoldStore)).

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::canonicalize::Canonicalizer;
use crate::error::{DatasetError, Result};
use crate::sample::LabeledSample;

/// File extensions the loader picks up (case-insensitive).
pub const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Why a file was left out of a load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SkipReason {
    /// Label length differs from the expected length.
    WrongLength {
        /// Label parsed from the file name.
        label: String,
        /// Expected character count.
        expected: usize,
    },
    /// The file could not be read or canonicalized.
    Unreadable {
        /// Error message.
        reason: String,
    },
    /// The file name carries no label.
    NoLabel,
}

/// A file left out of a load, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    /// Path of the skipped file.
    pub path: PathBuf,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// Result of loading one or more source directories.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Samples loaded, ordered by path.
    pub samples: Vec<LabeledSample>,
    /// Files that were skipped.
    pub skipped: Vec<SkippedFile>,
}

impl LoadReport {
    /// Number of loaded samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if nothing was loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Appends another report.
    pub fn merge(&mut self, other: Self) {
        self.samples.extend(other.samples);
        self.skipped.extend(other.skipped);
    }

    /// Consumes the report, failing if no samples were loaded.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::EmptyDataset`].
    pub fn into_samples(self) -> Result<Vec<LabeledSample>> {
        if self.samples.is_empty() {
            return Err(DatasetError::EmptyDataset);
        }
        Ok(self.samples)
    }
}

/// Extracts the label from a file name: the stem up to the first `_`.
///
/// ```
/// use std::path::Path;
/// use captcha_dataset::label_from_path;
///
/// assert_eq!(label_from_path(Path::new("x/ab12.png")).as_deref(), Some("ab12"));
/// assert_eq!(label_from_path(Path::new("ab12_1732123456.png")).as_deref(), Some("ab12"));
/// assert_eq!(label_from_path(Path::new("_oops.png")), None);
/// ```
#[must_use]
pub fn label_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let label = stem.split('_').next().unwrap_or_default();
    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}

fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                IMAGE_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
}

/// Lists image files in `dir`, sorted by path.
///
/// # Errors
///
/// Returns [`DatasetError::Io`] if the directory cannot be read.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)
        .map_err(|e| DatasetError::io(format!("{}: {e}", dir.display())))?
    {
        let path = entry?.path();
        if is_image_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Loads every labeled image in `dir`.
///
/// Images are canonicalized in parallel; output order follows the sorted
/// paths. Files with a label of the wrong length or that fail to decode are
/// reported in [`LoadReport::skipped`] rather than failing the load.
///
/// # Errors
///
/// Returns [`DatasetError::Io`] if the directory cannot be listed.
pub fn load_labeled_dir(
    dir: &Path,
    canonicalizer: &Canonicalizer,
    expected_length: usize,
) -> Result<LoadReport> {
    let paths = list_images(dir)?;
    debug!(dir = %dir.display(), files = paths.len(), "listing source");

    let results: Vec<std::result::Result<LabeledSample, SkippedFile>> = paths
        .par_iter()
        .map(|path| load_one(path, canonicalizer, expected_length))
        .collect();

    let mut report = LoadReport::default();
    for result in results {
        match result {
            Ok(sample) => report.samples.push(sample),
            Err(skipped) => {
                if let SkipReason::Unreadable { reason } = &skipped.reason {
                    warn!(path = %skipped.path.display(), %reason, "skipping unreadable image");
                }
                report.skipped.push(skipped);
            }
        }
    }

    info!(
        dir = %dir.display(),
        loaded = report.samples.len(),
        skipped = report.skipped.len(),
        "loaded labeled images"
    );
    Ok(report)
}

fn load_one(
    path: &Path,
    canonicalizer: &Canonicalizer,
    expected_length: usize,
) -> std::result::Result<LabeledSample, SkippedFile> {
    let skip = |reason| SkippedFile {
        path: path.to_path_buf(),
        reason,
    };

    let label = label_from_path(path).ok_or_else(|| skip(SkipReason::NoLabel))?;
    if label.chars().count() != expected_length {
        return Err(skip(SkipReason::WrongLength {
            label,
            expected: expected_length,
        }));
    }

    let image = canonicalizer
        .canonicalize_path(path)
        .map_err(|e| skip(SkipReason::Unreadable {
            reason: e.to_string(),
        }))?;

    Ok(LabeledSample::new(label, image).with_source(path))
}

/// Loads and merges several source directories in order.
///
/// Directories that do not exist are skipped with a warning.
///
/// # Errors
///
/// Returns [`DatasetError::Io`] if an existing directory cannot be listed.
pub fn load_sources<P: AsRef<Path>>(
    dirs: &[P],
    canonicalizer: &Canonicalizer,
    expected_length: usize,
) -> Result<LoadReport> {
    let mut report = LoadReport::default();
    for dir in dirs {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "source directory not found, skipping");
            continue;
        }
        report.merge(load_labeled_dir(dir, canonicalizer, expected_length)?);
    }
    Ok(report)
}
