//! Capture of accepted predictions as new labeled samples.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use image::ImageFormat;
use tracing::info;

use crate::canonicalize::decode_image;
use crate::error::{DatasetError, Result};

/// Suffixes tried before giving up on a taken file name.
const MAX_NAME_ATTEMPTS: usize = 1000;

/// Directory of accepted samples, named `<label>_<unix_millis>.png`.
///
/// Files are readable by [`load_labeled_dir`](crate::load_labeled_dir).
///
/// # Example
///
/// ```no_run
/// use captcha_dataset::GoldStore;
///
/// let store = GoldStore::open("data/gold").unwrap();
/// let png = std::fs::read("challenge.png").unwrap();
/// let path = store.record(&png, "k7p2").unwrap();
/// println!("saved {}", path.display());
/// ```
#[derive(Debug, Clone)]
pub struct GoldStore {
    dir: PathBuf,
}

impl GoldStore {
    /// Opens a store, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Io`] if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persists `image_bytes` as a PNG labeled `label`.
    ///
    /// The image is decoded and re-encoded so every stored file is a PNG
    /// regardless of the input format. The file appears atomically.
    ///
    /// # Errors
    ///
    /// - [`DatasetError::InvalidLabel`] if the label is empty or contains
    ///   `_` or a path separator
    /// - [`DatasetError::ImageDecode`] if the bytes are not an image
    /// - [`DatasetError::Io`] on write failure
    pub fn record(&self, image_bytes: &[u8], label: &str) -> Result<PathBuf> {
        validate_label(label)?;
        let image = decode_image(image_bytes, None)?;

        let mut png = std::io::Cursor::new(Vec::new());
        image
            .write_to(&mut png, ImageFormat::Png)
            .map_err(|e| DatasetError::io(format!("encoding png: {e}")))?;

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis());
        let target = self.publish(png.get_ref(), &format!("{label}_{millis}"))?;

        info!(label, path = %target.display(), "recorded gold sample");
        Ok(target)
    }

    /// Writes `bytes` to `<stem>.png`, or `<stem>_<n>.png` if taken.
    fn publish(&self, bytes: &[u8], stem: &str) -> Result<PathBuf> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;

        let mut target = self.dir.join(format!("{stem}.png"));
        for n in 1..=MAX_NAME_ATTEMPTS {
            match tmp.persist_noclobber(&target) {
                Ok(_) => return Ok(target),
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                    tmp = e.file;
                    target = self.dir.join(format!("{stem}_{n}.png"));
                }
                Err(e) => return Err(DatasetError::io(e.error.to_string())),
            }
        }
        Err(DatasetError::io(format!(
            "no free file name for {stem} in {}",
            self.dir.display()
        )))
    }
}

fn validate_label(label: &str) -> Result<()> {
    let bad = label.is_empty()
        || label
            .chars()
            .any(|c| c == '_' || std::path::is_separator(c) || c.is_control());
    if bad {
        return Err(DatasetError::invalid_label(label));
    }
    Ok(())
}
