//! Challenge image inputs.
//!
//! A challenge arrives as raw encoded bytes, as base64 text (optionally a
//! `data:image/...;base64,` URL) or as a file path.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Result, SolverError};

const DATA_URL_PREFIX: &str = "data:image";

/// One challenge image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptchaInput {
    /// Encoded image bytes (PNG, JPEG).
    Bytes(Vec<u8>),
    /// Base64 text, with or without a data URL prefix.
    Base64(String),
    /// Image file on disk.
    Path(PathBuf),
}

impl CaptchaInput {
    /// Interprets a command-line argument: an existing file is a path,
    /// anything else is base64.
    #[must_use]
    pub fn from_arg(arg: &str) -> Self {
        let path = Path::new(arg);
        if path.is_file() {
            Self::Path(path.to_path_buf())
        } else {
            Self::Base64(arg.to_string())
        }
    }

    /// Short description for logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Bytes(bytes) => format!("{} bytes", bytes.len()),
            Self::Base64(text) => format!("{} base64 chars", text.len()),
            Self::Path(path) => path.display().to_string(),
        }
    }

    /// Encoded image bytes. Paths are read from disk.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::InvalidInput`] for malformed base64 and
    /// [`SolverError::Io`] for an unreadable file.
    pub fn bytes(&self) -> Result<Cow<'_, [u8]>> {
        match self {
            Self::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
            Self::Base64(text) => decode_base64(text).map(Cow::Owned),
            Self::Path(path) => std::fs::read(path)
                .map(Cow::Owned)
                .map_err(|e| SolverError::Io(format!("{}: {e}", path.display()))),
        }
    }
}

impl From<Vec<u8>> for CaptchaInput {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<PathBuf> for CaptchaInput {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

/// Removes a `data:image/...;base64,` prefix, if present.
///
/// ```
/// use captcha_solver::strip_data_url;
///
/// assert_eq!(strip_data_url("data:image/png;base64,iVBOR"), "iVBOR");
/// assert_eq!(strip_data_url("iVBOR"), "iVBOR");
/// ```
#[must_use]
pub fn strip_data_url(text: &str) -> &str {
    let text = text.trim();
    if text.starts_with(DATA_URL_PREFIX) {
        text.split_once(',').map_or("", |(_, payload)| payload)
    } else {
        text
    }
}

/// Decodes standard base64, stripping any data URL prefix and whitespace.
///
/// # Errors
///
/// Returns [`SolverError::InvalidInput`] for empty or malformed input.
pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    let payload: String = strip_data_url(text)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if payload.is_empty() {
        return Err(SolverError::invalid_input("empty base64 payload"));
    }
    STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| SolverError::invalid_input(format!("base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_prefix_is_stripped() {
        assert_eq!(strip_data_url("data:image/png;base64,QUJD"), "QUJD");
        assert_eq!(strip_data_url("  data:image/jpeg;base64,QUJD\n"), "QUJD");
        assert_eq!(strip_data_url("data:image/png;base64"), "");
        assert_eq!(strip_data_url("QUJD"), "QUJD");
    }

    #[test]
    fn decodes_plain_and_prefixed() {
        assert_eq!(decode_base64("QUJD").unwrap(), b"ABC");
        assert_eq!(decode_base64("data:image/png;base64,QUJD").unwrap(), b"ABC");
        assert_eq!(decode_base64("QU\nJD").unwrap(), b"ABC");
    }

    #[test]
    fn rejects_malformed_base64() {
        assert!(matches!(decode_base64("***"), Err(SolverError::InvalidInput(_))));
        assert!(matches!(decode_base64(""), Err(SolverError::InvalidInput(_))));
        assert!(matches!(
            decode_base64("data:image/png;base64,"),
            Err(SolverError::InvalidInput(_))
        ));
    }

    #[test]
    fn input_bytes() {
        let raw = CaptchaInput::from(b"ABC".to_vec());
        assert_eq!(raw.bytes().unwrap().as_ref(), b"ABC");

        let encoded = CaptchaInput::Base64("QUJD".into());
        assert_eq!(encoded.bytes().unwrap().as_ref(), b"ABC");

        let missing = CaptchaInput::Path(PathBuf::from("/nonexistent/captcha.png"));
        assert!(matches!(missing.bytes(), Err(SolverError::Io(_))));
    }

    #[test]
    fn arg_detection() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let arg = file.path().to_str().unwrap();
        assert!(matches!(CaptchaInput::from_arg(arg), CaptchaInput::Path(_)));
        assert!(matches!(CaptchaInput::from_arg("QUJD"), CaptchaInput::Base64(_)));
    }
}
