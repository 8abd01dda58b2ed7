//! Backend selection.

use serde::{Deserialize, Serialize};

/// CPU backend used for inference.
pub type InferenceBackend = burn_ndarray::NdArray<f32>;

/// Supported Burn backends.
///
/// # Example
///
/// ```
/// use captcha_models::BackendType;
///
/// let backend: BackendType = "ndarray".parse().unwrap();
/// assert!(backend.is_cpu());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    /// CPU backend using ndarray. Always available.
    #[default]
    NdArray,
}

impl BackendType {
    /// Returns `true` if this is a CPU backend.
    #[must_use]
    pub const fn is_cpu(&self) -> bool {
        matches!(self, Self::NdArray)
    }

    /// Returns the backend name as a string.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NdArray => "ndarray",
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ndarray" | "cpu" => Ok(Self::NdArray),
            other => Err(format!("unknown backend {other:?} (available: ndarray)")),
        }
    }
}
