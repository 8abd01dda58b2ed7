//! Artifact schema versioning.

use serde::{Deserialize, Serialize};

/// Schema version of persisted artifact metadata.
///
/// # Example
///
/// ```
/// use captcha_types::SchemaVersion;
///
/// let v = SchemaVersion::new(1, 3);
/// assert!(v.is_compatible(&SchemaVersion::CURRENT));
/// assert_eq!(v.to_string(), "1.3");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct SchemaVersion {
    /// Major version. Bumped on incompatible layout changes.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl SchemaVersion {
    /// Current schema version.
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    /// Creates a new schema version.
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Compatible means same major version.
    #[must_use]
    pub const fn is_compatible(&self, other: &Self) -> bool {
        self.major == other.major
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
