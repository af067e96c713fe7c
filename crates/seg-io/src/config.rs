//! Archive IO configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Format version written by this build
pub const SEG_FILE_VERSION: u32 = 4;

/// Oldest format version that can still be loaded
pub const SEG_FILE_COMPATIBLE_VERSION: u32 = 1;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// Config file
        path: PathBuf,
        /// Failure
        source: std::io::Error,
    },

    /// Not valid TOML for [`IoConfig`]
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Load and save settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Version written to `settings.ini`
    pub format_version: u32,
    /// Archives below this version are refused
    pub compatible_version: u32,
    /// Parent of the scratch directories; the system temp dir when unset
    pub scratch_root: Option<PathBuf>,
    /// Snapshot every available output even when the session is not
    /// traceable
    pub snapshot_all_outputs: bool,
    /// Replace unknown filter types by read-only filters serving the
    /// archived snapshots
    pub fallback_to_read_only: bool,
    /// Third line of `settings.ini`
    pub generator: String,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            format_version: SEG_FILE_VERSION,
            compatible_version: SEG_FILE_COMPATIBLE_VERSION,
            scratch_root: None,
            snapshot_all_outputs: false,
            fallback_to_read_only: true,
            generator: format!("seg-io {}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl IoConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML; missing keys keep their defaults
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`].
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    ///
    /// Unreadable file or invalid TOML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// With scratch root
    #[inline]
    #[must_use]
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// With compatibility floor
    #[inline]
    #[must_use]
    pub fn with_compatible_version(mut self, version: u32) -> Self {
        self.compatible_version = version;
        self
    }

    /// With written format version
    #[inline]
    #[must_use]
    pub fn with_format_version(mut self, version: u32) -> Self {
        self.format_version = version;
        self
    }

    /// With snapshot-everything mode
    #[inline]
    #[must_use]
    pub fn with_snapshot_all_outputs(mut self, enabled: bool) -> Self {
        self.snapshot_all_outputs = enabled;
        self
    }

    /// With read-only fallback
    #[inline]
    #[must_use]
    pub fn with_read_only_fallback(mut self, enabled: bool) -> Self {
        self.fallback_to_read_only = enabled;
        self
    }

    /// With generator line
    #[inline]
    #[must_use]
    pub fn with_generator(mut self, generator: impl Into<String>) -> Self {
        self.generator = generator.into();
        self
    }

    /// Directory scratch directories are created in
    #[must_use]
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}
