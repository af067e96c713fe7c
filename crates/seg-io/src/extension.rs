//! Cache extensions
//!
//! Channel and segmentation extensions keep derived data (tags, notes,
//! measurements) in archive members of their own. The codec never looks
//! inside them: on load each member is offered to the registered extensions
//! and handed to the first one whose predicate claims it, after the graph
//! has been rebuilt; on save every extension contributes its members.

use seg_model::AnalysisModel;
use std::fmt;
use std::path::Path;

/// Extension cache failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ExtensionError(pub String);

impl ExtensionError {
    /// Error with a message
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Archive member produced by an extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Path inside the archive
    pub path: String,
    /// Member content
    pub data: Vec<u8>,
}

impl CacheEntry {
    /// Member at `path`
    #[must_use]
    pub fn new(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
        }
    }
}

/// Extension owning some archive members
pub trait CacheExtension: fmt::Debug {
    /// Stable identifier, used in logs and errors
    fn id(&self) -> &str;

    /// Whether the archive member at `path` belongs to this extension
    fn is_cache_file(&self, path: &str) -> bool;

    /// Consume one claimed member once the model is rebuilt
    ///
    /// # Errors
    ///
    /// Implementation defined; fails the load.
    fn load_cache(&mut self, path: &str, data: &[u8], scratch: &Path, model: &AnalysisModel)
        -> Result<(), ExtensionError>;

    /// Members to write; an empty list writes nothing
    ///
    /// # Errors
    ///
    /// Implementation defined; fails the save.
    fn save_cache(&mut self, model: &AnalysisModel) -> Result<Vec<CacheEntry>, ExtensionError>;
}

/// Registered extensions, consulted in registration order
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    extensions: Vec<Box<dyn CacheExtension>>,
}

impl ExtensionRegistry {
    /// No extensions
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension
    pub fn register(&mut self, extension: impl CacheExtension + 'static) {
        self.extensions.push(Box::new(extension));
    }

    /// With an extension
    #[must_use]
    pub fn with(mut self, extension: impl CacheExtension + 'static) -> Self {
        self.register(extension);
        self
    }

    /// Index of the first extension claiming `path`
    #[must_use]
    pub fn claim(&self, path: &str) -> Option<usize> {
        self.extensions.iter().position(|extension| extension.is_cache_file(path))
    }

    /// Extension at `index`
    pub fn get_mut(&mut self, index: usize) -> Option<&mut (dyn CacheExtension + 'static)> {
        self.extensions.get_mut(index).map(|extension| extension.as_mut())
    }

    /// Extensions in registration order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut (dyn CacheExtension + 'static)> + '_ {
        self.extensions.iter_mut().map(|extension| extension.as_mut())
    }

    /// Number of extensions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Whether nothing is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}
