//! Model configuration

use indexmap::IndexMap;

/// Property every category element should carry, with its default
pub const CATEGORY_DIMENSIONS: [(&str, &str); 3] = [("Dim_X", "30"), ("Dim_Y", "30"), ("Dim_Z", "30")];

/// Model settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    /// Whether new sessions keep the full trace
    pub traceable: bool,
    /// Properties filled into category elements that lack them
    pub category_defaults: IndexMap<String, String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            traceable: true,
            category_defaults: CATEGORY_DIMENSIONS
                .into_iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }
}

impl ModelConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With trace mode
    #[inline]
    #[must_use]
    pub fn with_traceable(mut self, traceable: bool) -> Self {
        self.traceable = traceable;
        self
    }

    /// With one category default property
    #[must_use]
    pub fn with_category_default(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.category_defaults.insert(key.into(), value.into());
        self
    }
}
