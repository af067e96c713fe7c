//! Snapshot-backed filters for types no factory provides

use seg_core::{Arguments, OutputId, OutputRef};
use seg_model::{Filter, FilterError, FilterFactory, OutputSnapshot, SnapshotCache};

/// Filter that only serves the outputs archived for it
///
/// It cannot compute anything: an output is available exactly when both its
/// snapshot files were found in the scratch directory.
#[derive(Debug, Clone)]
pub struct ReadOnlyFilter {
    type_name: String,
    arguments: Arguments,
    cache: Option<SnapshotCache>,
    available: Vec<OutputId>,
}

impl ReadOnlyFilter {
    /// Stand-in for a filter of `type_name`
    #[must_use]
    pub fn new(type_name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            type_name: type_name.into(),
            arguments,
            cache: None,
            available: Vec::new(),
        }
    }
}

impl Filter for ReadOnlyFilter {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn arguments(&self) -> Arguments {
        self.arguments.clone()
    }

    fn outputs(&self) -> Vec<OutputId> {
        self.available.clone()
    }

    fn update(&mut self, output: OutputId) -> Result<(), FilterError> {
        if self.available.contains(&output) {
            Ok(())
        } else {
            Err(FilterError::OutputUnavailable(output))
        }
    }

    fn snapshot(&self, output: OutputId) -> Result<Option<OutputSnapshot>, FilterError> {
        match &self.cache {
            Some(cache) => cache.read(output),
            None => Ok(None),
        }
    }

    fn restore_cache(&mut self, cache: &SnapshotCache) -> Result<(), FilterError> {
        self.available = cache.cached_outputs()?;
        self.cache = Some(cache.clone());
        Ok(())
    }
}

/// Factory producing only [`ReadOnlyFilter`]s
///
/// Lets an archive be reconstructed without any filter implementation,
/// e.g. to validate it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnlyFactory;

impl FilterFactory for ReadOnlyFactory {
    fn create_filter(
        &self,
        type_name: &str,
        _inputs: &[OutputRef],
        arguments: &Arguments,
    ) -> Result<Box<dyn Filter>, FilterError> {
        Ok(Box::new(ReadOnlyFilter::new(type_name, arguments.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seg_core::ItemId;
    use std::fs;

    #[test]
    fn serves_only_archived_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path(), ItemId::new(3));
        fs::write(cache.header_path(1), b"header").unwrap();
        fs::write(cache.payload_path(1), b"payload").unwrap();

        let mut filter = ReadOnlyFilter::new("Watershed", Arguments::new());
        assert!(filter.update(1).unwrap_err().is_output_unavailable());

        filter.restore_cache(&cache).unwrap();
        assert_eq!(filter.outputs(), vec![1]);
        filter.update(1).unwrap();
        assert!(filter.update(0).unwrap_err().is_output_unavailable());
        assert_eq!(filter.snapshot(1).unwrap().unwrap().payload, b"payload");
        assert_eq!(filter.type_name(), "Watershed");
    }
}
