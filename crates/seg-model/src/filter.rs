//! Filter capability
//!
//! Filters are opaque to the registry: it only asks them for their
//! arguments, to compute an output, to snapshot an output, and to settle
//! once all their relations are in place.

use seg_core::{Arguments, ItemId, OutputId, OutputRef};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Extension of the snapshot header file
pub const HEADER_EXTENSION: &str = "mhd";

/// Extension of the snapshot payload file
pub const PAYLOAD_EXTENSION: &str = "raw";

/// Inputs of a filter in slot order; slot `n` is fed through the relation
/// labeled [`input_slot(n, output)`](seg_core::labels::input_slot)
pub type FilterInputs = Vec<OutputRef>;

/// Filter failures
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// The requested output cannot be produced
    #[error("output {0} is not available")]
    OutputUnavailable(OutputId),

    /// The factory does not know this filter type
    #[error("unknown filter type `{0}`")]
    UnknownType(String),

    /// The filter ran and failed
    #[error("execution failed: {0}")]
    Execution(String),

    /// The filter panicked; the payload message is kept
    #[error("filter panicked: {0}")]
    Panicked(String),

    /// Writing or reading a snapshot failed
    #[error("snapshot failed: {0}")]
    Snapshot(String),

    /// Filesystem error
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FilterError {
    /// Whether this is the "output no longer exists" case
    #[inline]
    #[must_use]
    pub fn is_output_unavailable(&self) -> bool {
        matches!(self, Self::OutputUnavailable(_))
    }
}

/// Persisted copy of one filter output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSnapshot {
    /// Image header
    pub header: Vec<u8>,
    /// Raw payload
    pub payload: Vec<u8>,
}

/// A processing filter
pub trait Filter: fmt::Debug {
    /// Registered type name, written as the vertex label
    fn type_name(&self) -> &str;

    /// Filter specific arguments, without `Inputs` and `Edit`
    fn arguments(&self) -> Arguments;

    /// Outputs the filter can provide right now
    fn outputs(&self) -> Vec<OutputId>;

    /// Compute `output`, returning once it is materialized
    ///
    /// # Errors
    ///
    /// [`FilterError::OutputUnavailable`] when the output no longer exists,
    /// any other variant when computing it failed.
    fn update(&mut self, output: OutputId) -> Result<(), FilterError>;

    /// Persisted form of `output`, `None` if there is nothing to persist
    ///
    /// # Errors
    ///
    /// Implementation defined.
    fn snapshot(&self, output: OutputId) -> Result<Option<OutputSnapshot>, FilterError>;

    /// Point the filter at the directory holding its snapshots
    ///
    /// # Errors
    ///
    /// Implementation defined.
    fn restore_cache(&mut self, cache: &SnapshotCache) -> Result<(), FilterError> {
        let _ = cache;
        Ok(())
    }

    /// Called once every relation of the filter is in place
    ///
    /// # Errors
    ///
    /// Implementation defined.
    fn settle(&mut self) -> Result<(), FilterError> {
        Ok(())
    }
}

/// Creates filters by type name
pub trait FilterFactory {
    /// Build a filter of `type_name` fed by `inputs`
    ///
    /// # Errors
    ///
    /// [`FilterError::UnknownType`] for types the factory does not provide.
    fn create_filter(
        &self,
        type_name: &str,
        inputs: &[OutputRef],
        arguments: &Arguments,
    ) -> Result<Box<dyn Filter>, FilterError>;
}

/// Snapshot files of one filter inside a scratch directory
///
/// Files are named `<key>_<output>.mhd` and `<key>_<output>.raw`, where the
/// key is the filter's id at the time the snapshot was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotCache {
    dir: PathBuf,
    key: ItemId,
}

impl SnapshotCache {
    /// Cache of filter `key` under `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, key: ItemId) -> Self {
        Self { dir: dir.into(), key }
    }

    /// Directory holding the files
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Filter id used in the file names
    #[inline]
    #[must_use]
    pub fn key(&self) -> ItemId {
        self.key
    }

    /// Header and payload file names for `output` of `filter`
    #[must_use]
    pub fn file_names(filter: ItemId, output: OutputId) -> (String, String) {
        (
            format!("{filter}_{output}.{HEADER_EXTENSION}"),
            format!("{filter}_{output}.{PAYLOAD_EXTENSION}"),
        )
    }

    /// Split a snapshot file name into filter, output and whether it is the
    /// header
    #[must_use]
    pub fn parse_file_name(name: &str) -> Option<(ItemId, OutputId, bool)> {
        let (stem, extension) = name.rsplit_once('.')?;
        let is_header = match extension {
            HEADER_EXTENSION => true,
            PAYLOAD_EXTENSION => false,
            _ => return None,
        };
        let output_ref: OutputRef = stem.parse().ok()?;
        Some((output_ref.filter, output_ref.output, is_header))
    }

    /// Path of the header file for `output`
    #[must_use]
    pub fn header_path(&self, output: OutputId) -> PathBuf {
        self.dir.join(Self::file_names(self.key, output).0)
    }

    /// Path of the payload file for `output`
    #[must_use]
    pub fn payload_path(&self, output: OutputId) -> PathBuf {
        self.dir.join(Self::file_names(self.key, output).1)
    }

    /// Outputs with both files present, ascending
    ///
    /// # Errors
    ///
    /// Directory listing failures.
    pub fn cached_outputs(&self) -> Result<Vec<OutputId>, FilterError> {
        let mut outputs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some((filter, output, true)) = name.to_str().and_then(Self::parse_file_name) else {
                continue;
            };
            if filter == self.key && self.payload_path(output).is_file() {
                outputs.push(output);
            }
        }
        outputs.sort_unstable();
        Ok(outputs)
    }

    /// Read the snapshot of `output`, `None` if either file is missing
    ///
    /// # Errors
    ///
    /// Read failures on files that exist.
    pub fn read(&self, output: OutputId) -> Result<Option<OutputSnapshot>, FilterError> {
        let header_path = self.header_path(output);
        let payload_path = self.payload_path(output);
        if !header_path.is_file() || !payload_path.is_file() {
            return Ok(None);
        }
        Ok(Some(OutputSnapshot {
            header: fs::read(header_path)?,
            payload: fs::read(payload_path)?,
        }))
    }
}
