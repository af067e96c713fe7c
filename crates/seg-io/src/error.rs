//! Error types for the archive codec and the reconstruction engine
//!
//! Every failure surfaced by [`load`](crate::SegFile::load) or
//! [`save`](crate::SegFile::save) is an [`IoError`], and every `IoError`
//! maps onto one of the four [`LoadStatus`] codes.

use seg_core::{ArgumentsError, ItemId, OutputId, TaxonomyError};
use seg_graph::GraphError;
use seg_model::{FilterError, ModelError};
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Malformed archive member text
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Line of `trace.dot` that is neither a vertex, an edge nor framing
    #[error("trace line {line}: {message}")]
    Syntax {
        /// 1-based line number
        line: usize,
        /// What was wrong
        message: String,
    },

    /// Vertex shape naming no item kind
    #[error("trace line {line}: unknown shape `{shape}`")]
    UnknownShape {
        /// 1-based line number
        line: usize,
        /// Shape found
        shape: String,
    },

    /// Vertex arguments that break the grammar
    #[error("trace line {line}: {source}")]
    Arguments {
        /// 1-based line number
        line: usize,
        /// Grammar violation
        source: ArgumentsError,
    },

    /// Vertex or edge the graph refused
    #[error("trace line {line}: {source}")]
    Graph {
        /// 1-based line number
        line: usize,
        /// Graph failure
        source: GraphError,
    },

    /// Live item whose arguments cannot be serialized
    #[error("item {id}: {source}")]
    ItemArguments {
        /// Item
        id: ItemId,
        /// Grammar violation
        source: ArgumentsError,
    },

    /// Malformed `taxonomy.xml`
    #[error("taxonomy: {0}")]
    Taxonomy(String),

    /// Category path rejected by the tree
    #[error("taxonomy: {0}")]
    Category(#[from] TaxonomyError),

    /// Malformed `settings.ini` or legacy `version` member
    #[error("settings: {0}")]
    Settings(String),
}

/// Fatal reconstruction failures
#[derive(Debug, thiserror::Error)]
pub enum ReconstructionError {
    /// Vertex missing its mandatory ancestor, or an edge the graph refuses
    #[error("structure: {0}")]
    Structure(#[from] GraphError),

    /// Vertex arguments that do not describe the item
    #[error("vertex {id}: {source}")]
    Arguments {
        /// Parsed vertex id
        id: ItemId,
        /// Grammar violation
        source: ArgumentsError,
    },

    /// Vertex referencing a vertex that is not a filter
    #[error("vertex {id}: ancestor {ancestor} is not a filter")]
    NotAFilter {
        /// Parsed vertex id
        id: ItemId,
        /// Offending ancestor
        ancestor: ItemId,
    },

    /// An argument names a different producer than the vertex's edge
    #[error("vertex {id}: `{key}` names filter {declared} but the trace links filter {linked}")]
    ProducerMismatch {
        /// Parsed vertex id
        id: ItemId,
        /// Argument holding the reference
        key: &'static str,
        /// Filter named by the argument
        declared: ItemId,
        /// Filter at the other end of the edge
        linked: ItemId,
    },

    /// A filter output that could not be produced
    #[error("vertex {id}: filter {filter} failed to produce output {output}: {source}")]
    Output {
        /// Parsed vertex id
        id: ItemId,
        /// Producing filter (parsed id)
        filter: ItemId,
        /// Requested output
        output: OutputId,
        /// Failure
        source: FilterError,
    },

    /// The factory could not build a filter
    #[error("vertex {id}: {source}")]
    Filter {
        /// Parsed vertex id
        id: ItemId,
        /// Failure
        source: FilterError,
    },

    /// Edge endpoint without a live item
    #[error("edge endpoint {0} was never created")]
    Unbound(ItemId),

    /// The model refused an insertion or relation
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Load and save failures
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Archive or a required member is missing
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Format version below the compatibility floor
    #[error("invalid file version {found} (oldest supported {floor}, current {current})")]
    InvalidVersion {
        /// Version in the archive
        found: u32,
        /// Compatibility floor
        floor: u32,
        /// Version written by this build
        current: u32,
    },

    /// `trace.dot`, `taxonomy.xml` or the settings are absent
    #[error("archive has no `{0}`")]
    MissingMember(&'static str),

    /// Target file name is empty
    #[error("file name is empty")]
    EmptyFileName,

    /// Malformed member
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Reconstruction aborted
    #[error("reconstruction failed: {0}")]
    Reconstruction(#[from] ReconstructionError),

    /// A cache extension failed
    #[error("extension `{id}`: {message}")]
    Extension {
        /// Extension id
        id: String,
        /// Failure
        message: String,
    },

    /// Filter snapshot failure during save
    #[error("snapshot of filter {id}: {source}")]
    Snapshot {
        /// Filter
        id: ItemId,
        /// Failure
        source: FilterError,
    },

    /// Zip container error
    #[error("archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Filesystem error
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl IoError {
    /// Status code reported to callers
    #[must_use]
    pub fn status(&self) -> LoadStatus {
        match self {
            Self::FileNotFound(_) => LoadStatus::FileNotFound,
            Self::InvalidVersion { .. } => LoadStatus::InvalidVersion,
            Self::Io(err) if err.kind() == io::ErrorKind::NotFound => LoadStatus::FileNotFound,
            _ => LoadStatus::Error,
        }
    }

    /// Whether the caller may supply another path and retry
    #[inline]
    #[must_use]
    pub fn is_relocatable(&self) -> bool {
        self.status() == LoadStatus::FileNotFound
    }
}

/// Status codes of the load and save entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStatus {
    /// Completed
    Success,
    /// Source archive or a required companion missing
    FileNotFound,
    /// Format version below the compatibility floor
    InvalidVersion,
    /// Any other unrecoverable failure
    Error,
}

impl LoadStatus {
    /// Status of a load or save result
    #[must_use]
    pub fn of<T>(result: &Result<T, IoError>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(err) => err.status(),
        }
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "SUCCESS",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::InvalidVersion => "INVALID_VERSION",
            Self::Error => "ERROR",
        })
    }
}
