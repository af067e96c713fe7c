//! Error types for the model facade

use crate::filter::FilterError;
use seg_core::{ArgumentsError, ItemId, ItemKind, OutputId, TaxonomyError};
use seg_graph::GraphError;

/// Model facade errors
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Relationship graph rejected the operation
    #[error("graph error: {0}")]
    Graph(GraphError),

    /// Argument grammar violation
    #[error("invalid arguments: {0}")]
    Arguments(#[from] ArgumentsError),

    /// Category tree error
    #[error("taxonomy error: {0}")]
    Taxonomy(#[from] TaxonomyError),

    /// A filter failed
    #[error("filter {id} failed: {source}")]
    Filter {
        /// Failing filter
        id: ItemId,
        /// Underlying failure
        source: FilterError,
    },

    /// No item with this id
    #[error("unknown item {0}")]
    UnknownItem(ItemId),

    /// Requested id already taken
    #[error("id {0} is already in use")]
    IdInUse(ItemId),

    /// Item of the wrong kind
    #[error("item {id} is a {found}, expected a {expected}")]
    WrongKind {
        /// Item
        id: ItemId,
        /// Expected kind
        expected: ItemKind,
        /// Actual kind
        found: ItemKind,
    },

    /// Removal refused while relations remain
    #[error("item {id} still has {count} relations")]
    HasRelations {
        /// Item
        id: ItemId,
        /// Remaining relations
        count: usize,
    },

    /// Filter has no such output
    #[error("filter {filter} has no output {output}")]
    MissingOutput {
        /// Filter
        filter: ItemId,
        /// Output index
        output: OutputId,
    },

    /// Deleting only the item would leave a dependent without its producer
    #[error("deleting {id} alone would orphan {dependent}")]
    WouldOrphan {
        /// Item to delete
        id: ItemId,
        /// Item depending on it
        dependent: ItemId,
    },

    /// `end_batch` without `begin_batch`
    #[error("no batch is open")]
    BatchNotOpen,
}

impl From<GraphError> for ModelError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::UnknownItem(id) => Self::UnknownItem(id),
            other => Self::Graph(other),
        }
    }
}

impl ModelError {
    /// Wrap a filter failure
    #[inline]
    pub fn filter(id: ItemId, source: FilterError) -> Self {
        Self::Filter { id, source }
    }

    /// Whether the failure came from a filter computation
    #[inline]
    #[must_use]
    pub fn is_filter_failure(&self) -> bool {
        matches!(self, Self::Filter { .. })
    }
}
