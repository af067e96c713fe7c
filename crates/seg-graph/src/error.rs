use crate::relation::Relation;
use seg_core::{ItemId, ItemKind};

/// Relationship graph errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Item is not a vertex
    #[error("item {0} is not in the graph")]
    UnknownItem(ItemId),

    /// Vertex id already taken
    #[error("item {0} is already in the graph")]
    DuplicateItem(ItemId),

    /// Kind that lives outside the relation graph
    #[error("{0} items are not part of the relation graph")]
    NotAGraphKind(ItemKind),

    /// Same source, target and label twice
    #[error("relation {0} already exists")]
    DuplicateRelation(Relation),

    /// No such edge
    #[error("relation {0} does not exist")]
    RelationNotFound(Relation),

    /// Edge from an item to itself
    #[error("item {0} cannot be related to itself")]
    SelfLoop(ItemId),

    /// Target already has a dependency edge with this label
    #[error("relation {relation} would give its target a second ancestor; {existing} is already linked")]
    SecondAncestor {
        /// Rejected edge
        relation: Relation,
        /// Source of the edge already in place
        existing: ItemId,
    },

    /// Edge would make the dependency subgraph cyclic
    #[error("relation {0} would close a dependency cycle")]
    CycleDetected(Relation),

    /// The dependency subgraph holds a cycle through this item
    #[error("dependency cycle through item {0}")]
    DependencyCycle(ItemId),

    /// Vertex still has edges
    #[error("item {id} still has {count} relations")]
    StillRelated {
        /// Vertex
        id: ItemId,
        /// Edges touching it
        count: usize,
    },

    /// A mandatory single ancestor is missing or ambiguous
    #[error("item {id} has {found} `{label}` ancestors, expected exactly one")]
    AncestorCount {
        /// Vertex queried
        id: ItemId,
        /// Label filter
        label: String,
        /// Number of ancestors found
        found: usize,
    },
}

impl GraphError {
    /// Whether the error is about the shape of the graph rather than a
    /// missing vertex
    #[inline]
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::CycleDetected(_)
                | Self::DependencyCycle(_)
                | Self::AncestorCount { .. }
                | Self::SecondAncestor { .. }
                | Self::SelfLoop(_)
        )
    }
}
