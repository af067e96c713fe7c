use seg_core::ItemId;
use std::fmt;

/// Directed labeled edge
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Relation {
    /// Tail of the edge
    pub source: ItemId,
    /// Head of the edge
    pub target: ItemId,
    /// Relation label
    pub label: String,
}

impl Relation {
    /// Edge `source -> target` labeled `label`
    #[must_use]
    pub fn new(source: ItemId, target: ItemId, label: impl Into<String>) -> Self {
        Self {
            source,
            target,
            label: label.into(),
        }
    }

    /// Whether `id` is one of the endpoints
    #[inline]
    #[must_use]
    pub fn touches(&self, id: ItemId) -> bool {
        self.source == id || self.target == id
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} [{}]", self.source, self.target, self.label)
    }
}

/// Which edges of a vertex a query follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Edges into the vertex
    In,
    /// Edges out of the vertex
    Out,
    /// Both
    InOut,
}
