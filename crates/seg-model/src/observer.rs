//! Change notifications

use seg_core::ItemId;
use seg_graph::Relation;

/// Net effect of one structural bracket
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructureChange {
    /// Items added inside the bracket, in order
    pub added: Vec<ItemId>,
    /// Items removed inside the bracket, in order
    pub removed: Vec<ItemId>,
}

impl StructureChange {
    /// Whether nothing was added or removed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub(crate) fn record_added(&mut self, id: ItemId) {
        self.added.push(id);
    }

    pub(crate) fn record_removed(&mut self, id: ItemId) {
        // An item added and removed inside the same bracket never existed
        // for observers.
        if let Some(pos) = self.added.iter().position(|added| *added == id) {
            self.added.remove(pos);
        } else {
            self.removed.push(id);
        }
    }
}

/// Event delivered to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    /// The outermost bracket opened
    StructureChangeBegin,
    /// The outermost bracket closed
    StructureChangeEnd(StructureChange),
    /// A relation was added
    RelationAdded(Relation),
    /// A relation was removed
    RelationRemoved(Relation),
    /// Data of an existing item changed
    ItemChanged(ItemId),
}

/// Receives model events
pub trait ModelObserver {
    /// Handle one event
    fn notify(&mut self, event: &ModelEvent);
}

impl<F> ModelObserver for F
where
    F: FnMut(&ModelEvent),
{
    fn notify(&mut self, event: &ModelEvent) {
        self(event);
    }
}

/// Handle returned by [`AnalysisModel::subscribe`](crate::AnalysisModel::subscribe)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u64);
