//! Deletion policy

use seg_core::ItemId;

/// Answer to a recursive delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeleteDecision {
    /// Delete the item and everything reachable from it
    Recursive,
    /// Delete only the item
    OnlyDirect,
    /// Delete nothing
    Cancel,
}

/// Decides what happens when deleting an item affects others
pub trait DeletePolicy {
    /// `affected` lists the items reachable from the one being deleted
    fn confirm_recursive_delete(&mut self, affected: &[ItemId]) -> DeleteDecision;
}

impl DeletePolicy for DeleteDecision {
    fn confirm_recursive_delete(&mut self, _affected: &[ItemId]) -> DeleteDecision {
        *self
    }
}

impl<F> DeletePolicy for F
where
    F: FnMut(&[ItemId]) -> DeleteDecision,
{
    fn confirm_recursive_delete(&mut self, affected: &[ItemId]) -> DeleteDecision {
        self(affected)
    }
}
