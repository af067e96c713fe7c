//! Relationship graph of an analysis session
//!
//! A directed multigraph keyed by [`ItemId`](seg_core::ItemId). Every edge
//! carries a label; several edges with different labels may join the same
//! pair. Queries filter by label and return results in insertion order.
//!
//! The subgraph made of `CreateLink`, `Volume` and filter-to-filter input
//! edges is the dependency DAG; [`RelationshipGraph::add_relation`] refuses
//! edges that would close a cycle in it.

mod error;
mod graph;
mod relation;

pub use error::GraphError;
pub use graph::RelationshipGraph;
pub use relation::{Direction, Relation};
