use crate::error::GraphError;
use crate::relation::{Direction, Relation};
use indexmap::IndexMap;
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graphmap::DiGraphMap;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction as EdgeDirection;
use seg_core::{labels, ItemId, ItemKind};
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone)]
struct Vertex {
    id: ItemId,
    kind: ItemKind,
}

#[derive(Debug, Clone)]
struct Edge {
    label: String,
    // Insertion stamp; petgraph reuses vacant edge slots so indices alone
    // do not keep the order.
    seq: u64,
}

/// Directed labeled multigraph over item ids
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    inner: StableDiGraph<Vertex, Edge>,
    index: IndexMap<ItemId, NodeIndex>,
    next_seq: u64,
}

impl RelationshipGraph {
    /// Empty graph
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex
    ///
    /// # Errors
    ///
    /// Fails if `id` is taken or `kind` is not a graph kind.
    pub fn add_item(&mut self, id: ItemId, kind: ItemKind) -> Result<(), GraphError> {
        if !kind.is_graph_item() {
            return Err(GraphError::NotAGraphKind(kind));
        }
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateItem(id));
        }
        let node = self.inner.add_node(Vertex { id, kind });
        self.index.insert(id, node);
        Ok(())
    }

    /// Remove a vertex that has no edges left
    ///
    /// # Errors
    ///
    /// [`GraphError::StillRelated`] while edges touch the vertex.
    pub fn remove_item(&mut self, id: ItemId) -> Result<(), GraphError> {
        let node = self.node(id)?;
        let count = self.degree(node);
        if count > 0 {
            return Err(GraphError::StillRelated { id, count });
        }
        self.inner.remove_node(node);
        self.index.shift_remove(&id);
        Ok(())
    }

    /// Whether `id` is a vertex
    #[inline]
    #[must_use]
    pub fn contains(&self, id: ItemId) -> bool {
        self.index.contains_key(&id)
    }

    /// Kind recorded for `id`
    #[must_use]
    pub fn kind_of(&self, id: ItemId) -> Option<ItemKind> {
        self.index.get(&id).map(|node| self.inner[*node].kind)
    }

    /// Vertex ids in insertion order
    pub fn items(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.index.keys().copied()
    }

    /// Number of vertices
    #[inline]
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.index.len()
    }

    /// Number of edges
    #[inline]
    #[must_use]
    pub fn relation_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Number of edges touching `id`
    #[must_use]
    pub fn relation_count_of(&self, id: ItemId) -> usize {
        self.index.get(&id).map_or(0, |node| self.degree(*node))
    }

    /// Add the edge `source -> target` labeled `label`
    ///
    /// A dependency edge (`CreateLink`, `Volume`, or an input slot between
    /// filters) is the only one of its label into `target`.
    ///
    /// # Errors
    ///
    /// Unknown endpoints, self loops, an identical existing edge, a second
    /// dependency edge with the same label into `target`, or a dependency
    /// edge that would close a cycle.
    pub fn add_relation(
        &mut self,
        source: ItemId,
        target: ItemId,
        label: impl Into<String>,
    ) -> Result<Relation, GraphError> {
        let relation = Relation::new(source, target, label);
        let from = self.node(source)?;
        let to = self.node(target)?;
        if source == target {
            return Err(GraphError::SelfLoop(source));
        }
        if self.find_edge(from, to, &relation.label).is_some() {
            return Err(GraphError::DuplicateRelation(relation));
        }
        if self.is_dependency(from, to, &relation.label) {
            if let Some(existing) = self.incoming_labeled(to, &relation.label) {
                return Err(GraphError::SecondAncestor { relation, existing });
            }
        }
        if self.is_dependency(from, to, &relation.label) && self.dependency_path(to, from) {
            return Err(GraphError::CycleDetected(relation));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.inner.add_edge(
            from,
            to,
            Edge {
                label: relation.label.clone(),
                seq,
            },
        );
        Ok(relation)
    }

    /// Remove the edge `source -> target` labeled `label`
    ///
    /// # Errors
    ///
    /// Unknown endpoints or no such edge.
    pub fn remove_relation(&mut self, source: ItemId, target: ItemId, label: &str) -> Result<Relation, GraphError> {
        let from = self.node(source)?;
        let to = self.node(target)?;
        let relation = Relation::new(source, target, label);
        let edge = self
            .find_edge(from, to, label)
            .ok_or_else(|| GraphError::RelationNotFound(relation.clone()))?;
        self.inner.remove_edge(edge);
        Ok(relation)
    }

    /// Remove every edge touching `id`, returning them in insertion order
    ///
    /// # Errors
    ///
    /// [`GraphError::UnknownItem`].
    pub fn remove_relations_of(&mut self, id: ItemId) -> Result<Vec<Relation>, GraphError> {
        self.node(id)?;
        let removed = self.edges(id, None);
        for relation in &removed {
            self.remove_relation(relation.source, relation.target, &relation.label)?;
        }
        Ok(removed)
    }

    /// Whether the exact edge exists
    #[must_use]
    pub fn contains_relation(&self, source: ItemId, target: ItemId, label: &str) -> bool {
        match (self.index.get(&source), self.index.get(&target)) {
            (Some(from), Some(to)) => self.find_edge(*from, *to, label).is_some(),
            _ => false,
        }
    }

    /// Sources of edges into `id`, optionally restricted to `label`
    #[must_use]
    pub fn ancestors(&self, id: ItemId, label: Option<&str>) -> Vec<ItemId> {
        self.neighbors(id, EdgeDirection::Incoming, label)
    }

    /// Targets of edges out of `id`, optionally restricted to `label`
    #[must_use]
    pub fn successors(&self, id: ItemId, label: Option<&str>) -> Vec<ItemId> {
        self.neighbors(id, EdgeDirection::Outgoing, label)
    }

    /// Neighbors of `id` in the given direction
    #[must_use]
    pub fn related(&self, id: ItemId, direction: Direction, label: Option<&str>) -> Vec<ItemId> {
        match direction {
            Direction::In => self.ancestors(id, label),
            Direction::Out => self.successors(id, label),
            Direction::InOut => {
                let mut all = self.ancestors(id, label);
                for successor in self.successors(id, label) {
                    if !all.contains(&successor) {
                        all.push(successor);
                    }
                }
                all
            }
        }
    }

    /// Edges touching `id` in insertion order
    #[must_use]
    pub fn edges(&self, id: ItemId, label: Option<&str>) -> Vec<Relation> {
        let Some(&node) = self.index.get(&id) else {
            return Vec::new();
        };
        let mut found: Vec<(u64, Relation)> = self
            .inner
            .edges_directed(node, EdgeDirection::Incoming)
            .chain(self.inner.edges_directed(node, EdgeDirection::Outgoing))
            .filter(|e| label_matches(label, &e.weight().label))
            .filter_map(|e| {
                let (from, to) = self.inner.edge_endpoints(e.id())?;
                Some((e.weight().seq, self.relation_at(from, to, &e.weight().label)))
            })
            .collect();
        found.sort_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, relation)| relation).collect()
    }

    /// Every edge in insertion order
    #[must_use]
    pub fn relations(&self) -> Vec<Relation> {
        self.relations_since(0)
    }

    /// Edges added at or after insertion stamp `seq`
    #[must_use]
    pub fn relations_since(&self, seq: u64) -> Vec<Relation> {
        let mut found: Vec<(u64, Relation)> = self
            .inner
            .edge_indices()
            .filter_map(|edge| {
                let (from, to) = self.inner.edge_endpoints(edge)?;
                let weight = self.inner.edge_weight(edge)?;
                (weight.seq >= seq).then(|| (weight.seq, self.relation_at(from, to, &weight.label)))
            })
            .collect();
        found.sort_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, relation)| relation).collect()
    }

    /// Stamp the next added edge will receive
    #[inline]
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.next_seq
    }

    /// The single `label` ancestor of `id`
    ///
    /// # Errors
    ///
    /// [`GraphError::AncestorCount`] unless exactly one exists.
    pub fn single_ancestor(&self, id: ItemId, label: &str) -> Result<ItemId, GraphError> {
        match self.ancestors(id, Some(label)).as_slice() {
            [one] => Ok(*one),
            found => Err(GraphError::AncestorCount {
                id,
                label: label.to_string(),
                found: found.len(),
            }),
        }
    }

    /// Items reachable from `id` through outgoing edges of any label
    #[must_use]
    pub fn descendants(&self, id: ItemId) -> Vec<ItemId> {
        let mut seen = HashSet::from([id]);
        let mut queue = VecDeque::from([id]);
        let mut found = Vec::new();
        while let Some(current) = queue.pop_front() {
            for next in self.successors(current, None) {
                if seen.insert(next) {
                    found.push(next);
                    queue.push_back(next);
                }
            }
        }
        found
    }

    /// Direct successors of `id` that depend on it
    #[must_use]
    pub fn dependents(&self, id: ItemId) -> Vec<ItemId> {
        let Some(&node) = self.index.get(&id) else {
            return Vec::new();
        };
        let mut found: Vec<(u64, ItemId)> = self
            .inner
            .edges_directed(node, EdgeDirection::Outgoing)
            .filter(|e| self.is_dependency(node, e.target(), &e.weight().label))
            .map(|e| (e.weight().seq, self.inner[e.target()].id))
            .collect();
        found.sort_by_key(|(seq, _)| *seq);
        found.dedup_by_key(|(_, id)| *id);
        found.into_iter().map(|(_, id)| id).collect()
    }

    /// The dependency edges as a plain DAG over every vertex
    #[must_use]
    pub fn dependency_graph(&self) -> DiGraphMap<ItemId, ()> {
        let mut dag = DiGraphMap::new();
        for (&id, _) in &self.index {
            dag.add_node(id);
        }
        for edge in self.inner.edge_indices() {
            let (Some((from, to)), Some(weight)) = (self.inner.edge_endpoints(edge), self.inner.edge_weight(edge)) else {
                continue;
            };
            if self.is_dependency(from, to, &weight.label) {
                dag.add_edge(self.inner[from].id, self.inner[to].id, ());
            }
        }
        dag
    }

    /// Whether the dependency subgraph is free of cycles
    #[must_use]
    pub fn is_dependency_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.dependency_graph())
    }

    /// Vertices ordered so that producers precede their dependents
    ///
    /// # Errors
    ///
    /// [`GraphError::DependencyCycle`] if the dependency subgraph is cyclic.
    pub fn dependency_order(&self) -> Result<Vec<ItemId>, GraphError> {
        toposort(&self.dependency_graph(), None).map_err(|cycle| GraphError::DependencyCycle(cycle.node_id()))
    }

    fn node(&self, id: ItemId) -> Result<NodeIndex, GraphError> {
        self.index.get(&id).copied().ok_or(GraphError::UnknownItem(id))
    }

    fn degree(&self, node: NodeIndex) -> usize {
        self.inner.edges_directed(node, EdgeDirection::Incoming).count()
            + self.inner.edges_directed(node, EdgeDirection::Outgoing).count()
    }

    fn find_edge(&self, from: NodeIndex, to: NodeIndex, label: &str) -> Option<EdgeIndex> {
        self.inner
            .edges_directed(from, EdgeDirection::Outgoing)
            .find(|e| e.target() == to && e.weight().label == label)
            .map(|e| e.id())
    }

    fn incoming_labeled(&self, to: NodeIndex, label: &str) -> Option<ItemId> {
        self.inner
            .edges_directed(to, EdgeDirection::Incoming)
            .find(|e| e.weight().label == label && self.is_dependency(e.source(), to, label))
            .map(|e| self.inner[e.source()].id)
    }

    fn relation_at(&self, from: NodeIndex, to: NodeIndex, label: &str) -> Relation {
        Relation::new(self.inner[from].id, self.inner[to].id, label)
    }

    fn neighbors(&self, id: ItemId, direction: EdgeDirection, label: Option<&str>) -> Vec<ItemId> {
        let Some(&node) = self.index.get(&id) else {
            return Vec::new();
        };
        let mut found: Vec<(u64, NodeIndex)> = self
            .inner
            .edges_directed(node, direction)
            .filter(|e| label_matches(label, &e.weight().label))
            .map(|e| {
                let other = if e.source() == node { e.target() } else { e.source() };
                (e.weight().seq, other)
            })
            .collect();
        found.sort_by_key(|(seq, _)| *seq);

        let mut seen = HashSet::new();
        found
            .into_iter()
            .map(|(_, other)| self.inner[other].id)
            .filter(|id| seen.insert(*id))
            .collect()
    }

    fn is_dependency(&self, from: NodeIndex, to: NodeIndex, label: &str) -> bool {
        label == labels::CREATE_LINK
            || label == labels::VOLUME
            || (self.inner[from].kind == ItemKind::Filter && self.inner[to].kind == ItemKind::Filter)
    }

    /// Whether `to` is reachable from `from` through dependency edges
    fn dependency_path(&self, from: NodeIndex, to: NodeIndex) -> bool {
        let mut seen = HashSet::from([from]);
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            for edge in self.inner.edges_directed(current, EdgeDirection::Outgoing) {
                if self.is_dependency(current, edge.target(), &edge.weight().label) && seen.insert(edge.target()) {
                    stack.push(edge.target());
                }
            }
        }
        false
    }
}

fn label_matches(filter: Option<&str>, label: &str) -> bool {
    filter.map_or(true, |wanted| wanted == label)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u32) -> ItemId {
        ItemId::new(raw)
    }

    fn graph_with(kinds: &[(u32, ItemKind)]) -> RelationshipGraph {
        let mut graph = RelationshipGraph::new();
        for (raw, kind) in kinds {
            graph.add_item(id(*raw), *kind).unwrap();
        }
        graph
    }

    #[test]
    fn parallel_edges_with_distinct_labels() {
        let mut g = graph_with(&[(1, ItemKind::Sample), (2, ItemKind::Channel)]);
        g.add_relation(id(1), id(2), "Stain").unwrap();
        g.add_relation(id(1), id(2), "Other").unwrap();
        assert!(matches!(
            g.add_relation(id(1), id(2), "Stain"),
            Err(GraphError::DuplicateRelation(_))
        ));
        assert_eq!(g.relation_count(), 2);
        assert_eq!(g.ancestors(id(2), None), vec![id(1)]);
        assert_eq!(g.edges(id(2), Some("Other")).len(), 1);
    }

    #[test]
    fn queries_follow_insertion_order() {
        let mut g = graph_with(&[
            (1, ItemKind::Filter),
            (2, ItemKind::Filter),
            (3, ItemKind::Filter),
            (4, ItemKind::Segmentation),
        ]);
        g.add_relation(id(3), id(4), "a").unwrap();
        g.add_relation(id(1), id(4), "b").unwrap();
        g.add_relation(id(2), id(4), "c").unwrap();
        g.remove_relation(id(1), id(4), "b").unwrap();
        g.add_relation(id(1), id(4), "d").unwrap();

        assert_eq!(g.ancestors(id(4), None), vec![id(3), id(2), id(1)]);
        let labels: Vec<String> = g.relations().into_iter().map(|r| r.label).collect();
        assert_eq!(labels, vec!["a", "c", "d"]);
    }

    #[test]
    fn unknown_endpoints_and_self_loops_fail() {
        let mut g = graph_with(&[(1, ItemKind::Sample)]);
        assert_eq!(g.add_relation(id(1), id(9), "x"), Err(GraphError::UnknownItem(id(9))));
        assert_eq!(g.add_relation(id(1), id(1), "x"), Err(GraphError::SelfLoop(id(1))));
        assert!(matches!(
            g.remove_relation(id(1), id(9), "x"),
            Err(GraphError::UnknownItem(_))
        ));
    }

    #[test]
    fn categories_are_not_vertices() {
        let mut g = RelationshipGraph::new();
        assert_eq!(
            g.add_item(id(1), ItemKind::CategoryElement),
            Err(GraphError::NotAGraphKind(ItemKind::CategoryElement))
        );
    }

    #[test]
    fn remove_item_requires_detached_vertex() {
        let mut g = graph_with(&[(1, ItemKind::Filter), (2, ItemKind::Segmentation)]);
        g.add_relation(id(1), id(2), labels::CREATE_LINK).unwrap();
        assert_eq!(
            g.remove_item(id(2)),
            Err(GraphError::StillRelated { id: id(2), count: 1 })
        );
        assert_eq!(g.remove_relations_of(id(2)).unwrap().len(), 1);
        g.remove_item(id(2)).unwrap();
        assert!(!g.contains(id(2)));
    }

    #[test]
    fn dependency_cycles_are_rejected() {
        let mut g = graph_with(&[
            (1, ItemKind::Filter),
            (2, ItemKind::Filter),
            (3, ItemKind::Filter),
        ]);
        g.add_relation(id(1), id(2), "1").unwrap();
        g.add_relation(id(2), id(3), "2").unwrap();
        assert!(matches!(
            g.add_relation(id(3), id(1), "3"),
            Err(GraphError::CycleDetected(_))
        ));
        assert!(g.is_dependency_acyclic());
        assert_eq!(g.dependency_order().unwrap(), vec![id(1), id(2), id(3)]);
    }

    #[test]
    fn non_dependency_edges_may_cycle() {
        let mut g = graph_with(&[(1, ItemKind::Sample), (2, ItemKind::Channel)]);
        g.add_relation(id(1), id(2), labels::STAIN).unwrap();
        g.add_relation(id(2), id(1), "note").unwrap();
        assert!(g.is_dependency_acyclic());
    }

    #[test]
    fn single_ancestor_counts() {
        let mut g = graph_with(&[
            (1, ItemKind::Filter),
            (2, ItemKind::Filter),
            (3, ItemKind::Segmentation),
        ]);
        assert!(matches!(
            g.single_ancestor(id(3), labels::CREATE_LINK),
            Err(GraphError::AncestorCount { found: 0, .. })
        ));
        g.add_relation(id(1), id(3), labels::CREATE_LINK).unwrap();
        assert_eq!(g.single_ancestor(id(3), labels::CREATE_LINK).unwrap(), id(1));
    }

    #[test]
    fn dependency_labels_admit_one_ancestor() {
        let mut g = graph_with(&[
            (1, ItemKind::Filter),
            (2, ItemKind::Filter),
            (3, ItemKind::Segmentation),
            (4, ItemKind::Channel),
            (5, ItemKind::Filter),
        ]);
        g.add_relation(id(1), id(3), labels::CREATE_LINK).unwrap();
        assert_eq!(
            g.add_relation(id(2), id(3), labels::CREATE_LINK),
            Err(GraphError::SecondAncestor {
                relation: Relation::new(id(2), id(3), labels::CREATE_LINK),
                existing: id(1),
            })
        );
        assert_eq!(g.ancestors(id(3), Some(labels::CREATE_LINK)), vec![id(1)]);

        g.add_relation(id(1), id(4), labels::VOLUME).unwrap();
        assert!(matches!(
            g.add_relation(id(2), id(4), labels::VOLUME),
            Err(GraphError::SecondAncestor { existing, .. }) if existing == id(1)
        ));

        // One edge per input slot; distinct slots may share a producer.
        g.add_relation(id(1), id(5), labels::input_slot(0, 0)).unwrap();
        g.add_relation(id(1), id(5), labels::input_slot(1, 1)).unwrap();
        assert!(matches!(
            g.add_relation(id(2), id(5), labels::input_slot(0, 0)),
            Err(GraphError::SecondAncestor { .. })
        ));
        // Non-dependency labels are unrestricted.
        g.add_relation(id(2), id(3), "note").unwrap();
    }

    #[test]
    fn descendants_and_dependents() {
        let mut g = graph_with(&[
            (1, ItemKind::Filter),
            (2, ItemKind::Channel),
            (3, ItemKind::Sample),
            (4, ItemKind::Segmentation),
        ]);
        g.add_relation(id(1), id(2), labels::VOLUME).unwrap();
        g.add_relation(id(3), id(2), labels::STAIN).unwrap();
        g.add_relation(id(1), id(4), labels::CREATE_LINK).unwrap();
        g.add_relation(id(2), id(4), "note").unwrap();

        assert_eq!(g.descendants(id(1)), vec![id(2), id(4)]);
        assert_eq!(g.dependents(id(1)), vec![id(2), id(4)]);
        assert!(g.dependents(id(3)).is_empty());
        assert_eq!(
            g.related(id(2), Direction::InOut, None),
            vec![id(1), id(3), id(4)]
        );
    }
}
