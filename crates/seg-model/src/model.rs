//! Model facade
//!
//! [`AnalysisModel`] owns the item registry, the relationship graph and the
//! category tree of one session and is the only way to mutate them. Every
//! structural mutation runs inside a begin/end bracket; nested brackets
//! coalesce, so observers see one begin and one end per outermost bracket.
//!
//! The model is single-writer: there is no internal locking and a batch
//! gives no isolation, only notification coalescing.

use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::filter::{FilterError, SnapshotCache};
use crate::item::{FilterItem, Item, ItemData, NewItem};
use crate::observer::{ModelEvent, ModelObserver, ObserverId, StructureChange};
use crate::policy::{DeleteDecision, DeletePolicy};
use indexmap::IndexMap;
use seg_core::labels;
use seg_core::taxonomy::{SEPARATOR, UNSPECIFIED};
use seg_core::{Arguments, ItemId, ItemKind, OutputId, OutputRef, Taxonomy, TaxonomyError};
use seg_graph::{Direction, Relation, RelationshipGraph};
use std::fmt;

/// Restore point for [`AnalysisModel::rollback`]
#[derive(Debug, Clone)]
pub struct Checkpoint {
    items: usize,
    relation_seq: u64,
    next_id: u32,
    last_number: u32,
    taxonomy: Taxonomy,
    traceable: bool,
    changed: bool,
}

struct Batch {
    depth: usize,
    change: StructureChange,
}

/// Registry, relationship graph and category tree of one session
pub struct AnalysisModel {
    config: ModelConfig,
    items: IndexMap<ItemId, Item>,
    graph: RelationshipGraph,
    taxonomy: Taxonomy,
    next_id: u32,
    last_number: u32,
    traceable: bool,
    changed: bool,
    observers: Vec<(ObserverId, Box<dyn ModelObserver>)>,
    next_observer: u64,
    batch: Option<Batch>,
}

impl fmt::Debug for AnalysisModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisModel")
            .field("items", &self.items.len())
            .field("relations", &self.graph.relation_count())
            .field("categories", &self.taxonomy.len())
            .field("next_id", &self.next_id)
            .field("last_number", &self.last_number)
            .field("traceable", &self.traceable)
            .field("changed", &self.changed)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl Default for AnalysisModel {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisModel {
    /// Empty model with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ModelConfig::default())
    }

    /// Empty model
    #[must_use]
    pub fn with_config(config: ModelConfig) -> Self {
        Self {
            traceable: config.traceable,
            config,
            items: IndexMap::new(),
            graph: RelationshipGraph::new(),
            taxonomy: Taxonomy::new(),
            next_id: 0,
            last_number: 0,
            changed: false,
            observers: Vec::new(),
            next_observer: 0,
            batch: None,
        }
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Observers and brackets
    // ------------------------------------------------------------------

    /// Register an observer
    pub fn subscribe(&mut self, observer: impl ModelObserver + 'static) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Drop an observer; false if it was not registered
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer, _)| *observer != id);
        self.observers.len() != before
    }

    fn emit(&mut self, event: &ModelEvent) {
        for (_, observer) in &mut self.observers {
            observer.notify(event);
        }
    }

    /// Open a structural bracket
    pub fn begin_batch(&mut self) {
        if let Some(batch) = self.batch.as_mut() {
            batch.depth += 1;
            return;
        }
        self.batch = Some(Batch {
            depth: 1,
            change: StructureChange::default(),
        });
        self.emit(&ModelEvent::StructureChangeBegin);
    }

    /// Close the innermost bracket
    ///
    /// # Errors
    ///
    /// [`ModelError::BatchNotOpen`] without a matching
    /// [`begin_batch`](Self::begin_batch).
    pub fn end_batch(&mut self) -> Result<(), ModelError> {
        if self.batch.is_none() {
            return Err(ModelError::BatchNotOpen);
        }
        self.close_batch();
        Ok(())
    }

    /// Whether a bracket is open
    #[inline]
    #[must_use]
    pub fn in_batch(&self) -> bool {
        self.batch.is_some()
    }

    /// Run `f` inside a bracket; the bracket closes whatever `f` returns
    ///
    /// # Errors
    ///
    /// Whatever `f` returns.
    pub fn batch<T, E>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, E>) -> Result<T, E> {
        self.begin_batch();
        let result = f(self);
        self.close_batch();
        result
    }

    fn close_batch(&mut self) {
        let Some(batch) = self.batch.as_mut() else {
            return;
        };
        batch.depth -= 1;
        if batch.depth > 0 {
            return;
        }
        if let Some(batch) = self.batch.take() {
            self.emit(&ModelEvent::StructureChangeEnd(batch.change));
        }
    }

    fn record_added(&mut self, id: ItemId) {
        if let Some(batch) = self.batch.as_mut() {
            batch.change.record_added(id);
        }
    }

    fn record_removed(&mut self, id: ItemId) {
        if let Some(batch) = self.batch.as_mut() {
            batch.change.record_removed(id);
        }
    }

    fn item_changed(&mut self, id: ItemId) {
        self.changed = true;
        self.emit(&ModelEvent::ItemChanged(id));
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Add one item
    ///
    /// Channels, filters and segmentations are linked to the outputs they
    /// reference (`Volume`, input slots, `CreateLink`) unless the item was
    /// built [`without_links`](NewItem::without_links). A segmentation with
    /// number zero receives the next free label; an explicit number moves
    /// the counter past it. A segmentation category missing from the tree
    /// is dropped.
    ///
    /// # Errors
    ///
    /// Requested id in use, or a referenced filter that does not exist.
    pub fn add(&mut self, item: NewItem) -> Result<ItemId, ModelError> {
        self.batch(|model| model.insert(item))
    }

    /// Add several items inside one bracket
    ///
    /// Items added before a failure stay in the registry.
    ///
    /// # Errors
    ///
    /// First failure of [`add`](Self::add).
    pub fn add_all(&mut self, items: impl IntoIterator<Item = NewItem>) -> Result<Vec<ItemId>, ModelError> {
        self.batch(|model| items.into_iter().map(|item| model.insert(item)).collect())
    }

    fn insert(&mut self, item: NewItem) -> Result<ItemId, ModelError> {
        let NewItem {
            id,
            mut name,
            mut data,
            key_order,
            link,
        } = item;
        let id = match id {
            Some(id) if self.items.contains_key(&id) => return Err(ModelError::IdInUse(id)),
            Some(id) => id,
            None => self.allocate_id(),
        };

        let producers: Vec<(ItemId, String)> = match &mut data {
            ItemData::Sample(_) => Vec::new(),
            ItemData::Channel(channel) => {
                self.expect_kind(channel.volume().filter, ItemKind::Filter)?;
                vec![(channel.volume().filter, labels::VOLUME.to_string())]
            }
            ItemData::Filter(filter) => {
                for input in filter.inputs() {
                    self.expect_kind(input.filter, ItemKind::Filter)?;
                }
                filter
                    .input_slots()
                    .map(|(slot, input)| (input.filter, slot))
                    .collect()
            }
            ItemData::Segmentation(segmentation) => {
                self.expect_kind(segmentation.source().filter, ItemKind::Filter)?;
                if let Some(category) = segmentation.category() {
                    if !self.taxonomy.contains(category) {
                        tracing::debug!(%id, category, "unknown category, segmentation left uncategorized");
                        segmentation.set_category(None);
                    }
                }
                vec![(segmentation.source().filter, labels::CREATE_LINK.to_string())]
            }
        };

        let kind = data.kind();
        self.graph.add_item(id, kind)?;
        let producers = if link { producers } else { Vec::new() };
        let mut linked = Vec::with_capacity(producers.len());
        for (producer, label) in producers {
            match self.graph.add_relation(producer, id, label) {
                Ok(relation) => linked.push(relation),
                Err(err) => {
                    // Undo the half-linked vertex; both calls target what was
                    // just added.
                    let _ = self.graph.remove_relations_of(id);
                    let _ = self.graph.remove_item(id);
                    return Err(err.into());
                }
            }
        }

        if let ItemData::Segmentation(segmentation) = &mut data {
            let number = self.assign_number(segmentation.number());
            segmentation.set_number(number);
            if name.is_empty() {
                name = format!("Segmentation {number}");
            }
        }

        self.next_id = self.next_id.max(id.get().saturating_add(1));
        self.items
            .insert(id, Item::new(id, name, data).with_key_order(key_order));
        self.changed = true;
        self.record_added(id);
        for relation in linked {
            self.emit(&ModelEvent::RelationAdded(relation));
        }
        tracing::debug!(%id, %kind, "item added");
        Ok(id)
    }

    fn allocate_id(&mut self) -> ItemId {
        while self.items.contains_key(&ItemId::new(self.next_id)) {
            self.next_id += 1;
        }
        ItemId::new(self.next_id)
    }

    fn assign_number(&mut self, requested: u32) -> u32 {
        if requested == 0 {
            self.last_number += 1;
            self.last_number
        } else {
            self.last_number = self.last_number.max(requested);
            requested
        }
    }

    fn expect_kind(&self, id: ItemId, expected: ItemKind) -> Result<&Item, ModelError> {
        let item = self.items.get(&id).ok_or(ModelError::UnknownItem(id))?;
        if item.kind() == expected {
            Ok(item)
        } else {
            Err(ModelError::WrongKind {
                id,
                expected,
                found: item.kind(),
            })
        }
    }

    /// Remove an item that has no relations left
    ///
    /// # Errors
    ///
    /// [`ModelError::HasRelations`] while relations reference the item.
    pub fn remove(&mut self, id: ItemId) -> Result<Item, ModelError> {
        self.batch(|model| model.take(id))
    }

    fn take(&mut self, id: ItemId) -> Result<Item, ModelError> {
        if !self.items.contains_key(&id) {
            return Err(ModelError::UnknownItem(id));
        }
        let count = self.graph.relation_count_of(id);
        if count > 0 {
            return Err(ModelError::HasRelations { id, count });
        }
        self.graph.remove_item(id)?;
        let item = self.items.shift_remove(&id).ok_or(ModelError::UnknownItem(id))?;
        self.changed = true;
        self.record_removed(id);
        tracing::debug!(%id, kind = %item.kind(), "item removed");
        Ok(item)
    }

    /// Delete an item, asking `policy` when others are reachable from it
    ///
    /// `Recursive` deletes the item and every item reachable from it,
    /// `OnlyDirect` deletes the item alone and is refused while something
    /// depends on it, `Cancel` deletes nothing. Returns the deleted ids.
    ///
    /// # Errors
    ///
    /// Unknown item, or [`ModelError::WouldOrphan`].
    pub fn delete_item(&mut self, id: ItemId, policy: &mut dyn DeletePolicy) -> Result<Vec<ItemId>, ModelError> {
        if !self.items.contains_key(&id) {
            return Err(ModelError::UnknownItem(id));
        }
        let affected = self.graph.descendants(id);
        let doomed = if affected.is_empty() {
            vec![id]
        } else {
            match policy.confirm_recursive_delete(&affected) {
                DeleteDecision::Cancel => return Ok(Vec::new()),
                DeleteDecision::OnlyDirect => {
                    if let Some(&dependent) = self.graph.dependents(id).first() {
                        return Err(ModelError::WouldOrphan { id, dependent });
                    }
                    vec![id]
                }
                DeleteDecision::Recursive => std::iter::once(id).chain(affected).collect(),
            }
        };

        self.batch(|model| {
            for &doomed_id in &doomed {
                for relation in model.graph.remove_relations_of(doomed_id)? {
                    model.emit(&ModelEvent::RelationRemoved(relation));
                }
            }
            for &doomed_id in doomed.iter().rev() {
                model.take(doomed_id)?;
            }
            Ok(doomed)
        })
    }

    /// Item by id
    #[inline]
    #[must_use]
    pub fn find(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    /// Whether `id` is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    /// Items in insertion order
    pub fn items(&self) -> impl Iterator<Item = &Item> + '_ {
        self.items.values()
    }

    /// Items of one kind in insertion order
    pub fn items_of(&self, kind: ItemKind) -> impl Iterator<Item = &Item> + '_ {
        self.items.values().filter(move |item| item.kind() == kind)
    }

    /// Number of items
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// First item equal to the description: same kind, name and serialized
    /// arguments
    #[must_use]
    pub fn find_equivalent(&self, kind: ItemKind, name: &str, arguments: &Arguments) -> Option<ItemId> {
        self.items
            .values()
            .find(|item| {
                item.kind() == kind && item.name() == name && item.arguments().is_ok_and(|args| &args == arguments)
            })
            .map(Item::id)
    }

    /// Highest segmentation label handed out or seen so far
    #[inline]
    #[must_use]
    pub fn last_segmentation_number(&self) -> u32 {
        self.last_number
    }

    // ------------------------------------------------------------------
    // Relations
    // ------------------------------------------------------------------

    /// Add the relation `source -> target` labeled `label`
    ///
    /// # Errors
    ///
    /// Unknown endpoints, duplicates, or a dependency cycle.
    pub fn add_relation(
        &mut self,
        source: ItemId,
        target: ItemId,
        label: impl Into<String>,
    ) -> Result<Relation, ModelError> {
        let label = label.into();
        self.batch(|model| {
            let relation = model.graph.add_relation(source, target, label)?;
            model.changed = true;
            model.emit(&ModelEvent::RelationAdded(relation.clone()));
            Ok(relation)
        })
    }

    /// Remove the relation `source -> target` labeled `label`
    ///
    /// # Errors
    ///
    /// Unknown endpoints or no such relation.
    pub fn remove_relation(&mut self, source: ItemId, target: ItemId, label: &str) -> Result<Relation, ModelError> {
        self.batch(|model| {
            let relation = model.graph.remove_relation(source, target, label)?;
            model.changed = true;
            model.emit(&ModelEvent::RelationRemoved(relation.clone()));
            Ok(relation)
        })
    }

    /// Items related to `id`, optionally restricted to one label
    ///
    /// # Errors
    ///
    /// [`ModelError::UnknownItem`].
    pub fn related_items(
        &self,
        id: ItemId,
        direction: Direction,
        label: Option<&str>,
    ) -> Result<Vec<ItemId>, ModelError> {
        if !self.contains(id) {
            return Err(ModelError::UnknownItem(id));
        }
        Ok(self.graph.related(id, direction, label))
    }

    /// All relations in insertion order
    #[must_use]
    pub fn relations(&self) -> Vec<Relation> {
        self.graph.relations()
    }

    /// Read access to the relationship graph
    #[inline]
    #[must_use]
    pub fn graph(&self) -> &RelationshipGraph {
        &self.graph
    }

    // ------------------------------------------------------------------
    // Item data
    // ------------------------------------------------------------------

    /// Change the display name
    ///
    /// # Errors
    ///
    /// [`ModelError::UnknownItem`].
    pub fn rename(&mut self, id: ItemId, name: impl Into<String>) -> Result<(), ModelError> {
        let item = self.items.get_mut(&id).ok_or(ModelError::UnknownItem(id))?;
        item.set_name(name.into());
        self.item_changed(id);
        Ok(())
    }

    /// Set a free argument of a sample, channel or segmentation
    ///
    /// # Errors
    ///
    /// Unknown item, filters (their arguments belong to the filter), or a
    /// key/value that breaks the grammar.
    pub fn set_argument(&mut self, id: ItemId, key: &str, value: &str) -> Result<(), ModelError> {
        let item = self.items.get_mut(&id).ok_or(ModelError::UnknownItem(id))?;
        let arguments = match item.data_mut() {
            ItemData::Sample(sample) => sample.arguments_mut(),
            ItemData::Channel(channel) => channel.arguments_mut(),
            ItemData::Segmentation(segmentation) => segmentation.arguments_mut(),
            ItemData::Filter(_) => {
                return Err(ModelError::WrongKind {
                    id,
                    expected: ItemKind::Sample,
                    found: ItemKind::Filter,
                })
            }
        };
        arguments.insert(key, value)?;
        self.item_changed(id);
        Ok(())
    }

    /// Classify a segmentation; `None` clears the category
    ///
    /// # Errors
    ///
    /// Unknown item, not a segmentation, or unknown category.
    pub fn set_category(&mut self, id: ItemId, category: Option<&str>) -> Result<(), ModelError> {
        if let Some(name) = category {
            if !self.taxonomy.contains(name) {
                return Err(TaxonomyError::UnknownElement(name.to_string()).into());
            }
        }
        let found = self.items.get(&id).map(Item::kind).ok_or(ModelError::UnknownItem(id))?;
        let Some(ItemData::Segmentation(segmentation)) = self.items.get_mut(&id).map(Item::data_mut) else {
            return Err(ModelError::WrongKind {
                id,
                expected: ItemKind::Segmentation,
                found,
            });
        };
        segmentation.set_category(category.map(str::to_string));
        self.item_changed(id);
        Ok(())
    }

    /// Flag an output as edited so it is always persisted
    ///
    /// # Errors
    ///
    /// Unknown item, not a filter, or no such output.
    pub fn mark_output_edited(&mut self, id: ItemId, output: OutputId) -> Result<(), ModelError> {
        let filter = self.filter_item_mut(id)?;
        if !filter.filter().outputs().contains(&output) {
            return Err(ModelError::MissingOutput { filter: id, output });
        }
        if filter.mark_edited(output) {
            self.item_changed(id);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Filters
    // ------------------------------------------------------------------

    /// Filter slot of `id`
    ///
    /// # Errors
    ///
    /// Unknown item or not a filter.
    pub fn filter_item(&self, id: ItemId) -> Result<&FilterItem, ModelError> {
        let item = self.expect_kind(id, ItemKind::Filter)?;
        item.as_filter().ok_or(ModelError::UnknownItem(id))
    }

    fn filter_item_mut(&mut self, id: ItemId) -> Result<&mut FilterItem, ModelError> {
        self.expect_kind(id, ItemKind::Filter)?;
        self.items
            .get_mut(&id)
            .and_then(Item::as_filter_mut)
            .ok_or(ModelError::UnknownItem(id))
    }

    /// Compute `output` of filter `id`, bringing its inputs up to date first
    ///
    /// # Errors
    ///
    /// [`ModelError::Filter`] naming the first filter that failed.
    pub fn update_filter(&mut self, id: ItemId, output: OutputId) -> Result<(), ModelError> {
        let mut plan = Vec::new();
        self.plan_update(OutputRef::new(id, output), &mut plan)?;
        for step in plan {
            self.filter_item_mut(step.filter)?
                .filter_mut()
                .update(step.output)
                .map_err(|source| ModelError::filter(step.filter, source))?;
        }
        Ok(())
    }

    fn plan_update(&self, target: OutputRef, plan: &mut Vec<OutputRef>) -> Result<(), ModelError> {
        if plan.contains(&target) {
            return Ok(());
        }
        for input in self.filter_item(target.filter)?.inputs() {
            self.plan_update(*input, plan)?;
        }
        plan.push(target);
        Ok(())
    }

    /// Point filter `id` at its snapshot files
    ///
    /// # Errors
    ///
    /// Unknown item, not a filter, or the filter rejecting the cache.
    pub fn attach_cache(&mut self, id: ItemId, cache: SnapshotCache) -> Result<(), ModelError> {
        let filter = self.filter_item_mut(id)?;
        filter
            .filter_mut()
            .restore_cache(&cache)
            .map_err(|source| ModelError::filter(id, source))?;
        filter.set_cache(cache);
        Ok(())
    }

    /// Let filter `id` settle now that its relations are in place
    ///
    /// # Errors
    ///
    /// Unknown item, not a filter, or the filter failing to settle.
    pub fn settle_filter(&mut self, id: ItemId) -> Result<(), ModelError> {
        self.filter_item_mut(id)?
            .filter_mut()
            .settle()
            .map_err(|source: FilterError| ModelError::filter(id, source))
    }

    // ------------------------------------------------------------------
    // Categories
    // ------------------------------------------------------------------

    /// Category tree
    #[inline]
    #[must_use]
    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Create a category and its missing parents, each with the default
    /// properties
    ///
    /// # Errors
    ///
    /// Malformed qualified name.
    pub fn create_category(&mut self, qualified: &str) -> Result<(), ModelError> {
        let qualified = if qualified.is_empty() { UNSPECIFIED } else { qualified };
        if qualified.split(SEPARATOR).any(str::is_empty) {
            return Err(TaxonomyError::EmptySegment(qualified.to_string()).into());
        }

        let mut prefix = String::with_capacity(qualified.len());
        for segment in qualified.split(SEPARATOR) {
            if !prefix.is_empty() {
                prefix.push(SEPARATOR);
            }
            prefix.push_str(segment);
            let created = !self.taxonomy.contains(&prefix);
            let node = self.taxonomy.create_element(&prefix)?;
            if !created && prefix.len() < qualified.len() {
                continue;
            }
            for (key, value) in &self.config.category_defaults {
                if node.property(key).is_none() {
                    node.set_property(key.clone(), value.clone());
                }
            }
        }
        self.changed = true;
        Ok(())
    }

    /// Remove a category subtree, uncategorizing its segmentations
    ///
    /// # Errors
    ///
    /// Unknown category.
    pub fn remove_category(&mut self, qualified: &str) -> Result<(), ModelError> {
        self.taxonomy.remove_element(qualified)?;
        let nested = format!("{qualified}{SEPARATOR}");
        let affected: Vec<ItemId> = self
            .items
            .values()
            .filter_map(|item| {
                let category = item.as_segmentation()?.category()?;
                (category == qualified || category.starts_with(&nested)).then_some(item.id())
            })
            .collect();
        for id in affected {
            if let Some(ItemData::Segmentation(segmentation)) = self.items.get_mut(&id).map(Item::data_mut) {
                segmentation.set_category(None);
            }
            self.item_changed(id);
        }
        self.changed = true;
        Ok(())
    }

    /// Merge `other` into the category tree, then repair missing default
    /// properties
    ///
    /// Returns the qualified names of repaired elements.
    pub fn merge_taxonomy(&mut self, other: &Taxonomy) -> Vec<String> {
        self.taxonomy.merge(other);
        self.taxonomy.repair_properties(&self.config.category_defaults)
    }

    // ------------------------------------------------------------------
    // Session state
    // ------------------------------------------------------------------

    /// Whether the session keeps the full trace
    #[inline]
    #[must_use]
    pub fn is_traceable(&self) -> bool {
        self.traceable
    }

    /// Switch trace mode
    pub fn set_traceable(&mut self, traceable: bool) {
        self.traceable = traceable;
    }

    /// Whether anything changed since the last save
    #[inline]
    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Clear the dirty flag
    pub fn mark_saved(&mut self) {
        self.changed = false;
    }

    /// Restore point covering later additions
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            items: self.items.len(),
            relation_seq: self.graph.sequence(),
            next_id: self.next_id,
            last_number: self.last_number,
            taxonomy: self.taxonomy.clone(),
            traceable: self.traceable,
            changed: self.changed,
        }
    }

    /// Undo every item and relation added since `checkpoint` and restore
    /// counters, categories and flags
    ///
    /// Items removed after the checkpoint are not brought back.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.begin_batch();
        for relation in self.graph.relations_since(checkpoint.relation_seq).into_iter().rev() {
            if self
                .graph
                .remove_relation(relation.source, relation.target, &relation.label)
                .is_ok()
            {
                self.emit(&ModelEvent::RelationRemoved(relation));
            }
        }
        while self.items.len() > checkpoint.items {
            let Some((id, _)) = self.items.pop() else {
                break;
            };
            // Their relations were all added after the checkpoint.
            let _ = self.graph.remove_relations_of(id);
            let _ = self.graph.remove_item(id);
            self.record_removed(id);
        }
        self.next_id = checkpoint.next_id;
        self.last_number = checkpoint.last_number;
        self.taxonomy = checkpoint.taxonomy;
        self.traceable = checkpoint.traceable;
        self.changed = checkpoint.changed;
        self.close_batch();
        tracing::debug!(items = self.items.len(), "model rolled back");
    }

    /// Drop every item, relation and category and reset the counters
    pub fn reset(&mut self) {
        self.begin_batch();
        for relation in self.graph.relations().into_iter().rev() {
            if self
                .graph
                .remove_relation(relation.source, relation.target, &relation.label)
                .is_ok()
            {
                self.emit(&ModelEvent::RelationRemoved(relation));
            }
        }
        while let Some((id, _)) = self.items.pop() {
            let _ = self.graph.remove_item(id);
            self.record_removed(id);
        }
        self.taxonomy = Taxonomy::new();
        self.next_id = 0;
        self.last_number = 0;
        self.traceable = self.config.traceable;
        self.changed = false;
        self.close_batch();
    }
}
