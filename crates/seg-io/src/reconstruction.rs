//! Reconstruction engine
//!
//! Rebuilds live items from a parsed [`Trace`] in five passes:
//!
//! 1. dedup: vertices equal to a live item bind to it instead of being
//!    created
//! 2. samples, channels and filters in file order; segmentations are
//!    deferred
//! 3. deferred segmentations, once every filter exists
//! 4. edges in file order, through the parsed-to-live binding table
//! 5. every filter involved settles, upstream first
//!
//! Items are registered unlinked: their `Volume`, input-slot and
//! `CreateLink` relations come from the trace like every other edge, so the
//! rebuilt model lists its relations in the order the file does.
//!
//! Filter faults (errors and panics alike) stop here. A channel whose output
//! cannot be produced is dropped when nothing in the trace depends on it;
//! every other failure aborts the load and rolls the model back to where it
//! was before the first mutation.

use crate::error::ReconstructionError;
use crate::read_only::ReadOnlyFilter;
use crate::trace::{Trace, TraceVertex};
use indexmap::IndexMap;
use seg_core::labels::{self, keys};
use seg_core::{ItemId, ItemKind, OutputId, OutputRef};
use seg_model::{
    AnalysisModel, Channel, Filter, FilterError, FilterFactory, FilterInputs, FilterItem, ModelError, NewItem, Sample,
    Segmentation, SnapshotCache,
};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

/// What a reconstruction did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconstructionReport {
    /// Parsed vertex id to live item id
    pub bindings: IndexMap<ItemId, ItemId>,
    /// Live ids of the items created, in creation order
    pub created: Vec<ItemId>,
    /// Parsed ids bound to items that already existed
    pub reused: Vec<ItemId>,
    /// Parsed ids of orphan channels that were dropped
    pub pruned: Vec<ItemId>,
    /// Relations added to the model
    pub relations_added: usize,
}

impl ReconstructionReport {
    /// Live item bound to parsed vertex `parsed`
    #[inline]
    #[must_use]
    pub fn live_id(&self, parsed: ItemId) -> Option<ItemId> {
        self.bindings.get(&parsed).copied()
    }
}

/// Rebuilds a trace into a model
pub struct Reconstruction<'a> {
    factory: &'a dyn FilterFactory,
    scratch_dir: Option<PathBuf>,
    fallback_to_read_only: bool,
}

impl<'a> Reconstruction<'a> {
    /// Engine creating filters through `factory`
    #[must_use]
    pub fn new(factory: &'a dyn FilterFactory) -> Self {
        Self {
            factory,
            scratch_dir: None,
            fallback_to_read_only: true,
        }
    }

    /// Directory holding the archived snapshots; filters are pointed at it
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Whether unknown filter types become [`ReadOnlyFilter`]s instead of
    /// failing the load
    #[must_use]
    pub fn with_read_only_fallback(mut self, enabled: bool) -> Self {
        self.fallback_to_read_only = enabled;
        self
    }

    /// Rebuild `trace` into `model`
    ///
    /// Observers see one structural bracket. On failure the model is rolled
    /// back and the error names the offending vertex.
    ///
    /// # Errors
    ///
    /// Any [`ReconstructionError`].
    pub fn run(&self, model: &mut AnalysisModel, trace: Trace) -> Result<ReconstructionReport, ReconstructionError> {
        tracing::info!(
            vertices = trace.vertex_count(),
            edges = trace.edge_count(),
            "reconstructing trace"
        );
        model.batch(|model| {
            let checkpoint = model.checkpoint();
            let mut pass = Pass {
                engine: self,
                trace,
                report: ReconstructionReport::default(),
                filters: Vec::new(),
            };
            match pass.run(model) {
                Ok(()) => {
                    tracing::info!(
                        created = pass.report.created.len(),
                        reused = pass.report.reused.len(),
                        pruned = pass.report.pruned.len(),
                        relations = pass.report.relations_added,
                        "trace reconstructed"
                    );
                    Ok(pass.report)
                }
                Err(err) => {
                    tracing::error!(error = %err, "reconstruction failed, rolling back");
                    model.rollback(checkpoint);
                    Err(err)
                }
            }
        })
    }
}

struct Pass<'e, 'a> {
    engine: &'e Reconstruction<'a>,
    trace: Trace,
    report: ReconstructionReport,
    /// (parsed, live) of every filter involved
    filters: Vec<(ItemId, ItemId)>,
}

impl Pass<'_, '_> {
    fn run(&mut self, model: &mut AnalysisModel) -> Result<(), ReconstructionError> {
        self.dedup(model);

        let vertices: Vec<TraceVertex> = self.trace.vertices().cloned().collect();
        let mut deferred = Vec::new();
        for vertex in vertices {
            if self.report.bindings.contains_key(&vertex.id) {
                continue;
            }
            match vertex.kind {
                ItemKind::Sample => self.create_sample(model, vertex)?,
                ItemKind::Channel => self.create_channel(model, vertex)?,
                ItemKind::Filter => self.create_filter(model, vertex)?,
                ItemKind::Segmentation => deferred.push(vertex),
                // Never produced by the trace parser.
                ItemKind::CategoryElement => {}
            }
        }

        for vertex in deferred {
            self.create_segmentation(model, vertex)?;
        }
        self.relink(model)?;
        self.settle(model)
    }

    fn dedup(&mut self, model: &AnalysisModel) {
        if model.is_empty() {
            return;
        }
        for vertex in self.trace.vertices() {
            if let Some(live) = model.find_equivalent(vertex.kind, &vertex.name, &vertex.arguments) {
                tracing::debug!(parsed = %vertex.id, %live, "vertex already loaded");
                self.report.bindings.insert(vertex.id, live);
                self.report.reused.push(vertex.id);
                if vertex.kind == ItemKind::Filter {
                    self.filters.push((vertex.id, live));
                }
            }
        }
    }

    fn bound(&self, parsed: ItemId) -> Result<ItemId, ReconstructionError> {
        self.report.live_id(parsed).ok_or(ReconstructionError::Unbound(parsed))
    }

    fn live_filter(&self, model: &AnalysisModel, vertex: ItemId, ancestor: ItemId) -> Result<ItemId, ReconstructionError> {
        let live = self.bound(ancestor)?;
        match model.find(live).map(seg_model::Item::kind) {
            Some(ItemKind::Filter) => Ok(live),
            _ => Err(ReconstructionError::NotAFilter { id: vertex, ancestor }),
        }
    }

    fn register(&mut self, model: &mut AnalysisModel, parsed: ItemId, item: NewItem) -> Result<ItemId, ReconstructionError> {
        let item = item.without_links();
        // Keep the archive id unless something already uses it.
        let item = if model.contains(parsed) { item } else { item.with_id(parsed) };
        let live = model.add(item)?;
        self.report.bindings.insert(parsed, live);
        self.report.created.push(live);
        Ok(live)
    }

    fn create_sample(&mut self, model: &mut AnalysisModel, vertex: TraceVertex) -> Result<(), ReconstructionError> {
        tracing::debug!(id = %vertex.id, name = %vertex.name, "creating sample");
        self.register(
            model,
            vertex.id,
            NewItem::sample(vertex.name, Sample::new(vertex.arguments.clone())).with_key_order(&vertex.arguments),
        )?;
        Ok(())
    }

    fn create_channel(&mut self, model: &mut AnalysisModel, vertex: TraceVertex) -> Result<(), ReconstructionError> {
        let id = vertex.id;
        let declared = Channel::from_arguments(&vertex.arguments)
            .map_err(|source| ReconstructionError::Arguments { id, source })?
            .volume();
        let producer = self.trace.graph().single_ancestor(id, labels::VOLUME)?;
        if producer != declared.filter {
            return Err(ReconstructionError::ProducerMismatch {
                id,
                key: keys::VOLUME,
                declared: declared.filter,
                linked: producer,
            });
        }
        let filter = self.live_filter(model, id, producer)?;
        let output = OutputRef::new(filter, declared.output);

        if let Err(source) = compute(model, filter, output.output) {
            if self.trace.graph().successors(id, None).is_empty() {
                tracing::warn!(channel = %id, filter = %producer, output = output.output, error = %source,
                    "channel output unavailable, dropping orphan channel");
                self.trace.drop_edges(id);
                self.report.pruned.push(id);
                return Ok(());
            }
            return Err(ReconstructionError::Output {
                id,
                filter: producer,
                output: output.output,
                source,
            });
        }

        tracing::debug!(%id, name = %vertex.name, %output, "creating channel");
        let item = NewItem::channel(vertex.name, Channel::new(output, vertex.arguments.clone()))
            .with_key_order(&vertex.arguments);
        self.register(model, id, item)?;
        Ok(())
    }

    fn create_filter(&mut self, model: &mut AnalysisModel, vertex: TraceVertex) -> Result<(), ReconstructionError> {
        let id = vertex.id;
        let (declared, edited, arguments) = FilterItem::split_arguments(&vertex.arguments)
            .map_err(|source| ReconstructionError::Arguments { id, source })?;

        let mut inputs = FilterInputs::with_capacity(declared.len());
        for (position, input) in declared.iter().enumerate() {
            let producer = self
                .trace
                .graph()
                .single_ancestor(id, &labels::input_slot(position, input.output))?;
            if producer != input.filter {
                return Err(ReconstructionError::ProducerMismatch {
                    id,
                    key: keys::INPUTS,
                    declared: input.filter,
                    linked: producer,
                });
            }
            let live = self.live_filter(model, id, producer)?;
            inputs.push(OutputRef::new(live, input.output));
        }

        let type_name = vertex.name;
        let filter = match guard(|| self.engine.factory.create_filter(&type_name, &inputs, &arguments)) {
            Ok(filter) => filter,
            Err(FilterError::UnknownType(_)) if self.engine.fallback_to_read_only => {
                tracing::warn!(%id, filter_type = %type_name, "unknown filter type, using archived outputs only");
                Box::new(ReadOnlyFilter::new(type_name.clone(), arguments)) as Box<dyn Filter>
            }
            Err(source) => return Err(ReconstructionError::Filter { id, source }),
        };

        tracing::debug!(%id, filter_type = %type_name, inputs = inputs.len(), "creating filter");
        let item = NewItem::filter(FilterItem::new(filter, inputs).with_edited(edited)).with_key_order(&vertex.arguments);
        let live = self.register(model, id, item)?;
        if let Some(dir) = &self.engine.scratch_dir {
            // Snapshot files carry the archive id.
            attach_cache(model, live, dir, id).map_err(|source| ReconstructionError::Filter { id, source })?;
        }
        self.filters.push((id, live));
        Ok(())
    }

    fn create_segmentation(&mut self, model: &mut AnalysisModel, vertex: TraceVertex) -> Result<(), ReconstructionError> {
        let id = vertex.id;
        let creator = self.trace.graph().single_ancestor(id, labels::CREATE_LINK)?;
        let filter = self.live_filter(model, id, creator)?;
        let segmentation = Segmentation::from_arguments(filter, &vertex.arguments)
            .map_err(|source| ReconstructionError::Arguments { id, source })?;
        let output = segmentation.source().output;

        compute(model, filter, output).map_err(|source| ReconstructionError::Output {
            id,
            filter: creator,
            output,
            source,
        })?;

        tracing::debug!(%id, number = segmentation.number(), "creating segmentation");
        let item = NewItem::segmentation(vertex.name, segmentation).with_key_order(&vertex.arguments);
        self.register(model, id, item)?;
        Ok(())
    }

    fn relink(&mut self, model: &mut AnalysisModel) -> Result<(), ReconstructionError> {
        for relation in self.trace.edges() {
            let source = self.bound(relation.source)?;
            let target = self.bound(relation.target)?;
            // Both ends were already loaded.
            if model.graph().contains_relation(source, target, &relation.label) {
                continue;
            }
            model.add_relation(source, target, relation.label)?;
            self.report.relations_added += 1;
        }
        Ok(())
    }

    fn settle(&mut self, model: &mut AnalysisModel) -> Result<(), ReconstructionError> {
        let order = model.graph().dependency_order()?;
        let rank = |live: &ItemId| order.iter().position(|id| id == live).unwrap_or(usize::MAX);
        self.filters.sort_by_key(|(_, live)| rank(live));

        for &(id, live) in &self.filters {
            guard(|| match model.settle_filter(live) {
                Err(ModelError::Filter { source, .. }) => Err(source),
                other => other.map_err(|e| FilterError::Execution(e.to_string())),
            })
            .map_err(|source| ReconstructionError::Filter { id, source })?;
        }
        Ok(())
    }
}

/// Bring `output` of `filter` up to date, converting every fault into a
/// [`FilterError`]
fn compute(model: &mut AnalysisModel, filter: ItemId, output: OutputId) -> Result<(), FilterError> {
    guard(|| match model.update_filter(filter, output) {
        Err(ModelError::Filter { source, .. }) => Err(source),
        other => other.map_err(|e| FilterError::Execution(e.to_string())),
    })
}

fn attach_cache(model: &mut AnalysisModel, live: ItemId, dir: &Path, key: ItemId) -> Result<(), FilterError> {
    guard(|| match model.attach_cache(live, SnapshotCache::new(dir, key)) {
        Err(ModelError::Filter { source, .. }) => Err(source),
        other => other.map_err(|e| FilterError::Execution(e.to_string())),
    })
}

/// Run filter code, turning a panic into [`FilterError::Panicked`]
fn guard<T>(f: impl FnOnce() -> Result<T, FilterError>) -> Result<T, FilterError> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(FilterError::Panicked(message))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_converts_panics() {
        let err = guard::<()>(|| panic!("boom")).unwrap_err();
        assert!(matches!(err, FilterError::Panicked(message) if message == "boom"));

        let err = guard::<()>(|| panic!("{}", String::from("formatted"))).unwrap_err();
        assert!(matches!(err, FilterError::Panicked(message) if message == "formatted"));

        assert_eq!(guard(|| Ok(3)).unwrap(), 3);
    }
}
