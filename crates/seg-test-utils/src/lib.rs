//! Testing utilities for the segmentation analysis workspace
//!
//! Mock filters driven by their own arguments, a recording observer, a
//! notes cache extension and canned analyses.

#![allow(missing_docs, clippy::missing_panics_doc)]

use parking_lot::Mutex;
use seg_core::labels;
use seg_core::{Arguments, ItemId, OutputId, OutputRef};
use seg_io::{CacheEntry, CacheExtension, ErrorHandler, ExtensionError};
use seg_model::{
    AnalysisModel, Channel, Filter, FilterError, FilterFactory, FilterItem, ModelEvent, ModelObserver, NewItem,
    OutputSnapshot, Sample, Segmentation, SnapshotCache,
};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outputs a mock filter provides, `[0]` when absent
pub const OUTPUTS_KEY: &str = "Outputs";
/// Outputs whose update fails
pub const FAIL_KEY: &str = "Fail";
/// Outputs whose update panics
pub const PANIC_KEY: &str = "Panic";

/// Filter types [`MockFactory::default`] knows
pub const MOCK_TYPES: [&str; 4] = ["Reader", "Threshold", "Watershed", "Seeds"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterCall {
    Created(String),
    Update(String, OutputId),
    RestoreCache(String, ItemId),
    Settle(String),
}

pub type FilterLog = Arc<Mutex<Vec<FilterCall>>>;

fn outputs_of(arguments: &Arguments, key: &str) -> Vec<OutputId> {
    arguments
        .list(key)
        .unwrap_or_default()
        .iter()
        .filter_map(|entry| entry.trim().parse().ok())
        .collect()
}

#[derive(Debug)]
pub struct MockFilter {
    type_name: String,
    arguments: Arguments,
    outputs: Vec<OutputId>,
    failing: Vec<OutputId>,
    panicking: Vec<OutputId>,
    cache: Option<SnapshotCache>,
    log: FilterLog,
}

impl MockFilter {
    pub fn new(type_name: &str, arguments: Arguments, log: FilterLog) -> Self {
        let outputs = if arguments.contains_key(OUTPUTS_KEY) {
            outputs_of(&arguments, OUTPUTS_KEY)
        } else {
            vec![0]
        };
        Self {
            type_name: type_name.to_string(),
            failing: outputs_of(&arguments, FAIL_KEY),
            panicking: outputs_of(&arguments, PANIC_KEY),
            outputs,
            arguments,
            cache: None,
            log,
        }
    }

    pub fn boxed(type_name: &str, raw_arguments: &str, log: &FilterLog) -> Box<dyn Filter> {
        let arguments = Arguments::parse(raw_arguments).unwrap();
        Box::new(Self::new(type_name, arguments, Arc::clone(log)))
    }

    pub fn cache(&self) -> Option<&SnapshotCache> {
        self.cache.as_ref()
    }
}

impl Filter for MockFilter {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn arguments(&self) -> Arguments {
        self.arguments.clone()
    }

    fn outputs(&self) -> Vec<OutputId> {
        self.outputs.clone()
    }

    fn update(&mut self, output: OutputId) -> Result<(), FilterError> {
        self.log.lock().push(FilterCall::Update(self.type_name.clone(), output));
        if self.panicking.contains(&output) {
            panic!("{} panicked computing output {output}", self.type_name);
        }
        if self.failing.contains(&output) {
            return Err(FilterError::Execution(format!("{} cannot compute {output}", self.type_name)));
        }
        if !self.outputs.contains(&output) {
            return Err(FilterError::OutputUnavailable(output));
        }
        Ok(())
    }

    fn snapshot(&self, output: OutputId) -> Result<Option<OutputSnapshot>, FilterError> {
        if !self.outputs.contains(&output) {
            return Ok(None);
        }
        Ok(Some(OutputSnapshot {
            header: format!("ObjectType = Image\nFilter = {}\nOutput = {output}\n", self.type_name).into_bytes(),
            payload: format!("{}:{output}", self.type_name).into_bytes(),
        }))
    }

    fn restore_cache(&mut self, cache: &SnapshotCache) -> Result<(), FilterError> {
        self.log
            .lock()
            .push(FilterCall::RestoreCache(self.type_name.clone(), cache.key()));
        self.cache = Some(cache.clone());
        Ok(())
    }

    fn settle(&mut self) -> Result<(), FilterError> {
        self.log.lock().push(FilterCall::Settle(self.type_name.clone()));
        Ok(())
    }
}

/// Factory building [`MockFilter`]s for a fixed set of type names
#[derive(Debug, Clone)]
pub struct MockFactory {
    types: Vec<String>,
    log: FilterLog,
}

impl Default for MockFactory {
    fn default() -> Self {
        Self::with_types(&MOCK_TYPES)
    }
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(types: &[&str]) -> Self {
        Self {
            types: types.iter().map(|t| (*t).to_string()).collect(),
            log: FilterLog::default(),
        }
    }

    pub fn log(&self) -> &FilterLog {
        &self.log
    }

    pub fn calls(&self) -> Vec<FilterCall> {
        self.log.lock().clone()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }

    pub fn filter(&self, type_name: &str, raw_arguments: &str) -> Box<dyn Filter> {
        MockFilter::boxed(type_name, raw_arguments, &self.log)
    }
}

impl FilterFactory for MockFactory {
    fn create_filter(
        &self,
        type_name: &str,
        _inputs: &[OutputRef],
        arguments: &Arguments,
    ) -> Result<Box<dyn Filter>, FilterError> {
        if !self.types.iter().any(|t| t == type_name) {
            return Err(FilterError::UnknownType(type_name.to_string()));
        }
        self.log.lock().push(FilterCall::Created(type_name.to_string()));
        Ok(Box::new(MockFilter::new(type_name, arguments.clone(), Arc::clone(&self.log))))
    }
}

/// Observer keeping every event it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<ModelEvent>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ModelEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn begin_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, ModelEvent::StructureChangeBegin))
            .count()
    }

    pub fn end_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, ModelEvent::StructureChangeEnd(_)))
            .count()
    }
}

impl ModelObserver for RecordingObserver {
    fn notify(&mut self, event: &ModelEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Per-segmentation notes stored in `Extensions/Notes/notes.txt`
///
/// Notes are keyed by the producing output (`filterId_output`).
#[derive(Debug, Clone, Default)]
pub struct NotesExtension {
    notes: Arc<Mutex<BTreeMap<String, String>>>,
}

impl NotesExtension {
    pub const PATH: &'static str = "Extensions/Notes/notes.txt";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, source: OutputRef, note: &str) {
        self.notes.lock().insert(source.to_string(), note.to_string());
    }

    pub fn get(&self, source: OutputRef) -> Option<String> {
        self.notes.lock().get(&source.to_string()).cloned()
    }

    pub fn len(&self) -> usize {
        self.notes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.lock().is_empty()
    }
}

impl CacheExtension for NotesExtension {
    fn id(&self) -> &str {
        "notes"
    }

    fn is_cache_file(&self, path: &str) -> bool {
        path.starts_with("Extensions/Notes/")
    }

    fn load_cache(
        &mut self,
        _path: &str,
        data: &[u8],
        _scratch: &Path,
        _model: &AnalysisModel,
    ) -> Result<(), ExtensionError> {
        let text = std::str::from_utf8(data).map_err(|e| ExtensionError::new(e.to_string()))?;
        let mut notes = self.notes.lock();
        for line in text.lines().filter(|line| !line.is_empty()) {
            let (key, note) = line
                .split_once('\t')
                .ok_or_else(|| ExtensionError::new(format!("malformed note line `{line}`")))?;
            notes.insert(key.to_string(), note.to_string());
        }
        Ok(())
    }

    fn save_cache(&mut self, _model: &AnalysisModel) -> Result<Vec<CacheEntry>, ExtensionError> {
        let notes = self.notes.lock();
        if notes.is_empty() {
            return Ok(Vec::new());
        }
        let text: String = notes.iter().map(|(key, note)| format!("{key}\t{note}\n")).collect();
        Ok(vec![CacheEntry::new(Self::PATH, text)])
    }
}

/// Error handler keeping every message; optionally relocates missing files
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    warnings: Arc<Mutex<Vec<String>>>,
    errors: Arc<Mutex<Vec<String>>>,
    relocate_to: Option<PathBuf>,
    asked: Arc<Mutex<Vec<PathBuf>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relocating_to(path: impl Into<PathBuf>) -> Self {
        Self {
            relocate_to: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    /// Paths reported missing
    pub fn asked(&self) -> Vec<PathBuf> {
        self.asked.lock().clone()
    }
}

impl ErrorHandler for RecordingHandler {
    fn warning(&mut self, message: &str) {
        self.warnings.lock().push(message.to_string());
    }

    fn error(&mut self, message: &str) {
        self.errors.lock().push(message.to_string());
    }

    fn file_not_found(&mut self, path: &Path, _hint: &str) -> Option<PathBuf> {
        self.asked.lock().push(path.to_path_buf());
        self.relocate_to.clone()
    }
}

/// Ids of [`sample_analysis`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleAnalysis {
    pub sample: ItemId,
    pub reader: ItemId,
    pub channel: ItemId,
    pub threshold: ItemId,
    pub first: ItemId,
    pub second: ItemId,
}

/// Sample, reader, channel, threshold and two categorized segmentations
///
/// ```text
/// sample -Stain-> channel <-Volume- reader -"0-0"-> threshold -CreateLink-> first, second
/// ```
pub fn sample_analysis(model: &mut AnalysisModel, factory: &MockFactory) -> SampleAnalysis {
    model.create_category("Synapse/Asymmetric").unwrap();
    model.create_category("Mitochondria").unwrap();

    let sample = model
        .add(NewItem::sample(
            "stack",
            Sample::new(Arguments::parse("Spacing=[1,1,1];").unwrap()),
        ))
        .unwrap();
    let reader = model
        .add(NewItem::filter(FilterItem::new(
            factory.filter("Reader", "Path=stack.tif;"),
            Vec::new(),
        )))
        .unwrap();
    let channel = model
        .add(NewItem::channel(
            "stack.tif",
            Channel::new(OutputRef::new(reader, 0), Arguments::parse("Hue=0.3;").unwrap()),
        ))
        .unwrap();
    model.add_relation(sample, channel, labels::STAIN).unwrap();

    let threshold = model
        .add(NewItem::filter(FilterItem::new(
            factory.filter("Threshold", "Level=30;Outputs=[0,1];"),
            vec![OutputRef::new(reader, 0)],
        )))
        .unwrap();

    let first = model
        .add(NewItem::segmentation(
            "",
            Segmentation::new(OutputRef::new(threshold, 0)).with_category(Some("Synapse/Asymmetric".into())),
        ))
        .unwrap();
    let second = model
        .add(NewItem::segmentation(
            "",
            Segmentation::new(OutputRef::new(threshold, 1)).with_category(Some("Mitochondria".into())),
        ))
        .unwrap();
    model.add_relation(sample, first, labels::WHERE).unwrap();

    SampleAnalysis {
        sample,
        reader,
        channel,
        threshold,
        first,
        second,
    }
}

pub const SAMPLE_SETTINGS: &str = "4\nTraceable=1\n";

pub const SAMPLE_TAXONOMY: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<Taxonomy>
  <node name="Synapse" color="#ff0000" Dim_X="30" Dim_Y="30" Dim_Z="30"/>
</Taxonomy>
"##;

/// Write a zip archive holding exactly `members`
pub fn write_archive(path: &Path, members: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default();
    for (name, data) in members {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// Archive with standard settings and taxonomy around `trace`
pub fn write_trace_archive(path: &Path, trace: &str) {
    write_archive(
        path,
        &[
            ("settings.ini", SAMPLE_SETTINGS.as_bytes()),
            ("taxonomy.xml", SAMPLE_TAXONOMY.as_bytes()),
            ("trace.dot", trace.as_bytes()),
        ],
    );
}
