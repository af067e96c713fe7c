use pretty_assertions::assert_eq;
use seg_core::labels;
use seg_core::{ItemId, ItemKind, OutputRef};
use seg_graph::Relation;
use seg_io::{IoConfig, IoError, LoadStatus, ReconstructionError, SegFile, Trace, TRACE_FILE};
use seg_model::{AnalysisModel, FilterError, ModelConfig, NewItem, Sample};
use seg_test_utils::{
    sample_analysis, write_archive, write_trace_archive, MockFactory, NotesExtension, RecordingHandler,
    RecordingObserver, SampleAnalysis, SAMPLE_SETTINGS, SAMPLE_TAXONOMY,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const MERGE_TRACE: &str = r#"digraph G {
0 [label="stack", shape="trapezium", args="Spacing=[1,1,1];"];
1 [label="Seeds", shape="invtriangle", args="Outputs=[0,1];"];
2 [label="Watershed", shape="invtriangle", args="Inputs=1_0,1_1;Outputs=[0];"];
3 [label="Segmentation 1", shape="ellipse", args="Number=1;Output=0;"];
1 -> 2 [label="0-0"];
1 -> 2 [label="1-1"];
2 -> 3 [label="CreateLink"];
0 -> 3 [label="where"];
}
"#;

const READER_TRACE: &str = r#"digraph G {
0 [label="stack", shape="trapezium", args="Spacing=[1,1,1];"];
1 [label="Reader", shape="invtriangle", args="Path=stack.tif;"];
2 [label="stack.tif", shape="box", args="Hue=0.3;Volume=1_0;"];
0 -> 2 [label="Stain"];
1 -> 2 [label="Volume"];
}
"#;

type ItemSummary = (ItemId, ItemKind, String, String);

fn summary(model: &AnalysisModel) -> Vec<ItemSummary> {
    model
        .items()
        .map(|item| {
            (
                item.id(),
                item.kind(),
                item.name().to_string(),
                item.arguments().unwrap().to_string(),
            )
        })
        .collect()
}

fn saved_analysis(dir: &TempDir) -> (PathBuf, AnalysisModel, SampleAnalysis) {
    let factory = MockFactory::new();
    let mut model = AnalysisModel::new();
    let ids = sample_analysis(&mut model, &factory);
    let path = dir.path().join("analysis.seg");
    SegFile::default().save(&path, &mut model).unwrap();
    (path, model, ids)
}

#[test]
fn save_then_load_restores_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let factory = MockFactory::new();
    let mut original = AnalysisModel::new();
    sample_analysis(&mut original, &factory);
    let path = dir.path().join("analysis.seg");

    let saved = SegFile::default().save(&path, &mut original).unwrap();
    assert_eq!(&saved.members[..3], &["settings.ini", "taxonomy.xml", "trace.dot"]);
    assert_eq!(saved.snapshots, 3);
    assert!(!original.is_changed());

    let mut loaded = AnalysisModel::new();
    let report = SegFile::default().load(&path, &mut loaded, &factory).unwrap();

    assert_eq!(summary(&loaded), summary(&original));
    assert_eq!(loaded.relations(), original.relations());
    assert!(loaded.taxonomy().contains("Synapse/Asymmetric"));
    assert!(loaded.taxonomy().contains("Mitochondria"));
    assert_eq!(loaded.last_segmentation_number(), 2);
    assert!(loaded.is_traceable());
    assert!(!loaded.is_changed());
    assert_eq!(report.reconstruction.created.len(), 6);
    assert_eq!(report.loose_files.len(), 6);
    assert!(report.repaired_categories.is_empty());

    let resaved = dir.path().join("resaved.seg");
    SegFile::default().save(&resaved, &mut loaded).unwrap();
    assert_eq!(
        SegFile::default().read(&resaved).unwrap().trace,
        SegFile::default().read(&path).unwrap().trace
    );
}

#[test]
fn two_outputs_of_one_filter_survive_a_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("merge.seg");
    write_trace_archive(&path, MERGE_TRACE);

    let mut model = AnalysisModel::new();
    SegFile::default()
        .load(&path, &mut model, &MockFactory::new())
        .unwrap();

    let seeds = ItemId::new(1);
    let watershed = model.filter_item(ItemId::new(2)).unwrap();
    assert_eq!(
        watershed.inputs(),
        &[OutputRef::new(seeds, 0), OutputRef::new(seeds, 1)]
    );
    assert_eq!(
        model.graph().ancestors(ItemId::new(2), None),
        vec![seeds]
    );

    let copy = dir.path().join("copy.seg");
    SegFile::default().save(&copy, &mut model).unwrap();
    assert_eq!(SegFile::default().read(&copy).unwrap().trace.as_deref(), Some(MERGE_TRACE));
}

#[test]
fn relations_reload_in_file_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("merge.seg");
    write_trace_archive(&path, MERGE_TRACE);

    let mut model = AnalysisModel::new();
    SegFile::default()
        .load(&path, &mut model, &MockFactory::new())
        .unwrap();

    let id = ItemId::new;
    assert_eq!(
        model.relations(),
        vec![
            Relation::new(id(1), id(2), labels::input_slot(0, 0)),
            Relation::new(id(1), id(2), labels::input_slot(1, 1)),
            Relation::new(id(2), id(3), labels::CREATE_LINK),
            Relation::new(id(0), id(3), labels::WHERE),
        ]
    );
    assert_eq!(
        model.find(id(3)).unwrap().arguments().unwrap().to_string(),
        "Number=1;Output=0;"
    );
}

#[test]
fn archived_trace_matches_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let (path, model, _) = saved_analysis(&dir);

    let contents = SegFile::default().read(&path).unwrap();
    assert_eq!(contents.trace.as_deref(), Some(Trace::from_model(&model).unwrap().render().as_str()));
    let settings = contents.settings.unwrap();
    assert_eq!(settings.version, 4);
    assert!(settings.traceable);
    assert!(settings.generator.unwrap().starts_with("seg-io"));
    assert!(contents.members.contains(&TRACE_FILE.to_string()));
}

#[test]
fn loading_the_same_archive_twice_adds_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _, _) = saved_analysis(&dir);
    let factory = MockFactory::new();
    let mut model = AnalysisModel::new();

    SegFile::default().load(&path, &mut model, &factory).unwrap();
    let before = (summary(&model), model.relations());
    let again = SegFile::default().load(&path, &mut model, &factory).unwrap();

    assert!(again.reconstruction.created.is_empty());
    assert_eq!(again.reconstruction.reused.len(), 6);
    assert_eq!(again.reconstruction.relations_added, 0);
    assert_eq!((summary(&model), model.relations()), before);
}

#[test]
fn fresh_registries_load_identically() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _, _) = saved_analysis(&dir);
    let factory = MockFactory::new();

    let mut first = AnalysisModel::new();
    let mut second = AnalysisModel::new();
    SegFile::default().load(&path, &mut first, &factory).unwrap();
    SegFile::default().load(&path, &mut second, &factory).unwrap();

    assert_eq!(summary(&first), summary(&second));
    assert_eq!(first.relations(), second.relations());
    for segmentation in first.items_of(ItemKind::Segmentation) {
        let creators = first.graph().ancestors(segmentation.id(), Some(labels::CREATE_LINK));
        assert_eq!(creators.len(), 1);
    }
    for channel in first.items_of(ItemKind::Channel) {
        let producers = first.graph().ancestors(channel.id(), Some(labels::VOLUME));
        assert_eq!(producers.len(), 1);
    }
}

#[test]
fn load_is_one_structural_bracket() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _, _) = saved_analysis(&dir);
    let mut model = AnalysisModel::new();
    let observer = RecordingObserver::new();
    model.subscribe(observer.clone());

    SegFile::default()
        .load(&path, &mut model, &MockFactory::new())
        .unwrap();

    assert_eq!(observer.begin_count(), 1);
    assert_eq!(observer.end_count(), 1);
}

#[test]
fn loading_into_a_populated_model_remaps_taken_ids() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _, ids) = saved_analysis(&dir);
    let mut model = AnalysisModel::with_config(ModelConfig::new().with_traceable(false));
    let existing = model
        .add(NewItem::sample("other", Sample::new(seg_core::Arguments::new())))
        .unwrap();
    assert_eq!(existing, ItemId::new(0));

    let report = SegFile::default()
        .load(&path, &mut model, &MockFactory::new())
        .unwrap();

    assert_eq!(model.len(), 7);
    assert!(!model.is_traceable());
    let reader = report.reconstruction.live_id(ids.reader).unwrap();
    let threshold = report.reconstruction.live_id(ids.threshold).unwrap();
    assert_ne!(reader, ids.reader);

    assert_eq!(
        model.filter_item(threshold).unwrap().inputs(),
        &[OutputRef::new(reader, 0)]
    );
    let relations = model.relations();
    assert!(relations.contains(&Relation::new(reader, threshold, labels::input_slot(0, 0))));
    assert_eq!(
        model.graph().ancestors(threshold, Some(&labels::input_slot(0, 0))),
        vec![reader]
    );
}

#[test]
fn orphan_channel_with_unavailable_output_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orphan.seg");
    write_trace_archive(&path, &READER_TRACE.replace("Path=stack.tif;", "Path=stack.tif;Fail=[0];"));

    let mut model = AnalysisModel::new();
    let report = SegFile::default()
        .load(&path, &mut model, &MockFactory::new())
        .unwrap();

    assert_eq!(report.reconstruction.pruned, vec![ItemId::new(2)]);
    assert_eq!(model.len(), 2);
    assert_eq!(model.items_of(ItemKind::Channel).count(), 0);
    assert!(model.relations().is_empty());
}

#[test]
fn unavailable_channel_with_dependents_fails_the_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.seg");
    let trace = r#"digraph G {
0 [label="stack", shape="trapezium", args="Spacing=[1,1,1];"];
1 [label="Reader", shape="invtriangle", args="Fail=[0];"];
2 [label="stack.tif", shape="box", args="Volume=1_0;"];
3 [label="Seeds", shape="invtriangle", args=""];
4 [label="Segmentation 1", shape="ellipse", args="Output=0;Number=1;"];
1 -> 2 [label="Volume"];
0 -> 2 [label="Stain"];
3 -> 4 [label="CreateLink"];
2 -> 4 [label="where"];
}
"#;
    write_trace_archive(&path, trace);

    let mut model = AnalysisModel::new();
    let result = SegFile::default().load(&path, &mut model, &MockFactory::new());

    assert_eq!(LoadStatus::of(&result), LoadStatus::Error);
    assert!(matches!(
        result,
        Err(IoError::Reconstruction(ReconstructionError::Output { id, .. })) if id == ItemId::new(2)
    ));
    assert!(model.is_empty());
    assert!(model.relations().is_empty());
    assert!(model.taxonomy().is_empty());
}

#[test]
fn panicking_filter_fails_the_load_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("panic.seg");
    let trace = r#"digraph G {
1 [label="Reader", shape="invtriangle", args="Panic=[0];"];
2 [label="Segmentation 1", shape="ellipse", args="Output=0;Number=1;"];
1 -> 2 [label="CreateLink"];
}
"#;
    write_trace_archive(&path, trace);

    let mut model = AnalysisModel::new();
    let result = SegFile::default().load(&path, &mut model, &MockFactory::new());

    assert!(matches!(
        result,
        Err(IoError::Reconstruction(ReconstructionError::Output {
            source: FilterError::Panicked(_),
            ..
        }))
    ));
    assert!(model.is_empty());
}

#[test]
fn version_below_floor_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("old.seg");
    write_archive(
        &path,
        &[
            ("settings.ini", "0\nTraceable=1\n".as_bytes()),
            ("taxonomy.xml", SAMPLE_TAXONOMY.as_bytes()),
            ("trace.dot", READER_TRACE.as_bytes()),
        ],
    );
    let mut model = AnalysisModel::new();
    let observer = RecordingObserver::new();
    model.subscribe(observer.clone());
    let handler = RecordingHandler::new();

    let result = SegFile::default()
        .with_handler(handler.clone())
        .load(&path, &mut model, &MockFactory::new());

    assert_eq!(LoadStatus::of(&result), LoadStatus::InvalidVersion);
    assert_eq!(LoadStatus::of(&result).to_string(), "INVALID_VERSION");
    assert!(observer.events().is_empty());
    assert!(model.is_empty());
    assert!(model.taxonomy().is_empty());
    assert!(!model.is_changed());
    assert_eq!(handler.errors().len(), 1);
}

#[test]
fn legacy_version_member_loads_without_trace_mode() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.seg");
    write_archive(
        &path,
        &[
            ("version", "2\n".as_bytes()),
            ("taxonomy.xml", SAMPLE_TAXONOMY.as_bytes()),
            ("trace.dot", READER_TRACE.as_bytes()),
        ],
    );

    let mut model = AnalysisModel::new();
    let report = SegFile::default()
        .load(&path, &mut model, &MockFactory::new())
        .unwrap();

    assert_eq!(report.settings.map(|s| s.version), Some(2));
    assert!(!model.is_traceable());
    assert_eq!(model.len(), 3);

    write_archive(
        &path,
        &[
            ("version", "0".as_bytes()),
            ("taxonomy.xml", SAMPLE_TAXONOMY.as_bytes()),
            ("trace.dot", READER_TRACE.as_bytes()),
        ],
    );
    let result = SegFile::default().load(&path, &mut AnalysisModel::new(), &MockFactory::new());
    assert_eq!(LoadStatus::of(&result), LoadStatus::InvalidVersion);
}

#[test]
fn missing_trace_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("incomplete.seg");
    write_archive(
        &path,
        &[
            ("settings.ini", SAMPLE_SETTINGS.as_bytes()),
            ("taxonomy.xml", SAMPLE_TAXONOMY.as_bytes()),
        ],
    );

    let mut model = AnalysisModel::new();
    let result = SegFile::default().load(&path, &mut model, &MockFactory::new());
    assert!(matches!(result, Err(IoError::MissingMember(TRACE_FILE))));
    assert_eq!(LoadStatus::of(&result), LoadStatus::Error);
    assert!(model.is_empty());
}

#[test]
fn categories_missing_properties_are_repaired() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bare.seg");
    let taxonomy = r##"<?xml version="1.0" encoding="UTF-8"?>
<Taxonomy>
  <node name="Synapse" color="#00ff00"/>
</Taxonomy>
"##;
    write_archive(
        &path,
        &[
            ("settings.ini", SAMPLE_SETTINGS.as_bytes()),
            ("taxonomy.xml", taxonomy.as_bytes()),
            ("trace.dot", READER_TRACE.as_bytes()),
        ],
    );
    let handler = RecordingHandler::new();

    let mut model = AnalysisModel::new();
    let report = SegFile::default()
        .with_handler(handler.clone())
        .load(&path, &mut model, &MockFactory::new())
        .unwrap();

    assert_eq!(report.repaired_categories, vec!["Synapse".to_string()]);
    let synapse = model.taxonomy().element("Synapse").unwrap();
    assert_eq!(synapse.color(), "#00ff00");
    assert_eq!(synapse.property("Dim_Y"), Some("30"));
    let reported = handler.warnings().iter().filter(|w| w.contains("Synapse")).count();
    assert_eq!(reported, 1);
}

#[test]
fn unknown_members_are_copied_to_scratch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("extra.seg");
    write_archive(
        &path,
        &[
            ("settings.ini", SAMPLE_SETTINGS.as_bytes()),
            ("taxonomy.xml", SAMPLE_TAXONOMY.as_bytes()),
            ("trace.dot", READER_TRACE.as_bytes()),
            ("notes/readme.txt", "hello".as_bytes()),
            ("../escape.txt", "nope".as_bytes()),
        ],
    );
    let scratch_root = tempfile::tempdir().unwrap();
    let handler = RecordingHandler::new();

    let mut model = AnalysisModel::new();
    let report = SegFile::new(IoConfig::new().with_scratch_root(scratch_root.path()))
        .with_handler(handler.clone())
        .load(&path, &mut model, &MockFactory::new())
        .unwrap();

    assert!(report.scratch.path().starts_with(scratch_root.path()));
    assert_eq!(
        std::fs::read(report.scratch.path().join("notes/readme.txt")).unwrap(),
        b"hello"
    );
    assert!(!scratch_root.path().join("escape.txt").exists());
    let warnings = handler.warnings();
    assert!(warnings.iter().any(|w| w.contains("notes/readme.txt")));
    assert!(warnings.iter().any(|w| w.contains("../escape.txt")));
}

#[test]
fn missing_archive_can_be_relocated() {
    let dir = tempfile::tempdir().unwrap();
    let (path, original, _) = saved_analysis(&dir);
    let missing = dir.path().join("moved.seg");

    let mut model = AnalysisModel::new();
    let result = SegFile::default().load(&missing, &mut model, &MockFactory::new());
    assert_eq!(LoadStatus::of(&result), LoadStatus::FileNotFound);
    assert!(result.unwrap_err().is_relocatable());
    assert!(model.is_empty());

    let handler = RecordingHandler::relocating_to(&path);
    SegFile::default()
        .with_handler(handler.clone())
        .load(&missing, &mut model, &MockFactory::new())
        .unwrap();
    assert_eq!(handler.asked(), vec![missing]);
    assert_eq!(summary(&model), summary(&original));
}

#[test]
fn unknown_filter_types_serve_archived_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _, ids) = saved_analysis(&dir);
    let readers_only = MockFactory::with_types(&["Reader"]);

    let mut model = AnalysisModel::new();
    let report = SegFile::default().load(&path, &mut model, &readers_only).unwrap();

    let threshold = model.filter_item(ids.threshold).unwrap();
    assert_eq!(threshold.filter().type_name(), "Threshold");
    assert_eq!(threshold.filter().outputs(), vec![0, 1]);
    assert_eq!(model.items_of(ItemKind::Segmentation).count(), 2);

    // Re-saving copies the archived snapshots through.
    let copy = dir.path().join("copy.seg");
    SegFile::default().save(&copy, &mut model).unwrap();
    let contents = SegFile::default().read(&copy).unwrap();
    let payload = contents
        .others
        .iter()
        .find(|(name, _)| name == "3_1.raw")
        .map(|(_, data)| data.clone());
    assert_eq!(payload, Some(b"Threshold:1".to_vec()));
    drop(report);
}

#[test]
fn unknown_filter_types_fail_without_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _, ids) = saved_analysis(&dir);

    let mut model = AnalysisModel::new();
    let result = SegFile::new(IoConfig::new().with_read_only_fallback(false)).load(
        &path,
        &mut model,
        &MockFactory::with_types(&["Reader"]),
    );

    assert!(matches!(
        result,
        Err(IoError::Reconstruction(ReconstructionError::Filter {
            id,
            source: FilterError::UnknownType(_),
        })) if id == ids.threshold
    ));
    assert!(model.is_empty());
}

#[test]
fn extension_caches_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let factory = MockFactory::new();
    let mut model = AnalysisModel::new();
    let ids = sample_analysis(&mut model, &factory);
    let notes = NotesExtension::new();
    notes.set(OutputRef::new(ids.threshold, 0), "checked by hand");
    let path = dir.path().join("notes.seg");

    let saved = SegFile::default()
        .with_extension(notes)
        .save(&path, &mut model)
        .unwrap();
    assert_eq!(saved.members.last().map(String::as_str), Some(NotesExtension::PATH));

    let restored = NotesExtension::new();
    let mut loaded = AnalysisModel::new();
    let report = SegFile::default()
        .with_extension(restored.clone())
        .load(&path, &mut loaded, &factory)
        .unwrap();

    assert_eq!(report.extension_members, vec![NotesExtension::PATH.to_string()]);
    assert!(!report.loose_files.iter().any(|name| name == NotesExtension::PATH));
    assert_eq!(
        restored.get(OutputRef::new(ids.threshold, 0)).as_deref(),
        Some("checked by hand")
    );
}

#[test]
fn failing_extension_rolls_the_load_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad-notes.seg");
    write_archive(
        &path,
        &[
            ("settings.ini", SAMPLE_SETTINGS.as_bytes()),
            ("taxonomy.xml", SAMPLE_TAXONOMY.as_bytes()),
            ("trace.dot", READER_TRACE.as_bytes()),
            (NotesExtension::PATH, "no separator here\n".as_bytes()),
        ],
    );

    let mut model = AnalysisModel::new();
    let result = SegFile::default()
        .with_extension(NotesExtension::new())
        .load(&path, &mut model, &MockFactory::new());

    assert!(matches!(result, Err(IoError::Extension { ref id, .. }) if id == "notes"));
    assert!(model.is_empty());
    assert!(model.taxonomy().is_empty());
}

#[test]
fn untraced_sessions_only_keep_edited_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let factory = MockFactory::new();
    let mut model = AnalysisModel::with_config(ModelConfig::new().with_traceable(false));
    let ids = sample_analysis(&mut model, &factory);
    model.mark_output_edited(ids.threshold, 1).unwrap();
    let path = dir.path().join("untraced.seg");

    let saved = SegFile::default().save(&path, &mut model).unwrap();
    assert_eq!(saved.snapshots, 1);
    assert!(saved.members.contains(&"3_1.mhd".to_string()));
    assert!(!saved.members.contains(&"1_0.mhd".to_string()));

    let saved = SegFile::new(IoConfig::new().with_snapshot_all_outputs(true))
        .save(&path, &mut model)
        .unwrap();
    assert_eq!(saved.snapshots, 3);

    let mut loaded = AnalysisModel::new();
    SegFile::default().load(&path, &mut loaded, &factory).unwrap();
    assert!(!loaded.is_traceable());
    assert!(loaded.filter_item(ids.threshold).unwrap().is_edited(1));
}

#[test]
fn save_needs_a_file_name() {
    let mut model = AnalysisModel::new();
    let result = SegFile::default().save(Path::new(""), &mut model);
    assert!(matches!(result, Err(IoError::EmptyFileName)));
}

#[test]
fn save_replaces_an_existing_archive() {
    let dir = tempfile::tempdir().unwrap();
    let (path, mut model, ids) = saved_analysis(&dir);

    model.rename(ids.sample, "renamed stack").unwrap();
    SegFile::default().save(&path, &mut model).unwrap();

    let mut loaded = AnalysisModel::new();
    SegFile::default()
        .load(&path, &mut loaded, &MockFactory::new())
        .unwrap();
    assert_eq!(loaded.find(ids.sample).unwrap().name(), "renamed stack");
    let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(leftovers, 1);
}
