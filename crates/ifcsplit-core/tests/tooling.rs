//! Diagnose and preprocess tests against generated models

mod common;

use tempfile::TempDir;

use common::{ids_in, ModelBuilder};
use ifcsplit_core::{
    diagnose, preprocess, Complexity, PreprocessOptions, Preprocessor, SplitMethod, SplitRequest,
    Splitter, DEFAULT_SAMPLE_BYTES,
};

fn model_with_clutter() -> (ModelBuilder, u64, u64, u64) {
    let mut model = ModelBuilder::default();
    model.project("P");
    let storey = model.storey("L1");
    let wall = model.element("IFCWALL", "W");
    let space = model.element("IFCSPACE", "Room");
    let note = model.element("IFCANNOTATION", "Note");
    model.contain(storey, &[wall, space, note]);
    (model, wall, space, note)
}

#[test]
fn test_preprocessed_model_still_splits() {
    let dir = TempDir::new().unwrap();
    let (model, wall, space, note) = model_with_clutter();
    let input = model.write(dir.path(), "m.ifc");
    let reduced = dir.path().join("m_reduced.ifc");

    let stats = preprocess(&input, &reduced, &PreprocessOptions::default()).unwrap();
    assert_eq!(stats.lines_removed, 2);
    assert!(stats.output_bytes < stats.input_bytes);

    // The containment relation now lists two missing instances
    let out = dir.path().join("out");
    let outcome = Splitter::default()
        .run(&SplitRequest::new(&reduced, &out, SplitMethod::Storeys))
        .unwrap();
    assert_eq!(outcome.files.len(), 1);
    assert_eq!(outcome.files[0].element_count, 1);

    let ids = ids_in(&outcome.files[0].path);
    assert!(ids.contains(&wall));
    assert!(!ids.contains(&space));
    assert!(!ids.contains(&note));
}

#[test]
fn test_preprocess_custom_exclusions() {
    let dir = TempDir::new().unwrap();
    let (model, wall, space, note) = model_with_clutter();
    let input = model.write(dir.path(), "m.ifc");
    let reduced = dir.path().join("walls_only_removed.ifc");

    let options = PreprocessOptions {
        exclude_tags: vec!["IfcWall".to_string()],
        ..PreprocessOptions::default()
    };
    let stats = Preprocessor::new(&options).run(&input, &reduced).unwrap();
    assert_eq!(stats.lines_removed, 1);
    assert_eq!(stats.removed_by_type.get("IFCWALL"), Some(&1));

    let ids = ids_in(&reduced);
    assert!(!ids.contains(&wall));
    assert!(ids.contains(&space));
    assert!(ids.contains(&note));
}

#[test]
fn test_diagnose_generated_model() {
    let dir = TempDir::new().unwrap();
    let (model, ..) = model_with_clutter();
    let input = model.write(dir.path(), "m.ifc");

    let diagnosis = diagnose(&input, DEFAULT_SAMPLE_BYTES).unwrap();
    assert_eq!(diagnosis.schema.as_deref(), Some("IFC4"));
    assert_eq!(diagnosis.entities.sample, 6);
    assert_eq!(diagnosis.entities.estimated, 6);
    assert_eq!(diagnosis.complexity, Complexity::Medium);
    assert!(diagnosis.recommendations.is_empty());
}
