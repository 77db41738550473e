//! End-to-end split tests
//!
//! Each test writes a small model to a temp directory, runs a full split and
//! inspects the partition files that come out.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package ifcsplit-core --test split_scenarios
//! ```

mod common;

use std::collections::BTreeSet;
use std::fs;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use common::{assert_contains_all, ids_in, ModelBuilder};
use ifcsplit_core::report::{SUMMARY_JSON_FILE, SUMMARY_TEXT_FILE};
use ifcsplit_core::{
    clean, parse_str, CleanupCategory, CleanupOptions, SplitError, SplitMethod, SplitRequest,
    Splitter,
};

// ============================================================================
// Storeys
// ============================================================================

#[test]
fn test_latin1_text_survives_split() {
    let dir = TempDir::new().unwrap();
    let mut model = ModelBuilder::default();
    let project = model.project("Tower");
    let storey = model.storey("Etage");
    let wall = model.element("IFCWALL", "Mur MARKER");
    model.aggregate(project, &[storey]);
    model.contain(storey, &[wall]);

    // Raw ISO-8859-1 byte in a string literal; the file is not valid UTF-8
    let text = model.build();
    let (head, tail) = text.split_once("MARKER").unwrap();
    let bytes = [head.as_bytes(), &[0xE9u8][..], tail.as_bytes()].concat();
    let input = dir.path().join("latin1.ifc");
    fs::write(&input, &bytes).unwrap();

    let out = dir.path().join("out");
    let outcome = Splitter::default()
        .run(&SplitRequest::new(&input, &out, SplitMethod::Storeys))
        .unwrap();
    assert_eq!(outcome.files.len(), 1);

    let written = fs::read(out.join("Etage.ifc")).unwrap();
    let needle: &[u8] = b"'Mur \xe9'";
    assert!(written.windows(needle.len()).any(|w| w == needle));
    assert!(!written.windows(3).any(|w| w == [0xEF, 0xBF, 0xBD]));
}

#[test]
fn test_storey_split_isolates_storeys() {
    let dir = TempDir::new().unwrap();
    let mut model = ModelBuilder::default();
    let project = model.project("Tower");
    let building = model.building("Main");
    let s1 = model.storey("S1");
    let s2 = model.storey("S2");
    let w1 = model.element("IFCWALL", "W1");
    let d1 = model.element("IFCDOOR", "D1");
    let e1 = model.element("IFCBEAM", "E1");
    model.aggregate(project, &[building]);
    model.aggregate(building, &[s1, s2]);
    model.contain(s1, &[w1, d1]);
    model.contain(s2, &[e1]);
    let input = model.write(dir.path(), "tower.ifc");

    let out = dir.path().join("out");
    let outcome = Splitter::default()
        .run(&SplitRequest::new(&input, &out, SplitMethod::Storeys))
        .unwrap();

    assert_eq!(outcome.files.len(), 2);
    assert_eq!(outcome.files[0].name, "S1.ifc");
    assert_eq!(outcome.files[1].name, "S2.ifc");
    assert_eq!(outcome.files[0].element_count, 2);
    assert_eq!(outcome.files[1].element_count, 1);

    let first = ids_in(&out.join("S1.ifc"));
    assert_eq!(first, BTreeSet::from([project, building, s1, w1, d1]));
    let second = ids_in(&out.join("S2.ifc"));
    assert_eq!(second, BTreeSet::from([project, building, s2, e1]));
}

#[test]
fn test_empty_storey_is_skipped() {
    let dir = TempDir::new().unwrap();
    let mut model = ModelBuilder::default();
    model.project("P");
    let s1 = model.storey("Ground");
    model.storey("Roof");
    let wall = model.element("IFCWALL", "W");
    model.contain(s1, &[wall]);
    let input = model.write(dir.path(), "m.ifc");

    let out = dir.path().join("out");
    let outcome = Splitter::default()
        .run(&SplitRequest::new(&input, &out, SplitMethod::Storeys))
        .unwrap();

    assert_eq!(outcome.files.len(), 1);
    assert_eq!(outcome.skipped, vec!["Roof".to_string()]);
    assert!(!out.join("Roof.ifc").exists());
}

#[test]
fn test_storey_partition_carries_type_closure() {
    let dir = TempDir::new().unwrap();
    let mut model = ModelBuilder::default();
    model.project("P");
    let storey = model.storey("L1");
    let wall = model.element("IFCWALL", "W");
    let wall_type = model.element_type("IFCWALLTYPE", "Basic");
    let rel = model.define_type(&[wall], wall_type);
    model.contain(storey, &[wall]);
    let input = model.write(dir.path(), "m.ifc");

    let out = dir.path().join("out");
    Splitter::default()
        .run(&SplitRequest::new(&input, &out, SplitMethod::Storeys))
        .unwrap();

    assert_contains_all(&out.join("L1.ifc"), &[wall, rel, wall_type]);
}

#[test]
fn test_failed_roots_are_counted_not_fatal() {
    let dir = TempDir::new().unwrap();
    let mut model = ModelBuilder::default();
    model.project("P");
    let storey = model.storey("L1");
    let good = model.element("IFCWALL", "Good");
    // Placement points at an instance that does not exist
    let broken = model.element_placed("IFCWALL", "Broken", 9_999);
    model.contain(storey, &[good, broken]);
    let input = model.write(dir.path(), "m.ifc");

    let out = dir.path().join("out");
    let outcome = Splitter::default()
        .run(&SplitRequest::new(&input, &out, SplitMethod::Storeys))
        .unwrap();

    let file = &outcome.files[0];
    assert_eq!(file.element_count, 1);
    assert_eq!(file.failed_roots, 1);
    let ids = ids_in(&file.path);
    assert!(ids.contains(&good));
    assert!(!ids.contains(&broken));
}

// ============================================================================
// Disciplines
// ============================================================================

#[test]
fn test_discipline_split_one_file_per_discipline() {
    let dir = TempDir::new().unwrap();
    let mut model = ModelBuilder::default();
    let project = model.project("P");
    let wall = model.element("IFCWALL", "W");
    let beam = model.element("IFCBEAM", "B");
    let pipe = model.element("IFCPIPESEGMENT", "Pipe");
    let input = model.write(dir.path(), "m.ifc");

    let out = dir.path().join("out");
    let outcome = Splitter::default()
        .run(&SplitRequest::new(&input, &out, SplitMethod::Disciplines))
        .unwrap();

    let names: Vec<&str> = outcome.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["Architecture.ifc", "Structure.ifc", "MEP.ifc"]);
    assert_eq!(outcome.skipped, vec!["Equipment".to_string()]);

    for (file, element) in outcome.files.iter().zip([wall, beam, pipe]) {
        let ids = ids_in(&file.path);
        assert_eq!(ids, BTreeSet::from([project, element]), "{}", file.name);
        assert_eq!(file.element_count, 1);
    }
}

// ============================================================================
// Chunks
// ============================================================================

#[test]
fn test_chunk_split_sizes() {
    let dir = TempDir::new().unwrap();
    let mut model = ModelBuilder::default();
    let project = model.project("P");
    let walls: Vec<u64> = (0..250)
        .map(|i| model.element("IFCWALL", &format!("W{}", i)))
        .collect();
    let input = model.write(dir.path(), "m.ifc");

    let out = dir.path().join("out");
    let request = SplitRequest::new(&input, &out, SplitMethod::Chunks).with_max_elements(100);
    let outcome = Splitter::default().run(&request).unwrap();

    let summary: Vec<(&str, usize)> = outcome
        .files
        .iter()
        .map(|f| (f.name.as_str(), f.element_count))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("chunk_001.ifc", 100),
            ("chunk_002.ifc", 100),
            ("chunk_003.ifc", 50)
        ]
    );
    assert_eq!(outcome.report.total_elements, 250);

    // Disjoint, and together they cover every wall
    let mut seen = BTreeSet::new();
    for file in &outcome.files {
        let ids = ids_in(&file.path);
        assert!(ids.contains(&project));
        for id in ids.into_iter().filter(|id| *id != project) {
            assert!(seen.insert(id), "#{} written twice", id);
        }
    }
    assert_eq!(seen, walls.into_iter().collect::<BTreeSet<_>>());
}

#[test]
fn test_invalid_chunk_size_is_fatal() {
    let dir = TempDir::new().unwrap();
    let request = SplitRequest::new(dir.path().join("none.ifc"), dir.path(), SplitMethod::Chunks)
        .with_max_elements(0);
    let err = Splitter::default().run(&request).unwrap_err();
    assert!(matches!(err, SplitError::InvalidChunkSize(0)));
}

// ============================================================================
// Cleanup
// ============================================================================

#[test]
fn test_cleanup_skips_referenced_annotations() {
    let mut model = ModelBuilder::default();
    model.project("P");
    let notes: Vec<u64> = (0..5)
        .map(|i| model.element("IFCANNOTATION", &format!("N{}", i)))
        .collect();
    // A retained entity still points at two of them
    model.raw(
        "IFCPRESENTATIONLAYERASSIGNMENT",
        &format!("'Notes',$,(#{},#{}),$", notes[0], notes[1]),
    );

    let mut graph = parse_str(&model.build()).unwrap();
    let options = CleanupOptions {
        remove_annotations: true,
        remove_grids: false,
        remove_projections: false,
    };
    let report = clean(&mut graph, &options);

    assert_eq!(report.removed, 3);
    assert_eq!(report.failed, 2);
    let annotations = report.category(CleanupCategory::Annotations).unwrap();
    assert_eq!((annotations.found, annotations.removed), (5, 3));
    assert!(graph.contains(ifcsplit_core::EntityId(notes[0])));
    assert!(!graph.contains(ifcsplit_core::EntityId(notes[4])));
}

#[test]
fn test_cleanup_runs_before_partitioning() {
    let dir = TempDir::new().unwrap();
    let mut model = ModelBuilder::default();
    model.project("P");
    let storey = model.storey("L1");
    let wall = model.element("IFCWALL", "W");
    let note = model.element("IFCANNOTATION", "Note");
    model.contain(storey, &[wall, note]);
    let input = model.write(dir.path(), "m.ifc");

    let out = dir.path().join("out");
    let request = SplitRequest::new(&input, &out, SplitMethod::Storeys).with_clean(true);
    let outcome = Splitter::default().run(&request).unwrap();

    assert_eq!(outcome.cleanup.as_ref().map(|c| c.removed), Some(1));
    assert_eq!(outcome.files[0].element_count, 1);
    assert!(!ids_in(&outcome.files[0].path).contains(&note));
}

// ============================================================================
// Preconditions and reports
// ============================================================================

#[test]
fn test_missing_project_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let mut model = ModelBuilder::default();
    let storey = model.storey("L1");
    let wall = model.element("IFCWALL", "W");
    model.contain(storey, &[wall]);
    let input = model.write(dir.path(), "m.ifc");

    let out = dir.path().join("out");
    for method in [SplitMethod::Storeys, SplitMethod::Disciplines, SplitMethod::Chunks] {
        let err = Splitter::default()
            .run(&SplitRequest::new(&input, &out, method))
            .unwrap_err();
        assert!(matches!(err, SplitError::MissingProject), "{}", method);
    }
    let written: Vec<_> = fs::read_dir(&out)
        .map(|entries| entries.flatten().collect())
        .unwrap_or_default();
    assert!(written.is_empty());
}

#[test]
fn test_context_in_every_partition() {
    let dir = TempDir::new().unwrap();
    let mut model = ModelBuilder::default();
    let project = model.project("P");
    let site = model.site("Site");
    let building = model.building("B");
    let storeys: Vec<u64> = (1..=3).map(|i| model.storey(&format!("L{}", i))).collect();
    for storey in &storeys {
        let wall = model.element("IFCWALL", "W");
        let beam = model.element("IFCBEAM", "B");
        model.contain(*storey, &[wall, beam]);
    }
    let input = model.write(dir.path(), "m.ifc");

    for method in [SplitMethod::Storeys, SplitMethod::Disciplines, SplitMethod::Chunks] {
        let out = dir.path().join(method.as_str());
        let request = SplitRequest::new(&input, &out, method).with_max_elements(2);
        let outcome = Splitter::default().run(&request).unwrap();
        assert!(!outcome.files.is_empty());
        for file in &outcome.files {
            assert_contains_all(&file.path, &[project, site, building]);
        }
    }
}

#[test]
fn test_reports_written_next_to_partitions() {
    let dir = TempDir::new().unwrap();
    let mut model = ModelBuilder::default();
    model.project("P");
    let storey = model.storey("L1");
    let wall = model.element("IFCWALL", "W");
    model.contain(storey, &[wall]);
    let input = model.write(dir.path(), "m.ifc");

    let out = dir.path().join("out");
    let outcome = Splitter::default()
        .run(&SplitRequest::new(&input, &out, SplitMethod::Storeys))
        .unwrap();

    assert_eq!(outcome.report_path, out.join(SUMMARY_TEXT_FILE));
    let text = fs::read_to_string(out.join(SUMMARY_TEXT_FILE)).unwrap();
    assert!(text.contains("Splitting method: storeys"));
    assert!(text.contains("L1.ifc"));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join(SUMMARY_JSON_FILE)).unwrap()).unwrap();
    assert_eq!(json["method"], "storeys");
    assert_eq!(json["files"][0]["sha256"].as_str().map(str::len), Some(64));
}
