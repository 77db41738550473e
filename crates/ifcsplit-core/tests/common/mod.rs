//! Common test utilities for integration tests.
//!
//! Provides a small STEP model builder and helpers to inspect written
//! partition files.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use ifcsplit_core::read_model;

/// Builds STEP text with sequential instance ids
pub struct ModelBuilder {
    schema: String,
    lines: Vec<String>,
    next_id: u64,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new("IFC4")
    }
}

impl ModelBuilder {
    pub fn new(schema: &str) -> Self {
        Self {
            schema: schema.to_string(),
            lines: Vec::new(),
            next_id: 1,
        }
    }

    /// Add an instance with raw arguments; returns its id
    pub fn raw(&mut self, tag: &str, args: &str) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.lines.push(format!("#{}={}({});", id, tag, args));
        id
    }

    /// Add a rooted entity: GlobalId, OwnerHistory, Name then `tail`
    fn rooted(&mut self, tag: &str, name: &str, tail: &str) -> u64 {
        let guid = format!("'g{}'", self.next_id);
        self.raw(tag, &format!("{},$,'{}',{}", guid, name, tail))
    }

    pub fn project(&mut self, name: &str) -> u64 {
        self.rooted("IFCPROJECT", name, "$,$,$,$,$,$")
    }

    pub fn site(&mut self, name: &str) -> u64 {
        self.rooted("IFCSITE", name, "$,$,$,$,$,.ELEMENT.,$,$,$,$,$")
    }

    pub fn building(&mut self, name: &str) -> u64 {
        self.rooted("IFCBUILDING", name, "$,$,$,$,$,.ELEMENT.,$,$,$")
    }

    pub fn storey(&mut self, name: &str) -> u64 {
        self.rooted("IFCBUILDINGSTOREY", name, "$,$,$,$,$,.ELEMENT.,0.")
    }

    /// Add a product with no placement or shape
    pub fn element(&mut self, tag: &str, name: &str) -> u64 {
        self.rooted(tag, name, "$,$,$,$,$,$")
    }

    /// Add a product whose placement slot points at `placement`
    pub fn element_placed(&mut self, tag: &str, name: &str, placement: u64) -> u64 {
        self.rooted(tag, name, &format!("$,$,#{},$,$,$", placement))
    }

    pub fn element_type(&mut self, tag: &str, name: &str) -> u64 {
        self.rooted(tag, name, "$,$,$,$,$,$,.NOTDEFINED.")
    }

    pub fn contain(&mut self, structure: u64, elements: &[u64]) -> u64 {
        let args = format!("'g{}',$,$,$,{},#{}", self.next_id, id_list(elements), structure);
        self.raw("IFCRELCONTAINEDINSPATIALSTRUCTURE", &args)
    }

    pub fn aggregate(&mut self, parent: u64, children: &[u64]) -> u64 {
        let args = format!("'g{}',$,$,$,#{},{}", self.next_id, parent, id_list(children));
        self.raw("IFCRELAGGREGATES", &args)
    }

    pub fn define_type(&mut self, instances: &[u64], type_id: u64) -> u64 {
        let args = format!("'g{}',$,$,$,{},#{}", self.next_id, id_list(instances), type_id);
        self.raw("IFCRELDEFINESBYTYPE", &args)
    }

    /// STEP document text
    pub fn build(&self) -> String {
        let mut out = String::from("ISO-10303-21;\nHEADER;\n");
        out.push_str("FILE_DESCRIPTION(('ViewDefinition [CoordinationView]'),'2;1');\n");
        out.push_str("FILE_NAME('model.ifc','2024-01-01T00:00:00',(''),(''),'','','');\n");
        out.push_str(&format!("FILE_SCHEMA(('{}'));\nENDSEC;\nDATA;\n", self.schema));
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("ENDSEC;\nEND-ISO-10303-21;\n");
        out
    }

    /// Write the document into `dir`
    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, self.build()).expect("Failed to write model");
        path
    }
}

fn id_list(ids: &[u64]) -> String {
    let items: Vec<String> = ids.iter().map(|id| format!("#{}", id)).collect();
    format!("({})", items.join(","))
}

/// Instance ids in a written STEP file
pub fn ids_in(path: &Path) -> BTreeSet<u64> {
    let graph = read_model(path).expect("Failed to read partition");
    graph.iter().map(|e| e.id.0).collect()
}

/// Assert every id in `expected` is present in the file
pub fn assert_contains_all(path: &Path, expected: &[u64]) {
    let ids = ids_in(path);
    for id in expected {
        assert!(
            ids.contains(id),
            "{} is missing #{} (has {:?})",
            path.display(),
            id,
            ids
        );
    }
}
