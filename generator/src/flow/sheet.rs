// sheet.rs — Test-instance and pattern-set sheets
//
// A sheet is an ordered list of named entries. Before output, `uniq`
// collapses structurally equal entries and versions the rest: entries that
// share a base name but differ in content become `name_v1`, `name_v2`, ...
// in order of first appearance, and singletons keep their base name.
//
// Preconditions: none.
// Postconditions: after `uniq`, final names are unique within the sheet and
//   running `uniq` again changes nothing.
// Failure modes: `DuplicateName` when versioning still yields a collision.
// Side effects: none.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;

use serde::Serialize;

use crate::error::GenError;
use crate::session::GenerationSession;

/// An entry of a versioned sheet.
pub trait SheetEntry: Clone {
    /// Artifact kind; names only collide with names of the same kind.
    const KIND: &'static str;

    fn base_name(&self) -> &str;
    /// Everything except the name and version that makes two entries
    /// different.
    fn content_key(&self) -> String;
    fn version(&self) -> Option<u32>;
    fn set_version(&mut self, version: Option<u32>);

    fn final_name(&self) -> String {
        match self.version() {
            Some(v) => format!("{}_v{}", self.base_name(), v),
            None => self.base_name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestInstance {
    pub base_name: String,
    pub kind: String,
    pub attrs: BTreeMap<String, String>,
    pub version: Option<u32>,
}

impl TestInstance {
    pub fn new(name: &str, kind: &str) -> Self {
        TestInstance {
            base_name: name.to_string(),
            kind: kind.to_string(),
            attrs: BTreeMap::new(),
            version: None,
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attrs.insert(key.to_string(), value.to_string());
        self
    }
}

impl SheetEntry for TestInstance {
    const KIND: &'static str = "instance";

    fn base_name(&self) -> &str {
        &self.base_name
    }

    fn content_key(&self) -> String {
        let mut key = self.kind.clone();
        for (k, v) in &self.attrs {
            write!(key, "\u{1f}{k}={v}").unwrap();
        }
        key
    }

    fn version(&self) -> Option<u32> {
        self.version
    }

    fn set_version(&mut self, version: Option<u32>) {
        self.version = version;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternSet {
    pub base_name: String,
    pub patterns: Vec<String>,
    pub version: Option<u32>,
}

impl PatternSet {
    pub fn new(name: &str, patterns: &[&str]) -> Self {
        PatternSet {
            base_name: name.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            version: None,
        }
    }
}

impl SheetEntry for PatternSet {
    const KIND: &'static str = "pattern set";

    fn base_name(&self) -> &str {
        &self.base_name
    }

    fn content_key(&self) -> String {
        self.patterns.join("\u{1f}")
    }

    fn version(&self) -> Option<u32> {
        self.version
    }

    fn set_version(&mut self, version: Option<u32>) {
        self.version = version;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Sheet<E> {
    pub name: String,
    entries: Vec<E>,
}

impl<E: SheetEntry> Sheet<E> {
    pub fn new(name: &str) -> Self {
        Sheet {
            name: name.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, entry: E) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[E] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.final_name()).collect()
    }

    /// Collapse equal entries and version the distinct ones.
    pub fn uniq(&mut self) -> Result<(), GenError> {
        let mut seen = HashSet::new();
        self.entries
            .retain(|e| seen.insert((e.base_name().to_string(), e.content_key())));

        let mut variants: HashMap<String, Vec<String>> = HashMap::new();
        for e in &self.entries {
            variants
                .entry(e.base_name().to_string())
                .or_default()
                .push(e.content_key());
        }
        for e in &mut self.entries {
            let keys = &variants[e.base_name()];
            let version = if keys.len() == 1 {
                None
            } else {
                let key = e.content_key();
                keys.iter()
                    .position(|k| *k == key)
                    .map(|pos| pos as u32 + 1)
            };
            e.set_version(version);
        }

        let mut names = HashSet::new();
        for e in &self.entries {
            let name = e.final_name();
            if !names.insert(name.clone()) {
                return Err(GenError::DuplicateName {
                    sheet: self.name.clone(),
                    name,
                });
            }
        }
        Ok(())
    }

    /// Register every final name with the session.
    pub fn register(&self, session: &mut GenerationSession) -> Result<(), GenError> {
        for name in self.names() {
            session.register(E::KIND, &self.name, &name)?;
        }
        Ok(())
    }
}

impl Sheet<TestInstance> {
    pub fn render(&self) -> String {
        let mut buf = String::new();
        writeln!(buf, "Test Instances\t{}", self.name).unwrap();
        writeln!(buf, "name\ttype\tattributes").unwrap();
        for inst in &self.entries {
            let attrs: Vec<String> = inst.attrs.iter().map(|(k, v)| format!("{k}={v}")).collect();
            writeln!(buf, "{}\t{}\t{}", inst.final_name(), inst.kind, attrs.join(" ")).unwrap();
        }
        buf
    }
}

impl Sheet<PatternSet> {
    pub fn render(&self) -> String {
        let mut buf = String::new();
        writeln!(buf, "Pattern Sets\t{}", self.name).unwrap();
        writeln!(buf, "name\tpattern").unwrap();
        for set in &self.entries {
            let name = set.final_name();
            for pattern in &set.patterns {
                writeln!(buf, "{name}\t{pattern}").unwrap();
            }
        }
        buf
    }
}
