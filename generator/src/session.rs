// session.rs — Generation-session name registry
//
// One session spans a whole generation run. Every generated pattern, flow,
// test-instance and pattern-set name is registered here together with its
// artifact kind and the sheet that produced it, so that duplicates across
// sheets of the same kind are reported. A pattern and an instance may share
// a name. The session is created by the caller and passed by `&mut`; there
// is no global state.

use std::collections::HashMap;

use crate::diag::{codes, Diagnostic};
use crate::error::GenError;

#[derive(Debug, Default)]
pub struct GenerationSession {
    /// (kind, name) -> owning sheet
    owners: HashMap<(String, String), String>,
    diagnostics: Vec<Diagnostic>,
}

impl GenerationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` of artifact `kind` as produced by `sheet`. A name
    /// repeated within one sheet is an error; a name already produced by
    /// another sheet of the same kind is a warning and keeps its first owner.
    pub fn register(&mut self, kind: &str, sheet: &str, name: &str) -> Result<(), GenError> {
        let key = (kind.to_string(), name.to_string());
        match self.owners.get(&key) {
            Some(owner) if owner == sheet => Err(GenError::DuplicateName {
                sheet: sheet.to_string(),
                name: name.to_string(),
            }),
            Some(owner) => {
                let diag = Diagnostic::warning(
                    codes::W0201,
                    format!("{kind} '{name}' generated by sheet '{sheet}' was already generated by '{owner}'"),
                );
                self.diagnostics.push(diag);
                Ok(())
            }
            None => {
                self.owners.insert(key, sheet.to_string());
                Ok(())
            }
        }
    }

    pub fn owner(&self, kind: &str, name: &str) -> Option<&str> {
        self.owners
            .get(&(kind.to_string(), name.to_string()))
            .map(String::as_str)
    }

    pub fn contains(&self, kind: &str, name: &str) -> bool {
        self.owner(kind, name).is_some()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// End the session, returning the warnings it collected.
    pub fn finish(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_sheet_duplicate_is_an_error() {
        let mut s = GenerationSession::new();
        s.register("pattern", "patterns", "erase_all").unwrap();
        assert_eq!(
            s.register("pattern", "patterns", "erase_all"),
            Err(GenError::DuplicateName {
                sheet: "patterns".to_string(),
                name: "erase_all".to_string()
            })
        );
    }

    #[test]
    fn cross_sheet_duplicate_warns() {
        let mut s = GenerationSession::new();
        s.register("instance", "instances_a", "erase_all").unwrap();
        s.register("instance", "instances_b", "erase_all").unwrap();
        assert_eq!(s.owner("instance", "erase_all"), Some("instances_a"));
        let diags = s.finish();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, Some(codes::W0201));
    }

    #[test]
    fn different_kinds_may_share_a_name() {
        let mut s = GenerationSession::new();
        s.register("pattern", "patterns", "erase_all").unwrap();
        s.register("instance", "instances", "erase_all").unwrap();
        s.register("pattern set", "patsets", "erase_all").unwrap();
        assert!(s.contains("instance", "erase_all"));
        assert!(!s.contains("flow", "erase_all"));
        assert!(s.finish().is_empty());
    }
}
