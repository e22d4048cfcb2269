// flow/mod.rs — Test-program flow construction
//
// `FlowBuilder` collects flow lines in order. Pass/fail/ran relationships
// between lines are recorded as pending references while the flow is being
// built and resolved in `finalize`, which mutates the referenced (earlier)
// lines, writes the condition columns of the referencing lines, inserts
// `flag-true` lines for `ran` checks and freezes the result.
//
// Preconditions: relationship targets are ids of earlier lines.
// Postconditions: a `FinalizedFlow` has every job column written and every
//   reference resolved.
// Failure modes: `UnresolvedReference`, `TooManyConditions`, `JobConflict`.
// Side effects: unknown attributes produce `W0301` warnings.

pub mod line;
pub mod render;
pub mod sheet;

use std::collections::BTreeSet;

use serde::Serialize;

pub use line::{Column, FlowLine, FlowOp};

use crate::diag::Diagnostic;
use crate::error::GenError;

/// Output form of a flow sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlowFormat {
    /// Tab-delimited rows (Teradyne flow tables).
    Tabular,
    /// YAML document.
    Yaml,
}

impl std::str::FromStr for FlowFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tabular" | "tab" => Ok(FlowFormat::Tabular),
            "yaml" | "yml" => Ok(FlowFormat::Yaml),
            other => Err(format!("unknown flow format '{other}' (expected tabular or yaml)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    IfPassed,
    UnlessPassed,
    IfFailed,
    UnlessFailed,
    IfRan,
    UnlessRan,
}

impl Relation {
    pub fn from_key(key: &str) -> Option<Relation> {
        let rel = match key {
            "if_passed" => Relation::IfPassed,
            "unless_passed" => Relation::UnlessPassed,
            "if_failed" => Relation::IfFailed,
            "unless_failed" => Relation::UnlessFailed,
            "if_ran" => Relation::IfRan,
            "unless_ran" => Relation::UnlessRan,
            _ => return None,
        };
        Some(rel)
    }

    fn negated(self) -> bool {
        matches!(
            self,
            Relation::UnlessPassed | Relation::UnlessFailed | Relation::UnlessRan
        )
    }

    fn flag(self, target: &str) -> String {
        let suffix = match self {
            Relation::IfPassed | Relation::UnlessPassed => "PASSED",
            Relation::IfFailed | Relation::UnlessFailed => "FAILED",
            Relation::IfRan | Relation::UnlessRan => "RAN",
        };
        format!("{target}_{suffix}")
    }
}

#[derive(Debug, Clone)]
struct PendingRelation {
    line: usize,
    relation: Relation,
    target: String,
}

/// A flow whose lines can no longer change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalizedFlow {
    pub name: String,
    pub lines: Vec<FlowLine>,
}

pub struct FlowBuilder {
    name: String,
    lines: Vec<FlowLine>,
    pending: Vec<PendingRelation>,
    if_jobs: Vec<String>,
    unless_jobs: Vec<String>,
    enables: Vec<String>,
    skips: usize,
    diagnostics: Vec<Diagnostic>,
}

impl FlowBuilder {
    pub fn new(name: &str) -> Self {
        FlowBuilder {
            name: name.to_string(),
            lines: Vec::new(),
            pending: Vec::new(),
            if_jobs: Vec::new(),
            unless_jobs: Vec::new(),
            enables: Vec::new(),
            skips: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lines(&self) -> &[FlowLine] {
        &self.lines
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Append a line. Besides column attributes, `attrs` may carry `id`,
    /// the relationship keys (`if_passed`, ...), `if_job`/`unless_job`
    /// (comma-separated) and `if_enable`. Returns the line's id.
    pub fn add<'a>(
        &mut self,
        op: FlowOp,
        parameter: &str,
        attrs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<String, GenError> {
        let index = self.lines.len();
        let mut columns = Vec::new();
        let mut id = None;
        let mut relations = Vec::new();
        let mut if_jobs = Vec::new();
        let mut unless_jobs = Vec::new();
        let mut enable = None;
        for (key, value) in attrs {
            if let Some(rel) = Relation::from_key(key) {
                relations.push((rel, value.to_string()));
                continue;
            }
            match key {
                "id" => id = Some(value.to_string()),
                "if_job" | "if_jobs" => if_jobs.extend(split_list(value)),
                "unless_job" | "unless_jobs" => unless_jobs.extend(split_list(value)),
                "if_enable" => enable = Some(value.to_string()),
                _ => columns.push((key, value)),
            }
        }
        let id = id.unwrap_or_else(|| format!("t{}", index + 1));

        let mut line = FlowLine::new(&id, op, parameter).with_attrs(columns, &mut self.diagnostics);
        for job in self.if_jobs.iter().chain(&if_jobs) {
            line.add_if_job(job);
        }
        for job in self.unless_jobs.iter().chain(&unless_jobs) {
            line.add_unless_job(job);
        }
        if let Some(word) = enable.or_else(|| self.enables.last().cloned()) {
            if line.get(Column::Enable).is_none() {
                line.set(Column::Enable, &word);
            }
        }
        for (relation, target) in relations {
            self.pending.push(PendingRelation {
                line: index,
                relation,
                target,
            });
        }
        self.lines.push(line);
        Ok(id)
    }

    pub fn test(&mut self, parameter: &str) -> Result<String, GenError> {
        self.add(FlowOp::Test, parameter, [])
    }

    pub fn goto(&mut self, label: &str) -> Result<String, GenError> {
        self.add(FlowOp::Goto, label, [])
    }

    /// Record a relationship from line `line_id` to an earlier line.
    pub fn relate(&mut self, line_id: &str, relation: Relation, target: &str) -> Result<(), GenError> {
        let line = self
            .lines
            .iter()
            .rposition(|l| l.id == line_id)
            .ok_or_else(|| GenError::UnresolvedReference {
                line: line_id.to_string(),
                target: target.to_string(),
            })?;
        self.pending.push(PendingRelation {
            line,
            relation,
            target: target.to_string(),
        });
        Ok(())
    }

    pub fn with_if_job<T>(
        &mut self,
        jobs: &[&str],
        body: impl FnOnce(&mut Self) -> Result<T, GenError>,
    ) -> Result<T, GenError> {
        let depth = self.if_jobs.len();
        self.if_jobs.extend(jobs.iter().map(|j| j.to_string()));
        let result = body(self);
        self.if_jobs.truncate(depth);
        result
    }

    pub fn with_unless_job<T>(
        &mut self,
        jobs: &[&str],
        body: impl FnOnce(&mut Self) -> Result<T, GenError>,
    ) -> Result<T, GenError> {
        let depth = self.unless_jobs.len();
        self.unless_jobs.extend(jobs.iter().map(|j| j.to_string()));
        let result = body(self);
        self.unless_jobs.truncate(depth);
        result
    }

    /// Lines added by `body` run only when flow word `word` is enabled.
    pub fn with_if_enable<T>(
        &mut self,
        word: &str,
        body: impl FnOnce(&mut Self) -> Result<T, GenError>,
    ) -> Result<T, GenError> {
        self.enables.push(word.to_string());
        let result = body(self);
        self.enables.pop();
        result
    }

    /// Lines added by `body` are skipped when flow word `word` is enabled:
    /// a gated `goto` jumps over them to a labelled `nop`.
    pub fn with_unless_enable<T>(
        &mut self,
        word: &str,
        body: impl FnOnce(&mut Self) -> Result<T, GenError>,
    ) -> Result<T, GenError> {
        self.skips += 1;
        let label = format!("skip_{}_{}", word, self.skips);
        self.with_if_enable(word, |b| b.goto(&label))?;
        let result = body(self);
        self.add(FlowOp::Nop, "", [("label", label.as_str())])?;
        result
    }

    /// Resolve relationships, write job columns and freeze the flow.
    pub fn finalize(mut self) -> Result<(FinalizedFlow, Vec<Diagnostic>), GenError> {
        let mut condition_slots = vec![0usize; self.lines.len()];
        let mut ran_inserts: BTreeSet<(usize, String)> = BTreeSet::new();

        for p in std::mem::take(&mut self.pending) {
            let target = self.lines[..p.line]
                .iter()
                .rposition(|l| l.id == p.target)
                .ok_or_else(|| GenError::UnresolvedReference {
                    line: self.lines[p.line].id.clone(),
                    target: p.target.clone(),
                })?;
            let flag = p.relation.flag(&p.target);
            match p.relation {
                Relation::IfPassed | Relation::UnlessPassed => {
                    let t = &mut self.lines[target];
                    t.set(Column::Result, "None");
                    t.set(Column::FlagPass, &flag);
                }
                Relation::IfFailed | Relation::UnlessFailed => {
                    let t = &mut self.lines[target];
                    t.set(Column::Result, "None");
                    t.set(Column::FlagFail, &flag);
                }
                Relation::IfRan | Relation::UnlessRan => {
                    ran_inserts.insert((target, flag.clone()));
                }
            }

            let sense = if p.relation.negated() { "not" } else { "" };
            let line = &mut self.lines[p.line];
            match condition_slots[p.line] {
                0 => {
                    line.set(Column::DeviceSense, sense);
                    line.set(Column::DeviceCondition, "flag-true");
                    line.set(Column::DeviceName, &flag);
                }
                1 => {
                    line.set(Column::GroupSpecifier, "all-active");
                    line.set(Column::GroupSense, sense);
                    line.set(Column::GroupCondition, "flag-true");
                    line.set(Column::GroupName, &flag);
                }
                _ => {
                    return Err(GenError::TooManyConditions {
                        line: line.id.clone(),
                    })
                }
            }
            condition_slots[p.line] += 1;
        }

        // Descending so earlier insertion points stay valid.
        for (target, flag) in ran_inserts.into_iter().rev() {
            let id = format!("{}_ran", self.lines[target].id);
            let mut flag_line = FlowLine::new(&id, FlowOp::FlagTrue, &flag);
            for col in [Column::Enable, Column::Part, Column::Env] {
                if let Some(v) = self.lines[target].get(col) {
                    flag_line.set(col, v);
                }
            }
            self.lines.insert(target + 1, flag_line);
        }

        let labels: BTreeSet<String> = self
            .lines
            .iter()
            .filter_map(|l| l.get(Column::Label).map(str::to_string))
            .collect();
        for line in &mut self.lines {
            line.freeze_job()?;
            if line.op == FlowOp::Goto && !labels.contains(line.parameter()) {
                return Err(GenError::UnresolvedReference {
                    line: line.id.clone(),
                    target: line.parameter().to_string(),
                });
            }
        }

        log::debug!("flow '{}' finalized with {} lines", self.name, self.lines.len());
        Ok((
            FinalizedFlow {
                name: self.name,
                lines: self.lines,
            },
            self.diagnostics,
        ))
    }
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn if_passed_sets_flags_on_both_lines() {
        let mut flow = FlowBuilder::new("sort1");
        flow.add(FlowOp::Test, "erase_all", [("id", "x"), ("bin", "3")])
            .unwrap();
        flow.add(FlowOp::Test, "read_all", [("if_passed", "x")]).unwrap();
        let (flow, _) = flow.finalize().unwrap();
        let a = &flow.lines[0];
        assert_eq!(a.get(Column::Result), Some("None"));
        assert_eq!(a.get(Column::FlagPass), Some("x_PASSED"));
        let b = &flow.lines[1];
        assert_eq!(b.get(Column::DeviceCondition), Some("flag-true"));
        assert_eq!(b.get(Column::DeviceName), Some("x_PASSED"));
        assert_eq!(b.get(Column::DeviceSense), Some(""));
    }

    #[test]
    fn unless_failed_uses_not_sense() {
        let mut flow = FlowBuilder::new("f");
        flow.add(FlowOp::Test, "a", [("id", "a")]).unwrap();
        flow.add(FlowOp::Test, "b", [("unless_failed", "a")]).unwrap();
        let (flow, _) = flow.finalize().unwrap();
        assert_eq!(flow.lines[0].get(Column::FlagFail), Some("a_FAILED"));
        assert_eq!(flow.lines[1].get(Column::DeviceSense), Some("not"));
    }

    #[test]
    fn ran_inserts_flag_line() {
        let mut flow = FlowBuilder::new("f");
        flow.add(FlowOp::Test, "a", [("id", "a")]).unwrap();
        flow.test("b").unwrap();
        flow.add(FlowOp::Test, "c", [("if_ran", "a")]).unwrap();
        let (flow, _) = flow.finalize().unwrap();
        let ops: Vec<&str> = flow
            .lines
            .iter()
            .map(|l| l.get(Column::Opcode).unwrap_or(""))
            .collect();
        assert_eq!(ops, vec!["Test", "flag-true", "Test", "Test"]);
        assert_eq!(flow.lines[1].parameter(), "a_RAN");
        assert_eq!(flow.lines[3].get(Column::DeviceName), Some("a_RAN"));
    }

    #[test]
    fn second_condition_uses_group_columns_third_fails() {
        let mut flow = FlowBuilder::new("f");
        flow.add(FlowOp::Test, "a", [("id", "a")]).unwrap();
        flow.add(FlowOp::Test, "b", [("id", "b")]).unwrap();
        flow.add(FlowOp::Test, "c", [("if_passed", "a"), ("if_failed", "b")])
            .unwrap();
        let (done, _) = flow.finalize().unwrap();
        let c = &done.lines[2];
        assert_eq!(c.get(Column::DeviceName), Some("a_PASSED"));
        assert_eq!(c.get(Column::GroupSpecifier), Some("all-active"));
        assert_eq!(c.get(Column::GroupName), Some("b_FAILED"));

        let mut flow = FlowBuilder::new("f");
        flow.add(FlowOp::Test, "a", [("id", "a")]).unwrap();
        flow.add(
            FlowOp::Test,
            "c",
            [("if_passed", "a"), ("if_failed", "a"), ("if_ran", "a")],
        )
        .unwrap();
        assert!(matches!(
            flow.finalize(),
            Err(GenError::TooManyConditions { .. })
        ));
    }

    #[test]
    fn forward_reference_is_unresolved() {
        let mut flow = FlowBuilder::new("f");
        flow.add(FlowOp::Test, "b", [("if_passed", "later")]).unwrap();
        flow.add(FlowOp::Test, "a", [("id", "later")]).unwrap();
        assert_eq!(
            flow.finalize().unwrap_err(),
            GenError::UnresolvedReference {
                line: "t1".to_string(),
                target: "later".to_string()
            }
        );
    }

    #[test]
    fn job_blocks_and_conflicts() {
        let mut flow = FlowBuilder::new("f");
        flow.with_if_job(&["P1", "P2"], |f| f.test("a")).unwrap();
        flow.with_unless_job(&["FT"], |f| f.test("b")).unwrap();
        let (done, _) = flow.finalize().unwrap();
        assert_eq!(done.lines[0].get(Column::Job), Some("P1,P2"));
        assert_eq!(done.lines[1].get(Column::Job), Some("!FT"));

        let mut flow = FlowBuilder::new("f");
        flow.with_if_job(&["P1"], |f| f.add(FlowOp::Test, "a", [("unless_job", "FT")]))
            .unwrap();
        assert!(matches!(flow.finalize(), Err(GenError::JobConflict { .. })));
    }

    #[test]
    fn enable_blocks() {
        let mut flow = FlowBuilder::new("f");
        flow.with_if_enable("extra", |f| f.test("a")).unwrap();
        flow.with_unless_enable("quick", |f| f.test("b")).unwrap();
        let (done, _) = flow.finalize().unwrap();
        assert_eq!(done.lines[0].get(Column::Enable), Some("extra"));
        let goto = &done.lines[1];
        assert_eq!(goto.op, FlowOp::Goto);
        assert_eq!(goto.get(Column::Enable), Some("quick"));
        assert_eq!(goto.parameter(), "skip_quick_1");
        assert_eq!(done.lines[2].get(Column::Enable), None);
        let nop = &done.lines[3];
        assert_eq!(nop.op, FlowOp::Nop);
        assert_eq!(nop.get(Column::Label), Some("skip_quick_1"));
    }

    #[test]
    fn relate_after_the_fact() {
        let mut flow = FlowBuilder::new("f");
        flow.add(FlowOp::Test, "a", [("id", "a")]).unwrap();
        let b = flow.test("b").unwrap();
        flow.relate(&b, Relation::UnlessPassed, "a").unwrap();
        assert!(flow.relate("zz", Relation::IfRan, "a").is_err());
        let (done, _) = flow.finalize().unwrap();
        assert_eq!(done.lines[1].get(Column::DeviceSense), Some("not"));
        assert_eq!(done.lines[1].get(Column::DeviceName), Some("a_PASSED"));
    }

    #[test]
    fn goto_needs_label() {
        let mut flow = FlowBuilder::new("f");
        flow.goto("nowhere").unwrap();
        assert!(matches!(
            flow.finalize(),
            Err(GenError::UnresolvedReference { .. })
        ));
    }

    #[test]
    fn auto_ids_follow_position() {
        let mut flow = FlowBuilder::new("f");
        assert_eq!(flow.test("a").unwrap(), "t1");
        assert_eq!(flow.add(FlowOp::Test, "b", [("id", "named")]).unwrap(), "named");
        assert_eq!(flow.test("c").unwrap(), "t3");
    }
}
