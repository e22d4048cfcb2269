// line.rs — One row of a test-program flow
//
// A flow line is an opcode, a parameter and a set of named columns. Column
// values are set by attribute name through a fixed alias table. Job gating
// is accumulated leniently: `if_job` and `unless_job` may both be added,
// and the conflict is only reported when the job column is read.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::diag::{codes, Diagnostic};
use crate::error::GenError;

/// Flow-sheet columns in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Label,
    Enable,
    Job,
    Part,
    Env,
    Opcode,
    Parameter,
    Tname,
    Tnum,
    BinPass,
    BinFail,
    SortPass,
    SortFail,
    Result,
    FlagPass,
    FlagFail,
    State,
    GroupSpecifier,
    GroupSense,
    GroupCondition,
    GroupName,
    DeviceSense,
    DeviceCondition,
    DeviceName,
    DebugAssume,
    DebugSites,
    Comment,
}

impl Column {
    pub const ALL: [Column; 27] = [
        Column::Label,
        Column::Enable,
        Column::Job,
        Column::Part,
        Column::Env,
        Column::Opcode,
        Column::Parameter,
        Column::Tname,
        Column::Tnum,
        Column::BinPass,
        Column::BinFail,
        Column::SortPass,
        Column::SortFail,
        Column::Result,
        Column::FlagPass,
        Column::FlagFail,
        Column::State,
        Column::GroupSpecifier,
        Column::GroupSense,
        Column::GroupCondition,
        Column::GroupName,
        Column::DeviceSense,
        Column::DeviceCondition,
        Column::DeviceName,
        Column::DebugAssume,
        Column::DebugSites,
        Column::Comment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Column::Label => "label",
            Column::Enable => "enable",
            Column::Job => "job",
            Column::Part => "part",
            Column::Env => "env",
            Column::Opcode => "opcode",
            Column::Parameter => "parameter",
            Column::Tname => "tname",
            Column::Tnum => "tnum",
            Column::BinPass => "bin_pass",
            Column::BinFail => "bin_fail",
            Column::SortPass => "sort_pass",
            Column::SortFail => "sort_fail",
            Column::Result => "result",
            Column::FlagPass => "flag_pass",
            Column::FlagFail => "flag_fail",
            Column::State => "state",
            Column::GroupSpecifier => "group_specifier",
            Column::GroupSense => "group_sense",
            Column::GroupCondition => "group_condition",
            Column::GroupName => "group_name",
            Column::DeviceSense => "device_sense",
            Column::DeviceCondition => "device_condition",
            Column::DeviceName => "device_name",
            Column::DebugAssume => "debug_assume",
            Column::DebugSites => "debug_sites",
            Column::Comment => "comment",
        }
    }

    /// Columns describing when a line runs rather than what it does.
    pub fn is_context(self) -> bool {
        matches!(
            self,
            Column::Enable
                | Column::Job
                | Column::Part
                | Column::Env
                | Column::GroupSpecifier
                | Column::GroupSense
                | Column::GroupCondition
                | Column::GroupName
                | Column::DeviceSense
                | Column::DeviceCondition
                | Column::DeviceName
        )
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const ALIASES: &[(&str, Column)] = &[
    ("bin", Column::BinFail),
    ("hardbin", Column::BinFail),
    ("hard_bin", Column::BinFail),
    ("softbin", Column::SortFail),
    ("sbin", Column::SortFail),
    ("soft_bin", Column::SortFail),
    ("name", Column::Tname),
    ("number", Column::Tnum),
    ("test_number", Column::Tnum),
    ("test_num", Column::Tnum),
    ("type", Column::Result),
    ("flag_false", Column::FlagFail),
    ("flag_true", Column::FlagPass),
    ("description", Column::Comment),
];

/// Resolve an attribute name to its column: canonical names first, then
/// the alias table. `job` is managed through `if_job`/`unless_job`.
pub fn resolve_attribute(key: &str) -> Option<Column> {
    if let Some(col) = Column::ALL
        .into_iter()
        .find(|c| c.as_str() == key && *c != Column::Job)
    {
        return Some(col);
    }
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|&(_, col)| col)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlowOp {
    Test,
    Cz,
    Goto,
    Nop,
    SetDevice,
    SetErrorBin,
    EnableFlowWord,
    DisableFlowWord,
    Logprint,
    UseLimit,
    FlagTrue,
    FlagFalse,
    Defaults,
}

impl FlowOp {
    pub fn from_name(name: &str) -> Option<FlowOp> {
        let op = match name.replace('-', "_").to_ascii_lowercase().as_str() {
            "test" => FlowOp::Test,
            "cz" | "characterize" => FlowOp::Cz,
            "goto" => FlowOp::Goto,
            "nop" => FlowOp::Nop,
            "set_device" | "bin" => FlowOp::SetDevice,
            "set_error_bin" => FlowOp::SetErrorBin,
            "enable_flow_word" | "enable" => FlowOp::EnableFlowWord,
            "disable_flow_word" | "disable" => FlowOp::DisableFlowWord,
            "logprint" | "log" => FlowOp::Logprint,
            "use_limit" => FlowOp::UseLimit,
            "flag_true" => FlowOp::FlagTrue,
            "flag_false" => FlowOp::FlagFalse,
            "defaults" => FlowOp::Defaults,
            _ => return None,
        };
        Some(op)
    }

    pub fn opcode(self) -> &'static str {
        match self {
            FlowOp::Test => "Test",
            FlowOp::Cz => "characterize",
            FlowOp::Goto => "goto",
            FlowOp::Nop => "nop",
            FlowOp::SetDevice => "set-device",
            FlowOp::SetErrorBin => "set-error-bin",
            FlowOp::EnableFlowWord => "enable-flow-word",
            FlowOp::DisableFlowWord => "disable-flow-word",
            FlowOp::Logprint => "logprint",
            FlowOp::UseLimit => "Use-Limit",
            FlowOp::FlagTrue => "flag-true",
            FlowOp::FlagFalse => "flag-false",
            FlowOp::Defaults => "defaults",
        }
    }

    fn default_result(self) -> Option<&'static str> {
        match self {
            FlowOp::Test | FlowOp::UseLimit => Some("Fail"),
            FlowOp::Cz => Some("None"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowLine {
    pub id: String,
    pub op: FlowOp,
    columns: BTreeMap<Column, String>,
    if_jobs: Vec<String>,
    unless_jobs: Vec<String>,
}

/// Lines compare by content; the id is bookkeeping.
impl PartialEq for FlowLine {
    fn eq(&self, other: &Self) -> bool {
        self.op == other.op
            && self.columns == other.columns
            && self.if_jobs == other.if_jobs
            && self.unless_jobs == other.unless_jobs
    }
}

impl FlowLine {
    pub fn new(id: &str, op: FlowOp, parameter: &str) -> Self {
        let mut columns = BTreeMap::new();
        columns.insert(Column::Opcode, op.opcode().to_string());
        if !parameter.is_empty() {
            columns.insert(Column::Parameter, parameter.to_string());
        }
        if let Some(result) = op.default_result() {
            columns.insert(Column::Result, result.to_string());
        }
        FlowLine {
            id: id.to_string(),
            op,
            columns,
            if_jobs: Vec::new(),
            unless_jobs: Vec::new(),
        }
    }

    /// Apply attributes by name. Unknown names are ignored with a warning.
    pub fn with_attrs<'a>(
        mut self,
        attrs: impl IntoIterator<Item = (&'a str, &'a str)>,
        diags: &mut Vec<Diagnostic>,
    ) -> Self {
        for (key, value) in attrs {
            match resolve_attribute(key) {
                Some(col) => self.set(col, value),
                None => diags.push(Diagnostic::warning(
                    codes::W0301,
                    format!("flow line '{}': unknown attribute '{}' ignored", self.id, key),
                )),
            }
        }
        self
    }

    pub fn set(&mut self, column: Column, value: &str) {
        self.columns.insert(column, value.to_string());
    }

    pub fn get(&self, column: Column) -> Option<&str> {
        self.columns.get(&column).map(String::as_str)
    }

    pub fn parameter(&self) -> &str {
        self.get(Column::Parameter).unwrap_or("")
    }

    pub fn add_if_job(&mut self, job: &str) {
        if !self.if_jobs.iter().any(|j| j == job) {
            self.if_jobs.push(job.to_string());
        }
    }

    pub fn add_unless_job(&mut self, job: &str) {
        if !self.unless_jobs.iter().any(|j| j == job) {
            self.unless_jobs.push(job.to_string());
        }
    }

    /// The job column: `A,B` for if-jobs, `!A,!B` for unless-jobs.
    pub fn job(&self) -> Result<Option<String>, GenError> {
        match (self.if_jobs.is_empty(), self.unless_jobs.is_empty()) {
            (false, false) => Err(GenError::JobConflict {
                line: self.id.clone(),
            }),
            (false, true) => Ok(Some(self.if_jobs.join(","))),
            (true, false) => Ok(Some(
                self.unless_jobs
                    .iter()
                    .map(|j| format!("!{j}"))
                    .collect::<Vec<_>>()
                    .join(","),
            )),
            (true, true) => Ok(None),
        }
    }

    /// Write the job column. Fails on conflicting job gating.
    pub(crate) fn freeze_job(&mut self) -> Result<(), GenError> {
        if let Some(job) = self.job()? {
            self.columns.insert(Column::Job, job);
        }
        Ok(())
    }

    /// All columns in output order, empty where unset.
    pub fn row(&self) -> Vec<&str> {
        Column::ALL
            .iter()
            .map(|c| self.get(*c).unwrap_or(""))
            .collect()
    }

    pub fn columns(&self) -> impl Iterator<Item = (Column, &str)> {
        self.columns.iter().map(|(c, v)| (*c, v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_defaults() {
        let t = FlowLine::new("t1", FlowOp::Test, "erase_all");
        assert_eq!(t.get(Column::Opcode), Some("Test"));
        assert_eq!(t.get(Column::Result), Some("Fail"));
        let cz = FlowLine::new("t2", FlowOp::Cz, "erase_all");
        assert_eq!(cz.get(Column::Opcode), Some("characterize"));
        assert_eq!(cz.get(Column::Result), Some("None"));
        let nop = FlowLine::new("t3", FlowOp::Nop, "");
        assert_eq!(nop.get(Column::Result), None);
        assert_eq!(FlowOp::from_name("use-limit"), Some(FlowOp::UseLimit));
        assert_eq!(FlowOp::UseLimit.opcode(), "Use-Limit");
    }

    #[test]
    fn aliases_resolve_to_columns() {
        assert_eq!(resolve_attribute("bin"), Some(Column::BinFail));
        assert_eq!(resolve_attribute("softbin"), Some(Column::SortFail));
        assert_eq!(resolve_attribute("sbin"), Some(Column::SortFail));
        assert_eq!(resolve_attribute("soft_bin"), Some(Column::SortFail));
        assert_eq!(resolve_attribute("name"), Some(Column::Tname));
        assert_eq!(resolve_attribute("test_number"), Some(Column::Tnum));
        assert_eq!(resolve_attribute("tnum"), Some(Column::Tnum));
        assert_eq!(resolve_attribute("type"), Some(Column::Result));
        assert_eq!(resolve_attribute("bin_pass"), Some(Column::BinPass));
        assert_eq!(resolve_attribute("job"), None);
        assert_eq!(resolve_attribute("colour"), None);
    }

    #[test]
    fn unknown_attributes_warn() {
        let mut diags = Vec::new();
        let line = FlowLine::new("t1", FlowOp::Test, "x")
            .with_attrs([("bin", "3"), ("colour", "red")], &mut diags);
        assert_eq!(line.get(Column::BinFail), Some("3"));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, Some(codes::W0301));
    }

    #[test]
    fn jobs_are_lenient_until_read() {
        let mut line = FlowLine::new("t1", FlowOp::Test, "x");
        line.add_if_job("P1");
        line.add_if_job("P2");
        assert_eq!(line.job().unwrap().as_deref(), Some("P1,P2"));
        line.add_unless_job("FT");
        assert_eq!(
            line.job(),
            Err(GenError::JobConflict {
                line: "t1".to_string()
            })
        );

        let mut unless = FlowLine::new("t2", FlowOp::Test, "x");
        unless.add_unless_job("FT");
        unless.add_unless_job("QA");
        assert_eq!(unless.job().unwrap().as_deref(), Some("!FT,!QA"));
    }

    #[test]
    fn equality_ignores_id() {
        let a = FlowLine::new("t1", FlowOp::Test, "x");
        let b = FlowLine::new("t9", FlowOp::Test, "x");
        assert_eq!(a, b);
        assert_ne!(a, FlowLine::new("t1", FlowOp::Test, "y"));
    }

    #[test]
    fn row_has_every_column() {
        let line = FlowLine::new("t1", FlowOp::Test, "x");
        let row = line.row();
        assert_eq!(row.len(), 27);
        assert_eq!(row[5], "Test");
        assert_eq!(row[6], "x");
    }
}
