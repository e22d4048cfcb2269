// render.rs — Flow sheet serializers (tab-delimited and YAML)
//
// The YAML form is written by hand: the documents are small, flat and
// fixed-shape, and scalars are quoted whenever plain style would change
// their meaning.

use std::fmt::Write as _;

use super::line::Column;
use super::{FinalizedFlow, FlowFormat};

pub fn render_flow(flow: &FinalizedFlow, format: FlowFormat, header: &[String]) -> String {
    match format {
        FlowFormat::Tabular => render_tabular(flow, header),
        FlowFormat::Yaml => render_yaml(flow, header),
    }
}

pub fn flow_file_name(flow: &str, format: FlowFormat) -> String {
    match format {
        FlowFormat::Tabular => format!("{flow}.txt"),
        FlowFormat::Yaml => format!("{flow}.yaml"),
    }
}

pub fn render_tabular(flow: &FinalizedFlow, header: &[String]) -> String {
    let mut buf = String::new();
    for line in header {
        writeln!(buf, "# {line}").unwrap();
    }
    writeln!(buf, "Flow Table\t{}", flow.name).unwrap();
    let names: Vec<&str> = Column::ALL.iter().map(|c| c.as_str()).collect();
    writeln!(buf, "{}", names.join("\t")).unwrap();
    for line in &flow.lines {
        writeln!(buf, "{}", line.row().join("\t")).unwrap();
    }
    buf
}

pub fn render_yaml(flow: &FinalizedFlow, header: &[String]) -> String {
    let mut buf = String::new();
    for line in header {
        writeln!(buf, "# {line}").unwrap();
    }
    writeln!(buf, "flow: {}", yaml_scalar(&flow.name)).unwrap();
    if flow.lines.is_empty() {
        writeln!(buf, "lines: []").unwrap();
        return buf;
    }
    writeln!(buf, "lines:").unwrap();
    for line in &flow.lines {
        let kind = line.op.opcode().to_ascii_lowercase();
        let description = line
            .get(Column::Comment)
            .or_else(|| line.get(Column::Tname))
            .unwrap_or_else(|| line.parameter());
        writeln!(buf, "  - type: {}", yaml_scalar(&kind)).unwrap();
        writeln!(buf, "    description: {}", yaml_scalar(description)).unwrap();
        writeln!(buf, "    instance: {}", yaml_scalar(line.parameter())).unwrap();
        writeln!(buf, "    flow:").unwrap();

        let (context, attributes): (Vec<(Column, &str)>, Vec<(Column, &str)>) = line
            .columns()
            .filter(|(c, _)| !matches!(c, Column::Opcode | Column::Parameter | Column::Comment))
            .partition(|(c, _)| c.is_context());
        write_mapping(&mut buf, "attributes", &attributes);
        write_mapping(&mut buf, "context", &context);
    }
    buf
}

fn write_mapping(buf: &mut String, key: &str, entries: &[(Column, &str)]) {
    if entries.is_empty() {
        writeln!(buf, "      {key}: {{}}").unwrap();
        return;
    }
    writeln!(buf, "      {key}:").unwrap();
    for (col, value) in entries {
        writeln!(buf, "        {}: {}", col, yaml_scalar(value)).unwrap();
    }
}

/// A YAML scalar, double-quoted when plain style would be ambiguous.
pub fn yaml_scalar(s: &str) -> String {
    const RESERVED: &[&str] = &[
        "true", "false", "yes", "no", "on", "off", "null", "~", "y", "n",
    ];
    let needs_quotes = s.is_empty()
        || s.trim() != s
        || s.starts_with(|c: char| "-?:,[]{}#&*!|>'\"%@`".contains(c))
        || s.contains(": ")
        || s.contains(" #")
        || s.contains(['"', '\\', '\u{2028}', '\u{2029}'])
        || s.chars().any(char::is_control)
        || RESERVED.contains(&s.to_ascii_lowercase().as_str())
        || s.parse::<f64>().is_ok();
    if !needs_quotes {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() || c == '\u{2028}' || c == '\u{2029}' => {
                out.push_str(&format!("\\u{:04x}", u32::from(c)))
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
