// doc.rs — Human-readable pattern listing

use std::fmt::Write as _;

use super::{state_chars, write_header, PatternRenderer};
use crate::emitter::PatternItem;
use crate::error::GenError;
use crate::sequence::GeneratedPattern;

pub(super) struct DocRenderer;

impl PatternRenderer for DocRenderer {
    fn render(&self, pattern: &GeneratedPattern, header: &[String]) -> Result<String, GenError> {
        let mut buf = String::new();
        write_header(&mut buf, "#", header);
        writeln!(buf, "pattern {}", pattern.name).unwrap();
        writeln!(buf, "pins {}", pattern.pins.join(" ")).unwrap();
        for ts in &pattern.timesets {
            let period = ts.period.map(|p| p.to_string()).unwrap_or_default();
            writeln!(buf, "timeset {} {}", ts.name, period).unwrap();
        }
        let mut depth = 0usize;
        for item in &pattern.items {
            let indent = "  ".repeat(depth);
            match item {
                PatternItem::Vector(v) => {
                    let states: String = state_chars(&v.pins).collect();
                    let mut line = format!(
                        "{indent}{:>8}  {}  {}  x{}",
                        v.start_cycle, v.timeset, states, v.repeat
                    );
                    if let Some(label) = &v.label {
                        write!(line, "  label={label}").unwrap();
                    }
                    if let Some(target) = &v.call {
                        write!(line, "  call={target}").unwrap();
                    }
                    if v.store {
                        line.push_str("  store");
                    }
                    writeln!(buf, "{line}").unwrap();
                }
                PatternItem::Comment(text) => {
                    writeln!(buf, "{indent}# {text}").unwrap();
                }
                PatternItem::LoopStart { label, count } => {
                    writeln!(buf, "{indent}loop {label} x{count} {{").unwrap();
                    depth += 1;
                }
                PatternItem::LoopEnd { .. } => {
                    depth = depth.saturating_sub(1);
                    writeln!(buf, "{}}}", "  ".repeat(depth)).unwrap();
                }
            }
        }
        writeln!(
            buf,
            "total {} cycles ({} executed)",
            pattern.cycles, pattern.executed_cycles
        )
        .unwrap();
        Ok(buf)
    }
}
