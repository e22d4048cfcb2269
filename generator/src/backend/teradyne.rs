// teradyne.rs — J750 / UltraFlex .atp vector tables

use std::fmt::Write as _;

use super::{state_chars, write_header, Platform, PatternRenderer};
use crate::emitter::{PatternItem, VectorRecord};
use crate::error::GenError;
use crate::sequence::GeneratedPattern;

pub(super) struct TeradyneRenderer {
    pub(super) platform: Platform,
}

fn microcode(v: &VectorRecord) -> String {
    if let Some(target) = &v.call {
        format!("call {target}")
    } else if v.store {
        "stv".to_string()
    } else if v.repeat > 1 {
        format!("repeat {}", v.repeat)
    } else {
        String::new()
    }
}

impl PatternRenderer for TeradyneRenderer {
    fn render(&self, pattern: &GeneratedPattern, header: &[String]) -> Result<String, GenError> {
        let profile = self.platform.profile();
        let mut buf = String::new();
        write_header(&mut buf, profile.comment, header);

        if !pattern.timesets.is_empty() {
            let names: Vec<&str> = pattern.timesets.iter().map(|t| t.name.as_str()).collect();
            writeln!(buf, "import tset {};", names.join(", ")).unwrap();
        }
        for sub in &pattern.imported_subroutines {
            writeln!(buf, "import svm_subr {sub};").unwrap();
        }
        writeln!(buf, "vector ($tset, {})", pattern.pins.join(", ")).unwrap();
        writeln!(buf, "{{").unwrap();
        writeln!(buf, "start_label {}_st:", pattern.name).unwrap();

        for item in &pattern.items {
            match item {
                PatternItem::Vector(v) => {
                    if let Some(max) = profile.max_repeat {
                        if v.repeat > max {
                            return Err(GenError::Render {
                                platform: profile.name.to_string(),
                                message: format!("repeat {} exceeds the limit of {}", v.repeat, max),
                            });
                        }
                    }
                    if let Some(label) = &v.label {
                        if pattern.defined_subroutines.contains(label) {
                            writeln!(buf, "global subr {label}:").unwrap();
                        } else {
                            writeln!(buf, "{label}:").unwrap();
                        }
                    }
                    let states: Vec<String> = state_chars(&v.pins).map(String::from).collect();
                    writeln!(
                        buf,
                        "{:<24}> {} {} ;",
                        microcode(v),
                        v.timeset,
                        states.join(" ")
                    )
                    .unwrap();
                }
                PatternItem::Comment(text) => {
                    writeln!(buf, "// {text}").unwrap();
                }
                PatternItem::LoopStart { label, count } => {
                    writeln!(buf, "{label}: set_loop_a {count} ;").unwrap();
                }
                PatternItem::LoopEnd { label } => {
                    writeln!(buf, "end_loop_a {label} ;").unwrap();
                }
            }
        }
        writeln!(buf, "}}").unwrap();
        Ok(buf)
    }
}
