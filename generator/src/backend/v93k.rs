// v93k.rs — SmarTest .avc vector files
//
// Vector groups are rendered in group units: a record of repeat n at group
// size g becomes `R<n/g>`, so n must be a multiple of g.

use std::fmt::Write as _;

use super::{state_chars, write_header, PatternRenderer, Platform};
use crate::emitter::PatternItem;
use crate::error::GenError;
use crate::sequence::GeneratedPattern;

pub(super) struct SmarTestRenderer;

impl PatternRenderer for SmarTestRenderer {
    fn render(&self, pattern: &GeneratedPattern, header: &[String]) -> Result<String, GenError> {
        let profile = Platform::V93K.profile();
        let mut buf = String::new();
        write_header(&mut buf, profile.comment, header);
        writeln!(buf, "FORMAT {};", pattern.pins.join(" ")).unwrap();

        for item in &pattern.items {
            match item {
                PatternItem::Vector(v) => {
                    let group = u64::from(v.group_size.max(1));
                    if v.repeat % group != 0 {
                        return Err(GenError::Render {
                            platform: profile.name.to_string(),
                            message: format!(
                                "repeat {} at cycle {} is not a multiple of vector group size {}",
                                v.repeat, v.start_cycle, group
                            ),
                        });
                    }
                    if let Some(label) = &v.label {
                        writeln!(buf, "# {label}:").unwrap();
                    }
                    if v.store {
                        writeln!(buf, "SQPG STVE;").unwrap();
                    }
                    if let Some(target) = &v.call {
                        writeln!(buf, "SQPG CALL {target};").unwrap();
                    }
                    let states: String = state_chars(&v.pins).collect();
                    writeln!(buf, "R{} {} {} ;", v.repeat / group, v.timeset, states).unwrap();
                }
                PatternItem::Comment(text) => {
                    writeln!(buf, "# {text}").unwrap();
                }
                PatternItem::LoopStart { label, count } => {
                    writeln!(buf, "SQPG LBGN {count}; # {label}").unwrap();
                }
                PatternItem::LoopEnd { .. } => {
                    writeln!(buf, "SQPG LEND;").unwrap();
                }
            }
        }
        Ok(buf)
    }
}
