// command.rs — Command-based debuggers (JLink, BDM)
//
// These targets have no vector memory. A vector becomes a pin-set command
// (only when the driven levels change) followed by a sleep for the time
// the vector would have been held: repeat x period of its timeset.

use std::fmt::Write as _;

use super::{write_header, PatternRenderer};
use crate::emitter::PatternItem;
use crate::error::GenError;
use crate::pin::{PinRole, PinState};
use crate::sequence::GeneratedPattern;
use crate::time::Time;

pub(super) struct CommandRenderer {
    name: &'static str,
    set_pins: &'static str,
    sleep: &'static str,
    call: &'static str,
    comment: &'static str,
}

impl CommandRenderer {
    pub(super) fn jlink() -> Self {
        CommandRenderer {
            name: "jlink",
            set_pins: "SetPins",
            sleep: "Sleep",
            call: "exec",
            comment: "//",
        }
    }

    pub(super) fn bdm() -> Self {
        CommandRenderer {
            name: "bdm",
            set_pins: "pins",
            sleep: "delay",
            call: "call",
            comment: "//",
        }
    }

    fn period(&self, pattern: &GeneratedPattern, timeset: &str) -> Result<Time, GenError> {
        pattern
            .timesets
            .iter()
            .find(|t| t.name == timeset)
            .and_then(|t| t.period)
            .ok_or_else(|| GenError::Render {
                platform: self.name.to_string(),
                message: format!("timeset '{timeset}' has no period"),
            })
    }
}

fn pin_assignments(names: &[String], states: &[PinState]) -> Vec<String> {
    names
        .iter()
        .zip(states)
        .filter(|(_, s)| s.role() == PinRole::Drive && **s != PinState::DontCare)
        .map(|(n, s)| format!("{}={}", n, s.tester_char()))
        .collect()
}

impl PatternRenderer for CommandRenderer {
    fn render(&self, pattern: &GeneratedPattern, header: &[String]) -> Result<String, GenError> {
        let mut buf = String::new();
        write_header(&mut buf, self.comment, header);
        let mut last_drive: Option<Vec<String>> = None;

        for item in &pattern.items {
            match item {
                PatternItem::Vector(v) => {
                    if let Some(label) = &v.label {
                        writeln!(buf, "{} {label}:", self.comment).unwrap();
                    }
                    let drive = pin_assignments(&pattern.pins, &v.pins);
                    if last_drive.as_ref() != Some(&drive) && !drive.is_empty() {
                        writeln!(buf, "{} {}", self.set_pins, drive.join(" ")).unwrap();
                    }
                    last_drive = Some(drive);
                    if let Some(target) = &v.call {
                        writeln!(buf, "{} {target}", self.call).unwrap();
                    }
                    let held = self.period(pattern, &v.timeset)?.times(v.repeat);
                    writeln!(buf, "{} {}", self.sleep, held.as_ns()).unwrap();
                }
                PatternItem::Comment(text) => {
                    writeln!(buf, "{} {text}", self.comment).unwrap();
                }
                PatternItem::LoopStart { count, .. } => {
                    writeln!(buf, "repeat {count}").unwrap();
                }
                PatternItem::LoopEnd { .. } => {
                    writeln!(buf, "endrepeat").unwrap();
                }
            }
        }
        Ok(buf)
    }
}
