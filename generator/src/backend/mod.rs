// backend/mod.rs — Tester platforms and pattern renderers
//
// Each platform has a profile (repeat ceiling, file extension, flow format)
// and a renderer that turns a `GeneratedPattern` into its native text.
// Renderers never reorder items and never change repeat counts; ceiling
// splitting has already happened in the emitter.
//
// Preconditions: the pattern was generated with this platform's ceiling.
// Postconditions: the returned text contains every item in emission order.
// Failure modes: `GenError::Render` when a pattern cannot be expressed.
// Side effects: none.

mod command;
mod doc;
mod teradyne;
mod v93k;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::GenError;
use crate::flow::FlowFormat;
use crate::pin::PinState;
use crate::sequence::GeneratedPattern;

/// Repeat ceiling of the Teradyne testers (16-bit repeat field).
pub const TERADYNE_MAX_REPEAT: u64 = 65_535;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Platform {
    J750,
    UltraFlex,
    V93K,
    JLink,
    Bdm,
    Doc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendProfile {
    pub name: &'static str,
    pub max_repeat: Option<u64>,
    pub extension: &'static str,
    /// Renders microcode commands instead of a vector table.
    pub command_based: bool,
    pub flow_format: FlowFormat,
    /// Line-comment prefix in rendered patterns.
    pub comment: &'static str,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::J750,
        Platform::UltraFlex,
        Platform::V93K,
        Platform::JLink,
        Platform::Bdm,
        Platform::Doc,
    ];

    pub fn profile(self) -> BackendProfile {
        match self {
            Platform::J750 => BackendProfile {
                name: "j750",
                max_repeat: Some(TERADYNE_MAX_REPEAT),
                extension: "atp",
                command_based: false,
                flow_format: FlowFormat::Tabular,
                comment: "//",
            },
            Platform::UltraFlex => BackendProfile {
                name: "ultraflex",
                max_repeat: Some(TERADYNE_MAX_REPEAT),
                extension: "atp",
                command_based: false,
                flow_format: FlowFormat::Tabular,
                comment: "//",
            },
            Platform::V93K => BackendProfile {
                name: "v93k",
                max_repeat: None,
                extension: "avc",
                command_based: false,
                flow_format: FlowFormat::Yaml,
                comment: "#",
            },
            Platform::JLink => BackendProfile {
                name: "jlink",
                max_repeat: None,
                extension: "jlk",
                command_based: true,
                flow_format: FlowFormat::Yaml,
                comment: "//",
            },
            Platform::Bdm => BackendProfile {
                name: "bdm",
                max_repeat: None,
                extension: "bdm",
                command_based: true,
                flow_format: FlowFormat::Yaml,
                comment: "//",
            },
            Platform::Doc => BackendProfile {
                name: "doc",
                max_repeat: None,
                extension: "txt",
                command_based: false,
                flow_format: FlowFormat::Yaml,
                comment: "#",
            },
        }
    }

    pub fn pattern_file_name(self, pattern: &str) -> String {
        format!("{}.{}", pattern, self.profile().extension)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.profile().name)
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.profile().name.eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<&str> = Platform::ALL.iter().map(|p| p.profile().name).collect();
                format!("unknown platform '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

/// A pattern serializer for one platform.
pub trait PatternRenderer {
    /// Render `pattern`. `header` lines are written first as comments.
    fn render(&self, pattern: &GeneratedPattern, header: &[String]) -> Result<String, GenError>;
}

pub fn renderer(platform: Platform) -> Box<dyn PatternRenderer> {
    match platform {
        Platform::J750 | Platform::UltraFlex => Box::new(teradyne::TeradyneRenderer { platform }),
        Platform::V93K => Box::new(v93k::SmarTestRenderer),
        Platform::JLink => Box::new(command::CommandRenderer::jlink()),
        Platform::Bdm => Box::new(command::CommandRenderer::bdm()),
        Platform::Doc => Box::new(doc::DocRenderer),
    }
}

pub fn render_pattern(
    platform: Platform,
    pattern: &GeneratedPattern,
    header: &[String],
) -> Result<String, GenError> {
    log::debug!("rendering pattern '{}' for {}", pattern.name, platform);
    renderer(platform).render(pattern, header)
}

pub(crate) fn state_chars(pins: &[PinState]) -> impl Iterator<Item = char> + '_ {
    pins.iter().map(|s| s.tester_char())
}

pub(crate) fn write_header(buf: &mut String, comment: &str, header: &[String]) {
    use std::fmt::Write as _;
    for line in header {
        writeln!(buf, "{comment} {line}").unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_platform_names() {
        assert_eq!("J750".parse::<Platform>(), Ok(Platform::J750));
        assert_eq!("ultraflex".parse::<Platform>(), Ok(Platform::UltraFlex));
        assert_eq!("v93k".parse::<Platform>(), Ok(Platform::V93K));
        assert!("sapphire".parse::<Platform>().is_err());
    }

    #[test]
    fn profiles() {
        assert_eq!(Platform::J750.profile().max_repeat, Some(65_535));
        assert_eq!(Platform::V93K.profile().max_repeat, None);
        assert!(Platform::JLink.profile().command_based);
        assert_eq!(Platform::UltraFlex.profile().flow_format, FlowFormat::Tabular);
        assert_eq!(Platform::V93K.pattern_file_name("erase"), "erase.avc");
    }
}
