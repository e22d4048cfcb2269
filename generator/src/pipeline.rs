// pipeline.rs — Pass orchestration and output assembly
//
// Runs a script through parse → execute → render and collects the rendered
// artifacts in memory. Nothing is written to disk here; the caller writes
// the artifacts only when the pipeline succeeds, so a fatal error never
// leaves partial output behind.
//
// Preconditions: none.
// Postconditions: on success, one artifact per requested output, each
//   starting with a provenance header.
// Failure modes: error-level diagnostics from any pass stop the pipeline
//   after that pass.
// Side effects: with `verbose`, prints pass timings to stderr.

use std::fmt::Write as _;
use std::time::Instant;

use serde::Serialize;

use crate::ast::Script;
use crate::backend::render_pattern;
use crate::diag::{codes, has_errors, DiagLevel, Diagnostic};
use crate::flow::render::{flow_file_name, render_flow};
use crate::flow::FlowFormat;
use crate::interp::{execute, ExecOutput};
use crate::sequence::GeneratorConfig;

// ── Passes ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    Parse,
    Execute,
    Render,
}

/// Static metadata about a pass.
pub struct PassDescriptor {
    /// Human-readable name for verbose output.
    pub name: &'static str,
    /// Passes whose outputs this pass consumes.
    pub inputs: &'static [PassId],
    pub produces: &'static str,
}

pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::Parse => PassDescriptor {
            name: "parse",
            inputs: &[],
            produces: "script AST",
        },
        PassId::Execute => PassDescriptor {
            name: "execute",
            inputs: &[PassId::Parse],
            produces: "patterns, flows and sheets",
        },
        PassId::Render => PassDescriptor {
            name: "render",
            inputs: &[PassId::Execute],
            produces: "output files",
        },
    }
}

// ── Options ────────────────────────────────────────────────────────────────

/// Which artifacts to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emit {
    /// Patterns, flows and sheets.
    All,
    Vectors,
    Flows,
    Sheets,
    /// One JSON document with everything generated.
    Json,
    /// Debug dump of the parsed script.
    Ast,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub config: GeneratorConfig,
    /// Overrides the platform's flow format when set.
    pub flow_format: Option<FlowFormat>,
    pub emit: Emit,
    pub verbose: bool,
}

impl PipelineOptions {
    pub fn new(config: GeneratorConfig) -> Self {
        PipelineOptions {
            config,
            flow_format: None,
            emit: Emit::All,
            verbose: false,
        }
    }

    pub fn flow_format(&self) -> FlowFormat {
        self.flow_format
            .unwrap_or(self.config.platform.profile().flow_format)
    }
}

// ── Provenance ─────────────────────────────────────────────────────────────

/// Identifies the run that produced an artifact.
#[derive(Debug, Clone)]
pub struct Provenance {
    /// SHA-256 of the script text.
    pub source_hash: [u8; 32],
    pub generator_version: &'static str,
}

impl Provenance {
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    /// Header lines written as comments at the top of every artifact.
    pub fn header(&self, config: &GeneratorConfig) -> Vec<String> {
        vec![
            format!("generated by vecgen {}", self.generator_version),
            format!("source sha256 {}", self.source_hash_hex()),
            format!("platform {}", config.platform),
        ]
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

pub fn compute_provenance(source: &str) -> Provenance {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    let result = hasher.finalize();
    let mut source_hash = [0u8; 32];
    source_hash.copy_from_slice(&result);

    Provenance {
        source_hash,
        generator_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Results ────────────────────────────────────────────────────────────────

/// One output file, not yet written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub contents: String,
}

#[derive(Debug)]
pub struct PipelineOutput {
    pub artifacts: Vec<Artifact>,
    /// Warnings collected along the way.
    pub diagnostics: Vec<Diagnostic>,
    pub provenance: Provenance,
}

/// The pipeline stopped because a pass reported errors.
#[derive(Debug)]
pub struct PipelineError {
    pub failing_pass: PassId,
    /// Every diagnostic up to and including the failing pass.
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    generator_version: &'a str,
    source_hash: String,
    config: &'a GeneratorConfig,
    patterns: &'a [crate::sequence::GeneratedPattern],
    flows: &'a [crate::flow::FinalizedFlow],
    instances: &'a [crate::flow::sheet::TestInstance],
    pattern_sets: &'a [crate::flow::sheet::PatternSet],
}

// ── Runner ─────────────────────────────────────────────────────────────────

fn finish_pass(
    pass_id: PassId,
    started: Instant,
    verbose: bool,
    all_diags: &mut Vec<Diagnostic>,
    diags: Vec<Diagnostic>,
) -> Result<(), PipelineError> {
    let failed = has_errors(&diags);
    all_diags.extend(diags);
    if verbose {
        eprintln!(
            "vecgen: {} complete, {:.1}ms",
            descriptor(pass_id).name,
            started.elapsed().as_secs_f64() * 1000.0
        );
    }
    log::debug!("pass {} finished", descriptor(pass_id).name);
    if failed {
        return Err(PipelineError {
            failing_pass: pass_id,
            diagnostics: std::mem::take(all_diags),
        });
    }
    Ok(())
}

/// Run every pass needed for `options.emit` over `source`.
pub fn run_pipeline(source: &str, options: &PipelineOptions) -> Result<PipelineOutput, PipelineError> {
    let provenance = compute_provenance(source);
    let header = provenance.header(&options.config);
    let mut diagnostics = Vec::new();

    // ── Parse ──
    let started = Instant::now();
    let parsed = crate::parser::parse(source);
    let mut parse_diags: Vec<Diagnostic> = parsed
        .errors
        .iter()
        .map(|e| {
            Diagnostic::new(DiagLevel::Error, e.to_string())
                .with_code(codes::E0001)
                .with_span(*e.span())
        })
        .collect();
    if parse_diags.is_empty() && parsed.script.is_none() {
        parse_diags.push(Diagnostic::new(DiagLevel::Error, "parse failed with no output").with_code(codes::E0001));
    }
    finish_pass(PassId::Parse, started, options.verbose, &mut diagnostics, parse_diags)?;
    let Some(script) = parsed.script else {
        return Err(PipelineError {
            failing_pass: PassId::Parse,
            diagnostics,
        });
    };

    if options.emit == Emit::Ast {
        return Ok(PipelineOutput {
            artifacts: vec![ast_artifact(&script)],
            diagnostics,
            provenance,
        });
    }

    // ── Execute ──
    let started = Instant::now();
    let result = execute(&script, &options.config);
    let output = result.output;
    finish_pass(PassId::Execute, started, options.verbose, &mut diagnostics, result.diagnostics)?;

    // ── Render ──
    let started = Instant::now();
    let mut render_diags = Vec::new();
    let artifacts = render(&output, options, &header, &provenance, &mut render_diags);
    finish_pass(PassId::Render, started, options.verbose, &mut diagnostics, render_diags)?;

    Ok(PipelineOutput {
        artifacts,
        diagnostics,
        provenance,
    })
}

fn ast_artifact(script: &Script) -> Artifact {
    Artifact {
        file_name: "ast.txt".to_string(),
        contents: format!("{script:#?}\n"),
    }
}

fn render(
    output: &ExecOutput,
    options: &PipelineOptions,
    header: &[String],
    provenance: &Provenance,
    diags: &mut Vec<Diagnostic>,
) -> Vec<Artifact> {
    let platform = options.config.platform;
    let mut artifacts = Vec::new();

    if matches!(options.emit, Emit::All | Emit::Vectors) {
        for pattern in &output.patterns {
            match render_pattern(platform, pattern, header) {
                Ok(contents) => artifacts.push(Artifact {
                    file_name: platform.pattern_file_name(&pattern.name),
                    contents,
                }),
                Err(err) => diags.push(
                    Diagnostic::new(DiagLevel::Error, format!("pattern '{}': {err}", pattern.name))
                        .with_code(codes::E0100),
                ),
            }
        }
    }

    if matches!(options.emit, Emit::All | Emit::Flows) {
        let format = options.flow_format();
        for flow in &output.flows {
            artifacts.push(Artifact {
                file_name: flow_file_name(&flow.name, format),
                contents: render_flow(flow, format, header),
            });
        }
    }

    if matches!(options.emit, Emit::All | Emit::Sheets) {
        if !output.instances.is_empty() {
            artifacts.push(Artifact {
                file_name: format!("{}.txt", output.instances.name),
                contents: with_header(header, output.instances.render()),
            });
        }
        if !output.patsets.is_empty() {
            artifacts.push(Artifact {
                file_name: format!("{}.txt", output.patsets.name),
                contents: with_header(header, output.patsets.render()),
            });
        }
    }

    if options.emit == Emit::Json {
        let doc = JsonDocument {
            generator_version: provenance.generator_version,
            source_hash: provenance.source_hash_hex(),
            config: &options.config,
            patterns: &output.patterns,
            flows: &output.flows,
            instances: output.instances.entries(),
            pattern_sets: output.patsets.entries(),
        };
        match serde_json::to_string_pretty(&doc) {
            Ok(mut contents) => {
                contents.push('\n');
                artifacts.push(Artifact {
                    file_name: "vecgen.json".to_string(),
                    contents,
                });
            }
            Err(err) => diags.push(
                Diagnostic::new(DiagLevel::Error, format!("JSON export failed: {err}"))
                    .with_code(codes::E0100),
            ),
        }
    }

    artifacts
}

fn with_header(header: &[String], body: String) -> String {
    let mut buf = String::new();
    for line in header {
        writeln!(buf, "# {line}").unwrap();
    }
    buf.push_str(&body);
    buf
}
