use clap::Parser;
use std::path::{Path, PathBuf};

use vecgen::backend::Platform;
use vecgen::diag::Diagnostic;
use vecgen::flow::FlowFormat;
use vecgen::pipeline::{run_pipeline, Emit, PipelineOptions};
use vecgen::sequence::GeneratorConfig;
use vecgen::time::Rounding;

#[derive(Debug, Clone, clap::ValueEnum)]
enum EmitStage {
    All,
    Vectors,
    Flows,
    Sheets,
    Json,
    Ast,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum WaitRounding {
    Ceil,
    Truncate,
}

#[derive(Parser, Debug)]
#[command(
    name = "vecgen",
    version,
    about = "vecgen — compiles pattern scripts into ATE vector files, flow sheets and instance sheets"
)]
struct Cli {
    /// Input pattern script
    source: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Target tester platform (j750, ultraflex, v93k, jlink, bdm, doc)
    #[arg(short, long, default_value = "j750")]
    platform: Platform,

    /// Outputs to produce
    #[arg(long, value_enum, default_value_t = EmitStage::All)]
    emit: EmitStage,

    /// Override the platform's maximum repeat per vector
    #[arg(long)]
    max_repeat: Option<u64>,

    /// How waits that are not a whole number of cycles are converted
    #[arg(long, value_enum, default_value_t = WaitRounding::Ceil)]
    wait_rounding: WaitRounding,

    /// Initial vector group size
    #[arg(long, default_value_t = 1)]
    group_size: u32,

    /// Flow sheet format (tabular, yaml); defaults to the platform's
    #[arg(long)]
    flow_format: Option<FlowFormat>,

    /// Print passes and timing
    #[arg(long)]
    verbose: bool,
}

/// `path:line:col: ` prefix for diagnostics that carry a span.
fn location(path: &Path, source: &str, diag: &Diagnostic) -> String {
    let Some(span) = diag.span else {
        return String::new();
    };
    let before = &source[..span.start.min(source.len())];
    let line = before.matches('\n').count() + 1;
    let col = before.len() - before.rfind('\n').map_or(0, |i| i + 1) + 1;
    format!("{}:{}:{}: ", path.display(), line, col)
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        eprintln!("vecgen: source   = {}", cli.source.display());
        eprintln!("vecgen: output   = {}", cli.output.display());
        eprintln!("vecgen: platform = {}", cli.platform);
        eprintln!("vecgen: emit     = {:?}", cli.emit);
    }

    if cli.group_size == 0 {
        eprintln!("vecgen: error: --group-size must be at least 1");
        std::process::exit(2);
    }

    let mut config = GeneratorConfig::new(cli.platform);
    config.max_repeat = cli.max_repeat;
    config.group_size = cli.group_size;
    config.wait_rounding = match cli.wait_rounding {
        WaitRounding::Ceil => Rounding::Ceil,
        WaitRounding::Truncate => Rounding::Truncate,
    };

    let mut options = PipelineOptions::new(config);
    options.flow_format = cli.flow_format;
    options.verbose = cli.verbose;
    options.emit = match cli.emit {
        EmitStage::All => Emit::All,
        EmitStage::Vectors => Emit::Vectors,
        EmitStage::Flows => Emit::Flows,
        EmitStage::Sheets => Emit::Sheets,
        EmitStage::Json => Emit::Json,
        EmitStage::Ast => Emit::Ast,
    };

    // ── Read source ──
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("vecgen: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };

    // ── Run passes ──
    let output = match run_pipeline(&source, &options) {
        Ok(output) => output,
        Err(err) => {
            for diag in &err.diagnostics {
                eprintln!("vecgen: {}{}", location(&cli.source, &source, diag), diag);
            }
            std::process::exit(1);
        }
    };
    for diag in &output.diagnostics {
        eprintln!("vecgen: {}{}", location(&cli.source, &source, diag), diag);
    }

    if options.emit == Emit::Ast {
        for artifact in &output.artifacts {
            print!("{}", artifact.contents);
        }
        return;
    }

    // ── Write outputs ──
    if let Err(e) = std::fs::create_dir_all(&cli.output) {
        eprintln!("vecgen: error: {}: {}", cli.output.display(), e);
        std::process::exit(2);
    }
    for artifact in &output.artifacts {
        let path = cli.output.join(&artifact.file_name);
        if let Err(e) = std::fs::write(&path, &artifact.contents) {
            eprintln!("vecgen: error: {}: {}", path.display(), e);
            std::process::exit(2);
        }
        if cli.verbose {
            eprintln!("vecgen: wrote {}", path.display());
        }
    }
}
