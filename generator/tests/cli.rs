// Command-line tests for the vecgen binary.
//
// Each test writes a script into its own scratch directory, runs the
// binary, and checks exit status plus the files left behind.

use std::path::PathBuf;
use std::process::{Command, Output};
use std::sync::atomic::{AtomicUsize, Ordering};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

const SCRIPT: &str = "\
pins tdi, tdo
pattern erase_all {
  timeset tp 100ns
  drive tdi 1
  cycle 10
  compare tdo 0
  wait 1us
}
flow sort1 {
  test erase_all_test bin=3
}
instance erase_all_test pattern=erase_all
patset nvm erase_all
";

fn vecgen_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_vecgen"))
}

fn scratch_dir(tag: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!("vecgen_cli_{}_{}_{}", tag, std::process::id(), n));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn run(dir: &PathBuf, source: &str, args: &[&str]) -> Output {
    let script = dir.join("program.vg");
    std::fs::write(&script, source).unwrap();
    Command::new(vecgen_binary())
        .arg(&script)
        .arg("-o")
        .arg(dir.join("out"))
        .args(args)
        .output()
        .expect("failed to run vecgen")
}

#[test]
fn writes_all_outputs() {
    let dir = scratch_dir("all");
    let output = run(&dir, SCRIPT, &[]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let out = dir.join("out");
    for name in ["erase_all.atp", "sort1.txt", "instances.txt", "patsets.txt"] {
        assert!(out.join(name).exists(), "missing {name}");
    }
    let atp = std::fs::read_to_string(out.join("erase_all.atp")).unwrap();
    assert!(atp.contains("repeat 10"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn platform_selects_the_file_format() {
    let dir = scratch_dir("v93k");
    let output = run(&dir, SCRIPT, &["--platform", "v93k"]);
    assert!(output.status.success());
    let out = dir.join("out");
    assert!(out.join("erase_all.avc").exists());
    assert!(out.join("sort1.yaml").exists());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn identical_runs_write_identical_files() {
    let dir = scratch_dir("repro");
    assert!(run(&dir, SCRIPT, &[]).status.success());
    let first = std::fs::read_to_string(dir.join("out/erase_all.atp")).unwrap();
    assert!(run(&dir, SCRIPT, &[]).status.success());
    let second = std::fs::read_to_string(dir.join("out/erase_all.atp")).unwrap();
    assert_eq!(first, second);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn parse_error_exits_with_one_and_writes_nothing() {
    let dir = scratch_dir("parse");
    let output = run(&dir, "pattern broken {\n  cycle 1\n", &[]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("E0001"), "stderr: {stderr}");
    assert!(!dir.join("out").exists());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn generation_error_reports_its_location() {
    let dir = scratch_dir("exec");
    let output = run(&dir, "pins tdi\npattern p {\n  cycle 1\n}\n", &[]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("program.vg:3:3: "), "stderr: {stderr}");
    assert!(!dir.join("out").exists());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_source_exits_with_two() {
    let output = Command::new(vecgen_binary())
        .arg("/nonexistent/vecgen/program.vg")
        .output()
        .expect("failed to run vecgen");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn emit_ast_prints_to_stdout() {
    let dir = scratch_dir("ast");
    let output = run(&dir, SCRIPT, &["--emit", "ast"]);
    assert!(output.status.success());
    assert!(!output.stdout.is_empty());
    assert!(!dir.join("out").exists());
    let _ = std::fs::remove_dir_all(&dir);
}
