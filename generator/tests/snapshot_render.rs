// Snapshot tests for the pattern renderers.
//
// One fixed pattern (comment, labelled vector, loop, subroutine call,
// store) is rendered for every platform family so that formatting changes
// show up as snapshot diffs.

use vecgen::backend::{render_pattern, Platform};
use vecgen::emitter::{PatternItem, VectorRecord};
use vecgen::error::GenError;
use vecgen::pin::PinState::{self, *};
use vecgen::sequence::GeneratedPattern;
use vecgen::time::Time;
use vecgen::timeset::Timeset;

// ── Fixture ─────────────────────────────────────────────────────────────────

fn vector(pins: [PinState; 3], repeat: u64, start_cycle: u64) -> VectorRecord {
    VectorRecord {
        pins: pins.to_vec(),
        repeat,
        timeset: "tp0".to_string(),
        call: None,
        store: false,
        label: None,
        group_size: 1,
        start_cycle,
    }
}

fn sample() -> GeneratedPattern {
    let mut first = vector([Drive0, Drive1, DontCare], 1, 0);
    first.label = Some("begin".to_string());
    let mut call = vector([Drive0, Drive0, Compare0], 1, 5);
    call.call = Some("wait_done".to_string());
    let mut stored = vector([Drive0, Drive0, CompareX], 2, 6);
    stored.store = true;

    GeneratedPattern {
        name: "erase".to_string(),
        pins: vec!["tclk".to_string(), "tdi".to_string(), "tdo".to_string()],
        items: vec![
            PatternItem::Comment("setup".to_string()),
            PatternItem::Vector(first),
            PatternItem::LoopStart {
                label: "lp".to_string(),
                count: 3,
            },
            PatternItem::Vector(vector([Drive1, Drive0, Compare1], 4, 1)),
            PatternItem::LoopEnd {
                label: "lp".to_string(),
            },
            PatternItem::Vector(call),
            PatternItem::Vector(stored),
        ],
        timesets: vec![Timeset {
            name: "tp0".to_string(),
            period: Some(Time::from_ns(40.0)),
            waves: Vec::new(),
        }],
        imported_subroutines: vec!["wait_done".to_string()],
        defined_subroutines: Vec::new(),
        cycles: 8,
        executed_cycles: 16,
        warnings: Vec::new(),
    }
}

fn render(platform: Platform) -> String {
    render_pattern(platform, &sample(), &["generated".to_string()]).unwrap()
}

// ── Vector tables ───────────────────────────────────────────────────────────

#[test]
fn j750_atp() {
    insta::assert_snapshot!(render(Platform::J750), @r"
    // generated
    import tset tp0;
    import svm_subr wait_done;
    vector ($tset, tclk, tdi, tdo)
    {
    start_label erase_st:
    // setup
    begin:
                            > tp0 0 1 X ;
    lp: set_loop_a 3 ;
    repeat 4                > tp0 1 0 H ;
    end_loop_a lp ;
    call wait_done          > tp0 0 0 L ;
    stv                     > tp0 0 0 X ;
    }
    ");
}

#[test]
fn ultraflex_matches_j750_body() {
    assert_eq!(render(Platform::UltraFlex), render(Platform::J750));
}

#[test]
fn v93k_avc() {
    insta::assert_snapshot!(render(Platform::V93K), @r"
    # generated
    FORMAT tclk tdi tdo;
    # setup
    # begin:
    R1 tp0 01X ;
    SQPG LBGN 3; # lp
    R4 tp0 10H ;
    SQPG LEND;
    SQPG CALL wait_done;
    R1 tp0 00L ;
    SQPG STVE;
    R2 tp0 00X ;
    ");
}

#[test]
fn v93k_rejects_partial_vector_groups() {
    let mut pattern = sample();
    for item in &mut pattern.items {
        if let PatternItem::Vector(v) = item {
            v.group_size = 2;
        }
    }
    let err = render_pattern(Platform::V93K, &pattern, &[]).unwrap_err();
    match err {
        GenError::Render { platform, message } => {
            assert_eq!(platform, "v93k");
            assert!(message.contains("not a multiple of vector group size 2"));
        }
        other => panic!("expected a render error, got {other:?}"),
    }
}

#[test]
fn j750_rejects_repeats_over_the_ceiling() {
    let mut pattern = sample();
    pattern.items = vec![PatternItem::Vector(vector([Drive0, Drive0, DontCare], 70_000, 0))];
    assert!(render_pattern(Platform::J750, &pattern, &[]).is_err());
}

// ── Listing ─────────────────────────────────────────────────────────────────

#[test]
fn doc_listing() {
    insta::assert_snapshot!(render(Platform::Doc), @r"
    # generated
    pattern erase
    pins tclk tdi tdo
    timeset tp0 40ns
    # setup
           0  tp0  01X  x1  label=begin
    loop lp x3 {
             1  tp0  10H  x4
    }
           5  tp0  00L  x1  call=wait_done
           6  tp0  00X  x2  store
    total 8 cycles (16 executed)
    ");
}

// ── Command targets ─────────────────────────────────────────────────────────

#[test]
fn jlink_commands() {
    insta::assert_snapshot!(render(Platform::JLink), @r"
    // generated
    // setup
    // begin:
    SetPins tclk=0 tdi=1
    Sleep 40
    repeat 3
    SetPins tclk=1 tdi=0
    Sleep 160
    endrepeat
    SetPins tclk=0 tdi=0
    exec wait_done
    Sleep 40
    Sleep 80
    ");
}

#[test]
fn bdm_uses_its_own_verbs() {
    let text = render(Platform::Bdm);
    assert!(text.contains("\npins tclk=0 tdi=1\n"));
    assert!(text.contains("\ncall wait_done\n"));
    assert!(text.ends_with("delay 80\n"));
}

#[test]
fn command_targets_need_a_period() {
    let mut pattern = sample();
    pattern.timesets[0].period = None;
    assert!(render_pattern(Platform::JLink, &pattern, &[]).is_err());
}
