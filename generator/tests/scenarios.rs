// End-to-end generation scenarios through the library API.
//
// Each test drives a `SequenceController` or `FlowBuilder` the way pattern
// and program source would, then checks the emitted records or flow rows.

use vecgen::backend::{render_pattern, Platform};
use vecgen::error::GenError;
use vecgen::diag::codes;
use vecgen::emitter::VectorRecord;
use vecgen::flow::{Column, FlowBuilder, FlowOp};
use vecgen::pin::{PinState, PinTable};
use vecgen::sequence::{CycleOptions, GeneratedPattern, GeneratorConfig, SequenceController};
use vecgen::threads::ThreadSet;
use vecgen::time::{Frequency, Rounding, Time};

// ── Helpers ─────────────────────────────────────────────────────────────────

fn pins(names: &[&str]) -> PinTable {
    let mut table = PinTable::new();
    for name in names {
        table.add(name).unwrap();
    }
    table
}

fn controller(platform: Platform, names: &[&str]) -> SequenceController {
    SequenceController::new("scenario", pins(names), GeneratorConfig::new(platform))
}

fn records(pattern: &GeneratedPattern) -> Vec<&VectorRecord> {
    pattern.vectors().collect()
}

// ── Scenario 1: clock slicing ──────────────────────────────────────────────

#[test]
fn clock_at_2mhz_slices_a_100_cycle_repeat() {
    let mut ctrl = controller(Platform::J750, &["tclk", "tdi"]);
    ctrl.set_timeset("tp0", Some(Time::from_ns(40.0))).unwrap();
    ctrl.enable_clock("tclk", Frequency::from_mhz(2.0)).unwrap();
    ctrl.start_clock("tclk").unwrap();
    ctrl.cycle_with(CycleOptions::repeat(100)).unwrap();
    let pattern = ctrl.finish();

    // 250ns half period over a 40ns cycle is 6.25, quantized to 6.
    let recs = records(&pattern);
    assert_eq!(pattern.total_repeat(), 100);
    assert_eq!(recs.len(), 17);
    for (i, rec) in recs.iter().enumerate() {
        assert_eq!(rec.start_cycle, 6 * i as u64);
        let expected = if i < 16 { 6 } else { 4 };
        assert_eq!(rec.repeat, expected);
    }
    // The clock pin alternates low/high between slices.
    for pair in recs.windows(2) {
        assert_ne!(pair[0].pins[0], pair[1].pins[0]);
        assert_eq!(pair[0].pins[1], pair[1].pins[1]);
    }
    assert_eq!(recs[0].pins[0], PinState::Drive0);
    assert!(pattern
        .warnings
        .iter()
        .any(|d| d.code == Some(codes::W0101)));
}

// ── Scenario 2: wait conversion per timeset ─────────────────────────────────

#[test]
fn waits_convert_with_the_active_period() {
    let mut ctrl = controller(Platform::J750, &["tdi"]);
    ctrl.set_timeset("nvm_slow", Some(Time::from_ns(200.0))).unwrap();
    ctrl.wait(Time::from_ns(1000.0)).unwrap();
    assert_eq!(ctrl.cycle_count(), 5);

    ctrl.set_timeset("nvm_fast", Some(Time::from_ns(40.0))).unwrap();
    ctrl.wait(Time::from_ns(1000.0)).unwrap();
    assert_eq!(ctrl.cycle_count(), 30);

    let pattern = ctrl.finish();
    let recs = records(&pattern);
    assert_eq!((recs[0].repeat, recs[0].timeset.as_str()), (5, "nvm_slow"));
    assert_eq!((recs[1].repeat, recs[1].timeset.as_str()), (25, "nvm_fast"));
}

// ── Scenario 3: backend repeat ceiling ─────────────────────────────────────

#[test]
fn long_repeat_splits_under_the_j750_ceiling() {
    let mut ctrl = controller(Platform::J750, &["tdi"]);
    ctrl.set_timeset("tp0", Some(Time::from_ns(40.0))).unwrap();
    ctrl.cycle_with(CycleOptions::repeat(240_000)).unwrap();
    let pattern = ctrl.finish();

    let repeats: Vec<u64> = pattern.vectors().map(|v| v.repeat).collect();
    assert_eq!(repeats, vec![60_000; 4]);
    assert_eq!(repeats.iter().sum::<u64>(), 240_000);
}

#[test]
fn v93k_has_no_ceiling() {
    let mut ctrl = controller(Platform::V93K, &["tdi"]);
    ctrl.set_timeset("tp0", Some(Time::from_ns(40.0))).unwrap();
    ctrl.cycle_with(CycleOptions::repeat(240_000)).unwrap();
    assert_eq!(ctrl.finish().vectors().count(), 1);
}

// ── Scenario 4: logical threads and barrier ────────────────────────────────

#[test]
fn threads_synchronize_before_main_sequence_continues() {
    let mut ctrl = controller(Platform::J750, &["tdi", "tdo"]);
    ctrl.set_timeset("tp0", Some(Time::from_us(1.0))).unwrap();

    let mut set = ThreadSet::new();
    set.thread("th1")
        .wait(Time::from_ms(10.0))
        .wait(Time::from_ms(10.0));
    set.thread("th2").wait(Time::from_ms(20.0));
    ctrl.run_threads(&set).unwrap();
    assert_eq!(ctrl.cycle_count(), 20_000);

    ctrl.wait(Time::from_ms(5.0)).unwrap();
    assert_eq!(ctrl.cycle_count(), 25_000);
    assert_eq!(ctrl.finish().total_repeat(), 25_000);
}

#[test]
fn thread_pin_changes_land_at_their_cycle() {
    let mut ctrl = controller(Platform::J750, &["tdi", "tdo"]);
    ctrl.set_timeset("tp0", Some(Time::from_us(1.0))).unwrap();

    let mut set = ThreadSet::new();
    set.thread("th1")
        .set("tdi", PinState::Drive1)
        .wait(Time::from_ms(10.0));
    set.thread("th2")
        .wait(Time::from_ms(4.0))
        .set("tdo", PinState::Compare1)
        .wait(Time::from_ms(16.0));
    ctrl.run_threads(&set).unwrap();
    let pattern = ctrl.finish();

    let recs = records(&pattern);
    assert_eq!(recs.len(), 2);
    assert_eq!((recs[0].start_cycle, recs[0].repeat), (0, 4_000));
    assert_eq!(recs[0].pins, vec![PinState::Drive1, PinState::DontCare]);
    assert_eq!((recs[1].start_cycle, recs[1].repeat), (4_000, 16_000));
    assert_eq!(recs[1].pins, vec![PinState::Drive1, PinState::Compare1]);
}

// ── Scenario 5: flow relationships ─────────────────────────────────────────

#[test]
fn if_passed_links_two_flow_lines() {
    let mut flow = FlowBuilder::new("sort1");
    flow.add(FlowOp::Test, "A", [("id", "x")]).unwrap();
    flow.add(FlowOp::Test, "B", [("if_passed", "x")]).unwrap();
    let (flow, warnings) = flow.finalize().unwrap();
    assert!(warnings.is_empty());

    let a = &flow.lines[0];
    assert_eq!(a.get(Column::FlagPass), Some("x_PASSED"));
    assert_eq!(a.get(Column::Result), Some("None"));

    let b = &flow.lines[1];
    assert_eq!(b.get(Column::DeviceCondition), Some("flag-true"));
    assert_eq!(b.get(Column::DeviceName), Some("x_PASSED"));
    assert_eq!(b.get(Column::DeviceSense), Some(""));
}

// ── Scenario 6: sub-cycle waits ────────────────────────────────────────────

#[test]
fn sub_period_wait_rounds_up_by_default() {
    let mut ctrl = controller(Platform::J750, &["tdi"]);
    ctrl.set_timeset("slow", Some(Time::from_ms(100.0))).unwrap();
    ctrl.wait(Time::from_ms(99.0)).unwrap();
    assert_eq!(ctrl.cycle_count(), 1);
}

#[test]
fn sub_period_wait_is_dropped_when_truncating() {
    let mut config = GeneratorConfig::new(Platform::J750);
    config.wait_rounding = Rounding::Truncate;
    let mut ctrl = SequenceController::new("scenario", pins(&["tdi"]), config);
    ctrl.set_timeset("slow", Some(Time::from_ms(100.0))).unwrap();
    ctrl.wait(Time::from_ms(99.0)).unwrap();
    assert_eq!(ctrl.cycle_count(), 0);
    assert_eq!(ctrl.finish().vectors().count(), 0);
}

// ── Scoped restore on error ────────────────────────────────────────────────

#[test]
fn failing_scopes_restore_state() {
    let mut ctrl = controller(Platform::J750, &["tdi", "tdo"]);
    ctrl.set_timeset("outer", Some(Time::from_ns(100.0))).unwrap();
    ctrl.compare("tdo", true).unwrap();

    let err = ctrl.with_timeset("inner", Some(Time::from_ns(10.0)), |c| {
        c.ignore_fails(&["tdo"], |c| c.inhibit_vectors_and_comments(|c| c.drive("nope", true)))
    });
    assert!(err.is_err());

    assert_eq!(ctrl.timesets().current().map(|t| t.name.as_str()), Some("outer"));
    ctrl.cycle().unwrap();
    let pattern = ctrl.finish();
    let recs = records(&pattern);
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].pins[1], PinState::Compare1);
    assert_eq!(recs[0].timeset, "outer");
}

// ── Vector groups on V93K ──────────────────────────────────────────────────

#[test]
fn grouped_store_renders_on_v93k() {
    let mut ctrl = controller(Platform::V93K, &["tdi"]);
    ctrl.set_timeset("tp0", Some(Time::from_ns(40.0))).unwrap();
    ctrl.set_vector_group_size(2).unwrap();
    ctrl.store_next_cycle().unwrap();
    ctrl.cycle_with(CycleOptions::repeat(4)).unwrap();
    let pattern = ctrl.finish();

    let repeats: Vec<u64> = pattern.vectors().map(|v| v.repeat).collect();
    assert_eq!(repeats, vec![2, 2]);
    let text = render_pattern(Platform::V93K, &pattern, &[]).unwrap();
    assert!(text.contains("SQPG STVE;\nR1 tp0 X ;\nR1 tp0 X ;\n"), "{text}");
}

#[test]
fn grouped_clock_renders_on_v93k() {
    let mut ctrl = controller(Platform::V93K, &["tclk", "tdi"]);
    ctrl.set_timeset("tp0", Some(Time::from_ns(40.0))).unwrap();
    ctrl.set_vector_group_size(2).unwrap();
    ctrl.enable_clock("tclk", Frequency::from_mhz(2.0)).unwrap();
    ctrl.start_clock("tclk").unwrap();
    ctrl.cycle_with(CycleOptions::repeat(12)).unwrap();
    let pattern = ctrl.finish();

    let repeats: Vec<u64> = pattern.vectors().map(|v| v.repeat).collect();
    assert_eq!(repeats, vec![6, 6]);
    let text = render_pattern(Platform::V93K, &pattern, &[]).unwrap();
    assert!(text.ends_with("R3 tp0 0X ;\nR3 tp0 1X ;\n"), "{text}");
}

#[test]
fn clock_that_splits_a_group_is_rejected() {
    let mut ctrl = controller(Platform::V93K, &["tclk", "tdi"]);
    ctrl.set_timeset("tp0", Some(Time::from_ns(40.0))).unwrap();
    ctrl.set_vector_group_size(4).unwrap();
    ctrl.enable_clock("tclk", Frequency::from_mhz(2.0)).unwrap();
    let expected = GenError::ClockGroupMismatch {
        pin: "tclk".to_string(),
        half_period: 6,
        group_size: 4,
    };
    assert_eq!(ctrl.start_clock("tclk"), Err(expected.clone()));

    // Raising the group size under a running clock is rejected the same way.
    ctrl.set_vector_group_size(2).unwrap();
    ctrl.start_clock("tclk").unwrap();
    assert_eq!(ctrl.set_vector_group_size(4), Err(expected));
    assert_eq!(ctrl.vector_group_size(), 2);
}
