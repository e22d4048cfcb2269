// sequence.rs — Pattern-source API and sequence control
//
// `SequenceController` is what pattern code talks to. It owns the pin
// table, timeset registry, clock tracker and emitter for one pattern, and
// layers the pattern-level features on top of raw emission: one-shot
// directives (store, label), subroutine calls, hardware loops, compare
// masking, inhibition and vector grouping.
//
// Scoped operations take a closure and restore their state after it runs,
// also when it returns an error.
//
// Preconditions: pins are declared before the controller is created.
// Postconditions: `finish` returns every emitted item in emission order.
// Failure modes: see `GenError`; warnings are collected as diagnostics.
// Side effects: warnings are also logged through `log::warn!`.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::backend::Platform;
use crate::clock::{ClockTracker, Quantized};
use crate::diag::{codes, Diagnostic};
use crate::emitter::{CycleDirectives, PatternItem, VectorEmitter};
use crate::error::GenError;
use crate::id::PinId;
use crate::pin::{PinState, PinTable};
use crate::threads::ThreadSet;
use crate::time::{Frequency, Rounding, Time};
use crate::timeset::{Timeset, TimesetRegistry};

// ── Configuration ───────────────────────────────────────────────────────────

/// Generation settings shared by every pattern of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratorConfig {
    pub platform: Platform,
    /// Overrides the platform's repeat ceiling when set.
    pub max_repeat: Option<u64>,
    pub wait_rounding: Rounding,
    /// Initial vector group size for new patterns.
    pub group_size: u32,
}

impl GeneratorConfig {
    pub fn new(platform: Platform) -> Self {
        GeneratorConfig {
            platform,
            max_repeat: None,
            wait_rounding: Rounding::Ceil,
            group_size: 1,
        }
    }

    /// Largest repeat a single record may carry.
    pub fn ceiling(&self) -> Option<u64> {
        self.max_repeat.or(self.platform.profile().max_repeat)
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::new(Platform::J750)
    }
}

// ── Per-call options and state ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleOptions {
    /// Defaults to 1.
    pub repeat: Option<u64>,
    /// Emit under this timeset instead of the active one.
    pub timeset: Option<String>,
}

impl CycleOptions {
    pub fn repeat(n: u64) -> Self {
        CycleOptions {
            repeat: Some(n),
            timeset: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Generating,
    /// Depth of vector+comment inhibition and of comment-only inhibition.
    Suspended { vectors: u32, comments: u32 },
}

/// Everything a backend needs to render one pattern.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedPattern {
    pub name: String,
    pub pins: Vec<String>,
    pub items: Vec<PatternItem>,
    /// Timesets referenced by emitted vectors, in first-use order.
    pub timesets: Vec<Timeset>,
    pub imported_subroutines: Vec<String>,
    pub defined_subroutines: Vec<String>,
    /// Cycles written to the pattern (loop bodies counted once).
    pub cycles: u64,
    /// Cycles the tester executes (loop bodies multiplied out).
    pub executed_cycles: u64,
    #[serde(skip)]
    pub warnings: Vec<Diagnostic>,
}

impl GeneratedPattern {
    pub fn vectors(&self) -> impl Iterator<Item = &crate::emitter::VectorRecord> {
        self.items.iter().filter_map(|i| match i {
            PatternItem::Vector(v) => Some(v),
            _ => None,
        })
    }

    pub fn total_repeat(&self) -> u64 {
        self.vectors().map(|v| v.repeat).sum()
    }
}

// ── Controller ──────────────────────────────────────────────────────────────

pub struct SequenceController {
    name: String,
    config: GeneratorConfig,
    pins: PinTable,
    timesets: TimesetRegistry,
    clocks: ClockTracker,
    emitter: VectorEmitter,
    started: bool,
    pending_store: bool,
    pending_label: Option<String>,
    group_size: u32,
    vector_inhibit: u32,
    comment_inhibit: u32,
    loop_multiplier: u64,
    executed_cycles: u64,
    referenced_subs: BTreeSet<String>,
    defined_subs: BTreeSet<String>,
    used_timesets: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

impl SequenceController {
    pub fn new(name: &str, pins: PinTable, config: GeneratorConfig) -> Self {
        let group_size = config.group_size.max(1);
        let emitter = VectorEmitter::new(config.ceiling());
        SequenceController {
            name: name.to_string(),
            config,
            pins,
            timesets: TimesetRegistry::new(),
            clocks: ClockTracker::new(),
            emitter,
            started: false,
            pending_store: false,
            pending_label: None,
            group_size,
            vector_inhibit: 0,
            comment_inhibit: 0,
            loop_multiplier: 1,
            executed_cycles: 0,
            referenced_subs: BTreeSet::new(),
            defined_subs: BTreeSet::new(),
            used_timesets: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn pins(&self) -> &PinTable {
        &self.pins
    }

    pub fn timesets(&self) -> &TimesetRegistry {
        &self.timesets
    }

    pub fn clocks(&self) -> &ClockTracker {
        &self.clocks
    }

    pub fn items(&self) -> &[PatternItem] {
        self.emitter.items()
    }

    /// Absolute cycle of the next emission.
    pub fn cycle_count(&self) -> u64 {
        self.emitter.cycle()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn state(&self) -> ControllerState {
        if self.vector_inhibit > 0 || self.comment_inhibit > 0 {
            ControllerState::Suspended {
                vectors: self.vector_inhibit,
                comments: self.comment_inhibit,
            }
        } else if self.started {
            ControllerState::Generating
        } else {
            ControllerState::Idle
        }
    }

    fn touch(&mut self) {
        self.started = true;
    }

    fn warn(&mut self, diag: Diagnostic) {
        self.diagnostics.push(diag);
    }

    fn pin(&self, name: &str) -> Result<PinId, GenError> {
        self.pins.id(name)
    }

    // ── Pin state ───────────────────────────────────────────────────────────

    pub fn set_pin(&mut self, pin: &str, state: PinState) -> Result<(), GenError> {
        self.touch();
        let id = self.pin(pin)?;
        self.pins.set(id, state);
        Ok(())
    }

    pub fn drive(&mut self, pin: &str, high: bool) -> Result<(), GenError> {
        self.set_pin(pin, PinState::drive(high))
    }

    pub fn compare(&mut self, pin: &str, high: bool) -> Result<(), GenError> {
        self.set_pin(pin, PinState::compare(high))
    }

    pub fn dont_care(&mut self, pin: &str) -> Result<(), GenError> {
        self.set_pin(pin, PinState::DontCare)
    }

    pub fn drive_mem(&mut self, pin: &str) -> Result<(), GenError> {
        self.set_pin(pin, PinState::DriveMem)
    }

    pub fn expect_mem(&mut self, pin: &str) -> Result<(), GenError> {
        self.set_pin(pin, PinState::ExpectMem)
    }

    pub fn pin_state(&self, pin: &str) -> Result<PinState, GenError> {
        Ok(self.pins.state(self.pin(pin)?))
    }

    // ── Timesets ────────────────────────────────────────────────────────────

    pub fn set_timeset(&mut self, name: &str, period: Option<Time>) -> Result<(), GenError> {
        self.touch();
        self.timesets.set_timeset(name, period)
    }

    /// Run `body` under timeset `name`, then restore the previously active
    /// timeset.
    pub fn with_timeset<T>(
        &mut self,
        name: &str,
        period: Option<Time>,
        body: impl FnOnce(&mut Self) -> Result<T, GenError>,
    ) -> Result<T, GenError> {
        let saved = self.timesets.save();
        self.set_timeset(name, period)?;
        let result = body(self);
        self.timesets.restore(saved);
        result
    }

    pub fn add_wave(
        &mut self,
        timeset: &str,
        pin: &str,
        drive: Option<&str>,
        compare: Option<&str>,
    ) -> Result<(), GenError> {
        let id = self.pin(pin)?;
        self.timesets.add_wave(timeset, id, drive, compare)
    }

    // ── Clocks ──────────────────────────────────────────────────────────────

    fn check_quantization(&mut self, pin: &str, frequency: Frequency, q: Quantized) {
        if q.exact {
            return;
        }
        let period = self
            .timesets
            .current_period()
            .map(|p| p.to_string())
            .unwrap_or_default();
        let diag = Diagnostic::warning(
            codes::W0101,
            format!(
                "clock on pin '{pin}' at {frequency} needs {:.3} cycles per half period at {period}; using {}",
                q.requested, q.half_period
            ),
        )
        .with_hint("choose a clock frequency that divides the timeset period evenly");
        self.warn(diag);
    }

    pub fn enable_clock(&mut self, pin: &str, frequency: Frequency) -> Result<(), GenError> {
        self.touch();
        let id = self.pin(pin)?;
        let period = self.timesets.current_period()?;
        let q = self
            .clocks
            .enable_clock(id, frequency, period)
            .map_err(|e| e.for_pin(pin))?;
        self.check_quantization(pin, frequency, q);
        Ok(())
    }

    /// A clock edge may only fall on a vector group boundary.
    fn check_clock_group(&self, id: PinId, group_size: u32) -> Result<(), GenError> {
        let group = u64::from(group_size);
        match self.clocks.get(id) {
            Some(clock) if group > 1 && clock.half_period % group != 0 => {
                Err(GenError::ClockGroupMismatch {
                    pin: self.pins.name(id).to_string(),
                    half_period: clock.half_period,
                    group_size,
                })
            }
            _ => Ok(()),
        }
    }

    /// Start toggling. A pin that is not driving a level starts low.
    pub fn start_clock(&mut self, pin: &str) -> Result<(), GenError> {
        self.touch();
        let id = self.pin(pin)?;
        self.check_clock_group(id, self.group_size)?;
        let now = self.emitter.cycle();
        self.clocks
            .start_clock(id, now)
            .map_err(|e| e.for_pin(pin))?;
        if !matches!(self.pins.state(id), PinState::Drive0 | PinState::Drive1) {
            self.pins.set(id, PinState::Drive0);
        }
        Ok(())
    }

    pub fn stop_clock(&mut self, pin: &str) -> Result<(), GenError> {
        self.touch();
        let id = self.pin(pin)?;
        self.clocks.stop_clock(id).map_err(|e| e.for_pin(pin))
    }

    pub fn pause_clock(&mut self, pin: &str) -> Result<(), GenError> {
        self.touch();
        let id = self.pin(pin)?;
        let now = self.emitter.cycle();
        self.clocks
            .pause_clock(id, now)
            .map_err(|e| e.for_pin(pin))
    }

    /// Resume a paused clock, optionally at a new frequency (phase restarts).
    pub fn resume_clock(&mut self, pin: &str, frequency: Option<Frequency>) -> Result<(), GenError> {
        self.touch();
        let id = self.pin(pin)?;
        let now = self.emitter.cycle();
        let retune = match frequency {
            Some(f) => Some((f, self.timesets.current_period()?)),
            None => None,
        };
        let q = self
            .clocks
            .resume_clock(id, now, retune)
            .map_err(|e| e.for_pin(pin))?;
        if let (Some(q), Some(f)) = (q, frequency) {
            self.check_quantization(pin, f, q);
        }
        Ok(())
    }

    // ── Emission ────────────────────────────────────────────────────────────

    pub fn cycle(&mut self) -> Result<(), GenError> {
        self.cycle_with(CycleOptions::default())
    }

    pub fn cycle_with(&mut self, opts: CycleOptions) -> Result<(), GenError> {
        let repeat = opts.repeat.unwrap_or(1);
        if repeat == 0 {
            return Err(GenError::InvalidRepeat(0));
        }
        let repeat = self.align_to_group(repeat);
        self.emit(repeat, opts.timeset.as_deref(), None)
    }

    fn align_to_group(&mut self, repeat: u64) -> u64 {
        let group = u64::from(self.group_size);
        if group <= 1 || repeat % group == 0 {
            return repeat;
        }
        let rounded = repeat.div_ceil(group) * group;
        let diag = Diagnostic::warning(
            codes::W0103,
            format!("repeat {repeat} rounded up to {rounded} for vector group size {group}"),
        );
        self.warn(diag);
        rounded
    }

    fn emit(&mut self, repeat: u64, timeset: Option<&str>, call: Option<String>) -> Result<(), GenError> {
        self.touch();
        let ts = self.timesets.resolve(timeset, "cycle")?.clone();
        if self.vector_inhibit > 0 {
            return Ok(());
        }
        if !self.used_timesets.contains(&ts.name) {
            self.used_timesets.push(ts.name.clone());
        }
        let directives = CycleDirectives {
            store: self.pending_store,
            label: self.pending_label.clone(),
            call,
            group_size: self.group_size,
        };
        self.emitter
            .emit(&mut self.pins, &mut self.clocks, &ts, repeat, directives)?;
        self.pending_store = false;
        self.pending_label = None;
        self.executed_cycles = self
            .executed_cycles
            .saturating_add(repeat.saturating_mul(self.loop_multiplier));
        Ok(())
    }

    /// Hold the current vector for `cycles` cycles. Zero is a no-op.
    pub fn delay(&mut self, cycles: u64) -> Result<(), GenError> {
        if cycles == 0 {
            self.touch();
            return Ok(());
        }
        self.cycle_with(CycleOptions::repeat(cycles))
    }

    /// Hold the current vector for `duration`, converted to cycles with the
    /// configured rounding. A zero-cycle result emits nothing.
    pub fn wait(&mut self, duration: Time) -> Result<(), GenError> {
        self.touch();
        let cycles = self
            .timesets
            .cycles_for_duration_with(duration, self.config.wait_rounding)?;
        log::debug!("wait {duration} -> {cycles} cycles");
        self.delay(cycles)
    }

    /// Mark a vector for capture: offset 0 is the next emitted vector, n >= 1
    /// the vector n records back.
    pub fn store(&mut self, offset: usize) -> Result<(), GenError> {
        self.touch();
        if offset == 0 {
            self.pending_store = true;
            return Ok(());
        }
        if self.vector_inhibit > 0 {
            return Ok(());
        }
        self.emitter.mark_store(offset)
    }

    pub fn store_next_cycle(&mut self) -> Result<(), GenError> {
        self.store(0)
    }

    /// Label the next emitted vector.
    pub fn label(&mut self, name: &str) {
        self.touch();
        self.pending_label = Some(name.to_string());
    }

    pub fn comment(&mut self, text: &str) {
        self.touch();
        if self.vector_inhibit == 0 && self.comment_inhibit == 0 {
            self.emitter.push_comment(text);
        }
    }

    /// One cycle that jumps to subroutine `name`.
    pub fn call_subroutine(&mut self, name: &str) -> Result<(), GenError> {
        self.referenced_subs.insert(name.to_string());
        self.emit(1, None, Some(name.to_string()))
    }

    /// Declare that this pattern defines subroutine `name`; the next vector
    /// carries its entry label.
    pub fn define_subroutine(&mut self, name: &str) {
        self.defined_subs.insert(name.to_string());
        self.label(name);
    }

    /// Referenced but not locally defined subroutines.
    pub fn imported_subroutines(&self) -> Vec<String> {
        self.referenced_subs
            .difference(&self.defined_subs)
            .cloned()
            .collect()
    }

    // ── Scoped features ─────────────────────────────────────────────────────

    /// Wrap `body` in a hardware loop executed `count` times. The body is
    /// generated once.
    pub fn loop_vector<T>(
        &mut self,
        label: &str,
        count: u64,
        body: impl FnOnce(&mut Self) -> Result<T, GenError>,
    ) -> Result<T, GenError> {
        self.touch();
        if count == 0 {
            return Err(GenError::InvalidRepeat(0));
        }
        if count == 1 {
            return body(self);
        }
        if self.clocks.any_running() {
            let diag = Diagnostic::warning(
                codes::W0102,
                format!("clock running across loop '{label}'; its phase is only correct for the first iteration"),
            );
            self.warn(diag);
        }
        let emitting = self.vector_inhibit == 0;
        if emitting {
            self.emitter.push_loop_start(label, count);
        }
        let saved = self.loop_multiplier;
        self.loop_multiplier = saved.saturating_mul(count);
        let result = body(self);
        self.loop_multiplier = saved;
        if emitting {
            self.emitter.push_loop_end(label);
        }
        result
    }

    /// Mask compares on `pins` while `body` runs.
    pub fn ignore_fails<T>(
        &mut self,
        pins: &[&str],
        body: impl FnOnce(&mut Self) -> Result<T, GenError>,
    ) -> Result<T, GenError> {
        self.touch();
        let ids = pins
            .iter()
            .map(|p| self.pin(p))
            .collect::<Result<Vec<_>, _>>()?;
        for &id in &ids {
            self.pins.suspend(id);
        }
        let result = body(self);
        for &id in &ids {
            self.pins.resume(id);
        }
        result
    }

    /// Run `body` without emitting vectors or comments. Pin state still
    /// changes; cycles and clocks do not advance.
    pub fn inhibit_vectors_and_comments<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<T, GenError>,
    ) -> Result<T, GenError> {
        self.touch();
        self.vector_inhibit += 1;
        let result = body(self);
        self.vector_inhibit -= 1;
        result
    }

    pub fn inhibit_comments<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<T, GenError>,
    ) -> Result<T, GenError> {
        self.touch();
        self.comment_inhibit += 1;
        let result = body(self);
        self.comment_inhibit -= 1;
        result
    }

    pub fn set_vector_group_size(&mut self, size: u32) -> Result<(), GenError> {
        if size == 0 {
            return Err(GenError::InvalidGroupSize(size));
        }
        self.touch();
        for id in self.clocks.running_pins() {
            self.check_clock_group(id, size)?;
        }
        self.group_size = size;
        Ok(())
    }

    pub fn vector_group_size(&self) -> u32 {
        self.group_size
    }

    pub fn run_threads(&mut self, threads: &ThreadSet) -> Result<(), GenError> {
        self.touch();
        crate::threads::run(self, threads)
    }

    /// Close the pattern and hand its items to a backend. The controller
    /// returns to `Idle` and may be reused for a fresh pattern.
    pub fn finish(&mut self) -> GeneratedPattern {
        let emitter = std::mem::replace(&mut self.emitter, VectorEmitter::new(self.config.ceiling()));
        let cycles = emitter.cycle();
        let timesets = self
            .used_timesets
            .drain(..)
            .filter_map(|name| self.timesets.get(&name).cloned())
            .collect();
        let pattern = GeneratedPattern {
            name: self.name.clone(),
            pins: self.pins.names(),
            items: emitter.into_items(),
            timesets,
            imported_subroutines: self.imported_subroutines(),
            defined_subroutines: self.defined_subs.iter().cloned().collect(),
            cycles,
            executed_cycles: self.executed_cycles,
            warnings: std::mem::take(&mut self.diagnostics),
        };
        self.started = false;
        self.pending_store = false;
        self.pending_label = None;
        self.executed_cycles = 0;
        self.referenced_subs.clear();
        self.defined_subs.clear();
        self.clocks = ClockTracker::new();
        log::debug!(
            "pattern '{}' finished: {} items, {} cycles",
            pattern.name,
            pattern.items.len(),
            pattern.cycles
        );
        pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::VectorRecord;

    fn controller() -> SequenceController {
        let mut pins = PinTable::new();
        for name in ["tclk", "tdi", "tdo"] {
            pins.add(name).unwrap();
        }
        SequenceController::new("t", pins, GeneratorConfig::new(Platform::J750))
    }

    fn vectors(items: &[PatternItem]) -> Vec<&VectorRecord> {
        items
            .iter()
            .filter_map(|i| match i {
                PatternItem::Vector(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn cycle_without_timeset_fails() {
        let mut c = controller();
        assert!(matches!(c.cycle(), Err(GenError::NoActiveTimeset { .. })));
    }

    #[test]
    fn state_machine() {
        let mut c = controller();
        assert_eq!(c.state(), ControllerState::Idle);
        c.set_timeset("tp0", Some(Time::from_ns(40.0))).unwrap();
        assert_eq!(c.state(), ControllerState::Generating);
        c.inhibit_vectors_and_comments(|c| {
            c.inhibit_comments(|c| {
                assert_eq!(
                    c.state(),
                    ControllerState::Suspended {
                        vectors: 1,
                        comments: 1
                    }
                );
                Ok(())
            })
        })
        .unwrap();
        assert_eq!(c.state(), ControllerState::Generating);
        c.finish();
        assert_eq!(c.state(), ControllerState::Idle);
    }

    #[test]
    fn one_shot_label_and_store() {
        let mut c = controller();
        c.set_timeset("tp0", Some(Time::from_ns(40.0))).unwrap();
        c.label("start");
        c.store_next_cycle().unwrap();
        c.cycle().unwrap();
        c.cycle().unwrap();
        let p = c.finish();
        let v = vectors(&p.items);
        assert_eq!(v[0].label.as_deref(), Some("start"));
        assert!(v[0].store);
        assert_eq!(v[1].label, None);
        assert!(!v[1].store);
    }

    #[test]
    fn delay_zero_is_noop() {
        let mut c = controller();
        c.set_timeset("tp0", Some(Time::from_ns(40.0))).unwrap();
        c.delay(0).unwrap();
        assert!(c.items().is_empty());
        assert_eq!(
            c.cycle_with(CycleOptions::repeat(0)),
            Err(GenError::InvalidRepeat(0))
        );
    }

    #[test]
    fn with_timeset_restores_on_error() {
        let mut c = controller();
        c.set_timeset("slow", Some(Time::from_ns(200.0))).unwrap();
        let err = c
            .with_timeset("fast", Some(Time::from_ns(40.0)), |c| {
                c.cycle()?;
                c.drive("nope", true)
            })
            .unwrap_err();
        assert_eq!(err, GenError::UnknownPin("nope".to_string()));
        assert_eq!(c.timesets().current().unwrap().name, "slow");
    }

    #[test]
    fn cycle_with_explicit_timeset() {
        let mut c = controller();
        c.set_timeset("slow", Some(Time::from_ns(200.0))).unwrap();
        c.set_timeset("fast", Some(Time::from_ns(40.0))).unwrap();
        c.set_timeset("slow", None).unwrap();
        c.cycle_with(CycleOptions {
            repeat: Some(2),
            timeset: Some("fast".to_string()),
        })
        .unwrap();
        c.cycle().unwrap();
        let p = c.finish();
        let v = vectors(&p.items);
        assert_eq!(v[0].timeset, "fast");
        assert_eq!(v[1].timeset, "slow");
        let names: Vec<&str> = p.timesets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["fast", "slow"]);
    }

    #[test]
    fn wait_uses_configured_rounding() {
        let mut c = controller();
        c.set_timeset("tp0", Some(Time::from_ns(200.0))).unwrap();
        c.wait(Time::from_ns(1000.0)).unwrap();
        c.wait(Time::from_ns(1001.0)).unwrap();
        let p = c.finish();
        let repeats: Vec<u64> = p.vectors().map(|v| v.repeat).collect();
        assert_eq!(repeats, vec![5, 6]);
    }

    #[test]
    fn subroutine_imports() {
        let mut c = controller();
        c.set_timeset("tp0", Some(Time::from_ns(40.0))).unwrap();
        c.define_subroutine("local_sub");
        c.cycle().unwrap();
        c.call_subroutine("local_sub").unwrap();
        c.call_subroutine("remote_sub").unwrap();
        assert_eq!(c.imported_subroutines(), vec!["remote_sub".to_string()]);
        let p = c.finish();
        let v = vectors(&p.items);
        assert_eq!(v[0].label.as_deref(), Some("local_sub"));
        assert_eq!(v[2].call.as_deref(), Some("remote_sub"));
        assert_eq!(v[2].repeat, 1);
    }

    #[test]
    fn loops_generate_body_once() {
        let mut c = controller();
        c.set_timeset("tp0", Some(Time::from_ns(40.0))).unwrap();
        c.loop_vector("lp", 10, |c| c.delay(3)).unwrap();
        c.loop_vector("single", 1, |c| c.cycle()).unwrap();
        let p = c.finish();
        assert_eq!(p.items.len(), 4);
        assert!(matches!(&p.items[0], PatternItem::LoopStart { label, count: 10 } if label == "lp"));
        assert!(matches!(&p.items[2], PatternItem::LoopEnd { .. }));
        assert_eq!(p.cycles, 4);
        assert_eq!(p.executed_cycles, 31);
        assert!(matches!(
            controller().loop_vector("z", 0, |_| Ok(())),
            Err(GenError::InvalidRepeat(0))
        ));
    }

    #[test]
    fn loop_with_running_clock_warns() {
        let mut c = controller();
        c.set_timeset("tp0", Some(Time::from_ns(40.0))).unwrap();
        c.enable_clock("tclk", Frequency::from_mhz(1.25)).unwrap();
        c.start_clock("tclk").unwrap();
        c.loop_vector("lp", 2, |c| c.cycle()).unwrap();
        assert_eq!(c.diagnostics().len(), 1);
        assert_eq!(c.diagnostics()[0].code, Some(codes::W0102));
    }

    #[test]
    fn ignore_fails_masks_and_restores() {
        let mut c = controller();
        c.set_timeset("tp0", Some(Time::from_ns(40.0))).unwrap();
        c.compare("tdo", true).unwrap();
        c.ignore_fails(&["tdo"], |c| c.cycle()).unwrap();
        c.cycle().unwrap();
        let p = c.finish();
        let v = vectors(&p.items);
        assert_eq!(v[0].pins[2], PinState::CompareX);
        assert_eq!(v[1].pins[2], PinState::Compare1);
    }

    #[test]
    fn inhibited_vectors_keep_pending_flags() {
        let mut c = controller();
        c.set_timeset("tp0", Some(Time::from_ns(40.0))).unwrap();
        c.label("kept");
        c.inhibit_vectors_and_comments(|c| {
            c.drive("tdi", true)?;
            c.comment("dropped");
            c.delay(100)
        })
        .unwrap();
        assert_eq!(c.cycle_count(), 0);
        c.inhibit_comments(|c| {
            c.comment("also dropped");
            c.cycle()
        })
        .unwrap();
        let p = c.finish();
        assert_eq!(p.items.len(), 1);
        let v = vectors(&p.items);
        assert_eq!(v[0].label.as_deref(), Some("kept"));
        assert_eq!(v[0].pins[1], PinState::Drive1);
    }

    #[test]
    fn group_size_rounds_up_with_warning() {
        let mut c = controller();
        c.set_timeset("tp0", Some(Time::from_ns(40.0))).unwrap();
        assert_eq!(
            c.set_vector_group_size(0),
            Err(GenError::InvalidGroupSize(0))
        );
        c.set_vector_group_size(2).unwrap();
        c.delay(3).unwrap();
        let p = c.finish();
        assert_eq!(p.total_repeat(), 4);
        assert_eq!(p.warnings[0].code, Some(codes::W0103));
        assert_eq!(vectors(&p.items)[0].group_size, 2);
    }

    #[test]
    fn clock_quantization_warning() {
        let mut c = controller();
        assert!(matches!(
            c.enable_clock("tclk", Frequency::from_mhz(2.0)),
            Err(GenError::NoActiveTimeset { .. })
        ));
        c.set_timeset("tp0", Some(Time::from_ns(40.0))).unwrap();
        c.enable_clock("tclk", Frequency::from_mhz(2.0)).unwrap();
        assert_eq!(c.diagnostics()[0].code, Some(codes::W0101));
        assert_eq!(
            c.start_clock("tdi"),
            Err(GenError::ClockNotEnabled("tdi".to_string()))
        );
        c.start_clock("tclk").unwrap();
        assert_eq!(c.pin_state("tclk").unwrap(), PinState::Drive0);
    }

    #[test]
    fn ceiling_override() {
        let mut config = GeneratorConfig::new(Platform::V93K);
        assert_eq!(config.ceiling(), None);
        config.max_repeat = Some(100);
        assert_eq!(config.ceiling(), Some(100));
        assert_eq!(GeneratorConfig::new(Platform::UltraFlex).ceiling(), Some(65_535));
    }
}
