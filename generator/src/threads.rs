// threads.rs — Logical threads within one pattern
//
// A logical thread is a timeline of pin changes and delays. Threads do not
// run concurrently: each owns a cycle cursor, `sync` barriers align every
// cursor to the latest one, and all threads are joined at the end. The pin
// changes of all threads are then merged in global-cycle order (ties broken
// by thread declaration order) and replayed through the controller, which
// emits the vectors between event points.
//
// Preconditions: a timeset with a period is active when threads use `wait`.
// Postconditions: the emitted cycles equal the joined length of the set.
// Failure modes: any `GenError` raised by the controller.
// Side effects: emits through the controller.

use crate::error::GenError;
use crate::id::{IdAllocator, ThreadId};
use crate::pin::PinState;
use crate::sequence::SequenceController;
use crate::time::Time;

#[derive(Debug, Clone, PartialEq)]
pub enum ThreadOp {
    Set { pin: String, state: PinState },
    Cycles(u64),
    Wait(Time),
    /// Barrier with every other thread of the set.
    Sync,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalThread {
    pub id: ThreadId,
    pub name: String,
    pub ops: Vec<ThreadOp>,
}

impl LogicalThread {
    pub fn set(&mut self, pin: &str, state: PinState) -> &mut Self {
        self.ops.push(ThreadOp::Set {
            pin: pin.to_string(),
            state,
        });
        self
    }

    pub fn cycles(&mut self, n: u64) -> &mut Self {
        self.ops.push(ThreadOp::Cycles(n));
        self
    }

    pub fn wait(&mut self, duration: Time) -> &mut Self {
        self.ops.push(ThreadOp::Wait(duration));
        self
    }

    pub fn sync(&mut self) -> &mut Self {
        self.ops.push(ThreadOp::Sync);
        self
    }

    fn segments(&self) -> Vec<&[ThreadOp]> {
        self.ops.split(|op| *op == ThreadOp::Sync).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ThreadSet {
    threads: Vec<LogicalThread>,
    ids: IdAllocator,
}

impl ThreadSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a thread and return it for building.
    pub fn thread(&mut self, name: &str) -> &mut LogicalThread {
        let id = self.ids.alloc_thread();
        self.threads.push(LogicalThread {
            id,
            name: name.to_string(),
            ops: Vec::new(),
        });
        let last = self.threads.len() - 1;
        &mut self.threads[last]
    }

    pub fn threads(&self) -> &[LogicalThread] {
        &self.threads
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

/// A pin change at a cycle offset from the start of the thread set.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadEvent {
    pub cycle: u64,
    pub thread: usize,
    pub seq: usize,
    pub pin: String,
    pub state: PinState,
}

/// Merged plan: ordered events plus the joined length in cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadPlan {
    pub events: Vec<ThreadEvent>,
    pub total_cycles: u64,
}

/// Lay out every thread on its own cursor and merge the results.
/// `to_cycles` converts a wait duration into cycles.
pub fn plan(
    set: &ThreadSet,
    mut to_cycles: impl FnMut(Time) -> Result<u64, GenError>,
) -> Result<ThreadPlan, GenError> {
    let segments: Vec<Vec<&[ThreadOp]>> = set.threads.iter().map(|t| t.segments()).collect();
    let rounds = segments.iter().map(Vec::len).max().unwrap_or(0);

    let mut events = Vec::new();
    let mut base = 0u64;
    for round in 0..rounds {
        let mut barrier = base;
        for (thread, segs) in segments.iter().enumerate() {
            let mut cursor = base;
            for op in segs.get(round).copied().unwrap_or(&[]) {
                match op {
                    ThreadOp::Set { pin, state } => {
                        let seq = events.len();
                        events.push(ThreadEvent {
                            cycle: cursor,
                            thread,
                            seq,
                            pin: pin.clone(),
                            state: *state,
                        });
                    }
                    ThreadOp::Cycles(n) => cursor += n,
                    ThreadOp::Wait(d) => cursor += to_cycles(*d)?,
                    ThreadOp::Sync => {}
                }
            }
            barrier = barrier.max(cursor);
        }
        log::debug!("thread barrier {round} at cycle {barrier}");
        base = barrier;
    }
    events.sort_by_key(|e| (e.cycle, e.thread, e.seq));
    Ok(ThreadPlan {
        events,
        total_cycles: base,
    })
}

/// Plan `set` and replay it through the controller.
pub fn run(ctrl: &mut SequenceController, set: &ThreadSet) -> Result<(), GenError> {
    let rounding = ctrl.config().wait_rounding;
    let plan = {
        let timesets = ctrl.timesets();
        plan(set, |d| timesets.cycles_for_duration_with(d, rounding))?
    };
    let mut pos = 0u64;
    for event in &plan.events {
        if event.cycle > pos {
            ctrl.delay(event.cycle - pos)?;
            pos = event.cycle;
        }
        ctrl.set_pin(&event.pin, event.state)?;
    }
    if plan.total_cycles > pos {
        ctrl.delay(plan.total_cycles - pos)?;
    }
    Ok(())
}
