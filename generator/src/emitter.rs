// emitter.rs — Vector emission: snapshot, slice, split, append
//
// Turns "hold the current pin vector for N cycles" into vector records.
// A run is first sliced at clock edges (so no record straddles a toggle),
// then each slice is split to respect the backend repeat ceiling.
//
// Preconditions: the timeset passed to `emit` has a period.
// Postconditions: the sum of emitted repeats equals the requested repeat;
//   every record has 1 <= repeat <= ceiling; the cycle counter advanced by
//   the requested repeat.
// Failure modes: `InvalidRepeat` (repeat 0), `NoActiveTimeset`, `StoreOffset`.
// Side effects: toggles clock pins in the pin table and commits their edges.

use serde::Serialize;

use crate::clock::ClockTracker;
use crate::error::GenError;
use crate::pin::{PinState, PinTable};
use crate::timeset::Timeset;

/// One emitted tester vector held for `repeat` cycles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorRecord {
    pub pins: Vec<PinState>,
    pub repeat: u64,
    pub timeset: String,
    /// Subroutine called from this vector.
    pub call: Option<String>,
    pub store: bool,
    pub label: Option<String>,
    pub group_size: u32,
    /// Absolute cycle at which this record begins.
    pub start_cycle: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PatternItem {
    Vector(VectorRecord),
    Comment(String),
    LoopStart { label: String, count: u64 },
    LoopEnd { label: String },
}

/// Per-emission flags. `store`, `label` and `call` apply to the first cycle
/// of the run only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleDirectives {
    pub store: bool,
    pub label: Option<String>,
    pub call: Option<String>,
    pub group_size: u32,
}

impl Default for CycleDirectives {
    fn default() -> Self {
        CycleDirectives {
            store: false,
            label: None,
            call: None,
            group_size: 1,
        }
    }
}

/// Split `n` cycles into the fewest chunks no larger than `ceiling`, sizes as
/// equal as possible with the remainder on the leading chunks.
pub fn split_ceiling(n: u64, ceiling: Option<u64>) -> Vec<u64> {
    match ceiling {
        Some(c) if n > c.max(1) => {
            let chunks = n.div_ceil(c.max(1));
            let base = n / chunks;
            let rem = n % chunks;
            (0..chunks).map(|i| base + u64::from(i < rem)).collect()
        }
        _ => vec![n],
    }
}

#[derive(Debug, Clone, Default)]
pub struct VectorEmitter {
    items: Vec<PatternItem>,
    cycle: u64,
    ceiling: Option<u64>,
}

impl VectorEmitter {
    pub fn new(ceiling: Option<u64>) -> Self {
        VectorEmitter {
            items: Vec::new(),
            cycle: 0,
            ceiling,
        }
    }

    /// Absolute cycle of the next emission.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn items(&self) -> &[PatternItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<PatternItem> {
        self.items
    }

    pub fn vector_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i, PatternItem::Vector(_)))
            .count()
    }

    pub fn push_comment(&mut self, text: impl Into<String>) {
        self.items.push(PatternItem::Comment(text.into()));
    }

    pub fn push_loop_start(&mut self, label: &str, count: u64) {
        self.items.push(PatternItem::LoopStart {
            label: label.to_string(),
            count,
        });
    }

    pub fn push_loop_end(&mut self, label: &str) {
        self.items.push(PatternItem::LoopEnd {
            label: label.to_string(),
        });
    }

    /// Emit the current pin vector for `repeat` cycles under `timeset`.
    pub fn emit(
        &mut self,
        pins: &mut PinTable,
        clocks: &mut ClockTracker,
        timeset: &Timeset,
        repeat: u64,
        directives: CycleDirectives,
    ) -> Result<(), GenError> {
        if repeat == 0 {
            return Err(GenError::InvalidRepeat(0));
        }
        if timeset.period.is_none() {
            return Err(GenError::NoActiveTimeset {
                operation: "vector emission".to_string(),
            });
        }
        let slices = clocks.slice_repeat(repeat, self.cycle);
        let group = u64::from(directives.group_size.max(1));
        if let (true, Some((_, leading))) = (group > 1, slices.split_last()) {
            let mut edge = self.cycle;
            for slice in leading {
                edge += slice.count;
                if slice.count % group != 0 {
                    return Err(GenError::ClockInsideGroup {
                        cycle: edge,
                        group_size: directives.group_size,
                    });
                }
            }
        }
        let mut directives = directives;
        for slice in slices {
            self.push_run(pins.snapshot(), slice.count, &timeset.name, &mut directives);
            for pin in slice.toggles {
                pins.toggle(pin);
                clocks.advance(pin);
            }
        }
        Ok(())
    }

    fn push_run(
        &mut self,
        snapshot: Vec<PinState>,
        count: u64,
        timeset: &str,
        directives: &mut CycleDirectives,
    ) {
        let group = u64::from(directives.group_size.max(1));
        let mut remaining = count;
        // A stored head is one whole vector group.
        if directives.store && remaining > group {
            self.push_record(snapshot.clone(), group, timeset, directives);
            remaining -= group;
        }
        let group_ceiling = match self.ceiling {
            Some(c) => (c >= group).then_some(Some(c / group)),
            None => Some(None),
        };
        let chunks = match group_ceiling {
            Some(ceiling) if group > 1 && remaining % group == 0 => {
                split_ceiling(remaining / group, ceiling)
                    .into_iter()
                    .map(|c| c * group)
                    .collect()
            }
            _ => split_ceiling(remaining, self.ceiling),
        };
        for chunk in chunks {
            self.push_record(snapshot.clone(), chunk, timeset, directives);
        }
    }

    fn push_record(
        &mut self,
        pins: Vec<PinState>,
        repeat: u64,
        timeset: &str,
        directives: &mut CycleDirectives,
    ) {
        self.items.push(PatternItem::Vector(VectorRecord {
            pins,
            repeat,
            timeset: timeset.to_string(),
            call: directives.call.take(),
            store: std::mem::take(&mut directives.store),
            label: directives.label.take(),
            group_size: directives.group_size,
            start_cycle: self.cycle,
        }));
        self.cycle += repeat;
    }

    /// Mark the vector `offset` records back (1 = the last emitted) for
    /// capture. A longer record is split so that only its final vector group
    /// (a single cycle when ungrouped) is stored.
    pub fn mark_store(&mut self, offset: usize) -> Result<(), GenError> {
        let positions: Vec<usize> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| matches!(item, PatternItem::Vector(_)))
            .map(|(idx, _)| idx)
            .collect();
        let available = positions.len();
        if offset == 0 || offset > available {
            return Err(GenError::StoreOffset { offset, available });
        }
        let idx = positions[available - offset];
        let PatternItem::Vector(record) = &mut self.items[idx] else {
            return Err(GenError::StoreOffset { offset, available });
        };
        let tail_len = u64::from(record.group_size.max(1));
        if record.repeat <= tail_len {
            record.store = true;
            return Ok(());
        }
        record.repeat -= tail_len;
        let tail = VectorRecord {
            repeat: tail_len,
            call: None,
            label: None,
            store: true,
            start_cycle: record.start_cycle + record.repeat,
            ..record.clone()
        };
        self.items.insert(idx + 1, PatternItem::Vector(tail));
        Ok(())
    }
}
