// pin.rs — Per-pin drive/compare state
//
// The pin table is the mutable "current vector" that pattern code edits
// between cycles. Every emission takes a snapshot in declaration order.
// Pins inside an `ignore_fails` scope are suspended: their compare states
// snapshot as don't-care without losing the underlying state.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::GenError;
use crate::id::{IdAllocator, PinId};

/// The value a pin applies or expects for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PinState {
    Drive0,
    Drive1,
    /// Drive high impedance / don't care.
    DontCare,
    Compare0,
    Compare1,
    CompareX,
    DriveMem,
    ExpectMem,
}

/// Whether a pin stimulates the device or observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinRole {
    Drive,
    Compare,
}

impl PinState {
    pub fn role(self) -> PinRole {
        match self {
            PinState::Drive0 | PinState::Drive1 | PinState::DontCare | PinState::DriveMem => {
                PinRole::Drive
            }
            PinState::Compare0 | PinState::Compare1 | PinState::CompareX | PinState::ExpectMem => {
                PinRole::Compare
            }
        }
    }

    pub fn drive(high: bool) -> Self {
        if high {
            PinState::Drive1
        } else {
            PinState::Drive0
        }
    }

    pub fn compare(high: bool) -> Self {
        if high {
            PinState::Compare1
        } else {
            PinState::Compare0
        }
    }

    /// The state after a clock edge. A pin that is not driving a level
    /// starts driving high.
    pub fn toggled(self) -> Self {
        match self {
            PinState::Drive1 => PinState::Drive0,
            _ => PinState::Drive1,
        }
    }

    /// The state a suspended pin snapshots as.
    pub fn masked(self) -> Self {
        match self.role() {
            PinRole::Compare => PinState::CompareX,
            PinRole::Drive => self,
        }
    }

    /// Single-character vector encoding shared by all vector backends.
    pub fn tester_char(self) -> char {
        match self {
            PinState::Drive0 => '0',
            PinState::Drive1 => '1',
            PinState::DontCare => 'X',
            PinState::Compare0 => 'L',
            PinState::Compare1 => 'H',
            PinState::CompareX => 'X',
            PinState::DriveMem => 'D',
            PinState::ExpectMem => 'E',
        }
    }
}

#[derive(Debug, Clone)]
struct Pin {
    name: String,
    state: PinState,
    suspended: u32,
}

/// All declared pins and their current states.
#[derive(Debug, Clone, Default)]
pub struct PinTable {
    pins: Vec<Pin>,
    by_name: HashMap<String, PinId>,
    ids: IdAllocator,
}

impl PinTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a pin. New pins start as don't-care.
    pub fn add(&mut self, name: &str) -> Result<PinId, GenError> {
        if self.by_name.contains_key(name) {
            return Err(GenError::DuplicatePin(name.to_string()));
        }
        let id = self.ids.alloc_pin();
        self.pins.push(Pin {
            name: name.to_string(),
            state: PinState::DontCare,
            suspended: 0,
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn id(&self, name: &str) -> Result<PinId, GenError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| GenError::UnknownPin(name.to_string()))
    }

    pub fn name(&self, id: PinId) -> &str {
        &self.pins[id.index()].name
    }

    pub fn names(&self) -> Vec<String> {
        self.pins.iter().map(|p| p.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn state(&self, id: PinId) -> PinState {
        self.pins[id.index()].state
    }

    pub fn set(&mut self, id: PinId, state: PinState) {
        self.pins[id.index()].state = state;
    }

    pub fn toggle(&mut self, id: PinId) {
        let pin = &mut self.pins[id.index()];
        pin.state = pin.state.toggled();
    }

    pub fn suspend(&mut self, id: PinId) {
        self.pins[id.index()].suspended += 1;
    }

    pub fn resume(&mut self, id: PinId) {
        let pin = &mut self.pins[id.index()];
        pin.suspended = pin.suspended.saturating_sub(1);
    }

    pub fn is_suspended(&self, id: PinId) -> bool {
        self.pins[id.index()].suspended > 0
    }

    /// Current vector in declaration order, with suspended pins masked.
    pub fn snapshot(&self) -> Vec<PinState> {
        self.pins
            .iter()
            .map(|p| {
                if p.suspended > 0 {
                    p.state.masked()
                } else {
                    p.state
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> (PinTable, PinId, PinId) {
        let mut pins = PinTable::new();
        let a = pins.add("tclk").unwrap();
        let b = pins.add("tdo").unwrap();
        (pins, a, b)
    }

    #[test]
    fn duplicate_and_unknown_pins() {
        let (mut pins, _, _) = table();
        assert_eq!(
            pins.add("tclk"),
            Err(GenError::DuplicatePin("tclk".to_string()))
        );
        assert_eq!(pins.id("nope"), Err(GenError::UnknownPin("nope".to_string())));
    }

    #[test]
    fn snapshot_is_declaration_ordered() {
        let (mut pins, a, b) = table();
        pins.set(b, PinState::compare(true));
        pins.set(a, PinState::drive(false));
        assert_eq!(pins.snapshot(), vec![PinState::Drive0, PinState::Compare1]);
    }

    #[test]
    fn toggle_flips_drive_levels() {
        let (mut pins, a, _) = table();
        pins.toggle(a);
        assert_eq!(pins.state(a), PinState::Drive1);
        pins.toggle(a);
        assert_eq!(pins.state(a), PinState::Drive0);
    }

    #[test]
    fn suspension_masks_compares_and_nests() {
        let (mut pins, a, b) = table();
        pins.set(a, PinState::Drive1);
        pins.set(b, PinState::Compare0);
        pins.suspend(a);
        pins.suspend(b);
        pins.suspend(b);
        assert_eq!(pins.snapshot(), vec![PinState::Drive1, PinState::CompareX]);
        pins.resume(b);
        assert!(pins.is_suspended(b));
        pins.resume(b);
        pins.resume(a);
        assert_eq!(pins.snapshot(), vec![PinState::Drive1, PinState::Compare0]);
    }

    #[test]
    fn tester_chars() {
        let chars: String = [
            PinState::Drive0,
            PinState::Drive1,
            PinState::DontCare,
            PinState::Compare0,
            PinState::Compare1,
            PinState::CompareX,
            PinState::DriveMem,
            PinState::ExpectMem,
        ]
        .iter()
        .map(|s| s.tester_char())
        .collect();
        assert_eq!(chars, "01XLHXDE");
    }
}
