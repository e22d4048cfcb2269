// clock.rs — Free-running clock pins
//
// A clock pin toggles every `half_period` cycles while running. The tracker
// only counts cycles; the emitter consults `slice_repeat` to break long runs
// at toggle points and commits each edge with `advance`.
//
// Preconditions: a clock must be enabled before it is started or resumed.
// Postconditions: for every running clock, `next_toggle` is strictly after
//   the current cycle once an emission has been committed.
// Failure modes: `ClockError` (mapped to `GenError` with the pin name by
//   the caller).
// Side effects: none.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::GenError;
use crate::id::PinId;
use crate::time::{Frequency, Time};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClockStatus {
    /// Enabled but not toggling.
    Stopped,
    Running { next_toggle: u64 },
    /// Frozen with this many cycles left until the next edge.
    Paused { remaining: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClockPin {
    pub pin: PinId,
    pub frequency: Frequency,
    pub half_period: u64,
    pub status: ClockStatus,
}

/// Result of deriving a half-period from a frequency and a tester period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantized {
    pub half_period: u64,
    /// Exact half-period in (fractional) cycles before rounding.
    pub requested: f64,
    pub exact: bool,
}

/// One piece of a repeat run that no clock edge falls inside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    pub count: u64,
    /// Clock pins that toggle once this slice has been emitted.
    pub toggles: Vec<PinId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClockError {
    NotEnabled,
    NotRunning,
    NotPaused,
    InvalidFrequency(f64),
}

impl ClockError {
    pub fn for_pin(self, pin: &str) -> GenError {
        match self {
            ClockError::NotEnabled => GenError::ClockNotEnabled(pin.to_string()),
            ClockError::NotRunning => GenError::ClockNotRunning(pin.to_string()),
            ClockError::NotPaused => GenError::ClockNotPaused(pin.to_string()),
            ClockError::InvalidFrequency(hz) => GenError::InvalidFrequency {
                pin: pin.to_string(),
                hz,
            },
        }
    }
}

/// Half-period in whole cycles: round-half-up of `(1/f)/2 / period`, never
/// less than one cycle.
pub fn quantize(frequency: Frequency, period: Time) -> Result<Quantized, ClockError> {
    if !frequency.is_valid() || period.is_zero() {
        return Err(ClockError::InvalidFrequency(frequency.hz()));
    }
    let requested = frequency.period_ps() / 2.0 / period.as_ps() as f64;
    let half_period = ((requested + 0.5).floor() as u64).max(1);
    let exact = (requested - half_period as f64).abs() < 1e-9;
    Ok(Quantized {
        half_period,
        requested,
        exact,
    })
}

#[derive(Debug, Clone, Default)]
pub struct ClockTracker {
    clocks: BTreeMap<PinId, ClockPin>,
}

impl ClockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_mut(&mut self, pin: PinId) -> Result<&mut ClockPin, ClockError> {
        self.clocks.get_mut(&pin).ok_or(ClockError::NotEnabled)
    }

    pub fn get(&self, pin: PinId) -> Option<&ClockPin> {
        self.clocks.get(&pin)
    }

    /// Register (or retune) a clock on `pin`. A running clock keeps its
    /// pending edge; the new half-period applies from the next edge on.
    pub fn enable_clock(
        &mut self,
        pin: PinId,
        frequency: Frequency,
        period: Time,
    ) -> Result<Quantized, ClockError> {
        let q = quantize(frequency, period)?;
        let clock = self.clocks.entry(pin).or_insert(ClockPin {
            pin,
            frequency,
            half_period: q.half_period,
            status: ClockStatus::Stopped,
        });
        clock.frequency = frequency;
        clock.half_period = q.half_period;
        Ok(q)
    }

    pub fn start_clock(&mut self, pin: PinId, now: u64) -> Result<(), ClockError> {
        let clock = self.get_mut(pin)?;
        clock.status = ClockStatus::Running {
            next_toggle: now + clock.half_period,
        };
        Ok(())
    }

    /// Deactivate the clock. Stopping a clock that is not running is legal.
    pub fn stop_clock(&mut self, pin: PinId) -> Result<(), ClockError> {
        self.get_mut(pin)?.status = ClockStatus::Stopped;
        Ok(())
    }

    pub fn pause_clock(&mut self, pin: PinId, now: u64) -> Result<(), ClockError> {
        let clock = self.get_mut(pin)?;
        match clock.status {
            ClockStatus::Running { next_toggle } => {
                clock.status = ClockStatus::Paused {
                    remaining: next_toggle.saturating_sub(now).max(1),
                };
                Ok(())
            }
            _ => Err(ClockError::NotRunning),
        }
    }

    /// Resume a paused clock. Without a retune the frozen phase continues;
    /// with one the half-period is re-derived and the phase restarts.
    pub fn resume_clock(
        &mut self,
        pin: PinId,
        now: u64,
        retune: Option<(Frequency, Time)>,
    ) -> Result<Option<Quantized>, ClockError> {
        let clock = self.get_mut(pin)?;
        let remaining = match clock.status {
            ClockStatus::Paused { remaining } => remaining,
            _ => return Err(ClockError::NotPaused),
        };
        match retune {
            None => {
                clock.status = ClockStatus::Running {
                    next_toggle: now + remaining,
                };
                Ok(None)
            }
            Some((frequency, period)) => {
                let q = quantize(frequency, period)?;
                clock.frequency = frequency;
                clock.half_period = q.half_period;
                clock.status = ClockStatus::Running {
                    next_toggle: now + q.half_period,
                };
                Ok(Some(q))
            }
        }
    }

    pub fn next_toggle_cycle(&self, pin: PinId) -> Option<u64> {
        match self.clocks.get(&pin)?.status {
            ClockStatus::Running { next_toggle } => Some(next_toggle),
            _ => None,
        }
    }

    pub fn is_running(&self, pin: PinId) -> bool {
        self.next_toggle_cycle(pin).is_some()
    }

    pub fn any_running(&self) -> bool {
        self.clocks
            .values()
            .any(|c| matches!(c.status, ClockStatus::Running { .. }))
    }

    pub fn running_pins(&self) -> Vec<PinId> {
        self.clocks
            .values()
            .filter(|c| matches!(c.status, ClockStatus::Running { .. }))
            .map(|c| c.pin)
            .collect()
    }

    /// Commit one edge of a running clock.
    pub fn advance(&mut self, pin: PinId) {
        if let Some(clock) = self.clocks.get_mut(&pin) {
            if let ClockStatus::Running { next_toggle } = clock.status {
                clock.status = ClockStatus::Running {
                    next_toggle: next_toggle + clock.half_period,
                };
            }
        }
    }

    /// Break a run of `n` cycles starting at `current` so that no slice
    /// contains a clock edge. Counts sum to `n`. Clocks whose edge lands
    /// exactly at `current + n` are listed on the final slice.
    pub fn slice_repeat(&self, n: u64, current: u64) -> Vec<Slice> {
        let end = current + n;
        let mut sim: Vec<(PinId, u64, u64)> = self
            .clocks
            .values()
            .filter_map(|c| match c.status {
                ClockStatus::Running { next_toggle } => Some((c.pin, next_toggle, c.half_period)),
                _ => None,
            })
            .collect();

        let mut slices = Vec::new();
        let mut pos = current;
        while let Some(edge) = sim
            .iter()
            .map(|&(_, next, _)| next)
            .filter(|&next| next > pos && next < end)
            .min()
        {
            let mut toggles = Vec::new();
            for (pin, next, half) in sim.iter_mut() {
                if *next == edge {
                    toggles.push(*pin);
                    *next += *half;
                }
            }
            slices.push(Slice {
                count: edge - pos,
                toggles,
            });
            pos = edge;
        }
        let toggles = sim
            .iter()
            .filter(|&&(_, next, _)| next == end)
            .map(|&(pin, _, _)| pin)
            .collect();
        slices.push(Slice {
            count: end - pos,
            toggles,
        });
        slices
    }
}
