// time.rs — Time, frequency, and cycle-conversion primitives
//
// All engine time is an integer count of picoseconds so that period
// arithmetic and cycle conversion are exact. Frequencies stay in Hz (f64)
// because clock half-periods are quantized to whole cycles anyway.
//
// Preconditions: none.
// Postconditions: conversions never produce negative times.
// Failure modes: none (callers validate zero periods).
// Side effects: none.

use std::fmt;

use serde::Serialize;

const PS_PER_NS: f64 = 1_000.0;
const PS_PER_US: f64 = 1_000_000.0;
const PS_PER_MS: f64 = 1_000_000_000.0;
const PS_PER_S: f64 = 1_000_000_000_000.0;

/// A non-negative duration in picoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct Time(u64);

impl Time {
    pub const ZERO: Time = Time(0);

    pub fn from_ps(ps: u64) -> Self {
        Time(ps)
    }

    /// Build from a fractional picosecond count, rounding to the nearest
    /// picosecond. Negative and non-finite inputs clamp to zero.
    pub fn from_ps_f64(ps: f64) -> Self {
        if !ps.is_finite() || ps <= 0.0 {
            return Time(0);
        }
        Time(ps.round() as u64)
    }

    pub fn from_ns(ns: f64) -> Self {
        Self::from_ps_f64(ns * PS_PER_NS)
    }

    pub fn from_us(us: f64) -> Self {
        Self::from_ps_f64(us * PS_PER_US)
    }

    pub fn from_ms(ms: f64) -> Self {
        Self::from_ps_f64(ms * PS_PER_MS)
    }

    pub fn from_s(s: f64) -> Self {
        Self::from_ps_f64(s * PS_PER_S)
    }

    pub fn as_ps(self) -> u64 {
        self.0
    }

    pub fn as_ns(self) -> f64 {
        self.0 as f64 / PS_PER_NS
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Duration of `cycles` periods of `self`, saturating on overflow.
    pub fn times(self, cycles: u64) -> Time {
        Time(self.0.saturating_mul(cycles))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ps = self.0;
        // Largest unit that represents the value exactly.
        let units: [(u64, &str); 5] = [
            (1_000_000_000_000, "s"),
            (1_000_000_000, "ms"),
            (1_000_000, "us"),
            (1_000, "ns"),
            (1, "ps"),
        ];
        for (scale, unit) in units {
            if ps != 0 && ps % scale == 0 {
                return write!(f, "{}{}", ps / scale, unit);
            }
        }
        write!(f, "0ns")
    }
}

/// A clock frequency in Hz.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct Frequency(f64);

impl Frequency {
    pub fn from_hz(hz: f64) -> Self {
        Frequency(hz)
    }

    pub fn from_mhz(mhz: f64) -> Self {
        Frequency(mhz * 1_000_000.0)
    }

    pub fn hz(self) -> f64 {
        self.0
    }

    /// True if the frequency can drive a clock (finite and positive).
    pub fn is_valid(self) -> bool {
        self.0.is_finite() && self.0 > 0.0
    }

    /// One full clock period in (fractional) picoseconds.
    pub fn period_ps(self) -> f64 {
        PS_PER_S / self.0
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hz = self.0;
        if hz >= 1e9 {
            write!(f, "{}GHz", hz / 1e9)
        } else if hz >= 1e6 {
            write!(f, "{}MHz", hz / 1e6)
        } else if hz >= 1e3 {
            write!(f, "{}kHz", hz / 1e3)
        } else {
            write!(f, "{}Hz", hz)
        }
    }
}

/// How a duration is converted into a whole number of cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Rounding {
    /// Round up: a requested delay is never under-delivered.
    #[default]
    Ceil,
    /// Drop any partial cycle (legacy wait behavior).
    Truncate,
}

/// Number of `period`-long cycles covering `duration`.
///
/// `period` must be non-zero.
pub fn cycles_in(duration: Time, period: Time, rounding: Rounding) -> u64 {
    let d = duration.as_ps();
    let p = period.as_ps();
    debug_assert!(p > 0, "cycles_in called with a zero period");
    match rounding {
        Rounding::Ceil => d / p + u64::from(d % p != 0),
        Rounding::Truncate => d / p,
    }
}
