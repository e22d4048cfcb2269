// error.rs — Fatal generation errors
//
// Every condition that must abort the current pattern or flow is a variant
// here. Recoverable conditions are `Diagnostic` warnings instead (see diag.rs).

use thiserror::Error;

/// A fatal configuration or generation error.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum GenError {
    #[error("no active timeset: {operation} needs a timeset with a period")]
    NoActiveTimeset { operation: String },

    #[error("timeset '{0}' has not been defined")]
    UnknownTimeset(String),

    #[error("timeset '{0}' must have a non-zero period")]
    InvalidPeriod(String),

    #[error("repeat count must be at least 1, got {0}")]
    InvalidRepeat(i64),

    #[error("invalid wave formula '{expr}': {message}")]
    Formula { expr: String, message: String },

    #[error("pin '{0}' has not been defined")]
    UnknownPin(String),

    #[error("pin '{0}' is already defined")]
    DuplicatePin(String),

    #[error("clock on pin '{0}' must be enabled before it is started or resumed")]
    ClockNotEnabled(String),

    #[error("clock on pin '{0}' is not running")]
    ClockNotRunning(String),

    #[error("clock on pin '{0}' is not paused")]
    ClockNotPaused(String),

    #[error("invalid clock frequency {hz}Hz for pin '{pin}'")]
    InvalidFrequency { pin: String, hz: f64 },

    #[error("store offset {offset} is out of range: only {available} vectors have been emitted")]
    StoreOffset { offset: usize, available: usize },

    #[error("vector group size must be at least 1, got {0}")]
    InvalidGroupSize(u32),

    #[error("clock on pin '{pin}' toggles every {half_period} cycles, which is not a multiple of vector group size {group_size}")]
    ClockGroupMismatch { pin: String, half_period: u64, group_size: u32 },

    #[error("clock edge at cycle {cycle} falls inside a vector group of size {group_size}")]
    ClockInsideGroup { cycle: u64, group_size: u32 },

    #[error("both if_job and unless_job have been defined for flow line '{line}'")]
    JobConflict { line: String },

    #[error("duplicate name '{name}' generated in sheet '{sheet}'")]
    DuplicateName { sheet: String, name: String },

    #[error("flow line '{line}' references '{target}', which is not defined earlier in the flow")]
    UnresolvedReference { line: String, target: String },

    #[error("flow line '{line}' has more than two pass/fail/ran conditions")]
    TooManyConditions { line: String },

    #[error("{platform} cannot render this pattern: {message}")]
    Render { platform: String, message: String },
}
