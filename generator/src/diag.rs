// diag.rs — Unified diagnostics model
//
// Warnings from the engine (clock quantization, cross-sheet duplicates, ...)
// and errors from the script front end share one type. Engine diagnostics
// carry no span; script diagnostics point at the offending statement.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: `Diagnostic::warning` also forwards the message to `log`.

use std::fmt;

use crate::ast::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0001`, `W0101`).
///
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registered diagnostic codes.
pub mod codes {
    use super::DiagCode;

    /// Lex or parse error in a pattern script.
    pub const E0001: DiagCode = DiagCode("E0001");
    /// Script statement used outside the block kind that supports it.
    pub const E0002: DiagCode = DiagCode("E0002");
    /// Execution of a statement failed with a fatal generation error.
    pub const E0100: DiagCode = DiagCode("E0100");

    /// Clock frequency does not divide the timeset period evenly.
    pub const W0101: DiagCode = DiagCode("W0101");
    /// A clock is running across a hardware loop.
    pub const W0102: DiagCode = DiagCode("W0102");
    /// Repeat rounded up to a multiple of the vector group size.
    pub const W0103: DiagCode = DiagCode("W0103");
    /// Name already generated by a different sheet in this session.
    pub const W0201: DiagCode = DiagCode("W0201");
    /// Unknown flow-line attribute ignored.
    pub const W0301: DiagCode = DiagCode("W0301");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by the engine or the script front end.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Option<Span>,
    pub message: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, span, or hint.
    pub fn new(level: DiagLevel, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span: None,
            message: message.into(),
            hint: None,
        }
    }

    /// A coded warning, also logged through the `log` facade.
    pub fn warning(code: DiagCode, message: impl Into<String>) -> Self {
        let diag = Self::new(DiagLevel::Warning, message).with_code(code);
        log::warn!("{}", diag);
        diag
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach the source location of the statement that caused it.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// True if any diagnostic in the list is an error.
pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(Diagnostic::is_error)
}
