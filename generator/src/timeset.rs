// timeset.rs — Timeset / period registry and wave formulas
//
// A timeset is a named timing context: a period plus optional per-pin wave
// edges. Timesets are created on first reference. Exactly one timeset is
// active at a time; scoped switches save the active index and restore it
// when the scope ends.
//
// Preconditions: periods are non-zero.
// Postconditions: the active timeset always refers to a registered entry.
// Failure modes: `NoActiveTimeset`, `UnknownTimeset`, `InvalidPeriod`, `Formula`.
// Side effects: none.

use std::collections::HashMap;

use logos::Logos;
use serde::Serialize;

use crate::error::GenError;
use crate::id::PinId;
use crate::time::{cycles_in, Rounding, Time};

// ── Data types ──────────────────────────────────────────────────────────────

/// Drive/compare edge formulas for one pin, relative to the period start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Wave {
    pub pin: PinId,
    pub drive: Option<String>,
    pub compare: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timeset {
    pub name: String,
    pub period: Option<Time>,
    pub waves: Vec<Wave>,
}

impl Timeset {
    fn new(name: &str) -> Self {
        Timeset {
            name: name.to_string(),
            period: None,
            waves: Vec::new(),
        }
    }

    /// Evaluated edge times in ns for every wave: (pin, drive, compare).
    pub fn wave_edges(&self) -> Result<Vec<(PinId, Option<f64>, Option<f64>)>, GenError> {
        let period = self.period.ok_or_else(|| GenError::NoActiveTimeset {
            operation: format!("evaluating waves of timeset '{}'", self.name),
        })?;
        self.waves
            .iter()
            .map(|w| {
                let drive = w
                    .drive
                    .as_deref()
                    .map(|e| evaluate_wave_formula(e, period))
                    .transpose()?;
                let compare = w
                    .compare
                    .as_deref()
                    .map(|e| evaluate_wave_formula(e, period))
                    .transpose()?;
                Ok((w.pin, drive, compare))
            })
            .collect()
    }
}

/// Opaque saved active-timeset position, returned by `save` and consumed by
/// `restore` to close a scoped switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveTimeset(Option<usize>);

// ── Registry ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct TimesetRegistry {
    timesets: Vec<Timeset>,
    index: HashMap<String, usize>,
    active: Option<usize>,
}

impl TimesetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn define(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.timesets.len();
        self.timesets.push(Timeset::new(name));
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Register (if new) and activate a timeset.
    ///
    /// A `None` period keeps the timeset's own period, or inherits the period
    /// of the currently active timeset when it has none yet.
    pub fn set_timeset(&mut self, name: &str, period: Option<Time>) -> Result<(), GenError> {
        if period.is_some_and(Time::is_zero) {
            return Err(GenError::InvalidPeriod(name.to_string()));
        }
        let inherited = self.current().and_then(|t| t.period);
        let idx = self.define(name);
        let ts = &mut self.timesets[idx];
        match period {
            Some(p) => ts.period = Some(p),
            None => {
                if ts.period.is_none() {
                    ts.period = inherited;
                }
            }
        }
        self.active = Some(idx);
        Ok(())
    }

    pub fn save(&self) -> ActiveTimeset {
        ActiveTimeset(self.active)
    }

    pub fn restore(&mut self, saved: ActiveTimeset) {
        self.active = saved.0;
    }

    pub fn current(&self) -> Option<&Timeset> {
        self.active.map(|idx| &self.timesets[idx])
    }

    pub fn get(&self, name: &str) -> Option<&Timeset> {
        self.index.get(name).map(|&idx| &self.timesets[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Timeset> {
        self.timesets.iter()
    }

    /// Resolve an explicit timeset name (or the active timeset) to one with
    /// a period, for an emission described by `operation`.
    pub fn resolve(&self, name: Option<&str>, operation: &str) -> Result<&Timeset, GenError> {
        let ts = match name {
            Some(n) => self
                .get(n)
                .ok_or_else(|| GenError::UnknownTimeset(n.to_string()))?,
            None => self.current().ok_or_else(|| GenError::NoActiveTimeset {
                operation: operation.to_string(),
            })?,
        };
        if ts.period.is_none() {
            return Err(GenError::NoActiveTimeset {
                operation: operation.to_string(),
            });
        }
        Ok(ts)
    }

    pub fn current_period(&self) -> Result<Time, GenError> {
        self.current()
            .and_then(|t| t.period)
            .ok_or_else(|| GenError::NoActiveTimeset {
                operation: "period lookup".to_string(),
            })
    }

    /// Cycles needed to cover `duration` at the current period, rounded up.
    pub fn cycles_for_duration(&self, duration: Time) -> Result<u64, GenError> {
        self.cycles_for_duration_with(duration, Rounding::Ceil)
    }

    pub fn cycles_for_duration_with(
        &self,
        duration: Time,
        rounding: Rounding,
    ) -> Result<u64, GenError> {
        let period = self.current_period()?;
        Ok(cycles_in(duration, period, rounding))
    }

    /// Attach wave formulas for `pin` to a timeset, validating both formulas.
    pub fn add_wave(
        &mut self,
        timeset: &str,
        pin: PinId,
        drive: Option<&str>,
        compare: Option<&str>,
    ) -> Result<(), GenError> {
        for expr in drive.iter().chain(compare.iter()) {
            validate_formula(expr)?;
        }
        let idx = self.define(timeset);
        let waves = &mut self.timesets[idx].waves;
        waves.retain(|w| w.pin != pin);
        waves.push(Wave {
            pin,
            drive: drive.map(str::to_string),
            compare: compare.map(str::to_string),
        });
        Ok(())
    }
}

// ── Wave formulas ───────────────────────────────────────────────────────────

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t]+")]
enum FormulaToken {
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
}

/// Evaluate an edge formula. The only free variables are `period` and
/// `period_in_ns`, both bound to the period in nanoseconds.
pub fn evaluate_wave_formula(expr: &str, period: Time) -> Result<f64, GenError> {
    let mut tokens = Vec::new();
    for (tok, range) in FormulaToken::lexer(expr).spanned() {
        match tok {
            Ok(t) => tokens.push(t),
            Err(()) => {
                return Err(formula_error(
                    expr,
                    format!("unexpected character {:?}", &expr[range]),
                ))
            }
        }
    }
    let mut eval = FormulaEval {
        expr,
        tokens: &tokens,
        pos: 0,
        period_ns: period.as_ns(),
    };
    let value = eval.expr()?;
    if eval.pos != tokens.len() {
        return Err(formula_error(expr, "unexpected trailing input".to_string()));
    }
    if !value.is_finite() {
        return Err(formula_error(expr, "result is not a finite number".to_string()));
    }
    Ok(value)
}

fn validate_formula(expr: &str) -> Result<(), GenError> {
    evaluate_wave_formula(expr, Time::from_ns(1.0)).map(|_| ())
}

fn formula_error(expr: &str, message: String) -> GenError {
    GenError::Formula {
        expr: expr.to_string(),
        message,
    }
}

struct FormulaEval<'a> {
    expr: &'a str,
    tokens: &'a [FormulaToken],
    pos: usize,
    period_ns: f64,
}

impl FormulaEval<'_> {
    fn peek(&self) -> Option<&FormulaToken> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&FormulaToken> {
        let tok = self.tokens.get(self.pos);
        self.pos += 1;
        tok
    }

    fn expr(&mut self) -> Result<f64, GenError> {
        let mut value = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                FormulaToken::Plus => {
                    self.pos += 1;
                    value += self.term()?;
                }
                FormulaToken::Minus => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, GenError> {
        let mut value = self.unary()?;
        while let Some(op) = self.peek() {
            match op {
                FormulaToken::Star => {
                    self.pos += 1;
                    value *= self.unary()?;
                }
                FormulaToken::Slash => {
                    self.pos += 1;
                    value /= self.unary()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64, GenError> {
        if self.peek() == Some(&FormulaToken::Minus) {
            self.pos += 1;
            return Ok(-self.unary()?);
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<f64, GenError> {
        let expr = self.expr;
        let period_ns = self.period_ns;
        match self.bump().cloned() {
            Some(FormulaToken::Number(n)) => Ok(n),
            Some(FormulaToken::Ident(name)) => match name.as_str() {
                "period" | "period_in_ns" => Ok(period_ns),
                other => Err(formula_error(
                    expr,
                    format!("unknown variable '{other}' (only period and period_in_ns are allowed)"),
                )),
            },
            Some(FormulaToken::LParen) => {
                let value = self.expr()?;
                match self.bump() {
                    Some(FormulaToken::RParen) => Ok(value),
                    _ => Err(formula_error(expr, "missing ')'".to_string())),
                }
            }
            Some(tok) => Err(formula_error(expr, format!("unexpected token {tok:?}"))),
            None => Err(formula_error(expr, "unexpected end of formula".to_string())),
        }
    }
}
