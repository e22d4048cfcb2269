// AST node types for vecgen pattern scripts.
//
// A script is a list of top-level items. Pattern and flow bodies are lists
// of generic commands (`head arg* block?`); the interpreter gives each head
// its meaning. Every node carries a `SimpleSpan` for error reporting.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use chumsky::span::SimpleSpan;

use crate::time::Time;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

// ── Root ──

/// A complete script: a sequence of top-level items.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub items: Vec<Item>,
    pub span: Span,
}

/// A top-level item with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub kind: ItemKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    /// `pins a, b, c`
    Pins(Vec<Ident>),
    /// `pattern NAME { ... }`
    Pattern(NamedBlock),
    /// `flow NAME { ... }`
    Flow(NamedBlock),
    /// `instance NAME key=value ...`
    Instance { name: Ident, args: Vec<Arg> },
    /// `patset NAME pattern, pattern ...`
    Patset { name: Ident, patterns: Vec<Ident> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedBlock {
    pub name: Ident,
    pub body: Vec<Command>,
}

// ── Commands ──

/// `head arg* { command* }?`
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub head: Ident,
    pub args: Vec<Arg>,
    pub block: Option<Vec<Command>>,
    pub span: Span,
}

impl Command {
    pub fn name(&self) -> &str {
        &self.head.name
    }

    /// Value of the first `key=value` argument named `key`.
    pub fn pair(&self, key: &str) -> Option<&Arg> {
        self.args.iter().find_map(|a| match a {
            Arg::Pair(k, v) if k.name == key => Some(v.as_ref()),
            _ => None,
        })
    }

    /// Arguments that are not `key=value` pairs.
    pub fn positional(&self) -> impl Iterator<Item = &Arg> {
        self.args.iter().filter(|a| !matches!(a, Arg::Pair(..)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Word(Ident),
    Number(f64, Span),
    Time(Time, Span),
    Freq(f64, Span),
    Str(String, Span),
    Pair(Ident, Box<Arg>),
}

impl Arg {
    pub fn span(&self) -> Span {
        match self {
            Arg::Word(id) => id.span,
            Arg::Number(_, s) | Arg::Time(_, s) | Arg::Freq(_, s) | Arg::Str(_, s) => *s,
            Arg::Pair(k, v) => (k.span.start..v.span().end).into(),
        }
    }

    /// Text form of a scalar argument, as written into attribute columns.
    pub fn text(&self) -> String {
        match self {
            Arg::Word(id) => id.name.clone(),
            Arg::Number(n, _) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Arg::Time(t, _) => t.to_string(),
            Arg::Freq(f, _) => crate::time::Frequency::from_hz(*f).to_string(),
            Arg::Str(s, _) => s.clone(),
            Arg::Pair(k, v) => format!("{}={}", k.name, v.text()),
        }
    }
}

/// An identifier with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}
