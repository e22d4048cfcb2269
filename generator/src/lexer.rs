// Lexer for vecgen pattern scripts.
//
// Tokenizes a script into keywords, literals and structure. Uses the `logos`
// crate for DFA-based lexing.
//
// Preconditions: none.
// Postconditions: every token carries its byte range in the script.
// Failure modes: a character no rule accepts becomes a `LexError` and the
//   scan resumes after it.
// Side effects: none.

use logos::Logos;
use std::fmt;

use crate::time::Time;

/// Byte range of a token in the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A character sequence no token rule accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Tokens in script order, plus whatever could not be tokenized.
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// Script token types.
///
/// Only the top-level item keywords are reserved; statement names inside
/// blocks are identifiers. Identifiers carry no value — use the span to
/// retrieve the text from the source.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+|#[^\n]*")]
pub enum Token {
    // ── Keywords ──
    #[token("pins")]
    Pins,
    #[token("pattern")]
    Pattern,
    #[token("flow")]
    Flow,
    #[token("instance")]
    Instance,
    #[token("patset")]
    Patset,

    // ── Symbols ──
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token("=")]
    Equals,
    #[token(";")]
    Semicolon,

    // ── Literals ──
    //
    // Time and frequency regexes match a number plus a unit suffix, so the
    // longer match wins over a bare number.
    /// Time literal (e.g. `40ns`, `10ms`).
    #[regex(r"[0-9]+(\.[0-9]+)?(ps|ns|us|ms|s)", parse_time)]
    Time(Time),

    /// Frequency literal (e.g. `2MHz`). Value stored in Hz.
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?(Hz|kHz|MHz|GHz)", parse_freq)]
    Freq(f64),

    /// Numeric literal (int, float, exponent).
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", parse_number)]
    Number(f64),

    /// String literal with `\"` and `\\` escapes.
    #[regex(r#""([^"\\]|\\.)*""#, parse_string)]
    StringLit(String),

    // ── Identifier ──
    /// Identifier: `[a-zA-Z_][a-zA-Z0-9_]*`
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    // ── Structure ──
    /// One or more newlines (statement terminator).
    #[regex(r"\n+")]
    Newline,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Pins => write!(f, "pins"),
            Token::Pattern => write!(f, "pattern"),
            Token::Flow => write!(f, "flow"),
            Token::Instance => write!(f, "instance"),
            Token::Patset => write!(f, "patset"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Equals => write!(f, "="),
            Token::Semicolon => write!(f, ";"),
            Token::Time(t) => write!(f, "{t}"),
            Token::Freq(v) => write!(f, "{v}Hz"),
            Token::Number(v) => write!(f, "{v}"),
            Token::StringLit(s) => write!(f, "\"{s}\""),
            Token::Ident => write!(f, "<ident>"),
            Token::Newline => write!(f, "<newline>"),
        }
    }
}

// ── Callbacks ──

fn parse_number(lex: &mut logos::Lexer<'_, Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn split_unit(slice: &str) -> Option<(f64, &str)> {
    let unit_start = slice.find(|c: char| c.is_ascii_alphabetic() && c != 'e' && c != 'E')?;
    let (num_str, unit) = slice.split_at(unit_start);
    Some((num_str.parse().ok()?, unit))
}

fn parse_time(lex: &mut logos::Lexer<'_, Token>) -> Option<Time> {
    let (num, unit) = split_unit(lex.slice())?;
    let time = match unit {
        "ps" => Time::from_ps_f64(num),
        "ns" => Time::from_ns(num),
        "us" => Time::from_us(num),
        "ms" => Time::from_ms(num),
        "s" => Time::from_s(num),
        _ => return None,
    };
    Some(time)
}

fn parse_freq(lex: &mut logos::Lexer<'_, Token>) -> Option<f64> {
    let (num, unit) = split_unit(lex.slice())?;
    let multiplier = match unit {
        "Hz" => 1.0,
        "kHz" => 1_000.0,
        "MHz" => 1_000_000.0,
        "GHz" => 1_000_000_000.0,
        _ => return None,
    };
    Some(num * multiplier)
}

fn parse_string(lex: &mut logos::Lexer<'_, Token>) -> Option<String> {
    let slice = lex.slice();
    let body = slice.strip_prefix('"')?.strip_suffix('"')?;
    let mut text = String::new();
    let mut escaped = false;
    for c in body.chars() {
        match (escaped, c) {
            (false, '\\') => escaped = true,
            (false, c) => text.push(c),
            (true, '"' | '\\') => {
                text.push(c);
                escaped = false;
            }
            (true, _) => return None,
        }
    }
    Some(text)
}

// ── Public API ──

/// Tokenize `source`. Bad characters are reported, never fatal.
pub fn lex(source: &str) -> LexResult {
    let mut out = LexResult {
        tokens: Vec::new(),
        errors: Vec::new(),
    };
    for (token, range) in Token::lexer(source).spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match token {
            Ok(token) => out.tokens.push((token, span)),
            Err(()) => out.errors.push(LexError {
                span,
                message: format!("unrecognized input {:?}", &source[range]),
            }),
        }
    }
    out
}

// ── Tests ──
