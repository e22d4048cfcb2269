// Parser for vecgen pattern scripts.
//
// Parses a token stream (from the lexer) into an AST. Uses chumsky
// combinators. Top-level items are keyword-led; bodies are generic
// commands with optional nested blocks.
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns an AST plus any parse errors (non-fatal).
// Failure modes: syntax errors produce `Rich` diagnostics; parsing continues.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::lexer::Token;

/// Result of parsing: AST plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub script: Option<Script>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse a script source string. Lexes then parses.
///
/// Returns an AST (if parsing succeeded) plus any errors.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    // Convert lexer output to chumsky stream.
    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = script_parser(source);
    let (script, parse_errors) = parser.parse(stream).into_output_errors();

    // Merge lex errors + parse errors.
    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        script,
        errors: all_errors,
    }
}

// ── Main parser builder ──
//
// All grammar rules are built inside `script_parser` so that the `source`
// reference is captured once and shared by all combinators.

fn script_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Script, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    // ── Separators ──
    //
    // Statements end at a newline or a semicolon.

    let sep_token = just(Token::Newline).or(just(Token::Semicolon));
    let sep = sep_token.clone().repeated().at_least(1).ignored();
    let nl = sep_token.repeated().ignored();

    // ── Word ──
    //
    // Item keywords are also valid words inside bodies and attribute keys
    // (`instance x pattern=erase_all`).

    let word = choice((
        just(Token::Ident),
        just(Token::Pins),
        just(Token::Pattern),
        just(Token::Flow),
        just(Token::Instance),
        just(Token::Patset),
    ))
    .map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start()..span.end()].to_string(),
            span,
        }
    });

    let word_list = word
        .clone()
        .then_ignore(just(Token::Comma).or_not())
        .repeated()
        .at_least(1)
        .collect::<Vec<_>>();

    // ── Arguments ──

    let literal = select! {
        Token::Number(n) = e => Arg::Number(n, e.span()),
        Token::Time(t) = e => Arg::Time(t, e.span()),
        Token::Freq(f) = e => Arg::Freq(f, e.span()),
        Token::StringLit(s) = e => Arg::Str(s, e.span()),
    };

    let value = literal.clone().or(word.clone().map(Arg::Word));

    let arg = word
        .clone()
        .then(just(Token::Equals).ignore_then(value).or_not())
        .map(|(key, value)| match value {
            Some(v) => Arg::Pair(key, Box::new(v)),
            None => Arg::Word(key),
        })
        .or(literal);

    let args = arg
        .then_ignore(just(Token::Comma).or_not())
        .repeated()
        .collect::<Vec<_>>();

    // ── Commands and blocks ──

    let command = recursive(|command| {
        let block = nl
            .clone()
            .ignore_then(
                command
                    .separated_by(sep.clone())
                    .allow_trailing()
                    .collect::<Vec<_>>(),
            )
            .then_ignore(nl.clone())
            .delimited_by(just(Token::LBrace), just(Token::RBrace));

        word.clone()
            .then(args.clone())
            .then(block.or_not())
            .map_with(|((head, args), block), e| Command {
                head,
                args,
                block,
                span: e.span(),
            })
    });

    let body = nl
        .clone()
        .ignore_then(
            command
                .separated_by(sep.clone())
                .allow_trailing()
                .collect::<Vec<_>>(),
        )
        .then_ignore(nl.clone())
        .delimited_by(just(Token::LBrace), just(Token::RBrace));

    // ── Items ──

    let pins_item = just(Token::Pins)
        .ignore_then(word_list.clone())
        .map(ItemKind::Pins);

    let pattern_item = just(Token::Pattern)
        .ignore_then(word.clone())
        .then(body.clone())
        .map(|(name, body)| ItemKind::Pattern(NamedBlock { name, body }));

    let flow_item = just(Token::Flow)
        .ignore_then(word.clone())
        .then(body)
        .map(|(name, body)| ItemKind::Flow(NamedBlock { name, body }));

    let instance_item = just(Token::Instance)
        .ignore_then(word.clone())
        .then(args)
        .map(|(name, args)| ItemKind::Instance { name, args });

    let patset_item = just(Token::Patset)
        .ignore_then(word)
        .then(word_list)
        .map(|(name, patterns)| ItemKind::Patset { name, patterns });

    let item = choice((pins_item, pattern_item, flow_item, instance_item, patset_item))
        .map_with(|kind, e| Item {
            kind,
            span: e.span(),
        });

    // ── Script ──

    nl.clone()
        .ignore_then(
            item.separated_by(sep)
                .allow_trailing()
                .collect::<Vec<_>>(),
        )
        .then_ignore(nl)
        .map_with(move |items, e| Script {
            items,
            span: e.span(),
        })
}

// ── Tests ──
