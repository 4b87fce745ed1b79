//! Macro invocation parsing and replacement-list substitution (§4.E).
//!
//! Argument collection is expressed over a generic token-pulling closure so
//! it stays independent of the source stack; the driver supplies the
//! closure, wired to [`crate::source::SourceStack::pull`]. Substitution
//! (`#`/`##`/parameter replacement) is pure and operates entirely on
//! [`crate::macros::Macro::replacement`] plus the collected arguments.

use crate::macros::{Argument, Macro};
use crate::lexer::Lexer;
use crate::token::{Punctuator, Token, TokenKind, TokenValue};

/// Parses the parenthesized argument list of a function-like macro
/// invocation. The caller has already consumed the invocation's `(`; `pull`
/// must hand back one raw token at a time, `Token::eof` at end of input
/// (§4.E "Argument collection").
pub fn collect_arguments(
    mac: &Macro,
    mut pull: impl FnMut() -> Token,
) -> Result<Vec<Argument>, String> {
    let mut args: Vec<Vec<Token>> = vec![Vec::new()];
    let mut depth: u32 = 0;
    loop {
        let tok = pull();
        if tok.is_eof() {
            return Err(format!(
                "unterminated argument list invoking macro \"{}\"",
                mac.name
            ));
        }
        match &tok.kind {
            TokenKind::Punct(Punctuator::LParen) => {
                depth += 1;
                args.last_mut().unwrap().push(tok);
            }
            TokenKind::Punct(Punctuator::RParen) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                args.last_mut().unwrap().push(tok);
            }
            TokenKind::Punct(Punctuator::Comma)
                if depth == 0 && !(mac.is_variadic && args.len() > mac.params.len()) =>
            {
                args.push(Vec::new());
            }
            _ => args.last_mut().unwrap().push(tok),
        }
    }

    for a in args.iter_mut() {
        while a.first().is_some_and(|t| t.is_whitespace_like()) {
            a.remove(0);
        }
        while a.last().is_some_and(|t| t.is_whitespace_like()) {
            a.pop();
        }
    }

    let expected = mac.params.len();
    if !mac.is_variadic {
        if expected == 0 && args.len() == 1 && args[0].is_empty() {
            args.clear();
        }
        if args.len() != expected {
            return Err(format!(
                "macro \"{}\" passed {} arguments, but takes {}",
                mac.name,
                args.len(),
                expected
            ));
        }
    } else {
        if args.len() < expected {
            return Err(format!(
                "macro \"{}\" requires at least {} arguments",
                mac.name, expected
            ));
        }
        if args.len() > expected {
            let extra = args.split_off(expected);
            let mut merged = Vec::new();
            for (i, part) in extra.into_iter().enumerate() {
                if i > 0 {
                    merged.push(Token::new(TokenKind::Punct(Punctuator::Comma), 0, 0, ","));
                }
                merged.extend(part);
            }
            args.push(merged);
        } else {
            args.push(Vec::new());
        }
    }

    Ok(args.into_iter().map(Argument::new).collect())
}

/// Output of [`substitute`]: the fully substituted and pasted replacement
/// tokens, plus any paste-validity warnings to forward to the diagnostic
/// listener (SPEC §9 resolved: an invalid `##` paste re-lexes to the two
/// original tokens rather than panicking).
pub struct SubstituteResult {
    pub tokens: Vec<Token>,
    pub warnings: Vec<(u32, u32, String)>,
}

enum Part {
    Tokens(Vec<Token>),
    Paste,
}

fn significant(repl: &[Token], mut i: isize, step: isize) -> Option<&Token> {
    loop {
        i += step;
        let tok = repl.get(usize::try_from(i).ok()?)?;
        if !tok.is_whitespace_like() {
            return Some(tok);
        }
    }
}

/// Builds the replacement tokens for one macro invocation: substitutes
/// `MArg`/`MString` markers with (pre-expanded or raw) argument tokens, then
/// resolves every `MPaste` by combining its neighboring tokens (§4.E
/// "Substitution", "Concatenation").
pub fn substitute(
    mac: &Macro,
    args: &[Argument],
    mut pre_expand: impl FnMut(&[Token]) -> Vec<Token>,
) -> SubstituteResult {
    let repl = &mac.replacement;
    let mut parts = Vec::with_capacity(repl.len());

    for (i, tok) in repl.iter().enumerate() {
        match tok.kind {
            TokenKind::MString => {
                let idx = tok.arg_index().unwrap();
                let spelling = args.get(idx).map(|a| a.spelling()).unwrap_or_default();
                let text = format!("\"{}\"", escape_for_stringize(&spelling));
                parts.push(Part::Tokens(vec![Token::new(
                    TokenKind::StringLiteral,
                    tok.line,
                    tok.col,
                    text,
                )
                .with_value(TokenValue::Text(spelling))]));
            }
            TokenKind::MPaste => parts.push(Part::Paste),
            TokenKind::MArg => {
                let idx = tok.arg_index().unwrap();
                let i = i as isize;
                let adjacent_paste = matches!(significant(repl, i, -1), Some(t) if t.kind == TokenKind::MPaste)
                    || matches!(significant(repl, i, 1), Some(t) if t.kind == TokenKind::MPaste);
                let toks = match args.get(idx) {
                    Some(arg) if adjacent_paste => arg
                        .raw
                        .iter()
                        .filter(|t| !t.is_whitespace_like())
                        .cloned()
                        .collect(),
                    Some(arg) => arg.expanded_with(&mut pre_expand).to_vec(),
                    None => Vec::new(),
                };
                parts.push(Part::Tokens(toks));
            }
            _ => parts.push(Part::Tokens(vec![tok.clone()])),
        }
    }

    let mut result: Vec<Token> = Vec::new();
    let mut warnings = Vec::new();
    let mut i = 0;
    while i < parts.len() {
        match &parts[i] {
            Part::Tokens(toks) => {
                result.extend(toks.iter().cloned());
                i += 1;
            }
            Part::Paste => {
                while matches!(result.last(), Some(t) if t.is_whitespace_like()) {
                    result.pop();
                }
                let left = result.pop();
                let mut j = i + 1;
                while let Some(Part::Tokens(t)) = parts.get(j) {
                    if t.len() == 1 && t[0].is_whitespace_like() {
                        j += 1;
                    } else {
                        break;
                    }
                }
                let right_tokens = match parts.get(j) {
                    Some(Part::Tokens(t)) => t.clone(),
                    _ => Vec::new(),
                };
                match (left, right_tokens.split_first()) {
                    (Some(l), Some((rf, rest))) => {
                        let combined = format!("{}{}", l.text, rf.text);
                        match relex_paste(&combined, l.line, l.col) {
                            Some(t) => result.push(t),
                            None => {
                                warnings.push((
                                    l.line,
                                    l.col,
                                    format!(
                                        "pasting \"{}\" and \"{}\" does not give a valid preprocessing token",
                                        l.text, rf.text
                                    ),
                                ));
                                result.push(l);
                                result.push(rf.clone());
                            }
                        }
                        result.extend(rest.iter().cloned());
                    }
                    (Some(l), None) => result.push(l),
                    (None, Some((rf, rest))) => {
                        result.push(rf.clone());
                        result.extend(rest.iter().cloned());
                    }
                    (None, None) => {}
                }
                i = j + 1;
            }
        }
    }

    SubstituteResult {
        tokens: result,
        warnings,
    }
}

fn escape_for_stringize(spelling: &str) -> String {
    let mut out = String::with_capacity(spelling.len());
    for c in spelling.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Re-lexes a pasted token's text; `None` means the paste did not produce a
/// single valid preprocessing token.
fn relex_paste(text: &str, line: u32, col: u32) -> Option<Token> {
    let mut lexer = Lexer::new(text);
    lexer.quiet = true;
    let first = lexer.next_token();
    if first.kind == TokenKind::Invalid {
        return None;
    }
    let second = lexer.next_token();
    if !second.is_eof() {
        return None;
    }
    Some(Token {
        line,
        col,
        ..first
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::Macro;
    use proptest::prelude::*;

    fn ident(text: &str) -> Token {
        Token::new(TokenKind::Identifier, 1, 1, text)
    }

    fn comma() -> Token {
        Token::new(TokenKind::Punct(Punctuator::Comma), 1, 1, ",")
    }

    fn rparen() -> Token {
        Token::new(TokenKind::Punct(Punctuator::RParen), 1, 1, ")")
    }

    #[test]
    fn collects_simple_two_arg_call() {
        let mac = Macro::function_like(
            "ADD",
            "t.c",
            1,
            1,
            vec!["a".into(), "b".into()],
            false,
            &[ident("a")],
        )
        .unwrap();
        let mut stream = vec![ident("1"), comma(), ident("2"), rparen()].into_iter();
        let args = collect_arguments(&mac, move || stream.next().unwrap()).unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].raw[0].text, "1");
        assert_eq!(args[1].raw[0].text, "2");
    }

    #[test]
    fn zero_param_macro_allows_single_empty_argument() {
        let mac = Macro::function_like("F", "t.c", 1, 1, vec![], false, &[ident("x")]).unwrap();
        let mut stream = vec![rparen()].into_iter();
        let args = collect_arguments(&mac, move || stream.next().unwrap()).unwrap();
        assert!(args.is_empty());
    }

    #[test]
    fn variadic_merges_trailing_commas() {
        let mac = Macro::function_like(
            "LOG",
            "t.c",
            1,
            1,
            vec!["fmt".into()],
            true,
            &[ident("fmt")],
        )
        .unwrap();
        let mut stream = vec![ident("s"), comma(), ident("a"), comma(), ident("b"), rparen()]
            .into_iter();
        let args = collect_arguments(&mac, move || stream.next().unwrap()).unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[1].raw.len(), 3);
    }

    #[test]
    fn substitute_object_macro_pastes_tokens() {
        let a = ident("foo");
        let hh = Token::new(TokenKind::Punct(Punctuator::HashHash), 1, 1, "##");
        let b = ident("bar");
        let mac = Macro::object_like("CAT", "t.c", 1, 1, &[a, hh, b]).unwrap();
        let out = substitute(&mac, &[], |toks| toks.to_vec());
        assert_eq!(out.tokens.len(), 1);
        assert_eq!(out.tokens[0].text, "foobar");
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn substitute_invalid_paste_warns_and_keeps_both_tokens() {
        let a = ident("foo");
        let hh = Token::new(TokenKind::Punct(Punctuator::HashHash), 1, 1, "##");
        let plus = Token::new(TokenKind::Punct(Punctuator::Plus), 1, 1, "+");
        let mac = Macro::object_like("BAD", "t.c", 1, 1, &[a, hh, plus]).unwrap();
        let out = substitute(&mac, &[], |toks| toks.to_vec());
        assert_eq!(out.tokens.len(), 2);
        assert_eq!(out.tokens[0].text, "foo");
        assert_eq!(out.tokens[1].text, "+");
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn substitute_stringizes_argument_with_collapsed_whitespace() {
        let hash = Token::new(TokenKind::Punct(Punctuator::Hash), 1, 1, "#");
        let body = vec![hash, ident("x")];
        let mac =
            Macro::function_like("STR", "t.c", 1, 1, vec!["x".into()], false, &body).unwrap();
        let arg = Argument::new(vec![ident("hello"), Token::new(TokenKind::Whitespace, 1, 1, " "), ident("world")]);
        let out = substitute(&mac, &[arg], |toks| toks.to_vec());
        assert_eq!(out.tokens[0].text, "\"hello world\"");
    }

    #[test]
    fn substitute_uses_raw_argument_when_adjacent_to_paste() {
        let hh = Token::new(TokenKind::Punct(Punctuator::HashHash), 1, 1, "##");
        let body = vec![ident("pre"), hh, ident("x")];
        let mac = Macro::function_like("P", "t.c", 1, 1, vec!["x".into()], false, &body).unwrap();
        let mut pre_expand_calls = 0;
        let arg = Argument::new(vec![ident("NAME")]);
        let out = substitute(&mac, &[arg], |toks| {
            pre_expand_calls += 1;
            toks.to_vec()
        });
        assert_eq!(out.tokens[0].text, "preNAME");
        assert_eq!(pre_expand_calls, 0);
    }

    proptest! {
        /// Pasting two halves of an identifier-shaped string always produces
        /// a single identifier token whose spelling is exactly the input.
        #[test]
        fn relex_paste_round_trips_identifier_shaped_text(
            head in "[A-Za-z_]",
            tail in "[A-Za-z0-9_]{0,8}",
        ) {
            let text = format!("{head}{tail}");
            let tok = relex_paste(&text, 1, 1).expect("identifier-shaped paste should relex");
            prop_assert_eq!(tok.kind, TokenKind::Identifier);
            prop_assert_eq!(tok.text, text);
        }

        /// `collect_arguments` always splits a comma-joined invocation into
        /// exactly one `Argument` per top-level comma group, for any
        /// non-variadic arity.
        #[test]
        fn collect_arguments_reports_one_argument_per_comma_group(n in 1usize..6) {
            let params: Vec<String> = (0..n).map(|i| format!("p{i}")).collect();
            let mac = Macro::function_like("M", "t.c", 1, 1, params, false, &[ident("x")]).unwrap();
            let mut stream = Vec::new();
            for i in 0..n {
                if i > 0 {
                    stream.push(comma());
                }
                stream.push(ident("a"));
            }
            stream.push(rparen());
            let mut iter = stream.into_iter();
            let args = collect_arguments(&mac, move || iter.next().unwrap()).unwrap();
            prop_assert_eq!(args.len(), n);
        }
    }
}
