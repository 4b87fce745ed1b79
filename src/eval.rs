//! Constant-expression evaluation for `#if`/`#elif` (§4.G).
//!
//! A small precedence-climbing (Pratt) parser over a token stream the driver
//! has already macro-expanded (save for `defined`, recognized here so its
//! operand is never macro-expanded). Per the resolved open question, `&&`
//! and `||` do not short-circuit — both operands are always evaluated, which
//! keeps this evaluator a single uniform recursive-descent pass instead of
//! two (eager and lazy) evaluation modes.

use crate::error::{Error, Result};
use crate::token::{Punctuator, Token, TokenKind};

/// Queried to answer `defined X` without macro-expanding `X`.
pub trait DefinedQuery {
    fn is_defined(&self, name: &str) -> bool;
}

impl<F: Fn(&str) -> bool> DefinedQuery for F {
    fn is_defined(&self, name: &str) -> bool {
        self(name)
    }
}

/// Evaluates a constant expression. `next_token` must yield an `Eof` token
/// once exhausted and may be called exactly once per token (no pushback is
/// needed by this parser). Returns the `long`-width result plus any
/// non-fatal warnings (undefined identifier, division by zero).
pub fn evaluate(
    next_token: impl FnMut() -> Token,
    defined: impl DefinedQuery,
    source_name: &str,
) -> Result<(i64, Vec<(u32, u32, String)>)> {
    evaluate_with_warnings(next_token, defined, source_name, true)
}

/// As [`evaluate`], but lets the caller gate the "identifier is not defined"
/// diagnostic behind `Warning::Undef` (§6 "Warnings ... membership controls
/// whether they are raised at all").
pub fn evaluate_with_warnings(
    mut next_token: impl FnMut() -> Token,
    defined: impl DefinedQuery,
    source_name: &str,
    warn_undef: bool,
) -> Result<(i64, Vec<(u32, u32, String)>)> {
    let first = next_token();
    let mut ev = Evaluator {
        next_token: &mut next_token,
        defined: &defined,
        current: first,
        source_name,
        warnings: Vec::new(),
        warn_undef,
    };
    let value = ev.parse_ternary()?;
    if !matches!(ev.current.kind, TokenKind::Eof) {
        return Err(ev.error(format!("unexpected token '{}' in expression", ev.current.text)));
    }
    Ok((value, ev.warnings))
}

struct Evaluator<'a> {
    next_token: &'a mut dyn FnMut() -> Token,
    defined: &'a dyn DefinedQuery,
    current: Token,
    source_name: &'a str,
    warnings: Vec<(u32, u32, String)>,
    warn_undef: bool,
}

impl<'a> Evaluator<'a> {
    fn advance(&mut self) {
        self.current = (self.next_token)();
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Eval {
            file: self.source_name.to_string(),
            line: self.current.line,
            col: self.current.col,
            message: message.into(),
        }
    }

    fn expect_punct(&mut self, p: Punctuator, what: &str) -> Result<()> {
        if self.current.kind == TokenKind::Punct(p) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn parse_ternary(&mut self) -> Result<i64> {
        let cond = self.parse_binary(1)?;
        if self.current.kind == TokenKind::Punct(Punctuator::Question) {
            self.advance();
            let then_val = self.parse_ternary()?;
            self.expect_punct(Punctuator::Colon, "':' in conditional expression")?;
            let else_val = self.parse_ternary()?;
            Ok(if cond != 0 { then_val } else { else_val })
        } else {
            Ok(cond)
        }
    }

    fn binop_bp(p: Punctuator) -> Option<u8> {
        use Punctuator::*;
        Some(match p {
            PipePipe => 1,
            AmpAmp => 2,
            Pipe => 3,
            Caret => 4,
            Amp => 5,
            Eq | NotEq => 6,
            Less | LessEq | Greater | GreaterEq => 7,
            ShiftLeft | ShiftRight => 8,
            Plus | Minus => 9,
            Star | Slash | Percent => 10,
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_bp: u8) -> Result<i64> {
        let mut lhs = self.parse_unary()?;
        loop {
            let TokenKind::Punct(p) = self.current.kind else {
                break;
            };
            let Some(bp) = Self::binop_bp(p) else { break };
            if bp < min_bp {
                break;
            }
            let (line, col) = (self.current.line, self.current.col);
            self.advance();
            let rhs = self.parse_binary(bp + 1)?;
            lhs = self.apply_binop(p, lhs, rhs, line, col)?;
        }
        Ok(lhs)
    }

    fn apply_binop(&mut self, p: Punctuator, lhs: i64, rhs: i64, line: u32, col: u32) -> Result<i64> {
        use Punctuator::*;
        Ok(match p {
            PipePipe => i64::from(lhs != 0 || rhs != 0),
            AmpAmp => i64::from(lhs != 0 && rhs != 0),
            Pipe => lhs | rhs,
            Caret => lhs ^ rhs,
            Amp => lhs & rhs,
            Eq => i64::from(lhs == rhs),
            NotEq => i64::from(lhs != rhs),
            Less => i64::from(lhs < rhs),
            LessEq => i64::from(lhs <= rhs),
            Greater => i64::from(lhs > rhs),
            GreaterEq => i64::from(lhs >= rhs),
            ShiftLeft => lhs.wrapping_shl(rhs.rem_euclid(64) as u32),
            ShiftRight => lhs.wrapping_shr(rhs.rem_euclid(64) as u32),
            Plus => lhs.wrapping_add(rhs),
            Minus => lhs.wrapping_sub(rhs),
            Star => lhs.wrapping_mul(rhs),
            Slash => {
                if rhs == 0 {
                    self.warnings.push((line, col, "division by zero in #if".to_string()));
                    0
                } else {
                    lhs.wrapping_div(rhs)
                }
            }
            Percent => {
                if rhs == 0 {
                    self.warnings.push((line, col, "division by zero in #if".to_string()));
                    0
                } else {
                    lhs.wrapping_rem(rhs)
                }
            }
            _ => return Err(self.error("unsupported operator in constant expression")),
        })
    }

    fn parse_unary(&mut self) -> Result<i64> {
        match self.current.kind {
            TokenKind::Punct(Punctuator::Plus) => {
                self.advance();
                self.parse_unary()
            }
            TokenKind::Punct(Punctuator::Minus) => {
                self.advance();
                Ok(self.parse_unary()?.wrapping_neg())
            }
            TokenKind::Punct(Punctuator::Bang) => {
                self.advance();
                Ok(i64::from(self.parse_unary()? == 0))
            }
            TokenKind::Punct(Punctuator::Tilde) => {
                self.advance();
                Ok(!self.parse_unary()?)
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<i64> {
        match &self.current.kind {
            TokenKind::Number => {
                let v = match &self.current.value {
                    Some(crate::token::TokenValue::Number(n)) if n.is_float() => {
                        self.warnings.push((
                            self.current.line,
                            self.current.col,
                            "floating-point constant in preprocessor expression".to_string(),
                        ));
                        n.as_f64() as i64
                    }
                    Some(crate::token::TokenValue::Number(n)) => n.as_i64(),
                    _ => 0,
                };
                self.advance();
                Ok(v)
            }
            TokenKind::Character => {
                let v = match &self.current.value {
                    Some(crate::token::TokenValue::Char(c)) => *c,
                    _ => 0,
                };
                self.advance();
                Ok(v)
            }
            TokenKind::Identifier if self.current.text == "defined" => self.parse_defined(),
            TokenKind::Identifier => {
                let name = self.current.text.clone();
                if self.warn_undef {
                    self.warnings.push((
                        self.current.line,
                        self.current.col,
                        format!("\"{name}\" is not defined, evaluates to 0"),
                    ));
                }
                self.advance();
                Ok(0)
            }
            TokenKind::Punct(Punctuator::LParen) => {
                self.advance();
                let v = self.parse_ternary()?;
                self.expect_punct(Punctuator::RParen, "')'")?;
                Ok(v)
            }
            TokenKind::Eof => Err(self.error("expression expected")),
            _ => Err(self.error(format!("unexpected token '{}' in expression", self.current.text))),
        }
    }

    fn parse_defined(&mut self) -> Result<i64> {
        self.advance();
        let parenthesized = self.current.kind == TokenKind::Punct(Punctuator::LParen);
        if parenthesized {
            self.advance();
        }
        let TokenKind::Identifier = self.current.kind else {
            return Err(self.error("expected identifier after 'defined'"));
        };
        let name = self.current.text.clone();
        self.advance();
        if parenthesized {
            self.expect_punct(Punctuator::RParen, "')' after 'defined(...'")?;
        }
        Ok(i64::from(self.defined.is_defined(&name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenValue;

    fn num(v: i64, line: u32) -> Token {
        Token::new(TokenKind::Number, line, 1, v.to_string()).with_value(TokenValue::Number(
            crate::token::NumericValue {
                radix: 10,
                int_digits: v.to_string(),
                frac_digits: None,
                exponent: None,
                is_unsigned: false,
                long_count: 0,
                is_float_suffix: false,
                bad_octal_digit: false,
                bad_numeric_literal: false,
            },
        ))
    }

    fn punct(p: Punctuator, text: &str) -> Token {
        Token::new(TokenKind::Punct(p), 1, 1, text)
    }

    fn ident(text: &str) -> Token {
        Token::new(TokenKind::Identifier, 1, 1, text)
    }

    fn run(tokens: Vec<Token>, defined: impl Fn(&str) -> bool + 'static) -> i64 {
        let mut iter = tokens.into_iter();
        let (v, _) = evaluate(
            move || iter.next().unwrap_or(Token::eof(1, 1)),
            defined,
            "t.c",
        )
        .unwrap();
        v
    }

    #[test]
    fn arithmetic_precedence() {
        // 2 + 3 * 4 == 14
        let toks = vec![num(2, 1), punct(Punctuator::Plus, "+"), num(3, 1), punct(Punctuator::Star, "*"), num(4, 1)];
        assert_eq!(run(toks, |_| false), 14);
    }

    #[test]
    fn ternary_selects_branch() {
        let toks = vec![
            num(1, 1),
            punct(Punctuator::Question, "?"),
            num(10, 1),
            punct(Punctuator::Colon, ":"),
            num(20, 1),
        ];
        assert_eq!(run(toks, |_| false), 10);
    }

    #[test]
    fn logical_operators_do_not_short_circuit_but_still_combine_correctly() {
        let toks = vec![num(0, 1), punct(Punctuator::AmpAmp, "&&"), num(5, 1)];
        assert_eq!(run(toks, |_| false), 0);
        let toks = vec![num(1, 1), punct(Punctuator::PipePipe, "||"), num(0, 1)];
        assert_eq!(run(toks, |_| false), 1);
    }

    #[test]
    fn division_by_zero_yields_zero_with_warning() {
        let toks = vec![num(5, 1), punct(Punctuator::Slash, "/"), num(0, 1)];
        let mut iter = toks.into_iter();
        let (v, warnings) = evaluate(
            move || iter.next().unwrap_or(Token::eof(1, 1)),
            |_| false,
            "t.c",
        )
        .unwrap();
        assert_eq!(v, 0);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn defined_checks_macro_table_without_expanding() {
        let toks = vec![ident("defined"), ident("FOO")];
        assert_eq!(run(toks, |n| n == "FOO"), 1);
        let toks2 = vec![ident("defined"), punct(Punctuator::LParen, "("), ident("BAR"), punct(Punctuator::RParen, ")")];
        assert_eq!(run(toks2, |n| n == "FOO"), 0);
    }

    #[test]
    fn undefined_identifier_evaluates_to_zero_with_warning() {
        let toks = vec![ident("UNKNOWN")];
        let mut iter = toks.into_iter();
        let (v, warnings) = evaluate(
            move || iter.next().unwrap_or(Token::eof(1, 1)),
            |_| false,
            "t.c",
        )
        .unwrap();
        assert_eq!(v, 0);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn parenthesized_subexpression() {
        let toks = vec![
            punct(Punctuator::LParen, "("),
            num(1, 1),
            punct(Punctuator::Plus, "+"),
            num(2, 1),
            punct(Punctuator::RParen, ")"),
            punct(Punctuator::Star, "*"),
            num(3, 1),
        ];
        assert_eq!(run(toks, |_| false), 9);
    }
}
