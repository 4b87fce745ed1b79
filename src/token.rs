//! Token and NumericValue: the value types tokens carry (§3, §4.A).

use std::fmt;

/// The full C punctuator set, including digraphs and the preprocessor-only
/// `#`/`##` spellings. Order loosely follows the C17 draft (N2176), the same
/// convention the original skeleton used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Punctuator {
    LBracket,
    RBracket,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Dot,
    Arrow,
    Increment,
    Decrement,
    Amp,
    Star,
    Plus,
    Minus,
    Tilde,
    Bang,
    Slash,
    Percent,
    ShiftLeft,
    ShiftRight,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    Eq,
    NotEq,
    Caret,
    Pipe,
    AmpAmp,
    PipePipe,
    Question,
    Colon,
    Semicolon,
    Ellipsis,
    Assign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    PlusAssign,
    MinusAssign,
    ShiftLeftAssign,
    ShiftRightAssign,
    AmpAssign,
    CaretAssign,
    PipeAssign,
    Comma,
    Hash,
    HashHash,
    /// `<:` digraph for `[`
    LBracketDigraph,
    /// `:>` digraph for `]`
    RBracketDigraph,
    /// `<%` digraph for `{`
    LBraceDigraph,
    /// `%>` digraph for `}`
    RBraceDigraph,
    /// `%:` digraph for `#`
    HashDigraph,
    /// `%:%:` digraph for `##`
    HashHashDigraph,
}

/// The closed set of token kinds the lexer can produce, plus the internal
/// markers the macro expander uses inside a replacement list (`MArg`,
/// `MString`, `MPaste`) and the synthetic line-marker token (`PLine`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    Character,
    StringLiteral,
    /// A `<...>` or `"..."` header name, only produced while the lexer is in
    /// include mode.
    Header,
    Punct(Punctuator),
    Whitespace,
    Newline,
    CComment,
    CppComment,
    Eof,
    Invalid,
    /// Parameter reference inside a macro replacement list; `value` carries
    /// the parameter index.
    MArg,
    /// Stringify a parameter; `value` carries the parameter index.
    MString,
    /// The `##` paste operator recorded in a replacement list.
    MPaste,
    /// Synthetic `#line N "file" F` token emitted at source transitions.
    PLine,
    /// A `#` that starts a directive line (distinct from the punctuator,
    /// which only occurs inside a macro replacement list as `MString`'s
    /// trigger token during `#define` parsing).
    Hash,
}

/// A parsed pp-number, retaining enough structure to compute both `long` and
/// `double` values without re-lexing (§3 "NumericValue").
#[derive(Clone, Debug, PartialEq)]
pub struct NumericValue {
    pub radix: u32,
    pub int_digits: String,
    pub frac_digits: Option<String>,
    pub exponent: Option<i64>,
    pub is_unsigned: bool,
    pub long_count: u8,
    pub is_float_suffix: bool,
    /// Set when an octal literal contains an illegal digit (e.g. `097`).
    pub bad_octal_digit: bool,
    /// Set when the pp-number's digits cannot be interpreted under its own
    /// radix once a `.`/exponent forces decimal reinterpretation (e.g. a
    /// hex-float pp-number like `0x1.8p3`, whose `a`-`f` digits are not
    /// valid decimal digits). `as_i64`/`as_f64` fall back to `0` in this
    /// case rather than silently parsing garbage.
    pub bad_numeric_literal: bool,
}

impl NumericValue {
    pub fn is_float(&self) -> bool {
        self.frac_digits.is_some() || self.exponent.is_some() || self.is_float_suffix
    }

    pub fn as_i64(&self) -> i64 {
        if self.bad_numeric_literal {
            return 0;
        }
        i64::from_str_radix(&self.int_digits, self.radix).unwrap_or(0)
    }

    pub fn as_f64(&self) -> f64 {
        if self.bad_numeric_literal {
            return 0.0;
        }
        let mut text = self.int_digits.clone();
        if let Some(frac) = &self.frac_digits {
            text.push('.');
            text.push_str(frac);
        }
        if let Some(exp) = self.exponent {
            text.push('e');
            text.push_str(&exp.to_string());
        }
        text.parse().unwrap_or(0.0)
    }
}

/// Value attached to some tokens: a parsed number, a character constant's
/// code point, a raw string's unescaped text, or a macro-argument index used
/// by the `MArg`/`MString` internal markers.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenValue {
    Number(NumericValue),
    Char(i64),
    Text(String),
    ArgIndex(usize),
    /// `F` in a synthetic `#line N "file" F` marker.
    LineMarkerFlag(u8),
}

/// An immutable, by-value token. Tokens are cheap to clone and flow by
/// move/copy through the source stack (§3 "Lifecycles").
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub col: u32,
    pub text: String,
    pub value: Option<TokenValue>,
}

impl Token {
    pub fn new(kind: TokenKind, line: u32, col: u32, text: impl Into<String>) -> Self {
        Token {
            kind,
            line,
            col,
            text: text.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: TokenValue) -> Self {
        self.value = Some(value);
        self
    }

    pub fn eof(line: u32, col: u32) -> Self {
        Token::new(TokenKind::Eof, line, col, "")
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }

    pub fn is_whitespace_like(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Whitespace | TokenKind::CComment | TokenKind::CppComment
        )
    }

    pub fn is_identifier(&self, name: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text == name
    }

    pub fn arg_index(&self) -> Option<usize> {
        match &self.value {
            Some(TokenValue::ArgIndex(i)) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
