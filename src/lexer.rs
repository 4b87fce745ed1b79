//! The hand-written lexer DFA (§4.B).
//!
//! Character stream → tokens. Handles trigraphs, backslash-newline splicing,
//! comments, pp-numbers, character/string literals, header names (only in
//! include mode), the full punctuator set including digraphs, and
//! whitespace/newline as distinct, semantically significant token kinds.

use crate::cursor::Cursor;
use crate::token::{NumericValue, Punctuator, Token, TokenKind, TokenValue};

fn trigraph_for(c: char) -> Option<char> {
    Some(match c {
        '=' => '#',
        '/' => '\\',
        '\'' => '^',
        '(' => '[',
        ')' => ']',
        '!' => '|',
        '<' => '{',
        '>' => '}',
        '-' => '~',
        _ => return None,
    })
}

/// A diagnostic a lexer call produced, queued for the driver to forward to
/// the installed [`crate::diagnostics::DiagnosticListener`] (§7).
#[derive(Clone, Debug)]
pub struct LexDiagnostic {
    pub is_error: bool,
    pub line: u32,
    pub col: u32,
    pub message: String,
}

pub struct Lexer {
    cursor: Cursor,
    /// Enabled by the driver around `#include` so `<...>` lexes as a header
    /// name rather than `<` followed by ordinary tokens (§4.B).
    pub include_mode: bool,
    /// Set while pulling from an inactive conditional branch: suppresses
    /// diagnostics and collapses comments/whitespace to preserve line counts
    /// (§4.F "Active gating").
    pub quiet: bool,
    diagnostics: Vec<LexDiagnostic>,
}

impl Lexer {
    pub fn new(source: impl Into<String>) -> Self {
        Lexer {
            cursor: Cursor::new(source),
            include_mode: false,
            quiet: false,
            diagnostics: Vec::new(),
        }
    }

    pub fn line(&self) -> u32 {
        self.cursor.line()
    }

    pub fn column(&self) -> u32 {
        self.cursor.column()
    }

    pub fn take_diagnostics(&mut self) -> Vec<LexDiagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    fn error(&mut self, line: u32, col: u32, message: impl Into<String>) {
        if !self.quiet {
            self.diagnostics.push(LexDiagnostic {
                is_error: true,
                line,
                col,
                message: message.into(),
            });
        }
    }

    fn warn(&mut self, line: u32, col: u32, message: impl Into<String>) {
        if !self.quiet {
            self.diagnostics.push(LexDiagnostic {
                is_error: false,
                line,
                col,
                message: message.into(),
            });
        }
    }

    /// Looks at the next *logical* character without consuming it: resolves
    /// a pending trigraph but does not collapse a backslash-newline (callers
    /// that need that must go through [`Lexer::bump_logical`]).
    fn peek_logical(&self) -> Option<char> {
        if self.cursor.peek() == Some('?') && self.cursor.peek_at(1) == Some('?') {
            if let Some(third) = self.cursor.peek_at(2) {
                if let Some(mapped) = trigraph_for(third) {
                    return Some(mapped);
                }
            }
        }
        self.cursor.peek()
    }

    fn peek_logical_at(&self, offset: usize) -> Option<char> {
        // Only offset 0 resolves trigraphs; deeper lookahead is used for
        // short fixed patterns (digraphs, `...`) where trigraph collision is
        // vanishingly unlikely and not worth the bookkeeping.
        if offset == 0 {
            self.peek_logical()
        } else {
            self.cursor.peek_at(offset)
        }
    }

    /// Consumes and returns the next logical character: resolves trigraphs
    /// and silently splices a backslash immediately followed by a newline,
    /// possibly repeatedly (§4.B "Line continuation").
    fn bump_logical(&mut self) -> Option<char> {
        loop {
            let c = if self.cursor.peek() == Some('?') && self.cursor.peek_at(1) == Some('?') {
                match self.cursor.peek_at(2).and_then(trigraph_for) {
                    Some(mapped) => {
                        self.cursor.bump();
                        self.cursor.bump();
                        self.cursor.bump();
                        mapped
                    }
                    None => self.cursor.bump()?,
                }
            } else {
                self.cursor.bump()?
            };

            if c == '\\' {
                if self.cursor.peek() == Some('\n') {
                    self.cursor.bump();
                    continue;
                }
                if self.cursor.peek() == Some('\r') && self.cursor.peek_at(1) == Some('\n') {
                    self.cursor.bump();
                    self.cursor.bump();
                    continue;
                }
            }
            return Some(c);
        }
    }

    fn is_ident_start(c: char) -> bool {
        c.is_ascii_alphabetic() || c == '_'
    }

    fn is_ident_continue(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_'
    }

    pub fn next_token(&mut self) -> Token {
        let (line, col) = (self.cursor.line(), self.cursor.column());
        match self.peek_logical() {
            None => Token::eof(line, col),
            Some(c) if c == ' ' || c == '\t' || c == '\x0b' || c == '\x0c' => {
                self.lex_whitespace(line, col)
            }
            Some('\n') | Some('\r') => self.lex_newline(line, col),
            Some('/') if self.peek_logical_at(1) == Some('/') => self.lex_line_comment(line, col),
            Some('/') if self.peek_logical_at(1) == Some('*') => self.lex_block_comment(line, col),
            Some('<') if self.include_mode => self.lex_header(line, col, '<', '>'),
            Some('"') => self.lex_string(line, col),
            Some('\'') => self.lex_char(line, col),
            Some(c) if Self::is_ident_start(c) => self.lex_identifier(line, col),
            Some(c) if c.is_ascii_digit() => self.lex_number(line, col),
            Some('.') if self.peek_logical_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.lex_number(line, col)
            }
            Some(_) => self.lex_punctuator(line, col),
        }
    }

    fn lex_whitespace(&mut self, line: u32, col: u32) -> Token {
        let mut text = String::new();
        while matches!(self.peek_logical(), Some(' ') | Some('\t') | Some('\x0b') | Some('\x0c')) {
            text.push(self.bump_logical().unwrap());
        }
        Token::new(TokenKind::Whitespace, line, col, text)
    }

    fn lex_newline(&mut self, line: u32, col: u32) -> Token {
        let mut text = String::new();
        if self.peek_logical() == Some('\r') {
            text.push(self.bump_logical().unwrap());
        }
        if self.peek_logical() == Some('\n') {
            text.push(self.bump_logical().unwrap());
        }
        Token::new(TokenKind::Newline, line, col, text)
    }

    fn lex_line_comment(&mut self, line: u32, col: u32) -> Token {
        let mut text = String::from("//");
        self.bump_logical();
        self.bump_logical();
        while !matches!(self.peek_logical(), None | Some('\n') | Some('\r')) {
            text.push(self.bump_logical().unwrap());
        }
        Token::new(TokenKind::CppComment, line, col, text)
    }

    fn lex_block_comment(&mut self, line: u32, col: u32) -> Token {
        let mut text = String::from("/*");
        self.bump_logical();
        self.bump_logical();
        let mut closed = false;
        while let Some(c) = self.bump_logical() {
            text.push(c);
            if c == '*' && self.peek_logical() == Some('/') {
                text.push(self.bump_logical().unwrap());
                closed = true;
                break;
            }
        }
        if !closed {
            self.error(line, col, "unterminated comment");
        }
        Token::new(TokenKind::CComment, line, col, text)
    }

    fn lex_identifier(&mut self, line: u32, col: u32) -> Token {
        let mut text = String::new();
        text.push(self.bump_logical().unwrap());
        while self.peek_logical().is_some_and(Self::is_ident_continue) {
            text.push(self.bump_logical().unwrap());
        }
        Token::new(TokenKind::Identifier, line, col, text)
    }

    fn lex_number(&mut self, line: u32, col: u32) -> Token {
        let mut text = String::new();
        text.push(self.bump_logical().unwrap());
        loop {
            match self.peek_logical() {
                Some(c) if c.is_ascii_alphanumeric() || c == '.' || c == '_' => {
                    text.push(self.bump_logical().unwrap());
                }
                Some(sign @ ('+' | '-'))
                    if matches!(text.chars().last(), Some('e' | 'E' | 'p' | 'P')) =>
                {
                    let _ = sign;
                    text.push(self.bump_logical().unwrap());
                }
                _ => break,
            }
        }
        let value = self.parse_numeric(&text, line, col);
        Token::new(TokenKind::Number, line, col, text).with_value(TokenValue::Number(value))
    }

    fn parse_numeric(&mut self, text: &str, line: u32, col: u32) -> NumericValue {
        let (radix, digits_start) = if text.len() > 1
            && text.starts_with('0')
            && matches!(text.as_bytes()[1], b'x' | b'X')
        {
            (16, 2)
        } else if text.starts_with('0') && text.len() > 1 && text.as_bytes()[1].is_ascii_digit() {
            (8, 1)
        } else {
            (10, 0)
        };

        let mut int_digits = String::new();
        let mut frac_digits: Option<String> = None;
        let mut exponent: Option<i64> = None;
        let mut is_unsigned = false;
        let mut long_count = 0u8;
        let mut is_float_suffix = false;
        let mut bad_octal_digit = false;
        let mut seen_dot = false;
        let mut seen_exp = false;

        let bytes: Vec<char> = text.chars().collect();
        let mut i = digits_start;
        while i < bytes.len() {
            let c = bytes[i];
            if c == '.' && !seen_dot && !seen_exp {
                seen_dot = true;
                frac_digits = Some(String::new());
                i += 1;
                continue;
            }
            if (c == 'e' || c == 'E') && radix != 16 && !seen_exp {
                seen_exp = true;
                let mut exp_text = String::new();
                i += 1;
                if i < bytes.len() && (bytes[i] == '+' || bytes[i] == '-') {
                    exp_text.push(bytes[i]);
                    i += 1;
                }
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    exp_text.push(bytes[i]);
                    i += 1;
                }
                exponent = Some(exp_text.parse().unwrap_or(0));
                continue;
            }
            if (c == 'p' || c == 'P') && radix == 16 && !seen_exp {
                seen_exp = true;
                let mut exp_text = String::new();
                i += 1;
                if i < bytes.len() && (bytes[i] == '+' || bytes[i] == '-') {
                    exp_text.push(bytes[i]);
                    i += 1;
                }
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    exp_text.push(bytes[i]);
                    i += 1;
                }
                exponent = Some(exp_text.parse().unwrap_or(0));
                continue;
            }
            match c {
                'u' | 'U' => is_unsigned = true,
                'l' | 'L' => long_count = long_count.saturating_add(1),
                'f' | 'F' if radix != 16 || seen_exp => is_float_suffix = true,
                _ if seen_dot => {
                    frac_digits.as_mut().unwrap().push(c);
                }
                _ => {
                    if radix == 8 && !matches!(c, '0'..='7') && c.is_ascii_digit() {
                        bad_octal_digit = true;
                    }
                    int_digits.push(c);
                }
            }
            i += 1;
        }
        if int_digits.is_empty() {
            int_digits.push('0');
        }
        if bad_octal_digit {
            self.warn(line, col, format!("invalid digit in octal constant '{text}'"));
        }
        // A hex pp-number that turns out to be a hex-float (`0x1.8p3`) still
        // has its int/frac digits accumulated under radix-16 rules, which may
        // contain `a`-`f`; forcing radix 10 below for the fractional form
        // would otherwise misparse those as decimal digits rather than
        // flagging the literal as malformed.
        let bad_numeric_literal = radix == 16
            && (seen_dot || seen_exp)
            && (int_digits.chars().any(|c| !c.is_ascii_digit())
                || frac_digits
                    .as_ref()
                    .is_some_and(|f| f.chars().any(|c| !c.is_ascii_digit())));
        if bad_numeric_literal {
            self.warn(line, col, format!("invalid hexadecimal floating literal '{text}'"));
        }
        NumericValue {
            radix: if seen_dot || seen_exp { 10 } else { radix },
            int_digits,
            frac_digits,
            exponent,
            is_unsigned,
            long_count,
            is_float_suffix,
            bad_octal_digit,
            bad_numeric_literal,
        }
    }

    fn read_escape(&mut self, line: u32, col: u32) -> char {
        match self.bump_logical() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('0') => '\0',
            Some('a') => '\u{7}',
            Some('b') => '\u{8}',
            Some('f') => '\u{c}',
            Some('v') => '\u{b}',
            Some('\\') => '\\',
            Some('\'') => '\'',
            Some('"') => '"',
            Some('?') => '?',
            Some(c @ '0'..='7') => {
                let mut digits = String::new();
                digits.push(c);
                for _ in 0..2 {
                    if matches!(self.peek_logical(), Some('0'..='7')) {
                        digits.push(self.bump_logical().unwrap());
                    } else {
                        break;
                    }
                }
                u32::from_str_radix(&digits, 8)
                    .ok()
                    .and_then(char::from_u32)
                    .unwrap_or('\0')
            }
            Some('x') => {
                let mut digits = String::new();
                while self.peek_logical().is_some_and(|c| c.is_ascii_hexdigit()) {
                    digits.push(self.bump_logical().unwrap());
                }
                if digits.is_empty() {
                    self.error(line, col, "\\x used with no following hex digits");
                    '\0'
                } else {
                    u32::from_str_radix(&digits, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .unwrap_or('\0')
                }
            }
            Some(other) => {
                self.warn(line, col, format!("unknown escape sequence '\\{other}'"));
                other
            }
            None => {
                self.error(line, col, "unterminated escape sequence");
                '\0'
            }
        }
    }

    fn lex_char(&mut self, line: u32, col: u32) -> Token {
        let mut text = String::from("'");
        self.bump_logical();
        let mut value: i64 = 0;
        let mut closed = false;
        while let Some(c) = self.peek_logical() {
            if c == '\'' {
                text.push(self.bump_logical().unwrap());
                closed = true;
                break;
            }
            if c == '\n' {
                break;
            }
            if c == '\\' {
                text.push(self.bump_logical().unwrap());
                let start = (self.cursor.line(), self.cursor.column());
                let escaped = self.read_escape(start.0, start.1);
                text.push(escaped);
                value = escaped as i64;
            } else {
                text.push(self.bump_logical().unwrap());
                value = c as i64;
            }
        }
        if !closed {
            self.error(line, col, "unterminated character constant");
        }
        Token::new(TokenKind::Character, line, col, text).with_value(TokenValue::Char(value))
    }

    fn lex_string(&mut self, line: u32, col: u32) -> Token {
        let mut text = String::from("\"");
        let mut decoded = String::new();
        self.bump_logical();
        let mut closed = false;
        while let Some(c) = self.peek_logical() {
            if c == '"' {
                text.push(self.bump_logical().unwrap());
                closed = true;
                break;
            }
            if c == '\n' {
                break;
            }
            if c == '\\' {
                text.push(self.bump_logical().unwrap());
                let start = (self.cursor.line(), self.cursor.column());
                let escaped = self.read_escape(start.0, start.1);
                decoded.push(escaped);
                text.push(escaped);
            } else {
                let c = self.bump_logical().unwrap();
                text.push(c);
                decoded.push(c);
            }
        }
        if !closed {
            self.error(line, col, "unterminated string literal");
        }
        Token::new(TokenKind::StringLiteral, line, col, text).with_value(TokenValue::Text(decoded))
    }

    fn lex_header(&mut self, line: u32, col: u32, open: char, close: char) -> Token {
        let mut text = String::new();
        text.push(self.bump_logical().unwrap());
        let mut closed = false;
        while let Some(c) = self.peek_logical() {
            if c == close {
                text.push(self.bump_logical().unwrap());
                closed = true;
                break;
            }
            if c == '\n' {
                break;
            }
            text.push(self.bump_logical().unwrap());
        }
        if !closed {
            self.error(line, col, format!("missing terminating {close} character"));
        }
        let _ = open;
        Token::new(TokenKind::Header, line, col, text)
    }

    fn lex_punctuator(&mut self, line: u32, col: u32) -> Token {
        let c = self.bump_logical().unwrap();
        macro_rules! two {
            ($second:expr, $then:expr, $else_p:expr) => {{
                if self.peek_logical() == Some($second) {
                    self.bump_logical();
                    $then
                } else {
                    $else_p
                }
            }};
        }
        let (punct, extra) = match c {
            '[' => (Punctuator::LBracket, ""),
            ']' => (Punctuator::RBracket, ""),
            '(' => (Punctuator::LParen, ""),
            ')' => (Punctuator::RParen, ""),
            '{' => (Punctuator::LBrace, ""),
            '}' => (Punctuator::RBrace, ""),
            '.' => {
                if self.peek_logical() == Some('.') && self.peek_logical_at(1) == Some('.') {
                    self.bump_logical();
                    self.bump_logical();
                    (Punctuator::Ellipsis, "..")
                } else {
                    (Punctuator::Dot, "")
                }
            }
            '-' => match self.peek_logical() {
                Some('>') => {
                    self.bump_logical();
                    (Punctuator::Arrow, ">")
                }
                Some('-') => {
                    self.bump_logical();
                    (Punctuator::Decrement, "-")
                }
                Some('=') => {
                    self.bump_logical();
                    (Punctuator::MinusAssign, "=")
                }
                _ => (Punctuator::Minus, ""),
            },
            '+' => match self.peek_logical() {
                Some('+') => {
                    self.bump_logical();
                    (Punctuator::Increment, "+")
                }
                Some('=') => {
                    self.bump_logical();
                    (Punctuator::PlusAssign, "=")
                }
                _ => (Punctuator::Plus, ""),
            },
            '&' => match self.peek_logical() {
                Some('&') => {
                    self.bump_logical();
                    (Punctuator::AmpAmp, "&")
                }
                Some('=') => {
                    self.bump_logical();
                    (Punctuator::AmpAssign, "=")
                }
                _ => (Punctuator::Amp, ""),
            },
            '*' => two!('=', (Punctuator::StarAssign, "="), (Punctuator::Star, "")),
            '~' => (Punctuator::Tilde, ""),
            '!' => two!('=', (Punctuator::NotEq, "="), (Punctuator::Bang, "")),
            '/' => two!(
                '=',
                (Punctuator::SlashAssign, "="),
                (Punctuator::Slash, "")
            ),
            '%' => match self.peek_logical() {
                Some('=') => {
                    self.bump_logical();
                    (Punctuator::PercentAssign, "=")
                }
                Some('>') => {
                    self.bump_logical();
                    (Punctuator::RBraceDigraph, ">")
                }
                Some(':') => {
                    self.bump_logical();
                    if self.peek_logical() == Some('%') && self.peek_logical_at(1) == Some(':') {
                        self.bump_logical();
                        self.bump_logical();
                        (Punctuator::HashHashDigraph, ":%:")
                    } else {
                        (Punctuator::HashDigraph, "")
                    }
                }
                _ => (Punctuator::Percent, ""),
            },
            '<' => match self.peek_logical() {
                Some('<') => {
                    self.bump_logical();
                    if self.peek_logical() == Some('=') {
                        self.bump_logical();
                        (Punctuator::ShiftLeftAssign, "<=")
                    } else {
                        (Punctuator::ShiftLeft, "<")
                    }
                }
                Some('=') => {
                    self.bump_logical();
                    (Punctuator::LessEq, "=")
                }
                Some(':') => {
                    self.bump_logical();
                    (Punctuator::LBracketDigraph, ":")
                }
                Some('%') => {
                    self.bump_logical();
                    (Punctuator::LBraceDigraph, "%")
                }
                _ => (Punctuator::Less, ""),
            },
            '>' => match self.peek_logical() {
                Some('>') => {
                    self.bump_logical();
                    if self.peek_logical() == Some('=') {
                        self.bump_logical();
                        (Punctuator::ShiftRightAssign, ">=")
                    } else {
                        (Punctuator::ShiftRight, ">")
                    }
                }
                Some('=') => {
                    self.bump_logical();
                    (Punctuator::GreaterEq, "=")
                }
                _ => (Punctuator::Greater, ""),
            },
            '=' => two!('=', (Punctuator::Eq, "="), (Punctuator::Assign, "")),
            '^' => two!(
                '=',
                (Punctuator::CaretAssign, "="),
                (Punctuator::Caret, "")
            ),
            '|' => match self.peek_logical() {
                Some('|') => {
                    self.bump_logical();
                    (Punctuator::PipePipe, "|")
                }
                Some('=') => {
                    self.bump_logical();
                    (Punctuator::PipeAssign, "=")
                }
                _ => (Punctuator::Pipe, ""),
            },
            '?' => (Punctuator::Question, ""),
            ':' => {
                if self.peek_logical() == Some('>') {
                    self.bump_logical();
                    (Punctuator::RBracketDigraph, ">")
                } else {
                    (Punctuator::Colon, "")
                }
            }
            ';' => (Punctuator::Semicolon, ""),
            ',' => (Punctuator::Comma, ""),
            '#' => {
                if self.peek_logical() == Some('#') {
                    self.bump_logical();
                    (Punctuator::HashHash, "#")
                } else {
                    (Punctuator::Hash, "")
                }
            }
            other => {
                self.error(line, col, format!("stray invalid character '{other}'"));
                return Token::new(TokenKind::Invalid, line, col, other.to_string());
            }
        };
        let mut text = String::from(c);
        text.push_str(extra);
        Token::new(TokenKind::Punct(punct), line, col, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let t = lexer.next_token();
            if t.is_eof() {
                break;
            }
            out.push(t.kind);
        }
        out
    }

    #[test]
    fn lexes_identifier_and_number() {
        let mut lexer = Lexer::new("foo123 0x1A");
        let t1 = lexer.next_token();
        assert_eq!(t1.kind, TokenKind::Identifier);
        assert_eq!(t1.text, "foo123");
        let _ws = lexer.next_token();
        let t2 = lexer.next_token();
        assert_eq!(t2.kind, TokenKind::Number);
        match t2.value {
            Some(TokenValue::Number(n)) => assert_eq!(n.as_i64(), 0x1A),
            _ => panic!("expected number value"),
        }
    }

    #[test]
    fn pp_number_accepts_leading_dot() {
        let mut lexer = Lexer::new(".5f");
        let t = lexer.next_token();
        assert_eq!(t.kind, TokenKind::Number);
        assert_eq!(t.text, ".5f");
    }

    #[test]
    fn detects_bad_octal_digit() {
        let mut lexer = Lexer::new("097");
        let t = lexer.next_token();
        let diags = lexer.take_diagnostics();
        assert!(!diags.is_empty());
        match t.value {
            Some(TokenValue::Number(n)) => assert!(n.bad_octal_digit),
            _ => panic!(),
        }
    }

    #[test]
    fn detects_bad_hex_float_literal() {
        let mut lexer = Lexer::new("0x1.ap3");
        let t = lexer.next_token();
        let diags = lexer.take_diagnostics();
        assert!(!diags.is_empty());
        match t.value {
            Some(TokenValue::Number(n)) => {
                assert!(n.bad_numeric_literal);
                assert_eq!(n.as_i64(), 0);
                assert_eq!(n.as_f64(), 0.0);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn splices_backslash_newline_inside_identifier() {
        let mut lexer = Lexer::new("fo\\\no");
        let t = lexer.next_token();
        assert_eq!(t.kind, TokenKind::Identifier);
        assert_eq!(t.text, "foo");
    }

    #[test]
    fn trigraph_resolves_to_hash() {
        let mut lexer = Lexer::new("??=define");
        let t = lexer.next_token();
        assert_eq!(t.kind, TokenKind::Punct(Punctuator::Hash));
    }

    #[test]
    fn paste_and_ellipsis() {
        assert_eq!(
            kinds("## ..."),
            vec![
                TokenKind::Punct(Punctuator::HashHash),
                TokenKind::Whitespace,
                TokenKind::Punct(Punctuator::Ellipsis),
            ]
        );
    }

    #[test]
    fn less_than_is_operator_outside_include_mode() {
        let mut lexer = Lexer::new("<foo>");
        let t = lexer.next_token();
        assert_eq!(t.kind, TokenKind::Punct(Punctuator::Less));
    }

    #[test]
    fn less_than_is_header_in_include_mode() {
        let mut lexer = Lexer::new("<foo.h>");
        lexer.include_mode = true;
        let t = lexer.next_token();
        assert_eq!(t.kind, TokenKind::Header);
        assert_eq!(t.text, "<foo.h>");
    }

    #[test]
    fn string_is_always_a_string_even_in_include_mode() {
        let mut lexer = Lexer::new("\"abc\"");
        lexer.include_mode = true;
        let t = lexer.next_token();
        assert_eq!(t.kind, TokenKind::StringLiteral);
        lexer.include_mode = false;
        let mut lexer2 = Lexer::new("\"abc\"");
        let t2 = lexer2.next_token();
        assert_eq!(t2.kind, TokenKind::StringLiteral);
    }

    #[test]
    fn block_comment_reports_unterminated() {
        let mut lexer = Lexer::new("/* oops");
        lexer.next_token();
        let diags = lexer.take_diagnostics();
        assert!(diags.iter().any(|d| d.is_error));
    }

    #[test]
    fn char_literal_escape_value() {
        let mut lexer = Lexer::new("'\\n'");
        let t = lexer.next_token();
        assert_eq!(t.value, Some(TokenValue::Char('\n' as i64)));
    }
}
