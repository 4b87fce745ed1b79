//! The macro table (§4.D): name → [`Macro`] mapping, with the three
//! predefined sentinels recognized by identity rather than by re-parsing
//! their name.

use std::collections::HashMap;

use once_cell::unsync::OnceCell;

use crate::token::{Punctuator, Token, TokenKind, TokenValue};

/// The predefined macros are recognized by identity (this field), not by
/// string comparison against their name, so a user `#define` of the same
/// name can coexist only transiently and the driver can special-case their
/// expansion (§4.D).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PredefinedKind {
    Line,
    File,
    Counter,
}

/// `{ name, source-of-definition, is-function-like, is-variadic,
/// argument-names, replacement-list }` (§3).
#[derive(Clone, Debug)]
pub struct Macro {
    pub name: String,
    pub defined_at_source: String,
    pub defined_at_line: u32,
    pub defined_at_col: u32,
    pub is_function_like: bool,
    pub is_variadic: bool,
    pub params: Vec<String>,
    /// `M_ARG`/`M_STRING`/`M_PASTE` markers interleave with ordinary tokens;
    /// see [`Macro::build_replacement`].
    pub replacement: Vec<Token>,
    pub predefined: Option<PredefinedKind>,
}

impl Macro {
    pub fn object_like(
        name: impl Into<String>,
        source: impl Into<String>,
        line: u32,
        col: u32,
        body: &[Token],
    ) -> Result<Self, String> {
        let replacement = Self::build_replacement(body, &[], false, false)?;
        Ok(Macro {
            name: name.into(),
            defined_at_source: source.into(),
            defined_at_line: line,
            defined_at_col: col,
            is_function_like: false,
            is_variadic: false,
            params: Vec::new(),
            replacement,
            predefined: None,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn function_like(
        name: impl Into<String>,
        source: impl Into<String>,
        line: u32,
        col: u32,
        params: Vec<String>,
        is_variadic: bool,
        body: &[Token],
    ) -> Result<Self, String> {
        let replacement = Self::build_replacement(body, &params, is_variadic, true)?;
        Ok(Macro {
            name: name.into(),
            defined_at_source: source.into(),
            defined_at_line: line,
            defined_at_col: col,
            is_function_like: true,
            is_variadic,
            params,
            replacement,
            predefined: None,
        })
    }

    fn predefined(name: &str, kind: PredefinedKind) -> Self {
        Macro {
            name: name.to_string(),
            defined_at_source: "<built-in>".to_string(),
            defined_at_line: 0,
            defined_at_col: 0,
            is_function_like: false,
            is_variadic: false,
            params: Vec::new(),
            replacement: Vec::new(),
            predefined: Some(kind),
        }
    }

    /// The index a parameter reference occupies in the replacement list's
    /// `M_ARG`/`M_STRING` markers: named parameters in declaration order,
    /// then `__VA_ARGS__` (if variadic) at `params.len()`.
    fn param_index(params: &[String], is_variadic: bool, name: &str) -> Option<usize> {
        if let Some(i) = params.iter().position(|p| p == name) {
            return Some(i);
        }
        if is_variadic && name == "__VA_ARGS__" {
            return Some(params.len());
        }
        None
    }

    /// Converts a raw `#define` body into the stored replacement list: `#`
    /// followed by a parameter becomes `M_STRING`, a bare parameter
    /// reference becomes `M_ARG`, and `##` becomes `M_PASTE` (§4.D, §4.E).
    fn build_replacement(
        body: &[Token],
        params: &[String],
        is_variadic: bool,
        is_function_like: bool,
    ) -> Result<Vec<Token>, String> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < body.len() {
            let tok = &body[i];
            if tok.kind == TokenKind::Punct(Punctuator::Hash) && is_function_like {
                let mut j = i + 1;
                while j < body.len() && body[j].is_whitespace_like() {
                    j += 1;
                }
                if j < body.len() && body[j].kind == TokenKind::Identifier {
                    if let Some(idx) = Self::param_index(params, is_variadic, &body[j].text) {
                        out.push(
                            Token::new(
                                TokenKind::MString,
                                tok.line,
                                tok.col,
                                format!("#{}", body[j].text),
                            )
                            .with_value(TokenValue::ArgIndex(idx)),
                        );
                        i = j + 1;
                        continue;
                    }
                }
                return Err("'#' is not followed by a macro parameter".to_string());
            }
            if tok.kind == TokenKind::Punct(Punctuator::HashHash) {
                out.push(Token::new(TokenKind::MPaste, tok.line, tok.col, "##"));
                i += 1;
                continue;
            }
            if tok.kind == TokenKind::Identifier {
                if let Some(idx) = Self::param_index(params, is_variadic, &tok.text) {
                    out.push(
                        Token::new(TokenKind::MArg, tok.line, tok.col, tok.text.clone())
                            .with_value(TokenValue::ArgIndex(idx)),
                    );
                    i += 1;
                    continue;
                }
            }
            out.push(tok.clone());
            i += 1;
        }
        Ok(out)
    }
}

/// A captured function-like macro argument plus its lazily-computed,
/// pre-expanded copy (§3 "Argument", §4.E "Argument pre-expansion"). The
/// pre-expansion happens at most once per invocation.
pub struct Argument {
    pub raw: Vec<Token>,
    expanded: OnceCell<Vec<Token>>,
}

impl Argument {
    pub fn new(raw: Vec<Token>) -> Self {
        Argument {
            raw,
            expanded: OnceCell::new(),
        }
    }

    /// Returns the pre-expanded token list, computing it via `f` on first
    /// access and caching it for the remainder of this invocation.
    pub fn expanded_with(&self, f: impl FnOnce(&[Token]) -> Vec<Token>) -> &[Token] {
        self.expanded.get_or_init(|| f(&self.raw))
    }

    /// Spelling of the raw argument with internal whitespace collapsed to a
    /// single space and leading/trailing whitespace stripped, used by `#`
    /// stringification (§4.E "Substitution").
    pub fn spelling(&self) -> String {
        let mut out = String::new();
        let mut last_was_space = true; // suppress leading space
        for tok in &self.raw {
            if tok.is_whitespace_like() {
                if !last_was_space {
                    out.push(' ');
                    last_was_space = true;
                }
                continue;
            }
            out.push_str(&tok.text);
            last_was_space = false;
        }
        while out.ends_with(' ') {
            out.pop();
        }
        out
    }
}

/// Name → [`Macro`] mapping (§4.D).
pub struct MacroTable {
    map: HashMap<String, Macro>,
}

impl Default for MacroTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MacroTable {
    pub fn new() -> Self {
        let mut map = HashMap::new();
        for (name, kind) in [
            ("__LINE__", PredefinedKind::Line),
            ("__FILE__", PredefinedKind::File),
            ("__COUNTER__", PredefinedKind::Counter),
        ] {
            map.insert(name.to_string(), Macro::predefined(name, kind));
        }
        MacroTable { map }
    }

    /// Defines (or redefines) a macro, returning the macro it replaced, if
    /// any — used to restore the prior definition on `#undef` round-trips
    /// (§8 "Round-trips").
    pub fn define(&mut self, m: Macro) -> Option<Macro> {
        self.map.insert(m.name.clone(), m)
    }

    pub fn undefine(&mut self, name: &str) -> Option<Macro> {
        self.map.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.map.get(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    fn ident(text: &str) -> Token {
        Token::new(TokenKind::Identifier, 1, 1, text)
    }

    fn ws() -> Token {
        Token::new(TokenKind::Whitespace, 1, 1, " ")
    }

    #[test]
    fn object_macro_replacement_is_verbatim() {
        let body = vec![ident("A"), ws(), ident("B")];
        let m = Macro::object_like("X", "t.c", 1, 1, &body).unwrap();
        assert_eq!(m.replacement.len(), 3);
        assert_eq!(m.replacement[0].kind, TokenKind::Identifier);
    }

    #[test]
    fn function_macro_marks_arg_references() {
        let body = vec![ident("x")];
        let m = Macro::function_like("SQ", "t.c", 1, 1, vec!["x".into()], false, &body).unwrap();
        assert_eq!(m.replacement[0].kind, TokenKind::MArg);
        assert_eq!(m.replacement[0].arg_index(), Some(0));
    }

    #[test]
    fn hash_before_param_becomes_mstring() {
        let hash = Token::new(TokenKind::Punct(Punctuator::Hash), 1, 1, "#");
        let body = vec![hash, ident("x")];
        let m = Macro::function_like("STR", "t.c", 1, 1, vec!["x".into()], false, &body).unwrap();
        assert_eq!(m.replacement[0].kind, TokenKind::MString);
        assert_eq!(m.replacement[0].arg_index(), Some(0));
    }

    #[test]
    fn stray_hash_in_zero_parameter_function_macro_is_an_error() {
        let hash = Token::new(TokenKind::Punct(Punctuator::Hash), 1, 1, "#");
        let body = vec![hash, ident("x")];
        let err = Macro::function_like("M", "t.c", 1, 1, Vec::new(), false, &body).unwrap_err();
        assert!(err.contains("not followed by a macro parameter"));
    }

    #[test]
    fn bare_hash_in_object_macro_body_passes_through() {
        let hash = Token::new(TokenKind::Punct(Punctuator::Hash), 1, 1, "#");
        let body = vec![hash];
        let m = Macro::object_like("X", "t.c", 1, 1, &body).unwrap();
        assert_eq!(m.replacement[0].kind, TokenKind::Punct(Punctuator::Hash));
    }

    #[test]
    fn hash_hash_becomes_mpaste() {
        let a = ident("a");
        let hh = Token::new(TokenKind::Punct(Punctuator::HashHash), 1, 1, "##");
        let b = ident("b");
        let body = vec![a, hh, b];
        let m = Macro::object_like("CAT", "t.c", 1, 1, &body).unwrap();
        assert_eq!(m.replacement[1].kind, TokenKind::MPaste);
    }

    #[test]
    fn variadic_args_occupy_trailing_index() {
        let body = vec![ident("__VA_ARGS__")];
        let m =
            Macro::function_like("V", "t.c", 1, 1, vec!["fmt".into()], true, &body).unwrap();
        assert_eq!(m.replacement[0].arg_index(), Some(1));
    }

    #[test]
    fn table_define_undefine_round_trip_restores_prior() {
        let mut table = MacroTable::new();
        let first = Macro::object_like("X", "t.c", 1, 1, &[ident("1")]).unwrap();
        table.define(first);
        assert!(table.is_defined("X"));
        let removed = table.undefine("X").unwrap();
        assert_eq!(removed.name, "X");
        assert!(!table.is_defined("X"));
    }

    #[test]
    fn predefined_macros_present_by_identity() {
        let table = MacroTable::new();
        assert_eq!(
            table.get("__LINE__").unwrap().predefined,
            Some(PredefinedKind::Line)
        );
        assert_eq!(
            table.get("__COUNTER__").unwrap().predefined,
            Some(PredefinedKind::Counter)
        );
    }

    #[test]
    fn argument_pre_expansion_is_cached() {
        use std::cell::Cell;
        let calls = Cell::new(0);
        let arg = Argument::new(vec![ident("x")]);
        let first = arg.expanded_with(|raw| {
            calls.set(calls.get() + 1);
            raw.to_vec()
        });
        assert_eq!(first.len(), 1);
        let second = arg.expanded_with(|raw| {
            calls.set(calls.get() + 1);
            raw.to_vec()
        });
        assert_eq!(second.len(), 1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn argument_spelling_collapses_whitespace() {
        let arg = Argument::new(vec![ident("hello"), ws(), ws(), ident("world")]);
        assert_eq!(arg.spelling(), "hello world");
    }
}
