//! The driver (§4, §5): ties the lexer, macro table, conditional stack,
//! source stack, include resolver, and the control/diagnostic seams together
//! into one token-at-a-time `Preprocessor`.
//!
//! Directive recognition happens only in [`Preprocessor::next_token`]'s own
//! loop (tracked via `at_line_start`); everything reachable from macro
//! argument pre-expansion or `#if` expression evaluation goes through
//! [`Preprocessor::pull_expanded_one`], which performs macro lookup and
//! expansion but never reinterprets a `#` as a new directive — nested
//! directives inside a macro argument are not a thing the grammar allows.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::cond::ConditionalStack;
use crate::control::{AlwaysProcess, ConditionalKind, ControlListener};
use crate::diagnostics::{DiagnosticListener, SourceChangeKind};
use crate::error::{Error, Result};
use crate::eval;
use crate::expand;
use crate::features::{Feature, FeatureSet, Warning, WarningSet};
use crate::include::{IncludeResolver, VirtualFile, VirtualFileSystem};
use crate::lexer::Lexer;
use crate::macros::{Macro, MacroTable, PredefinedKind};
use crate::source::{PullOutcome, SourceFrame, SourceKind, SourceStack};
use crate::token::{NumericValue, Punctuator, Token, TokenKind, TokenValue};
use tracing::{trace, trace_span};

/// A `VirtualFileSystem` that resolves nothing, used when a caller never
/// configured one and only preprocesses self-contained text (§6 "no escape
/// hatch" — the absence of a real VFS is itself a valid, inert choice).
struct NullVfs;

impl VirtualFileSystem for NullVfs {
    fn get_file(&self, _dir: Option<&Path>, _name: &str) -> Option<Box<dyn VirtualFile>> {
        None
    }
}

fn number_token(line: u32, col: u32, value: i64) -> Token {
    Token::new(TokenKind::Number, line, col, value.to_string()).with_value(TokenValue::Number(
        NumericValue {
            radix: 10,
            int_digits: value.to_string(),
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

fn spell(tokens: &[Token]) -> String {
    let mut out = String::new();
    for t in tokens {
        out.push_str(&t.text);
    }
    out.trim().to_string()
}

/// Ergonomic constructor for [`Preprocessor`] (§6 ambient addition).
pub struct PreprocessorBuilder {
    vfs: Option<Box<dyn VirtualFileSystem>>,
    features: FeatureSet,
    warnings: WarningSet,
    diagnostics: Option<Box<dyn DiagnosticListener>>,
    control: Option<Box<dyn ControlListener>>,
    quote_paths: Vec<PathBuf>,
    system_paths: Vec<PathBuf>,
}

impl Default for PreprocessorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PreprocessorBuilder {
    pub fn new() -> Self {
        PreprocessorBuilder {
            vfs: None,
            features: FeatureSet::new(),
            warnings: WarningSet::new(),
            diagnostics: None,
            control: None,
            quote_paths: Vec::new(),
            system_paths: Vec::new(),
        }
    }

    pub fn vfs(mut self, vfs: impl VirtualFileSystem + 'static) -> Self {
        self.vfs = Some(Box::new(vfs));
        self
    }

    pub fn feature(mut self, f: Feature) -> Self {
        self.features.enable(f);
        self
    }

    pub fn warning(mut self, w: Warning) -> Self {
        self.warnings.enable(w);
        self
    }

    pub fn diagnostics(mut self, d: impl DiagnosticListener + 'static) -> Self {
        self.diagnostics = Some(Box::new(d));
        self
    }

    pub fn control(mut self, c: impl ControlListener + 'static) -> Self {
        self.control = Some(Box::new(c));
        self
    }

    pub fn quote_path(mut self, p: impl Into<PathBuf>) -> Self {
        self.quote_paths.push(p.into());
        self
    }

    pub fn system_path(mut self, p: impl Into<PathBuf>) -> Self {
        self.system_paths.push(p.into());
        self
    }

    fn build(self) -> Preprocessor {
        let mut resolver = IncludeResolver::new();
        resolver.quote_paths = self.quote_paths;
        resolver.system_paths = self.system_paths;
        Preprocessor {
            macros: MacroTable::new(),
            conditionals: ConditionalStack::new(),
            sources: SourceStack::new(),
            counter: 0,
            include_resolver: resolver,
            vfs: self.vfs.unwrap_or_else(|| Box::new(NullVfs)),
            features: self.features,
            warnings: self.warnings,
            diagnostics: self.diagnostics,
            control: self.control.unwrap_or_else(|| Box::new(AlwaysProcess)),
            at_line_start: true,
            pending: VecDeque::new(),
            pending_error: None,
            in_conditional_depth: 0,
            include_history: Vec::new(),
        }
    }

    pub fn build_for_string(self, name: impl Into<String>, text: impl Into<String>) -> Preprocessor {
        let mut pp = self.build();
        let name = name.into();
        pp.push_source(SourceFrame::new(
            SourceKind::StringLexer(Lexer::new(text.into())),
            name,
            false,
        ));
        pp
    }

    pub fn build_for_file(self, file: Box<dyn VirtualFile>) -> Result<Preprocessor> {
        let mut pp = self.build();
        let name = file.path().display().to_string();
        let lexer = file.read_to_lexer()?;
        pp.push_source(SourceFrame::new(SourceKind::FileLexer(lexer), name, false));
        Ok(pp)
    }
}

/// The preprocessing driver (§3 "Preprocessor"). Produced by
/// [`PreprocessorBuilder`]; consumed one token at a time via
/// [`Preprocessor::next_token`].
pub struct Preprocessor {
    pub macros: MacroTable,
    conditionals: ConditionalStack,
    sources: SourceStack,
    counter: i64,
    pub include_resolver: IncludeResolver,
    vfs: Box<dyn VirtualFileSystem>,
    pub features: FeatureSet,
    pub warnings: WarningSet,
    diagnostics: Option<Box<dyn DiagnosticListener>>,
    control: Box<dyn ControlListener>,
    at_line_start: bool,
    /// Small lookahead-restoration buffer: tokens pulled to test for a
    /// function-like invocation's `(` (or a directive's `#`) that turned out
    /// not to be one are pushed back here, in order (§9 "Unget slots").
    pending: VecDeque<Token>,
    /// A lex-level error surfaced with no diagnostic listener installed: the
    /// single failure mode of `token()` (§7). Recorded at the point the
    /// lexer detected it, then raised on the next call to `next_token` so the
    /// token already produced this pull still reaches the caller first.
    pending_error: Option<Error>,
    /// Nesting depth of `#if`/`#elif` condition expansion, so
    /// [`ControlListener::expand_macro`]'s `in_conditional` flag is accurate
    /// even when a macro expanded inside the condition itself triggers
    /// further nested expansion (§6 "Control listener").
    in_conditional_depth: u32,
    /// Every `#include`/`#include_next` accepted, in order: the name as
    /// written and the path it resolved to (§3 "Preprocessor context ...
    /// includes history", distinct from `include_resolver`'s once-seen dedup
    /// set).
    include_history: Vec<(String, PathBuf)>,
}

impl Preprocessor {
    pub fn for_string(name: impl Into<String>, text: impl Into<String>) -> Self {
        PreprocessorBuilder::new().build_for_string(name, text)
    }

    fn source_name(&self) -> String {
        self.sources.current_name().to_string()
    }

    fn report_error(&mut self, line: u32, col: u32, message: impl Into<String>) {
        let source = self.source_name();
        let message = message.into();
        if let Some(d) = self.diagnostics.as_mut() {
            d.handle_error(&source, line, col, &message);
        }
    }

    /// Reports a warning, escalating to an error when `Warning::Error` is in
    /// the configured warning set (§6 "Warnings" — "`ERROR` ... escalates
    /// every warning to an error").
    fn report_warning(&mut self, line: u32, col: u32, message: impl Into<String>) {
        let source = self.source_name();
        let message = message.into();
        if self.warnings.escalates_to_error() {
            if let Some(d) = self.diagnostics.as_mut() {
                d.handle_error(&source, line, col, &message);
            } else if self.pending_error.is_none() {
                self.pending_error = Some(Error::Directive {
                    file: source,
                    line,
                    col,
                    message,
                });
            }
            return;
        }
        if let Some(d) = self.diagnostics.as_mut() {
            d.handle_warning(&source, line, col, &message);
        }
    }

    /// Pushes a new source, firing `SUSPEND` for the previous top and `PUSH`
    /// for the new one (§4.C).
    fn push_source(&mut self, frame: SourceFrame) {
        let old_name = self.sources.top().map(|f| f.name.clone());
        if let Some(name) = &old_name {
            if let Some(d) = self.diagnostics.as_mut() {
                d.handle_source_change(name, SourceChangeKind::Suspend);
            }
        }
        let new_name = frame.name.clone();
        trace!(from = old_name.as_deref().unwrap_or("<none>"), to = %new_name, "push source");
        self.sources.push(frame);
        if let Some(d) = self.diagnostics.as_mut() {
            d.handle_source_change(&new_name, SourceChangeKind::Push);
        }
    }

    /// Explicitly pops a non-autopop source, firing `POP` then `RESUME`
    /// (§4.C "External (non-autopop) sources are popped only explicitly").
    fn pop_source(&mut self) {
        let Some(frame) = self.sources.pop() else { return };
        if self.features.is_enabled(Feature::Debug) {
            trace!(name = %frame.name, depth = self.sources.depth(), "pop source");
        }
        if let Some(d) = self.diagnostics.as_mut() {
            d.handle_source_change(&frame.name, SourceChangeKind::Pop);
        }
        if let Some(name) = self.sources.top().map(|f| f.name.clone()) {
            if let Some(d) = self.diagnostics.as_mut() {
                d.handle_source_change(&name, SourceChangeKind::Resume);
            }
        }
    }

    /// Reclaims every live resource: walks the source stack popping (and
    /// thereby closing) each frame in turn, and drops the pending-token
    /// lookahead buffer (§3 "on shutdown it closes every live source", §5
    /// "resources are reclaimed by `close`, which walks the live source stack
    /// and the pending input list and closes each"). Idempotent — closing an
    /// already-closed `Preprocessor` is a no-op.
    pub fn close(&mut self) {
        while !self.sources.is_empty() {
            self.pop_source();
        }
        self.pending.clear();
    }

    /// Builds the synthetic `#line N "file" F` token emitted when a source
    /// that produced newlines is autopopped under `Feature::LineMarkers`
    /// (§4.C, §6 "Line markers").
    fn line_marker_token(&self, flag: u8) -> Option<Token> {
        let top = self.sources.top()?;
        let line = match &top.kind {
            SourceKind::FileLexer(l) | SourceKind::StringLexer(l) => l.line(),
            _ => return None,
        };
        let text = format!("#line {line} \"{}\" {flag}\n", top.name);
        Some(Token::new(TokenKind::PLine, line, 1, text).with_value(TokenValue::LineMarkerFlag(flag)))
    }

    /// Whether the frame that just produced a token is replaying verbatim
    /// text that must never re-enter directive dispatch or macro lookup
    /// (§4.C, §4.I). Valid only right after a successful `raw_pull`, since
    /// the serving frame stays on top until it runs dry.
    fn top_is_replay_only(&self) -> bool {
        self.sources.top().is_some_and(|f| f.kind.is_replay_only())
    }

    /// Drains any diagnostics the lexer backing the current top frame
    /// accumulated while producing the token just pulled, forwarding them to
    /// the installed listener, or — absent one — recording the first error
    /// as `pending_error` so it surfaces as `token()`'s single failure mode
    /// (§7 "Propagation").
    fn drain_lexer_diagnostics(&mut self) {
        let Some(frame) = self.sources.top_mut() else { return };
        let diags = frame.kind.take_lexer_diagnostics();
        if diags.is_empty() {
            return;
        }
        let name = frame.name.clone();
        for d in diags {
            // `Feature::CSyntax` governs whether a stray invalid character is
            // an error at all; left disabled, it silently becomes an
            // `Invalid` token (§6 "CSYNTAX ... treat invalid tokens as
            // errors").
            if d.message.starts_with("stray invalid character")
                && !self.features.is_enabled(Feature::CSyntax)
            {
                continue;
            }
            let escalate = !d.is_error && self.warnings.escalates_to_error();
            if d.is_error || escalate {
                if let Some(diag) = self.diagnostics.as_mut() {
                    diag.handle_error(&name, d.line, d.col, &d.message);
                } else if self.pending_error.is_none() {
                    self.pending_error = Some(Error::Lex {
                        file: name.clone(),
                        line: d.line,
                        col: d.col,
                        message: d.message,
                    });
                }
            } else if let Some(diag) = self.diagnostics.as_mut() {
                diag.handle_warning(&name, d.line, d.col, &d.message);
            }
        }
    }

    fn raw_pull(&mut self) -> Option<Token> {
        if let Some(t) = self.pending.pop_front() {
            return Some(t);
        }
        loop {
            match self.sources.pull() {
                PullOutcome::Token(t) => {
                    self.drain_lexer_diagnostics();
                    return Some(t);
                }
                PullOutcome::Popped(frame) => {
                    if let Some(d) = self.diagnostics.as_mut() {
                        d.handle_source_change(&frame.name, SourceChangeKind::Pop);
                    }
                    let marker = if self.features.is_enabled(Feature::LineMarkers) && frame.emitted_newline {
                        self.line_marker_token(2)
                    } else {
                        None
                    };
                    if let Some(name) = self.sources.top().map(|f| f.name.clone()) {
                        if let Some(d) = self.diagnostics.as_mut() {
                            d.handle_source_change(&name, SourceChangeKind::Resume);
                        }
                    }
                    if let Some(tok) = marker {
                        return Some(tok);
                    }
                    continue;
                }
                PullOutcome::Exhausted | PullOutcome::Empty => return None,
            }
        }
    }

    fn push_back(&mut self, tokens: Vec<Token>) {
        for t in tokens.into_iter().rev() {
            self.pending.push_front(t);
        }
    }

    /// Whether a `(` follows, possibly after whitespace; on failure, every
    /// token consumed while checking is restored (§4.E "Invocation
    /// recognition").
    fn looks_like_invocation(&mut self) -> bool {
        let mut collected = Vec::new();
        loop {
            match self.raw_pull() {
                Some(t) if t.is_whitespace_like() => collected.push(t),
                Some(t) => {
                    let is_lparen = t.kind == TokenKind::Punct(Punctuator::LParen);
                    if !is_lparen {
                        collected.push(t);
                    }
                    self.push_back(collected);
                    return is_lparen;
                }
                None => {
                    self.push_back(collected);
                    return false;
                }
            }
        }
    }

    fn push_macro_tokens(&mut self, name: &str, tokens: Vec<Token>) {
        trace!(macro_name = name, token_count = tokens.len(), "macro expanded");
        self.push_source(SourceFrame::new(
            SourceKind::MacroTokenSource {
                macro_name: name.to_string(),
                tokens: tokens.into(),
            },
            name,
            true,
        ));
    }

    /// Fully macro-expands a standalone token list (a macro argument, or an
    /// `#if` condition) by running it through the same expansion machinery
    /// as ordinary scanning, in its own sub-scope on the source stack
    /// (§4.E "Argument pre-expansion").
    fn expand_fully(&mut self, tokens: Vec<Token>) -> Vec<Token> {
        self.push_source(SourceFrame::new(
            SourceKind::FixedTokenSource(tokens.into()),
            "<expansion>",
            false,
        ));
        let marker_depth = self.sources.depth();
        let mut out = Vec::new();
        loop {
            match self.pull_expanded_one() {
                Some(tok) => out.push(tok),
                None => {
                    if self.sources.depth() >= marker_depth {
                        self.pop_source();
                    }
                    break;
                }
            }
        }
        out
    }

    /// Pulls one token, expanding it if it names a currently-eligible macro.
    /// Never reinterprets directive syntax — only [`Preprocessor::next_token`]
    /// does that.
    fn pull_expanded_one(&mut self) -> Option<Token> {
        loop {
            let raw = self.raw_pull()?;
            if raw.kind != TokenKind::Identifier || self.top_is_replay_only() {
                return Some(raw);
            }
            match self.try_expand_identifier(&raw) {
                ExpansionOutcome::Predefined(tok) => return Some(tok),
                ExpansionOutcome::Pushed => continue,
                ExpansionOutcome::NotExpanded => return Some(raw),
            }
        }
    }

    fn try_expand_identifier(&mut self, tok: &Token) -> ExpansionOutcome {
        let name = tok.text.clone();
        if self.sources.is_expanding(&name) {
            return ExpansionOutcome::NotExpanded;
        }
        let Some(mac) = self.macros.get(&name).cloned() else {
            return ExpansionOutcome::NotExpanded;
        };

        if let Some(kind) = mac.predefined {
            return ExpansionOutcome::Predefined(self.expand_predefined(kind, tok));
        }

        let source = self.source_name();
        if !self
            .control
            .expand_macro(&name, &source, tok.line, tok.col, self.in_conditional_depth > 0)
        {
            return ExpansionOutcome::NotExpanded;
        }

        if mac.is_function_like {
            if !self.looks_like_invocation() {
                return ExpansionOutcome::NotExpanded;
            }
            let args = match expand::collect_arguments(&mac, || {
                self.raw_pull().unwrap_or_else(|| Token::eof(0, 0))
            }) {
                Ok(a) => a,
                Err(msg) => {
                    self.report_error(tok.line, tok.col, msg);
                    self.push_macro_tokens(&name, Vec::new());
                    return ExpansionOutcome::Pushed;
                }
            };
            let result = expand::substitute(&mac, &args, |raw| self.expand_fully(raw.to_vec()));
            for (line, col, msg) in result.warnings {
                self.report_warning(line, col, msg);
            }
            self.push_macro_tokens(&name, result.tokens);
        } else {
            let result = expand::substitute(&mac, &[], |raw| self.expand_fully(raw.to_vec()));
            for (line, col, msg) in result.warnings {
                self.report_warning(line, col, msg);
            }
            self.push_macro_tokens(&name, result.tokens);
        }
        ExpansionOutcome::Pushed
    }

    fn expand_predefined(&mut self, kind: PredefinedKind, tok: &Token) -> Token {
        match kind {
            PredefinedKind::Line => number_token(tok.line, tok.col, i64::from(tok.line)),
            PredefinedKind::File => {
                let name = self.source_name();
                let text = format!("\"{name}\"");
                Token::new(TokenKind::StringLiteral, tok.line, tok.col, text)
                    .with_value(TokenValue::Text(name))
            }
            PredefinedKind::Counter => {
                let v = self.counter;
                self.counter += 1;
                number_token(tok.line, tok.col, v)
            }
        }
    }

    /// Collapses a comment token down to a single space unless the relevant
    /// `KeepComments`/`KeepAllComments` feature says to preserve it verbatim
    /// (§6 "KEEPCOMMENTS, KEEPALLCOMMENTS").
    fn collapse_comment(&self, tok: Token) -> Token {
        let keep = match tok.kind {
            TokenKind::CComment => {
                self.features.is_enabled(Feature::KeepComments)
                    || self.features.is_enabled(Feature::KeepAllComments)
            }
            TokenKind::CppComment => self.features.is_enabled(Feature::KeepAllComments),
            _ => return tok,
        };
        if keep {
            return tok;
        }
        Token::new(TokenKind::Whitespace, tok.line, tok.col, " ")
    }

    /// Public entry point: the next preprocessed token, or `None` at the end
    /// of the translation unit.
    pub fn next_token(&mut self) -> Option<Result<Token>> {
        loop {
            if let Some(e) = self.pending_error.take() {
                return Some(Err(e));
            }
            if self.at_line_start {
                match self.try_consume_directive() {
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(e) => return Some(Err(e)),
                }
            }

            let active = self.conditionals.is_active();
            // §4.F "Active gating": a lexer serving an inactive branch goes
            // quiet (diagnostics suppressed) since its text was never meant
            // to be valid C in the first place.
            if let Some(f) = self.sources.top_mut() {
                f.kind.set_quiet(!active);
            }
            let next = if active {
                self.pull_expanded_one()
            } else {
                self.raw_pull()
            };
            let Some(tok) = next else { return None };
            let tok = self.collapse_comment(tok);

            match tok.kind {
                TokenKind::Newline => self.at_line_start = true,
                _ if tok.is_whitespace_like() => {}
                _ => self.at_line_start = false,
            }

            if active || tok.kind == TokenKind::Newline {
                return Some(Ok(tok));
            }
        }
    }

    /// Convenience wrapper: drains the whole translation unit into one
    /// `String`, stopping at the first error (§6 ambient addition).
    pub fn run_to_string(&mut self) -> Result<String> {
        let mut out = String::new();
        while let Some(tok) = self.next_token() {
            out.push_str(&tok?.text);
        }
        Ok(out)
    }

    /// Every `#include`/`#include_next` accepted so far, as `(name-as-written,
    /// resolved-path)` pairs, in inclusion order (§3 "includes history").
    pub fn include_history(&self) -> &[(String, PathBuf)] {
        &self.include_history
    }

    fn try_consume_directive(&mut self) -> Result<bool> {
        let mut leading = Vec::new();
        loop {
            let Some(tok) = self.raw_pull() else {
                self.push_back(leading);
                return Ok(false);
            };
            if tok.kind == TokenKind::Newline {
                leading.push(tok);
                self.push_back(leading);
                return Ok(false);
            }
            if tok.is_whitespace_like() {
                leading.push(tok);
                continue;
            }
            if tok.kind == TokenKind::Punct(Punctuator::Hash) && !self.top_is_replay_only() {
                self.handle_directive(tok)?;
                return Ok(true);
            }
            leading.push(tok);
            self.push_back(leading);
            return Ok(false);
        }
    }

    fn collect_rest_of_line(&mut self) -> Vec<Token> {
        let mut out = Vec::new();
        while let Some(tok) = self.raw_pull() {
            if tok.kind == TokenKind::Newline {
                break;
            }
            out.push(tok);
        }
        out
    }

    fn significant(tokens: &[Token]) -> Vec<&Token> {
        tokens.iter().filter(|t| !t.is_whitespace_like()).collect()
    }

    fn handle_directive(&mut self, hash: Token) -> Result<()> {
        // The directive name is read on its own, ahead of the rest of the
        // line, so that `#include`/`#include_next` can switch the lexer into
        // header-name mode before `<...>` is lexed (§4.B "header names").
        let name_tok = loop {
            let Some(tok) = self.raw_pull() else {
                return Ok(());
            };
            if tok.kind == TokenKind::Newline {
                return Ok(()); // null directive, e.g. a bare '#'
            }
            if tok.is_whitespace_like() {
                continue;
            }
            break tok;
        };
        let name = name_tok.text.clone();

        let is_include = matches!(name.as_str(), "include" | "include_next");
        if is_include {
            self.sources.top_mut().map(|f| f.kind.set_include_mode(true));
        }
        let rest = self.collect_rest_of_line();
        if is_include {
            self.sources.top_mut().map(|f| f.kind.set_include_mode(false));
        }

        let active = self.conditionals.is_active();
        let _span = trace_span!("directive", name = %name, line = name_tok.line).entered();

        match name.as_str() {
            "if" => self.directive_if(&name_tok, rest, ConditionalKind::If),
            "ifdef" => self.directive_ifdef(&name_tok, &rest, false),
            "ifndef" => self.directive_ifdef(&name_tok, &rest, true),
            "elif" => self.directive_elif(&name_tok, rest),
            "else" => self.directive_else(&hash, &name_tok, &rest),
            "endif" => self.directive_endif(&hash, &name_tok, &rest),
            _ if !active => Ok(()),
            "define" => self.directive_define(&hash, &name_tok, rest),
            "undef" => self.directive_undef(&hash, &name_tok, rest),
            "include" => self.directive_include(&hash, &name_tok, rest, false),
            "include_next" => self.directive_include(&hash, &name_tok, rest, true),
            "line" => Ok(()),
            "pragma" => self.directive_pragma(&hash, &name_tok, rest),
            "error" => Err(Error::UserError(spell(&rest))),
            "warning" => {
                self.report_warning(name_tok.line, name_tok.col, spell(&rest));
                Ok(())
            }
            other => Err(Error::Directive {
                file: self.source_name(),
                line: name_tok.line,
                col: name_tok.col,
                message: format!("invalid preprocessing directive #{other}"),
            }),
        }
    }

    fn replay_verbatim(&mut self, hash: &Token, name: &Token, rest: &[Token]) {
        let mut tokens = Vec::with_capacity(rest.len() + 3);
        tokens.push(hash.clone());
        tokens.push(name.clone());
        tokens.extend(rest.iter().cloned());
        tokens.push(Token::new(TokenKind::Newline, name.line, name.col, "\n"));
        self.push_source(SourceFrame::new(
            SourceKind::UnprocessedFixedTokenSource(tokens.into()),
            "<directive>",
            true,
        ));
    }

    /// Replays a declined `#if`/`#ifdef`/`#ifndef`/`#elif` line, letting the
    /// control listener substitute its own rendering of the condition via
    /// [`ControlListener::partially_processed_condition`] in place of the
    /// original tokens (§6 "Control plane").
    fn replay_condition(&mut self, hash: &Token, name: &Token, rest: &[Token], kind: ConditionalKind) {
        let source = self.source_name();
        let condition_text = spell(rest);
        let override_text = self.control.partially_processed_condition(&condition_text, &source, kind);
        match override_text {
            Some(text) => {
                let mut lexer = Lexer::new(text);
                let mut tokens = Vec::new();
                loop {
                    let t = lexer.next_token();
                    if t.is_eof() {
                        break;
                    }
                    tokens.push(t);
                }
                self.replay_verbatim(hash, name, &tokens);
            }
            None => self.replay_verbatim(hash, name, rest),
        }
    }

    fn directive_if(&mut self, name_tok: &Token, rest: Vec<Token>, kind: ConditionalKind) -> Result<()> {
        let hash = Token::new(TokenKind::Punct(Punctuator::Hash), name_tok.line, 1, "#");
        if !self.conditionals.is_active() {
            self.conditionals.push_if(true, false, name_tok.line);
            return Ok(());
        }
        let source = self.source_name();
        let condition_text = spell(&rest);
        if !self.control.process_if(&condition_text, &source, kind) {
            self.conditionals.push_if(false, false, name_tok.line);
            self.replay_condition(&hash, name_tok, &rest, kind);
            return Ok(());
        }
        let presub = self.presubstitute_defined(&rest);
        self.in_conditional_depth += 1;
        let expanded = self.expand_fully(presub);
        self.in_conditional_depth -= 1;
        let source = self.source_name();
        let macros = &self.macros;
        let mut iter = expanded.into_iter().filter(|t| !t.is_whitespace_like());
        let warn_undef = self.warnings.is_enabled(Warning::Undef);
        let (value, warnings) = eval::evaluate_with_warnings(
            || iter.next().unwrap_or_else(|| Token::eof(name_tok.line, name_tok.col)),
            |n: &str| macros.is_defined(n),
            &source,
            warn_undef,
        )?;
        for (line, col, msg) in warnings {
            self.report_warning(line, col, msg);
        }
        self.conditionals.push_if(true, value != 0, name_tok.line);
        Ok(())
    }

    fn directive_ifdef(&mut self, name_tok: &Token, rest: &[Token], negate: bool) -> Result<()> {
        let hash = Token::new(TokenKind::Punct(Punctuator::Hash), name_tok.line, 1, "#");
        let sig = Self::significant(rest);
        let target = sig
            .first()
            .map(|t| t.text.clone())
            .ok_or_else(|| Error::Directive {
                file: self.source_name(),
                line: name_tok.line,
                col: name_tok.col,
                message: "macro name missing".to_string(),
            })?;
        if !self.conditionals.is_active() {
            self.conditionals.push_if(true, false, name_tok.line);
            return Ok(());
        }
        let kind = if negate {
            ConditionalKind::Ifndef
        } else {
            ConditionalKind::Ifdef
        };
        let source = self.source_name();
        if !self.control.process_if(&target, &source, kind) {
            self.conditionals.push_if(false, false, name_tok.line);
            self.replay_verbatim(&hash, name_tok, rest);
            return Ok(());
        }
        let mut defined = self.macros.is_defined(&target);
        if negate {
            defined = !defined;
        }
        self.conditionals.push_if(true, defined, name_tok.line);
        Ok(())
    }

    fn directive_elif(&mut self, name_tok: &Token, rest: Vec<Token>) -> Result<()> {
        let hash = Token::new(TokenKind::Punct(Punctuator::Hash), name_tok.line, 1, "#");
        let processed = self.conditionals.top_processed().ok_or_else(|| Error::Directive {
            file: self.source_name(),
            line: name_tok.line,
            col: name_tok.col,
            message: "#elif without a matching #if".to_string(),
        })?;
        if !processed {
            self.conditionals
                .elif(false)
                .map_err(|m| self.directive_error(name_tok, m))?;
            self.replay_verbatim(&hash, name_tok, &rest);
            return Ok(());
        }
        if !self.conditionals.should_evaluate() {
            self.conditionals
                .elif(false)
                .map_err(|m| self.directive_error(name_tok, m))?;
            return Ok(());
        }
        let source = self.source_name();
        if !self.control.process_if(&spell(&rest), &source, ConditionalKind::Elif) {
            self.conditionals
                .elif(false)
                .map_err(|m| self.directive_error(name_tok, m))?;
            self.replay_condition(&hash, name_tok, &rest, ConditionalKind::Elif);
            return Ok(());
        }
        let presub = self.presubstitute_defined(&rest);
        self.in_conditional_depth += 1;
        let expanded = self.expand_fully(presub);
        self.in_conditional_depth -= 1;
        let source = self.source_name();
        let macros = &self.macros;
        let mut iter = expanded.into_iter().filter(|t| !t.is_whitespace_like());
        let warn_undef = self.warnings.is_enabled(Warning::Undef);
        let (value, warnings) = eval::evaluate_with_warnings(
            || iter.next().unwrap_or_else(|| Token::eof(name_tok.line, name_tok.col)),
            |n: &str| macros.is_defined(n),
            &source,
            warn_undef,
        )?;
        for (line, col, msg) in warnings {
            self.report_warning(line, col, msg);
        }
        self.conditionals
            .elif(value != 0)
            .map_err(|m| self.directive_error(name_tok, m))
    }

    fn directive_else(&mut self, hash: &Token, name_tok: &Token, rest: &[Token]) -> Result<()> {
        let processed = self
            .conditionals
            .top_processed()
            .ok_or_else(|| self.directive_error(name_tok, "#else without a matching #if".to_string()))?;
        self.conditionals
            .else_branch()
            .map_err(|m| self.directive_error(name_tok, m))?;
        if !processed {
            self.replay_verbatim(hash, name_tok, rest);
        }
        Ok(())
    }

    fn directive_endif(&mut self, hash: &Token, name_tok: &Token, rest: &[Token]) -> Result<()> {
        let frame = self
            .conditionals
            .end()
            .map_err(|m| self.directive_error(name_tok, m))?;
        if !frame.processed {
            self.replay_verbatim(hash, name_tok, rest);
        }
        Ok(())
    }

    fn directive_error(&self, tok: &Token, message: impl Into<String>) -> Error {
        Error::Directive {
            file: self.sources.current_name().to_string(),
            line: tok.line,
            col: tok.col,
            message: message.into(),
        }
    }

    /// Replaces `defined X` / `defined(X)` with a literal `1`/`0` before
    /// ordinary macro expansion runs over the rest of the condition (§4.G):
    /// `defined`'s operand must never itself be macro-expanded.
    fn presubstitute_defined(&self, tokens: &[Token]) -> Vec<Token> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            if tokens[i].kind == TokenKind::Identifier && tokens[i].text == "defined" {
                let mut j = i + 1;
                while j < tokens.len() && tokens[j].is_whitespace_like() {
                    j += 1;
                }
                let parenthesized = j < tokens.len() && tokens[j].kind == TokenKind::Punct(Punctuator::LParen);
                if parenthesized {
                    j += 1;
                    while j < tokens.len() && tokens[j].is_whitespace_like() {
                        j += 1;
                    }
                }
                if j < tokens.len() && tokens[j].kind == TokenKind::Identifier {
                    let target = tokens[j].text.clone();
                    j += 1;
                    if parenthesized {
                        while j < tokens.len() && tokens[j].is_whitespace_like() {
                            j += 1;
                        }
                        if j < tokens.len() && tokens[j].kind == TokenKind::Punct(Punctuator::RParen) {
                            j += 1;
                        }
                    }
                    let value = i64::from(self.macros.is_defined(&target));
                    out.push(number_token(tokens[i].line, tokens[i].col, value));
                    i = j;
                    continue;
                }
            }
            out.push(tokens[i].clone());
            i += 1;
        }
        out
    }

    fn directive_define(&mut self, hash: &Token, name_tok: &Token, rest: Vec<Token>) -> Result<()> {
        let mut idx = 0;
        while rest.get(idx).is_some_and(|t| t.is_whitespace_like()) {
            idx += 1;
        }
        let Some(macro_name_tok) = rest.get(idx) else {
            return Err(self.directive_error(name_tok, "macro name missing"));
        };
        if macro_name_tok.kind != TokenKind::Identifier {
            return Err(self.directive_error(macro_name_tok, "macro name must be an identifier"));
        }
        let macro_name = macro_name_tok.text.clone();
        idx += 1;

        let is_function_like = rest
            .get(idx)
            .is_some_and(|t| t.kind == TokenKind::Punct(Punctuator::LParen));

        let source = self.source_name();
        let (line, col) = (macro_name_tok.line, macro_name_tok.col);

        let built = if is_function_like {
            idx += 1;
            let mut params = Vec::new();
            let mut is_variadic = false;
            loop {
                while rest.get(idx).is_some_and(|t| t.is_whitespace_like()) {
                    idx += 1;
                }
                match rest.get(idx) {
                    Some(t) if t.kind == TokenKind::Punct(Punctuator::RParen) => {
                        idx += 1;
                        break;
                    }
                    Some(t) if t.kind == TokenKind::Punct(Punctuator::Ellipsis) => {
                        is_variadic = true;
                        idx += 1;
                        while rest.get(idx).is_some_and(|t| t.is_whitespace_like()) {
                            idx += 1;
                        }
                        if rest.get(idx).is_some_and(|t| t.kind == TokenKind::Punct(Punctuator::RParen)) {
                            idx += 1;
                        }
                        break;
                    }
                    Some(t) if t.kind == TokenKind::Identifier => {
                        params.push(t.text.clone());
                        idx += 1;
                        while rest.get(idx).is_some_and(|t| t.is_whitespace_like()) {
                            idx += 1;
                        }
                        match rest.get(idx) {
                            Some(t) if t.kind == TokenKind::Punct(Punctuator::Comma) => {
                                idx += 1;
                            }
                            Some(t) if t.kind == TokenKind::Punct(Punctuator::RParen) => {
                                idx += 1;
                                break;
                            }
                            _ => return Err(self.directive_error(name_tok, "expected ',' or ')' in macro parameter list")),
                        }
                    }
                    _ => return Err(self.directive_error(name_tok, "malformed macro parameter list")),
                }
            }
            while rest.get(idx).is_some_and(|t| t.is_whitespace_like()) {
                idx += 1;
            }
            Macro::function_like(&macro_name, &source, line, col, params, is_variadic, &rest[idx..])
        } else {
            while rest.get(idx).is_some_and(|t| t.is_whitespace_like()) {
                idx += 1;
            }
            Macro::object_like(&macro_name, &source, line, col, &rest[idx..])
        };

        let mac = built.map_err(|m| self.directive_error(name_tok, m))?;

        if !self.control.add_macro(&macro_name, &source) {
            self.replay_verbatim(hash, name_tok, &rest);
            return Ok(());
        }
        self.macros.define(mac);
        if let Some(d) = self.diagnostics.as_mut() {
            d.handle_define(&macro_name, &source);
        }
        Ok(())
    }

    fn directive_undef(&mut self, hash: &Token, name_tok: &Token, rest: Vec<Token>) -> Result<()> {
        let sig = Self::significant(&rest);
        let target = sig
            .first()
            .map(|t| t.text.clone())
            .ok_or_else(|| self.directive_error(name_tok, "macro name missing"))?;
        let source = self.source_name();
        if !self.control.remove_macro(&target, &source) {
            self.replay_verbatim(hash, name_tok, &rest);
            return Ok(());
        }
        self.macros.undefine(&target);
        if let Some(d) = self.diagnostics.as_mut() {
            d.handle_undefine(&target, &source);
        }
        Ok(())
    }

    fn directive_include(&mut self, hash: &Token, name_tok: &Token, rest: Vec<Token>, is_next: bool) -> Result<()> {
        // A quoted name always lexes as a string literal (§4.B); only
        // `<...>` becomes a `Header` token, and only in include mode.
        let header = Self::significant(&rest)
            .into_iter()
            .find(|t| t.kind == TokenKind::Header || t.kind == TokenKind::StringLiteral)
            .cloned();

        let Some(header) = header else {
            return Err(self.directive_error(name_tok, "expected \"FILENAME\" or <FILENAME>"));
        };
        let quoted = header.kind == TokenKind::StringLiteral;
        let raw_name: String = header.text.chars().skip(1).take(header.text.chars().count().saturating_sub(2)).collect();

        let source = self.source_name();
        if !self.control.include(&raw_name, is_next, &source) {
            self.replay_verbatim(hash, name_tok, &rest);
            return Ok(());
        }

        let current_dir = Path::new(&source).parent().map(|p| p.to_path_buf());
        // Without `Feature::IncludeNext` enabled, `#include_next` resolves
        // like a plain `#include` (no path-list skip-past).
        let skip_past = if is_next && self.features.is_enabled(Feature::IncludeNext) {
            current_dir.clone()
        } else {
            None
        };
        let resolved = self
            .include_resolver
            .resolve(self.vfs.as_ref(), &raw_name, quoted, current_dir.as_deref(), skip_past.as_deref());

        match resolved {
            Ok((file, _searched)) => {
                let path = file.path().to_path_buf();
                let already_once =
                    self.features.is_enabled(Feature::PragmaOnce) && self.include_resolver.already_seen_once(&path);
                let lexer = file.read_to_lexer()?;
                let display = path.display().to_string();
                self.push_source(SourceFrame::new(SourceKind::FileLexer(lexer), display.clone(), true));
                if already_once {
                    // The file was already marked `#pragma once`: push so the
                    // PUSH/POP source-change events and `handle_include` still
                    // fire, then immediately pop so it contributes no tokens.
                    self.pop_source();
                } else if self.features.is_enabled(Feature::LineMarkers) {
                    if let Some(marker) = self.line_marker_token(1) {
                        self.pending.push_back(marker);
                    }
                }
                self.include_history.push((raw_name.clone(), path));
                if let Some(d) = self.diagnostics.as_mut() {
                    d.handle_include(&raw_name, is_next, &source, &display);
                }
                Ok(())
            }
            Err(searched) => Err(IncludeResolver::not_found_error(&raw_name, searched)),
        }
    }

    fn directive_pragma(&mut self, hash: &Token, name_tok: &Token, rest: Vec<Token>) -> Result<()> {
        let sig = Self::significant(&rest);
        if sig.first().is_some_and(|t| t.is_identifier("once")) {
            if self.features.is_enabled(Feature::PragmaOnce) {
                if let Some(name) = self.sources.top().map(|f| f.name.clone()) {
                    self.include_resolver.mark_pragma_once(Path::new(&name));
                }
            }
            return Ok(());
        }
        self.report_warning(name_tok.line, name_tok.col, format!("unknown pragma: {}", spell(&rest)));
        self.replay_verbatim(hash, name_tok, &rest);
        Ok(())
    }
}

impl Drop for Preprocessor {
    /// Closing is idempotent, so a caller that already called
    /// [`Preprocessor::close`] explicitly pays nothing extra here.
    fn drop(&mut self) {
        self.close();
    }
}

enum ExpansionOutcome {
    Predefined(Token),
    Pushed,
    NotExpanded,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> String {
        let mut pp = Preprocessor::for_string("t.c", src);
        pp.run_to_string().unwrap()
    }

    #[test]
    fn object_macro_expands_inline() {
        assert_eq!(run("#define N 5\nN\n").trim(), "5");
    }

    #[test]
    fn function_macro_substitutes_arguments() {
        assert_eq!(run("#define ADD(a,b) a+b\nADD(1,2)\n").trim(), "1+2");
    }

    #[test]
    fn self_referential_macro_does_not_recurse() {
        assert_eq!(run("#define A A\nA\n").trim(), "A");
    }

    #[test]
    fn conditional_selects_true_branch() {
        assert_eq!(run("#if 1\nYES\n#else\nNO\n#endif\n").trim(), "YES");
    }

    #[test]
    fn conditional_selects_false_branch_via_elif() {
        let out = run("#if 0\nA\n#elif 1\nB\n#else\nC\n#endif\n");
        assert_eq!(out.trim(), "B");
    }

    #[test]
    fn ifdef_checks_macro_table() {
        assert_eq!(run("#define X\n#ifdef X\nYES\n#endif\n").trim(), "YES");
        assert_eq!(run("#ifndef X\nYES\n#endif\n").trim(), "YES");
    }

    #[test]
    fn undef_removes_macro() {
        assert_eq!(run("#define X 1\n#undef X\n#ifdef X\nA\n#else\nB\n#endif\n").trim(), "B");
    }

    #[test]
    fn stringize_and_paste_operators() {
        assert_eq!(run("#define S(x) #x\nS(hi)\n").trim(), "\"hi\"");
        assert_eq!(run("#define C(a,b) a##b\nC(foo,bar)\n").trim(), "foobar");
    }

    #[test]
    fn line_and_counter_predefined_macros() {
        assert_eq!(run("__LINE__\n").trim(), "1");
        let out = run("__COUNTER__ __COUNTER__\n");
        assert_eq!(out.trim(), "0 1");
    }

    #[test]
    fn declined_conditional_processing_preserves_directives_verbatim() {
        use crate::control::PreserveConditionals;
        let mut pp = PreprocessorBuilder::new()
            .control(PreserveConditionals)
            .build_for_string("t.c", "#if 0\nA\n#else\nB\n#endif\n");
        let out = pp.run_to_string().unwrap();
        assert!(out.contains("#if 0"));
        assert!(out.contains("A"));
        assert!(out.contains("#else"));
        assert!(out.contains("B"));
        assert!(out.contains("#endif"));
    }

    #[test]
    fn error_directive_is_fatal() {
        let mut pp = Preprocessor::for_string("t.c", "#error boom\n");
        let err = pp.run_to_string().unwrap_err();
        assert!(matches!(err, Error::UserError(_)));
    }

    #[test]
    fn variadic_macro_joins_remaining_arguments() {
        let out = run("#define LOG(fmt, ...) fmt: __VA_ARGS__\nLOG(\"x\", 1, 2)\n");
        assert_eq!(out.trim(), "\"x\": 1, 2");
    }
}
