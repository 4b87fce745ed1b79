//! The source stack (§3 "Source (abstraction)", §4.C, §9 "Source
//! polymorphism without inheritance").
//!
//! Rather than an inheritance hierarchy, `Source` is modeled as a tagged
//! variant over its five concrete kinds, with the expansion-chain check
//! implemented by walking the stack itself rather than per-source parent
//! pointers — the stack order already encodes the nesting the standard's
//! "blue paint" rule needs (GLOSSARY "Expansion chain").

use std::collections::VecDeque;

use crate::lexer::{LexDiagnostic, Lexer};
use crate::token::Token;

/// One of the five concrete producers a [`SourceFrame`] can wrap.
pub enum SourceKind {
    /// Reads a file obtained from the `VirtualFileSystem`.
    FileLexer(Lexer),
    /// Reads from an in-memory string (the translation unit's own text, or a
    /// user-supplied fragment).
    StringLexer(Lexer),
    /// Replays a pre-built token list, re-triggering directive handling as
    /// usual (e.g. a macro argument captured for pre-expansion).
    FixedTokenSource(VecDeque<Token>),
    /// Drives substitution of one macro invocation; its tokens are the fully
    /// substituted and pasted replacement, precomputed by
    /// [`crate::expand::substitute`].
    MacroTokenSource { macro_name: String, tokens: VecDeque<Token> },
    /// Replays tokens *without* re-triggering directive handling — used when
    /// the control listener declines to process a directive and its raw (or
    /// partially-processed) tokens must simply flow through to the output.
    UnprocessedFixedTokenSource(VecDeque<Token>),
}

impl SourceKind {
    fn pull(&mut self) -> Option<Token> {
        match self {
            SourceKind::FileLexer(lexer) | SourceKind::StringLexer(lexer) => {
                let tok = lexer.next_token();
                if tok.is_eof() {
                    None
                } else {
                    Some(tok)
                }
            }
            SourceKind::FixedTokenSource(q) => q.pop_front(),
            SourceKind::MacroTokenSource { tokens, .. } => tokens.pop_front(),
            SourceKind::UnprocessedFixedTokenSource(q) => q.pop_front(),
        }
    }

    /// `true` for the two kinds whose tokens should NOT re-enter directive
    /// dispatch / macro-identifier lookup in the driver (§4.C, §4.I).
    pub fn is_replay_only(&self) -> bool {
        matches!(self, SourceKind::UnprocessedFixedTokenSource(_))
    }

    pub fn take_lexer_diagnostics(&mut self) -> Vec<LexDiagnostic> {
        match self {
            SourceKind::FileLexer(l) | SourceKind::StringLexer(l) => l.take_diagnostics(),
            _ => Vec::new(),
        }
    }

    pub fn set_include_mode(&mut self, on: bool) {
        if let SourceKind::FileLexer(l) | SourceKind::StringLexer(l) = self {
            l.include_mode = on;
        }
    }

    pub fn set_quiet(&mut self, on: bool) {
        if let SourceKind::FileLexer(l) | SourceKind::StringLexer(l) = self {
            l.quiet = on;
        }
    }
}

/// `{ tokens-of-directive, parent, autopop, active, ... }` as it applies to
/// one level of the source stack (§3).
pub struct SourceFrame {
    pub kind: SourceKind,
    /// Display name: the file path for a file source, a synthetic label
    /// (`"<command-line>"`, a macro name) otherwise. Feeds `__FILE__` and
    /// diagnostic source text.
    pub name: String,
    pub autopop: bool,
    /// Whether any newline-bearing token has been produced by this frame,
    /// used to decide whether popping it warrants a synthetic line marker
    /// under `Feature::LineMarkers` (§4.C).
    pub emitted_newline: bool,
}

impl SourceFrame {
    pub fn new(kind: SourceKind, name: impl Into<String>, autopop: bool) -> Self {
        SourceFrame {
            kind,
            name: name.into(),
            autopop,
            emitted_newline: false,
        }
    }
}

/// The stack of live sources (§4.C). Every `push` is matched by exactly one
/// `pop` (§3 invariant), enforced by the driver rather than this type, which
/// only provides mechanism.
#[derive(Default)]
pub struct SourceStack {
    frames: Vec<SourceFrame>,
}

impl SourceStack {
    pub fn new() -> Self {
        SourceStack { frames: Vec::new() }
    }

    pub fn push(&mut self, frame: SourceFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<SourceFrame> {
        self.frames.pop()
    }

    pub fn top_mut(&mut self) -> Option<&mut SourceFrame> {
        self.frames.last_mut()
    }

    pub fn top(&self) -> Option<&SourceFrame> {
        self.frames.last()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn current_name(&self) -> &str {
        self.frames.last().map(|f| f.name.as_str()).unwrap_or("<no source>")
    }

    /// Pulls the next token from the top frame, popping exhausted frames
    /// (honoring `autopop`) until a token is produced or the stack empties.
    /// Returns the token together with the name of the frame it came from
    /// (for diagnostics) and whether that frame was popped in the process.
    pub fn pull(&mut self) -> PullOutcome {
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return PullOutcome::Empty;
            };
            match frame.kind.pull() {
                Some(tok) => {
                    if matches!(tok.kind, crate::token::TokenKind::Newline) {
                        frame.emitted_newline = true;
                    }
                    return PullOutcome::Token(tok);
                }
                None => {
                    if frame.autopop {
                        let popped = self.frames.pop().unwrap();
                        return PullOutcome::Popped(popped);
                    } else {
                        return PullOutcome::Exhausted;
                    }
                }
            }
        }
    }

    /// Walks the stack checking whether `name` is currently mid-expansion —
    /// the self-recursion guard (§4.E "Self-recursion guard").
    pub fn is_expanding(&self, name: &str) -> bool {
        self.frames.iter().any(|f| {
            matches!(&f.kind, SourceKind::MacroTokenSource { macro_name, .. } if macro_name == name)
        })
    }
}

/// Result of one [`SourceStack::pull`] call.
pub enum PullOutcome {
    Token(Token),
    /// The top frame was exhausted and (being `autopop`) has been popped;
    /// the caller should retry pulling from the new top.
    Popped(SourceFrame),
    /// The top frame was exhausted but is not `autopop`; the caller must
    /// pop it explicitly.
    Exhausted,
    /// No frames remain.
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    fn tok(kind: TokenKind, text: &str) -> Token {
        Token::new(kind, 1, 1, text)
    }

    #[test]
    fn pulls_through_fixed_source() {
        let mut stack = SourceStack::new();
        let mut q = VecDeque::new();
        q.push_back(tok(TokenKind::Identifier, "A"));
        stack.push(SourceFrame::new(
            SourceKind::FixedTokenSource(q),
            "fixed",
            true,
        ));
        match stack.pull() {
            PullOutcome::Token(t) => assert_eq!(t.text, "A"),
            _ => panic!(),
        }
    }

    #[test]
    fn autopop_cascades_to_parent() {
        let mut stack = SourceStack::new();
        let mut outer = VecDeque::new();
        outer.push_back(tok(TokenKind::Identifier, "OUTER"));
        stack.push(SourceFrame::new(
            SourceKind::FixedTokenSource(outer),
            "outer",
            true,
        ));
        stack.push(SourceFrame::new(
            SourceKind::FixedTokenSource(VecDeque::new()),
            "inner",
            true,
        ));
        match stack.pull() {
            PullOutcome::Popped(f) => assert_eq!(f.name, "inner"),
            _ => panic!("expected inner frame to pop"),
        }
        match stack.pull() {
            PullOutcome::Token(t) => assert_eq!(t.text, "OUTER"),
            _ => panic!(),
        }
    }

    #[test]
    fn non_autopop_reports_exhausted() {
        let mut stack = SourceStack::new();
        stack.push(SourceFrame::new(
            SourceKind::FixedTokenSource(VecDeque::new()),
            "x",
            false,
        ));
        assert!(matches!(stack.pull(), PullOutcome::Exhausted));
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn is_expanding_detects_macro_on_stack() {
        let mut stack = SourceStack::new();
        stack.push(SourceFrame::new(
            SourceKind::MacroTokenSource {
                macro_name: "FOO".into(),
                tokens: VecDeque::new(),
            },
            "FOO",
            true,
        ));
        assert!(stack.is_expanding("FOO"));
        assert!(!stack.is_expanding("BAR"));
    }

    #[test]
    fn empty_stack_pull_reports_empty() {
        let mut stack = SourceStack::new();
        assert!(matches!(stack.pull(), PullOutcome::Empty));
    }
}
