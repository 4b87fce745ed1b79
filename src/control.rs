//! The control-plane seam (§6 "Control listener (exposed)") — what makes
//! this engine more than a classical preprocessor (§1).
//!
//! Installing a [`ControlListener`] lets a caller instruct the driver to
//! leave specific directives unresolved in the output, e.g. to expand macros
//! only inside `#if` conditions while leaving the `#if` itself in place, or to
//! preserve only directives that mention a declared set of external
//! features.

/// Which conditional directive is asking permission to be processed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionalKind {
    If,
    Ifdef,
    Ifndef,
    Elif,
}

/// Capability object steering directive processing. Default implementations
/// say "yes, process it normally" for every hook, so the preprocessor behaves
/// like a classical one until a caller overrides a hook.
pub trait ControlListener {
    /// Called before a `#define` takes effect. Returning `false` still lets
    /// the driver track the directive's conditional-nesting bookkeeping, but
    /// the macro table is left untouched and the raw directive is replayed
    /// into the output.
    fn add_macro(&mut self, name: &str, source: &str) -> bool {
        let _ = (name, source);
        true
    }

    fn remove_macro(&mut self, name: &str, source: &str) -> bool {
        let _ = (name, source);
        true
    }

    /// Called before a `#include`/`#include_next` is resolved and pushed.
    fn include(&mut self, text: &str, is_next: bool, source: &str) -> bool {
        let _ = (text, is_next, source);
        true
    }

    /// Called before an `#if`/`#ifdef`/`#ifndef`/`#elif` condition is
    /// evaluated. Receives the raw, un-expanded condition tokens' source
    /// text. Returning `false` leaves the branch active but unevaluated (the
    /// directive is preserved verbatim in the output) — see §4.F.
    fn process_if(&mut self, condition_text: &str, source: &str, kind: ConditionalKind) -> bool {
        let _ = (condition_text, source, kind);
        true
    }

    /// Called before an identifier naming a macro is expanded at the point
    /// `(line, col)`. `in_conditional` is true when the expansion point is
    /// inside an `#if`/`#elif` expression rather than ordinary text — this is
    /// the hook that lets a caller "expand macros only where they appear
    /// inside `#if` conditions while leaving the `#if` itself in the output"
    /// (§1).
    fn expand_macro(
        &mut self,
        macro_name: &str,
        source: &str,
        line: u32,
        col: u32,
        in_conditional: bool,
    ) -> bool {
        let _ = (macro_name, source, line, col, in_conditional);
        true
    }

    /// When [`ControlListener::process_if`] declines, the driver asks for an
    /// alternative rendering of the condition to replay instead of the raw
    /// tokens (e.g. with macros expanded but the `#if` kept). `None` means
    /// "replay the raw condition tokens unchanged".
    fn partially_processed_condition(
        &mut self,
        condition_text: &str,
        source: &str,
        kind: ConditionalKind,
    ) -> Option<String> {
        let _ = (condition_text, source, kind);
        None
    }
}

/// A listener that processes everything normally — behaviorally identical to
/// having no listener installed, useful as an explicit default and in tests
/// that want to assert a control listener's absence doesn't change output.
#[derive(Default)]
pub struct AlwaysProcess;

impl ControlListener for AlwaysProcess {}

/// A listener that declines every `#if`-family directive, preserving all
/// conditional structure verbatim while still letting the driver track
/// nesting — this is the behavior scenario 5 of §8 exercises.
#[derive(Default)]
pub struct PreserveConditionals;

impl ControlListener for PreserveConditionals {
    fn process_if(&mut self, _condition_text: &str, _source: &str, _kind: ConditionalKind) -> bool {
        false
    }
}
