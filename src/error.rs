//! Crate-level error type.
//!
//! Most diagnostics flow through the [`crate::diagnostics::DiagnosticListener`]
//! seam and processing continues at the next safe boundary (§7 of the design).
//! `Error` is the single failure mode of [`crate::driver::Preprocessor::token`]
//! when no listener is installed, and the failure mode of the include-resolver's
//! filesystem calls regardless of listener presence.

use std::path::PathBuf;

use thiserror::Error;

/// Errors the preprocessor can report or fail with.
#[derive(Debug, Error)]
pub enum Error {
    /// A lexical error: unterminated literal, illegal escape, stray invalid
    /// character under `CSYNTAX`, or a malformed numeric literal.
    #[error("{file}:{line}:{col}: lex error: {message}")]
    Lex {
        file: String,
        line: u32,
        col: u32,
        message: String,
    },

    /// A directive-level error: unknown directive, malformed parameter list,
    /// arity mismatch, `#elif`/`#else` after `#else`, stray `#endif`, or a
    /// malformed constant expression.
    #[error("{file}:{line}:{col}: directive error: {message}")]
    Directive {
        file: String,
        line: u32,
        col: u32,
        message: String,
    },

    /// A header could not be resolved against any search path.
    #[error("file not found: {name} (searched: {searched:?})")]
    Include { name: String, searched: Vec<PathBuf> },

    /// Constant-expression evaluation failed for a reason other than
    /// division/modulus by zero (which yields 0 and a diagnostic instead).
    #[error("{file}:{line}:{col}: expression error: {message}")]
    Eval {
        file: String,
        line: u32,
        col: u32,
        message: String,
    },

    /// A `#error` directive was reached while its branch was active.
    #[error("#error: {0}")]
    UserError(String),

    /// Propagated failure from the [`crate::include::VirtualFileSystem`] seam.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
