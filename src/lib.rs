//! A C/C++/Objective-C preprocessor engine with a partial-preprocessing
//! control plane.
//!
//! The entry point is [`PreprocessorBuilder`], which configures a
//! [`Preprocessor`] over either an in-memory string or a [`VirtualFile`] and
//! hands back a token-at-a-time stream via [`Preprocessor::next_token`].
//! Callers who only want full expansion can call
//! [`Preprocessor::run_to_string`] directly.
//!
//! Two capability-object seams let embedders observe or steer preprocessing
//! without subclassing: [`DiagnosticListener`] for errors, warnings, source
//! transitions, and macro/include activity; [`ControlListener`] for deciding,
//! directive by directive, whether a `#define`/`#include`/`#if`/macro
//! expansion actually happens or is instead replayed verbatim into the output
//! (partial preprocessing).

#![allow(dead_code)]

mod cond;
mod control;
mod cursor;
mod diagnostics;
mod driver;
mod error;
mod eval;
mod expand;
mod features;
mod include;
mod lexer;
mod macros;
mod source;
mod token;

pub use control::{AlwaysProcess, ConditionalKind, ControlListener, PreserveConditionals};
pub use diagnostics::{DiagnosticListener, RecordingDiagnosticListener, SourceChangeKind};
pub use driver::{Preprocessor, PreprocessorBuilder};
pub use error::{Error, Result};
pub use features::{Feature, FeatureSet, Warning, WarningSet};
pub use include::{IncludeResolver, VirtualFile, VirtualFileSystem};
pub use lexer::Lexer;
pub use macros::{Macro, MacroTable, PredefinedKind};
pub use token::{NumericValue, Punctuator, Token, TokenKind, TokenValue};
