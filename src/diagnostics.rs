//! The diagnostic listener seam (§6 "Diagnostic listener (exposed)").
//!
//! Grounded on the fluent/trait-object diagnostic style used by
//! `faxc-util::diagnostic` (`DiagnosticBuilder`/`Handler`), simplified down to
//! the six callbacks this spec names.

/// What happened to a source on the source stack (§4.C).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceChangeKind {
    Push,
    Pop,
    Suspend,
    Resume,
}

/// Capability object a caller installs to observe preprocessing. Every
/// method has a no-op default so callers only override what they need.
pub trait DiagnosticListener {
    fn handle_error(&mut self, source: &str, line: u32, col: u32, message: &str) {
        let _ = (source, line, col, message);
    }

    fn handle_warning(&mut self, source: &str, line: u32, col: u32, message: &str) {
        let _ = (source, line, col, message);
    }

    fn handle_source_change(&mut self, source: &str, kind: SourceChangeKind) {
        let _ = (source, kind);
    }

    fn handle_define(&mut self, macro_name: &str, source: &str) {
        let _ = (macro_name, source);
    }

    fn handle_undefine(&mut self, macro_name: &str, source: &str) {
        let _ = (macro_name, source);
    }

    fn handle_include(&mut self, text: &str, is_next: bool, from: &str, to: &str) {
        let _ = (text, is_next, from, to);
    }
}

/// A listener that records everything it's told, useful for tests and for
/// embedders that want to replay diagnostics rather than act on them live.
#[derive(Default)]
pub struct RecordingDiagnosticListener {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub source_changes: Vec<(String, SourceChangeKind)>,
    pub defines: Vec<String>,
    pub undefines: Vec<String>,
    pub includes: Vec<(String, bool, String, String)>,
}

impl DiagnosticListener for RecordingDiagnosticListener {
    fn handle_error(&mut self, source: &str, line: u32, col: u32, message: &str) {
        self.errors
            .push(format!("{source}:{line}:{col}: {message}"));
    }

    fn handle_warning(&mut self, source: &str, line: u32, col: u32, message: &str) {
        self.warnings
            .push(format!("{source}:{line}:{col}: {message}"));
    }

    fn handle_source_change(&mut self, source: &str, kind: SourceChangeKind) {
        self.source_changes.push((source.to_string(), kind));
    }

    fn handle_define(&mut self, macro_name: &str, source: &str) {
        self.defines.push(format!("{source}: {macro_name}"));
    }

    fn handle_undefine(&mut self, macro_name: &str, source: &str) {
        self.undefines.push(format!("{source}: {macro_name}"));
    }

    fn handle_include(&mut self, text: &str, is_next: bool, from: &str, to: &str) {
        self.includes
            .push((text.to_string(), is_next, from.to_string(), to.to_string()));
    }
}
