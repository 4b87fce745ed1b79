//! Closed feature/warning sets (§6).

use std::collections::HashSet;

/// Optional behaviors the driver consults at specific decision points. This
/// is a closed set — there is no escape hatch for arbitrary string flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Emit `# line N "file" F` tokens at source transitions.
    LineMarkers,
    /// Honor `#pragma once`.
    PragmaOnce,
    /// Honor `#include_next`.
    IncludeNext,
    /// Treat invalid tokens as errors rather than silently passing them
    /// through as `Invalid`.
    CSyntax,
    /// Preserve `/* */` comments that survive into active regions as
    /// distinct tokens instead of collapsing them to whitespace.
    KeepComments,
    /// As `KeepComments`, but also for `//` comments.
    KeepAllComments,
    /// Emit extra `tracing` diagnostics at `trace` level.
    Debug,
}

/// Warnings the driver may raise; membership controls whether they are
/// raised at all, and `Warning::Error` escalates every other warning that
/// does fire into an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Warning {
    /// Escalate every warning to an error.
    Error,
    /// An identifier that reached the expression evaluator was not a macro.
    Undef,
    /// `#else`/`#endif` without a trailing comment naming the originating
    /// `#if`.
    EndifLabels,
}

/// A simple closed-set membership container, grounded on the
/// enable/disable-by-value style the pack's config surfaces use rather than
/// a bitflags crate (there is no dependency on one in the teacher lineage).
#[derive(Clone, Debug, Default)]
pub struct FeatureSet(HashSet<Feature>);

impl FeatureSet {
    pub fn new() -> Self {
        FeatureSet(HashSet::new())
    }

    pub fn enable(&mut self, f: Feature) -> &mut Self {
        self.0.insert(f);
        self
    }

    pub fn disable(&mut self, f: Feature) -> &mut Self {
        self.0.remove(&f);
        self
    }

    pub fn is_enabled(&self, f: Feature) -> bool {
        self.0.contains(&f)
    }
}

#[derive(Clone, Debug, Default)]
pub struct WarningSet(HashSet<Warning>);

impl WarningSet {
    pub fn new() -> Self {
        WarningSet(HashSet::new())
    }

    pub fn enable(&mut self, w: Warning) -> &mut Self {
        self.0.insert(w);
        self
    }

    pub fn disable(&mut self, w: Warning) -> &mut Self {
        self.0.remove(&w);
        self
    }

    pub fn is_enabled(&self, w: Warning) -> bool {
        self.0.contains(&w)
    }

    pub fn escalates_to_error(&self) -> bool {
        self.0.contains(&Warning::Error)
    }
}
