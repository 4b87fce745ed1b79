//! The conditional-inclusion state machine (§4.F).
//!
//! One [`ConditionalFrame`] is pushed per `#if`/`#ifdef`/`#ifndef` and popped
//! by the matching `#endif`. `active` gates whether the driver currently
//! emits tokens; `processed` records whether the control listener allowed
//! this level's branch selection to actually run, or asked for the whole
//! construct to be preserved verbatim (§6 "Control plane", §8 scenario 5).

/// One level of `#if`/`#elif`/`#else`/`#endif` nesting.
pub struct ConditionalFrame {
    /// Whether the enclosing scope was itself emitting tokens when this
    /// frame was opened — a `#if` nested inside a false branch can never
    /// become active no matter its own condition.
    pub parent_active: bool,
    /// Whether tokens at this nesting level should currently flow through.
    pub active: bool,
    /// Whether some branch at this level has already been taken, so a later
    /// `#elif`/`#else` must stay inactive even if its own condition holds.
    pub branch_taken: bool,
    pub saw_else: bool,
    /// `false` when the control listener declined `process_if` for this
    /// `#if`: branch directives at this level are recorded but never
    /// evaluated, and `active` is pinned `true` so the entire construct
    /// (directives included) replays verbatim.
    pub processed: bool,
    pub opened_at_line: u32,
}

#[derive(Default)]
pub struct ConditionalStack {
    frames: Vec<ConditionalFrame>,
}

impl ConditionalStack {
    pub fn new() -> Self {
        ConditionalStack { frames: Vec::new() }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether the driver should currently be emitting tokens (empty stack
    /// means top level, always active).
    pub fn is_active(&self) -> bool {
        self.frames.last().map(|f| f.active).unwrap_or(true)
    }

    pub fn push_if(&mut self, processed: bool, condition_true: bool, line: u32) {
        let parent_active = self.is_active();
        let active = if !processed {
            true
        } else {
            parent_active && condition_true
        };
        self.frames.push(ConditionalFrame {
            parent_active,
            active,
            branch_taken: processed && parent_active && condition_true,
            saw_else: false,
            processed,
            opened_at_line: line,
        });
    }

    pub fn elif(&mut self, condition_true: bool) -> Result<(), String> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| "#elif without a matching #if".to_string())?;
        if frame.saw_else {
            return Err("#elif after #else".to_string());
        }
        if !frame.processed {
            return Ok(());
        }
        if frame.branch_taken {
            frame.active = false;
        } else {
            frame.active = frame.parent_active && condition_true;
            if frame.active {
                frame.branch_taken = true;
            }
        }
        Ok(())
    }

    pub fn else_branch(&mut self) -> Result<(), String> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| "#else without a matching #if".to_string())?;
        if frame.saw_else {
            return Err("#else after #else".to_string());
        }
        frame.saw_else = true;
        if !frame.processed {
            return Ok(());
        }
        if frame.branch_taken {
            frame.active = false;
        } else {
            frame.active = frame.parent_active;
            if frame.active {
                frame.branch_taken = true;
            }
        }
        Ok(())
    }

    pub fn end(&mut self) -> Result<ConditionalFrame, String> {
        self.frames
            .pop()
            .ok_or_else(|| "#endif without a matching #if".to_string())
    }

    /// `processed` flag of the currently-open frame, for `#elif`/`#else` to
    /// consult before mutating it.
    pub fn top_processed(&self) -> Option<bool> {
        self.frames.last().map(|f| f.processed)
    }

    /// Whether an `#elif` condition at the current level is worth evaluating
    /// at all — `false` when no branch could still be taken here (already
    /// taken, or the enclosing scope is inactive), sparing side-effecting
    /// expressions like `__COUNTER__` a pointless evaluation.
    pub fn should_evaluate(&self) -> bool {
        self.frames
            .last()
            .is_some_and(|f| f.processed && !f.branch_taken && f.parent_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn if_true_then_else_is_inactive() {
        let mut s = ConditionalStack::new();
        s.push_if(true, true, 1);
        assert!(s.is_active());
        s.else_branch().unwrap();
        assert!(!s.is_active());
        s.end().unwrap();
        assert!(s.is_active());
    }

    #[test]
    fn if_false_then_else_is_active() {
        let mut s = ConditionalStack::new();
        s.push_if(true, false, 1);
        assert!(!s.is_active());
        s.else_branch().unwrap();
        assert!(s.is_active());
    }

    #[test]
    fn nested_if_inside_false_branch_stays_inactive_regardless_of_condition() {
        let mut s = ConditionalStack::new();
        s.push_if(true, false, 1);
        s.push_if(true, true, 2);
        assert!(!s.is_active());
        s.end().unwrap();
        assert!(!s.is_active());
    }

    #[test]
    fn elif_after_taken_branch_stays_inactive() {
        let mut s = ConditionalStack::new();
        s.push_if(true, true, 1);
        s.elif(true).unwrap();
        assert!(!s.is_active());
    }

    #[test]
    fn elif_takes_first_true_branch_only() {
        let mut s = ConditionalStack::new();
        s.push_if(true, false, 1);
        s.elif(false).unwrap();
        assert!(!s.is_active());
        s.elif(true).unwrap();
        assert!(s.is_active());
        s.elif(true).unwrap();
        assert!(!s.is_active());
    }

    #[test]
    fn stray_endif_is_an_error() {
        let mut s = ConditionalStack::new();
        assert!(s.end().is_err());
    }

    #[test]
    fn else_after_else_is_an_error() {
        let mut s = ConditionalStack::new();
        s.push_if(true, true, 1);
        s.else_branch().unwrap();
        assert!(s.else_branch().is_err());
    }

    #[test]
    fn declined_processing_forces_active_regardless_of_condition() {
        let mut s = ConditionalStack::new();
        s.push_if(false, false, 1);
        assert!(s.is_active());
        s.else_branch().unwrap();
        assert!(s.is_active());
        s.elif(false).unwrap();
        assert!(s.is_active());
    }
}
