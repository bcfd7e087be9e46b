//! Solver engine seam: conflict checks and the improvement search.

mod greedy;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub use greedy::GreedyEngine;

use crate::config::Properties;
use crate::error::{Result, SolverError};
use crate::model::{Assignment, ConflictMap, Model, Solution, TeachingAssignment};
use crate::progress::Progress;

/// Cooperative cancellation flag shared between a session and its worker.
#[derive(Clone, Default, Debug)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Release)
    }

    /// Returns `Interrupted` once a stop was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_set() {
            Err(SolverError::Interrupted)
        } else {
            Ok(())
        }
    }
}

impl PartialEq for StopToken {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for StopToken {}

impl fmt::Display for StopToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StopToken(set: {})", self.is_set())
    }
}

/// Write access to the solution a search works on.
pub trait SolutionAccess: Send + Sync {
    /// Runs `f` on the live solution under the write lock.
    fn with_solution_mut(&self, f: &mut dyn FnMut(&mut Solution)) -> Result<()>;
}

/// What a running search sees of its session.
pub struct SearchContext<'a> {
    pub properties: &'a Properties,
    pub stop: &'a StopToken,
    pub progress: &'a Mutex<Progress>,
    access: &'a dyn SolutionAccess,
}

impl<'a> SearchContext<'a> {
    pub fn new(
        properties: &'a Properties,
        stop: &'a StopToken,
        progress: &'a Mutex<Progress>,
        access: &'a dyn SolutionAccess,
    ) -> Self {
        Self {
            properties,
            stop,
            progress,
            access,
        }
    }

    /// Runs one search step under the write lock.
    pub fn step<R>(&self, f: impl FnOnce(&mut Solution) -> R) -> Result<R> {
        let mut f = Some(f);
        let mut out = None;
        self.access.with_solution_mut(&mut |solution| {
            if let Some(f) = f.take() {
                out = Some(f(solution));
            }
        })?;
        out.ok_or(SolverError::Disposed)
    }

    pub fn with_progress(&self, f: impl FnOnce(&mut Progress)) {
        let mut progress = self.progress.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut progress);
    }
}

/// The constraint engine a session delegates search to.
pub trait SolverEngine: Send + Sync {
    /// Relaxes internal state before `value` is checked; no-op by default.
    fn weaken(&self, _model: &Model, _assignment: &Assignment, _value: &TeachingAssignment) {}

    /// Constraints violated by committing `value`, with offending values.
    fn conflict_constraints(&self, model: &Model, assignment: &Assignment, value: &TeachingAssignment) -> ConflictMap {
        model.conflict_constraints(assignment, value)
    }

    /// Improves the solution until done or stopped. Returns normally when
    /// the stop token is set.
    fn search(&self, context: &SearchContext<'_>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_token_shared() {
        let token = StopToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.request_stop();
        assert!(token.is_set());
        assert!(matches!(token.check(), Err(SolverError::Interrupted)));
        assert_eq!(token, clone);
        assert_ne!(token, StopToken::new());
        assert_eq!(token.to_string(), "StopToken(set: true)");
    }
}
