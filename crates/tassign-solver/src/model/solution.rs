use indexmap::IndexMap;

use super::assignment::Assignment;
use super::model::Model;

/// A model paired with its assignment. This is what a session holds while live.
#[derive(Debug, Clone, Default)]
pub struct Solution {
    pub model: Model,
    pub assignment: Assignment,
}

impl Solution {
    pub fn new(model: Model) -> Self {
        let assignment = Assignment::new(model.variables.len());
        Self { model, assignment }
    }

    pub fn with_assignment(model: Model, mut assignment: Assignment) -> Self {
        assignment.ensure_variables(model.variables.len());
        Self { model, assignment }
    }

    pub fn current_info(&self) -> IndexMap<String, String> {
        self.model.info(&self.assignment)
    }

    pub fn best_info(&self) -> Option<IndexMap<String, String>> {
        self.assignment.best_info().cloned()
    }

    /// Records the current assignment as the best one.
    pub fn save_best(&mut self) {
        let best = self.model.best_snapshot(&self.assignment);
        self.assignment.set_best(best);
    }

    /// Saves the current assignment as best when it improves on it.
    pub fn save_best_if_improved(&mut self) -> bool {
        if self.model.is_better_than_best(&self.assignment) {
            self.save_best();
            true
        } else {
            false
        }
    }

    pub fn restore_best(&mut self) -> bool {
        self.assignment.restore_best()
    }

    /// Best info, or the current info when the current assignment beats the
    /// recorded best (or no best exists).
    pub fn status_info(&self) -> IndexMap<String, String> {
        match self.assignment.best_info() {
            Some(best) if !self.model.is_better_than_best(&self.assignment) => best.clone(),
            _ => self.current_info(),
        }
    }
}
