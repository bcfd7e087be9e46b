use std::time::{Duration, Instant};

use super::{SearchContext, SolverEngine};
use crate::error::Result;
use crate::model::{Solution, TeachingAssignment, VariableIdx};

/// Construction followed by first-improvement passes.
///
/// Each step holds the write lock for a single variable, so readers only
/// ever wait for one step.
#[derive(Debug, Clone, Default)]
pub struct GreedyEngine;

impl GreedyEngine {
    pub fn new() -> Self {
        Self
    }

    fn conflict_free(&self, solution: &Solution, value: &TeachingAssignment) -> bool {
        self.weaken(&solution.model, &solution.assignment, value);
        self.conflict_constraints(&solution.model, &solution.assignment, value)
            .is_empty()
    }

    /// Cheapest conflict-free value for an unassigned variable.
    fn construct(&self, solution: &mut Solution, variable: VariableIdx) -> bool {
        if solution.assignment.value(variable).is_some() {
            return false;
        }
        let best = solution
            .model
            .values(variable)
            .into_iter()
            .filter(|v| self.conflict_free(solution, v))
            .map(|v| (solution.model.value_cost(&v), v))
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        match best {
            Some((_, value)) => {
                solution.assignment.assign(value);
                true
            }
            None => false,
        }
    }

    /// Moves an assigned variable to a cheaper conflict-free value.
    fn improve(&self, solution: &mut Solution, variable: VariableIdx) -> bool {
        let Some(current) = solution.assignment.value(variable) else {
            return false;
        };
        let current_cost = solution.model.value_cost(&current);
        let better = solution
            .model
            .values(variable)
            .into_iter()
            .filter(|v| v.instructor != current.instructor)
            .filter(|v| solution.model.value_cost(v) < current_cost - 1e-9)
            .find(|v| self.conflict_free(solution, v));
        match better {
            Some(value) => {
                solution.assignment.assign(value);
                true
            }
            None => false,
        }
    }
}

impl SolverEngine for GreedyEngine {
    fn search(&self, context: &SearchContext<'_>) -> Result<()> {
        let max_iters = context.properties.get_i64("Termination.MaxIters").unwrap_or(10_000).max(0) as u64;
        let timeout = Duration::from_secs_f64(context.properties.get_f64("Termination.TimeOut", 60.0).max(0.0));
        let started = Instant::now();
        let mut iterations = 0u64;

        let nr_variables = context.step(|s| s.model.variables.len())?;
        context.with_progress(|p| p.set_phase("Searching for initial solution ...", nr_variables as u64));

        let within_limits = |iterations: u64| iterations < max_iters && started.elapsed() < timeout;

        for variable in 0..nr_variables {
            if context.stop.is_set() || !within_limits(iterations) {
                break;
            }
            context.step(|s| {
                if self.construct(s, variable) {
                    s.save_best_if_improved();
                }
            })?;
            iterations += 1;
            context.with_progress(|p| p.inc_progress());
        }

        loop {
            if context.stop.is_set() || !within_limits(iterations) {
                break;
            }
            context.with_progress(|p| p.set_phase("Improving found solution ...", nr_variables as u64));
            let mut improved = false;
            for variable in 0..nr_variables {
                if context.stop.is_set() || !within_limits(iterations) {
                    break;
                }
                let changed = context.step(|s| {
                    let changed = self.improve(s, variable) || self.construct(s, variable);
                    if changed {
                        s.save_best_if_improved();
                    }
                    changed
                })?;
                improved |= changed;
                iterations += 1;
                context.with_progress(|p| p.inc_progress());
            }
            if !improved {
                break;
            }
        }

        log::debug!(
            "Search finished after {} iterations in {:.2}s",
            iterations,
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, RwLock};

    use super::*;
    use crate::config::Properties;
    use crate::engine::{SolutionAccess, StopToken};
    use crate::error::SolverError;
    use crate::model::{Constraint, Course, Instructor, Model, PreferenceLevel, TeachingRequest};
    use crate::progress::Progress;

    struct Cell(RwLock<Solution>);

    impl SolutionAccess for Cell {
        fn with_solution_mut(&self, f: &mut dyn FnMut(&mut Solution)) -> std::result::Result<(), SolverError> {
            let mut guard = self.0.write().unwrap();
            f(&mut guard);
            Ok(())
        }
    }

    fn problem() -> Solution {
        let mut model = Model::new(&Properties::new());
        let course = model.add_course(Course {
            id: 1,
            name: "PHYS 172".to_string(),
            subject_area_id: None,
        });
        model.add_instructor(Instructor::new(1, "Ada", PreferenceLevel::Discouraged, 6.0));
        model.add_instructor(Instructor::new(2, "Bob", PreferenceLevel::Preferred, 6.0));
        let request = model.add_request(TeachingRequest::new(1, course, 3.0, 2, Vec::new()));
        let variables = model.requests[request].variables.clone();
        model.add_constraint(Constraint {
            id: 1,
            name: "PHYS 172 Lec 1".to_string(),
            variables,
        });
        Solution::new(model)
    }

    #[test]
    fn test_search_assigns_distinct_instructors() {
        let cell = Cell(RwLock::new(problem()));
        let props = Properties::new();
        let stop = StopToken::new();
        let progress = Mutex::new(Progress::new());
        let context = SearchContext::new(&props, &stop, &progress, &cell);
        GreedyEngine::new().search(&context).unwrap();

        let solution = cell.0.read().unwrap();
        assert_eq!(solution.assignment.nr_assigned(), 2);
        let a = solution.assignment.value(0).unwrap().instructor;
        let b = solution.assignment.value(1).unwrap().instructor;
        assert_ne!(a, b);
        assert_eq!(a, 1);
        assert!(solution.best_info().is_some());
    }

    #[test]
    fn test_search_honors_stop() {
        let cell = Cell(RwLock::new(problem()));
        let props = Properties::new();
        let stop = StopToken::new();
        stop.request_stop();
        let progress = Mutex::new(Progress::new());
        let context = SearchContext::new(&props, &stop, &progress, &cell);
        GreedyEngine::new().search(&context).unwrap();
        assert_eq!(cell.0.read().unwrap().assignment.nr_assigned(), 0);
    }
}
