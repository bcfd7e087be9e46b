use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::entities::{InstructorIdx, TeachingAssignment, VariableIdx};

/// Snapshot of the best assignment found so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BestSnapshot {
    pub values: Vec<Option<InstructorIdx>>,
    pub info: IndexMap<String, String>,
    pub unassigned: usize,
    pub value: f64,
    pub iteration: u64,
}

/// Current values of all variables, plus the recorded best snapshot.
///
/// A variable holds at most one value. Mutation happens only through
/// [`Assignment::assign`], [`Assignment::unassign`] and the best-snapshot
/// operations, all of which the session performs under its write lock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    values: Vec<Option<InstructorIdx>>,
    iteration: u64,
    best: Option<BestSnapshot>,
}

impl Assignment {
    pub fn new(nr_variables: usize) -> Self {
        Self {
            values: vec![None; nr_variables],
            iteration: 0,
            best: None,
        }
    }

    /// Rebuilds an assignment from stored values and an optional best snapshot.
    pub fn from_parts(values: Vec<Option<InstructorIdx>>, best: Option<BestSnapshot>) -> Self {
        Self {
            values,
            iteration: 0,
            best,
        }
    }

    pub fn nr_variables(&self) -> usize {
        self.values.len()
    }

    /// Grows the assignment when variables are added to the model.
    pub fn ensure_variables(&mut self, nr_variables: usize) {
        if self.values.len() < nr_variables {
            self.values.resize(nr_variables, None);
        }
    }

    pub fn value(&self, variable: VariableIdx) -> Option<TeachingAssignment> {
        self.values
            .get(variable)
            .copied()
            .flatten()
            .map(|instructor| TeachingAssignment::new(variable, instructor))
    }

    /// Assigns the value, returning the value it replaced.
    pub fn assign(&mut self, value: TeachingAssignment) -> Option<TeachingAssignment> {
        self.ensure_variables(value.variable + 1);
        self.iteration += 1;
        let previous = self.values[value.variable].replace(value.instructor);
        previous.map(|instructor| TeachingAssignment::new(value.variable, instructor))
    }

    pub fn unassign(&mut self, variable: VariableIdx) -> Option<TeachingAssignment> {
        let previous = self.values.get_mut(variable)?.take();
        if previous.is_some() {
            self.iteration += 1;
        }
        previous.map(|instructor| TeachingAssignment::new(variable, instructor))
    }

    /// All assigned values in variable order.
    pub fn assigned(&self) -> impl Iterator<Item = TeachingAssignment> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(variable, v)| v.map(|instructor| TeachingAssignment::new(variable, instructor)))
    }

    /// Values currently given to one instructor.
    pub fn assigned_to(&self, instructor: InstructorIdx) -> impl Iterator<Item = TeachingAssignment> + '_ {
        self.assigned().filter(move |v| v.instructor == instructor)
    }

    pub fn nr_assigned(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    pub fn nr_unassigned(&self) -> usize {
        self.values.len() - self.nr_assigned()
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn values(&self) -> &[Option<InstructorIdx>] {
        &self.values
    }

    pub fn best(&self) -> Option<&BestSnapshot> {
        self.best.as_ref()
    }

    pub fn best_info(&self) -> Option<&IndexMap<String, String>> {
        self.best.as_ref().map(|b| &b.info)
    }

    pub fn set_best(&mut self, best: BestSnapshot) {
        self.best = Some(best);
    }

    pub fn clear_best(&mut self) {
        self.best = None;
    }

    /// Makes the recorded best values current again. Returns false when no
    /// best snapshot exists.
    pub fn restore_best(&mut self) -> bool {
        let Some(best) = &self.best else {
            return false;
        };
        let mut values = best.values.clone();
        values.resize(self.values.len(), None);
        self.values = values;
        self.iteration += 1;
        true
    }

    pub fn unassign_all(&mut self) {
        for value in self.values.iter_mut() {
            *value = None;
        }
        self.iteration += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_replaces_and_unassign() {
        let mut assignment = Assignment::new(3);
        assert!(assignment.assign(TeachingAssignment::new(1, 4)).is_none());
        let previous = assignment.assign(TeachingAssignment::new(1, 5));
        assert_eq!(previous, Some(TeachingAssignment::new(1, 4)));
        assert_eq!(assignment.nr_assigned(), 1);
        assert_eq!(assignment.value(1), Some(TeachingAssignment::new(1, 5)));
        assert_eq!(assignment.unassign(1), Some(TeachingAssignment::new(1, 5)));
        assert_eq!(assignment.nr_unassigned(), 3);
        assert!(assignment.unassign(7).is_none());
    }

    #[test]
    fn test_restore_best() {
        let mut assignment = Assignment::new(2);
        assert!(!assignment.restore_best());
        assignment.assign(TeachingAssignment::new(0, 1));
        assignment.set_best(BestSnapshot {
            values: assignment.values().to_vec(),
            info: IndexMap::new(),
            unassigned: 1,
            value: 0.0,
            iteration: assignment.iteration(),
        });
        assignment.unassign_all();
        assignment.assign(TeachingAssignment::new(1, 2));
        assert!(assignment.restore_best());
        assert_eq!(assignment.values(), &[Some(1), None]);
        assert_eq!(assignment.assigned_to(1).count(), 1);
    }
}
