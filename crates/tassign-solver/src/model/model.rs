use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::assignment::{Assignment, BestSnapshot};
use super::entities::{
    Attribute, AttributeType, AttributeTypeIdx, Course, CourseIdx, Instructor, InstructorIdx,
    RequestIdx, TeachingAssignment, TeachingRequest, Variable, VariableIdx,
};
use super::preference::{PreferenceCombination, NEUTRAL, PROHIBITED};
use crate::config::Properties;

const LOAD_EPSILON: f32 = 1e-4;

/// Soft criteria contributing to the solution value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Criterion {
    TeachingPreferences,
    CoursePreferences,
    InstructorPreferences,
    AttributePreferences,
    TimePreferences,
}

impl Criterion {
    pub fn all() -> &'static [Criterion] {
        &[
            Criterion::TeachingPreferences,
            Criterion::CoursePreferences,
            Criterion::InstructorPreferences,
            Criterion::AttributePreferences,
            Criterion::TimePreferences,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Criterion::TeachingPreferences => "Teaching Preferences",
            Criterion::CoursePreferences => "Course Preferences",
            Criterion::InstructorPreferences => "Instructor Preferences",
            Criterion::AttributePreferences => "Attribute Preferences",
            Criterion::TimePreferences => "Time Preferences",
        }
    }

    /// Property key holding the weight, e.g. `Weight.CoursePreferences`.
    pub fn weight_key(&self) -> String {
        format!("Weight.{:?}", self)
    }
}

/// Mutual-exclusion constraint over the variables of one multi-instructor
/// request: no two of them may hold the same instructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Constraint {
    pub id: i64,
    pub name: String,
    pub variables: Vec<VariableIdx>,
}

/// Identifies the constraint a conflict was reported for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintRef {
    /// Index into [`Model::constraints`].
    DifferentInstructor(usize),
    /// Overlapping requests of one instructor.
    TimeConflict(InstructorIdx),
    /// Maximal teaching load of one instructor.
    MaxLoad(InstructorIdx),
}

/// Conflicting values per violated constraint.
pub type ConflictMap = IndexMap<ConstraintRef, Vec<TeachingAssignment>>;

/// The constraint graph of one instructor scheduling problem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Model {
    #[serde(default)]
    pub attribute_types: Vec<AttributeType>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub instructors: Vec<Instructor>,
    #[serde(default)]
    pub requests: Vec<TeachingRequest>,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub weights: IndexMap<Criterion, f64>,
    #[serde(default = "default_unassigned_weight")]
    pub unassigned_weight: f64,
    #[serde(skip)]
    variable_constraints: Vec<Vec<usize>>,
}

fn default_unassigned_weight() -> f64 {
    100.0
}

impl Model {
    /// Creates an empty model with criterion weights read from the properties.
    pub fn new(properties: &Properties) -> Self {
        let weights = Criterion::all()
            .iter()
            .map(|c| (*c, properties.get_f64(&c.weight_key(), 1.0)))
            .collect();
        Self {
            weights,
            unassigned_weight: properties.get_f64("Weight.Unassigned", default_unassigned_weight()),
            ..Default::default()
        }
    }

    pub fn add_attribute_type(&mut self, attribute_type: AttributeType) -> AttributeTypeIdx {
        self.attribute_types.push(attribute_type);
        self.attribute_types.len() - 1
    }

    pub fn add_attribute(&mut self, attribute: Attribute) -> usize {
        self.attributes.push(attribute);
        self.attributes.len() - 1
    }

    pub fn add_course(&mut self, course: Course) -> CourseIdx {
        self.courses.push(course);
        self.courses.len() - 1
    }

    pub fn add_instructor(&mut self, instructor: Instructor) -> InstructorIdx {
        self.instructors.push(instructor);
        self.instructors.len() - 1
    }

    /// Adds a request and creates one variable per needed instructor.
    pub fn add_request(&mut self, mut request: TeachingRequest) -> RequestIdx {
        let idx = self.requests.len();
        request.variables.clear();
        for index in 0..request.nr_instructors {
            self.variables.push(Variable {
                request: idx,
                index,
                initial: None,
            });
            request.variables.push(self.variables.len() - 1);
        }
        self.requests.push(request);
        idx
    }

    pub fn add_constraint(&mut self, constraint: Constraint) -> usize {
        self.constraints.push(constraint);
        self.rebuild_indexes();
        self.constraints.len() - 1
    }

    /// Rebuilds lookup tables that are not persisted.
    pub fn rebuild_indexes(&mut self) {
        let mut index = vec![Vec::new(); self.variables.len()];
        for (c, constraint) in self.constraints.iter().enumerate() {
            for &variable in &constraint.variables {
                if let Some(list) = index.get_mut(variable) {
                    list.push(c);
                }
            }
        }
        self.variable_constraints = index;
    }

    pub fn request_of(&self, variable: VariableIdx) -> &TeachingRequest {
        &self.requests[self.variables[variable].request]
    }

    /// Label such as `MATH 101 [Lec 1, Rec 2]`, with `[i]` for multi-instructor requests.
    pub fn variable_label(&self, variable: VariableIdx) -> String {
        let var = &self.variables[variable];
        let request = &self.requests[var.request];
        let course = &self.courses[request.course].name;
        if request.nr_instructors != 1 {
            format!("{}[{}] {}", course, var.index, section_list(request))
        } else {
            format!("{} {}", course, section_list(request))
        }
    }

    pub fn constraint_label(&self, constraint: ConstraintRef) -> String {
        match constraint {
            ConstraintRef::DifferentInstructor(c) => format!("Different instructors {}", self.constraints[c].name),
            ConstraintRef::TimeConflict(i) => format!("Time conflict of {}", self.instructors[i].name),
            ConstraintRef::MaxLoad(i) => format!("Maximal load of {}", self.instructors[i].name),
        }
    }

    /// Combined preference of one attribute type for the instructor.
    pub fn attribute_type_preference(
        &self,
        request: &TeachingRequest,
        instructor: &Instructor,
        attribute_type: AttributeTypeIdx,
    ) -> i32 {
        let ty = &self.attribute_types[attribute_type];
        let mut comb = PreferenceCombination::new();
        let mut has_prefs = false;
        let mut has_required = false;
        let mut matched_required = false;
        let mut matched_any = false;
        for pref in request
            .attribute_preferences
            .iter()
            .filter(|p| self.attributes[p.target].attribute_type == attribute_type)
        {
            has_prefs = true;
            let has = instructor.has_attribute(pref.target);
            if pref.is_prohibited() {
                if has {
                    return PROHIBITED;
                }
                continue;
            }
            if pref.is_required() {
                has_required = true;
                if has {
                    matched_required = true;
                    matched_any = true;
                } else if ty.conjunctive {
                    return PROHIBITED;
                }
                continue;
            }
            if has {
                matched_any = true;
                comb.add(pref.weight());
            }
        }
        if !has_prefs {
            return NEUTRAL;
        }
        if has_required && !matched_required {
            return PROHIBITED;
        }
        if ty.required && !matched_any {
            return PROHIBITED;
        }
        comb.weight()
    }

    /// Attribute preference combined over all attribute types.
    pub fn attribute_preference(&self, request: &TeachingRequest, instructor: &Instructor) -> PreferenceCombination {
        let mut comb = PreferenceCombination::new();
        for ty in 0..self.attribute_types.len() {
            comb.add(self.attribute_type_preference(request, instructor, ty));
        }
        comb
    }

    /// Whether the instructor may be placed into the request at all.
    pub fn can_teach(&self, request: &TeachingRequest, instructor: InstructorIdx) -> bool {
        let inst = &self.instructors[instructor];
        if inst.max_load + LOAD_EPSILON < request.load {
            return false;
        }
        if inst.teaching_preference.is_prohibited() {
            return false;
        }
        if inst.is_unavailable(request) || inst.course_preference(request.course).is_prohibited() {
            return false;
        }
        if request.instructor_preference(instructor).is_prohibited() {
            return false;
        }
        let has_required = request.instructor_preferences.iter().any(|p| p.is_required());
        if has_required && !request.instructor_preference(instructor).is_required() {
            return false;
        }
        !self.attribute_preference(request, inst).is_prohibited()
    }

    /// Candidate values of a variable.
    pub fn values(&self, variable: VariableIdx) -> Vec<TeachingAssignment> {
        let request = self.request_of(variable);
        (0..self.instructors.len())
            .filter(|&i| self.can_teach(request, i))
            .map(|i| TeachingAssignment::new(variable, i))
            .collect()
    }

    /// Constraints that committing `value` would violate, with the values
    /// currently assigned that cause the violation.
    pub fn conflict_constraints(&self, assignment: &Assignment, value: &TeachingAssignment) -> ConflictMap {
        let mut conflicts = ConflictMap::new();
        let request = self.request_of(value.variable);

        if let Some(constraints) = self.variable_constraints.get(value.variable) {
            for &c in constraints {
                let clashing: Vec<TeachingAssignment> = self.constraints[c]
                    .variables
                    .iter()
                    .filter(|&&v| v != value.variable)
                    .filter_map(|&v| assignment.value(v))
                    .filter(|other| other.instructor == value.instructor)
                    .collect();
                if !clashing.is_empty() {
                    conflicts.insert(ConstraintRef::DifferentInstructor(c), clashing);
                }
            }
        }

        let others: Vec<TeachingAssignment> = assignment
            .assigned_to(value.instructor)
            .filter(|other| other.variable != value.variable)
            .collect();

        let overlapping: Vec<TeachingAssignment> = others
            .iter()
            .filter(|other| {
                let other_request = self.request_of(other.variable);
                self.variables[other.variable].request != self.variables[value.variable].request
                    && request.overlaps(other_request)
            })
            .copied()
            .collect();
        if !overlapping.is_empty() {
            conflicts.insert(ConstraintRef::TimeConflict(value.instructor), overlapping);
        }

        let max_load = self.instructors[value.instructor].max_load;
        let mut load: f32 = others.iter().map(|o| self.request_of(o.variable).load).sum::<f32>() + request.load;
        if load > max_load + LOAD_EPSILON {
            let mut by_load = others.clone();
            by_load.sort_by(|a, b| {
                self.request_of(b.variable)
                    .load
                    .total_cmp(&self.request_of(a.variable).load)
                    .then(a.variable.cmp(&b.variable))
            });
            let mut over = Vec::new();
            for other in by_load {
                if load <= max_load + LOAD_EPSILON {
                    break;
                }
                load -= self.request_of(other.variable).load;
                over.push(other);
            }
            conflicts.insert(ConstraintRef::MaxLoad(value.instructor), over);
        }

        conflicts
    }

    /// Unweighted value of one criterion for a placed value.
    pub fn criterion_value(&self, criterion: Criterion, value: &TeachingAssignment) -> f64 {
        let request = self.request_of(value.variable);
        let instructor = &self.instructors[value.instructor];
        let weight = match criterion {
            Criterion::TeachingPreferences => instructor.teaching_preference.weight(),
            Criterion::CoursePreferences => soft(instructor.course_preference(request.course).weight()),
            Criterion::InstructorPreferences => soft(request.instructor_preference(value.instructor).weight()),
            Criterion::AttributePreferences => soft(self.attribute_preference(request, instructor).weight()),
            Criterion::TimePreferences => soft(instructor.time_preference(request).weight()),
        };
        weight as f64
    }

    /// Weighted cost of a placed value, lower is better.
    pub fn value_cost(&self, value: &TeachingAssignment) -> f64 {
        Criterion::all()
            .iter()
            .map(|c| self.weight(*c) * self.criterion_value(*c, value))
            .sum()
    }

    pub fn weight(&self, criterion: Criterion) -> f64 {
        self.weights.get(&criterion).copied().unwrap_or(1.0)
    }

    /// Total weighted value of an assignment, including the unassigned penalty.
    pub fn total_value(&self, assignment: &Assignment) -> f64 {
        let assigned: f64 = assignment.assigned().map(|v| self.value_cost(&v)).sum();
        assigned + self.unassigned_weight * assignment.nr_unassigned() as f64
    }

    /// Teaching load currently given to an instructor.
    pub fn instructor_load(&self, assignment: &Assignment, instructor: InstructorIdx) -> f32 {
        assignment
            .assigned_to(instructor)
            .map(|v| self.request_of(v.variable).load)
            .sum()
    }

    /// Solution summary shown to users.
    pub fn info(&self, assignment: &Assignment) -> IndexMap<String, String> {
        let mut info = IndexMap::new();
        let total = self.variables.len();
        let assigned = assignment.nr_assigned();
        let percent = if total == 0 { 0.0 } else { 100.0 * assigned as f64 / total as f64 };
        info.insert(
            "Assigned variables".to_string(),
            format!("{:.2}% ({}/{})", percent, assigned, total),
        );
        info.insert(
            "Overall solution value".to_string(),
            format!("{:.2}", self.total_value(assignment)),
        );
        for criterion in Criterion::all() {
            let value: f64 = assignment.assigned().map(|v| self.criterion_value(*criterion, &v)).sum();
            info.insert(criterion.name().to_string(), format!("{:.2}", value));
        }
        let load: f32 = assignment.assigned().map(|v| self.request_of(v.variable).load).sum();
        info.insert("Assigned load".to_string(), format!("{:.1}", load));
        info
    }

    /// Captures the current assignment as the best snapshot.
    pub fn best_snapshot(&self, assignment: &Assignment) -> BestSnapshot {
        BestSnapshot {
            values: assignment.values().to_vec(),
            info: self.info(assignment),
            unassigned: assignment.nr_unassigned(),
            value: self.total_value(assignment),
            iteration: assignment.iteration(),
        }
    }

    /// Whether the current assignment beats the recorded best: fewer
    /// unassigned variables first, then a lower total value.
    pub fn is_better_than_best(&self, assignment: &Assignment) -> bool {
        let Some(best) = assignment.best() else {
            return true;
        };
        let unassigned = assignment.nr_unassigned();
        if unassigned != best.unassigned {
            return unassigned < best.unassigned;
        }
        self.total_value(assignment) < best.value - 1e-9
    }
}

/// Required and prohibited levels are hard constraints, not costs.
fn soft(weight: i32) -> i32 {
    if weight >= PROHIBITED || weight <= -PROHIBITED {
        0
    } else {
        weight
    }
}

fn section_list(request: &TeachingRequest) -> String {
    let names: Vec<&str> = request.sections.iter().map(|s| s.name.as_str()).collect();
    format!("[{}]", names.join(", "))
}

impl fmt::Display for ConstraintRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintRef::DifferentInstructor(c) => write!(f, "different-instructor#{}", c),
            ConstraintRef::TimeConflict(i) => write!(f, "time-conflict#{}", i),
            ConstraintRef::MaxLoad(i) => write!(f, "max-load#{}", i),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PreferenceLevel, Section, TimeLocation};

    fn section(id: i64, time: Option<TimeLocation>) -> Section {
        Section {
            id,
            external_id: None,
            section_type: "Lec".to_string(),
            name: format!("Lec {}", id),
            time,
            room: None,
            allow_overlap: false,
            common: false,
        }
    }

    fn model() -> Model {
        let mut model = Model::new(&Properties::new());
        let course = model.add_course(Course {
            id: 1,
            name: "MATH 101".to_string(),
            subject_area_id: None,
        });
        model.add_instructor(Instructor::new(10, "Ada", PreferenceLevel::Neutral, 10.0));
        model.add_instructor(Instructor::new(11, "Bob", PreferenceLevel::Preferred, 4.0));
        let monday = TimeLocation::new(64, 100, 12);
        model.add_request(TeachingRequest::new(100, course, 3.0, 2, vec![section(1, Some(monday.clone()))]));
        model.add_request(TeachingRequest::new(101, course, 3.0, 1, vec![section(2, Some(monday))]));
        model.add_constraint(Constraint {
            id: 100,
            name: "MATH 101 Lec 1".to_string(),
            variables: vec![0, 1],
        });
        model
    }

    #[test]
    fn test_add_request_creates_variables() {
        let model = model();
        assert_eq!(model.variables.len(), 3);
        assert_eq!(model.requests[0].variables, vec![0, 1]);
        assert_eq!(model.variables[1].index, 1);
        assert_eq!(model.variable_label(1), "MATH 101[1] [Lec 1]");
        assert_eq!(model.variable_label(2), "MATH 101 [Lec 2]");
    }

    #[test]
    fn test_conflicts_different_instructor_and_time() {
        let model = model();
        let mut assignment = Assignment::new(model.variables.len());
        assignment.assign(TeachingAssignment::new(0, 0));

        let same = model.conflict_constraints(&assignment, &TeachingAssignment::new(1, 0));
        assert_eq!(
            same.get(&ConstraintRef::DifferentInstructor(0)),
            Some(&vec![TeachingAssignment::new(0, 0)])
        );

        let overlap = model.conflict_constraints(&assignment, &TeachingAssignment::new(2, 0));
        assert!(overlap.contains_key(&ConstraintRef::TimeConflict(0)));

        let free = model.conflict_constraints(&assignment, &TeachingAssignment::new(1, 1));
        assert!(free.is_empty());
    }

    #[test]
    fn test_max_load_conflict() {
        let mut model = model();
        model.requests[1].sections[0].time = None;
        let mut assignment = Assignment::new(model.variables.len());
        assignment.assign(TeachingAssignment::new(0, 1));
        let conflicts = model.conflict_constraints(&assignment, &TeachingAssignment::new(2, 1));
        assert_eq!(
            conflicts.get(&ConstraintRef::MaxLoad(1)),
            Some(&vec![TeachingAssignment::new(0, 1)])
        );
    }

    #[test]
    fn test_info_and_best_comparison() {
        let model = model();
        let mut assignment = Assignment::new(model.variables.len());
        assert!(model.is_better_than_best(&assignment));
        assignment.set_best(model.best_snapshot(&assignment));
        assert!(!model.is_better_than_best(&assignment));
        assignment.assign(TeachingAssignment::new(0, 1));
        assert!(model.is_better_than_best(&assignment));
        let info = model.info(&assignment);
        assert_eq!(info.get("Assigned variables").unwrap(), "33.33% (1/3)");
        assert_eq!(info.get("Teaching Preferences").unwrap(), "-1.00");
    }

    #[test]
    fn test_can_teach_respects_load_and_required_instructor() {
        let mut model = model();
        assert!(model.can_teach(&model.requests[0], 0));
        model.requests[0].load = 5.0;
        assert!(!model.can_teach(&model.requests[0], 1));
        model.requests[1]
            .instructor_preferences
            .push(crate::model::Preference::new(1, PreferenceLevel::Required));
        assert!(!model.can_teach(&model.requests[1], 0));
        assert!(model.can_teach(&model.requests[1], 1));
    }
}
