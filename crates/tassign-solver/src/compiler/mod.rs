//! Translation of a relational snapshot into a constraint model.
//!
//! The compiler runs in three phases: instructors (with their preference
//! grids and derived unavailability), teaching requests, and the carry-over
//! of existing instructor assignments. A partially built model is never
//! returned; any error aborts the whole compilation.

mod grid;
mod initial;
mod requests;

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub use grid::PreferenceGrid;
pub use requests::effective_preferences;

use crate::config::Properties;
use crate::engine::{SolverEngine, StopToken};
use crate::error::{Result, SolverError};
use crate::model::{
    Attribute, AttributeIdx, AttributeType, AttributeTypeIdx, Course, CourseIdx, Instructor, InstructorIdx, Model,
    Solution, TimeBlock,
};
use crate::progress::Progress;
use crate::source::{
    ClassInstructorRecord, ClassRecord, DepartmentRecord, InstructorRecord, OfferingRecord, ProblemSnapshot,
    SubpartRecord,
};

/// Builds a [`Solution`] from a [`ProblemSnapshot`].
pub struct ProblemCompiler<'a> {
    snapshot: &'a ProblemSnapshot,
    progress: &'a Mutex<Progress>,
    stop: &'a StopToken,
    engine: &'a dyn SolverEngine,
    common_itypes: HashSet<String>,
    departments: Vec<&'a DepartmentRecord>,
    instructor_records: HashMap<i64, &'a InstructorRecord>,
    offerings: HashMap<i64, &'a OfferingRecord>,
    subparts: HashMap<i64, &'a SubpartRecord>,
    classes: HashMap<i64, &'a ClassRecord>,
    children: HashMap<i64, Vec<&'a ClassRecord>>,
    class_instructors: HashMap<i64, Vec<&'a ClassInstructorRecord>>,
    attribute_types: HashMap<i64, AttributeTypeIdx>,
    attributes: HashMap<i64, AttributeIdx>,
    courses: HashMap<i64, CourseIdx>,
    department_attribute: HashMap<i64, AttributeIdx>,
    instructors: HashMap<i64, InstructorIdx>,
    has_tentative: bool,
    has_committed: bool,
    model: Model,
}

impl<'a> ProblemCompiler<'a> {
    pub fn new(
        snapshot: &'a ProblemSnapshot,
        properties: &'a Properties,
        progress: &'a Mutex<Progress>,
        stop: &'a StopToken,
        engine: &'a dyn SolverEngine,
    ) -> Self {
        let common_itypes = properties
            .get_str("General.CommonItypes", "lec")
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();

        let solver_groups = properties.get_i64_list("General.SolverGroupId");
        let departments = snapshot
            .departments
            .iter()
            .filter(|d| solver_groups.is_empty() || d.solver_group_id.is_some_and(|g| solver_groups.contains(&g)))
            .collect();

        let mut children: HashMap<i64, Vec<&ClassRecord>> = HashMap::new();
        for class in &snapshot.classes {
            if let Some(parent) = class.parent_id {
                children.entry(parent).or_default().push(class);
            }
        }
        let mut class_instructors: HashMap<i64, Vec<&ClassInstructorRecord>> = HashMap::new();
        for link in &snapshot.class_instructors {
            class_instructors.entry(link.class_id).or_default().push(link);
        }

        Self {
            snapshot,
            progress,
            stop,
            engine,
            common_itypes,
            departments,
            instructor_records: snapshot.instructors.iter().map(|i| (i.id, i)).collect(),
            offerings: snapshot.offerings.iter().map(|o| (o.id, o)).collect(),
            subparts: snapshot.subparts.iter().map(|s| (s.id, s)).collect(),
            classes: snapshot.classes.iter().map(|c| (c.id, c)).collect(),
            children,
            class_instructors,
            attribute_types: HashMap::new(),
            attributes: HashMap::new(),
            courses: HashMap::new(),
            department_attribute: HashMap::new(),
            instructors: HashMap::new(),
            has_tentative: false,
            has_committed: false,
            model: Model::new(properties),
        }
    }

    /// Runs all phases. `Save.Commit` is written into `commit_properties`.
    pub fn compile(mut self, commit_properties: &mut Properties) -> Result<Solution> {
        self.with_progress(|p| p.set_status("Loading input data ..."));

        if self.departments.len() > 1 {
            let ty = self.model.add_attribute_type(AttributeType {
                id: -1,
                name: "Department".to_string(),
                conjunctive: false,
                required: false,
            });
            for department in self.departments.clone() {
                let idx = self.model.add_attribute(Attribute {
                    id: -department.id,
                    name: department.code.clone(),
                    attribute_type: ty,
                });
                self.department_attribute.insert(department.id, idx);
            }
        }

        self.check_times()?;
        self.load_instructors()?;
        self.load_requests()?;
        self.model.rebuild_indexes();

        let mut solution = Solution::new(std::mem::take(&mut self.model));
        self.create_assignment(&mut solution)?;

        let commit = !self.has_tentative && self.has_committed;
        commit_properties.set("Save.Commit", commit);
        log::info!(
            "Compiled {} instructors, {} requests and {} variables",
            solution.model.instructors.len(),
            solution.model.requests.len(),
            solution.model.variables.len()
        );
        Ok(solution)
    }

    fn check_times(&self) -> Result<()> {
        for class in &self.snapshot.classes {
            if let Some(time) = &class.time {
                if time.checked_end_slot().is_none() {
                    return Err(SolverError::InconsistentData {
                        message: format!(
                            "{} starts at slot {} and lasts {} slots",
                            self.class_label(class),
                            time.start_slot,
                            time.length
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    fn with_progress(&self, f: impl FnOnce(&mut Progress)) {
        let mut progress = self.progress.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut progress);
    }

    fn warn(&self, message: String) {
        self.with_progress(|p| p.warn(message));
    }

    fn is_solved_department(&self, department_id: i64) -> bool {
        self.departments.iter().any(|d| d.id == department_id)
    }

    fn attribute(&mut self, id: i64) -> Result<AttributeIdx> {
        if let Some(idx) = self.attributes.get(&id) {
            return Ok(*idx);
        }
        let record = self
            .snapshot
            .attributes
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| SolverError::InconsistentData {
                message: format!("attribute {} does not exist", id),
            })?;
        let ty = match self.attribute_types.get(&record.type_id) {
            Some(ty) => *ty,
            None => {
                let type_record = self
                    .snapshot
                    .attribute_types
                    .iter()
                    .find(|t| t.id == record.type_id)
                    .ok_or_else(|| SolverError::InconsistentData {
                        message: format!("attribute type {} does not exist", record.type_id),
                    })?;
                let ty = self.model.add_attribute_type(AttributeType {
                    id: type_record.id,
                    name: type_record.label.clone(),
                    conjunctive: type_record.conjunctive,
                    required: type_record.required,
                });
                self.attribute_types.insert(type_record.id, ty);
                ty
            }
        };
        let idx = self.model.add_attribute(Attribute {
            id: record.id,
            name: record.name.clone(),
            attribute_type: ty,
        });
        self.attributes.insert(id, idx);
        Ok(idx)
    }

    fn course(&mut self, offering_id: i64) -> Result<CourseIdx> {
        if let Some(idx) = self.courses.get(&offering_id) {
            return Ok(*idx);
        }
        let offering = self.offering(offering_id)?;
        let idx = self.model.add_course(Course {
            id: offering.id,
            name: offering.course_name.clone(),
            subject_area_id: offering.subject_area_id,
        });
        self.courses.insert(offering_id, idx);
        Ok(idx)
    }

    fn offering(&self, id: i64) -> Result<&'a OfferingRecord> {
        self.offerings.get(&id).copied().ok_or_else(|| SolverError::InconsistentData {
            message: format!("offering {} does not exist", id),
        })
    }

    fn subpart(&self, id: i64) -> Result<&'a SubpartRecord> {
        self.subparts.get(&id).copied().ok_or_else(|| SolverError::InconsistentData {
            message: format!("subpart {} does not exist", id),
        })
    }

    /// `MATH 101 Lec 1`
    fn class_label(&self, class: &ClassRecord) -> String {
        match self.subparts.get(&class.subpart_id) {
            Some(subpart) => {
                let course = self
                    .offerings
                    .get(&subpart.offering_id)
                    .map(|o| o.course_name.as_str())
                    .unwrap_or("");
                format!("{} {} {}", course, subpart.itype_desc, class.section)
            }
            None => format!("Class {}", class.section),
        }
    }

    fn load_instructors(&mut self) -> Result<()> {
        let snapshot = self.snapshot;
        let list: Vec<&InstructorRecord> = snapshot
            .instructors
            .iter()
            .filter(|i| {
                self.is_solved_department(i.department_id)
                    && !i.teaching_preference.is_prohibited()
                    && i.max_load > 0.0
            })
            .collect();
        self.with_progress(|p| p.set_phase("Loading instructors...", list.len() as u64));

        for record in list {
            self.stop.check()?;
            let mut instructor = Instructor::new(record.id, record.name.clone(), record.teaching_preference, record.max_load);
            instructor.external_id = record.external_id.clone();
            for attribute in &record.attributes {
                let idx = self.attribute(*attribute)?;
                instructor.add_attribute(idx);
            }
            if let Some(idx) = self.department_attribute.get(&record.department_id) {
                instructor.add_attribute(*idx);
            }
            for pref in &record.course_preferences {
                let course = self.course(pref.id)?;
                instructor
                    .course_preferences
                    .push(crate::model::Preference::new(course, pref.level));
            }
            for distribution in &record.distribution_preferences {
                if distribution.reference == "BTB" || distribution.reference == "BTB_TIME" {
                    instructor.back_to_back = distribution.level;
                }
            }
            for grid in &record.time_preferences {
                let grid = PreferenceGrid::from_record(grid)?;
                instructor.time_preferences.extend(grid.compress());
            }
            instructor.time_preferences.extend(self.unavailability(record));

            let idx = self.model.add_instructor(instructor);
            self.instructors.insert(record.id, idx);
            self.with_progress(|p| p.inc_progress());
        }
        Ok(())
    }

    /// Prohibited blocks from committed classes the instructor attends or
    /// teaches outside of the problem.
    fn unavailability(&self, record: &InstructorRecord) -> Vec<TimeBlock> {
        let mut blocks = Vec::new();
        let mut add = |class: &ClassRecord| {
            if let Some(time) = &class.time {
                blocks.push(TimeBlock::unavailable(time.clone(), class.id, self.class_label(class)));
            }
        };

        if let Some(external_id) = &record.external_id {
            for enrollment in self
                .snapshot
                .enrollments
                .iter()
                .filter(|e| &e.student_external_id == external_id)
            {
                if let Some(class) = self.classes.get(&enrollment.class_id) {
                    if !class.cancelled {
                        add(class);
                    }
                }
            }
            for other in self.snapshot.instructors.iter().filter(|i| {
                i.external_id.as_ref() == Some(external_id) && i.department_id != record.department_id
            }) {
                for link in self.snapshot.class_instructors.iter().filter(|l| l.instructor_id == other.id) {
                    if link.tentative || !link.lead {
                        continue;
                    }
                    if let Some(class) = self.classes.get(&link.class_id) {
                        if !class.cancelled {
                            add(class);
                        }
                    }
                }
            }
        }

        for link in self.snapshot.class_instructors.iter().filter(|l| l.instructor_id == record.id) {
            if link.tentative || !link.lead {
                continue;
            }
            if let Some(class) = self.classes.get(&link.class_id) {
                if !class.cancelled && !self.needs_assignment(class) {
                    add(class);
                }
            }
        }
        blocks
    }

    fn effective_nr_instructors(&self, class: &ClassRecord) -> usize {
        class
            .nr_instructors
            .or_else(|| self.subparts.get(&class.subpart_id).and_then(|s| s.nr_instructors))
            .unwrap_or(0)
    }

    fn effective_load(&self, class: &ClassRecord) -> Option<f32> {
        class
            .teaching_load
            .or_else(|| self.subparts.get(&class.subpart_id).and_then(|s| s.teaching_load))
    }

    /// A class needs an instructor when it asks for one and carries a load.
    fn needs_assignment(&self, class: &ClassRecord) -> bool {
        self.effective_nr_instructors(class) > 0 && self.effective_load(class).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::GreedyEngine;
    use crate::model::{PreferenceLevel, TimeLocation};
    use crate::source::{AttributeRecord, AttributeTypeRecord, EnrollmentRecord, SubpartRecord, TimeGridRecord};

    pub(crate) fn department(id: i64, code: &str, group: i64) -> DepartmentRecord {
        DepartmentRecord {
            id,
            code: code.to_string(),
            name: code.to_string(),
            solver_group_id: Some(group),
        }
    }

    pub(crate) fn instructor(id: i64, name: &str, department_id: i64) -> InstructorRecord {
        InstructorRecord {
            id,
            external_id: Some(format!("E{}", id)),
            name: name.to_string(),
            department_id,
            teaching_preference: PreferenceLevel::Neutral,
            max_load: 12.0,
            attributes: Vec::new(),
            course_preferences: Vec::new(),
            time_preferences: Vec::new(),
            distribution_preferences: Vec::new(),
        }
    }

    fn class(id: i64, subpart_id: i64, department_id: i64, time: Option<TimeLocation>) -> ClassRecord {
        ClassRecord {
            id,
            subpart_id,
            parent_id: None,
            external_id: None,
            section: "1".to_string(),
            cancelled: false,
            nr_instructors: None,
            teaching_load: None,
            department_id,
            time,
            rooms: Vec::new(),
            instructor_preferences: Vec::new(),
            attribute_preferences: Vec::new(),
        }
    }

    fn compile(snapshot: &ProblemSnapshot, properties: &Properties) -> (Result<Solution>, Properties, Progress) {
        let progress = Mutex::new(Progress::new());
        let stop = StopToken::new();
        let engine = GreedyEngine::new();
        let mut out = Properties::new();
        let result = ProblemCompiler::new(snapshot, properties, &progress, &stop, &engine).compile(&mut out);
        (result, out, progress.into_inner().unwrap())
    }

    fn base() -> ProblemSnapshot {
        ProblemSnapshot {
            departments: vec![department(1, "MATH", 10), department(2, "PHYS", 20)],
            offerings: vec![OfferingRecord {
                id: 100,
                course_name: "MATH 101".to_string(),
                subject_area_id: Some(5),
                instructor_preferences: Vec::new(),
                attribute_preferences: Vec::new(),
            }],
            subparts: vec![SubpartRecord {
                id: 200,
                offering_id: 100,
                config_id: 1,
                itype: "lec".to_string(),
                itype_desc: "Lec".to_string(),
                nr_instructors: Some(1),
                teaching_load: Some(3.0),
                instructor_preferences: Vec::new(),
                attribute_preferences: Vec::new(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_instructor_filter_and_solver_groups() {
        let mut snapshot = base();
        let mut prohibited = instructor(2, "Bob", 1);
        prohibited.teaching_preference = PreferenceLevel::Prohibited;
        let mut no_load = instructor(3, "Cy", 1);
        no_load.max_load = 0.0;
        snapshot.instructors = vec![instructor(1, "Ada", 1), prohibited, no_load, instructor(4, "Di", 2)];

        let mut props = Properties::new();
        props.set("General.SolverGroupId", "10");
        let (result, _, _) = compile(&snapshot, &props);
        let solution = result.unwrap();
        assert_eq!(solution.model.instructors.len(), 1);
        assert_eq!(solution.model.instructors[0].name, "Ada");
        assert!(solution.model.attribute_types.is_empty());
    }

    #[test]
    fn test_department_attribute_for_multiple_departments() {
        let mut snapshot = base();
        snapshot.instructors = vec![instructor(1, "Ada", 1), instructor(4, "Di", 2)];
        snapshot.classes = vec![class(300, 200, 1, None)];
        let mut props = Properties::new();
        props.set("General.SolverGroupId", "10,20");
        let (result, _, _) = compile(&snapshot, &props);
        let solution = result.unwrap();
        assert_eq!(solution.model.attribute_types[0].name, "Department");
        assert_eq!(solution.model.attributes.len(), 2);
        let request = &solution.model.requests[0];
        assert!(solution.model.can_teach(request, 0));
        assert!(!solution.model.can_teach(request, 1));
    }

    #[test]
    fn test_time_grid_and_unavailability() {
        let mut snapshot = base();
        let mut ada = instructor(1, "Ada", 1);
        ada.time_preferences.push(TimeGridRecord {
            first_slot: 90,
            slots_per_cell: 6,
            break_time: 0,
            rows: vec!["P2".to_string(), "P2".to_string()],
        });
        ada.distribution_preferences.push(crate::source::DistributionRecord {
            reference: "BTB".to_string(),
            level: PreferenceLevel::Preferred,
        });
        snapshot.instructors = vec![ada];
        snapshot.classes = vec![class(301, 200, 2, Some(TimeLocation::new(16, 120, 12)))];
        snapshot.enrollments = vec![EnrollmentRecord {
            student_external_id: "E1".to_string(),
            class_id: 301,
        }];
        let (result, _, _) = compile(&snapshot, &Properties::new());
        let solution = result.unwrap();
        let ada = &solution.model.instructors[0];
        assert_eq!(ada.back_to_back, PreferenceLevel::Preferred);
        assert_eq!(ada.time_preferences.len(), 2);
        assert_eq!(ada.time_preferences[0].time.days, 64 | 32);
        assert!(ada.time_preferences[1].is_unavailability());
        assert_eq!(ada.time_preferences[1].source.as_ref().unwrap().label, "MATH 101 Lec 1");
    }

    #[test]
    fn test_missing_attribute_is_fatal() {
        let mut snapshot = base();
        let mut ada = instructor(1, "Ada", 1);
        ada.attributes.push(77);
        snapshot.instructors = vec![ada];
        let (result, _, _) = compile(&snapshot, &Properties::new());
        let err = result.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, SolverError::InconsistentData { .. }));
    }

    #[test]
    fn test_attributes_created_lazily() {
        let mut snapshot = base();
        snapshot.attribute_types = vec![AttributeTypeRecord {
            id: 1,
            label: "Skill".to_string(),
            conjunctive: true,
            required: false,
        }];
        snapshot.attributes = vec![AttributeRecord {
            id: 5,
            name: "Lab".to_string(),
            type_id: 1,
        }];
        let mut ada = instructor(1, "Ada", 1);
        ada.attributes.push(5);
        snapshot.instructors = vec![ada, instructor(2, "Bob", 1)];
        let (result, _, _) = compile(&snapshot, &Properties::new());
        let solution = result.unwrap();
        assert_eq!(solution.model.attribute_types.len(), 1);
        assert!(solution.model.instructors[0].has_attribute(0));
        assert!(solution.model.instructors[1].attributes.is_empty());
    }

    #[test]
    fn test_interrupted_compile() {
        let mut snapshot = base();
        snapshot.instructors = vec![instructor(1, "Ada", 1)];
        let progress = Mutex::new(Progress::new());
        let stop = StopToken::new();
        stop.request_stop();
        let engine = GreedyEngine::new();
        let props = Properties::new();
        let mut out = Properties::new();
        let result = ProblemCompiler::new(&snapshot, &props, &progress, &stop, &engine).compile(&mut out);
        assert!(matches!(result, Err(SolverError::Interrupted)));
    }

    #[test]
    fn test_committed_class_marks_soft_preference_unavailable() {
        let mut snapshot = base();
        let mut ada = instructor(1, "Ada", 1);
        ada.time_preferences.push(TimeGridRecord {
            first_slot: 0,
            slots_per_cell: 6,
            break_time: 0,
            rows: vec!["2221".to_string()],
        });
        snapshot.instructors = vec![ada];
        let mut taught = class(301, 200, 1, Some(TimeLocation::new(64, 18, 3)));
        taught.nr_instructors = Some(0);
        snapshot.classes = vec![taught];
        snapshot.class_instructors = vec![ClassInstructorRecord {
            class_id: 301,
            instructor_id: 1,
            lead: true,
            tentative: false,
        }];

        let (result, _, _) = compile(&snapshot, &Properties::new());
        let solution = result.unwrap();
        assert!(solution.model.requests.is_empty());
        let ada = &solution.model.instructors[0];
        assert_eq!(ada.time_preferences.len(), 2);
        assert_eq!(ada.time_preferences[0].level, PreferenceLevel::Preferred);
        let blocked = &ada.time_preferences[1];
        assert!(blocked.is_unavailability());
        assert_eq!(blocked.level, PreferenceLevel::Prohibited);
        assert_eq!(blocked.source.as_ref().unwrap().class_id, 301);

        let pattern: Vec<char> = crate::model::availability_pattern(&ada.time_preferences).chars().collect();
        assert_eq!(pattern[17], '2');
        assert_eq!(pattern[18], crate::model::NOT_AVAILABLE_CHAR);
        assert_eq!(pattern[20], crate::model::NOT_AVAILABLE_CHAR);
        assert_eq!(pattern[21], '1');
        assert_eq!(pattern[crate::model::SLOTS_PER_DAY + 18], '2');
    }

    #[test]
    fn test_class_time_past_slot_range_is_fatal() {
        let mut snapshot = base();
        snapshot.instructors = vec![instructor(1, "Ada", 1)];
        snapshot.classes = vec![class(300, 200, 1, Some(TimeLocation::new(64, u16::MAX - 4, 12)))];
        let (result, _, _) = compile(&snapshot, &Properties::new());
        assert!(matches!(result, Err(SolverError::InconsistentData { .. })));
    }
}
