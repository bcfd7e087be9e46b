use super::ProblemCompiler;
use crate::error::Result;
use crate::model::{Solution, TeachingAssignment, PROHIBITED};

impl<'a> ProblemCompiler<'a> {
    /// Validates carried-over instructors and commits them in variable order.
    /// A candidate that conflicts with an earlier commitment is dropped.
    pub(super) fn create_assignment(&self, solution: &mut Solution) -> Result<()> {
        let nr_variables = solution.model.variables.len();
        self.with_progress(|p| p.set_phase("Creating initial assignment...", nr_variables as u64));

        for variable in 0..nr_variables {
            self.stop.check()?;
            self.with_progress(|p| p.inc_progress());
            let Some(instructor) = solution.model.variables[variable].initial else {
                continue;
            };
            let value = TeachingAssignment::new(variable, instructor);
            if let Some(reason) = rejection_reason(solution, &value) {
                self.warn(format!(
                    "Unable to assign {} <- {}: {}",
                    solution.model.variable_label(variable),
                    solution.model.instructors[instructor].name,
                    reason
                ));
                continue;
            }

            self.engine.weaken(&solution.model, &solution.assignment, &value);
            let conflicts = self
                .engine
                .conflict_constraints(&solution.model, &solution.assignment, &value);
            if conflicts.is_empty() {
                solution.assignment.assign(value);
                continue;
            }

            let mut message = format!(
                "Unable to assign {} <- {}\n  Reason:",
                solution.model.variable_label(variable),
                solution.model.instructors[instructor].name
            );
            for (constraint, values) in &conflicts {
                for other in values {
                    message.push_str(&format!(
                        "\n    {} = {}",
                        solution.model.variable_label(other.variable),
                        solution.model.instructors[other.instructor].name
                    ));
                }
                message.push_str(&format!("\n    in constraint {}", solution.model.constraint_label(*constraint)));
            }
            self.warn(message);
        }
        Ok(())
    }
}

/// First failed check for a carried-over value, in checking order.
fn rejection_reason(solution: &Solution, value: &TeachingAssignment) -> Option<String> {
    let model = &solution.model;
    let request = model.request_of(value.variable);
    let instructor = &model.instructors[value.instructor];

    if instructor.is_unavailable(request) {
        return Some("instructor is not available.".to_string());
    }
    if instructor.course_preference(request.course).is_prohibited() {
        return Some(format!("course {} is prohibited.", model.courses[request.course].name));
    }
    if request.instructor_preference(value.instructor).is_prohibited() {
        return Some(format!("instructor {} is prohibited.", instructor.name));
    }
    for (ty, attribute_type) in model.attribute_types.iter().enumerate() {
        if model.attribute_type_preference(request, instructor, ty) >= PROHIBITED {
            return Some(format!("prohibited by attribute type {}.", attribute_type.name));
        }
    }
    if !model.can_teach(request, value.instructor) {
        return Some("assignment not valid.".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::compiler::tests::{department, instructor};
    use crate::compiler::ProblemCompiler;
    use crate::config::Properties;
    use crate::engine::{GreedyEngine, StopToken};
    use crate::model::{PreferenceLevel, TimeLocation};
    use crate::progress::{MessageLevel, Progress};
    use crate::source::{
        ClassInstructorRecord, ClassRecord, OfferingRecord, PreferenceRecord, ProblemSnapshot, SubpartRecord,
    };

    fn class(id: i64, time: TimeLocation) -> ClassRecord {
        ClassRecord {
            id,
            subpart_id: 1,
            parent_id: None,
            external_id: None,
            section: id.to_string(),
            cancelled: false,
            nr_instructors: None,
            teaching_load: None,
            department_id: 1,
            time: Some(time),
            rooms: vec!["LWSN 1106".to_string()],
            instructor_preferences: Vec::new(),
            attribute_preferences: Vec::new(),
        }
    }

    fn lead(class_id: i64, instructor_id: i64) -> ClassInstructorRecord {
        ClassInstructorRecord {
            class_id,
            instructor_id,
            lead: true,
            tentative: false,
        }
    }

    fn snapshot(nr_instructors: usize) -> ProblemSnapshot {
        ProblemSnapshot {
            departments: vec![department(1, "CS", 1)],
            instructors: vec![instructor(10, "Ada", 1), instructor(11, "Bob", 1)],
            offerings: vec![OfferingRecord {
                id: 1,
                course_name: "CS 180".to_string(),
                subject_area_id: None,
                instructor_preferences: Vec::new(),
                attribute_preferences: Vec::new(),
            }],
            subparts: vec![SubpartRecord {
                id: 1,
                offering_id: 1,
                config_id: 1,
                itype: "lec".to_string(),
                itype_desc: "Lec".to_string(),
                nr_instructors: Some(nr_instructors),
                teaching_load: Some(3.0),
                instructor_preferences: Vec::new(),
                attribute_preferences: Vec::new(),
            }],
            ..Default::default()
        }
    }

    fn compile(snapshot: &ProblemSnapshot) -> (Solution, Progress) {
        let progress = Mutex::new(Progress::new());
        let stop = StopToken::new();
        let engine = GreedyEngine::new();
        let props = Properties::new();
        let mut out = Properties::new();
        let solution = ProblemCompiler::new(snapshot, &props, &progress, &stop, &engine)
            .compile(&mut out)
            .unwrap();
        (solution, progress.into_inner().unwrap())
    }

    #[test]
    fn test_first_committed_wins() {
        let mut snapshot = snapshot(1);
        let time = TimeLocation::new(64 | 16 | 4, 102, 12);
        snapshot.classes = vec![class(100, time.clone()), class(101, time)];
        snapshot.class_instructors = vec![lead(100, 10), lead(101, 10)];

        let (solution, progress) = compile(&snapshot);
        assert_eq!(solution.assignment.nr_assigned(), 1);
        assert_eq!(solution.assignment.value(0).map(|v| v.instructor), Some(0));
        assert!(solution.assignment.value(1).is_none());

        let warnings = progress.messages(MessageLevel::Warn);
        assert_eq!(warnings.len(), 1);
        let text = &warnings[0].message;
        assert!(text.starts_with("Unable to assign CS 180 [Lec 101] <- Ada"));
        assert!(text.contains("CS 180 [Lec 100] = Ada"));
        assert!(text.contains("in constraint Time conflict of Ada"));
    }

    #[test]
    fn test_course_prohibited_leaves_variables_free() {
        let mut snapshot = snapshot(2);
        snapshot.instructors[0]
            .course_preferences
            .push(PreferenceRecord::new(1, PreferenceLevel::Prohibited));
        snapshot.classes = vec![class(100, TimeLocation::new(64, 102, 12))];
        snapshot.class_instructors = vec![lead(100, 10)];

        let (solution, progress) = compile(&snapshot);
        assert_eq!(progress.warning_count(), 1);
        assert!(progress.messages(MessageLevel::Warn)[0]
            .message
            .ends_with("course CS 180 is prohibited."));
        assert_eq!(solution.assignment.nr_assigned(), 0);
        assert_eq!(solution.assignment.nr_unassigned(), 2);
        assert_eq!(solution.model.variables.len(), 2);
    }

    #[test]
    fn test_unavailable_instructor_rejected() {
        let mut snapshot = snapshot(1);
        let time = TimeLocation::new(64, 102, 12);
        snapshot.classes = vec![class(100, time.clone())];
        snapshot.enrollments = vec![crate::source::EnrollmentRecord {
            student_external_id: "E10".to_string(),
            class_id: 100,
        }];
        snapshot.class_instructors = vec![lead(100, 10)];

        let (solution, progress) = compile(&snapshot);
        assert_eq!(solution.assignment.nr_assigned(), 0);
        assert!(progress.messages(MessageLevel::Warn)[0]
            .message
            .ends_with("instructor is not available."));
    }

    #[test]
    fn test_two_instructors_carried_over_distinct() {
        let mut snapshot = snapshot(2);
        snapshot.classes = vec![class(100, TimeLocation::new(64, 102, 12))];
        snapshot.class_instructors = vec![lead(100, 11), lead(100, 10)];

        let (solution, progress) = compile(&snapshot);
        assert_eq!(progress.warning_count(), 0);
        assert_eq!(solution.assignment.value(0).map(|v| v.instructor), Some(1));
        assert_eq!(solution.assignment.value(1).map(|v| v.instructor), Some(0));
    }
}
