//! Display-ready snapshots of teaching requests.

use indexmap::IndexMap;
use serde::Serialize;

use super::SolverSession;
use crate::error::Result;
use crate::model::{
    availability_pattern, Criterion, PreferenceLevel, Section, Solution, TeachingAssignment, VariableIdx,
};

/// Which requests [`SolverSession::teaching_requests`] returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestFilter {
    /// Only requests of courses in this subject area.
    pub subject_area_id: Option<i64>,
    /// Only assigned (`Some(true)`) or unassigned (`Some(false)`) variables.
    pub assigned: Option<bool>,
}

impl RequestFilter {
    pub fn assigned() -> Self {
        Self {
            assigned: Some(true),
            ..Default::default()
        }
    }

    pub fn unassigned() -> Self {
        Self {
            assigned: Some(false),
            ..Default::default()
        }
    }

    pub fn with_subject_area(mut self, subject_area_id: i64) -> Self {
        self.subject_area_id = Some(subject_area_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PreferenceInfo {
    pub id: i64,
    pub name: String,
    pub level: PreferenceLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TimePreferenceInfo {
    pub time: String,
    pub level: PreferenceLevel,
    /// Sort key, `ddd:sssss`.
    pub comparable: String,
    /// Class causing a hard unavailability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AttributeInfo {
    pub id: i64,
    pub name: String,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SectionInfo {
    pub id: i64,
    pub external_id: Option<String>,
    pub section_type: String,
    pub name: String,
    pub time: Option<String>,
    pub date: Option<String>,
    pub room: Option<String>,
    pub common: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstructorInfo {
    pub id: i64,
    pub name: String,
    pub external_id: Option<String>,
    pub assigned_load: f32,
    pub max_load: f32,
    pub teaching_preference: PreferenceLevel,
    pub back_to_back: PreferenceLevel,
    pub attributes: Vec<AttributeInfo>,
    pub course_preferences: Vec<PreferenceInfo>,
    pub time_preferences: Vec<TimePreferenceInfo>,
    /// 7 x 288 characters, one per five-minute slot of the week.
    pub availability: String,
    /// Non-zero criterion values of this assignment.
    pub values: IndexMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TeachingRequestInfo {
    pub request_id: i64,
    pub instructor_index: usize,
    pub course_id: i64,
    pub course_name: String,
    pub load: f32,
    pub sections: Vec<SectionInfo>,
    pub attribute_preferences: Vec<PreferenceInfo>,
    pub instructor_preferences: Vec<PreferenceInfo>,
    pub instructor: Option<InstructorInfo>,
}

fn section_info(section: &Section, use_am_pm: bool) -> SectionInfo {
    SectionInfo {
        id: section.id,
        external_id: section.external_id.clone(),
        section_type: section.section_type.clone(),
        name: section.name.clone(),
        time: section.time.as_ref().map(|t| t.name(use_am_pm)),
        date: section.time.as_ref().and_then(|t| t.date_pattern.clone()),
        room: section.room.clone(),
        common: section.common,
    }
}

fn instructor_info(solution: &Solution, value: &TeachingAssignment, use_am_pm: bool) -> InstructorInfo {
    let model = &solution.model;
    let instructor = &model.instructors[value.instructor];

    let mut time_preferences: Vec<TimePreferenceInfo> = instructor
        .time_preferences
        .iter()
        .map(|block| TimePreferenceInfo {
            time: block.time.name(use_am_pm),
            level: block.level,
            comparable: block.comparable(),
            reason: block.source.as_ref().map(|s| s.label.clone()),
        })
        .collect();
    time_preferences.sort_by(|a, b| a.comparable.cmp(&b.comparable));

    let values = Criterion::all()
        .iter()
        .map(|c| (c.name().to_string(), model.criterion_value(*c, value)))
        .filter(|(_, v)| *v != 0.0)
        .collect();

    InstructorInfo {
        id: instructor.id,
        name: instructor.name.clone(),
        external_id: instructor.external_id.clone(),
        assigned_load: model.instructor_load(&solution.assignment, value.instructor),
        max_load: instructor.max_load,
        teaching_preference: instructor.teaching_preference,
        back_to_back: instructor.back_to_back,
        attributes: instructor
            .attributes
            .iter()
            .map(|a| {
                let attribute = &model.attributes[*a];
                AttributeInfo {
                    id: attribute.id,
                    name: attribute.name.clone(),
                    type_name: model.attribute_types[attribute.attribute_type].name.clone(),
                }
            })
            .collect(),
        course_preferences: instructor
            .course_preferences
            .iter()
            .map(|p| PreferenceInfo {
                id: model.courses[p.target].id,
                name: model.courses[p.target].name.clone(),
                level: p.level,
            })
            .collect(),
        time_preferences,
        availability: availability_pattern(&instructor.time_preferences),
        values,
    }
}

/// Flattened view of one variable and, when assigned, its instructor.
pub fn teaching_request_info(solution: &Solution, variable: VariableIdx, use_am_pm: bool) -> TeachingRequestInfo {
    let model = &solution.model;
    let request = model.request_of(variable);
    let course = &model.courses[request.course];
    TeachingRequestInfo {
        request_id: request.id,
        instructor_index: model.variables[variable].index,
        course_id: course.id,
        course_name: course.name.clone(),
        load: request.load,
        sections: request.sections.iter().map(|s| section_info(s, use_am_pm)).collect(),
        attribute_preferences: request
            .attribute_preferences
            .iter()
            .map(|p| PreferenceInfo {
                id: model.attributes[p.target].id,
                name: model.attributes[p.target].name.clone(),
                level: p.level,
            })
            .collect(),
        instructor_preferences: request
            .instructor_preferences
            .iter()
            .map(|p| PreferenceInfo {
                id: model.instructors[p.target].id,
                name: model.instructors[p.target].name.clone(),
                level: p.level,
            })
            .collect(),
        instructor: solution
            .assignment
            .value(variable)
            .map(|value| instructor_info(solution, &value, use_am_pm)),
    }
}

pub fn teaching_requests(solution: &Solution, filter: RequestFilter, use_am_pm: bool) -> Vec<TeachingRequestInfo> {
    let model = &solution.model;
    (0..model.variables.len())
        .filter(|&variable| {
            let course = &model.courses[model.request_of(variable).course];
            filter
                .subject_area_id
                .map_or(true, |area| course.subject_area_id == Some(area))
        })
        .filter(|&variable| {
            filter
                .assigned
                .map_or(true, |assigned| solution.assignment.value(variable).is_some() == assigned)
        })
        .map(|variable| teaching_request_info(solution, variable, use_am_pm))
        .collect()
}

impl SolverSession {
    /// Teaching requests matching `filter`, read under the solution lock.
    pub fn teaching_requests(&self, filter: RequestFilter) -> Result<Vec<TeachingRequestInfo>> {
        let use_am_pm = self.properties().get_bool("General.UseAmPm", true);
        self.with_live("teaching requests", |solution| {
            teaching_requests(solution, filter, use_am_pm)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Properties;
    use crate::model::{
        Attribute, AttributeType, Course, Instructor, Model, Preference, TimeBlock, TimeLocation, TeachingRequest,
        NOT_AVAILABLE_CHAR, SLOTS_PER_DAY,
    };

    fn solution() -> Solution {
        let mut model = Model::new(&Properties::new());
        let ty = model.add_attribute_type(AttributeType {
            id: 1,
            name: "Skill".to_string(),
            conjunctive: false,
            required: false,
        });
        let attribute = model.add_attribute(Attribute {
            id: 11,
            name: "Calculus".to_string(),
            attribute_type: ty,
        });
        let math = model.add_course(Course {
            id: 101,
            name: "MATH 101".to_string(),
            subject_area_id: Some(7),
        });
        let engl = model.add_course(Course {
            id: 202,
            name: "ENGL 106".to_string(),
            subject_area_id: Some(8),
        });

        let mut ada = Instructor::new(1, "Ada", PreferenceLevel::Preferred, 12.0);
        ada.add_attribute(attribute);
        ada.course_preferences.push(Preference::new(math, PreferenceLevel::StronglyPreferred));
        ada.time_preferences
            .push(TimeBlock::new(TimeLocation::new(64, 18, 12), PreferenceLevel::Discouraged));
        ada.time_preferences
            .push(TimeBlock::unavailable(TimeLocation::new(64, 18, 6), 900, "PHYS 100 Lec 1"));
        let ada = model.add_instructor(ada);

        let section = Section {
            id: 500,
            external_id: Some("MATH-101-1".to_string()),
            section_type: "Lec".to_string(),
            name: "Lec 1".to_string(),
            time: Some(TimeLocation::new(64 | 16 | 4, 102, 12)),
            room: Some("MATH 175".to_string()),
            allow_overlap: false,
            common: false,
        };
        let mut request = TeachingRequest::new(500, math, 3.0, 1, vec![section]);
        request.attribute_preferences.push(Preference::new(attribute, PreferenceLevel::Preferred));
        model.add_request(request);
        model.add_request(TeachingRequest::new(600, engl, 2.0, 1, Vec::new()));

        let mut solution = Solution::new(model);
        solution.assignment.assign(TeachingAssignment::new(0, ada));
        solution
    }

    #[test]
    fn test_assigned_request_info() {
        let solution = solution();
        let infos = teaching_requests(&solution, RequestFilter::assigned(), true);
        assert_eq!(infos.len(), 1);
        let info = &infos[0];
        assert_eq!(info.request_id, 500);
        assert_eq!(info.course_name, "MATH 101");
        assert_eq!(info.sections[0].time.as_deref(), Some("MWF 8:30a - 9:30a"));
        assert_eq!(info.attribute_preferences[0].name, "Calculus");

        let instructor = info.instructor.as_ref().unwrap();
        assert_eq!(instructor.name, "Ada");
        assert_eq!(instructor.assigned_load, 3.0);
        assert_eq!(instructor.attributes[0].type_name, "Skill");
        assert_eq!(instructor.course_preferences[0].id, 101);
        assert_eq!(instructor.time_preferences.len(), 2);
        assert_eq!(instructor.time_preferences[1].reason.as_deref(), Some("PHYS 100 Lec 1"));
        assert_eq!(instructor.availability.len(), 7 * SLOTS_PER_DAY);
        let chars: Vec<char> = instructor.availability.chars().collect();
        assert_eq!(chars[18], NOT_AVAILABLE_CHAR);
        assert_eq!(chars[25], PreferenceLevel::Discouraged.as_char());
        assert_eq!(instructor.values.get("Course Preferences"), Some(&-4.0));
    }

    #[test]
    fn test_filters() {
        let solution = solution();
        assert_eq!(teaching_requests(&solution, RequestFilter::default(), true).len(), 2);
        let unassigned = teaching_requests(&solution, RequestFilter::unassigned(), true);
        assert_eq!(unassigned.len(), 1);
        assert_eq!(unassigned[0].request_id, 600);
        assert!(unassigned[0].instructor.is_none());
        assert!(teaching_requests(&solution, RequestFilter::assigned().with_subject_area(8), true).is_empty());
        assert_eq!(
            teaching_requests(&solution, RequestFilter::default().with_subject_area(8), true)[0].course_id,
            202
        );
    }
}
