use serde::{Deserialize, Serialize};

use super::preference::{Preference, PreferenceCombination, PreferenceLevel};
use super::time::{TimeBlock, TimeLocation};

/// Index of an attribute type within the model.
pub type AttributeTypeIdx = usize;
/// Index of an attribute within the model.
pub type AttributeIdx = usize;
/// Index of a course within the model.
pub type CourseIdx = usize;
/// Index of an instructor within the model.
pub type InstructorIdx = usize;
/// Index of a teaching request within the model.
pub type RequestIdx = usize;
/// Index of a variable (one instructor slot of a request) within the model.
pub type VariableIdx = usize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AttributeType {
    pub id: i64,
    pub name: String,
    /// All required attributes of a conjunctive type must be present.
    pub conjunctive: bool,
    /// An instructor must match at least one requested attribute of a required type.
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Attribute {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub attribute_type: AttributeTypeIdx,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Course {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_area_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Section {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Instructional type, e.g. `Lec`.
    pub section_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Time conflicts with this section are tolerated.
    #[serde(default)]
    pub allow_overlap: bool,
    /// Companion section that does not need an instructor of its own.
    #[serde(default)]
    pub common: bool,
}

impl Section {
    pub fn overlaps(&self, other: &Section) -> bool {
        if self.allow_overlap || other.allow_overlap {
            return false;
        }
        match (&self.time, &other.time) {
            (Some(a), Some(b)) => a.overlaps(b),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Instructor {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub name: String,
    pub teaching_preference: PreferenceLevel,
    pub max_load: f32,
    #[serde(default)]
    pub back_to_back: PreferenceLevel,
    #[serde(default)]
    pub attributes: Vec<AttributeIdx>,
    #[serde(default)]
    pub course_preferences: Vec<Preference<CourseIdx>>,
    #[serde(default)]
    pub time_preferences: Vec<TimeBlock>,
}

impl Instructor {
    pub fn new(id: i64, name: impl Into<String>, teaching_preference: PreferenceLevel, max_load: f32) -> Self {
        Self {
            id,
            external_id: None,
            name: name.into(),
            teaching_preference,
            max_load,
            back_to_back: PreferenceLevel::Neutral,
            attributes: Vec::new(),
            course_preferences: Vec::new(),
            time_preferences: Vec::new(),
        }
    }

    pub fn has_attribute(&self, attribute: AttributeIdx) -> bool {
        self.attributes.contains(&attribute)
    }

    pub fn add_attribute(&mut self, attribute: AttributeIdx) {
        if !self.has_attribute(attribute) {
            self.attributes.push(attribute);
        }
    }

    pub fn course_preference(&self, course: CourseIdx) -> PreferenceLevel {
        let mut comb = PreferenceCombination::new();
        for pref in self.course_preferences.iter().filter(|p| p.target == course) {
            comb.add_level(pref.level);
        }
        comb.level()
    }

    /// Combined time preference over every section of the request that has a
    /// time and does not allow overlaps.
    pub fn time_preference(&self, request: &TeachingRequest) -> PreferenceCombination {
        let mut comb = PreferenceCombination::new();
        for section in request.sections.iter().filter(|s| !s.allow_overlap) {
            let Some(time) = &section.time else { continue };
            for block in &self.time_preferences {
                if block.time.overlaps(time) {
                    comb.add_level(block.level);
                }
            }
        }
        comb
    }

    /// Whether a committed class makes the instructor unavailable for the request.
    pub fn is_unavailable(&self, request: &TeachingRequest) -> bool {
        self.time_preference(request).is_prohibited()
    }
}

/// A class (plus companion sections) needing one or more instructors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TeachingRequest {
    pub id: i64,
    pub course: CourseIdx,
    pub load: f32,
    pub nr_instructors: usize,
    pub sections: Vec<Section>,
    #[serde(default)]
    pub instructor_preferences: Vec<Preference<InstructorIdx>>,
    #[serde(default)]
    pub attribute_preferences: Vec<Preference<AttributeIdx>>,
    /// One variable per needed instructor, filled in by the model.
    #[serde(default)]
    pub variables: Vec<VariableIdx>,
}

impl TeachingRequest {
    pub fn new(id: i64, course: CourseIdx, load: f32, nr_instructors: usize, sections: Vec<Section>) -> Self {
        Self {
            id,
            course,
            load,
            nr_instructors,
            sections,
            instructor_preferences: Vec::new(),
            attribute_preferences: Vec::new(),
            variables: Vec::new(),
        }
    }

    pub fn instructor_preference(&self, instructor: InstructorIdx) -> PreferenceLevel {
        let mut comb = PreferenceCombination::new();
        for pref in self.instructor_preferences.iter().filter(|p| p.target == instructor) {
            comb.add_level(pref.level);
        }
        comb.level()
    }

    /// Whether any section of the two requests overlap in time.
    pub fn overlaps(&self, other: &TeachingRequest) -> bool {
        self.sections
            .iter()
            .any(|a| other.sections.iter().any(|b| a.id != b.id && a.overlaps(b)))
    }

    /// `Course [sections]` label used in messages.
    pub fn label(&self, course_name: &str) -> String {
        let sections: Vec<&str> = self.sections.iter().map(|s| s.name.as_str()).collect();
        format!("{} [{}]", course_name, sections.join(", "))
    }
}

/// One instructor slot of a teaching request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Variable {
    pub request: RequestIdx,
    /// Position among the request's variables.
    pub index: usize,
    /// Instructor carried over from existing assignments, not yet validated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<InstructorIdx>,
}

/// A value: the instructor placed into a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TeachingAssignment {
    pub variable: VariableIdx,
    pub instructor: InstructorIdx,
}

impl TeachingAssignment {
    pub fn new(variable: VariableIdx, instructor: InstructorIdx) -> Self {
        Self {
            variable,
            instructor,
        }
    }
}
