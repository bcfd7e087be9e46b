//! Plain records read from the relational store, materialized up front.

use serde::{Deserialize, Serialize};

use crate::model::{PreferenceLevel, TimeLocation};

fn default_first_slot() -> u16 {
    90
}

fn default_slots_per_cell() -> u16 {
    6
}

/// Everything the compiler reads, captured at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProblemSnapshot {
    pub session_id: Option<i64>,
    pub departments: Vec<DepartmentRecord>,
    pub attribute_types: Vec<AttributeTypeRecord>,
    pub attributes: Vec<AttributeRecord>,
    pub instructors: Vec<InstructorRecord>,
    pub offerings: Vec<OfferingRecord>,
    pub subparts: Vec<SubpartRecord>,
    pub classes: Vec<ClassRecord>,
    pub class_instructors: Vec<ClassInstructorRecord>,
    pub enrollments: Vec<EnrollmentRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DepartmentRecord {
    pub id: i64,
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub solver_group_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AttributeTypeRecord {
    pub id: i64,
    pub label: String,
    #[serde(default)]
    pub conjunctive: bool,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AttributeRecord {
    pub id: i64,
    pub name: String,
    pub type_id: i64,
}

/// Preference for the record with the given id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceRecord {
    pub id: i64,
    pub level: PreferenceLevel,
}

impl PreferenceRecord {
    pub fn new(id: i64, level: PreferenceLevel) -> Self {
        Self { id, level }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionRecord {
    /// Distribution type reference, e.g. `BTB` or `BTB_TIME`.
    pub reference: String,
    pub level: PreferenceLevel,
}

/// Dense day x time preference grid, one row per day starting Monday and
/// one character per cell (see [`PreferenceLevel::as_char`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TimeGridRecord {
    #[serde(default = "default_first_slot")]
    pub first_slot: u16,
    #[serde(default = "default_slots_per_cell")]
    pub slots_per_cell: u16,
    #[serde(default)]
    pub break_time: u16,
    pub rows: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstructorRecord {
    pub id: i64,
    #[serde(default)]
    pub external_id: Option<String>,
    pub name: String,
    pub department_id: i64,
    #[serde(default)]
    pub teaching_preference: PreferenceLevel,
    #[serde(default)]
    pub max_load: f32,
    #[serde(default)]
    pub attributes: Vec<i64>,
    #[serde(default)]
    pub course_preferences: Vec<PreferenceRecord>,
    #[serde(default)]
    pub time_preferences: Vec<TimeGridRecord>,
    #[serde(default)]
    pub distribution_preferences: Vec<DistributionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OfferingRecord {
    pub id: i64,
    pub course_name: String,
    #[serde(default)]
    pub subject_area_id: Option<i64>,
    #[serde(default)]
    pub instructor_preferences: Vec<PreferenceRecord>,
    #[serde(default)]
    pub attribute_preferences: Vec<PreferenceRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SubpartRecord {
    pub id: i64,
    pub offering_id: i64,
    #[serde(default)]
    pub config_id: i64,
    /// Instructional type reference, e.g. `lec`.
    pub itype: String,
    /// Instructional type label, e.g. `Lec`.
    pub itype_desc: String,
    #[serde(default)]
    pub nr_instructors: Option<usize>,
    #[serde(default)]
    pub teaching_load: Option<f32>,
    #[serde(default)]
    pub instructor_preferences: Vec<PreferenceRecord>,
    #[serde(default)]
    pub attribute_preferences: Vec<PreferenceRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClassRecord {
    pub id: i64,
    pub subpart_id: i64,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub external_id: Option<String>,
    /// Section number shown in labels.
    pub section: String,
    #[serde(default)]
    pub cancelled: bool,
    /// Overrides the subpart's number of instructors.
    #[serde(default)]
    pub nr_instructors: Option<usize>,
    /// Overrides the subpart's teaching load.
    #[serde(default)]
    pub teaching_load: Option<f32>,
    pub department_id: i64,
    /// Committed meeting time.
    #[serde(default)]
    pub time: Option<TimeLocation>,
    #[serde(default)]
    pub rooms: Vec<String>,
    #[serde(default)]
    pub instructor_preferences: Vec<PreferenceRecord>,
    #[serde(default)]
    pub attribute_preferences: Vec<PreferenceRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClassInstructorRecord {
    pub class_id: i64,
    pub instructor_id: i64,
    #[serde(default = "default_lead")]
    pub lead: bool,
    #[serde(default)]
    pub tentative: bool,
}

fn default_lead() -> bool {
    true
}

/// A student enrollment; instructors are matched by external id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EnrollmentRecord {
    pub student_external_id: String,
    pub class_id: i64,
}
