//! Instructor scheduling problem: entities, constraints and assignments.

mod assignment;
mod entities;
#[allow(clippy::module_inception)]
mod model;
mod preference;
mod solution;
mod time;

pub use assignment::{Assignment, BestSnapshot};
pub use entities::{
    Attribute, AttributeIdx, AttributeType, AttributeTypeIdx, Course, CourseIdx, Instructor,
    InstructorIdx, RequestIdx, Section, TeachingAssignment, TeachingRequest, Variable, VariableIdx,
};
pub use model::{ConflictMap, Constraint, ConstraintRef, Criterion, Model};
pub use preference::{
    combine_min_max, Preference, PreferenceCombination, PreferenceLevel, NEUTRAL, NOT_AVAILABLE_CHAR,
    PROHIBITED, REQUIRED,
};
pub use solution::Solution;
pub use time::{
    availability_pattern, BlockSource, TimeBlock, TimeLocation, DAYS_PER_WEEK, DAY_CODES, SLOTS_PER_DAY,
    SLOT_LENGTH_MIN,
};
