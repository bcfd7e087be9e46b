//! Self-describing backup documents of a model, its assignment and the
//! solver configuration.

mod store;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use store::{BackupEntry, BackupStore};

use crate::config::Properties;
use crate::error::{Result, SolverError};
use crate::model::{Assignment, BestSnapshot, InstructorIdx, Model, Solution};
use crate::progress::Progress;

/// Type prefix of backup files written by solver sessions.
pub const BACKUP_TYPE: &str = "tassign";
/// Current document format version.
pub const DOCUMENT_VERSION: u32 = 1;

/// Toggles for documents leaving the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    /// Keep names and external ids.
    pub names: bool,
    /// Renumber internal identifiers.
    pub convert_ids: bool,
    /// Include the configuration block.
    pub configuration: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            names: true,
            convert_ids: false,
            configuration: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AssignmentSection {
    pub current: Vec<Option<InstructorIdx>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best: Option<BestSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BackupDocument {
    pub version: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub created: DateTime<Utc>,
    pub model: Model,
    pub assignment: AssignmentSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Properties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
}

impl BackupDocument {
    /// Full backup: everything needed to rebuild the session.
    pub fn capture(solution: &Solution, properties: &Properties, progress: Option<&Progress>) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            kind: BACKUP_TYPE.to_string(),
            created: Utc::now(),
            model: solution.model.clone(),
            assignment: AssignmentSection {
                current: solution.assignment.values().to_vec(),
                best: solution.assignment.best().cloned(),
            },
            configuration: Some(properties.clone()),
            progress: progress.cloned(),
        }
    }

    /// Export document; never carries the progress log.
    pub fn export(solution: &Solution, properties: &Properties, options: ExportOptions) -> Self {
        let mut document = Self::capture(solution, properties, None);
        if !options.names {
            anonymize(&mut document.model);
            if let Some(configuration) = document.configuration.as_mut() {
                configuration.remove("General.OwnerPuid");
            }
        }
        if options.convert_ids {
            convert_ids(&mut document.model);
        }
        if !options.configuration {
            document.configuration = None;
        }
        document
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let document: BackupDocument = serde_json::from_slice(data)?;
        if document.kind != BACKUP_TYPE {
            return Err(SolverError::Persistence(format!(
                "document type {} is not {}",
                document.kind, BACKUP_TYPE
            )));
        }
        if document.version > DOCUMENT_VERSION {
            return Err(SolverError::Persistence(format!(
                "document version {} is not supported",
                document.version
            )));
        }
        Ok(document)
    }

    /// Rebuilds the solution, checking that the assignment fits the model.
    pub fn into_solution(self) -> Result<(Solution, Properties, Option<Progress>)> {
        let mut model = self.model;
        let nr_variables = model.variables.len();
        let nr_instructors = model.instructors.len();
        let check = |values: &[Option<InstructorIdx>], what: &str| -> Result<()> {
            if values.len() != nr_variables {
                return Err(SolverError::Persistence(format!(
                    "{} assignment has {} values for {} variables",
                    what,
                    values.len(),
                    nr_variables
                )));
            }
            if values.iter().flatten().any(|i| *i >= nr_instructors) {
                return Err(SolverError::Persistence(format!("{} assignment refers to an unknown instructor", what)));
            }
            Ok(())
        };
        check(&self.assignment.current, "current")?;
        if let Some(best) = &self.assignment.best {
            check(&best.values, "best")?;
        }
        for request in &model.requests {
            if request.course >= model.courses.len() || request.variables.iter().any(|v| *v >= nr_variables) {
                return Err(SolverError::Persistence(format!("request {} is inconsistent", request.id)));
            }
        }

        model.rebuild_indexes();
        let assignment = Assignment::from_parts(self.assignment.current, self.assignment.best);
        let properties = self.configuration.unwrap_or_default();
        Ok((Solution::with_assignment(model, assignment), properties, self.progress))
    }
}

/// Replaces identifying names and drops external ids.
fn anonymize(model: &mut Model) {
    for (i, instructor) in model.instructors.iter_mut().enumerate() {
        instructor.name = format!("Instructor {}", i + 1);
        instructor.external_id = None;
        for block in instructor.time_preferences.iter_mut() {
            if let Some(source) = block.source.as_mut() {
                source.label = "Not available".to_string();
            }
        }
    }
    for (i, course) in model.courses.iter_mut().enumerate() {
        course.name = format!("Course {}", i + 1);
    }
    for (i, attribute) in model.attributes.iter_mut().enumerate() {
        attribute.name = format!("Attribute {}", i + 1);
    }
    for request in model.requests.iter_mut() {
        for section in request.sections.iter_mut() {
            section.external_id = None;
            section.room = None;
        }
    }
    for (i, constraint) in model.constraints.iter_mut().enumerate() {
        constraint.name = format!("Request {}", i + 1);
    }
}

/// Renumbers ids from 1 per entity kind. Requests, sections, constraints and
/// unavailability sources share the class numbering.
fn convert_ids(model: &mut Model) {
    fn renumber(ids: &mut HashMap<i64, i64>, id: i64) -> i64 {
        let next = ids.len() as i64 + 1;
        *ids.entry(id).or_insert(next)
    }

    let mut classes = HashMap::new();
    for request in model.requests.iter_mut() {
        request.id = renumber(&mut classes, request.id);
        for section in request.sections.iter_mut() {
            section.id = renumber(&mut classes, section.id);
        }
    }
    for constraint in model.constraints.iter_mut() {
        constraint.id = renumber(&mut classes, constraint.id);
    }
    for (i, instructor) in model.instructors.iter_mut().enumerate() {
        instructor.id = i as i64 + 1;
        for block in instructor.time_preferences.iter_mut() {
            if let Some(source) = block.source.as_mut() {
                source.class_id = renumber(&mut classes, source.class_id);
            }
        }
    }
    for (i, course) in model.courses.iter_mut().enumerate() {
        course.id = i as i64 + 1;
        course.subject_area_id = None;
    }
    for (i, attribute) in model.attributes.iter_mut().enumerate() {
        attribute.id = i as i64 + 1;
    }
    for (i, attribute_type) in model.attribute_types.iter_mut().enumerate() {
        attribute_type.id = i as i64 + 1;
    }
}
