use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::Properties;
use crate::error::Result;
use crate::model::Solution;

/// One saved instructor assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedAssignment {
    /// Id of the teaching request (the class).
    pub request: i64,
    /// Position among the request's instructors.
    pub index: usize,
    /// Id of the instructor.
    pub instructor: i64,
}

/// Persists the current assignment of a solution back to the store.
pub trait SolutionSaver: Send + Sync {
    fn save(&self, solution: &Solution, properties: &Properties) -> Result<usize>;
}

/// Writes the current assignment as a JSON list.
#[derive(Debug, Clone)]
pub struct JsonSolutionSaver {
    path: PathBuf,
}

impl JsonSolutionSaver {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn records(solution: &Solution) -> Vec<SavedAssignment> {
        solution
            .assignment
            .assigned()
            .map(|value| {
                let variable = &solution.model.variables[value.variable];
                SavedAssignment {
                    request: solution.model.requests[variable.request].id,
                    index: variable.index,
                    instructor: solution.model.instructors[value.instructor].id,
                }
            })
            .collect()
    }
}

impl SolutionSaver for JsonSolutionSaver {
    fn save(&self, solution: &Solution, properties: &Properties) -> Result<usize> {
        let records = Self::records(solution);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(&records)?)?;
        log::info!(
            "Saved {} assignments to {} (commit: {})",
            records.len(),
            self.path.display(),
            properties.get_bool("Save.Commit", false)
        );
        Ok(records.len())
    }
}
