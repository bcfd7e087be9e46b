//! Access to the relational source data.

mod records;

use std::fs;
use std::path::{Path, PathBuf};

pub use records::{
    AttributeRecord, AttributeTypeRecord, ClassInstructorRecord, ClassRecord, DepartmentRecord,
    DistributionRecord, EnrollmentRecord, InstructorRecord, OfferingRecord, PreferenceRecord,
    ProblemSnapshot, SubpartRecord, TimeGridRecord,
};

use crate::config::Properties;
use crate::error::{Result, SolverError};

/// Read access to the relational store.
pub trait DataSource: Send + Sync {
    /// Reads every record the compiler needs for the configured session.
    fn snapshot(&self, properties: &Properties) -> Result<ProblemSnapshot>;
}

/// In-process snapshot, handed out as a copy.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    snapshot: ProblemSnapshot,
}

impl MemorySource {
    pub fn new(snapshot: ProblemSnapshot) -> Self {
        Self { snapshot }
    }
}

impl DataSource for MemorySource {
    fn snapshot(&self, properties: &Properties) -> Result<ProblemSnapshot> {
        check_session(&self.snapshot, properties)?;
        Ok(self.snapshot.clone())
    }
}

/// Snapshot stored as a JSON document, read on every load.
#[derive(Debug, Clone)]
pub struct JsonSource {
    path: PathBuf,
}

impl JsonSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl DataSource for JsonSource {
    fn snapshot(&self, properties: &Properties) -> Result<ProblemSnapshot> {
        log::debug!("Reading snapshot from {}", self.path.display());
        let contents = fs::read_to_string(&self.path)
            .map_err(|e| SolverError::Source(format!("Failed to read {}: {}", self.path.display(), e)))?;
        let snapshot: ProblemSnapshot = serde_json::from_str(&contents)
            .map_err(|e| SolverError::Source(format!("Failed to parse {}: {}", self.path.display(), e)))?;
        check_session(&snapshot, properties)?;
        Ok(snapshot)
    }
}

fn check_session(snapshot: &ProblemSnapshot, properties: &Properties) -> Result<()> {
    match (snapshot.session_id, properties.get_i64("General.SessionId")) {
        (Some(have), Some(want)) if have != want => Err(SolverError::Source(format!(
            "snapshot belongs to session {}, not {}",
            have, want
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_json_source_reads_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        fs::write(
            &path,
            r#"{
                "session-id": 7,
                "departments": [{"id": 1, "code": "MATH", "solver-group-id": 3}],
                "instructors": [{"id": 10, "name": "Ada", "department-id": 1, "max-load": 6.0}]
            }"#,
        )
        .unwrap();

        let source = JsonSource::new(&path);
        let snapshot = source.snapshot(&Properties::new()).unwrap();
        assert_eq!(snapshot.departments.len(), 1);
        assert_eq!(snapshot.instructors[0].max_load, 6.0);
        assert!(snapshot.classes.is_empty());
    }

    #[test]
    fn test_session_mismatch_is_source_error() {
        let source = MemorySource::new(ProblemSnapshot {
            session_id: Some(7),
            ..Default::default()
        });
        let mut props = Properties::new();
        props.set("General.SessionId", 8);
        assert!(matches!(source.snapshot(&props), Err(SolverError::Source(_))));
        props.set("General.SessionId", 7);
        assert!(source.snapshot(&props).is_ok());
    }

    #[test]
    fn test_missing_file_is_source_error() {
        let dir = TempDir::new().unwrap();
        let source = JsonSource::new(dir.path().join("missing.json"));
        assert!(matches!(source.snapshot(&Properties::new()), Err(SolverError::Source(_))));
    }
}
