#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tassign_solver::config::Properties;
use tassign_solver::engine::GreedyEngine;
use tassign_solver::error::Result;
use tassign_solver::model::{PreferenceLevel, TimeLocation};
use tassign_solver::session::{SessionServices, SessionState, SolverSession};
use tassign_solver::source::{
    ClassInstructorRecord, ClassRecord, DataSource, DepartmentRecord, InstructorRecord, MemorySource,
    OfferingRecord, ProblemSnapshot, SubpartRecord,
};

pub const MWF: u8 = 64 | 16 | 4;
pub const TTH: u8 = 32 | 8;

/// Source whose snapshot can be replaced between loads.
#[derive(Default)]
pub struct SwappableSource {
    snapshot: Mutex<ProblemSnapshot>,
}

impl SwappableSource {
    pub fn new(snapshot: ProblemSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }

    pub fn replace(&self, snapshot: ProblemSnapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }
}

impl DataSource for SwappableSource {
    fn snapshot(&self, properties: &Properties) -> Result<ProblemSnapshot> {
        MemorySource::new(self.snapshot.lock().unwrap().clone()).snapshot(properties)
    }
}

pub fn instructor(id: i64, name: &str) -> InstructorRecord {
    InstructorRecord {
        id,
        external_id: Some(format!("{:04}", id)),
        name: name.to_string(),
        department_id: 1,
        teaching_preference: PreferenceLevel::Neutral,
        max_load: 12.0,
        attributes: Vec::new(),
        course_preferences: Vec::new(),
        time_preferences: Vec::new(),
        distribution_preferences: Vec::new(),
    }
}

pub fn offering(id: i64, course_name: &str, subject_area_id: i64) -> OfferingRecord {
    OfferingRecord {
        id,
        course_name: course_name.to_string(),
        subject_area_id: Some(subject_area_id),
        instructor_preferences: Vec::new(),
        attribute_preferences: Vec::new(),
    }
}

pub fn subpart(id: i64, offering_id: i64, nr_instructors: usize, load: f32) -> SubpartRecord {
    SubpartRecord {
        id,
        offering_id,
        config_id: offering_id,
        itype: "lec".to_string(),
        itype_desc: "Lec".to_string(),
        nr_instructors: Some(nr_instructors),
        teaching_load: Some(load),
        instructor_preferences: Vec::new(),
        attribute_preferences: Vec::new(),
    }
}

pub fn class(id: i64, subpart_id: i64, time: TimeLocation) -> ClassRecord {
    ClassRecord {
        id,
        subpart_id,
        parent_id: None,
        external_id: Some(format!("C{}", id)),
        section: "1".to_string(),
        cancelled: false,
        nr_instructors: None,
        teaching_load: None,
        department_id: 1,
        time: Some(time),
        rooms: vec!["MATH 175".to_string()],
        instructor_preferences: Vec::new(),
        attribute_preferences: Vec::new(),
    }
}

pub fn lead(class_id: i64, instructor_id: i64) -> ClassInstructorRecord {
    ClassInstructorRecord {
        class_id,
        instructor_id,
        lead: true,
        tentative: false,
    }
}

/// Three instructors, MATH 101 needing two of them and ENGL 106 already
/// taught by Bob. Three variables in total.
pub fn snapshot() -> ProblemSnapshot {
    ProblemSnapshot {
        session_id: Some(1),
        departments: vec![DepartmentRecord {
            id: 1,
            code: "MATH".to_string(),
            name: "Mathematics".to_string(),
            solver_group_id: Some(1),
        }],
        instructors: vec![instructor(1, "Ada"), instructor(2, "Bob"), instructor(3, "Cy")],
        offerings: vec![offering(100, "MATH 101", 5), offering(101, "ENGL 106", 6)],
        subparts: vec![subpart(200, 100, 2, 3.0), subpart(201, 101, 1, 2.0)],
        classes: vec![
            class(300, 200, TimeLocation::new(MWF, 102, 12)),
            class(301, 201, TimeLocation::new(TTH, 102, 18)),
        ],
        class_instructors: vec![lead(301, 2)],
        ..Default::default()
    }
}

pub fn config() -> Properties {
    let mut config = Properties::new();
    config.set("General.SessionId", 1);
    config.set("General.SolverGroupId", 1);
    config
}

pub fn services(source: Arc<dyn DataSource>) -> SessionServices {
    SessionServices::new(source, Arc::new(GreedyEngine::new()))
}

pub fn session(owner: &str) -> SolverSession {
    SolverSession::new(owner, services(Arc::new(MemorySource::new(snapshot()))))
}

/// Loads the fixture and waits for the compiler.
pub fn loaded(owner: &str) -> SolverSession {
    let session = session(owner);
    session.load(&config()).unwrap();
    session.wait();
    assert_eq!(session.state(), SessionState::Ready);
    session
}

/// Loads and solves the fixture.
pub fn solved(owner: &str) -> SolverSession {
    let session = loaded(owner);
    session.start().unwrap();
    session.wait();
    assert_eq!(session.state(), SessionState::Ready);
    session
}
