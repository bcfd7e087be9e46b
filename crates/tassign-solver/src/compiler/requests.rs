use std::collections::HashSet;

use super::ProblemCompiler;
use crate::error::{Result, SolverError};
use crate::model::{Constraint, Preference, PreferenceLevel, Section, TeachingRequest};
use crate::source::{ClassInstructorRecord, ClassRecord, PreferenceRecord};

/// Resolves inherited preferences of a class. For every target the most
/// specific owner wins: class, then subpart, then offering.
pub fn effective_preferences(
    class: &[PreferenceRecord],
    subpart: &[PreferenceRecord],
    offering: &[PreferenceRecord],
) -> Vec<PreferenceRecord> {
    let mut resolved: Vec<PreferenceRecord> = Vec::new();
    for level in [class, subpart, offering] {
        let owned: HashSet<i64> = resolved.iter().map(|p| p.id).collect();
        resolved.extend(level.iter().filter(|p| !owned.contains(&p.id)).cloned());
    }
    resolved
}

impl<'a> ProblemCompiler<'a> {
    pub(super) fn load_requests(&mut self) -> Result<()> {
        let snapshot = self.snapshot;
        let mut classes: Vec<&'a ClassRecord> = snapshot
            .classes
            .iter()
            .filter(|c| self.is_solved_department(c.department_id) && !c.cancelled && self.needs_assignment(c))
            .collect();
        self.check_hierarchy()?;
        classes.sort_by_key(|c| self.depth(c));
        self.with_progress(|p| p.set_phase("Loading requests...", classes.len() as u64));

        for class in classes {
            self.stop.check()?;
            self.with_progress(|p| p.inc_progress());
            self.load_request(class)?;
        }
        Ok(())
    }

    fn cycle_error(&self, class: &ClassRecord) -> SolverError {
        SolverError::InconsistentData {
            message: format!("parent chain of {} contains a cycle", self.class_label(class)),
        }
    }

    /// Fails when following `parent_id` from any class comes back to a class
    /// already visited.
    fn check_hierarchy(&self) -> Result<()> {
        for class in &self.snapshot.classes {
            let mut visited: HashSet<i64> = HashSet::new();
            visited.insert(class.id);
            let mut current = self.parent(class);
            while let Some(parent) = current {
                if !visited.insert(parent.id) {
                    return Err(self.cycle_error(class));
                }
                current = self.parent(parent);
            }
        }
        Ok(())
    }

    fn depth(&self, class: &ClassRecord) -> usize {
        let mut depth = 0;
        let mut current = class.parent_id;
        while let Some(parent) = current.and_then(|id| self.classes.get(&id)) {
            depth += 1;
            current = parent.parent_id;
            if depth > self.classes.len() {
                break;
            }
        }
        depth
    }

    fn parent(&self, class: &ClassRecord) -> Option<&'a ClassRecord> {
        class.parent_id.and_then(|id| self.classes.get(&id).copied())
    }

    fn is_to_be_included(&self, class: &ClassRecord) -> bool {
        if class.cancelled {
            return false;
        }
        if self.needs_assignment(class) {
            return true;
        }
        self.subparts
            .get(&class.subpart_id)
            .is_some_and(|s| self.common_itypes.contains(&s.itype))
    }

    /// Instructors still needed after subtracting what child classes cover.
    fn nr_instructors_needed(&self, class: &ClassRecord) -> Result<usize> {
        self.count_needed(class, &mut HashSet::new())
    }

    fn count_needed(&self, class: &ClassRecord, visited: &mut HashSet<i64>) -> Result<usize> {
        if !visited.insert(class.id) {
            return Err(self.cycle_error(class));
        }
        let mut covered = 0;
        for child in self.children.get(&class.id).into_iter().flatten() {
            covered += self.count_needed(child, visited)?;
        }
        let own = if self.needs_assignment(class) {
            self.effective_nr_instructors(class)
        } else {
            0
        };
        Ok(own.saturating_sub(covered))
    }

    fn section(&self, class: &ClassRecord, allow_overlap: bool) -> Section {
        let itype = self
            .subparts
            .get(&class.subpart_id)
            .map(|s| s.itype_desc.trim().to_string())
            .unwrap_or_default();
        Section {
            id: class.id,
            external_id: class.external_id.clone(),
            name: format!("{} {}", itype, class.section),
            section_type: itype,
            time: class.time.clone(),
            room: if class.rooms.is_empty() {
                None
            } else {
                Some(class.rooms.join(", "))
            },
            allow_overlap,
            common: !self.needs_assignment(class),
        }
    }

    fn is_to_be_ignored(&self, link: &ClassInstructorRecord, class: &ClassRecord, report: bool) -> bool {
        if link.tentative {
            return false;
        }
        if !link.lead {
            return true;
        }
        if !self.instructors.contains_key(&link.instructor_id) {
            if report {
                self.warn(format!(
                    "Instructor {} is assigned to {}, but not allowed for automatic assignment.",
                    self.instructor_name(link.instructor_id),
                    self.class_label(class)
                ));
            }
            return true;
        }
        false
    }

    fn instructor_name(&self, id: i64) -> String {
        self.instructor_records
            .get(&id)
            .map(|i| i.name.clone())
            .unwrap_or_else(|| format!("#{}", id))
    }

    /// Instructors already assigned to the class, minus those teaching child
    /// classes that need instructors of their own.
    fn assigned_instructors(&mut self, class: &ClassRecord) -> Vec<i64> {
        let mut instructors = Vec::new();
        let links = self.class_instructors.get(&class.id).cloned().unwrap_or_default();
        for link in links {
            if self.is_to_be_ignored(link, class, true) {
                continue;
            }
            if link.tentative {
                self.has_tentative = true;
            } else {
                self.has_committed = true;
            }
            instructors.push(link.instructor_id);
        }
        for child in self.children.get(&class.id).cloned().unwrap_or_default() {
            if child.cancelled || !self.needs_assignment(child) {
                continue;
            }
            for link in self.class_instructors.get(&child.id).cloned().unwrap_or_default() {
                if !self.is_to_be_ignored(link, child, false) {
                    instructors.retain(|id| *id != link.instructor_id);
                }
            }
        }
        instructors
    }

    fn load_request(&mut self, class: &'a ClassRecord) -> Result<()> {
        let needed = self.nr_instructors_needed(class)?;
        if needed == 0 {
            return Ok(());
        }
        let subpart = self.subpart(class.subpart_id)?;
        let offering = self.offering(subpart.offering_id)?;
        let course = self.course(subpart.offering_id)?;

        let mut sections = vec![self.section(class, false)];
        let mut load = self.effective_load(class).unwrap_or(0.0);
        let mut checked: HashSet<i64> = HashSet::new();
        checked.insert(class.subpart_id);
        let mut visited: HashSet<i64> = HashSet::new();
        visited.insert(class.id);
        let mut current = self.parent(class);
        while let Some(parent) = current {
            if !visited.insert(parent.id) {
                return Err(self.cycle_error(class));
            }
            checked.insert(parent.subpart_id);
            if self.is_to_be_included(parent) {
                sections.push(self.section(parent, false));
                if self.needs_assignment(parent) {
                    load += self.effective_load(parent).unwrap_or(0.0);
                }
            }
            current = self.parent(parent);
        }

        let snapshot = self.snapshot;
        for other in snapshot
            .subparts
            .iter()
            .filter(|s| s.offering_id == subpart.offering_id && s.config_id == subpart.config_id)
        {
            if checked.contains(&other.id) {
                continue;
            }
            let other_needs = other.nr_instructors.unwrap_or(0) > 0 && other.teaching_load.is_some();
            if self.common_itypes.contains(&other.itype) && !other_needs {
                let companions: Vec<&ClassRecord> =
                    snapshot.classes.iter().filter(|c| c.subpart_id == other.id).collect();
                let overlap = companions.len() > 1;
                for companion in companions {
                    sections.push(self.section(companion, overlap));
                }
            }
        }

        let mut assigned = self.assigned_instructors(class);
        if assigned.len() > needed {
            self.warn(format!(
                "There are more instructors assigned to {} than requested.",
                self.class_label(class)
            ));
        }

        let mut request = TeachingRequest::new(class.id, course, load, needed, sections);
        for pref in effective_preferences(
            &class.instructor_preferences,
            &subpart.instructor_preferences,
            &offering.instructor_preferences,
        ) {
            if let Some(instructor) = self.instructors.get(&pref.id) {
                request.instructor_preferences.push(Preference::new(*instructor, pref.level));
            }
        }
        for pref in effective_preferences(
            &class.attribute_preferences,
            &subpart.attribute_preferences,
            &offering.attribute_preferences,
        ) {
            let attribute = self.attribute(pref.id)?;
            request.attribute_preferences.push(Preference::new(attribute, pref.level));
        }
        if let Some(attribute) = self.department_attribute.get(&class.department_id) {
            request
                .attribute_preferences
                .push(Preference::new(*attribute, PreferenceLevel::Required));
        }

        let idx = self.model.add_request(request);
        let variables = self.model.requests[idx].variables.clone();
        for &variable in &variables {
            while !assigned.is_empty() {
                let id = assigned.remove(0);
                match self.instructors.get(&id) {
                    Some(instructor) => {
                        self.model.variables[variable].initial = Some(*instructor);
                        break;
                    }
                    None => self.warn(format!(
                        "Instructor {} is assigned to {}, but not allowed for automatic assignment.",
                        self.instructor_name(id),
                        self.class_label(class)
                    )),
                }
            }
        }

        if needed > 1 {
            self.model.add_constraint(Constraint {
                id: class.id,
                name: self.class_label(class),
                variables,
            });
        }
        Ok(())
    }
}
