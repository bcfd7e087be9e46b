//! Backup, restore, export and passivation of a session.

use std::path::{Path, PathBuf};

use chrono::Utc;

use indexmap::IndexMap;

use super::{lock, read, write, PassivatedSnapshot, SessionState, Slot, SolverSession, AWAITING_COMMANDS};
use crate::backup::{BackupDocument, BackupStore, ExportOptions, BACKUP_TYPE};
use crate::config::{default_properties, Properties, SessionSettings};
use crate::error::{Result, SolverError};
use crate::model::Solution;

impl PassivatedSnapshot {
    fn is_at(&self, folder: &Path, id: &str) -> bool {
        self.folder == folder && self.id == id
    }

    /// Removes the passivation file; the snapshot is no longer needed.
    pub(super) fn discard(&self) {
        if let Err(e) = BackupStore::new(&self.folder).remove(BACKUP_TYPE, &self.id) {
            log::warn!("Failed to remove passivated session {}: {}", self.id, e);
        }
    }
}

impl SessionSettings {
    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            names: self.export_names,
            convert_ids: self.export_convert_ids,
            configuration: self.export_configuration,
        }
    }
}

fn read_document(folder: &Path, id: &str) -> Result<BackupDocument> {
    let data = BackupStore::new(folder)
        .read(BACKUP_TYPE, id)
        .map_err(|e| SolverError::Persistence(format!("unable to read backup {}: {}", id, e)))?
        .ok_or_else(|| SolverError::Persistence(format!("no backup {} in {}", id, folder.display())))?;
    BackupDocument::from_slice(&data)
}

/// A serialized live session waiting to be swapped out.
struct PendingPassivation {
    data: Vec<u8>,
    revision: u64,
    current_info: IndexMap<String, String>,
    best_info: Option<IndexMap<String, String>>,
}

fn write_document(folder: &Path, id: &str, data: &[u8]) -> Result<PathBuf> {
    BackupStore::new(folder)
        .write(BACKUP_TYPE, id, data)
        .map_err(|e| SolverError::Persistence(format!("unable to write backup {}: {}", id, e)))
}

impl SolverSession {
    /// Writes one backup document for `id` into `folder`, replacing any
    /// previous one. Nothing is left behind on failure.
    pub fn backup(&self, folder: &Path, id: &str) -> Result<PathBuf> {
        let data = self.with_live("backup", |solution| {
            let properties = read(&self.inner.properties);
            let progress = lock(&self.inner.progress).clone();
            BackupDocument::capture(solution, &properties, Some(&progress)).to_bytes()
        })??;
        let path = write_document(folder, id, &data)?;
        log::info!("Backup of {} written to {}", self.inner.owner, path.display());
        Ok(path)
    }

    /// Replaces the session content with a backup document.
    ///
    /// Running work is stopped first. On failure the session is disposed.
    pub fn restore(&self, folder: &Path, id: &str, remove_files: bool) -> Result<()> {
        let _activation = self.inner.passivation.lock();
        if self.state() == SessionState::Disposed {
            return Err(SolverError::Disposed);
        }
        self.interrupt();
        self.wait();

        let restored = read_document(folder, id).and_then(BackupDocument::into_solution);
        let (solution, properties, progress) = match restored {
            Ok(restored) => restored,
            Err(e) => {
                self.inner
                    .with_progress(|p| p.fatal(format!("Unable to restore backup {}: {}", id, e)));
                self.dispose();
                return Err(e);
            }
        };

        self.install(solution, &properties, folder, id)?;
        *lock(&self.inner.loaded) = Some(Utc::now());
        self.inner.with_progress(|p| {
            p.clear();
            if let Some(previous) = &progress {
                p.replay(previous);
            }
            p.stage("Restoring from backup ...");
            p.set_status(AWAITING_COMMANDS);
        });
        if remove_files {
            if let Err(e) = BackupStore::new(folder).remove(BACKUP_TYPE, id) {
                log::warn!("Failed to remove backup {}: {}", id, e);
            }
        }
        log::info!("Session {} restored from {}", self.inner.owner, folder.display());
        Ok(())
    }

    /// Export document using the application export settings.
    pub fn export(&self) -> Result<Vec<u8>> {
        self.export_with(self.settings().export_options())
    }

    pub fn export_with(&self, options: ExportOptions) -> Result<Vec<u8>> {
        self.with_live("export", |solution| {
            let properties = read(&self.inner.properties);
            BackupDocument::export(solution, &properties, options).to_bytes()
        })?
    }

    /// Backs the session up and frees its model.
    ///
    /// Returns `Ok(false)` when there is no ready model to passivate, or when
    /// the session changed while the file was written. A failed backup
    /// leaves the session live.
    pub fn passivate(&self, folder: &Path, id: &str) -> Result<bool> {
        let _activation = self.inner.passivation.lock();
        let Some(pending) = self.prepare_passivation()? else {
            return Ok(false);
        };
        let path = write_document(folder, id, &pending.data)?;
        self.complete_passivation(folder, id, &path, pending)
    }

    /// Serializes the live solution while it is ready and idle.
    fn prepare_passivation(&self) -> Result<Option<PendingPassivation>> {
        let state = lock(&self.inner.state);
        match *state {
            SessionState::Ready => {}
            SessionState::Disposed => return Err(SolverError::Disposed),
            _ => return Ok(None),
        }
        if lock(&self.inner.worker).as_ref().is_some_and(|w| !w.is_finished()) {
            return Ok(None);
        }
        let slot = read(&self.inner.solution);
        let Slot::Live(solution) = &*slot else {
            return Ok(None);
        };
        let properties = read(&self.inner.properties);
        let progress = lock(&self.inner.progress).clone();
        Ok(Some(PendingPassivation {
            data: BackupDocument::capture(solution, &properties, Some(&progress)).to_bytes()?,
            revision: self.inner.revision(),
            current_info: solution.current_info(),
            best_info: solution.best_info(),
        }))
    }

    /// Swaps the passivated snapshot in, unless the session moved on since
    /// `pending` was taken. In that case the written file is removed.
    fn complete_passivation(&self, folder: &Path, id: &str, path: &Path, pending: PendingPassivation) -> Result<bool> {
        let mut state = lock(&self.inner.state);
        let worker_running = lock(&self.inner.worker).as_ref().is_some_and(|w| !w.is_finished());
        if *state != SessionState::Ready || worker_running || self.inner.revision() != pending.revision {
            let disposed = *state == SessionState::Disposed;
            drop(state);
            log::debug!("Session {} changed while passivating, keeping it live", self.inner.owner);
            if let Err(e) = BackupStore::new(folder).remove(BACKUP_TYPE, id) {
                log::warn!("Failed to remove passivated session {}: {}", id, e);
            }
            return if disposed { Err(SolverError::Disposed) } else { Ok(false) };
        }

        let mut progress = lock(&self.inner.progress).progress_map();
        progress.insert("STATUS".to_string(), "Passivated".to_string());
        *write(&self.inner.solution) = Slot::Passivated(Box::new(PassivatedSnapshot {
            folder: folder.to_path_buf(),
            id: id.to_string(),
            progress,
            current_info: pending.current_info,
            best_info: pending.best_info,
        }));
        *state = SessionState::Passivated;
        log::info!("Session {} passivated to {}", self.inner.owner, path.display());
        Ok(true)
    }

    /// Passivates when the idle threshold elapsed and nothing is running.
    pub fn passivate_if_needed(&self, folder: &Path, id: &str) -> Result<bool> {
        if !self.inner.passivation.is_idle() || self.state() != SessionState::Ready || self.is_working() {
            return Ok(false);
        }
        self.passivate(folder, id)
    }

    /// Brings a passivated session back. Concurrent callers wait for the
    /// first one and do not restore again.
    pub fn activate_if_needed(&self) -> Result<bool> {
        self.inner.passivation.touch();
        match self.state() {
            SessionState::Passivated => {}
            SessionState::Disposed => return Err(SolverError::Disposed),
            _ => return Ok(false),
        }

        let _activation = self.inner.passivation.lock();
        let location = {
            let state = lock(&self.inner.state);
            match *state {
                SessionState::Passivated => {}
                SessionState::Disposed => return Err(SolverError::Disposed),
                _ => return Ok(false),
            }
            match &*read(&self.inner.solution) {
                Slot::Passivated(snapshot) => (snapshot.folder.clone(), snapshot.id.clone()),
                _ => return Ok(false),
            }
        };
        let (folder, id) = location;

        log::info!("Activating session {}", self.inner.owner);
        match read_document(&folder, &id).and_then(BackupDocument::into_solution) {
            Ok((solution, properties, _)) => {
                self.install(solution, &properties, &folder, &id)?;
                if let Err(e) = BackupStore::new(&folder).remove(BACKUP_TYPE, &id) {
                    log::warn!("Failed to remove passivated session {}: {}", id, e);
                }
                self.inner.passivation.record_activation();
                self.inner.with_progress(|p| p.debug("Session activated."));
                Ok(true)
            }
            Err(e) => {
                self.inner
                    .with_progress(|p| p.fatal(format!("Unable to activate session: {}", e)));
                self.dispose_with(true);
                Err(e)
            }
        }
    }

    /// Puts a restored solution in place and marks the session ready.
    fn install(&self, solution: Solution, properties: &Properties, folder: &Path, id: &str) -> Result<()> {
        let previous = {
            let mut state = lock(&self.inner.state);
            if *state == SessionState::Disposed {
                return Err(SolverError::Disposed);
            }
            let previous = std::mem::replace(&mut *self.inner.solution_mut(), Slot::Live(Box::new(solution)));
            let mut merged = default_properties();
            merged.extend(properties);
            *self.inner.properties_mut() = merged;
            *state = SessionState::Ready;
            previous
        };
        if let Slot::Passivated(snapshot) = previous {
            if !snapshot.is_at(folder, id) {
                snapshot.discard();
            }
        }
        Ok(())
    }
}
