//! Lifecycle of one solver session.
//!
//! A session owns one [`Solution`] behind a read/write lock and runs at most
//! one background worker at a time. Locks are always taken in the order
//! activation, state, solution, properties; the progress log and the
//! last-used timestamp are leaves and never held while taking another lock.

mod passivation;
mod persist;
mod query;
mod registry;
mod worker;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

pub use passivation::PassivationManager;
pub use query::{
    AttributeInfo, InstructorInfo, PreferenceInfo, RequestFilter, SectionInfo, TeachingRequestInfo,
    TimePreferenceInfo,
};
pub use registry::SessionRegistry;
pub use worker::WorkKind;

use crate::compiler::ProblemCompiler;
use crate::config::{default_properties, Properties, SessionSettings};
use crate::engine::{SearchContext, SolutionAccess, SolverEngine, StopToken};
use crate::error::{Result, SolverError};
use crate::model::Solution;
use crate::progress::{MessageLevel, Progress, ProgressMessage};
use crate::saver::SolutionSaver;
use crate::source::DataSource;
use worker::Worker;

const AWAITING_COMMANDS: &str = "Awaiting commands ...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    Empty,
    Loading,
    Ready,
    Solving,
    Saving,
    Passivated,
    Disposed,
}

impl SessionState {
    /// A background worker owns the session in this state.
    pub fn is_working(&self) -> bool {
        matches!(self, SessionState::Loading | SessionState::Solving | SessionState::Saving)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Collaborators shared by the sessions of one application.
#[derive(Clone)]
pub struct SessionServices {
    pub source: Arc<dyn DataSource>,
    pub engine: Arc<dyn SolverEngine>,
    pub saver: Option<Arc<dyn SolutionSaver>>,
    pub settings: SessionSettings,
    /// Idle time after which sessions may be passivated; `None` disables it.
    pub idle_threshold: Option<Duration>,
}

impl SessionServices {
    pub fn new(source: Arc<dyn DataSource>, engine: Arc<dyn SolverEngine>) -> Self {
        Self {
            source,
            engine,
            saver: None,
            settings: SessionSettings::default(),
            idle_threshold: SessionSettings::default().idle_threshold(),
        }
    }

    pub fn with_saver(mut self, saver: Arc<dyn SolutionSaver>) -> Self {
        self.saver = Some(saver);
        self
    }

    /// Replaces the settings; the idle threshold follows `passivation-time`.
    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.idle_threshold = settings.idle_threshold();
        self.settings = settings;
        self
    }

    /// Overrides the idle threshold derived from the settings.
    pub fn with_idle_threshold(mut self, threshold: Option<Duration>) -> Self {
        self.idle_threshold = threshold;
        self
    }
}

/// What a passivated session keeps in memory.
#[derive(Debug, Clone)]
struct PassivatedSnapshot {
    folder: PathBuf,
    id: String,
    progress: IndexMap<String, String>,
    current_info: IndexMap<String, String>,
    best_info: Option<IndexMap<String, String>>,
}

/// The model and assignment, swapped as one unit.
#[derive(Debug, Default)]
enum Slot {
    #[default]
    Empty,
    Live(Box<Solution>),
    Passivated(Box<PassivatedSnapshot>),
}

type DisposeListener = Box<dyn Fn(&SolverSession) + Send + Sync>;

struct SessionInner {
    owner: String,
    services: SessionServices,
    state: Mutex<SessionState>,
    solution: RwLock<Slot>,
    properties: RwLock<Properties>,
    /// Bumped whenever the solution or the properties may have changed.
    revision: AtomicU64,
    progress: Mutex<Progress>,
    passivation: PassivationManager,
    worker: Mutex<Option<Worker>>,
    loaded: Mutex<Option<DateTime<Utc>>>,
    listeners: Mutex<Vec<DisposeListener>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl SessionInner {
    fn solution_mut(&self) -> RwLockWriteGuard<'_, Slot> {
        let slot = write(&self.solution);
        self.revision.fetch_add(1, Ordering::AcqRel);
        slot
    }

    fn properties_mut(&self) -> RwLockWriteGuard<'_, Properties> {
        let properties = write(&self.properties);
        self.revision.fetch_add(1, Ordering::AcqRel);
        properties
    }

    fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    fn with_progress(&self, f: impl FnOnce(&mut Progress)) {
        f(&mut lock(&self.progress));
    }

    /// Moves from `from` to `to`; false when the state changed meanwhile.
    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        let mut state = lock(&self.state);
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }
}

impl SolutionAccess for SessionInner {
    fn with_solution_mut(&self, f: &mut dyn FnMut(&mut Solution)) -> Result<()> {
        match &mut *self.solution_mut() {
            Slot::Live(solution) => {
                f(solution);
                Ok(())
            }
            _ => Err(SolverError::Disposed),
        }
    }
}

/// A long-lived instructor scheduling session.
///
/// Cloning is cheap; clones share the same session.
#[derive(Clone)]
pub struct SolverSession {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for SolverSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolverSession")
            .field("owner", &self.inner.owner)
            .field("state", &self.state())
            .finish()
    }
}

impl SolverSession {
    pub fn new(owner: impl Into<String>, services: SessionServices) -> Self {
        let passivation = PassivationManager::new(services.idle_threshold);
        let mut progress = Progress::new();
        progress.set_status(AWAITING_COMMANDS);
        Self {
            inner: Arc::new(SessionInner {
                owner: owner.into(),
                services,
                state: Mutex::new(SessionState::Empty),
                solution: RwLock::new(Slot::Empty),
                properties: RwLock::new(default_properties()),
                revision: AtomicU64::new(0),
                progress: Mutex::new(progress),
                passivation,
                worker: Mutex::new(None),
                loaded: Mutex::new(None),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn owner(&self) -> &str {
        &self.inner.owner
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.services.settings
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.inner.state)
    }

    pub fn is_passivated(&self) -> bool {
        self.state() == SessionState::Passivated
    }

    /// Whether a background worker is still running.
    pub fn is_working(&self) -> bool {
        lock(&self.inner.worker).as_ref().is_some_and(|w| !w.is_finished())
    }

    pub fn ptr_eq(&self, other: &SolverSession) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn properties(&self) -> Properties {
        read(&self.inner.properties).clone()
    }

    pub fn set_properties(&self, properties: &Properties) -> Result<()> {
        self.activate_if_needed()?;
        self.inner.properties_mut().extend(properties);
        Ok(())
    }

    pub fn loaded_date(&self) -> Option<DateTime<Utc>> {
        *lock(&self.inner.loaded)
    }

    pub fn last_used(&self) -> Instant {
        self.inner.passivation.last_used()
    }

    pub fn time_from_last_used(&self) -> Duration {
        self.inner.passivation.time_from_last_used()
    }

    /// Number of times the session was brought back from passivation.
    pub fn activation_count(&self) -> usize {
        self.inner.passivation.activations()
    }

    pub fn add_dispose_listener(&self, listener: impl Fn(&SolverSession) + Send + Sync + 'static) {
        lock(&self.inner.listeners).push(Box::new(listener));
    }

    /// Starts compiling a fresh model in the background.
    ///
    /// Compilation failures never surface here: they are recorded in the
    /// progress log and the session ends up disposed.
    pub fn load(&self, config: &Properties) -> Result<()> {
        self.inner.passivation.touch();
        {
            let mut state = lock(&self.inner.state);
            let current = *state;
            match current {
                SessionState::Disposed => return Err(SolverError::Disposed),
                s if s.is_working() => return Err(SolverError::Busy),
                _ => *state = SessionState::Loading,
            }
        }

        let previous = std::mem::take(&mut *self.inner.solution_mut());
        if let Slot::Passivated(snapshot) = previous {
            snapshot.discard();
        }

        let properties = self.session_properties(config);
        *self.inner.properties_mut() = properties.clone();
        *lock(&self.inner.loaded) = None;
        self.inner.with_progress(|p| {
            p.clear();
            p.set_status("Loading input data ...");
        });

        log::info!("Loading session {}", self.inner.owner);
        let spawned = self.spawn(WorkKind::Load, move |session, stop| session.run_load(properties, stop, false));
        if spawned.is_err() {
            self.inner.transition(SessionState::Loading, SessionState::Empty);
        }
        spawned
    }

    /// Rebuilds the model from fresh source data and swaps it in as one unit.
    ///
    /// Behaves as [`SolverSession::load`] when nothing was loaded yet. The
    /// progress log is kept and a failed reload keeps the previous model.
    pub fn reload(&self, config: &Properties) -> Result<()> {
        self.activate_if_needed()?;
        {
            let mut state = lock(&self.inner.state);
            let current = *state;
            match current {
                SessionState::Empty => {
                    drop(state);
                    return self.load(config);
                }
                SessionState::Ready => *state = SessionState::Loading,
                SessionState::Disposed => return Err(SolverError::Disposed),
                s if s.is_working() => return Err(SolverError::Busy),
                s => {
                    return Err(SolverError::InvalidState {
                        operation: "reload",
                        state: s,
                    })
                }
            }
        }

        let properties = self.session_properties(config);
        *self.inner.properties_mut() = properties.clone();
        self.inner.with_progress(|p| p.set_status("Reloading input data ..."));

        log::info!("Reloading session {}", self.inner.owner);
        let spawned = self.spawn(WorkKind::Reload, move |session, stop| session.run_load(properties, stop, true));
        if spawned.is_err() {
            self.inner.transition(SessionState::Loading, SessionState::Ready);
        }
        spawned
    }

    /// Defaults overridden by `config`, tagged with the owner.
    fn session_properties(&self, config: &Properties) -> Properties {
        let mut properties = default_properties();
        properties.extend(config);
        if !properties.contains("General.OwnerPuid") {
            properties.set("General.OwnerPuid", &self.inner.owner);
        }
        properties
    }

    fn run_load(&self, properties: Properties, stop: StopToken, reload: bool) {
        let inner = &self.inner;
        let compiled = inner.services.source.snapshot(&properties).and_then(|snapshot| {
            let mut commit = Properties::new();
            let solution = ProblemCompiler::new(
                &snapshot,
                &properties,
                &inner.progress,
                &stop,
                inner.services.engine.as_ref(),
            )
            .compile(&mut commit)?;
            Ok((solution, commit))
        });

        match compiled {
            Ok((solution, commit)) => {
                let start = !reload && properties.get_bool("General.StartSolver", false);
                {
                    let mut state = lock(&inner.state);
                    if *state != SessionState::Loading {
                        log::debug!("Discarding compiled model, session is {}", *state);
                        return;
                    }
                    *inner.solution_mut() = Slot::Live(Box::new(solution));
                    inner.properties_mut().extend(&commit);
                    *state = if start {
                        SessionState::Solving
                    } else {
                        SessionState::Ready
                    };
                }
                *lock(&inner.loaded) = Some(Utc::now());
                inner.with_progress(|p| {
                    p.stage(if reload { "Reloading done." } else { "Loading done." });
                    p.set_status(AWAITING_COMMANDS);
                });
                if start {
                    self.run_search(stop);
                }
            }
            Err(SolverError::Interrupted) => {
                inner.with_progress(|p| {
                    p.warn("Loading interrupted.");
                    p.set_status(AWAITING_COMMANDS);
                });
                let back = if reload {
                    SessionState::Ready
                } else {
                    SessionState::Empty
                };
                inner.transition(SessionState::Loading, back);
            }
            Err(e) => {
                inner.with_progress(|p| p.fatal(format!("Unable to load input data, reason: {}", e)));
                if reload {
                    inner.with_progress(|p| p.set_status(AWAITING_COMMANDS));
                    inner.transition(SessionState::Loading, SessionState::Ready);
                } else {
                    self.dispose();
                }
            }
        }
    }

    /// Starts the search in the background.
    pub fn start(&self) -> Result<()> {
        self.activate_if_needed()?;
        self.begin("start", SessionState::Solving)?;
        log::info!("Starting solver of session {}", self.inner.owner);
        let spawned = self.spawn(WorkKind::Solve, |session, stop| session.run_search(stop));
        if spawned.is_err() {
            self.inner.transition(SessionState::Solving, SessionState::Ready);
        }
        spawned
    }

    fn run_search(&self, stop: StopToken) {
        let inner = &self.inner;
        let properties = self.properties();
        inner.with_progress(|p| p.set_status("Solving problem ..."));

        let context = SearchContext::new(&properties, &stop, &inner.progress, &**inner);
        match inner.services.engine.search(&context) {
            Ok(()) | Err(SolverError::Interrupted) => {}
            Err(SolverError::Disposed) => return,
            Err(e) => inner.with_progress(|p| p.error(format!("Solver failed: {}", e))),
        }

        let restored = self.restore_best_quietly();
        if stop.is_set() {
            inner.with_progress(|p| {
                p.stage("Solver stopped.");
                p.set_status(AWAITING_COMMANDS);
            });
            inner.transition(SessionState::Solving, SessionState::Ready);
            return;
        }

        if restored && properties.get_bool("General.Save", false) {
            self.save_solution(&properties);
        }
        if properties.get_bool("General.Unload", false) {
            self.dispose();
            return;
        }
        inner.with_progress(|p| {
            p.stage("Solver finished.");
            p.set_status(AWAITING_COMMANDS);
        });
        inner.transition(SessionState::Solving, SessionState::Ready);
    }

    /// Stops a running search and waits for it. The best assignment found is
    /// restored as the current one.
    pub fn stop(&self) {
        if self.state() != SessionState::Solving {
            return;
        }
        if let Some(worker) = lock(&self.inner.worker).as_ref() {
            worker.request_stop();
        }
        self.wait();
    }

    /// Signals whatever background work is running to stop, without waiting.
    pub fn interrupt(&self) {
        if let Some(worker) = lock(&self.inner.worker).as_ref() {
            if !worker.is_finished() {
                log::debug!("Interrupting {:?} worker of {}", worker.kind(), self.inner.owner);
                worker.request_stop();
            }
        }
    }

    /// Writes the current assignment through the configured saver in the
    /// background.
    pub fn save(&self) -> Result<()> {
        self.activate_if_needed()?;
        if self.inner.services.saver.is_none() {
            return Err(SolverError::Config("no solution saver configured".to_string()));
        }
        self.begin("save", SessionState::Saving)?;
        let spawned = self.spawn(WorkKind::Save, |session, _| {
            let properties = session.properties();
            session.inner.with_progress(|p| p.set_status("Saving solution ..."));
            session.save_solution(&properties);
            session.inner.with_progress(|p| p.set_status(AWAITING_COMMANDS));
            session.inner.transition(SessionState::Saving, SessionState::Ready);
        });
        if spawned.is_err() {
            self.inner.transition(SessionState::Saving, SessionState::Ready);
        }
        spawned
    }

    fn save_solution(&self, properties: &Properties) {
        let inner = &self.inner;
        let Some(saver) = inner.services.saver.as_ref() else {
            inner.with_progress(|p| p.warn("No solution saver configured, nothing saved."));
            return;
        };
        let slot = read(&inner.solution);
        if let Slot::Live(solution) = &*slot {
            match saver.save(solution, properties) {
                Ok(saved) => inner.with_progress(|p| p.stage(format!("Saved {} assignments.", saved))),
                Err(e) => inner.with_progress(|p| p.error(format!("Failed to save the solution: {}", e))),
            }
        }
    }

    /// Unassigns every variable and forgets the best assignment.
    pub fn clear(&self) -> Result<()> {
        self.with_live_mut("clear", |solution| {
            solution.assignment.unassign_all();
            solution.assignment.clear_best();
        })
    }

    pub fn restore_best(&self) -> Result<bool> {
        self.with_live_mut("restore best", |solution| solution.restore_best())
    }

    pub fn save_best(&self) -> Result<()> {
        self.with_live_mut("save best", |solution| solution.save_best())
    }

    fn restore_best_quietly(&self) -> bool {
        match &mut *self.inner.solution_mut() {
            Slot::Live(solution) => solution.restore_best(),
            _ => false,
        }
    }

    /// Joins the in-flight background worker, if any.
    pub fn wait(&self) {
        let handle = lock(&self.inner.worker).as_mut().and_then(|w| w.take_handle());
        if let Some(handle) = handle {
            worker::join(handle);
        }
    }

    /// Tears the session down. Calling it again does nothing.
    pub fn dispose(&self) {
        self.dispose_with(false);
    }

    /// Tears the session down; with `keep_files` a passivation file stays on
    /// disk for a later restore.
    fn dispose_with(&self, keep_files: bool) {
        {
            let mut state = lock(&self.inner.state);
            if *state == SessionState::Disposed {
                return;
            }
            *state = SessionState::Disposed;
        }
        if let Some(worker) = lock(&self.inner.worker).as_ref() {
            worker.request_stop();
        }
        let previous = std::mem::take(&mut *self.inner.solution_mut());
        if let Slot::Passivated(snapshot) = previous {
            if keep_files {
                log::warn!(
                    "Passivated session {} left in {}",
                    snapshot.id,
                    snapshot.folder.display()
                );
            } else {
                snapshot.discard();
            }
        }
        log::info!("Session {} disposed", self.inner.owner);

        let listeners = std::mem::take(&mut *lock(&self.inner.listeners));
        for listener in listeners {
            listener(self);
        }
    }

    pub fn current_solution_info(&self) -> Option<IndexMap<String, String>> {
        match &*read(&self.inner.solution) {
            Slot::Live(solution) => {
                self.inner.passivation.touch();
                Some(solution.current_info())
            }
            Slot::Passivated(snapshot) => Some(snapshot.current_info.clone()),
            Slot::Empty => None,
        }
    }

    pub fn best_solution_info(&self) -> Option<IndexMap<String, String>> {
        match &*read(&self.inner.solution) {
            Slot::Live(solution) => {
                self.inner.passivation.touch();
                solution.best_info()
            }
            Slot::Passivated(snapshot) => snapshot.best_info.clone(),
            Slot::Empty => None,
        }
    }

    /// Best info, or the live info when the working assignment beats it.
    /// Computed entirely under the read lock.
    pub fn status_solution_info(&self) -> Option<IndexMap<String, String>> {
        match &*read(&self.inner.solution) {
            Slot::Live(solution) => {
                self.inner.passivation.touch();
                Some(solution.status_info())
            }
            Slot::Passivated(snapshot) => snapshot
                .best_info
                .clone()
                .or_else(|| Some(snapshot.current_info.clone())),
            Slot::Empty => None,
        }
    }

    /// `STATUS/PHASE/PROGRESS/MAX_PROGRESS/VERSION` of the session.
    pub fn get_progress(&self) -> IndexMap<String, String> {
        if let Slot::Passivated(snapshot) = &*read(&self.inner.solution) {
            return snapshot.progress.clone();
        }
        lock(&self.inner.progress).progress_map()
    }

    pub fn progress_messages(&self, min_level: MessageLevel) -> Vec<ProgressMessage> {
        lock(&self.inner.progress)
            .messages(min_level)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn warning_count(&self) -> usize {
        lock(&self.inner.progress).warning_count()
    }

    pub fn has_fatal(&self) -> bool {
        lock(&self.inner.progress).has_fatal()
    }

    /// Moves a ready session into `to`.
    fn begin(&self, operation: &'static str, to: SessionState) -> Result<()> {
        let mut state = lock(&self.inner.state);
        match *state {
            SessionState::Ready => {
                *state = to;
                Ok(())
            }
            SessionState::Disposed => Err(SolverError::Disposed),
            s if s.is_working() => Err(SolverError::Busy),
            s => Err(SolverError::InvalidState { operation, state: s }),
        }
    }

    fn not_live(&self, operation: &'static str) -> SolverError {
        match self.state() {
            SessionState::Disposed => SolverError::Disposed,
            state => SolverError::InvalidState { operation, state },
        }
    }

    /// Runs `f` on the live solution under the read lock, activating first.
    fn with_live<R>(&self, operation: &'static str, f: impl FnOnce(&Solution) -> R) -> Result<R> {
        loop {
            self.activate_if_needed()?;
            let passivated = match &*read(&self.inner.solution) {
                Slot::Live(solution) => return Ok(f(solution)),
                Slot::Passivated(_) => true,
                Slot::Empty => false,
            };
            if !passivated {
                return Err(self.not_live(operation));
            }
        }
    }

    /// Runs `f` on the live solution under the write lock, activating first.
    fn with_live_mut<R>(&self, operation: &'static str, f: impl FnOnce(&mut Solution) -> R) -> Result<R> {
        loop {
            self.activate_if_needed()?;
            let passivated = match &mut *self.inner.solution_mut() {
                Slot::Live(solution) => return Ok(f(solution)),
                Slot::Passivated(_) => true,
                Slot::Empty => false,
            };
            if !passivated {
                return Err(self.not_live(operation));
            }
        }
    }

    fn spawn(&self, kind: WorkKind, task: impl FnOnce(SolverSession, StopToken) + Send + 'static) -> Result<()> {
        // the previous worker is past its last state transition
        let previous = lock(&self.inner.worker).as_mut().and_then(|w| w.take_handle());
        if let Some(handle) = previous {
            worker::join(handle);
        }
        let session = self.clone();
        let name = format!("tassign-{:?}-{}", kind, self.inner.owner).to_lowercase();
        let worker = Worker::spawn(name, kind, move |stop| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| task(session.clone(), stop)));
            if let Err(payload) = outcome {
                session.recover_from_panic(kind, &panic_message(payload.as_ref()));
            }
        })?;
        *lock(&self.inner.worker) = Some(worker);
        Ok(())
    }

    /// Leaves the working state a panicked worker was in: a failed first
    /// load disposes the session, anything else goes back to ready.
    fn recover_from_panic(&self, kind: WorkKind, reason: &str) {
        let inner = &self.inner;
        log::error!("{:?} worker of {} panicked: {}", kind, inner.owner, reason);
        inner.with_progress(|p| p.fatal(format!("{:?} failed unexpectedly: {}", kind, reason)));
        let state = self.state();
        match state {
            SessionState::Loading if kind == WorkKind::Load => {
                self.dispose();
                return;
            }
            SessionState::Solving => {
                self.restore_best_quietly();
            }
            SessionState::Loading | SessionState::Saving => {}
            _ => return,
        }
        inner.with_progress(|p| p.set_status(AWAITING_COMMANDS));
        inner.transition(state, SessionState::Ready);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
