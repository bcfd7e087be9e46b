use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::engine::StopToken;
use crate::error::Result;

/// Kind of background work a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkKind {
    Load,
    Reload,
    Save,
    Solve,
}

/// Marks the worker finished when the task returns or unwinds.
struct FinishedGuard(Arc<AtomicBool>);

impl Drop for FinishedGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// The single background thread of a session.
pub(super) struct Worker {
    kind: WorkKind,
    stop: StopToken,
    finished: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub(super) fn spawn(name: String, kind: WorkKind, task: impl FnOnce(StopToken) + Send + 'static) -> Result<Self> {
        let stop = StopToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        let token = stop.clone();
        let guard = FinishedGuard(Arc::clone(&finished));
        let handle = thread::Builder::new().name(name).spawn(move || {
            let _guard = guard;
            task(token);
        })?;
        log::debug!("Started {:?} worker", kind);
        Ok(Self {
            kind,
            stop,
            finished,
            handle: Some(handle),
        })
    }

    pub(super) fn kind(&self) -> WorkKind {
        self.kind
    }

    pub(super) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub(super) fn request_stop(&self) {
        self.stop.request_stop();
    }

    pub(super) fn take_handle(&mut self) -> Option<JoinHandle<()>> {
        self.handle.take()
    }
}

/// Joins a worker thread, logging a panic instead of propagating it.
pub(super) fn join(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        log::error!("Background worker panicked");
    }
}
