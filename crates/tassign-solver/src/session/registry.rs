use std::path::Path;
use std::sync::{Arc, Mutex, Weak};

use indexmap::IndexMap;

use super::{lock, SessionServices, SolverSession};

type Sessions = Mutex<IndexMap<String, SolverSession>>;

/// Sessions of one application, keyed by owner id.
pub struct SessionRegistry {
    services: SessionServices,
    sessions: Arc<Sessions>,
}

impl SessionRegistry {
    pub fn new(services: SessionServices) -> Self {
        Self {
            services,
            sessions: Arc::new(Mutex::new(IndexMap::new())),
        }
    }

    pub fn services(&self) -> &SessionServices {
        &self.services
    }

    pub fn get(&self, owner: &str) -> Option<SolverSession> {
        lock(&self.sessions).get(owner).cloned()
    }

    /// Returns the owner's session, creating an empty one when missing.
    /// Disposed sessions drop out of the registry by themselves.
    pub fn get_or_create(&self, owner: &str) -> SolverSession {
        let mut sessions = lock(&self.sessions);
        if let Some(session) = sessions.get(owner) {
            return session.clone();
        }

        let session = SolverSession::new(owner, self.services.clone());
        let registry: Weak<Sessions> = Arc::downgrade(&self.sessions);
        session.add_dispose_listener(move |disposed| {
            let Some(sessions) = registry.upgrade() else {
                return;
            };
            let mut sessions = lock(&sessions);
            if sessions.get(disposed.owner()).is_some_and(|s| s.ptr_eq(disposed)) {
                sessions.shift_remove(disposed.owner());
                log::debug!("Removed session {} from registry", disposed.owner());
            }
        });
        sessions.insert(owner.to_string(), session.clone());
        session
    }

    /// Forgets a session without disposing it.
    pub fn remove(&self, owner: &str) -> Option<SolverSession> {
        lock(&self.sessions).shift_remove(owner)
    }

    pub fn owners(&self) -> Vec<String> {
        lock(&self.sessions).keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.sessions).is_empty()
    }

    fn snapshot(&self) -> Vec<SolverSession> {
        lock(&self.sessions).values().cloned().collect()
    }

    /// Passivates every idle session into `folder`, keyed by owner.
    ///
    /// # Returns
    /// Number of sessions passivated
    pub fn passivate_idle(&self, folder: &Path) -> usize {
        let mut passivated = 0;
        for session in self.snapshot() {
            match session.passivate_if_needed(folder, session.owner()) {
                Ok(true) => passivated += 1,
                Ok(false) => {}
                Err(e) => log::warn!("Failed to passivate session {}: {}", session.owner(), e),
            }
        }
        passivated
    }

    pub fn dispose_all(&self) {
        for session in self.snapshot() {
            session.dispose();
        }
    }
}
