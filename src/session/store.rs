use super::ListeningSession;
use crate::auth::SessionKey;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A live session. Every engine operation holds the lock for its whole
/// duration, so one session never sees two overlapping transitions.
pub type SessionHandle = Arc<Mutex<ListeningSession>>;

/// Registry of live sessions, owned by the engine.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionKey, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces whatever session the key had before.
    pub fn insert(&self, session: ListeningSession) -> SessionHandle {
        let key = session.key.clone();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().insert(key, Arc::clone(&handle));
        handle
    }

    pub fn get(&self, key: &SessionKey) -> Option<SessionHandle> {
        self.sessions.read().get(key).cloned()
    }

    pub fn remove(&self, key: &SessionKey) -> bool {
        self.sessions.write().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
