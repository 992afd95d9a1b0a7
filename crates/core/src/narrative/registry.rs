use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::session::{NovelSession, SessionSettings};
use crate::logging::{LogCrateSink, SharedLogSink};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

pub type SharedSession = Arc<Mutex<NovelSession>>;

/// Explicit map of live sessions. Each session sits behind its own mutex so
/// mutations of one narrative are serialized without blocking the others.
///
/// Sessions created here report through the `log` facade unless another sink
/// is supplied with [`SessionRegistry::with_sink`].
pub struct SessionRegistry {
    settings: SessionSettings,
    sink: SharedLogSink,
    sessions: RwLock<HashMap<SessionId, SharedSession>>,
}

impl SessionRegistry {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            sink: Arc::new(LogCrateSink::default()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_sink(mut self, sink: SharedLogSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn create(&self) -> (SessionId, SharedSession) {
        let session = NovelSession::new(self.settings.clone()).with_sink(self.sink.clone());
        self.insert(session)
    }

    /// Registers an existing session, e.g. one restored from a snapshot.
    pub fn insert(&self, session: NovelSession) -> (SessionId, SharedSession) {
        let id = SessionId::new();
        let shared = Arc::new(Mutex::new(session));
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&shared));
        (id, shared)
    }

    pub fn get(&self, id: &SessionId) -> Option<SharedSession> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn remove(&self, id: &SessionId) -> Option<SharedSession> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SessionSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_are_independent() {
        let registry = SessionRegistry::default();
        let (first, _) = registry.create();
        let (second, _) = registry.create();
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);

        let shared = registry.get(&first).unwrap();
        assert!(!shared.lock().unwrap().is_active());

        assert!(registry.remove(&first).is_some());
        assert!(registry.get(&first).is_none());
        assert_eq!(registry.ids(), vec![second]);
    }

    #[test]
    fn session_id_serializes_as_plain_uuid() {
        let id = SessionId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
    }
}
