//! In-memory session store implementation.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::traits::{Session, SessionFilter, SessionStore};

/// An in-memory session store backed by a mutex-protected hash map.
///
/// Lives for the process lifetime only.
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: Session) -> Result<Session> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&session.session_id) {
            bail!("session already exists: {}", session.session_id);
        }
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(session)
    }

    async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        let sessions = self.sessions.lock();
        Ok(sessions.get(session_id).cloned())
    }

    async fn update(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(&session.session_id) {
            Some(stored) => {
                *stored = session.clone();
                stored.last_activity = Utc::now();
                Ok(())
            }
            None => bail!("session not found: {}", session.session_id),
        }
    }

    async fn list(&self, filter: &SessionFilter) -> Result<Vec<Session>> {
        let sessions = self.sessions.lock();
        let mut results: Vec<Session> = sessions
            .values()
            .filter(|s| {
                if let Some(escalated) = filter.escalated {
                    if s.escalated != escalated {
                        return false;
                    }
                }
                if let Some(ref since) = filter.since {
                    if s.last_activity < *since {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        results.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));

        if let Some(limit) = filter.limit {
            results.truncate(limit);
        }

        Ok(results)
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        let mut sessions = self.sessions.lock();
        Ok(sessions.remove(session_id).is_some())
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}
