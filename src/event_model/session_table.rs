use super::session::Session;
use std::collections::HashMap;

/// Open sessions keyed by client identifier.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<String, Session>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, client_id: &str) -> Option<&Session> {
        self.sessions.get(client_id)
    }

    pub fn get_mut(&mut self, client_id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(client_id)
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.sessions.contains_key(client_id)
    }

    /// Inserts a freshly opened session, returning any session it displaced.
    pub fn insert(&mut self, session: Session) -> Option<Session> {
        self.sessions.insert(session.client_id.clone(), session)
    }

    pub fn remove(&mut self, client_id: &str) -> Option<Session> {
        self.sessions.remove(client_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Empties the table, returning sessions in the order they were opened.
    pub fn drain_in_open_order(&mut self) -> Vec<Session> {
        let mut drained: Vec<_> = self.sessions.drain().map(|(_, session)| session).collect();
        drained.sort_by_key(|session| session.sequence);
        drained
    }
}
