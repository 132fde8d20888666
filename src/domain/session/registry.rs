//! Session registry
//!
//! Sessions live in a `DashMap` keyed by id, each behind its own mutex. The
//! map's shard locks are held only long enough to clone a handle out, so work
//! on one session never contends with work on another.

use crate::domain::session::aggregate::CallSession;
use crate::domain::session::value_object::SessionState;
use crate::domain::shared::{EngineError, Result, SessionId};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared handle to one registered session
///
/// While any handle is alive the session cannot be evicted.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<CallSession>>,
}

impl SessionHandle {
    fn new(session: CallSession) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Run `f` with exclusive access to the session
    pub fn with<R>(&self, f: impl FnOnce(&mut CallSession) -> R) -> R {
        let mut session = self.inner.lock();
        f(&mut session)
    }

    pub fn snapshot(&self) -> CallSession {
        self.inner.lock().clone()
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session; fails if the id is still present
    pub fn insert(&self, session: CallSession) -> Result<SessionHandle> {
        match self.sessions.entry(session.id().clone()) {
            Entry::Occupied(entry) => Err(EngineError::DuplicateSession(entry.key().clone())),
            Entry::Vacant(entry) => {
                let handle = SessionHandle::new(session);
                entry.insert(handle.clone());
                Ok(handle)
            }
        }
    }

    pub fn handle(&self, id: &SessionId) -> Result<SessionHandle> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::SessionNotFound(id.clone()))
    }

    pub fn get(&self, id: &SessionId) -> Result<CallSession> {
        self.handle(id).map(|handle| handle.snapshot())
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of every registered session, terminal ones included
    pub fn snapshot_all(&self) -> Vec<CallSession> {
        self.handles().into_iter().map(|(_, handle)| handle.snapshot()).collect()
    }

    /// Snapshot of all non-terminal sessions
    pub fn list_active(&self) -> Vec<CallSession> {
        self.snapshot_all()
            .into_iter()
            .filter(|session| !session.is_terminal())
            .collect()
    }

    pub fn count_by_state(&self, state: SessionState) -> usize {
        self.handles()
            .into_iter()
            .filter(|(_, handle)| handle.with(|s| s.state() == state))
            .count()
    }

    /// Sessions stuck in setup for at least `timeout`
    pub fn stalled_setup(&self, timeout: chrono::Duration, now: DateTime<Utc>) -> Vec<SessionId> {
        self.handles()
            .into_iter()
            .filter(|(_, handle)| handle.with(|s| s.setup_timed_out(timeout, now)))
            .map(|(id, _)| id)
            .collect()
    }

    /// Terminal sessions whose retention window has elapsed
    pub fn expired_terminal(&self, retention: chrono::Duration, now: DateTime<Utc>) -> Vec<SessionId> {
        self.handles()
            .into_iter()
            .filter(|(_, handle)| handle.with(|s| s.retention_elapsed(retention, now)))
            .map(|(id, _)| id)
            .collect()
    }

    /// Remove a terminal session.
    ///
    /// Returns `Ok(false)` when someone still holds a handle to it; the next
    /// sweep will try again.
    pub fn evict(&self, id: &SessionId) -> Result<bool> {
        {
            let entry = self
                .sessions
                .get(id)
                .ok_or_else(|| EngineError::SessionNotFound(id.clone()))?;
            if !entry.value().with(|s| s.is_terminal()) {
                return Err(EngineError::SessionNotEvictable(id.clone()));
            }
        }

        // The map holds one reference; any other means a reader is observing.
        let removed = self
            .sessions
            .remove_if(id, |_, handle| Arc::strong_count(&handle.inner) == 1)
            .is_some();
        Ok(removed)
    }

    fn handles(&self) -> Vec<(SessionId, SessionHandle)> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
