//! Session storage and the housekeeping sweep.
//!
//! Sessions live for one server instance. Lifecycle events are forwarded to
//! a [`SessionEventSink`], which the front door implements. Events are
//! always emitted after the session has left the map, so a sink may call
//! back into the store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::debug;

/// Receives session lifecycle events.
pub trait SessionEventSink: Send + Sync {
    /// A session was invalidated, expired, or discarded at shutdown.
    fn session_destroyed(&self, _id: &str) {}

    /// A session was given a new id; `old_id` is no longer valid.
    fn session_id_changed(&self, _old_id: &str) {}
}

/// Sink that ignores every event.
pub struct NoopSessionEvents;

impl SessionEventSink for NoopSessionEvents {}

struct Session {
    created: Instant,
    last_accessed: Instant,
    attributes: HashMap<String, Value>,
}

impl Session {
    fn new(now: Instant) -> Self {
        Self {
            created: now,
            last_accessed: now,
            attributes: HashMap::new(),
        }
    }
}

pub struct SessionStore {
    sessions: DashMap<String, Session>,
    /// `None` means sessions never expire.
    max_inactive: Option<Duration>,
    events: Arc<dyn SessionEventSink>,
}

impl SessionStore {
    pub fn new(max_inactive: Option<Duration>, events: Arc<dyn SessionEventSink>) -> Self {
        Self {
            sessions: DashMap::new(),
            max_inactive,
            events,
        }
    }

    pub fn max_inactive(&self) -> Option<Duration> {
        self.max_inactive
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Create a session and return its id.
    pub fn create(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.sessions.insert(id.clone(), Session::new(Instant::now()));
        debug!("Session created: {id}");
        id
    }

    /// Mark a session as accessed. Returns `false` if it does not exist or
    /// had already expired (in which case it is destroyed now).
    pub fn touch(&self, id: &str) -> bool {
        self.touch_at(id, Instant::now())
    }

    pub(crate) fn touch_at(&self, id: &str, now: Instant) -> bool {
        let expired = match self.sessions.get_mut(id) {
            None => return false,
            Some(mut session) => {
                if self.is_expired(&session, now) {
                    true
                } else {
                    session.last_accessed = now;
                    false
                }
            }
        };
        if expired {
            self.destroy(id);
        }
        !expired
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Age of a session, if it exists.
    pub fn age(&self, id: &str) -> Option<Duration> {
        self.sessions.get(id).map(|s| s.created.elapsed())
    }

    pub fn attribute(&self, id: &str, name: &str) -> Option<Value> {
        self.sessions.get(id).and_then(|s| s.attributes.get(name).cloned())
    }

    /// Returns `false` if the session does not exist.
    pub fn set_attribute(&self, id: &str, name: impl Into<String>, value: Value) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut session) => {
                session.attributes.insert(name.into(), value);
                true
            }
            None => false,
        }
    }

    pub fn remove_attribute(&self, id: &str, name: &str) -> Option<Value> {
        self.sessions.get_mut(id).and_then(|mut s| s.attributes.remove(name))
    }

    /// Invalidate a session. Returns `false` if it did not exist.
    pub fn invalidate(&self, id: &str) -> bool {
        self.destroy(id)
    }

    /// Move a session to a fresh id, keeping its attributes.
    pub fn change_id(&self, old_id: &str) -> Option<String> {
        let (_, session) = self.sessions.remove(old_id)?;
        let new_id = uuid::Uuid::new_v4().to_string();
        self.sessions.insert(new_id.clone(), session);
        debug!("Session id changed: {old_id} -> {new_id}");
        self.events.session_id_changed(old_id);
        Some(new_id)
    }

    /// Destroy every expired session. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub(crate) fn sweep_at(&self, now: Instant) -> usize {
        if self.max_inactive.is_none() {
            return 0;
        }
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| self.is_expired(entry.value(), now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for id in expired {
            if self
                .sessions
                .remove_if(&id, |_, session| self.is_expired(session, now))
                .is_some()
            {
                self.events.session_destroyed(&id);
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("Housekeeper expired {removed} session(s)");
        }
        removed
    }

    /// Destroy all sessions; used when the instance stops.
    pub fn invalidate_all(&self) -> usize {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.destroy(id)).count()
    }

    fn destroy(&self, id: &str) -> bool {
        if self.sessions.remove(id).is_some() {
            debug!("Session destroyed: {id}");
            self.events.session_destroyed(id);
            true
        } else {
            false
        }
    }

    fn is_expired(&self, session: &Session, now: Instant) -> bool {
        match self.max_inactive {
            Some(max) => now.saturating_duration_since(session.last_accessed) > max,
            None => false,
        }
    }
}

/// Run [`SessionStore::sweep`] every `interval` on the given runtime.
pub fn spawn_housekeeper(
    store: Arc<SessionStore>,
    interval: Duration,
    runtime: &tokio::runtime::Handle,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            store.sweep();
        }
    })
}
